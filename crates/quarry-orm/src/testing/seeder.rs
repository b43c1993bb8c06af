use async_trait::async_trait;

use quarry_core::OrmResult;

use crate::orm::Orm;

/// Populates the database.
#[async_trait]
pub trait Seeder: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, orm: &Orm) -> OrmResult<()>;
}

/// Runs seeders in registration order, stopping at the first failure.
#[derive(Default)]
pub struct DatabaseSeeder {
    seeders: Vec<Box<dyn Seeder>>,
}

impl DatabaseSeeder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, seeder: impl Seeder + 'static) -> Self {
        self.seeders.push(Box::new(seeder));
        self
    }

    pub fn len(&self) -> usize {
        self.seeders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeders.is_empty()
    }
}

#[async_trait]
impl Seeder for DatabaseSeeder {
    fn name(&self) -> &str {
        "DatabaseSeeder"
    }

    async fn run(&self, orm: &Orm) -> OrmResult<()> {
        for seeder in &self.seeders {
            tracing::info!(seeder = seeder.name(), "Seeding");
            seeder.run(orm).await?;
        }
        tracing::info!(count = self.seeders.len(), "Database seeding completed");
        Ok(())
    }
}
