pub use sea_orm_migration::prelude::*;

pub mod schema;

mod m20240101_000001_create_users_table;
mod m20240101_000002_create_posts_table;
mod m20240101_000003_create_roles_tables;
mod m20240101_000004_create_comments_table;
mod m20240215_000001_add_profile_columns_to_users;

pub use schema::{AlterTable, Blueprint, Column, Schema};

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_users_table::Migration),
            Box::new(m20240101_000002_create_posts_table::Migration),
            Box::new(m20240101_000003_create_roles_tables::Migration),
            Box::new(m20240101_000004_create_comments_table::Migration),
            Box::new(m20240215_000001_add_profile_columns_to_users::Migration),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_ordered_by_name() {
        let names: Vec<String> = Migrator::migrations().iter().map(|m| m.name().to_string()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert_eq!(names[0], "m20240101_000001_create_users_table");
    }
}
