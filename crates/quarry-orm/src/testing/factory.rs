use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use quarry_core::{Attributes, OrmResult};

use crate::model::Record;
use crate::orm::Orm;

type Definition = Arc<dyn Fn(u64) -> Attributes + Send + Sync>;

/// Builds records of one model from a definition closure.
///
/// The closure receives a 1-based sequence number. States and per-call
/// overrides are layered on top of the definition, in that order. Factories
/// bypass mass-assignment protection.
///
/// ```
/// use quarry_orm::testing::{Factory, fake};
/// use serde_json::json;
///
/// let users = Factory::new("User", |n| {
///     json!({"name": fake::name(), "email": format!("user{n}@example.com")})
///         .as_object()
///         .cloned()
///         .unwrap_or_default()
/// });
/// assert_eq!(users.next_sequence(), 1);
/// ```
#[derive(Clone)]
pub struct Factory {
    model: String,
    definition: Definition,
    states: Vec<Attributes>,
    cycle: Vec<Attributes>,
    sequence: Arc<AtomicU64>,
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("model", &self.model)
            .field("states", &self.states.len())
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish()
    }
}

impl Factory {
    pub fn new<F>(model: impl Into<String>, definition: F) -> Self
    where
        F: Fn(u64) -> Attributes + Send + Sync + 'static,
    {
        Self {
            model: model.into(),
            definition: Arc::new(definition),
            states: Vec::new(),
            cycle: Vec::new(),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Layer fixed attributes over the definition.
    pub fn state(mut self, attributes: Attributes) -> Self {
        self.states.push(attributes);
        self
    }

    /// Alternate attribute sets across records, applied after states.
    pub fn sequence<I>(mut self, sets: I) -> Self
    where
        I: IntoIterator<Item = Attributes>,
    {
        self.cycle = sets.into_iter().collect();
        self
    }

    /// Advance and return the sequence. Clones share one counter.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Attributes for the next record.
    pub fn raw(&self, overrides: Attributes) -> Attributes {
        let n = self.next_sequence();
        let mut attributes = (self.definition)(n);
        for state in &self.states {
            attributes.extend(state.clone());
        }
        if !self.cycle.is_empty() {
            let index = ((n - 1) % self.cycle.len() as u64) as usize;
            attributes.extend(self.cycle[index].clone());
        }
        attributes.extend(overrides);
        attributes
    }

    /// Unsaved record.
    pub fn make(&self, orm: &Orm, overrides: Attributes) -> OrmResult<Record> {
        let mut record = Record::new(orm.meta(&self.model)?);
        record.force_fill(self.raw(overrides))?;
        Ok(record)
    }

    pub fn make_many(&self, orm: &Orm, count: usize, overrides: Attributes) -> OrmResult<Vec<Record>> {
        (0..count)
            .map(|_| self.make(orm, overrides.clone()))
            .collect()
    }

    /// Saved record; model events and validation run as usual.
    pub async fn create(&self, orm: &Orm, overrides: Attributes) -> OrmResult<Record> {
        let mut record = self.make(orm, overrides)?;
        orm.save(&mut record).await?;
        Ok(record)
    }

    pub async fn create_many(&self, orm: &Orm, count: usize, overrides: Attributes) -> OrmResult<Vec<Record>> {
        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            records.push(self.create(orm, overrides.clone()).await?);
        }
        tracing::debug!(model = %self.model, count, "Factory created records");
        Ok(records)
    }
}
