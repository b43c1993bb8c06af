//! Model lifecycle events.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use quarry_core::{OrmError, OrmResult};

use crate::model::Record;

/// Lifecycle points at which listeners run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelEvent {
    Creating,
    Created,
    Updating,
    Updated,
    Deleting,
    Deleted,
    Saving,
    Saved,
    Restoring,
    Restored,
}

impl ModelEvent {
    pub const ALL: [ModelEvent; 10] = [
        ModelEvent::Creating,
        ModelEvent::Created,
        ModelEvent::Updating,
        ModelEvent::Updated,
        ModelEvent::Deleting,
        ModelEvent::Deleted,
        ModelEvent::Saving,
        ModelEvent::Saved,
        ModelEvent::Restoring,
        ModelEvent::Restored,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelEvent::Creating => "creating",
            ModelEvent::Created => "created",
            ModelEvent::Updating => "updating",
            ModelEvent::Updated => "updated",
            ModelEvent::Deleting => "deleting",
            ModelEvent::Deleted => "deleted",
            ModelEvent::Saving => "saving",
            ModelEvent::Saved => "saved",
            ModelEvent::Restoring => "restoring",
            ModelEvent::Restored => "restored",
        }
    }
}

impl fmt::Display for ModelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Listener for one event. Returning an error aborts the operation.
pub type Listener = Arc<dyn Fn(&mut Record) -> OrmResult<()> + Send + Sync>;

/// Listener for every event; receives the `"{Model}.{event}"` key.
pub type WildcardListener = Arc<dyn Fn(&str, &mut Record) -> OrmResult<()> + Send + Sync>;

/// Build the error a listener returns to stop an operation.
pub fn halt(event: ModelEvent, reason: impl Into<String>) -> OrmError {
    OrmError::Halted {
        event: event.as_str().to_string(),
        reason: reason.into(),
    }
}

/// Class-style observer: one method per event, all no-ops by default.
pub trait Observer: Send + Sync {
    fn creating(&self, _record: &mut Record) -> OrmResult<()> {
        Ok(())
    }
    fn created(&self, _record: &mut Record) -> OrmResult<()> {
        Ok(())
    }
    fn updating(&self, _record: &mut Record) -> OrmResult<()> {
        Ok(())
    }
    fn updated(&self, _record: &mut Record) -> OrmResult<()> {
        Ok(())
    }
    fn deleting(&self, _record: &mut Record) -> OrmResult<()> {
        Ok(())
    }
    fn deleted(&self, _record: &mut Record) -> OrmResult<()> {
        Ok(())
    }
    fn saving(&self, _record: &mut Record) -> OrmResult<()> {
        Ok(())
    }
    fn saved(&self, _record: &mut Record) -> OrmResult<()> {
        Ok(())
    }
    fn restoring(&self, _record: &mut Record) -> OrmResult<()> {
        Ok(())
    }
    fn restored(&self, _record: &mut Record) -> OrmResult<()> {
        Ok(())
    }
}

fn call_observer(observer: &dyn Observer, event: ModelEvent, record: &mut Record) -> OrmResult<()> {
    match event {
        ModelEvent::Creating => observer.creating(record),
        ModelEvent::Created => observer.created(record),
        ModelEvent::Updating => observer.updating(record),
        ModelEvent::Updated => observer.updated(record),
        ModelEvent::Deleting => observer.deleting(record),
        ModelEvent::Deleted => observer.deleted(record),
        ModelEvent::Saving => observer.saving(record),
        ModelEvent::Saved => observer.saved(record),
        ModelEvent::Restoring => observer.restoring(record),
        ModelEvent::Restored => observer.restored(record),
    }
}

fn event_key(model: &str, event: ModelEvent) -> String {
    format!("{model}.{event}")
}

/// Listener table keyed by `"{Model}.{event}"`.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    listeners: HashMap<String, Vec<Listener>>,
    wildcards: Vec<WildcardListener>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("events", &self.listeners.keys().collect::<Vec<_>>())
            .field("wildcards", &self.wildcards.len())
            .finish()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listen(&mut self, model: &str, event: ModelEvent, listener: Listener) {
        self.listeners
            .entry(event_key(model, event))
            .or_default()
            .push(listener);
    }

    pub fn listen_any(&mut self, listener: WildcardListener) {
        self.wildcards.push(listener);
    }

    /// Register every method of an observer for `model`.
    pub fn observe(&mut self, model: &str, observer: Arc<dyn Observer>) {
        for event in ModelEvent::ALL {
            let observer = Arc::clone(&observer);
            self.listen(
                model,
                event,
                Arc::new(move |record: &mut Record| call_observer(observer.as_ref(), event, record)),
            );
        }
    }

    pub fn has_listeners(&self, model: &str, event: ModelEvent) -> bool {
        !self.wildcards.is_empty() || self.listeners.contains_key(&event_key(model, event))
    }

    /// Run wildcard listeners, then the event's own listeners, in
    /// registration order. The first error stops dispatch.
    pub fn dispatch(&self, event: ModelEvent, record: &mut Record) -> OrmResult<()> {
        let key = event_key(&record.meta().name, event);
        for listener in &self.wildcards {
            listener(&key, record)?;
        }
        if let Some(listeners) = self.listeners.get(&key) {
            for listener in listeners {
                listener(record)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::model::ModelDef;
    use quarry_core::CastRegistry;

    fn record() -> Record {
        let meta = ModelDef::new("User").into_meta(&CastRegistry::with_defaults()).unwrap();
        Record::new(Arc::new(meta))
    }

    #[test]
    fn test_wildcards_run_before_specific_listeners() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::new();

        let log = Arc::clone(&calls);
        dispatcher.listen(
            "User",
            ModelEvent::Saving,
            Arc::new(move |_: &mut Record| {
                log.lock().unwrap().push("specific".to_string());
                Ok(())
            }),
        );
        let log = Arc::clone(&calls);
        dispatcher.listen_any(Arc::new(move |key: &str, _: &mut Record| {
            log.lock().unwrap().push(key.to_string());
            Ok(())
        }));

        dispatcher.dispatch(ModelEvent::Saving, &mut record()).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["User.saving", "specific"]);
    }

    #[test]
    fn test_listener_error_halts() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.listen(
            "User",
            ModelEvent::Deleting,
            Arc::new(|_: &mut Record| Err(halt(ModelEvent::Deleting, "protected"))),
        );

        let err = dispatcher.dispatch(ModelEvent::Deleting, &mut record()).unwrap_err();
        assert!(matches!(err, OrmError::Halted { .. }));
        assert!(dispatcher.dispatch(ModelEvent::Deleted, &mut record()).is_ok());
    }

    struct Slugger;

    impl Observer for Slugger {
        fn creating(&self, record: &mut Record) -> OrmResult<()> {
            let slug = record
                .get("title")
                .and_then(|v| v.as_str())
                .map(|t| t.to_lowercase().replace(' ', "-"))
                .unwrap_or_default();
            record.set_raw("slug", slug);
            Ok(())
        }
    }

    #[test]
    fn test_observer_methods_become_listeners() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.observe("User", Arc::new(Slugger));

        let mut record = record();
        record.set_raw("title", "Hello World");
        dispatcher.dispatch(ModelEvent::Creating, &mut record).unwrap();
        assert_eq!(record.get("slug").and_then(|v| v.as_str()), Some("hello-world"));
    }
}
