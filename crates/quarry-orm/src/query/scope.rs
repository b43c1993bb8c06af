use std::fmt;

use super::QueryBuilder;

/// A constraint applied to every query of a model unless removed with
/// `without_global_scope`.
pub trait Scope: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, query: QueryBuilder) -> QueryBuilder;

    fn should_apply(&self, _query: &QueryBuilder) -> bool {
        true
    }
}

/// Closure-backed global scope.
pub struct FnScope<F> {
    name: String,
    f: F,
}

impl<F> fmt::Debug for FnScope<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnScope").field("name", &self.name).finish()
    }
}

impl<F> Scope for FnScope<F>
where
    F: Fn(QueryBuilder) -> QueryBuilder + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, query: QueryBuilder) -> QueryBuilder {
        (self.f)(query)
    }
}

/// Wrap a closure as a named global scope.
pub fn scope_fn<F>(name: impl Into<String>, f: F) -> FnScope<F>
where
    F: Fn(QueryBuilder) -> QueryBuilder + Send + Sync,
{
    FnScope {
        name: name.into(),
        f,
    }
}
