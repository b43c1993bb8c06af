use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use quarry_core::validation::RuleSet;
use quarry_core::{Cast, CastRegistry, DbType, JsonValue, OrmError, OrmResult, Rule, naming};

use crate::events::{Listener, ModelEvent};
use crate::query::{QueryBuilder, Scope};
use crate::relations::{PivotDef, RelationDef};

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
pub const DELETED_AT: &str = "deleted_at";

/// Named query refinement, callable with `query.scope(name)`.
pub type LocalScope = Arc<dyn Fn(QueryBuilder, &[JsonValue]) -> QueryBuilder + Send + Sync>;

/// Declaration of a model.
///
/// # Example
/// ```
/// use quarry_orm::model::ModelDef;
/// use quarry_core::validation::{Email, Required};
///
/// let user = ModelDef::new("User")
///     .soft_deletes()
///     .cast("settings", "json")
///     .fillable(["name", "email", "settings"])
///     .hidden(["password"])
///     .rule("email", Required)
///     .rule("email", Email)
///     .has_many("posts", "Post")
///     .belongs_to_many("roles", "Role");
/// assert_eq!(user.table_name(), "users");
/// ```
pub struct ModelDef {
    pub(crate) name: String,
    pub(crate) table: String,
    pub(crate) primary_key: String,
    pub(crate) timestamps: bool,
    pub(crate) soft_deletes: bool,
    pub(crate) casts: Vec<(String, String)>,
    pub(crate) dates: Vec<String>,
    pub(crate) fillable: Vec<String>,
    pub(crate) guarded: Vec<String>,
    pub(crate) hidden: Vec<String>,
    pub(crate) rules: RuleSet,
    pub(crate) relations: BTreeMap<String, RelationDef>,
    pub(crate) global_scopes: Vec<Arc<dyn Scope>>,
    pub(crate) local_scopes: HashMap<String, LocalScope>,
    pub(crate) hooks: Vec<(ModelEvent, Listener)>,
    pub(crate) connection: Option<String>,
    pub(crate) morph_name: Option<String>,
}

impl ModelDef {
    /// New definition; the table defaults to the snake plural of the name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            table: naming::table_name(&name),
            name,
            primary_key: "id".to_string(),
            timestamps: true,
            soft_deletes: false,
            casts: Vec::new(),
            dates: Vec::new(),
            fillable: Vec::new(),
            guarded: Vec::new(),
            hidden: Vec::new(),
            rules: Vec::new(),
            relations: BTreeMap::new(),
            global_scopes: Vec::new(),
            local_scopes: HashMap::new(),
            hooks: Vec::new(),
            connection: None,
            morph_name: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = key.into();
        self
    }

    /// Disable automatic `created_at` / `updated_at`.
    pub fn without_timestamps(mut self) -> Self {
        self.timestamps = false;
        self
    }

    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    pub fn soft_deletes(mut self) -> Self {
        self.soft_deletes = true;
        self
    }

    pub fn cast(mut self, attribute: impl Into<String>, cast: impl Into<String>) -> Self {
        self.casts.push((attribute.into(), cast.into()));
        self
    }

    /// Columns bound as timestamps without an explicit cast.
    pub fn dates<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dates.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn fillable<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fillable.extend(attributes.into_iter().map(Into::into));
        self
    }

    /// `["*"]` guards everything not listed as fillable.
    pub fn guarded<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.guarded.extend(attributes.into_iter().map(Into::into));
        self
    }

    pub fn hidden<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hidden.extend(attributes.into_iter().map(Into::into));
        self
    }

    pub fn rule(mut self, attribute: impl Into<String>, rule: impl Rule + 'static) -> Self {
        let attribute = attribute.into();
        let rule: Arc<dyn Rule> = Arc::new(rule);
        match self.rules.iter_mut().find(|(name, _)| *name == attribute) {
            Some((_, rules)) => rules.push(rule),
            None => self.rules.push((attribute, vec![rule])),
        }
        self
    }

    /// Declare a relation with explicit keys.
    pub fn relation(mut self, name: impl Into<String>, def: RelationDef) -> Self {
        self.relations.insert(name.into(), def);
        self
    }

    pub fn has_one(self, name: &str, related: &str) -> Self {
        let def = RelationDef::has_one(related, &naming::foreign_key(&self.name), &self.primary_key);
        self.relation(name, def)
    }

    pub fn has_many(self, name: &str, related: &str) -> Self {
        let def = RelationDef::has_many(related, &naming::foreign_key(&self.name), &self.primary_key);
        self.relation(name, def)
    }

    /// The foreign key is `{name}_id` on this model.
    pub fn belongs_to(self, name: &str, related: &str) -> Self {
        let def = RelationDef::belongs_to(related, &naming::foreign_key(name), "id");
        self.relation(name, def)
    }

    pub fn belongs_to_many(self, name: &str, related: &str) -> Self {
        let pivot = PivotDef::infer(&self.name, &self.primary_key, related);
        self.relation(name, RelationDef::belongs_to_many(pivot))
    }

    pub fn morph_one(self, name: &str, related: &str, morph: &str) -> Self {
        let def = RelationDef::morph_one(related, morph, &self.primary_key);
        self.relation(name, def)
    }

    pub fn morph_many(self, name: &str, related: &str, morph: &str) -> Self {
        let def = RelationDef::morph_many(related, morph, &self.primary_key);
        self.relation(name, def)
    }

    /// Reads `{name}_type` / `{name}_id`.
    pub fn morph_to(self, name: &str) -> Self {
        let def = RelationDef::morph_to(name);
        self.relation(name, def)
    }

    pub fn global_scope(mut self, scope: impl Scope + 'static) -> Self {
        self.global_scopes.push(Arc::new(scope));
        self
    }

    /// Named scope without arguments.
    pub fn scope<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(QueryBuilder) -> QueryBuilder + Send + Sync + 'static,
    {
        self.scope_with(name, move |query, _| f(query))
    }

    /// Named scope receiving call arguments.
    pub fn scope_with<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(QueryBuilder, &[JsonValue]) -> QueryBuilder + Send + Sync + 'static,
    {
        self.local_scopes.insert(name.into(), Arc::new(f));
        self
    }

    /// Lifecycle hook declared with the model.
    pub fn on<F>(mut self, event: ModelEvent, f: F) -> Self
    where
        F: Fn(&mut crate::model::Record) -> OrmResult<()> + Send + Sync + 'static,
    {
        self.hooks.push((event, Arc::new(f)));
        self
    }

    /// Use a named secondary connection.
    pub fn connection(mut self, name: impl Into<String>) -> Self {
        self.connection = Some(name.into());
        self
    }

    /// Value stored in `{morph}_type` columns; defaults to the model name.
    pub fn morph_name(mut self, name: impl Into<String>) -> Self {
        self.morph_name = Some(name.into());
        self
    }

    /// Resolve casts and freeze the definition.
    pub fn into_meta(self, casts: &CastRegistry) -> OrmResult<ModelMeta> {
        let mut resolved = BTreeMap::new();
        for (attribute, cast_name) in self.casts {
            let cast = casts.get(&cast_name).map_err(|_| {
                OrmError::cast(
                    cast_name.clone(),
                    format!("unknown cast for {}.{attribute}", self.name),
                )
            })?;
            resolved.insert(attribute, CastSpec { name: cast_name, cast });
        }

        Ok(ModelMeta {
            morph_name: self.morph_name.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            table: self.table,
            primary_key: self.primary_key,
            timestamps: self.timestamps,
            soft_deletes: self.soft_deletes,
            casts: resolved,
            dates: self.dates,
            fillable: self.fillable,
            guarded: self.guarded,
            hidden: self.hidden,
            rules: self.rules,
            relations: self.relations,
            global_scopes: self.global_scopes,
            local_scopes: self.local_scopes,
            connection: self.connection,
        })
    }
}

impl fmt::Debug for ModelDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDef")
            .field("name", &self.name)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

/// A cast resolved against the registry.
#[derive(Clone)]
pub struct CastSpec {
    pub name: String,
    pub cast: Arc<dyn Cast>,
}

/// Registered, immutable model metadata.
pub struct ModelMeta {
    pub name: String,
    pub table: String,
    pub primary_key: String,
    pub timestamps: bool,
    pub soft_deletes: bool,
    pub casts: BTreeMap<String, CastSpec>,
    pub dates: Vec<String>,
    pub fillable: Vec<String>,
    pub guarded: Vec<String>,
    pub hidden: Vec<String>,
    pub rules: RuleSet,
    pub relations: BTreeMap<String, RelationDef>,
    pub global_scopes: Vec<Arc<dyn Scope>>,
    pub local_scopes: HashMap<String, LocalScope>,
    pub connection: Option<String>,
    pub morph_name: String,
}

impl fmt::Debug for ModelMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelMeta")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("casts", &self.casts.keys().collect::<Vec<_>>())
            .field("relations", &self.relations.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ModelMeta {
    pub fn cast(&self, attribute: &str) -> Option<&Arc<dyn Cast>> {
        self.casts.get(attribute).map(|spec| &spec.cast)
    }

    /// Binding hint for a column.
    pub fn db_type(&self, column: &str) -> Option<DbType> {
        if let Some(hint) = self.cast(column).and_then(|c| c.db_type()) {
            return Some(hint);
        }
        let is_timestamp = (self.timestamps && (column == CREATED_AT || column == UPDATED_AT))
            || (self.soft_deletes && column == DELETED_AT)
            || self.dates.iter().any(|d| d == column);
        is_timestamp.then_some(DbType::DateTime)
    }

    pub fn is_fillable(&self, attribute: &str) -> bool {
        if self.fillable.iter().any(|a| a == attribute) {
            return true;
        }
        if !self.fillable.is_empty() {
            return false;
        }
        !self.guarded.iter().any(|a| a == "*" || a == attribute)
    }

    pub fn is_hidden(&self, attribute: &str) -> bool {
        self.hidden.iter().any(|a| a == attribute)
    }

    pub fn relation(&self, name: &str) -> OrmResult<&RelationDef> {
        self.relations.get(name).ok_or_else(|| {
            OrmError::InvalidRelation(format!(
                "Relation '{name}' is not defined on model {}",
                self.name
            ))
        })
    }

    pub fn local_scope(&self, name: &str) -> Option<&LocalScope> {
        self.local_scopes.get(name)
    }
}
