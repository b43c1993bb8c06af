use std::fmt;
use std::future::Future;
use std::sync::Arc;

use sea_orm::sea_query::{
    Alias, Asterisk, Condition, Expr, Func, Order, Query, SelectStatement, SimpleExpr,
};
use sea_orm::{ConnectionTrait, DbBackend, DbConn, Statement};

use quarry_core::value::key_string;
use quarry_core::{
    Attributes, CursorPaginator, Filter, FilterCondition, JsonValue, LengthAwarePaginator,
    Operator, OrmError, OrmResult,
};

use super::aggregate::AggregateBuilder;
use super::clause::{
    Boolean, Direction, all_of, column, column_predicate, combine, filter_condition, predicate,
    split_column,
};
use super::eager;
use super::scope::Scope;
use crate::database::executor::{self, db_error};
use crate::database::values::{now, value_expr};
use crate::model::{CREATED_AT, DELETED_AT, ModelMeta, Record, UPDATED_AT};
use crate::orm::Orm;
use crate::relations::{PivotDef, RelationDef};

/// Refinement applied to an eager-loaded or `where_has` relation query.
pub type Constraint = Arc<dyn Fn(QueryBuilder) -> QueryBuilder + Send + Sync>;

pub(crate) const AGGREGATE: &str = "aggregate";

/// Which soft-deleted rows a query sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrashedMode {
    #[default]
    Exclude,
    Include,
    Only,
}

/// Fluent query over one model.
///
/// Builder methods consume and return the builder. Invalid input is recorded
/// and returned by the first terminal operation.
///
/// # Example
/// ```no_run
/// # async fn run(orm: quarry_orm::Orm) -> quarry_core::OrmResult<()> {
/// let users = orm
///     .query("User")?
///     .where_eq("active", true)
///     .where_("age", ">=", 18)
///     .or_where("role", "=", "admin")
///     .with_("posts.comments")
///     .order_by_desc("created_at")
///     .take(10)
///     .get()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct QueryBuilder {
    orm: Orm,
    meta: Arc<ModelMeta>,
    alias: Option<String>,
    columns: Vec<String>,
    distinct: bool,
    pub(crate) wheres: Vec<(Boolean, Condition)>,
    constraints: Vec<SimpleExpr>,
    orders: Vec<(SimpleExpr, Order)>,
    groups: Vec<String>,
    havings: Vec<Condition>,
    limit: Option<u64>,
    offset: Option<u64>,
    eager: Vec<(String, Option<Constraint>)>,
    removed_scopes: Vec<String>,
    without_all_scopes: bool,
    extra_scopes: Vec<Arc<dyn Scope>>,
    scopes_applied: bool,
    trashed: TrashedMode,
    pivot: Option<PivotDef>,
    error: Option<OrmError>,
}

impl fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("model", &self.meta.name)
            .field("table", &self.table_ref())
            .field("wheres", &self.wheres.len())
            .field("eager", &self.eager.iter().map(|(p, _)| p).collect::<Vec<_>>())
            .field("trashed", &self.trashed)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl QueryBuilder {
    pub(crate) fn new(orm: Orm, meta: Arc<ModelMeta>) -> Self {
        Self {
            orm,
            meta,
            alias: None,
            columns: Vec::new(),
            distinct: false,
            wheres: Vec::new(),
            constraints: Vec::new(),
            orders: Vec::new(),
            groups: Vec::new(),
            havings: Vec::new(),
            limit: None,
            offset: None,
            eager: Vec::new(),
            removed_scopes: Vec::new(),
            without_all_scopes: false,
            extra_scopes: Vec::new(),
            scopes_applied: false,
            trashed: TrashedMode::default(),
            pivot: None,
            error: None,
        }
    }

    pub fn meta(&self) -> &Arc<ModelMeta> {
        &self.meta
    }

    pub fn model_name(&self) -> &str {
        &self.meta.name
    }

    pub fn trashed_mode(&self) -> TrashedMode {
        self.trashed
    }

    pub(crate) fn orm(&self) -> &Orm {
        &self.orm
    }

    /// Table name or alias used to qualify columns.
    pub(crate) fn table_ref(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.meta.table)
    }

    pub(crate) fn error(&self) -> Option<&OrmError> {
        self.error.as_ref()
    }

    /// Keep the first recorded error.
    pub(crate) fn fail(mut self, err: OrmError) -> Self {
        if self.error.is_none() {
            self.error = Some(err);
        }
        self
    }

    /// Empty builder over the same table, for grouped clauses.
    fn nested(&self) -> QueryBuilder {
        let mut nested = QueryBuilder::new(self.orm.clone(), Arc::clone(&self.meta));
        nested.alias = self.alias.clone();
        nested.pivot = self.pivot.clone();
        nested
    }

    fn condition(field: &str, operator: &str, value: JsonValue) -> OrmResult<FilterCondition> {
        let operator: Operator = operator.parse()?;
        // `= null` reads as IS NULL
        let operator = match (operator, value.is_null()) {
            (Operator::Equal, true) => Operator::Null,
            (Operator::NotEqual, true) => Operator::NotNull,
            (op, _) => op,
        };
        FilterCondition::new(field, operator, value)
    }

    fn compiled(&self, cond: &FilterCondition) -> SimpleExpr {
        let meta = &self.meta;
        column_predicate(self.table_ref(), cond, |c| meta.db_type(c))
    }

    fn push(mut self, boolean: Boolean, cond: OrmResult<FilterCondition>) -> Self {
        match cond {
            Ok(cond) => {
                let expr = self.compiled(&cond);
                self.wheres.push((boolean, Condition::all().add(expr)));
                self
            }
            Err(err) => self.fail(err),
        }
    }

    // -- where clauses --

    pub fn where_(self, field: &str, operator: &str, value: impl Into<JsonValue>) -> Self {
        let cond = Self::condition(field, operator, value.into());
        self.push(Boolean::And, cond)
    }

    pub fn or_where(self, field: &str, operator: &str, value: impl Into<JsonValue>) -> Self {
        let cond = Self::condition(field, operator, value.into());
        self.push(Boolean::Or, cond)
    }

    pub fn where_eq(self, field: &str, value: impl Into<JsonValue>) -> Self {
        self.where_(field, "=", value)
    }

    pub fn or_where_eq(self, field: &str, value: impl Into<JsonValue>) -> Self {
        self.or_where(field, "=", value)
    }

    pub fn where_in<I, V>(self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<JsonValue>,
    {
        let values = JsonValue::Array(values.into_iter().map(Into::into).collect());
        let cond = FilterCondition::new(field, Operator::In, values);
        self.push(Boolean::And, cond)
    }

    pub fn where_not_in<I, V>(self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<JsonValue>,
    {
        let values = JsonValue::Array(values.into_iter().map(Into::into).collect());
        let cond = FilterCondition::new(field, Operator::NotIn, values);
        self.push(Boolean::And, cond)
    }

    pub fn where_null(self, field: &str) -> Self {
        let cond = FilterCondition::new(field, Operator::Null, JsonValue::Null);
        self.push(Boolean::And, cond)
    }

    pub fn where_not_null(self, field: &str) -> Self {
        let cond = FilterCondition::new(field, Operator::NotNull, JsonValue::Null);
        self.push(Boolean::And, cond)
    }

    pub fn where_between(
        self,
        field: &str,
        low: impl Into<JsonValue>,
        high: impl Into<JsonValue>,
    ) -> Self {
        let bounds = JsonValue::Array(vec![low.into(), high.into()]);
        let cond = FilterCondition::new(field, Operator::Between, bounds);
        self.push(Boolean::And, cond)
    }

    pub fn where_not_between(
        self,
        field: &str,
        low: impl Into<JsonValue>,
        high: impl Into<JsonValue>,
    ) -> Self {
        let bounds = JsonValue::Array(vec![low.into(), high.into()]);
        let cond = FilterCondition::new(field, Operator::NotBetween, bounds);
        self.push(Boolean::And, cond)
    }

    pub fn where_like(self, field: &str, pattern: impl Into<String>) -> Self {
        let cond = FilterCondition::new(field, Operator::Like, pattern.into());
        self.push(Boolean::And, cond)
    }

    /// Case-insensitive LIKE.
    pub fn where_ilike(self, field: &str, pattern: impl Into<String>) -> Self {
        let cond = FilterCondition::new(field, Operator::ILike, pattern.into());
        self.push(Boolean::And, cond)
    }

    /// Raw sea-query expression.
    pub fn where_expr(mut self, expr: SimpleExpr) -> Self {
        self.wheres.push((Boolean::And, Condition::all().add(expr)));
        self
    }

    pub fn or_where_expr(mut self, expr: SimpleExpr) -> Self {
        self.wheres.push((Boolean::Or, Condition::all().add(expr)));
        self
    }

    /// Parenthesized group: `AND (...)`.
    pub fn where_group<F>(self, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.group(Boolean::And, f)
    }

    /// Parenthesized group: `OR (...)`.
    pub fn or_where_group<F>(self, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.group(Boolean::Or, f)
    }

    fn group<F>(mut self, boolean: Boolean, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        let nested = f(self.nested());
        if let Some(err) = nested.error {
            return self.fail(err);
        }
        if let Some(group) = combine(&nested.wheres) {
            self.wheres.push((boolean, group));
        }
        self
    }

    /// AND a filter tree onto the query.
    pub fn apply_filter(mut self, filter: &Filter) -> Self {
        if filter.root().is_empty() {
            return self;
        }
        let group = {
            let meta = &self.meta;
            filter_condition(self.table_ref(), filter.root(), &|c: &str| meta.db_type(c))
        };
        self.wheres.push((Boolean::And, group));
        self
    }

    // -- relation existence --

    pub fn where_has(self, relation: &str) -> Self {
        self.has(relation, Boolean::And, false, None)
    }

    pub fn or_where_has(self, relation: &str) -> Self {
        self.has(relation, Boolean::Or, false, None)
    }

    /// `where_has` with a constraint on the related query.
    pub fn where_has_constrained<F>(self, relation: &str, f: F) -> Self
    where
        F: Fn(QueryBuilder) -> QueryBuilder + Send + Sync + 'static,
    {
        self.has(relation, Boolean::And, false, Some(Arc::new(f)))
    }

    pub fn where_doesnt_have(self, relation: &str) -> Self {
        self.has(relation, Boolean::And, true, None)
    }

    pub fn where_doesnt_have_constrained<F>(self, relation: &str, f: F) -> Self
    where
        F: Fn(QueryBuilder) -> QueryBuilder + Send + Sync + 'static,
    {
        self.has(relation, Boolean::And, true, Some(Arc::new(f)))
    }

    fn has(
        mut self,
        path: &str,
        boolean: Boolean,
        negate: bool,
        constraint: Option<Constraint>,
    ) -> Self {
        match self.exists_query(path, constraint) {
            Ok(select) => {
                let exists = Expr::exists(select);
                let expr = if negate { exists.not() } else { exists };
                self.wheres.push((boolean, Condition::all().add(expr)));
                self
            }
            Err(err) => self.fail(err),
        }
    }

    /// Correlated `SELECT 1 FROM related WHERE <link>` for a relation path.
    fn exists_query(&self, path: &str, constraint: Option<Constraint>) -> OrmResult<SelectStatement> {
        let (name, rest) = match path.split_once('.') {
            Some((name, rest)) => (name, Some(rest)),
            None => (path, None),
        };
        let def = self.meta.relation(name)?;
        let related_name = def.related().ok_or_else(|| {
            OrmError::InvalidRelation(format!(
                "where_has is not supported on morph_to relation '{name}' of {}",
                self.meta.name
            ))
        })?;
        let related_meta = self.orm.models().resolve(related_name)?;

        let parent = self.table_ref().to_string();
        let mut related = QueryBuilder::new(self.orm.clone(), related_meta);
        if related.meta.table == self.meta.table {
            related.alias = Some(format!("{parent}_{name}"));
        }
        related = match (rest, constraint) {
            (Some(rest), constraint) => related.has(rest, Boolean::And, false, constraint),
            (None, Some(constraint)) => constraint(related),
            (None, None) => related,
        };

        let mut related = related.prepared();
        if let Some(err) = related.error.take() {
            return Err(err);
        }

        let inner = related.table_ref().to_string();
        let col = |table: &str, column: &str| Expr::col((Alias::new(table), Alias::new(column)));
        match def {
            RelationDef::HasOne {
                foreign_key,
                local_key,
                ..
            }
            | RelationDef::HasMany {
                foreign_key,
                local_key,
                ..
            } => {
                related
                    .constraints
                    .push(col(&inner, foreign_key).equals((Alias::new(&parent), Alias::new(local_key))));
            }
            RelationDef::BelongsTo {
                foreign_key,
                owner_key,
                ..
            } => {
                related
                    .constraints
                    .push(col(&inner, owner_key).equals((Alias::new(&parent), Alias::new(foreign_key))));
            }
            RelationDef::MorphOne {
                type_column,
                id_column,
                local_key,
                ..
            }
            | RelationDef::MorphMany {
                type_column,
                id_column,
                local_key,
                ..
            } => {
                related
                    .constraints
                    .push(col(&inner, id_column).equals((Alias::new(&parent), Alias::new(local_key))));
                related
                    .constraints
                    .push(col(&inner, type_column).eq(self.meta.morph_name.clone()));
            }
            RelationDef::BelongsToMany(pivot) => {
                related.constraints.push(
                    col(&pivot.table, &pivot.foreign_pivot_key)
                        .equals((Alias::new(&parent), Alias::new(&pivot.parent_key))),
                );
                related.pivot = Some(pivot.clone());
            }
            RelationDef::MorphTo { .. } => {
                return Err(OrmError::InvalidRelation(format!(
                    "where_has is not supported on morph_to relation '{name}'"
                )));
            }
        }

        let mut select = related.compile_base();
        select.expr(Expr::cust("1"));
        Ok(select)
    }

    // -- selection, ordering, grouping --

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn order_by(self, field: &str) -> Self {
        self.order_by_dir(field, Direction::Asc)
    }

    pub fn order_by_desc(self, field: &str) -> Self {
        self.order_by_dir(field, Direction::Desc)
    }

    pub fn order_by_dir(mut self, field: &str, direction: Direction) -> Self {
        let expr = column(self.table_ref(), field);
        self.orders.push((expr, direction.order()));
        self
    }

    pub fn order_by_expr(mut self, expr: SimpleExpr, direction: Direction) -> Self {
        self.orders.push((expr, direction.order()));
        self
    }

    /// Newest first by `created_at`.
    pub fn latest(self) -> Self {
        self.order_by_desc(CREATED_AT)
    }

    pub fn latest_by(self, field: &str) -> Self {
        self.order_by_desc(field)
    }

    pub fn oldest(self) -> Self {
        self.order_by(CREATED_AT)
    }

    /// Drop every ordering added so far.
    pub fn reorder(mut self) -> Self {
        self.orders.clear();
        self
    }

    pub fn group_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(fields.into_iter().map(Into::into));
        self
    }

    /// HAVING on an output column or alias.
    pub fn having(mut self, field: &str, operator: &str, value: impl Into<JsonValue>) -> Self {
        match Self::condition(field, operator, value.into()) {
            Ok(cond) => {
                let target = Expr::col(Alias::new(field)).into();
                self.havings
                    .push(Condition::all().add(predicate(target, &cond, None)));
                self
            }
            Err(err) => self.fail(err),
        }
    }

    pub fn take(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    // -- scopes --

    /// Apply a local scope declared on the model.
    pub fn scope(self, name: &str) -> Self {
        self.scope_with(name, &[])
    }

    pub fn scope_with(self, name: &str, args: &[JsonValue]) -> Self {
        match self.meta.local_scope(name).cloned() {
            Some(scope) => scope(self, args),
            None => {
                let err = OrmError::InvalidQuery(format!(
                    "Scope '{name}' is not defined on model {}",
                    self.meta.name
                ));
                self.fail(err)
            }
        }
    }

    pub fn with_global_scope(mut self, scope: impl Scope + 'static) -> Self {
        self.extra_scopes.push(Arc::new(scope));
        self
    }

    pub fn without_global_scope(mut self, name: &str) -> Self {
        self.removed_scopes.push(name.to_string());
        self
    }

    pub fn without_global_scopes(mut self) -> Self {
        self.without_all_scopes = true;
        self
    }

    pub fn with_trashed(mut self) -> Self {
        self.trashed = TrashedMode::Include;
        self
    }

    pub fn only_trashed(mut self) -> Self {
        self.trashed = TrashedMode::Only;
        self
    }

    // -- conditional building --

    pub fn when<F>(self, condition: bool, f: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        if condition { f(self) } else { self }
    }

    pub fn when_else<F, G>(self, condition: bool, f: F, otherwise: G) -> Self
    where
        F: FnOnce(Self) -> Self,
        G: FnOnce(Self) -> Self,
    {
        if condition { f(self) } else { otherwise(self) }
    }

    /// Inspect the builder without changing it.
    pub fn tap<F>(self, f: F) -> Self
    where
        F: FnOnce(&Self),
    {
        f(&self);
        self
    }

    // -- eager loading --

    /// Eager load a relation path such as `posts` or `posts.comments`.
    pub fn with_(self, relation: &str) -> Self {
        self.with_path(relation, None)
    }

    /// Eager load with a constraint on the last relation of the path.
    ///
    /// The constraint shapes the one batched query for all parents, so
    /// `take`/`skip` limit the combined result and not each parent's
    /// share of it.
    pub fn with_constrained<F>(self, relation: &str, f: F) -> Self
    where
        F: Fn(QueryBuilder) -> QueryBuilder + Send + Sync + 'static,
    {
        self.with_path(relation, Some(Arc::new(f)))
    }

    pub(crate) fn with_path(mut self, path: &str, constraint: Option<Constraint>) -> Self {
        let root = path.split('.').next().unwrap_or(path);
        if let Err(err) = self.meta.relation(root) {
            return self.fail(err);
        }
        self.eager.push((path.to_string(), constraint));
        self
    }

    // -- pivot --

    pub(crate) fn join_pivot(mut self, pivot: PivotDef) -> Self {
        self.pivot = Some(pivot);
        self
    }

    fn require_pivot(&self, method: &str) -> OrmResult<&PivotDef> {
        self.pivot.as_ref().ok_or_else(|| {
            OrmError::InvalidQuery(format!(
                "{method} requires a many-to-many relation query on {}",
                self.meta.name
            ))
        })
    }

    /// Expose extra pivot columns on loaded records.
    pub fn with_pivot<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Err(err) = self.require_pivot("with_pivot") {
            return self.fail(err);
        }
        if let Some(pivot) = self.pivot.as_mut() {
            for field in fields {
                let field = field.into();
                if !pivot.columns.contains(&field) {
                    pivot.columns.push(field);
                }
            }
        }
        self
    }

    pub fn where_pivot(self, field: &str, operator: &str, value: impl Into<JsonValue>) -> Self {
        match self.require_pivot("where_pivot") {
            Ok(pivot) => {
                let field = format!("{}.{field}", pivot.table);
                self.where_(&field, operator, value)
            }
            Err(err) => self.fail(err),
        }
    }

    pub fn order_by_pivot(self, field: &str, direction: Direction) -> Self {
        match self.require_pivot("order_by_pivot") {
            Ok(pivot) => {
                let field = format!("{}.{field}", pivot.table);
                self.order_by_dir(&field, direction)
            }
            Err(err) => self.fail(err),
        }
    }

    // -- internal constraints --

    /// Condition ANDed outside the user where-group.
    pub(crate) fn constrain(mut self, field: &str, operator: Operator, value: JsonValue) -> Self {
        match FilterCondition::new(field, operator, value) {
            Ok(cond) => {
                let expr = self.compiled(&cond);
                self.constraints.push(expr);
                self
            }
            Err(err) => self.fail(err),
        }
    }

    /// `field = value`, matching nothing when the value is null.
    pub(crate) fn constrain_key(mut self, field: &str, value: JsonValue) -> Self {
        if value.is_null() {
            self.constraints.push(Expr::cust("1 = 0"));
            return self;
        }
        self.constrain(field, Operator::Equal, value)
    }

    pub fn into_aggregate(self) -> AggregateBuilder {
        AggregateBuilder::from_query(self)
    }

    // -- compilation --

    /// Group the user's where clauses and apply global scopes.
    pub(crate) fn prepared(&self) -> QueryBuilder {
        let mut query = self.clone();
        if query.scopes_applied {
            return query;
        }
        query.scopes_applied = true;
        if let Some(group) = combine(&query.wheres) {
            query.wheres = vec![(Boolean::And, group)];
        }
        if query.without_all_scopes {
            return query;
        }

        let scopes: Vec<Arc<dyn Scope>> = query
            .meta
            .global_scopes
            .iter()
            .chain(query.extra_scopes.iter())
            .filter(|scope| !query.removed_scopes.iter().any(|r| r == scope.name()))
            .cloned()
            .collect();
        for scope in scopes {
            if !scope.should_apply(&query) {
                continue;
            }
            let before = query.wheres.len();
            query = scope.apply(query);
            if query.wheres.len() > before {
                let added = query.wheres.split_off(before);
                if let Some(group) = combine(&added) {
                    query.wheres.push((Boolean::And, group));
                }
            }
        }
        query
    }

    /// Prepared query, or the first recorded error.
    pub(crate) fn ready(&self) -> OrmResult<QueryBuilder> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let query = self.prepared();
        match &query.error {
            Some(err) => Err(err.clone()),
            None => Ok(query),
        }
    }

    fn trashed_condition(&self) -> Option<SimpleExpr> {
        if !self.meta.soft_deletes {
            return None;
        }
        let deleted_at = Expr::col((Alias::new(self.table_ref()), Alias::new(DELETED_AT)));
        match self.trashed {
            TrashedMode::Exclude => Some(deleted_at.is_null()),
            TrashedMode::Only => Some(deleted_at.is_not_null()),
            TrashedMode::Include => None,
        }
    }

    pub(crate) fn where_condition(&self) -> Option<Condition> {
        let mut parts: Vec<Condition> = Vec::new();
        parts.extend(combine(&self.wheres));
        parts.extend(
            self.constraints
                .iter()
                .map(|expr| Condition::all().add(expr.clone())),
        );
        parts.extend(self.trashed_condition().map(|expr| Condition::all().add(expr)));
        all_of(parts)
    }

    /// FROM, joins, WHERE, GROUP BY, HAVING, ORDER BY and paging; no columns.
    pub(crate) fn compile_base(&self) -> SelectStatement {
        let mut select = Query::select();
        let table = self.table_ref().to_string();
        match &self.alias {
            Some(alias) => {
                select.from_as(Alias::new(&self.meta.table), Alias::new(alias));
            }
            None => {
                select.from(Alias::new(&self.meta.table));
            }
        }
        if let Some(pivot) = &self.pivot {
            select.inner_join(
                Alias::new(&pivot.table),
                Expr::col((Alias::new(&pivot.table), Alias::new(&pivot.related_pivot_key)))
                    .equals((Alias::new(&table), Alias::new(&pivot.related_key))),
            );
        }
        if let Some(condition) = self.where_condition() {
            select.cond_where(condition);
        }
        if !self.groups.is_empty() {
            select.add_group_by(self.groups.iter().map(|g| column(&table, g)));
        }
        for having in &self.havings {
            select.cond_having(having.clone());
        }
        for (expr, order) in &self.orders {
            select.order_by_expr(expr.clone(), order.clone());
        }
        if let Some(limit) = self.limit {
            select.limit(limit);
        }
        if let Some(offset) = self.offset {
            select.offset(offset);
        }
        select
    }

    pub(crate) fn compile_select(&self) -> SelectStatement {
        let mut select = self.compile_base();
        let table = self.table_ref();
        if self.columns.is_empty() {
            select.column((Alias::new(table), Asterisk));
        } else {
            for field in &self.columns {
                select.expr(column(table, field));
            }
        }
        if let Some(pivot) = &self.pivot {
            for field in pivot.selected_columns() {
                select.expr_as(
                    column(&pivot.table, &field),
                    Alias::new(format!("pivot_{field}")),
                );
            }
        }
        if self.distinct {
            select.distinct();
        }
        select
    }

    fn statement(&self, select: &SelectStatement) -> OrmResult<(&DbConn, Statement)> {
        let conn = self.orm.connection_for(&self.meta)?;
        Ok((conn, executor::build(conn.get_database_backend(), select)))
    }

    pub(crate) fn backend(&self) -> OrmResult<DbBackend> {
        Ok(self.orm.connection_for(&self.meta)?.get_database_backend())
    }

    fn hydrate(&self, mut attributes: Attributes) -> Record {
        let pivot = self.pivot.as_ref().map(|pivot| {
            pivot
                .selected_columns()
                .into_iter()
                .filter_map(|field| {
                    attributes
                        .remove(&format!("pivot_{field}"))
                        .map(|value| (field, value))
                })
                .collect::<Attributes>()
        });
        let mut record = Record::from_database(Arc::clone(&self.meta), attributes);
        if let Some(pivot) = pivot {
            record.set_pivot(pivot);
        }
        record
    }

    /// Rendered SQL with values inlined.
    pub fn to_sql(&self) -> OrmResult<String> {
        let query = self.ready()?;
        let (_, stmt) = query.statement(&query.compile_select())?;
        Ok(stmt.to_string())
    }

    // -- fetching --

    pub async fn get(self) -> OrmResult<Vec<Record>> {
        let query = self.ready()?;
        let (conn, stmt) = query.statement(&query.compile_select())?;
        let rows = executor::fetch_all(conn, stmt).await?;
        let mut records: Vec<Record> = rows.into_iter().map(|row| query.hydrate(row)).collect();
        tracing::debug!(model = %query.meta.name, count = records.len(), "Fetched records");
        if !query.eager.is_empty() && !records.is_empty() {
            eager::load(&query.orm, &mut records, query.eager.clone()).await?;
        }
        Ok(records)
    }

    pub async fn first(self) -> OrmResult<Option<Record>> {
        Ok(self.take(1).get().await?.into_iter().next())
    }

    pub async fn first_or_fail(self) -> OrmResult<Record> {
        let model = self.meta.name.clone();
        self.first()
            .await?
            .ok_or_else(|| OrmError::model_not_found(model, "first"))
    }

    /// Find by primary key.
    pub async fn find(self, id: impl Into<JsonValue>) -> OrmResult<Option<Record>> {
        let key = self.meta.primary_key.clone();
        self.where_eq(&key, id).first().await
    }

    pub async fn find_or_fail(self, id: impl Into<JsonValue>) -> OrmResult<Record> {
        let id = id.into();
        let model = self.meta.name.clone();
        let shown = key_string(&id).unwrap_or_else(|| "null".to_string());
        self.find(id)
            .await?
            .ok_or_else(|| OrmError::model_not_found(model, shown))
    }

    pub async fn find_many<I, V>(self, ids: I) -> OrmResult<Vec<Record>>
    where
        I: IntoIterator<Item = V>,
        V: Into<JsonValue>,
    {
        let key = self.meta.primary_key.clone();
        self.where_in(&key, ids).get().await
    }

    /// Values of one column, casts applied.
    pub async fn pluck(self, field: &str) -> OrmResult<Vec<JsonValue>> {
        let query = self.ready()?;
        let (_, name) = split_column(query.table_ref(), field);
        let name = name.to_string();

        let mut select = query.compile_base();
        select.expr_as(column(query.table_ref(), field), Alias::new(&name));
        if query.distinct {
            select.distinct();
        }
        let (conn, stmt) = query.statement(&select)?;
        let rows = executor::fetch_all(conn, stmt).await?;
        rows.into_iter()
            .map(|mut row| {
                let raw = row.remove(&name).unwrap_or(JsonValue::Null);
                match query.meta.cast(&name) {
                    Some(cast) => cast.to_model(&raw),
                    None => Ok(raw),
                }
            })
            .collect()
    }

    /// First row's value of one column.
    pub async fn value(self, field: &str) -> OrmResult<Option<JsonValue>> {
        Ok(self.take(1).pluck(field).await?.into_iter().next())
    }

    pub async fn exists(self) -> OrmResult<bool> {
        let query = self.ready()?.take(1);
        let mut select = query.compile_base();
        select.expr(Expr::cust("1"));
        let (conn, stmt) = query.statement(&select)?;
        Ok(!executor::query_all(conn, stmt).await?.is_empty())
    }

    pub async fn doesnt_exist(self) -> OrmResult<bool> {
        Ok(!self.exists().await?)
    }

    // -- aggregates --

    pub async fn count(self) -> OrmResult<u64> {
        let query = self.ready()?;
        let mut inner = query.clone();
        inner.orders.clear();
        inner.limit = None;
        inner.offset = None;

        let mut select = Query::select();
        select
            .expr_as(Expr::cust("COUNT(*)"), Alias::new(AGGREGATE))
            .from_subquery(inner.compile_select(), Alias::new("aggregate_table"));
        let (conn, stmt) = query.statement(&select)?;
        let count = match executor::query_one(conn, stmt).await? {
            Some(row) => row.try_get::<i64>("", AGGREGATE).map_err(db_error)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn scalar(self, expr: SimpleExpr) -> OrmResult<Option<Attributes>> {
        let mut query = self.ready()?;
        query.orders.clear();
        query.limit = None;
        query.offset = None;
        let mut select = query.compile_base();
        select.expr_as(expr, Alias::new(AGGREGATE));
        let (conn, stmt) = query.statement(&select)?;
        executor::fetch_one(conn, stmt).await
    }

    async fn float_scalar(self, expr: SimpleExpr) -> OrmResult<Option<f64>> {
        let backend = self.backend()?;
        let expr = Func::cast_as(expr, Alias::new(float_type(backend))).into();
        let row = self.scalar(expr).await?;
        Ok(row
            .and_then(|mut row| row.remove(AGGREGATE))
            .and_then(|value| quarry_core::value::as_f64(&value)))
    }

    pub async fn max(self, field: &str) -> OrmResult<Option<JsonValue>> {
        let expr = Func::max(column(self.table_ref(), field)).into();
        let row = self.scalar(expr).await?;
        Ok(row
            .and_then(|mut row| row.remove(AGGREGATE))
            .filter(|value| !value.is_null()))
    }

    pub async fn min(self, field: &str) -> OrmResult<Option<JsonValue>> {
        let expr = Func::min(column(self.table_ref(), field)).into();
        let row = self.scalar(expr).await?;
        Ok(row
            .and_then(|mut row| row.remove(AGGREGATE))
            .filter(|value| !value.is_null()))
    }

    pub async fn sum(self, field: &str) -> OrmResult<Option<f64>> {
        let expr = Func::sum(column(self.table_ref(), field)).into();
        self.float_scalar(expr).await
    }

    pub async fn avg(self, field: &str) -> OrmResult<Option<f64>> {
        let expr = Func::avg(column(self.table_ref(), field)).into();
        self.float_scalar(expr).await
    }

    // -- paging --

    /// Count the unpaged query, then fetch one page.
    pub async fn paginate(self, page: u64, per_page: u64) -> OrmResult<LengthAwarePaginator<Record>> {
        if page == 0 || per_page == 0 {
            return Err(OrmError::InvalidQuery(
                "page and per_page must be at least 1".to_string(),
            ));
        }
        let offset = (page - 1).checked_mul(per_page).ok_or_else(|| {
            OrmError::InvalidQuery(format!("page {page} is out of range for per_page {per_page}"))
        })?;
        let query = self.ready()?;
        let total = query.clone().count().await?;
        let items = query
            .skip(offset)
            .take(per_page)
            .get()
            .await?;
        LengthAwarePaginator::new(items, total, page, per_page)
    }

    /// Keyset pagination on `field`. `before` walks backwards; the page is
    /// always returned in ascending order.
    pub async fn cursor_paginate(
        self,
        field: &str,
        limit: u64,
        after: Option<JsonValue>,
        before: Option<JsonValue>,
    ) -> OrmResult<CursorPaginator<Record>> {
        if limit == 0 {
            return Err(OrmError::InvalidQuery("limit must be at least 1".to_string()));
        }
        let fetch = limit
            .checked_add(1)
            .ok_or_else(|| OrmError::InvalidQuery(format!("limit {limit} is out of range")))?;
        let backwards = before.is_some();
        let has_after = after.is_some();

        let query = self.ready()?.reorder();
        let query = match (after, before) {
            (_, Some(cursor)) => query.where_(field, "<", cursor).order_by_desc(field),
            (Some(cursor), None) => query.where_(field, ">", cursor).order_by(field),
            (None, None) => query.order_by(field),
        };

        let mut items = query.take(fetch).get().await?;
        let has_more = items.len() as u64 > limit;
        items.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        if backwards {
            items.reverse();
        }

        let name = field.rsplit('.').next().unwrap_or(field);
        let cursor_of =
            |record: Option<&Record>| record.and_then(|r| r.get(name)).and_then(key_string);
        let (next, previous) = if backwards {
            (
                cursor_of(items.last()),
                if has_more { cursor_of(items.first()) } else { None },
            )
        } else {
            (
                if has_more { cursor_of(items.last()) } else { None },
                if has_after { cursor_of(items.first()) } else { None },
            )
        };
        Ok(CursorPaginator::new(items, has_more, name, limit, next, previous))
    }

    fn ordered_by_key(self) -> Self {
        if self.orders.is_empty() {
            let key = self.meta.primary_key.clone();
            self.order_by(&key)
        } else {
            self
        }
    }

    /// Process results page by page. Returning `false` stops.
    pub async fn chunk<F, Fut>(self, size: u64, mut callback: F) -> OrmResult<()>
    where
        F: FnMut(Vec<Record>) -> Fut,
        Fut: Future<Output = OrmResult<bool>>,
    {
        if size == 0 {
            return Err(OrmError::InvalidQuery("chunk size must be at least 1".to_string()));
        }
        let query = self.ready()?.ordered_by_key();
        let mut page: u64 = 0;
        loop {
            let records = query.clone().skip(page.saturating_mul(size)).take(size).get().await?;
            let fetched = records.len() as u64;
            if fetched == 0 || !callback(records).await? || fetched < size {
                break;
            }
            page += 1;
        }
        Ok(())
    }

    /// Process results one record at a time, fetched in chunks of `size`.
    pub async fn each<F, Fut>(self, size: u64, mut callback: F) -> OrmResult<()>
    where
        F: FnMut(Record) -> Fut,
        Fut: Future<Output = OrmResult<bool>>,
    {
        if size == 0 {
            return Err(OrmError::InvalidQuery("chunk size must be at least 1".to_string()));
        }
        let query = self.ready()?.ordered_by_key();
        let mut page: u64 = 0;
        loop {
            let records = query.clone().skip(page.saturating_mul(size)).take(size).get().await?;
            let fetched = records.len() as u64;
            for record in records {
                if !callback(record).await? {
                    return Ok(());
                }
            }
            if fetched < size {
                return Ok(());
            }
            page += 1;
        }
    }

    // -- mass writes --

    /// Rows matched by a write: the where clause, or a key subquery when
    /// the query joins or pages.
    fn write_condition(&self) -> Option<Condition> {
        let needs_keys = self.pivot.is_some()
            || self.limit.is_some()
            || self.offset.is_some()
            || self.alias.is_some();
        if !needs_keys {
            return self.where_condition();
        }
        let mut keys = self.compile_base();
        keys.expr(column(self.table_ref(), &self.meta.primary_key));
        let key = Expr::col((Alias::new(&self.meta.table), Alias::new(&self.meta.primary_key)));
        Some(Condition::all().add(key.in_subquery(keys)))
    }

    async fn run_update(&self, values: Attributes) -> OrmResult<u64> {
        if values.is_empty() {
            return Ok(0);
        }
        let meta = &self.meta;
        let mut assignments = Vec::with_capacity(values.len());
        for (key, value) in &values {
            let value = match meta.cast(key) {
                Some(cast) => cast.to_database(value)?,
                None => value.clone(),
            };
            assignments.push((Alias::new(key), value_expr(&value, meta.db_type(key))));
        }

        let mut stmt = Query::update();
        stmt.table(Alias::new(&meta.table)).values(assignments);
        if let Some(condition) = self.write_condition() {
            stmt.cond_where(condition);
        }
        let conn = self.orm.connection_for(meta)?;
        let result = executor::execute(conn, executor::build(conn.get_database_backend(), &stmt)).await?;
        tracing::debug!(model = %meta.name, rows = result.rows_affected(), "Mass update");
        Ok(result.rows_affected())
    }

    /// Mass update; bumps `updated_at`. Model events do not fire.
    pub async fn update(self, values: Attributes) -> OrmResult<u64> {
        let query = self.ready()?;
        let mut values = values;
        if query.meta.timestamps && !values.contains_key(UPDATED_AT) {
            values.insert(UPDATED_AT.to_string(), now());
        }
        query.run_update(values).await
    }

    /// Mass delete; soft when the model soft-deletes.
    pub async fn delete(self) -> OrmResult<u64> {
        if !self.meta.soft_deletes {
            return self.force_delete().await;
        }
        let query = self.ready()?;
        let stamp = now();
        let mut values = Attributes::new();
        values.insert(DELETED_AT.to_string(), stamp.clone());
        if query.meta.timestamps {
            values.insert(UPDATED_AT.to_string(), stamp);
        }
        query.run_update(values).await
    }

    pub async fn force_delete(self) -> OrmResult<u64> {
        let query = self.ready()?;
        let mut stmt = Query::delete();
        stmt.from_table(Alias::new(&query.meta.table));
        if let Some(condition) = query.write_condition() {
            stmt.cond_where(condition);
        }
        let conn = query.orm.connection_for(&query.meta)?;
        let result = executor::execute(conn, executor::build(conn.get_database_backend(), &stmt)).await?;
        tracing::debug!(model = %query.meta.name, rows = result.rows_affected(), "Mass delete");
        Ok(result.rows_affected())
    }

    /// Clear `deleted_at` on matching trashed rows.
    pub async fn restore(self) -> OrmResult<u64> {
        if !self.meta.soft_deletes {
            return Err(OrmError::InvalidQuery(format!(
                "Model {} does not use soft deletes",
                self.meta.name
            )));
        }
        let query = self.only_trashed().ready()?;
        let mut values = Attributes::new();
        values.insert(DELETED_AT.to_string(), JsonValue::Null);
        if query.meta.timestamps {
            values.insert(UPDATED_AT.to_string(), now());
        }
        query.run_update(values).await
    }
}

/// Floating point type name used to read SUM / AVG portably.
fn float_type(backend: DbBackend) -> &'static str {
    match backend {
        DbBackend::Postgres => "double precision",
        DbBackend::MySql => "DOUBLE",
        _ => "REAL",
    }
}
