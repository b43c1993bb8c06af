use sea_orm::sea_query::{Alias, Condition, Expr, Func, SelectStatement, SimpleExpr};
use sea_orm::{ConnectionTrait, DbBackend};

use quarry_core::{Attributes, JsonValue, OrmError, OrmResult};

use super::QueryBuilder;
use super::clause::{Direction, column, predicate};
use crate::database::executor;

/// Aggregate function of a select expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFn::Count => "count",
            AggregateFn::Sum => "sum",
            AggregateFn::Avg => "avg",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
        }
    }
}

#[derive(Debug, Clone)]
struct Aggregate {
    function: AggregateFn,
    field: String,
    alias: String,
}

/// Grouped aggregate report over a model.
///
/// ```no_run
/// # async fn run(orm: quarry_orm::Orm) -> quarry_core::OrmResult<()> {
/// let rows = orm
///     .aggregate("Order")?
///     .group_by(["status"])
///     .count("*")
///     .sum("total")
///     .having("sum_total", ">", 1000)
///     .order_by("sum_total", quarry_orm::query::Direction::Desc)
///     .get()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AggregateBuilder {
    query: QueryBuilder,
    selects: Vec<String>,
    aggregates: Vec<Aggregate>,
    groups: Vec<String>,
    havings: Vec<(String, String, JsonValue)>,
    orders: Vec<(String, Direction)>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl AggregateBuilder {
    /// Aggregate over a query; its where clauses, scopes and soft-delete
    /// constraint carry over.
    pub fn from_query(query: QueryBuilder) -> Self {
        Self {
            query,
            selects: Vec::new(),
            aggregates: Vec::new(),
            groups: Vec::new(),
            havings: Vec::new(),
            orders: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Plain output columns.
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selects.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Add an aggregate. The alias defaults to `{fn}_{field}`, or `count`
    /// for `COUNT(*)`.
    pub fn aggregate(mut self, function: AggregateFn, field: &str, alias: Option<&str>) -> Self {
        let alias = match alias {
            Some(alias) => alias.to_string(),
            None if field == "*" => function.as_str().to_string(),
            None => format!("{}_{}", function.as_str(), field.replace('.', "_")),
        };
        self.aggregates.push(Aggregate {
            function,
            field: field.to_string(),
            alias,
        });
        self
    }

    pub fn count(self, field: &str) -> Self {
        self.aggregate(AggregateFn::Count, field, None)
    }

    pub fn count_as(self, field: &str, alias: &str) -> Self {
        self.aggregate(AggregateFn::Count, field, Some(alias))
    }

    pub fn sum(self, field: &str) -> Self {
        self.aggregate(AggregateFn::Sum, field, None)
    }

    pub fn sum_as(self, field: &str, alias: &str) -> Self {
        self.aggregate(AggregateFn::Sum, field, Some(alias))
    }

    pub fn avg(self, field: &str) -> Self {
        self.aggregate(AggregateFn::Avg, field, None)
    }

    pub fn avg_as(self, field: &str, alias: &str) -> Self {
        self.aggregate(AggregateFn::Avg, field, Some(alias))
    }

    pub fn min(self, field: &str) -> Self {
        self.aggregate(AggregateFn::Min, field, None)
    }

    pub fn max(self, field: &str) -> Self {
        self.aggregate(AggregateFn::Max, field, None)
    }

    /// Group columns are selected as well.
    pub fn group_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn where_(mut self, field: &str, operator: &str, value: impl Into<JsonValue>) -> Self {
        self.query = self.query.where_(field, operator, value);
        self
    }

    pub fn where_eq(self, field: &str, value: impl Into<JsonValue>) -> Self {
        self.where_(field, "=", value)
    }

    /// Refine the underlying query with any builder method.
    pub fn filter<F>(mut self, f: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.query = f(self.query);
        self
    }

    /// HAVING on an aggregate alias or a group column.
    pub fn having(mut self, field: &str, operator: &str, value: impl Into<JsonValue>) -> Self {
        self.havings
            .push((field.to_string(), operator.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.orders.push((field.to_string(), direction));
        self
    }

    pub fn take(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    fn aggregate_expr(&self, aggregate: &Aggregate, table: &str, backend: DbBackend) -> SimpleExpr {
        if aggregate.field == "*" {
            return Expr::cust("COUNT(*)");
        }
        let target = column(table, &aggregate.field);
        let float = Alias::new(match backend {
            DbBackend::Postgres => "double precision",
            DbBackend::MySql => "DOUBLE",
            _ => "REAL",
        });
        match aggregate.function {
            AggregateFn::Count => Func::count(target).into(),
            AggregateFn::Sum => Func::cast_as(Func::sum(target), float).into(),
            AggregateFn::Avg => Func::cast_as(Func::avg(target), float).into(),
            AggregateFn::Min => Func::min(target).into(),
            AggregateFn::Max => Func::max(target).into(),
        }
    }

    /// The target of a HAVING / ORDER BY reference.
    fn reference(&self, field: &str, table: &str, backend: DbBackend) -> SimpleExpr {
        match self.aggregates.iter().find(|a| a.alias == field) {
            Some(aggregate) => self.aggregate_expr(aggregate, table, backend),
            None => column(table, field),
        }
    }

    fn compile(&self) -> OrmResult<(QueryBuilder, SelectStatement)> {
        if self.aggregates.is_empty() {
            return Err(OrmError::InvalidQuery(
                "Aggregate query needs at least one aggregate function".to_string(),
            ));
        }
        let query = self.query.ready()?.reorder();
        let backend = query.backend()?;
        let table = query.table_ref().to_string();

        let mut select = query.compile_base();
        let mut outputs: Vec<&String> = Vec::new();
        for field in self.groups.iter().chain(self.selects.iter()) {
            if outputs.contains(&field) {
                continue;
            }
            outputs.push(field);
            let name = field.rsplit('.').next().unwrap_or(field);
            select.expr_as(column(&table, field), Alias::new(name));
        }
        for aggregate in &self.aggregates {
            select.expr_as(
                self.aggregate_expr(aggregate, &table, backend),
                Alias::new(&aggregate.alias),
            );
        }
        if !self.groups.is_empty() {
            select.add_group_by(self.groups.iter().map(|g| column(&table, g)));
        }
        for (field, operator, value) in &self.havings {
            let cond = quarry_core::FilterCondition::parse(field.clone(), operator, value.clone())?;
            let target = self.reference(field, &table, backend);
            select.cond_having(Condition::all().add(predicate(target, &cond, None)));
        }
        for (field, direction) in &self.orders {
            let target = if self.aggregates.iter().any(|a| &a.alias == field) {
                Expr::col(Alias::new(field)).into()
            } else {
                column(&table, field)
            };
            select.order_by_expr(target, direction.order());
        }
        if let Some(limit) = self.limit {
            select.limit(limit);
        }
        if let Some(offset) = self.offset {
            select.offset(offset);
        }
        Ok((query, select))
    }

    /// All grouped rows.
    pub async fn get(self) -> OrmResult<Vec<Attributes>> {
        let (query, select) = self.compile()?;
        let conn = query.orm().connection_for(query.meta())?;
        let stmt = executor::build(conn.get_database_backend(), &select);
        executor::fetch_all(conn, stmt).await
    }

    pub async fn first(self) -> OrmResult<Option<Attributes>> {
        Ok(self.take(1).get().await?.into_iter().next())
    }

    pub fn to_sql(&self) -> OrmResult<String> {
        let (query, select) = self.compile()?;
        Ok(executor::build(query.backend()?, &select).to_string())
    }
}
