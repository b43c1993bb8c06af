//! Compilation of filter conditions into sea-query expressions.

use std::str::FromStr;

use sea_orm::sea_query::{Alias, Condition, Expr, Func, Order, SimpleExpr};

use quarry_core::{
    DbType, FilterCondition, FilterGroup, FilterNode, JsonValue, LogicalOperator, Operator,
    OrmError,
};

use crate::database::values::value_expr;

/// How a where clause joins the clauses before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boolean {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub(crate) fn order(self) -> Order {
        match self {
            Direction::Asc => Order::Asc,
            Direction::Desc => Order::Desc,
        }
    }
}

impl FromStr for Direction {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            other => Err(OrmError::InvalidQuery(format!(
                "Order direction must be 'asc' or 'desc', got '{other}'"
            ))),
        }
    }
}

/// Split `table.column`; bare columns belong to `default_table`.
pub(crate) fn split_column<'a>(default_table: &'a str, column: &'a str) -> (&'a str, &'a str) {
    column.rsplit_once('.').unwrap_or((default_table, column))
}

/// Qualified column expression.
pub(crate) fn column(default_table: &str, column: &str) -> SimpleExpr {
    let (table, column) = split_column(default_table, column);
    Expr::col((Alias::new(table), Alias::new(column))).into()
}

fn pattern(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `target <op> value` for one validated condition.
pub(crate) fn predicate(target: SimpleExpr, cond: &FilterCondition, hint: Option<DbType>) -> SimpleExpr {
    let bind = |value: &JsonValue| value_expr(value, hint);
    let target = Expr::expr(target);
    match cond.operator() {
        Operator::Equal => target.eq(bind(cond.value())),
        Operator::NotEqual => target.ne(bind(cond.value())),
        Operator::GreaterThan => target.gt(bind(cond.value())),
        Operator::GreaterThanOrEqual => target.gte(bind(cond.value())),
        Operator::LessThan => target.lt(bind(cond.value())),
        Operator::LessThanOrEqual => target.lte(bind(cond.value())),
        Operator::Like => target.like(pattern(cond.value())),
        // portable ILIKE
        Operator::ILike => {
            Expr::expr(Func::lower(target)).like(pattern(cond.value()).to_lowercase())
        }
        Operator::In => target.is_in(cond.values().iter().map(bind)),
        Operator::NotIn => target.is_not_in(cond.values().iter().map(bind)),
        Operator::Null => target.is_null(),
        Operator::NotNull => target.is_not_null(),
        Operator::Between | Operator::NotBetween => {
            let (low, high) = cond
                .bounds()
                .unwrap_or((&JsonValue::Null, &JsonValue::Null));
            if cond.operator() == Operator::Between {
                target.between(bind(low), bind(high))
            } else {
                target.not_between(bind(low), bind(high))
            }
        }
    }
}

/// Condition on a column of `table`, with the value bound using `hint`.
pub(crate) fn column_predicate<H>(table: &str, cond: &FilterCondition, hint: H) -> SimpleExpr
where
    H: Fn(&str) -> Option<DbType>,
{
    let (_, name) = split_column(table, cond.field());
    predicate(column(table, cond.field()), cond, hint(name))
}

/// Compile a filter tree against the columns of `table`.
pub(crate) fn filter_condition<H>(table: &str, group: &FilterGroup, hint: &H) -> Condition
where
    H: Fn(&str) -> Option<DbType>,
{
    let mut condition = match group.operator {
        LogicalOperator::And => Condition::all(),
        LogicalOperator::Or => Condition::any(),
    };
    for node in &group.conditions {
        condition = match node {
            FilterNode::Group(inner) => condition.add(filter_condition(table, inner, hint)),
            FilterNode::Condition(cond) => condition.add(column_predicate(table, cond, hint)),
        };
    }
    condition
}

/// Combine where clauses: AND-runs separated by OR clauses.
///
/// `a AND b OR c` becomes `(a AND b) OR c`.
pub(crate) fn combine(wheres: &[(Boolean, Condition)]) -> Option<Condition> {
    let mut branches: Vec<Condition> = Vec::new();
    let mut current: Option<Condition> = None;

    for (boolean, clause) in wheres {
        current = match (current.take(), boolean) {
            (Some(run), Boolean::Or) => {
                branches.push(run);
                Some(Condition::all().add(clause.clone()))
            }
            (Some(run), Boolean::And) => Some(run.add(clause.clone())),
            (None, _) => Some(Condition::all().add(clause.clone())),
        };
    }
    branches.extend(current);

    match branches.len() {
        0 => None,
        1 => branches.pop(),
        _ => Some(
            branches
                .into_iter()
                .fold(Condition::any(), |any, branch| any.add(branch)),
        ),
    }
}

/// AND every present condition together.
pub(crate) fn all_of(parts: impl IntoIterator<Item = Condition>) -> Option<Condition> {
    let mut parts = parts.into_iter().peekable();
    parts.peek()?;
    Some(parts.fold(Condition::all(), |all, part| all.add(part)))
}
