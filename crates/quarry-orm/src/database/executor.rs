//! Statement execution and error mapping.

use sea_orm::{
    ConnectionTrait, DbBackend, DbErr, ExecResult, QueryResult, SqlErr, Statement,
    StatementBuilder,
};

use quarry_core::{Attributes, OrmError, OrmResult};

use super::values::row_to_attributes;

/// Map a SeaORM error onto the ORM error taxonomy.
pub fn db_error(err: DbErr) -> OrmError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(msg)) => return OrmError::Constraint(msg),
        Some(SqlErr::ForeignKeyConstraintViolation(msg)) => return OrmError::Constraint(msg),
        _ => {}
    }

    match err {
        DbErr::Conn(e) => OrmError::Connection(e.to_string()),
        DbErr::ConnectionAcquire(e) => OrmError::Connection(e.to_string()),
        other => {
            let message = other.to_string();
            let lowered = message.to_lowercase();
            if lowered.contains("deadlock") {
                OrmError::Deadlock(message)
            } else if lowered.contains("duplicate") || lowered.contains("unique constraint") {
                OrmError::Constraint(message)
            } else {
                OrmError::Query(message)
            }
        }
    }
}

pub fn build<S: StatementBuilder>(backend: DbBackend, stmt: &S) -> Statement {
    backend.build(stmt)
}

pub async fn query_all<C: ConnectionTrait>(conn: &C, stmt: Statement) -> OrmResult<Vec<QueryResult>> {
    tracing::debug!(sql = %stmt.sql, "Executing query");
    conn.query_all(stmt).await.map_err(db_error)
}

pub async fn query_one<C: ConnectionTrait>(conn: &C, stmt: Statement) -> OrmResult<Option<QueryResult>> {
    tracing::debug!(sql = %stmt.sql, "Executing query");
    conn.query_one(stmt).await.map_err(db_error)
}

pub async fn fetch_all<C: ConnectionTrait>(conn: &C, stmt: Statement) -> OrmResult<Vec<Attributes>> {
    query_all(conn, stmt)
        .await?
        .iter()
        .map(row_to_attributes)
        .collect()
}

pub async fn fetch_one<C: ConnectionTrait>(conn: &C, stmt: Statement) -> OrmResult<Option<Attributes>> {
    query_one(conn, stmt)
        .await?
        .as_ref()
        .map(row_to_attributes)
        .transpose()
}

pub async fn execute<C: ConnectionTrait>(conn: &C, stmt: Statement) -> OrmResult<ExecResult> {
    tracing::debug!(sql = %stmt.sql, "Executing statement");
    conn.execute(stmt).await.map_err(db_error)
}
