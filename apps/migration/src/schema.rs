//! Table builders used by the migrations.
//!
//! ```ignore
//! Schema::new(manager)
//!     .create_table(
//!         Blueprint::new("posts")
//!             .id()
//!             .column(Column::string("title"))
//!             .column(Column::integer("views").default(0))
//!             .foreign("user_id", "users")
//!             .timestamps()
//!             .soft_deletes(),
//!     )
//!     .await?;
//! ```

use sea_orm_migration::prelude::{
    Alias, ColumnDef, DbErr, Expr, ForeignKey, ForeignKeyAction, ForeignKeyCreateStatement,
    SchemaManager, SimpleExpr, Table, TableAlterStatement, TableCreateStatement,
};

/// One column definition with chainable modifiers.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    def: ColumnDef,
}

impl Column {
    fn typed(name: &str, f: impl FnOnce(&mut ColumnDef) -> &mut ColumnDef) -> Self {
        let mut def = ColumnDef::new(Alias::new(name));
        f(&mut def);
        Self {
            name: name.to_string(),
            def,
        }
    }

    fn modify(mut self, f: impl FnOnce(&mut ColumnDef) -> &mut ColumnDef) -> Self {
        f(&mut self.def);
        self
    }

    /// Auto-incrementing integer primary key.
    pub fn increments(name: &str) -> Self {
        Self::typed(name, |c| c.integer().not_null().auto_increment().primary_key())
    }

    pub fn big_increments(name: &str) -> Self {
        Self::typed(name, |c| c.big_integer().not_null().auto_increment().primary_key())
    }

    pub fn integer(name: &str) -> Self {
        Self::typed(name, |c| c.integer())
    }

    pub fn big_integer(name: &str) -> Self {
        Self::typed(name, |c| c.big_integer())
    }

    /// `VARCHAR(255)`.
    pub fn string(name: &str) -> Self {
        Self::string_len(name, 255)
    }

    pub fn string_len(name: &str, length: u32) -> Self {
        Self::typed(name, |c| c.string_len(length))
    }

    pub fn text(name: &str) -> Self {
        Self::typed(name, |c| c.text())
    }

    pub fn boolean(name: &str) -> Self {
        Self::typed(name, |c| c.boolean())
    }

    pub fn datetime(name: &str) -> Self {
        Self::typed(name, |c| c.timestamp_with_time_zone())
    }

    pub fn date(name: &str) -> Self {
        Self::typed(name, |c| c.date())
    }

    pub fn decimal(name: &str, precision: u32, scale: u32) -> Self {
        Self::typed(name, |c| c.decimal_len(precision, scale))
    }

    pub fn float(name: &str) -> Self {
        Self::typed(name, |c| c.double())
    }

    pub fn json(name: &str) -> Self {
        Self::typed(name, |c| c.json_binary())
    }

    pub fn uuid(name: &str) -> Self {
        Self::typed(name, |c| c.uuid())
    }

    pub fn nullable(self) -> Self {
        self.modify(|c| c.null())
    }

    pub fn not_null(self) -> Self {
        self.modify(|c| c.not_null())
    }

    pub fn unique(self) -> Self {
        self.modify(|c| c.unique_key())
    }

    pub fn primary_key(self) -> Self {
        self.modify(|c| c.primary_key())
    }

    pub fn default(self, value: impl Into<SimpleExpr>) -> Self {
        self.modify(|c| c.default(value))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn into_def(self) -> ColumnDef {
        self.def
    }
}

#[derive(Debug, Clone)]
struct ForeignSpec {
    column: String,
    table: String,
    references: String,
    on_delete: ForeignKeyAction,
}

/// Conventional constraint name for a foreign key on `table.column`.
pub fn foreign_key_name(table: &str, column: &str) -> String {
    format!("fk_{table}_{column}")
}

fn foreign_key_statement(spec: &ForeignSpec, table: &str) -> ForeignKeyCreateStatement {
    ForeignKey::create()
        .name(foreign_key_name(table, &spec.column))
        .from(Alias::new(table), Alias::new(&spec.column))
        .to(Alias::new(&spec.table), Alias::new(&spec.references))
        .on_delete(spec.on_delete)
        .to_owned()
}

/// Definition of a new table.
#[derive(Debug, Clone)]
pub struct Blueprint {
    table: String,
    columns: Vec<Column>,
    foreign_keys: Vec<ForeignSpec>,
}

impl Blueprint {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn columns(mut self, columns: impl IntoIterator<Item = Column>) -> Self {
        self.columns.extend(columns);
        self
    }

    /// `id` auto-incrementing primary key.
    pub fn id(self) -> Self {
        self.column(Column::increments("id"))
    }

    /// Nullable `created_at` and `updated_at`.
    pub fn timestamps(self) -> Self {
        self.column(Column::datetime("created_at").nullable())
            .column(Column::datetime("updated_at").nullable())
    }

    /// Nullable `deleted_at`.
    pub fn soft_deletes(self) -> Self {
        self.column(Column::datetime("deleted_at").nullable())
    }

    /// Integer column referencing `table.id`, deleted in cascade.
    pub fn foreign(self, column: &str, table: &str) -> Self {
        self.foreign_with(column, table, "id", ForeignKeyAction::Cascade)
    }

    pub fn foreign_with(
        mut self,
        column: &str,
        table: &str,
        references: &str,
        on_delete: ForeignKeyAction,
    ) -> Self {
        self.columns.push(Column::integer(column).not_null());
        self.foreign_keys.push(ForeignSpec {
            column: column.to_string(),
            table: table.to_string(),
            references: references.to_string(),
            on_delete,
        });
        self
    }

    /// `{name}_type` / `{name}_id` pair of a polymorphic relation.
    pub fn morphs(self, name: &str) -> Self {
        self.column(Column::string(&format!("{name}_type")).not_null())
            .column(Column::integer(&format!("{name}_id")).not_null())
    }

    pub fn to_statement(&self) -> TableCreateStatement {
        let mut stmt = Table::create();
        stmt.table(Alias::new(&self.table)).if_not_exists();
        for column in &self.columns {
            stmt.col(column.def.clone());
        }
        for spec in &self.foreign_keys {
            stmt.foreign_key(&mut foreign_key_statement(spec, &self.table));
        }
        stmt
    }
}

/// Changes to an existing table.
#[derive(Debug, Clone, Default)]
pub struct AlterTable {
    add: Vec<Column>,
    drop: Vec<String>,
    rename: Vec<(String, String)>,
}

impl AlterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_column(mut self, column: Column) -> Self {
        self.add.push(column);
        self
    }

    pub fn drop_column(mut self, name: impl Into<String>) -> Self {
        self.drop.push(name.into());
        self
    }

    pub fn rename_column(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.rename.push((from.into(), to.into()));
        self
    }

    /// One statement per change: adds, then drops, then renames.
    pub fn statements(&self, table: &str) -> Vec<TableAlterStatement> {
        let base = || Table::alter().table(Alias::new(table)).to_owned();
        let adds = self.add.iter().map(|c| base().add_column(c.def.clone()).to_owned());
        let drops = self.drop.iter().map(|c| base().drop_column(Alias::new(c)).to_owned());
        let renames = self
            .rename
            .iter()
            .map(|(from, to)| base().rename_column(Alias::new(from), Alias::new(to)).to_owned());
        adds.chain(drops).chain(renames).collect()
    }
}

/// Schema operations run through a migration's [`SchemaManager`].
pub struct Schema<'m, 'c> {
    manager: &'m SchemaManager<'c>,
}

impl<'m, 'c> Schema<'m, 'c> {
    pub fn new(manager: &'m SchemaManager<'c>) -> Self {
        Self { manager }
    }

    pub async fn create_table(&self, blueprint: Blueprint) -> Result<(), DbErr> {
        tracing::info!(table = blueprint.table(), "Creating table");
        self.manager.create_table(blueprint.to_statement()).await
    }

    pub async fn alter_table(&self, table: &str, changes: AlterTable) -> Result<(), DbErr> {
        for stmt in changes.statements(table) {
            self.manager.alter_table(stmt).await?;
        }
        Ok(())
    }

    pub async fn add_column(&self, table: &str, column: Column) -> Result<(), DbErr> {
        self.alter_table(table, AlterTable::new().add_column(column)).await
    }

    pub async fn drop_column(&self, table: &str, column: &str) -> Result<(), DbErr> {
        self.alter_table(table, AlterTable::new().drop_column(column)).await
    }

    pub async fn rename_column(&self, table: &str, from: &str, to: &str) -> Result<(), DbErr> {
        self.alter_table(table, AlterTable::new().rename_column(from, to)).await
    }

    pub async fn drop_table(&self, table: &str) -> Result<(), DbErr> {
        tracing::info!(table, "Dropping table");
        self.manager
            .drop_table(Table::drop().table(Alias::new(table)).if_exists().to_owned())
            .await
    }

    pub async fn rename_table(&self, from: &str, to: &str) -> Result<(), DbErr> {
        self.manager
            .rename_table(Table::rename().table(Alias::new(from), Alias::new(to)).to_owned())
            .await
    }

    pub async fn has_table(&self, table: &str) -> Result<bool, DbErr> {
        self.manager.has_table(table).await
    }

    /// Add a foreign key named `fk_{table}_{column}`.
    pub async fn add_foreign_key(
        &self,
        table: &str,
        column: &str,
        references_table: &str,
        references_column: &str,
        on_delete: ForeignKeyAction,
    ) -> Result<(), DbErr> {
        let spec = ForeignSpec {
            column: column.to_string(),
            table: references_table.to_string(),
            references: references_column.to_string(),
            on_delete,
        };
        self.manager
            .create_foreign_key(foreign_key_statement(&spec, table))
            .await
    }

    /// Drop the foreign key created by [`Schema::add_foreign_key`].
    pub async fn drop_foreign_key(&self, table: &str, column: &str) -> Result<(), DbErr> {
        self.manager
            .drop_foreign_key(
                ForeignKey::drop()
                    .name(foreign_key_name(table, column))
                    .table(Alias::new(table))
                    .to_owned(),
            )
            .await
    }
}

/// `CURRENT_TIMESTAMP` column default.
pub fn now() -> SimpleExpr {
    Expr::current_timestamp().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm_migration::prelude::{PostgresQueryBuilder, SchemaStatementBuilder};

    #[test]
    fn test_blueprint_columns_and_foreign_keys() {
        let sql = Blueprint::new("posts")
            .id()
            .column(Column::string("title").not_null())
            .column(Column::integer("views").default(0))
            .foreign("user_id", "users")
            .timestamps()
            .soft_deletes()
            .to_statement()
            .to_string(PostgresQueryBuilder);

        assert!(sql.starts_with(r#"CREATE TABLE IF NOT EXISTS "posts""#), "{sql}");
        assert!(sql.contains(r#""id" serial NOT NULL PRIMARY KEY"#), "{sql}");
        assert!(sql.contains(r#""title" varchar(255) NOT NULL"#), "{sql}");
        assert!(sql.contains(r#""views" integer DEFAULT 0"#), "{sql}");
        assert!(sql.contains(r#""deleted_at" timestamp with time zone NULL"#), "{sql}");
        assert!(sql.contains(r#"CONSTRAINT "fk_posts_user_id""#), "{sql}");
        assert!(sql.contains(r#"REFERENCES "users" ("id") ON DELETE CASCADE"#), "{sql}");
    }

    #[test]
    fn test_alter_table_one_statement_per_change() {
        let statements = AlterTable::new()
            .add_column(Column::string("phone").nullable())
            .drop_column("legacy")
            .rename_column("email", "email_address")
            .statements("users");

        let sql: Vec<String> = statements
            .iter()
            .map(|s| s.to_string(PostgresQueryBuilder))
            .collect();
        assert_eq!(sql.len(), 3);
        assert!(sql[0].contains(r#"ADD COLUMN "phone" varchar(255) NULL"#), "{}", sql[0]);
        assert!(sql[1].contains(r#"DROP COLUMN "legacy""#), "{}", sql[1]);
        assert!(sql[2].contains(r#"RENAME COLUMN "email" TO "email_address""#), "{}", sql[2]);
    }

    #[test]
    fn test_morph_columns() {
        let sql = Blueprint::new("comments")
            .morphs("commentable")
            .to_statement()
            .to_string(PostgresQueryBuilder);
        assert!(sql.contains(r#""commentable_type" varchar(255) NOT NULL"#), "{sql}");
        assert!(sql.contains(r#""commentable_id" integer NOT NULL"#), "{sql}");
    }

    #[test]
    fn test_foreign_key_name() {
        assert_eq!(foreign_key_name("posts", "user_id"), "fk_posts_user_id");
    }
}
