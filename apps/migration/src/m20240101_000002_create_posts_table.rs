use sea_orm_migration::prelude::*;

use crate::schema::{Blueprint, Column, Schema};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        Schema::new(manager)
            .create_table(
                Blueprint::new("posts")
                    .id()
                    .foreign("user_id", "users")
                    .column(Column::string("title").not_null())
                    .column(Column::string("slug").not_null().unique())
                    .column(Column::text("body").nullable())
                    .column(Column::string_len("status", 20).not_null().default("draft"))
                    .column(Column::integer("views").not_null().default(0))
                    .column(Column::decimal("rating", 3, 2).nullable())
                    .column(Column::datetime("published_at").nullable())
                    .timestamps()
                    .soft_deletes(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        Schema::new(manager).drop_table("posts").await
    }
}
