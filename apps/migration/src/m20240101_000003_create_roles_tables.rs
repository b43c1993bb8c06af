use sea_orm_migration::prelude::*;

use crate::schema::{Blueprint, Column, Schema, now};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let schema = Schema::new(manager);
        schema
            .create_table(
                Blueprint::new("roles")
                    .id()
                    .column(Column::string_len("name", 50).not_null().unique())
                    .timestamps(),
            )
            .await?;

        // pivot
        schema
            .create_table(
                Blueprint::new("role_user")
                    .foreign("user_id", "users")
                    .foreign("role_id", "roles")
                    .column(Column::datetime("expires_at").nullable())
                    .column(Column::datetime("created_at").nullable().default(now()))
                    .column(Column::datetime("updated_at").nullable()),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let schema = Schema::new(manager);
        schema.drop_table("role_user").await?;
        schema.drop_table("roles").await
    }
}
