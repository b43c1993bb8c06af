use sea_orm_migration::prelude::*;

use crate::schema::{AlterTable, Column, Schema};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        Schema::new(manager)
            .alter_table(
                "users",
                AlterTable::new()
                    .add_column(Column::text("bio").nullable())
                    .add_column(Column::uuid("external_id").nullable().unique())
                    .add_column(Column::date("birthday").nullable()),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        Schema::new(manager)
            .alter_table(
                "users",
                AlterTable::new()
                    .drop_column("birthday")
                    .drop_column("external_id")
                    .drop_column("bio"),
            )
            .await
    }
}
