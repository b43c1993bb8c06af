use sea_orm_migration::prelude::*;

use crate::schema::{Blueprint, Column, Schema};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        Schema::new(manager)
            .create_table(
                Blueprint::new("comments")
                    .id()
                    .morphs("commentable")
                    .column(Column::text("body").not_null())
                    .column(Column::boolean("approved").not_null().default(false))
                    .timestamps(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        Schema::new(manager).drop_table("comments").await
    }
}
