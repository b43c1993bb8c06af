use sea_orm_migration::prelude::*;

use crate::schema::{Blueprint, Column, Schema};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        Schema::new(manager)
            .create_table(
                Blueprint::new("users")
                    .id()
                    .column(Column::string("name").not_null())
                    .column(Column::string("email").not_null().unique())
                    .column(Column::string("password").not_null())
                    .column(Column::boolean("is_admin").not_null().default(false))
                    .column(Column::json("settings").nullable())
                    .timestamps()
                    .soft_deletes(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        Schema::new(manager).drop_table("users").await
    }
}
