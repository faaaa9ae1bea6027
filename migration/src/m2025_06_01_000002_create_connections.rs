//! Migration to create the connections table.
//!
//! Connections hold the notes a user attached to a LinkedIn profile. Each
//! profile URL appears at most once per owner.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Connections::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Connections::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Connections::OwnerId).uuid().not_null())
                    .col(ColumnDef::new(Connections::Name).text().not_null())
                    .col(ColumnDef::new(Connections::LinkedinUrl).text().not_null())
                    .col(ColumnDef::new(Connections::MeetingPlace).text().null())
                    .col(
                        ColumnDef::new(Connections::UserCompanyAtTheTime)
                            .text()
                            .null(),
                    )
                    .col(ColumnDef::new(Connections::Notes).text().null())
                    .col(
                        ColumnDef::new(Connections::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Connections::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_connections_owner_id")
                            .from(Connections::Table, Connections::OwnerId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One note per profile per owner
        manager
            .create_index(
                Index::create()
                    .name("idx_connections_owner_linkedin_url")
                    .table(Connections::Table)
                    .col(Connections::OwnerId)
                    .col(Connections::LinkedinUrl)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_connections_owner_created_at")
                    .table(Connections::Table)
                    .col(Connections::OwnerId)
                    .col(Connections::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_connections_owner_linkedin_url")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_connections_owner_created_at")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Connections::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Connections {
    Table,
    Id,
    OwnerId,
    Name,
    LinkedinUrl,
    MeetingPlace,
    UserCompanyAtTheTime,
    Notes,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}
