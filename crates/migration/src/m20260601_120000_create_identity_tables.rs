//! Initial schema for the identity provider.
//!
//! Creates tables for:
//! - users: authenticated principals
//! - clients: registered relying applications
//! - sessions: live logins, browser- or token-endpoint-issued
//! - authz_history: consent records

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Users::Id).string().not_null().primary_key())
                    .col(
                        ColumnDef::new(Users::Email)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Users::HashedPassword).string().null())
                    .col(ColumnDef::new(Users::AvatarUrl).string().null())
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Clients::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Clients::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Clients::Name).string().not_null())
                    .col(ColumnDef::new(Clients::SecretHash).string().not_null())
                    .col(ColumnDef::new(Clients::CallbackUrls).text().not_null())
                    .col(
                        ColumnDef::new(Clients::LogoutCallbackUrls)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Clients::BackchannelLogoutUrl)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Clients::TokenExpiration)
                            .big_integer()
                            .not_null()
                            .default(3600),
                    )
                    .col(
                        ColumnDef::new(Clients::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Clients::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Sessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Sessions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Sessions::UserId).string().not_null())
                    .col(ColumnDef::new(Sessions::ClientId).string().null())
                    .col(ColumnDef::new(Sessions::Browser).string().null())
                    .col(ColumnDef::new(Sessions::Os).string().null())
                    .col(
                        ColumnDef::new(Sessions::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Sessions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AuthzHistory::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AuthzHistory::UserId).string().not_null())
                    .col(ColumnDef::new(AuthzHistory::ClientId).string().not_null())
                    .col(
                        ColumnDef::new(AuthzHistory::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(AuthzHistory::UserId)
                            .col(AuthzHistory::ClientId),
                    )
                    .to_owned(),
            )
            .await?;

        // Indexes for the lookups the engines actually make
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_sessions_user_id")
                    .table(Sessions::Table)
                    .col(Sessions::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_sessions_expires_at")
                    .table(Sessions::Table)
                    .col(Sessions::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_sessions_expires_at").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_sessions_user_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(AuthzHistory::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Sessions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Clients::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Email,
    HashedPassword,
    AvatarUrl,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Clients {
    Table,
    Id,
    Name,
    SecretHash,
    CallbackUrls,
    LogoutCallbackUrls,
    BackchannelLogoutUrl,
    TokenExpiration,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Sessions {
    Table,
    Id,
    UserId,
    ClientId,
    Browser,
    Os,
    ExpiresAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum AuthzHistory {
    Table,
    UserId,
    ClientId,
    CreatedAt,
}
