//! Initial migration to create the packmule database schema.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_backfill_state(manager).await?;
        self.create_backfill_packages(manager).await?;
        self.create_users(manager).await?;
        self.create_package_favorites(manager).await?;
        self.create_notification_preferences(manager).await?;
        self.create_notifications(manager).await?;
        self.create_chat_integrations(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ChatIntegrations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Notifications::Table).to_owned())
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(NotificationPreferences::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(PackageFavorites::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BackfillPackages::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BackfillState::Table).to_owned())
            .await?;
        Ok(())
    }
}

impl Migration {
    async fn create_backfill_state(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BackfillState::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BackfillState::Id)
                            .integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(BackfillState::Status)
                            .string()
                            .not_null()
                            .default("idle"),
                    )
                    .col(
                        ColumnDef::new(BackfillState::Total)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BackfillState::Offset)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(BackfillState::StartedAt).timestamp().null())
                    .col(
                        ColumnDef::new(BackfillState::Rate)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(ColumnDef::new(BackfillState::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(BackfillState::Version)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn create_backfill_packages(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BackfillPackages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BackfillPackages::Position)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BackfillPackages::Name).string().not_null())
                    .to_owned(),
            )
            .await
    }

    async fn create_users(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Users::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Users::Username).string().not_null())
                    .col(ColumnDef::new(Users::Email).string().null())
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_users_username")
                    .table(Users::Table)
                    .col(Users::Username)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn create_package_favorites(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PackageFavorites::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(PackageFavorites::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(PackageFavorites::PackageName)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PackageFavorites::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(PackageFavorites::UserId)
                            .col(PackageFavorites::PackageName),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_package_favorites_user")
                            .from(PackageFavorites::Table, PackageFavorites::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // The dispatcher's fan-out query is by package name.
        manager
            .create_index(
                Index::create()
                    .name("idx_package_favorites_package")
                    .table(PackageFavorites::Table)
                    .col(PackageFavorites::PackageName)
                    .to_owned(),
            )
            .await
    }

    async fn create_notification_preferences(
        &self,
        manager: &SchemaManager<'_>,
    ) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(NotificationPreferences::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(NotificationPreferences::UserId)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(NotificationPreferences::NotifyAllUpdates)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(NotificationPreferences::NotifyMajorOnly)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(NotificationPreferences::NotifySecurityOnly)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(NotificationPreferences::InAppEnabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(NotificationPreferences::EmailImmediateCritical)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(NotificationPreferences::EmailDigest)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_notification_preferences_user")
                            .from(
                                NotificationPreferences::Table,
                                NotificationPreferences::UserId,
                            )
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn create_notifications(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Notifications::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Notifications::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Notifications::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(Notifications::PackageName)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Notifications::NewVersion).string().not_null())
                    .col(
                        ColumnDef::new(Notifications::PreviousVersion)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Notifications::Severity)
                            .string()
                            .not_null()
                            .default("info"),
                    )
                    .col(
                        ColumnDef::new(Notifications::IsSecurityUpdate)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Notifications::IsBreakingChange)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Notifications::ChangelogSnippet)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Notifications::VulnerabilitiesFixed)
                            .json()
                            .not_null()
                            .default(Expr::cust("'[]'")),
                    )
                    .col(
                        ColumnDef::new(Notifications::Read)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Notifications::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_notifications_user")
                            .from(Notifications::Table, Notifications::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Dedup key: duplicate dispatches must not create duplicate rows.
        manager
            .create_index(
                Index::create()
                    .name("idx_notifications_user_package_version")
                    .table(Notifications::Table)
                    .col(Notifications::UserId)
                    .col(Notifications::PackageName)
                    .col(Notifications::NewVersion)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Unread-inbox lookups.
        manager
            .create_index(
                Index::create()
                    .name("idx_notifications_user_read")
                    .table(Notifications::Table)
                    .col(Notifications::UserId)
                    .col(Notifications::Read)
                    .to_owned(),
            )
            .await
    }

    async fn create_chat_integrations(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ChatIntegrations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ChatIntegrations::UserId)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ChatIntegrations::WebhookUrl)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ChatIntegrations::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(ChatIntegrations::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_chat_integrations_user")
                            .from(ChatIntegrations::Table, ChatIntegrations::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum BackfillState {
    Table,
    Id,
    Status,
    Total,
    Offset,
    StartedAt,
    Rate,
    ErrorMessage,
    Version,
}

#[derive(DeriveIden)]
enum BackfillPackages {
    Table,
    Position,
    Name,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Username,
    Email,
    CreatedAt,
}

#[derive(DeriveIden)]
enum PackageFavorites {
    Table,
    UserId,
    PackageName,
    CreatedAt,
}

#[derive(DeriveIden)]
enum NotificationPreferences {
    Table,
    UserId,
    NotifyAllUpdates,
    NotifyMajorOnly,
    NotifySecurityOnly,
    InAppEnabled,
    EmailImmediateCritical,
    EmailDigest,
}

#[derive(DeriveIden)]
enum Notifications {
    Table,
    Id,
    UserId,
    PackageName,
    NewVersion,
    PreviousVersion,
    Severity,
    IsSecurityUpdate,
    IsBreakingChange,
    ChangelogSnippet,
    VulnerabilitiesFixed,
    Read,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ChatIntegrations {
    Table,
    UserId,
    WebhookUrl,
    Enabled,
    CreatedAt,
}
