//! Typed queries for favorites and their notification settings.

use std::collections::HashMap;

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::entity::chat_integration::{
    Column as ChatColumn, Entity as ChatIntegration, Model as ChatModel,
};
use crate::entity::notification_preference::{
    Column as PreferenceColumn, Entity as NotificationPreference, Model as PreferenceModel,
};
use crate::entity::package_favorite::{Column as FavoriteColumn, Entity as PackageFavorite};

use super::errors::Result;

/// One user following a package, with whatever notification settings they
/// have on record. Missing settings are resolved to defaults by the
/// dispatcher, never here.
#[derive(Debug, Clone)]
pub struct FavoriteSubscriber {
    pub user_id: Uuid,
    pub preferences: Option<PreferenceModel>,
    pub chat: Option<ChatModel>,
}

/// Load everyone who favorites `package`, left-joined with their
/// preference row and chat integration.
pub async fn subscribers_for_package(
    db: &DatabaseConnection,
    package: &str,
) -> Result<Vec<FavoriteSubscriber>> {
    let favorites = PackageFavorite::find()
        .filter(FavoriteColumn::PackageName.eq(package))
        .all(db)
        .await?;

    if favorites.is_empty() {
        return Ok(Vec::new());
    }

    let user_ids: Vec<Uuid> = favorites.iter().map(|favorite| favorite.user_id).collect();

    let mut preferences: HashMap<Uuid, PreferenceModel> = NotificationPreference::find()
        .filter(PreferenceColumn::UserId.is_in(user_ids.clone()))
        .all(db)
        .await?
        .into_iter()
        .map(|row| (row.user_id, row))
        .collect();

    let mut chats: HashMap<Uuid, ChatModel> = ChatIntegration::find()
        .filter(ChatColumn::UserId.is_in(user_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|row| (row.user_id, row))
        .collect();

    Ok(favorites
        .into_iter()
        .map(|favorite| FavoriteSubscriber {
            user_id: favorite.user_id,
            preferences: preferences.remove(&favorite.user_id),
            chat: chats.remove(&favorite.user_id),
        })
        .collect())
}
