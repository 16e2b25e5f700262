//! Client entity - a registered relying application.
//!
//! Rows are created and updated by the admin console; the protocol engines
//! only ever read them.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "clients")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub name: String,
    /// Argon2id hash of the client secret.
    pub secret_hash: String,
    /// JSON array of allowed redirect URIs.
    pub callback_urls: String,
    /// JSON array of allowed post-logout redirect URIs.
    pub logout_callback_urls: String,
    /// Where back-channel logout tokens are POSTed, if the client supports it.
    pub backchannel_logout_url: Option<String>,
    /// ID token lifetime in seconds.
    pub token_expiration: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Parse the redirect allow-list from its JSON string.
    pub fn callback_urls_list(&self) -> Vec<String> {
        serde_json::from_str(&self.callback_urls).unwrap_or_default()
    }

    /// Parse the post-logout allow-list from its JSON string.
    pub fn logout_callback_urls_list(&self) -> Vec<String> {
        serde_json::from_str(&self.logout_callback_urls).unwrap_or_default()
    }

    /// Resolve a normalized redirect URI against the allow-list.
    ///
    /// Matching is exact string equality; an empty request selects the first
    /// configured URL.
    pub fn resolve_callback_url(&self, normalized: &str) -> Option<String> {
        self.callback_urls_list()
            .into_iter()
            .find(|u| normalized.is_empty() || u == normalized)
    }

    /// Same resolution rule for post-logout redirect URIs.
    pub fn resolve_logout_callback_url(&self, normalized: &str) -> Option<String> {
        self.logout_callback_urls_list()
            .into_iter()
            .find(|u| normalized.is_empty() || u == normalized)
    }
}
