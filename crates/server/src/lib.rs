//! A self-hostable OpenID Connect / OAuth2 identity provider.
//!
//! Signet authenticates end users, issues short-lived authorization codes,
//! exchanges them for EdDSA-signed access and ID tokens, serves discovery and
//! JWKS metadata, and propagates logout to relying applications.

use std::collections::HashMap;
use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::cache::{AuthzCodeCache, FederationStateCache};
use crate::config::AppConfig;
use crate::keys::SigningKeys;
use crate::provider::IdentityProvider;
use crate::session::SessionManager;
use crate::storage::BlobStore;

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod entity;
pub mod error;
pub mod extract;
pub mod keys;
pub mod me;
pub mod oidc;
pub mod password;
pub mod provider;
pub mod session;
pub mod storage;
pub mod util;

/// Shared application state threaded through every handler.
///
/// Constructed once in `main` and cloned per request; all fields are cheap
/// handles.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub keys: Arc<SigningKeys>,
    pub sessions: SessionManager,
    /// Outstanding authorization codes, keyed by the opaque code string.
    pub codes: AuthzCodeCache,
    /// In-flight federated login state, keyed by the `fed_session` cookie.
    pub federation_states: FederationStateCache,
    pub http: reqwest::Client,
    pub storage: Arc<dyn BlobStore>,
    /// Identity providers enabled in the configuration, keyed by path slug.
    pub providers: Arc<HashMap<String, Arc<dyn IdentityProvider>>>,
}
