//! Third-party identity federation.
//!
//! Each provider performs its own OAuth2 dance against the upstream identity
//! service and then establishes a first-party session, bypassing the
//! authorization engine. The registry of enabled providers is built once from
//! configuration at startup.

pub mod github;
pub mod google;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::AppState;
use crate::auth::establish_session;
use crate::cache::{FederationState, FederationStateCache};
use crate::config::AppConfig;
use crate::entity::user;
use crate::error::ProviderError;
use crate::oidc::{ErrorResponse, render_error};
use crate::session::SessionManager;
use crate::storage::BlobStore;
use crate::util::random_opaque;

/// OpenAPI tag for federation endpoints.
pub const FEDERATION_TAG: &str = "Federation";

/// Cookie carrying the key into the federation state cache. Distinct from the
/// long-lived auth session; it only lives for the provider round-trip.
pub const FED_COOKIE: &str = "fed_session";

/// A pluggable upstream identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Start the provider's OAuth2 dance: park state, redirect to consent.
    async fn login(&self, jar: CookieJar, return_to: String) -> Response;

    /// Finish the dance: validate state, exchange the code, provision or
    /// locate the local user and establish a first-party session.
    async fn callback(&self, jar: CookieJar, headers: &HeaderMap, query: CallbackQuery)
    -> Response;
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_description: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub state: String,
}

/// Shared handles every provider needs.
#[derive(Clone)]
pub struct ProviderContext {
    pub db: Arc<DatabaseConnection>,
    pub http: reqwest::Client,
    pub storage: Arc<dyn BlobStore>,
    pub sessions: SessionManager,
    pub states: FederationStateCache,
}

/// Profile attributes every provider maps its own response into.
#[derive(Debug, Clone)]
pub struct Profile {
    pub email: String,
    pub avatar_url: Option<String>,
}

/// Build the enabled-provider registry from configuration.
pub fn build_registry(
    config: &AppConfig,
    ctx: &ProviderContext,
) -> HashMap<String, Arc<dyn IdentityProvider>> {
    let mut registry: HashMap<String, Arc<dyn IdentityProvider>> = HashMap::new();
    if config.providers.google.enable {
        registry.insert(
            "google".to_string(),
            Arc::new(google::GoogleProvider::new(
                ctx.clone(),
                &config.providers.google,
                &config.base_url,
            )),
        );
        tracing::info!("Google identity provider enabled");
    }
    if config.providers.github.enable {
        registry.insert(
            "github".to_string(),
            Arc::new(github::GitHubProvider::new(
                ctx.clone(),
                &config.providers.github,
                &config.base_url,
            )),
        );
        tracing::info!("GitHub identity provider enabled");
    }
    registry
}

pub fn router() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(provider_login))
        .routes(routes!(provider_callback))
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    #[serde(default)]
    pub return_to: String,
}

/// Start a federated login with the named provider.
#[tracing::instrument(skip(state, jar))]
#[utoipa::path(
    get,
    path = "/{provider}/login",
    tag = FEDERATION_TAG,
    operation_id = "Federated Login",
    summary = "Redirect to an identity provider's consent screen",
    params(
        ("provider" = String, Path, description = "Provider slug, e.g. `google` or `github`."),
        ("return_to" = Option<String>, Query, description = "URI to return to after login; defaults to `/`."),
    ),
    responses(
        (status = 303, description = "Redirect to the provider"),
        (status = 404, description = "Provider unknown or not enabled", body = ErrorResponse),
    )
)]
pub async fn provider_login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<LoginQuery>,
    jar: CookieJar,
) -> Response {
    let Some(p) = state.providers.get(&provider) else {
        return unknown_provider(&provider);
    };
    p.login(jar, query.return_to).await
}

/// Finish a federated login with the named provider.
#[tracing::instrument(skip(state, jar, headers, query))]
#[utoipa::path(
    get,
    path = "/{provider}/callback",
    tag = FEDERATION_TAG,
    operation_id = "Federated Callback",
    summary = "Provider redirect target completing a federated login",
    params(
        ("provider" = String, Path, description = "Provider slug, e.g. `google` or `github`."),
    ),
    responses(
        (status = 302, description = "Session established, redirect to the stored return_to"),
        (status = 400, description = "State mismatch or provider error page"),
        (status = 404, description = "Provider unknown or not enabled", body = ErrorResponse),
    )
)]
pub async fn provider_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    let Some(p) = state.providers.get(&provider) else {
        return unknown_provider(&provider);
    };
    p.callback(jar, &headers, query).await
}

fn unknown_provider(name: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new(
            "invalid_request",
            &format!("identity provider {name:?} is not enabled"),
        )),
    )
        .into_response()
}

/// Park `{state, return_to}` server-side and hand back the cookie pointing at
/// it plus the state value to send upstream.
pub(crate) fn park_state(states: &FederationStateCache, jar: CookieJar, return_to: String) -> (CookieJar, String) {
    let state_value = random_opaque(25);
    let key = random_opaque(25);
    let return_to = if return_to.is_empty() {
        "/".to_string()
    } else {
        return_to
    };
    states.put(
        key.clone(),
        FederationState {
            state: state_value.clone(),
            return_to,
        },
    );
    let cookie = Cookie::build((FED_COOKIE, key))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::minutes(10))
        .build();
    (jar.add(cookie), state_value)
}

/// Common callback prologue: reject provider-reported errors and compare the
/// returned state against the parked one.
///
/// The comparison is constant-time on purpose; state values are secrets while
/// the round-trip is in flight.
pub(crate) fn take_verified_state(
    states: &FederationStateCache,
    jar: &CookieJar,
    query: &CallbackQuery,
) -> Result<FederationState, Response> {
    if !query.error.is_empty() {
        let mut msg = query.error.clone();
        if !query.error_description.is_empty() {
            msg = format!("{msg} - {}", query.error_description);
        }
        return Err(render_error(&msg, StatusCode::EXPECTATION_FAILED));
    }

    let Some(cookie) = jar.get(FED_COOKIE) else {
        return Err(render_error(
            "missing federation session cookie",
            StatusCode::BAD_REQUEST,
        ));
    };
    let Some(parked) = states.remove(&cookie.value().to_string()) else {
        return Err(render_error(
            "missing state in session",
            StatusCode::BAD_REQUEST,
        ));
    };

    if !bool::from(parked.state.as_bytes().ct_eq(query.state.as_bytes())) {
        return Err(render_error("invalid state", StatusCode::BAD_REQUEST));
    }

    Ok(parked)
}

/// Locate a local user by email, creating one on first federated login.
///
/// On create the provider-hosted avatar is copied into blob storage so the
/// recorded URL stays under this deployment's control. A failed avatar fetch
/// degrades to an account without one.
pub(crate) async fn find_or_create_user(
    ctx: &ProviderContext,
    profile: &Profile,
) -> Result<String, ProviderError> {
    if let Some(existing) = user::Entity::find()
        .filter(user::Column::Email.eq(&profile.email))
        .one(ctx.db.as_ref())
        .await?
    {
        return Ok(existing.id);
    }

    let user_id = random_opaque(25);
    let mut avatar_url = None;
    if let Some(upstream) = profile.avatar_url.as_deref() {
        match mirror_avatar(ctx, &user_id, upstream).await {
            Ok(url) => avatar_url = Some(url),
            Err(e) => {
                tracing::warn!("Failed to mirror avatar from {upstream}: {e}");
            }
        }
    }

    let row = user::ActiveModel {
        id: Set(user_id.clone()),
        email: Set(profile.email.clone()),
        hashed_password: Set(None),
        avatar_url: Set(avatar_url),
        created_at: Set(OffsetDateTime::now_utc()),
    };
    row.insert(ctx.db.as_ref()).await?;
    tracing::info!(user_id = %user_id, "Provisioned user from federated login");
    Ok(user_id)
}

async fn mirror_avatar(
    ctx: &ProviderContext,
    user_id: &str,
    upstream: &str,
) -> Result<String, ProviderError> {
    let resp = ctx.http.get(upstream).send().await?;
    if !resp.status().is_success() {
        return Err(ProviderError::Status {
            status: resp.status(),
            context: "avatar fetch".to_string(),
        });
    }
    let bytes = resp.bytes().await?;
    ctx.storage.put(user_id, &bytes).await?;
    Ok(ctx.storage.url(user_id))
}

/// Common callback epilogue: create the first-party session and redirect.
pub(crate) async fn finish_login(
    ctx: &ProviderContext,
    headers: &HeaderMap,
    jar: CookieJar,
    user_id: &str,
    return_to: &str,
) -> Response {
    establish_session(&ctx.sessions, headers, jar, user_id, return_to).await
}
