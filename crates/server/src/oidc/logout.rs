//! Logout engine: front-channel end-session endpoint and the back-channel
//! notification used by self-service session revocation.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Response,
};
use sea_orm::EntityTrait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

use crate::AppState;
use crate::entity::{client, session};
use crate::oidc::claims::{IdTokenClaims, LogoutTokenClaims};
use crate::oidc::{OIDC_TAG, found, render_error};
use crate::util::normalize_redirect_uri;

/// How long a relying party gets to acknowledge a back-channel logout token.
const BACKCHANNEL_TIMEOUT: Duration = Duration::from_secs(7);

#[derive(Debug, Deserialize, ToSchema)]
pub struct LogoutQuery {
    #[serde(default)]
    pub id_token_hint: String,
    #[serde(default)]
    pub post_logout_redirect_uri: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub state: String,
}

/// Front-channel logout (OIDC end-session endpoint).
#[tracing::instrument(skip(state, params))]
#[utoipa::path(
    get,
    path = "/oidc/logout",
    tag = OIDC_TAG,
    operation_id = "Front-channel Logout",
    summary = "End the session named by an ID token",
    description = "Verifies the `id_token_hint`, deletes the session its `sid` claim names and \
                   redirects to the post-logout URI, which must exactly match the client's \
                   registered logout callback list.",
    params(
        ("id_token_hint" = String, Query, description = "ID token previously issued by the token endpoint."),
        ("post_logout_redirect_uri" = Option<String>, Query, description = "Where to send the browser afterwards; defaults to the first registered logout callback."),
        ("client_id" = Option<String>, Query, description = "If present, must match the session's bound client."),
        ("state" = Option<String>, Query, description = "Echoed back on the redirect."),
    ),
    responses(
        (status = 302, description = "Session deleted, redirect to the post-logout URI"),
        (status = 400, description = "Error page HTML"),
    )
)]
pub async fn logout(State(state): State<AppState>, Query(params): Query<LogoutQuery>) -> Response {
    if params.id_token_hint.is_empty() {
        return render_error("missing id_token_hint in query", StatusCode::BAD_REQUEST);
    }

    let claims: IdTokenClaims = match state.keys.verify(&params.id_token_hint) {
        Ok(c) => c,
        Err(_) => return render_error("failed to verify id_token", StatusCode::BAD_REQUEST),
    };

    let sess = match session::Entity::find_by_id(&claims.sid)
        .one(state.db.as_ref())
        .await
    {
        Ok(Some(s)) => s,
        Ok(None) => return render_error("session does not exist", StatusCode::BAD_REQUEST),
        Err(e) => {
            tracing::error!("Failed to read session from store: {e}");
            return render_error("database operation failed", StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    if !params.client_id.is_empty() && Some(params.client_id.as_str()) != sess.client_id.as_deref()
    {
        return render_error("unauthorized client id", StatusCode::UNAUTHORIZED);
    }

    let Some(session_client_id) = sess.client_id.as_deref() else {
        return render_error("session has no associated client", StatusCode::BAD_REQUEST);
    };

    let rp = match client::Entity::find_by_id(session_client_id)
        .one(state.db.as_ref())
        .await
    {
        Ok(Some(c)) => c,
        Ok(None) => return render_error("unknown client", StatusCode::BAD_REQUEST),
        Err(e) => {
            tracing::error!("Failed to read client from store: {e}");
            return render_error("database operation failed", StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let normalized = normalize_redirect_uri(&params.post_logout_redirect_uri);
    let Some(mut redirect_to) = rp.resolve_logout_callback_url(&normalized) else {
        return render_error("unauthorized redirect URI", StatusCode::BAD_REQUEST);
    };

    if let Err(e) = state.sessions.revoke(&claims.sid).await {
        tracing::error!("Failed to delete session: {e}");
        return render_error("database operation failed", StatusCode::INTERNAL_SERVER_ERROR);
    }

    tracing::info!(sid = %claims.sid, client_id = %session_client_id, "Front-channel logout");

    if !params.state.is_empty() {
        redirect_to = format!("{redirect_to}?state={}", urlencoding::encode(&params.state));
    }
    found(&redirect_to)
}

#[derive(Debug, Error)]
pub enum BackchannelError {
    #[error("failed to sign logout token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("failed to call back-channel logout URL: {0}")]
    Unreachable(#[from] reqwest::Error),
    #[error("client responded with non-200 status: {0}")]
    Rejected(reqwest::StatusCode),
}

/// Deliver a signed logout token to a relying party's back-channel URL.
///
/// Bounded by [`BACKCHANNEL_TIMEOUT`]; a timeout is a failed notification,
/// never success. The caller only deletes the local session on `Ok`.
#[tracing::instrument(skip(state))]
pub async fn notify_backchannel(
    state: &AppState,
    url: &str,
    client_id: &str,
    sid: &str,
) -> Result<(), BackchannelError> {
    let claims = LogoutTokenClaims::new(&state.config.base_url, client_id, sid);
    let token = state.keys.sign(&claims)?;

    let resp = state
        .http
        .post(url)
        .timeout(BACKCHANNEL_TIMEOUT)
        .form(&[("logout_token", token.as_str())])
        .send()
        .await?;

    if resp.status() != reqwest::StatusCode::OK {
        return Err(BackchannelError::Rejected(resp.status()));
    }
    Ok(())
}
