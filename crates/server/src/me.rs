//! Self-service session management.
//!
//! Lists the caller's live sessions and revokes them. Revoking a session an
//! OIDC client holds triggers back-channel logout; the local session is only
//! deleted once the relying party acknowledged the logout token, and the user
//! is told explicitly when sign-out could not be propagated.

use axum::{
    Form, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::AppState;
use crate::entity::{client, session};
use crate::extract::AuthSession;
use crate::oidc::logout::notify_backchannel;
use crate::oidc::{ErrorResponse, internal_error};

/// OpenAPI tag for account endpoints.
pub const ME_TAG: &str = "My Account";

pub fn router() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_sessions))
        .routes(routes!(revoke_session))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    /// Whether this row backs the session making the request.
    pub current: bool,
}

/// List the caller's sessions.
#[tracing::instrument(skip(state, auth))]
#[utoipa::path(
    get,
    path = "/me/session",
    tag = ME_TAG,
    operation_id = "List Sessions",
    summary = "List the caller's live sessions",
    responses(
        (status = 200, description = "Sessions belonging to the authenticated user", body = [SessionInfo]),
        (status = 307, description = "Redirect to login when unauthenticated"),
    )
)]
pub async fn list_sessions(State(state): State<AppState>, auth: AuthSession) -> Response {
    let sessions = match session::Entity::find()
        .filter(session::Column::UserId.eq(&auth.user.id))
        .all(state.db.as_ref())
        .await
    {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to read sessions from store: {e}");
            return internal_error();
        }
    };

    let client_ids: Vec<String> = sessions
        .iter()
        .filter_map(|s| s.client_id.clone())
        .collect();
    let clients = if client_ids.is_empty() {
        Vec::new()
    } else {
        match client::Entity::find()
            .filter(client::Column::Id.is_in(client_ids))
            .all(state.db.as_ref())
            .await
        {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("Failed to read clients from store: {e}");
                return internal_error();
            }
        }
    };

    let infos: Vec<SessionInfo> = sessions
        .into_iter()
        .map(|s| {
            let client_name = s.client_id.as_ref().and_then(|id| {
                clients
                    .iter()
                    .find(|c| &c.id == id)
                    .map(|c| c.name.clone())
            });
            SessionInfo {
                current: s.id == auth.session.id,
                client_name,
                id: s.id,
                client_id: s.client_id,
                browser: s.browser,
                os: s.os,
                created_at: s.created_at,
                expires_at: s.expires_at,
            }
        })
        .collect();

    Json(infos).into_response()
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RevokeForm {
    pub id: String,
    /// Skip back-channel notification and delete the session unconditionally.
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RevokeResponse {
    /// `revoked`, `logout_not_propagated` or `backchannel_logout_failed`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Revoke one of the caller's sessions.
#[tracing::instrument(skip(state, auth, form), fields(session_id = %form.id))]
#[utoipa::path(
    post,
    path = "/me/session/revoke",
    tag = ME_TAG,
    operation_id = "Revoke Session",
    summary = "Revoke a session, propagating logout to its client",
    description = "Sessions bound to an OIDC client are revoked through back-channel logout: the \
                   client's logout URL is POSTed a signed logout token and the local session is \
                   deleted only after an HTTP 200 acknowledgement. When the client declares no \
                   back-channel URL, or does not acknowledge, the session is retained and the \
                   response says so - a local delete would not sign the user out remotely.",
    request_body(
        content = RevokeForm,
        content_type = "application/x-www-form-urlencoded",
        description = "Session id plus the optional force flag"
    ),
    responses(
        (status = 200, description = "Session revoked, or retained with an explanation", body = RevokeResponse),
        (status = 400, description = "Unknown session id", body = ErrorResponse),
        (status = 417, description = "Back-channel notification failed; session retained", body = RevokeResponse),
    )
)]
pub async fn revoke_session(
    State(state): State<AppState>,
    auth: AuthSession,
    Form(form): Form<RevokeForm>,
) -> Response {
    let sess = match session::Entity::find_by_id(&form.id)
        .one(state.db.as_ref())
        .await
    {
        Ok(Some(s)) if s.user_id == auth.user.id => s,
        Ok(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("invalid_request", "invalid session id")),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("Failed to read session from store: {e}");
            return internal_error();
        }
    };

    // Forced revokes and plain browser sessions have nobody to notify.
    let client_id = match (&sess.client_id, form.force) {
        (None, _) | (_, true) => {
            return delete_and_respond(&state, &sess.id).await;
        }
        (Some(id), false) => id.clone(),
    };

    let rp = match client::Entity::find_by_id(&client_id)
        .one(state.db.as_ref())
        .await
    {
        Ok(Some(c)) => c,
        Ok(None) => return delete_and_respond(&state, &sess.id).await,
        Err(e) => {
            tracing::error!("Failed to read client from store: {e}");
            return internal_error();
        }
    };

    let Some(backchannel_url) = rp.backchannel_logout_url.as_deref() else {
        // The client cannot be told; deleting only our copy would leave the
        // user signed in over there without knowing it.
        return (
            StatusCode::OK,
            Json(RevokeResponse {
                status: "logout_not_propagated".to_string(),
                message: Some(format!(
                    "{} does not support back-channel logout; revoking this session here \
                     would not sign you out of the application. Use force to revoke anyway.",
                    rp.name
                )),
            }),
        )
            .into_response();
    };

    if let Err(e) = notify_backchannel(&state, backchannel_url, &client_id, &sess.id).await {
        tracing::warn!(client_id = %client_id, "Back-channel logout failed: {e}");
        return (
            StatusCode::EXPECTATION_FAILED,
            Json(RevokeResponse {
                status: "backchannel_logout_failed".to_string(),
                message: Some(format!(
                    "{} did not acknowledge the logout notification; the session was kept.",
                    rp.name
                )),
            }),
        )
            .into_response();
    }

    delete_and_respond(&state, &sess.id).await
}

async fn delete_and_respond(state: &AppState, id: &str) -> Response {
    if let Err(e) = state.sessions.revoke(id).await {
        tracing::error!("Failed to delete session: {e}");
        return internal_error();
    }
    tracing::info!(session_id = %id, "Session revoked");
    (
        StatusCode::OK,
        Json(RevokeResponse {
            status: "revoked".to_string(),
            message: None,
        }),
    )
        .into_response()
}
