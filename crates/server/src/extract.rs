//! Typed extraction of the authenticated request.
//!
//! `AuthSession` is produced once per request from the `auth_session` cookie
//! and threaded explicitly to the handlers that need it; handlers never probe
//! request state dynamically. Unauthenticated requests are redirected to the
//! login page with the original URI as `return_to`.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use sea_orm::EntityTrait;
use serde_json::json;

use crate::AppState;
use crate::entity::{session, user};
use crate::session::SESSION_COOKIE;

/// The authenticated principal behind a request, resolved from a valid,
/// unexpired session.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub session: session::Model,
    pub user: user::Model,
}

pub enum AuthRejection {
    /// No valid session; send the browser to the login page.
    Unauthenticated { return_to: String },
    /// The store failed; nothing the caller can do about it.
    Internal,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            AuthRejection::Unauthenticated { return_to } => Redirect::temporary(&format!(
                "/login?return_to={}",
                urlencoding::encode(&return_to)
            ))
            .into_response(),
            AuthRejection::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "server_error",
                    "error_description": "database operation failed",
                })),
            )
                .into_response(),
        }
    }
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let return_to = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let unauthenticated = || AuthRejection::Unauthenticated {
            return_to: return_to.clone(),
        };

        let jar = CookieJar::from_headers(&parts.headers);
        let cookie = jar.get(SESSION_COOKIE).ok_or_else(unauthenticated)?;

        let sess = state
            .sessions
            .validate(cookie.value())
            .await
            .map_err(|e| {
                tracing::error!("Failed to read session from store: {e}");
                AuthRejection::Internal
            })?
            .ok_or_else(unauthenticated)?;

        let user = user::Entity::find_by_id(&sess.user_id)
            .one(state.db.as_ref())
            .await
            .map_err(|e| {
                tracing::error!("Failed to read user from store: {e}");
                AuthRejection::Internal
            })?
            .ok_or_else(unauthenticated)?;

        Ok(AuthSession {
            session: sess,
            user,
        })
    }
}
