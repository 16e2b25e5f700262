//! UserInfo resource: bearer-protected profile claims.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::AppState;
use crate::entity::user;
use crate::oidc::claims::{AccessTokenClaims, SCOPE_PROFILE};
use crate::oidc::{ErrorResponse, OIDC_TAG, internal_error};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserInfoResponse {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// OpenID Connect UserInfo endpoint.
#[tracing::instrument(skip(state, headers))]
#[utoipa::path(
    get,
    path = "/userinfo",
    tag = OIDC_TAG,
    operation_id = "UserInfo",
    summary = "Profile claims for the access token's user",
    description = "Requires a Bearer access token issued by the token endpoint with the `profile` \
                   scope granted. Verification failures are reported without detail.",
    responses(
        (status = 200, description = "Profile claims", body = UserInfoResponse),
        (status = 400, description = "Missing, invalid or expired access token", body = ErrorResponse),
    )
)]
pub async fn userinfo(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let token = match bearer_token(&headers) {
        Some(t) => t,
        None => return invalid_token(),
    };

    // One generic rejection for every verification failure: signature,
    // expiry, malformed claims.
    let claims: AccessTokenClaims = match state.keys.verify(token) {
        Ok(c) => c,
        Err(_) => return invalid_token(),
    };

    if !claims.has_scope(SCOPE_PROFILE) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "insufficient_scope",
                "access token does not contain the required scope",
            )),
        )
            .into_response();
    }

    let u = match user::Entity::find_by_id(&claims.user_id)
        .one(state.db.as_ref())
        .await
    {
        Ok(Some(u)) => u,
        Ok(None) => return invalid_token(),
        Err(e) => {
            tracing::error!("Failed to read user from store: {e}");
            return internal_error();
        }
    };

    (
        StatusCode::OK,
        Json(UserInfoResponse {
            email: u.email,
            avatar_url: u.avatar_url,
        }),
    )
        .into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

fn invalid_token() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(
            "invalid_token",
            "invalid or expired access token",
        )),
    )
        .into_response()
}
