//! Token endpoint: exchanges an authorization code for signed tokens.

use axum::{
    Form, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};
use time::Duration;
use utoipa::ToSchema;

use crate::AppState;
use crate::entity::client;
use crate::oidc::claims::{ACCESS_TOKEN_LIFETIME, AccessTokenClaims, IdTokenClaims};
use crate::oidc::{ErrorResponse, OIDC_TAG};
use crate::password::verify_password;
use crate::util::{Fingerprint, random_opaque};

/// Length of the session id minted for the ID token's `sid` claim.
const SID_LEN: usize = 25;

#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub grant_type: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub id_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub scope: String,
}

/// OAuth2 token endpoint.
///
/// Failure responses deliberately do not distinguish a code that never
/// existed from one that expired, nor a wrong secret from an unknown client.
#[tracing::instrument(skip(state, params))]
#[utoipa::path(
    post,
    path = "/oauth/token",
    tag = OIDC_TAG,
    operation_id = "Token",
    summary = "Exchange an authorization code for tokens",
    description = "Authenticates the client (`client_secret_post`), validates the single-use \
                   authorization code and returns an EdDSA-signed access token and ID token. \
                   The session named by the ID token's `sid` claim is persisted and becomes the \
                   target of back-channel logout.",
    request_body(
        content = TokenRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token request parameters"
    ),
    responses(
        (status = 200, description = "Tokens issued", body = TokenResponse),
        (status = 400, description = "Invalid grant or client credentials", body = ErrorResponse),
    )
)]
pub async fn token(State(state): State<AppState>, Form(params): Form<TokenRequest>) -> Response {
    if params.grant_type != "authorization_code" {
        return token_error("unsupported_grant_type", "invalid or unsupported grant_type");
    }

    let Some(meta) = state.codes.get(&params.code) else {
        return token_error("invalid_grant", "invalid or malformed authorization code");
    };

    if meta.client_id != params.client_id {
        return token_error("unauthorized_client", "invalid client id or secret");
    }

    let client = match client::Entity::find_by_id(&meta.client_id)
        .one(state.db.as_ref())
        .await
    {
        Ok(Some(c)) => c,
        Ok(None) => return token_error("unauthorized_client", "invalid client id or secret"),
        Err(e) => {
            tracing::error!("Failed to read client from store: {e}");
            return internal_token_error("database operation failed");
        }
    };

    if !verify_password(&params.client_secret, &client.secret_hash) {
        return token_error("unauthorized_client", "invalid client id or secret");
    }

    let base_url = &state.config.base_url;
    let access_claims = AccessTokenClaims::new(
        base_url,
        &meta.client_id,
        &meta.user_id,
        meta.scopes.clone(),
    );
    let access_token = match state.keys.sign(&access_claims) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Failed to sign access token: {e}");
            return internal_token_error("failed to generate access token");
        }
    };

    let sid = random_opaque(SID_LEN);
    let id_token_lifetime = Duration::seconds(client.token_expiration);
    let id_claims = IdTokenClaims::new(base_url, &meta.client_id, &sid, id_token_lifetime);
    let id_token = match state.keys.sign(&id_claims) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Failed to sign id token: {e}");
            return internal_token_error("failed to generate id token");
        }
    };

    // The session back-channel logout will later target: same id as the
    // token's sid claim, same expiry as the token itself.
    let fingerprint = Fingerprint {
        browser: meta.browser.clone(),
        os: meta.os.clone(),
    };
    if let Err(e) = state
        .sessions
        .create_with_id(
            &sid,
            &meta.user_id,
            &fingerprint,
            id_token_lifetime,
            Some(&meta.client_id),
        )
        .await
    {
        tracing::error!("Failed to persist session: {e}");
        return internal_token_error("database operation failed");
    }

    // Single-use enforcement: the code must be gone before the response is
    // written.
    state.codes.remove(&params.code);

    tracing::info!(client_id = %meta.client_id, "Exchanged authorization code for tokens");
    (
        StatusCode::OK,
        Json(TokenResponse {
            access_token,
            id_token,
            token_type: "Bearer".to_string(),
            expires_in: ACCESS_TOKEN_LIFETIME,
            scope: meta.scopes.join(" "),
        }),
    )
        .into_response()
}

fn token_error(error: &str, description: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(error, description)),
    )
        .into_response()
}

fn internal_token_error(description: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("internal_error", description)),
    )
        .into_response()
}
