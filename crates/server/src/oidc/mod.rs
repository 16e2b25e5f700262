//! OpenID Connect provider endpoints.
//!
//! - `GET /authorize` / `POST /authorize` - authorization code flow + consent
//! - `POST /oauth/token` - code-for-token exchange
//! - `GET /userinfo` - bearer-protected profile claims
//! - `GET /oidc/logout` - front-channel logout
//! - `GET /.well-known/openid-configuration`, `GET /.well-known/jwks.json`

pub mod authorize;
pub mod claims;
pub mod discovery;
pub mod logout;
pub mod token;
pub mod userinfo;

use axum::{
    Json,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::AppState;

/// OpenAPI tag for OIDC endpoints.
pub const OIDC_TAG: &str = "OpenID Connect";

/// Creates the OIDC router.
pub fn router() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(discovery::openid_configuration))
        .routes(routes!(discovery::jwks))
        .routes(routes!(authorize::authorize))
        .routes(routes!(authorize::consent))
        .routes(routes!(token::token))
        .routes(routes!(userinfo::userinfo))
        .routes(routes!(logout::logout))
}

/// Structured protocol error, returned as JSON with an HTTP 4xx/5xx status.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: &str, description: &str) -> Self {
        Self {
            error: error.to_string(),
            error_description: Some(description.to_string()),
        }
    }

    pub fn server_error() -> Self {
        Self {
            error: "server_error".to_string(),
            error_description: None,
        }
    }
}

/// 302 Found redirect; the status browsers and OAuth2 clients expect for
/// protocol redirects.
pub(crate) fn found(location: &str) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, location.to_string())],
    )
        .into_response()
}

/// Render a minimal browser-facing error page.
///
/// Used on the legs of the flow where the user agent is a browser and no
/// trusted redirect URI has been established.
pub(crate) fn render_error(message: &str, status: StatusCode) -> Response {
    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>Error - Signet</title>
</head>
<body>
    <main>
        <h1>Something went wrong</h1>
        <p>{message}</p>
        <p><a href="/">Return to homepage</a></p>
    </main>
</body>
</html>"#,
    );
    (status, Html(html)).into_response()
}

/// Inline JSON 400 for pre-trust request errors.
pub(crate) fn bad_request(error: &str, description: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(error, description)),
    )
        .into_response()
}

/// Generic 500 for store/crypto failures; detail stays in the server log.
pub(crate) fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::server_error()),
    )
        .into_response()
}
