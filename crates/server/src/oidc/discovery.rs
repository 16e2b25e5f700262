//! Discovery and key metadata endpoints.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::AppState;
use crate::keys::KEY_ID;
use crate::oidc::OIDC_TAG;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub end_session_endpoint: String,
    pub scopes_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
    pub response_modes_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub claims_supported: Vec<String>,
    pub request_uri_parameter_supported: bool,
    pub request_parameter_supported: bool,
    pub backchannel_logout_supported: bool,
    pub backchannel_logout_session_supported: bool,
}

/// OpenID Connect Discovery document.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/.well-known/openid-configuration",
    tag = OIDC_TAG,
    operation_id = "OpenID Connect Discovery",
    summary = "Provider metadata",
    responses(
        (status = 200, description = "OpenID Connect configuration document", body = DiscoveryDocument),
    )
)]
pub async fn openid_configuration(State(state): State<AppState>) -> Json<DiscoveryDocument> {
    let base = &state.config.base_url;
    Json(DiscoveryDocument {
        issuer: base.clone(),
        authorization_endpoint: format!("{base}/authorize"),
        token_endpoint: format!("{base}/oauth/token"),
        userinfo_endpoint: format!("{base}/userinfo"),
        jwks_uri: format!("{base}/.well-known/jwks.json"),
        end_session_endpoint: format!("{base}/oidc/logout"),
        scopes_supported: vec!["openid".to_string(), "profile".to_string()],
        response_types_supported: vec!["code".to_string()],
        response_modes_supported: vec!["query".to_string()],
        subject_types_supported: vec!["public".to_string()],
        id_token_signing_alg_values_supported: vec!["EdDSA".to_string()],
        token_endpoint_auth_methods_supported: vec!["client_secret_post".to_string()],
        claims_supported: vec![
            "iss".to_string(),
            "aud".to_string(),
            "sub".to_string(),
            "iat".to_string(),
            "exp".to_string(),
            "sid".to_string(),
        ],
        request_uri_parameter_supported: false,
        request_parameter_supported: false,
        backchannel_logout_supported: true,
        backchannel_logout_session_supported: true,
    })
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Jwk {
    pub kty: String,
    pub kid: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub use_: String,
    pub crv: String,
    pub x: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// JSON Web Key Set: the Ed25519 verification key relying parties use to
/// check token signatures.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/.well-known/jwks.json",
    tag = OIDC_TAG,
    operation_id = "JSON Web Key Set",
    summary = "Token verification keys",
    responses(
        (status = 200, description = "JWKS document", body = JwkSet),
    )
)]
pub async fn jwks(State(state): State<AppState>) -> Json<JwkSet> {
    Json(JwkSet {
        keys: vec![Jwk {
            kty: "OKP".to_string(),
            kid: KEY_ID.to_string(),
            alg: "EdDSA".to_string(),
            use_: "sig".to_string(),
            crv: "Ed25519".to_string(),
            x: state.keys.public_key_base64url(),
        }],
    })
}
