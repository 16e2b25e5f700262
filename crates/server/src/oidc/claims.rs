//! Claims carried by the tokens this server signs.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

pub const SCOPE_OPENID: &str = "openid";
pub const SCOPE_PROFILE: &str = "profile";

/// Access token lifetime in seconds.
pub const ACCESS_TOKEN_LIFETIME: i64 = 1800;

/// Event URI identifying a back-channel logout token.
pub const BACKCHANNEL_LOGOUT_EVENT: &str = "http://schemas.openid.net/event/backchannel-logout";

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    /// The userinfo endpoint, the only resource this token is good for.
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub user_id: String,
    pub scopes: Vec<String>,
}

impl AccessTokenClaims {
    pub fn new(base_url: &str, client_id: &str, user_id: &str, scopes: Vec<String>) -> Self {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        Self {
            iss: base_url.to_string(),
            sub: format!("{base_url}/userinfo"),
            aud: client_id.to_string(),
            iat: now,
            nbf: now,
            exp: now + ACCESS_TOKEN_LIFETIME,
            user_id: user_id.to_string(),
            scopes,
        }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    /// Session id linking the token to a server-side session row.
    pub sid: String,
}

impl IdTokenClaims {
    pub fn new(base_url: &str, client_id: &str, sid: &str, lifetime: Duration) -> Self {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        Self {
            iss: base_url.to_string(),
            sub: client_id.to_string(),
            aud: client_id.to_string(),
            iat: now,
            nbf: now,
            exp: now + lifetime.whole_seconds(),
            sid: sid.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    /// Names the back-channel logout event type, as relying parties expect.
    pub events: serde_json::Value,
    pub sid: String,
}

impl LogoutTokenClaims {
    pub fn new(base_url: &str, client_id: &str, sid: &str) -> Self {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        Self {
            iss: base_url.to_string(),
            sub: client_id.to_string(),
            aud: client_id.to_string(),
            iat: now,
            nbf: now,
            exp: now + Duration::minutes(2).whole_seconds(),
            events: serde_json::json!({ BACKCHANNEL_LOGOUT_EVENT: {} }),
            sid: sid.to_string(),
        }
    }
}
