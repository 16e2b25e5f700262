//! Google identity provider.

use async_trait::async_trait;
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::oidc::render_error;
use crate::provider::{
    CallbackQuery, IdentityProvider, Profile, ProviderContext, find_or_create_user, finish_login,
    park_state, take_verified_state,
};

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const SCOPES: &str = "openid email profile";

pub struct GoogleProvider {
    ctx: ProviderContext,
    client_id: String,
    client_secret: String,
    redirect_url: String,
    auth_url: String,
    token_url: String,
    userinfo_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Claims Google's OIDC userinfo endpoint returns for our scope set.
#[derive(Debug, Deserialize)]
struct GoogleUser {
    email: String,
    #[serde(default)]
    picture: Option<String>,
}

impl GoogleProvider {
    pub fn new(ctx: ProviderContext, config: &ProviderConfig, base_url: &str) -> Self {
        Self {
            ctx,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_url: format!("{base_url}/google/callback"),
            auth_url: AUTH_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            userinfo_url: USERINFO_URL.to_string(),
        }
    }

    /// Same provider, pointed at stand-in endpoints. Tests use this to run
    /// the dance against a mock server.
    pub fn with_endpoints(
        mut self,
        auth_url: impl Into<String>,
        token_url: impl Into<String>,
        userinfo_url: impl Into<String>,
    ) -> Self {
        self.auth_url = auth_url.into();
        self.token_url = token_url.into();
        self.userinfo_url = userinfo_url.into();
        self
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, ProviderError> {
        let resp = self
            .ctx
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ProviderError::Status {
                status: resp.status(),
                context: "token exchange".to_string(),
            });
        }
        Ok(resp.json().await?)
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<Profile, ProviderError> {
        let resp = self
            .ctx
            .http
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ProviderError::Status {
                status: resp.status(),
                context: "userinfo fetch".to_string(),
            });
        }
        let u: GoogleUser = resp.json().await?;
        Ok(Profile {
            email: u.email,
            avatar_url: u.picture,
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    async fn login(&self, jar: CookieJar, return_to: String) -> Response {
        let (jar, state) = park_state(&self.ctx.states, jar, return_to);
        let url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_url),
            urlencoding::encode(SCOPES),
            urlencoding::encode(&state),
        );
        (jar, Redirect::to(&url)).into_response()
    }

    #[tracing::instrument(skip(self, jar, headers, query))]
    async fn callback(
        &self,
        jar: CookieJar,
        headers: &HeaderMap,
        query: CallbackQuery,
    ) -> Response {
        let parked = match take_verified_state(&self.ctx.states, &jar, &query) {
            Ok(p) => p,
            Err(resp) => return resp,
        };

        let token = match self.exchange_code(&query.code).await {
            Ok(t) => t,
            Err(e) => {
                tracing::error!("[Google] failed to exchange code for token: {e}");
                return render_error(
                    "failed to exchange code for token",
                    StatusCode::EXPECTATION_FAILED,
                );
            }
        };

        let profile = match self.fetch_profile(&token.access_token).await {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("[Google] failed to fetch user's info: {e}");
                return render_error("failed to fetch user's info", StatusCode::EXPECTATION_FAILED);
            }
        };

        let user_id = match find_or_create_user(&self.ctx, &profile).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("[Google] failed to provision user: {e}");
                return render_error(
                    "database operation failed",
                    StatusCode::INTERNAL_SERVER_ERROR,
                );
            }
        };

        finish_login(&self.ctx, headers, jar, &user_id, &parked.return_to).await
    }
}
