//! GitHub identity provider.
//!
//! GitHub is plain OAuth2, not OIDC: the profile comes from the REST API, and
//! users who hide their email need a second call to the emails endpoint.

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

const AUTH_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const USER_URL: &str = "https://api.github.com/user";
const SCOPES: &str = "read:user user:email";

/// GitHub's API rejects requests without a User-Agent.
const USER_AGENT: &str = concat!("signet/", env!("CARGO_PKG_VERSION"));

pub struct GitHubProvider {
    ctx: ProviderContext,
    client_id: String,
    client_secret: String,
    redirect_url: String,
    auth_url: String,
    token_url: String,
    user_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

impl GitHubProvider {
    pub fn new(ctx: ProviderContext, config: &ProviderConfig, base_url: &str) -> Self {
        Self {
            ctx,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_url: format!("{base_url}/github/callback"),
            auth_url: AUTH_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            user_url: USER_URL.to_string(),
        }
    }

    /// Same provider, pointed at stand-in endpoints. Tests use this to run
    /// the dance against a mock server.
    pub fn with_endpoints(
        mut self,
        auth_url: impl Into<String>,
        token_url: impl Into<String>,
        user_url: impl Into<String>,
    ) -> Self {
        self.auth_url = auth_url.into();
        self.token_url = token_url.into();
        self.user_url = user_url.into();
        self
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, ProviderError> {
        let resp = self
            .ctx
            .http
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&[
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
            .get(&self.user_url)
            .bearer_auth(access_token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ProviderError::Status {
                status: resp.status(),
                context: "profile fetch".to_string(),
            });
        }
        let u: GitHubUser = resp.json().await?;

        let email = match u.email {
            Some(e) if !e.is_empty() => e,
            _ => self.fetch_primary_email(access_token).await?,
        };
        Ok(Profile {
            email,
            avatar_url: u.avatar_url,
        })
    }

    async fn fetch_primary_email(&self, access_token: &str) -> Result<String, ProviderError> {
        let resp = self
            .ctx
            .http
            .get(format!("{}/emails", self.user_url))
            .bearer_auth(access_token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ProviderError::Status {
                status: resp.status(),
                context: "email fetch".to_string(),
            });
        }
        let emails: Vec<GitHubEmail> = resp.json().await?;
        emails
            .into_iter()
            .find(|e| e.primary && e.verified)
            .map(|e| e.email)
            .ok_or(ProviderError::MissingField("email"))
    }
}

#[async_trait]
impl IdentityProvider for GitHubProvider {
    async fn login(&self, jar: CookieJar, return_to: String) -> Response {
        let (jar, state) = park_state(&self.ctx.states, jar, return_to);
        let url = format!(
            "{}?client_id={}&redirect_uri={}&scope={}&state={}",
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
                tracing::error!("[GitHub] failed to exchange code for token: {e}");
                return render_error(
                    "failed to exchange code for token",
                    StatusCode::EXPECTATION_FAILED,
                );
            }
        };

        let profile = match self.fetch_profile(&token.access_token).await {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("[GitHub] failed to fetch user's info: {e}");
                return render_error("failed to fetch user's info", StatusCode::EXPECTATION_FAILED);
            }
        };

        let user_id = match find_or_create_user(&self.ctx, &profile).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("[GitHub] failed to provision user: {e}");
                return render_error(
                    "database operation failed",
                    StatusCode::INTERNAL_SERVER_ERROR,
                );
            }
        };

        finish_login(&self.ctx, headers, jar, &user_id, &parked.return_to).await
    }
}
