//! First-party authentication: signup, password login and browser logout.
//!
//! These establish the long-lived `auth_session` the authorization endpoint
//! requires. The HTML pages themselves are served elsewhere; these handlers
//! take the form POSTs and answer with cookies and redirects, reporting
//! failures as structured JSON the pages surface.

use axum::{
    Form, Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use serde::Deserialize;
use time::OffsetDateTime;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::AppState;
use crate::entity::user;
use crate::oidc::authorize::fingerprint_from_headers;
use crate::oidc::{ErrorResponse, found, internal_error};
use crate::password::{hash_password, verify_password};
use crate::session::{
    DEFAULT_SESSION_TTL, SESSION_COOKIE, SessionManager, expired_session_cookie, session_cookie,
};
use crate::util::random_opaque;

/// OpenAPI tag for first-party authentication endpoints.
pub const AUTH_TAG: &str = "Authentication";

/// Length of opaque user identifiers.
const USER_ID_LEN: usize = 25;

pub fn router() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(login))
        .routes(routes!(signup))
        .routes(routes!(logout))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub return_to: String,
}

/// Password login.
#[tracing::instrument(skip(state, headers, jar, form), fields(email = %form.email))]
#[utoipa::path(
    post,
    path = "/login",
    tag = AUTH_TAG,
    operation_id = "Login",
    summary = "Authenticate with email and password",
    request_body(
        content = LoginForm,
        content_type = "application/x-www-form-urlencoded",
        description = "Credentials plus the URI to return to afterwards"
    ),
    responses(
        (status = 302, description = "Session created, cookie set, redirect to return_to"),
        (status = 400, description = "Invalid credentials", body = ErrorResponse),
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    if validate_email(&form.email).is_err() || form.password.is_empty() {
        return invalid_credentials();
    }

    let u = match user::Entity::find()
        .filter(user::Column::Email.eq(&form.email))
        .one(state.db.as_ref())
        .await
    {
        Ok(Some(u)) => u,
        // Same answer whether the email is unknown or the password is wrong.
        Ok(None) => return invalid_credentials(),
        Err(e) => {
            tracing::error!("Failed to read user from store: {e}");
            return internal_error();
        }
    };

    // Accounts created through a federated login have no password.
    let Some(hash) = u.hashed_password.as_deref() else {
        return invalid_credentials();
    };
    if !verify_password(&form.password, hash) {
        return invalid_credentials();
    }

    establish_session(&state.sessions, &headers, jar, &u.id, &form.return_to).await
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignUpForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
    #[serde(default)]
    pub return_to: String,
}

/// Account creation.
#[tracing::instrument(skip(state, headers, jar, form), fields(email = %form.email))]
#[utoipa::path(
    post,
    path = "/signup",
    tag = AUTH_TAG,
    operation_id = "Sign Up",
    summary = "Create an account with email and password",
    request_body(
        content = SignUpForm,
        content_type = "application/x-www-form-urlencoded",
        description = "New account details"
    ),
    responses(
        (status = 302, description = "Account and session created, redirect to return_to"),
        (status = 400, description = "Validation failure", body = ErrorResponse),
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Form(form): Form<SignUpForm>,
) -> Response {
    if let Err(desc) = validate_email(&form.email) {
        return signup_error(desc);
    }
    if let Err(desc) = validate_password(&form.password) {
        return signup_error(desc);
    }
    if form.password != form.confirm_password {
        return signup_error("passwords do not match");
    }

    match user::Entity::find()
        .filter(user::Column::Email.eq(&form.email))
        .one(state.db.as_ref())
        .await
    {
        Ok(Some(_)) => return signup_error("user already exists"),
        Ok(None) => {}
        Err(e) => {
            tracing::error!("Failed to read user from store: {e}");
            return internal_error();
        }
    }

    let hash = match hash_password(&form.password) {
        Ok(h) => h,
        Err(e) => {
            tracing::error!("Failed to hash password: {e}");
            return internal_error();
        }
    };

    let user_id = random_opaque(USER_ID_LEN);
    let row = user::ActiveModel {
        id: Set(user_id.clone()),
        email: Set(form.email.clone()),
        hashed_password: Set(Some(hash)),
        avatar_url: Set(None),
        created_at: Set(OffsetDateTime::now_utc()),
    };
    if let Err(e) = row.insert(state.db.as_ref()).await {
        tracing::error!("Failed to insert user: {e}");
        return internal_error();
    }

    tracing::info!(user_id = %user_id, "Account created");
    establish_session(&state.sessions, &headers, jar, &user_id, &form.return_to).await
}

/// Browser logout: clear the cookie and delete the session row.
#[tracing::instrument(skip(state, jar))]
#[utoipa::path(
    get,
    path = "/logout",
    tag = AUTH_TAG,
    operation_id = "Logout",
    summary = "End the browser session",
    responses(
        (status = 302, description = "Cookie cleared, redirect to the login page"),
    )
)]
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    let jar = match jar.get(SESSION_COOKIE) {
        Some(cookie) => {
            if let Err(e) = state.sessions.revoke(cookie.value()).await {
                tracing::error!("Failed to delete session: {e}");
            }
            jar.add(expired_session_cookie())
        }
        None => jar,
    };
    (jar, found("/login")).into_response()
}

/// Shared tail of every login path, first-party or federated: create the
/// session, set the cookie, bounce to `return_to`.
pub(crate) async fn establish_session(
    sessions: &SessionManager,
    headers: &HeaderMap,
    jar: CookieJar,
    user_id: &str,
    return_to: &str,
) -> Response {
    let fingerprint = fingerprint_from_headers(headers);
    let id = match sessions
        .create(user_id, &fingerprint, DEFAULT_SESSION_TTL, None)
        .await
    {
        Ok(id) => id,
        Err(e) => {
            tracing::error!("Failed to insert session: {e}");
            return internal_error();
        }
    };

    let jar = jar.add(session_cookie(id, DEFAULT_SESSION_TTL));
    let target = if return_to.is_empty() { "/" } else { return_to };
    (jar, found(target)).into_response()
}

fn validate_email(email: &str) -> Result<(), &'static str> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err("invalid email address");
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') || email.len() > 254 {
        return Err("invalid email address");
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 || password.len() > 70 {
        return Err("password must be between 8 and 70 characters");
    }
    Ok(())
}

fn invalid_credentials() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(
            "invalid_credentials",
            "invalid email or password",
        )),
    )
        .into_response()
}

fn signup_error(description: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new("invalid_request", description)),
    )
        .into_response()
}
