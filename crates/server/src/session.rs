//! Session lifecycle management.
//!
//! Sessions are opaque 25-character ids stored in the database and carried in
//! the `auth_session` cookie. Interactive logins (password or federated) get
//! a 4 hour TTL; sessions minted by the token endpoint live as long as their
//! ID token.

use std::sync::Arc;

use axum_extra::extract::cookie::{Cookie, SameSite};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use time::{Duration, OffsetDateTime};

use crate::entity::session;
use crate::util::{Fingerprint, random_opaque};

/// Name of the long-lived authentication cookie.
pub const SESSION_COOKIE: &str = "auth_session";

/// Default TTL for interactive (browser) logins.
pub const DEFAULT_SESSION_TTL: Duration = Duration::hours(4);

/// Length of opaque session identifiers.
const SESSION_ID_LEN: usize = 25;

#[derive(Clone)]
pub struct SessionManager {
    db: Arc<DatabaseConnection>,
}

impl SessionManager {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Create a session row and return its id for cookie issuance.
    ///
    /// `client_id` is set only for sessions issued by the token endpoint.
    #[tracing::instrument(skip(self, fingerprint))]
    pub async fn create(
        &self,
        user_id: &str,
        fingerprint: &Fingerprint,
        ttl: Duration,
        client_id: Option<&str>,
    ) -> Result<String, sea_orm::DbErr> {
        let id = random_opaque(SESSION_ID_LEN);
        self.create_with_id(&id, user_id, fingerprint, ttl, client_id)
            .await?;
        Ok(id)
    }

    /// Create a session under a caller-chosen id.
    ///
    /// The token endpoint mints the id up front so it can appear as the ID
    /// token's `sid` claim before the row exists.
    #[tracing::instrument(skip(self, id, fingerprint))]
    pub async fn create_with_id(
        &self,
        id: &str,
        user_id: &str,
        fingerprint: &Fingerprint,
        ttl: Duration,
        client_id: Option<&str>,
    ) -> Result<(), sea_orm::DbErr> {
        let now = OffsetDateTime::now_utc();
        let row = session::ActiveModel {
            id: Set(id.to_string()),
            user_id: Set(user_id.to_string()),
            client_id: Set(client_id.map(String::from)),
            browser: Set(fingerprint.browser.clone()),
            os: Set(fingerprint.os.clone()),
            expires_at: Set(now + ttl),
            created_at: Set(now),
        };
        row.insert(self.db.as_ref()).await?;
        Ok(())
    }

    /// Look up a session by its cookie value.
    ///
    /// Returns `None` for unknown ids and for expired-but-unpurged rows; the
    /// row is left in place for the purge task.
    #[tracing::instrument(skip_all)]
    pub async fn validate(&self, cookie_value: &str) -> Result<Option<session::Model>, sea_orm::DbErr> {
        let sess = session::Entity::find_by_id(cookie_value)
            .one(self.db.as_ref())
            .await?;
        Ok(sess.filter(|s| !s.is_expired()))
    }

    /// Delete a session. Idempotent: revoking an unknown id is not an error.
    #[tracing::instrument(skip_all)]
    pub async fn revoke(&self, id: &str) -> Result<(), sea_orm::DbErr> {
        session::Entity::delete_by_id(id)
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// Purge expired rows. Invoked on a schedule, never from request paths.
    #[tracing::instrument(skip(self))]
    pub async fn delete_expired(&self) -> Result<u64, sea_orm::DbErr> {
        let result = session::Entity::delete_many()
            .filter(session::Column::ExpiresAt.lt(OffsetDateTime::now_utc()))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }
}

/// Build the `auth_session` cookie for a freshly created session.
pub fn session_cookie(id: String, ttl: Duration) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(ttl)
        .build()
}

/// An immediately expired cookie, used to clear the browser's copy on logout.
pub fn expired_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(Duration::ZERO)
        .build()
}
