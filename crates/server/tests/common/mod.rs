//! Shared harness for integration tests: an in-memory database with the full
//! schema, a throwaway keystore and the exact router the binary serves.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum_test::TestServer;
use ed25519_dalek::SigningKey;
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{EncodePrivateKey, EncodePublicKey};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ConnectionTrait, Database, DatabaseConnection, DbBackend,
    Statement,
};
use signet::cache::{AuthzCodeCache, FederationStateCache};
use signet::config::{AppConfig, Providers, StorageConfig};
use signet::entity::{authz_history, client, user};
use signet::keys::SigningKeys;
use signet::password::hash_password;
use signet::provider::IdentityProvider;
use signet::session::SessionManager;
use signet::storage::{BlobStore, FsStore};
use signet::{AppState, api::build_router};
use tempfile::TempDir;
use time::OffsetDateTime;

pub const BASE_URL: &str = "http://localhost:3000";

/// Everything a test needs to drive the app and inspect its state.
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    // Held so the keystore and blob dir outlive the test.
    _keys_dir: TempDir,
    _blob_dir: TempDir,
}

pub async fn setup_db() -> Arc<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await.expect("connect");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            hashed_password TEXT NULL,
            avatar_url TEXT NULL,
            created_at TEXT NOT NULL
        );"#,
    ))
    .await
    .expect("create users table");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE clients (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            secret_hash TEXT NOT NULL,
            callback_urls TEXT NOT NULL,
            logout_callback_urls TEXT NOT NULL,
            backchannel_logout_url TEXT NULL,
            token_expiration INTEGER NOT NULL DEFAULT 3600,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );"#,
    ))
    .await
    .expect("create clients table");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE sessions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            client_id TEXT NULL,
            browser TEXT NULL,
            os TEXT NULL,
            expires_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        );"#,
    ))
    .await
    .expect("create sessions table");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE authz_history (
            user_id TEXT NOT NULL,
            client_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (user_id, client_id)
        );"#,
    ))
    .await
    .expect("create authz_history table");

    Arc::new(db)
}

fn write_keypair(dir: &std::path::Path) {
    let signing = SigningKey::generate(&mut rand::rngs::OsRng);
    let priv_pem = signing.to_pkcs8_pem(LineEnding::LF).expect("encode priv");
    let pub_pem = signing
        .verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .expect("encode pub");
    std::fs::write(dir.join("ed25519"), priv_pem.as_bytes()).expect("write priv");
    std::fs::write(dir.join("ed25519.pub"), pub_pem).expect("write pub");
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with_providers(HashMap::new()).await
}

/// Build the app around a pre-made database and provider registry.
///
/// Providers are injected by the federation tests, which construct them with
/// endpoints pointing at a mock server.
pub async fn spawn_app_with(
    db: Arc<DatabaseConnection>,
    codes: AuthzCodeCache,
    federation_states: FederationStateCache,
    providers: HashMap<String, Arc<dyn IdentityProvider>>,
) -> TestApp {
    let keys_dir = tempfile::tempdir().expect("keystore dir");
    write_keypair(keys_dir.path());
    let keys = Arc::new(SigningKeys::load(keys_dir.path().to_str().unwrap()).expect("load keys"));

    let blob_dir = tempfile::tempdir().expect("blob dir");
    let storage: Arc<dyn BlobStore> = Arc::new(FsStore::new(
        blob_dir.path(),
        format!("{BASE_URL}/static/avatars"),
    ));

    let config = Arc::new(AppConfig {
        base_url: BASE_URL.into(),
        port: 3000,
        database_url: "sqlite::memory:".into(),
        key_store: keys_dir.path().to_string_lossy().into_owned(),
        providers: Providers::default(),
        storage: StorageConfig {
            dir: blob_dir.path().to_string_lossy().into_owned(),
            public_base_url: format!("{BASE_URL}/static/avatars"),
        },
    });

    let state = AppState {
        sessions: SessionManager::new(db.clone()),
        db,
        config,
        keys,
        codes,
        federation_states,
        http: reqwest::Client::new(),
        storage,
        providers: Arc::new(providers),
    };

    let server = TestServer::new(build_router(state.clone())).expect("create test server");
    TestApp {
        server,
        state,
        _keys_dir: keys_dir,
        _blob_dir: blob_dir,
    }
}

pub async fn spawn_app_with_providers(
    providers: HashMap<String, Arc<dyn IdentityProvider>>,
) -> TestApp {
    let db = setup_db().await;
    spawn_app_with(
        db,
        AuthzCodeCache::default(),
        FederationStateCache::default(),
        providers,
    )
    .await
}

pub struct TestClient<'a> {
    pub id: &'a str,
    pub secret: &'a str,
    pub callback_urls: &'a [&'a str],
    pub logout_callback_urls: &'a [&'a str],
    pub backchannel_logout_url: Option<String>,
    pub token_expiration: i64,
}

impl Default for TestClient<'_> {
    fn default() -> Self {
        Self {
            id: "c1",
            secret: "client-secret",
            callback_urls: &["https://app.test/cb"],
            logout_callback_urls: &["https://app.test/loggedout"],
            backchannel_logout_url: None,
            token_expiration: 3600,
        }
    }
}

pub async fn insert_client(db: &DatabaseConnection, spec: TestClient<'_>) {
    let now = OffsetDateTime::now_utc();
    let row = client::ActiveModel {
        id: Set(spec.id.to_string()),
        name: Set(format!("{} app", spec.id)),
        secret_hash: Set(hash_password(spec.secret).expect("hash secret")),
        callback_urls: Set(serde_json::to_string(spec.callback_urls).unwrap()),
        logout_callback_urls: Set(serde_json::to_string(spec.logout_callback_urls).unwrap()),
        backchannel_logout_url: Set(spec.backchannel_logout_url),
        token_expiration: Set(spec.token_expiration),
        created_at: Set(now),
        updated_at: Set(now),
    };
    row.insert(db).await.expect("insert client");
}

pub async fn insert_user(db: &DatabaseConnection, id: &str, email: &str, password: &str) {
    let row = user::ActiveModel {
        id: Set(id.to_string()),
        email: Set(email.to_string()),
        hashed_password: Set(Some(hash_password(password).expect("hash password"))),
        avatar_url: Set(None),
        created_at: Set(OffsetDateTime::now_utc()),
    };
    row.insert(db).await.expect("insert user");
}

pub async fn record_consent(db: &DatabaseConnection, user_id: &str, client_id: &str) {
    let row = authz_history::ActiveModel {
        user_id: Set(user_id.to_string()),
        client_id: Set(client_id.to_string()),
        created_at: Set(OffsetDateTime::now_utc()),
    };
    row.insert(db).await.expect("insert consent record");
}

/// Log a browser session in directly through the session manager and return
/// the cookie header value carrying it.
pub async fn browser_session(app: &TestApp, user_id: &str) -> String {
    let id = app
        .state
        .sessions
        .create(
            user_id,
            &signet::util::Fingerprint::default(),
            time::Duration::hours(4),
            None,
        )
        .await
        .expect("create session");
    format!("auth_session={id}")
}

/// Pull one query parameter out of a redirect Location.
pub fn location_param(location: &str, key: &str) -> Option<String> {
    let (_, query) = location.split_once('?')?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}
