//! Federation adapter tests, with the upstream provider played by wiremock.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{HeaderValue, StatusCode, header};
use common::*;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use signet::cache::{AuthzCodeCache, FederationStateCache};
use signet::config::ProviderConfig;
use signet::entity::{session, user};
use signet::provider::github::GitHubProvider;
use signet::provider::{IdentityProvider, ProviderContext};
use signet::session::SessionManager;
use signet::storage::{BlobStore, FsStore};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// App with a GitHub provider whose endpoints all point at `upstream`.
async fn spawn_federated_app(upstream: &MockServer) -> (TestApp, TempStorage) {
    let db = setup_db().await;
    let states = FederationStateCache::default();
    let blob_dir = tempfile::tempdir().expect("blob dir");
    let storage: Arc<dyn BlobStore> = Arc::new(FsStore::new(
        blob_dir.path(),
        format!("{BASE_URL}/static/avatars"),
    ));

    let ctx = ProviderContext {
        db: db.clone(),
        http: reqwest::Client::new(),
        storage,
        sessions: SessionManager::new(db.clone()),
        states: states.clone(),
    };
    let config = ProviderConfig {
        enable: true,
        client_id: "gh-client".into(),
        client_secret: "gh-secret".into(),
    };
    let provider = GitHubProvider::new(ctx, &config, BASE_URL).with_endpoints(
        format!("{}/login/oauth/authorize", upstream.uri()),
        format!("{}/login/oauth/access_token", upstream.uri()),
        format!("{}/user", upstream.uri()),
    );

    let mut providers: HashMap<String, Arc<dyn IdentityProvider>> = HashMap::new();
    providers.insert("github".to_string(), Arc::new(provider));

    let app = spawn_app_with(db, AuthzCodeCache::default(), states, providers).await;
    (app, TempStorage { _dir: blob_dir })
}

/// Keeps the provider's blob directory alive for the test duration.
struct TempStorage {
    _dir: tempfile::TempDir,
}

/// Start the login leg and pull out the parked state and fed cookie.
async fn begin_login(app: &TestApp, return_to: &str) -> (String, String) {
    let response = app
        .server
        .get("/github/login")
        .add_query_param("return_to", return_to)
        .await;
    response.assert_status_see_other();

    let location = response.headers().get(header::LOCATION).unwrap().to_str().unwrap().to_string();
    let state = location_param(&location, "state").expect("state in provider URL");

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("fed_session cookie")
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("fed_session="));
    let cookie = set_cookie.split(';').next().unwrap().to_string();

    (state, cookie)
}

#[tokio::test]
async fn login_parks_state_and_redirects_to_the_provider() {
    let upstream = MockServer::start().await;
    let (app, _storage) = spawn_federated_app(&upstream).await;

    let response = app
        .server
        .get("/github/login")
        .add_query_param("return_to", "/dashboard")
        .await;
    response.assert_status_see_other();

    let location = response.headers().get(header::LOCATION).unwrap().to_str().unwrap().to_string();
    assert!(location.starts_with(&format!("{}/login/oauth/authorize?", upstream.uri())));
    assert_eq!(location_param(&location, "client_id").as_deref(), Some("gh-client"));
    let state = location_param(&location, "state").expect("state");
    assert_eq!(state.len(), 25);
}

#[tokio::test]
async fn unknown_provider_slug_is_not_found() {
    let upstream = MockServer::start().await;
    let (app, _storage) = spawn_federated_app(&upstream).await;

    let response = app.server.get("/google/login").await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn callback_with_tampered_state_creates_no_session() {
    let upstream = MockServer::start().await;
    let (app, _storage) = spawn_federated_app(&upstream).await;

    let (_state, cookie) = begin_login(&app, "/").await;

    let response = app
        .server
        .get("/github/callback")
        .add_query_param("code", "upstream-code")
        .add_query_param("state", "attacker-chosen-state")
        .add_header(header::COOKIE, HeaderValue::from_str(&cookie).unwrap())
        .await;

    response.assert_status_bad_request();
    assert!(response.text().contains("invalid state"));

    let sessions = session::Entity::find().all(app.state.db.as_ref()).await.unwrap();
    assert!(sessions.is_empty());
    let users = user::Entity::find().all(app.state.db.as_ref()).await.unwrap();
    assert!(users.is_empty());
}

#[tokio::test]
async fn callback_with_provider_error_creates_no_session() {
    let upstream = MockServer::start().await;
    let (app, _storage) = spawn_federated_app(&upstream).await;

    let (state, cookie) = begin_login(&app, "/").await;

    let response = app
        .server
        .get("/github/callback")
        .add_query_param("error", "access_denied")
        .add_query_param("error_description", "user cancelled")
        .add_query_param("state", &state)
        .add_header(header::COOKIE, HeaderValue::from_str(&cookie).unwrap())
        .await;

    response.assert_status(StatusCode::EXPECTATION_FAILED);
    let sessions = session::Entity::find().all(app.state.db.as_ref()).await.unwrap();
    assert!(sessions.is_empty());
}

#[tokio::test]
async fn callback_provisions_a_user_with_mirrored_avatar_and_logs_in() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "gh-access-token",
            "token_type": "bearer",
        })))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "email": "dev@example.com",
            "avatar_url": format!("{}/avatar.png", upstream.uri()),
        })))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/avatar.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png-bytes".to_vec()))
        .mount(&upstream)
        .await;

    let (app, _storage) = spawn_federated_app(&upstream).await;
    let (state, cookie) = begin_login(&app, "/dashboard").await;

    let response = app
        .server
        .get("/github/callback")
        .add_query_param("code", "upstream-code")
        .add_query_param("state", &state)
        .add_header(header::COOKIE, HeaderValue::from_str(&cookie).unwrap())
        .await;

    response.assert_status(StatusCode::FOUND);
    let location = response.headers().get(header::LOCATION).unwrap().to_str().unwrap().to_string();
    assert_eq!(location, "/dashboard");

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("auth_session cookie")
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("auth_session="));

    // The user exists, has no password and carries the mirrored avatar URL.
    let u = user::Entity::find()
        .filter(user::Column::Email.eq("dev@example.com"))
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .expect("provisioned user");
    assert!(u.hashed_password.is_none());
    let avatar_url = u.avatar_url.expect("avatar url");
    assert!(avatar_url.starts_with(&format!("{BASE_URL}/static/avatars/")));

    let session_id = set_cookie
        .trim_start_matches("auth_session=")
        .split(';')
        .next()
        .unwrap();
    let sess = app
        .state
        .sessions
        .validate(session_id)
        .await
        .unwrap()
        .expect("live session");
    assert_eq!(sess.user_id, u.id);
    assert_eq!(sess.client_id, None);
}

#[tokio::test]
async fn second_federated_login_reuses_the_user() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "gh-access-token",
        })))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "email": "dev@example.com",
            "avatar_url": null,
        })))
        .mount(&upstream)
        .await;

    let (app, _storage) = spawn_federated_app(&upstream).await;

    for _ in 0..2 {
        let (state, cookie) = begin_login(&app, "/").await;
        let response = app
            .server
            .get("/github/callback")
            .add_query_param("code", "upstream-code")
            .add_query_param("state", &state)
            .add_header(header::COOKIE, HeaderValue::from_str(&cookie).unwrap())
            .await;
        response.assert_status(StatusCode::FOUND);
    }

    let users = user::Entity::find().all(app.state.db.as_ref()).await.unwrap();
    assert_eq!(users.len(), 1);
    let sessions = session::Entity::find().all(app.state.db.as_ref()).await.unwrap();
    assert_eq!(sessions.len(), 2);
}

#[tokio::test]
async fn hidden_email_falls_back_to_the_emails_endpoint() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "gh-access-token",
        })))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "email": null,
            "avatar_url": null,
        })))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/user/emails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "email": "secondary@example.com", "primary": false, "verified": true },
            { "email": "primary@example.com", "primary": true, "verified": true },
        ])))
        .mount(&upstream)
        .await;

    let (app, _storage) = spawn_federated_app(&upstream).await;
    let (state, cookie) = begin_login(&app, "/").await;

    let response = app
        .server
        .get("/github/callback")
        .add_query_param("code", "upstream-code")
        .add_query_param("state", &state)
        .add_header(header::COOKIE, HeaderValue::from_str(&cookie).unwrap())
        .await;
    response.assert_status(StatusCode::FOUND);

    let u = user::Entity::find()
        .one(app.state.db.as_ref())
        .await
        .unwrap()
        .expect("user");
    assert_eq!(u.email, "primary@example.com");
}
