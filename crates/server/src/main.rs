use std::sync::Arc;

use sea_orm::Database;
use signet::api::start_webserver;
use signet::cache::{AuthzCodeCache, FederationStateCache};
use signet::config::load_config_or_panic;
use signet::keys::SigningKeys;
use signet::provider::{ProviderContext, build_registry};
use signet::session::SessionManager;
use signet::storage::FsStore;
use signet::{AppState, storage::BlobStore};
use tokio::time::{Duration, interval};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "signet=info,hyper=warn,sea_orm=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install().expect("Failed to install `color_eyre::install`");
    initialize_tracing();

    // Load config and the signing key material; both are fatal if broken.
    let config = Arc::new(load_config_or_panic());
    let keys = Arc::new(SigningKeys::load(&config.key_store)?);

    // Set up SeaORM database connection
    let db = Arc::new(
        Database::connect(&config.database_url)
            .await
            .expect("Failed to connect to database"),
    );

    let sessions = SessionManager::new(db.clone());
    let codes = AuthzCodeCache::default();
    let federation_states = FederationStateCache::default();
    let http = reqwest::Client::new();
    let storage: Arc<dyn BlobStore> = Arc::new(FsStore::new(
        &config.storage.dir,
        &config.storage.public_base_url,
    ));

    let providers = Arc::new(build_registry(
        &config,
        &ProviderContext {
            db: db.clone(),
            http: http.clone(),
            storage: storage.clone(),
            sessions: sessions.clone(),
            states: federation_states.clone(),
        },
    ));

    let state = AppState {
        db,
        config,
        keys,
        sessions,
        codes,
        federation_states,
        http,
        storage,
        providers,
    };

    // Sweep expired authorization codes and federation state. The caches only
    // drop entries when this runs; reads never check expiry.
    {
        let codes = state.codes.clone();
        let federation_states = state.federation_states.clone();
        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                codes.sweep_expired();
                federation_states.sweep_expired();
            }
        });
    }

    // Purge expired session rows out of band; request handling treats them as
    // invalid without deleting them inline.
    {
        let sessions = state.sessions.clone();
        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(300));
            loop {
                interval.tick().await;
                match sessions.delete_expired().await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!(purged = n, "Deleted expired sessions"),
                    Err(e) => tracing::error!("Failed to purge expired sessions: {e}"),
                }
            }
        });
    }

    start_webserver(state).await?;
    Ok(())
}
