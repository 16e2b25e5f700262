use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Public base URL of this server, used as the token issuer and to build
    /// redirect URLs. Stored without a trailing slash.
    pub base_url: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database_url: String,
    /// Directory holding the PEM-encoded `ed25519` / `ed25519.pub` key files.
    pub key_store: String,
    #[serde(default)]
    pub providers: Providers,
    pub storage: StorageConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct Providers {
    #[serde(default)]
    pub google: ProviderConfig,
    #[serde(default)]
    pub github: ProviderConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    /// Directory avatar blobs are written to.
    pub dir: String,
    /// Base URL under which stored blobs are reachable.
    pub public_base_url: String,
}

fn default_port() -> u16 {
    3000
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any environment variable matching the key path separated by double
/// underscores (e.g. `PROVIDERS__GOOGLE__CLIENT_ID`) overrides the file
/// value.
///
/// Returns a `ConfigError` instead of panicking so the caller can decide how
/// to fail.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml"))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let mut app: AppConfig = cfg.try_deserialize()?;
    validate(&mut app)?;
    Ok(app)
}

fn validate(app: &mut AppConfig) -> Result<(), ConfigError> {
    if app.base_url.is_empty() {
        return Err(ConfigError::Validation("base_url must be set".into()));
    }
    if url::Url::parse(&app.base_url).is_err() {
        return Err(ConfigError::Validation(format!(
            "base_url {:?} is not a valid URL",
            app.base_url
        )));
    }
    while app.base_url.ends_with('/') {
        app.base_url.pop();
    }

    if app.key_store.is_empty() {
        return Err(ConfigError::Validation("key_store must be set".into()));
    }

    for (name, p) in [("google", &app.providers.google), ("github", &app.providers.github)] {
        if !p.enable {
            continue;
        }
        if p.client_id.is_empty() || p.client_secret.is_empty() {
            return Err(ConfigError::Validation(format!(
                "provider {name} is enabled but has no client credentials"
            )));
        }
    }

    if app.storage.dir.is_empty() {
        return Err(ConfigError::Validation("storage.dir must be set".into()));
    }

    Ok(())
}

/// Convenience helper for binaries wanting panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}
