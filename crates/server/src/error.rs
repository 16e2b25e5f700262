use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid PEM block in {0}: expected a {1} block")]
    InvalidPem(String, &'static str),
    #[error("Failed to parse Ed25519 key from {0}")]
    InvalidKey(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to write blob {key}: {source}")]
    Write {
        key: String,
        source: std::io::Error,
    },
    #[error("Invalid blob key: {0}")]
    InvalidKey(String),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("Provider returned HTTP {status}: {context}")]
    Status {
        status: reqwest::StatusCode,
        context: String,
    },
    #[error("Provider response is missing the {0} field")]
    MissingField(&'static str),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Database error: {0}")]
    Db(#[from] sea_orm::DbErr),
}
