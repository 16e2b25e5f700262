//! Process-wide Ed25519 signing key material.
//!
//! The keypair is read once at startup from a key store directory holding
//! PEM-encoded `ed25519` (PKCS#8 `PRIVATE KEY`) and `ed25519.pub`
//! (`PUBLIC KEY`) files and is immutable for the process lifetime. Every
//! access, ID and logout token this server issues is signed with it.

use std::path::Path;

use ed25519_dalek::VerifyingKey;
use ed25519_dalek::pkcs8::DecodePublicKey;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::KeyStoreError;

/// Key id advertised in JWKS and stamped into every JWT header.
pub const KEY_ID: &str = "ed25519-key-1";

pub struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    /// Raw public key bytes, exposed for the JWKS document.
    public: [u8; 32],
}

impl SigningKeys {
    /// Read the keypair from the key store directory.
    pub fn load(key_store: &str) -> Result<Self, KeyStoreError> {
        let priv_path = Path::new(key_store).join("ed25519");
        let pub_path = Path::new(key_store).join("ed25519.pub");

        let priv_pem = read_pem(&priv_path, "PRIVATE KEY")?;
        let pub_pem = read_pem(&pub_path, "PUBLIC KEY")?;

        let encoding = EncodingKey::from_ed_pem(priv_pem.as_bytes())
            .map_err(|_| KeyStoreError::InvalidKey(priv_path.display().to_string()))?;
        let decoding = DecodingKey::from_ed_pem(pub_pem.as_bytes())
            .map_err(|_| KeyStoreError::InvalidKey(pub_path.display().to_string()))?;
        let public = VerifyingKey::from_public_key_pem(&pub_pem)
            .map_err(|_| KeyStoreError::InvalidKey(pub_path.display().to_string()))?
            .to_bytes();

        Ok(Self {
            encoding,
            decoding,
            public,
        })
    }

    /// Sign a claims struct into a compact EdDSA JWT.
    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, jsonwebtoken::errors::Error> {
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(KEY_ID.to_string());
        jsonwebtoken::encode(&header, claims, &self.encoding)
    }

    /// Verify an EdDSA JWT's signature and expiry and decode its claims.
    ///
    /// Audience is intentionally not validated here: tokens carry a per-client
    /// audience and the engines check the binding they care about themselves.
    pub fn verify<T: DeserializeOwned>(
        &self,
        token: &str,
    ) -> Result<T, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.validate_aud = false;
        validation.leeway = 0;
        jsonwebtoken::decode::<T>(token, &self.decoding, &validation).map(|data| data.claims)
    }

    /// Base64url-encoded public key, the `x` coordinate in JWKS.
    pub fn public_key_base64url(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(self.public)
    }
}

fn read_pem(path: &Path, expected_block: &'static str) -> Result<String, KeyStoreError> {
    let data = std::fs::read_to_string(path).map_err(|source| KeyStoreError::Io {
        path: path.display().to_string(),
        source,
    })?;
    if !data.contains(&format!("-----BEGIN {expected_block}-----")) {
        return Err(KeyStoreError::InvalidPem(
            path.display().to_string(),
            expected_block,
        ));
    }
    Ok(data)
}
