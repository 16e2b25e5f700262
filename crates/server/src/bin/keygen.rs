//! Generates the Ed25519 keypair the server signs tokens with.
//!
//! Writes PEM-encoded `ed25519` (PKCS#8) and `ed25519.pub` files into the
//! key store directory given as the first argument.

use std::path::Path;

use color_eyre::eyre::{WrapErr, eyre};
use ed25519_dalek::SigningKey;
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{EncodePrivateKey, EncodePublicKey};

fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;

    let dir = std::env::args()
        .nth(1)
        .ok_or_else(|| eyre!("usage: signet-keygen <key-store-dir>"))?;
    let dir = Path::new(&dir);
    std::fs::create_dir_all(dir).wrap_err("failed to create key store directory")?;

    let priv_path = dir.join("ed25519");
    let pub_path = dir.join("ed25519.pub");
    if priv_path.exists() || pub_path.exists() {
        return Err(eyre!("key files already exist in {}", dir.display()));
    }

    let signing = SigningKey::generate(&mut rand::rngs::OsRng);
    let priv_pem = signing
        .to_pkcs8_pem(LineEnding::LF)
        .wrap_err("failed to encode private key")?;
    let pub_pem = signing
        .verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .wrap_err("failed to encode public key")?;

    std::fs::write(&priv_path, priv_pem.as_bytes()).wrap_err("failed to write private key")?;
    std::fs::write(&pub_path, pub_pem).wrap_err("failed to write public key")?;

    println!("wrote {}", priv_path.display());
    println!("wrote {}", pub_path.display());
    Ok(())
}
