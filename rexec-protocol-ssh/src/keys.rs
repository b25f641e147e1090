use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand_core::OsRng;
use rexec_common::helpers::fs::{ensure_private_directory, secure_file};
use rexec_common::RexecConfig;
use russh::keys::{encode_pkcs8_pem, load_secret_key, PrivateKey};
use tracing::*;

const HOST_KEY_NAME: &str = "host-ed25519";
const CLIENT_KEY_NAME: &str = "client-ed25519";

/// Writes a new Ed25519 key unless `path` already exists.
fn ensure_ed25519_key(path: &Path, description: &str) -> Result<()> {
    if !path.exists() {
        info!(?path, "Generating Ed25519 {description} key");
        let key = PrivateKey::random(&mut OsRng, russh::keys::Algorithm::Ed25519)
            .context("Failed to generate Ed25519 key")?;
        let f = File::create(path).with_context(|| format!("Could not create {path:?}"))?;
        encode_pkcs8_pem(&key, f)?;
    }
    secure_file(path)?;
    Ok(())
}

pub fn generate_host_keys(config: &RexecConfig) -> Result<()> {
    let path = config.keys_path();
    ensure_private_directory(&path)
        .with_context(|| format!("Could not prepare the keys directory {path:?}"))?;
    ensure_ed25519_key(&path.join(HOST_KEY_NAME), "host")
}

pub fn load_host_keys(config: &RexecConfig) -> Result<Vec<PrivateKey>> {
    let key_path = config.keys_path().join(HOST_KEY_NAME);
    let key = load_secret_key(&key_path, None)
        .with_context(|| format!("Could not load the host key from {key_path:?}"))?;
    Ok(vec![key])
}

/// Path of the key the client authenticates with.
///
/// An explicitly configured key is used as is; otherwise a key is generated
/// in the keys directory on first use.
pub fn ensure_client_key(config: &RexecConfig) -> Result<PathBuf> {
    if let Some(ref key) = config.store.client.key {
        return Ok(config.resolve_path(key));
    }
    let path = config.keys_path();
    ensure_private_directory(&path)
        .with_context(|| format!("Could not prepare the keys directory {path:?}"))?;
    let key_path = path.join(CLIENT_KEY_NAME);
    ensure_ed25519_key(&key_path, "client")?;
    Ok(key_path)
}

pub fn load_client_key(path: &Path) -> Result<PrivateKey> {
    load_secret_key(path, None)
        .with_context(|| format!("Could not load the client key from {path:?}"))
}
