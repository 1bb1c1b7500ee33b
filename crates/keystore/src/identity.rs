//! Identity persistence (§4.8): generate once, then load the same
//! signing/onion key pair on every restart. The file never appears in
//! logs; only its path does.

use onionmesh_crypto::{Identity, OnionKeypair, SigningKeypair};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeystoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("identity file is malformed or truncated")]
    Malformed,
}

pub type Result<T> = std::result::Result<T, KeystoreError>;

const IDENTITY_FILE_LEN: usize = 64;

/// Load the identity at `path`, generating and persisting a fresh one if
/// the file does not exist yet.
pub fn load_or_generate(path: &Path) -> Result<Identity> {
    if path.exists() {
        load(path)
    } else {
        let identity = Identity::generate();
        save(path, &identity)?;
        tracing::info!(path = %path.display(), "generated new node identity");
        Ok(identity)
    }
}

pub fn load(path: &Path) -> Result<Identity> {
    let bytes = fs::read(path)?;
    if bytes.len() != IDENTITY_FILE_LEN {
        return Err(KeystoreError::Malformed);
    }

    let mut signing_bytes = [0u8; 32];
    signing_bytes.copy_from_slice(&bytes[..32]);
    let mut onion_bytes = [0u8; 32];
    onion_bytes.copy_from_slice(&bytes[32..]);

    let signing = SigningKeypair::from_bytes(&signing_bytes);
    let onion = OnionKeypair::from_bytes(&onion_bytes).map_err(|_| KeystoreError::Malformed)?;
    Ok(Identity { signing, onion })
}

pub fn save(path: &Path, identity: &Identity) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut bytes = Vec::with_capacity(IDENTITY_FILE_LEN);
    bytes.extend_from_slice(&identity.signing.to_bytes());
    bytes.extend_from_slice(&identity.onion.to_bytes());
    fs::write(path, &bytes)?;
    restrict_permissions(path)?;
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
