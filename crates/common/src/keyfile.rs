//! Keypair persistence for the local client identity.
//!
//! A keyfile holds the combined 64-byte Ed25519 keypair as lowercase hex,
//! one line, at the path named by the client config. The optional master
//! key is an opaque decrypt capability: an empty key means the file is
//! plain hex. The container format for encrypted keys lives outside this
//! crate.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::crypto;

/// Load the combined 64-byte keypair from `path`.
///
/// `master_key` is forwarded to the decrypt capability; with an empty key
/// the file content is parsed directly as hex.
pub fn load_keypair(path: impl AsRef<Path>, master_key: &[u8]) -> Result<Vec<u8>> {
    let p = path.as_ref();
    let raw = fs::read_to_string(p)
        .with_context(|| format!("read key file {}", p.display()))?;

    if !master_key.is_empty() {
        anyhow::bail!("encrypted key files are not supported by this build");
    }

    let kp = crypto::keypair_bytes_from_hex(raw.trim())
        .with_context(|| format!("decode key file {}", p.display()))?;
    if kp.len() != 64 {
        anyhow::bail!(
            "key file {}: expected 64 key bytes, found {}",
            p.display(),
            kp.len()
        );
    }
    Ok(kp)
}

/// Persist a combined 64-byte keypair at `path` as hex.
pub fn save_keypair(path: impl AsRef<Path>, kp_bytes: &[u8]) -> Result<()> {
    let p = path.as_ref();
    if kp_bytes.len() != 64 {
        anyhow::bail!("expected 64 key bytes, found {}", kp_bytes.len());
    }
    if let Some(dir) = p.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("create key dir {}", dir.display()))?;
    }
    fs::write(p, crypto::keypair_bytes_to_hex(kp_bytes))
        .with_context(|| format!("write key file {}", p.display()))
}
