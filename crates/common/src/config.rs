//! Simple client config loader using TOML and serde.
//! The config struct is intentionally small and typed for the driver's needs.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};

/// Default config location probed when the driver is opened without an
/// explicit `init` call.
pub const DEFAULT_CONFIG_FILE: &str = "~/.dsql/config.toml";

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// Optional node id (string). If absent a consumer may derive one from the keypair.
    pub node_id: Option<String>,

    /// Path to the hex-encoded Ed25519 keypair file.
    pub private_key_file: String,

    /// Block producer endpoints, tried in order (e.g. "http://127.0.0.1:7100").
    pub block_producers: Vec<String>,

    /// Address this client announces itself as reachable at, if any.
    pub listen_addr: Option<String>,
}

impl ClientConfig {
    /// Resolve `private_key_file` relative to the config file's directory.
    pub fn key_path(&self, config_path: &Path) -> PathBuf {
        let key = PathBuf::from(expand_home(&self.private_key_file));
        if key.is_absolute() {
            key
        } else {
            config_path.parent().map(|d| d.join(&key)).unwrap_or(key)
        }
    }
}

/// Load config from a TOML file path.
/// If file is missing or parse fails, an error is returned.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<ClientConfig> {
    let p = path.as_ref();
    let s = fs::read_to_string(p)
        .with_context(|| format!("read config file {}", p.display()))?;
    let cfg: ClientConfig = toml::from_str(&s)
        .with_context(|| format!("parse config file {}", p.display()))?;
    if cfg.block_producers.is_empty() {
        anyhow::bail!("config lists no block producers");
    }
    Ok(cfg)
}

/// Expand a leading `~` to the user's home directory. Returns the input
/// unchanged when no home directory is resolvable.
pub fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return Path::new(&home).join(rest).to_string_lossy().into_owned();
        }
    }
    path.to_string()
}
