//! # dsql Common Crate
//!
//! Foundational pieces shared by the dsql client stack.
//!
//! ## Modules
//! - `types`: `Address` and `Hash` wrappers with hex serde
//! - `crypto`: SHA3-512 hashing and Ed25519 sign/verify helpers
//! - `keyfile`: keypair persistence for the local client identity
//! - `config`: TOML client configuration loader

pub mod config;
pub mod crypto;
pub mod keyfile;
pub mod types;

pub use config::ClientConfig;
pub use types::{Address, Hash};
