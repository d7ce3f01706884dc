//! Crypto helpers: SHA3-512 hashing, Ed25519 keypair generation, sign, verify.
//! Compatible with ed25519-dalek v2 + rand_core feature enabled.
//!
//! Combined key format (64 bytes):
//!   [0..32]  = private key bytes
//!   [32..64] = public key bytes

use ed25519_dalek::{Signer, Verifier, Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use hex::{encode as hex_encode, decode as hex_decode};
use sha3::{Digest, Sha3_512};
use thiserror::Error;

use crate::types::{Address, Hash};

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, found {found}")]
    InvalidKeyLength { expected: usize, found: usize },

    #[error("verification failed")]
    VerifyFailed,

    #[error("hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// compute sha3-512 hex string of bytes
pub fn sha3_512_hex(data: &[u8]) -> String {
    hex_encode(sha3_512_bytes(data))
}

/// compute sha3-512 raw bytes (64 bytes)
pub fn sha3_512_bytes(data: &[u8]) -> [u8; 64] {
    let mut hasher = Sha3_512::new();
    hasher.update(data);
    let sum = hasher.finalize();
    sum.into()
}

/// compute sha3-512 and return as Hash type
pub fn sha3_512(data: &[u8]) -> Hash {
    Hash::from_bytes(sha3_512_bytes(data))
}

/// Derive Address from raw public key bytes: addr = SHA3-512(pubkey)[:20]
pub fn address_from_pubkey_bytes(pubkey_bytes: &[u8]) -> Result<Address, CryptoError> {
    let hash = sha3_512_bytes(pubkey_bytes);
    let mut arr = [0u8; 20];
    arr.copy_from_slice(&hash[0..20]);
    Ok(Address::from_bytes(arr))
}

/// Generate a new Ed25519 keypair. Returns (public key bytes, combined 64-byte keypair).
pub fn generate_keypair_bytes() -> (Vec<u8>, Vec<u8>) {
    let mut rng = OsRng;
    let sk = SigningKey::generate(&mut rng);
    let vk = sk.verifying_key();

    let mut combined = Vec::with_capacity(64);
    combined.extend_from_slice(&sk.to_bytes());
    combined.extend_from_slice(&vk.to_bytes());
    (vk.to_bytes().to_vec(), combined)
}

/// Build a SigningKey from combined keypair bytes.
pub fn signing_key_from_bytes(bytes: &[u8]) -> Result<SigningKey, CryptoError> {
    if bytes.len() != 64 {
        return Err(CryptoError::InvalidKeyLength { expected: 64, found: bytes.len() });
    }
    let mut sk_bytes = [0u8; 32];
    sk_bytes.copy_from_slice(&bytes[0..32]);
    Ok(SigningKey::from_bytes(&sk_bytes))
}

/// Extract public key bytes from 64-byte keypair.
pub fn public_key_bytes_from_keypair_bytes(kp_bytes: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if kp_bytes.len() != 64 {
        return Err(CryptoError::InvalidKeyLength { expected: 64, found: kp_bytes.len() });
    }
    Ok(kp_bytes[32..64].to_vec())
}

/// Sign a message and return 64-byte signature.
pub fn sign_message(kp_bytes: &[u8], message: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let sk = signing_key_from_bytes(kp_bytes)?;
    let sig = sk.sign(message);
    Ok(sig.to_bytes().to_vec())
}

/// Verify a message given public key and signature.
pub fn verify_signature(pubkey_bytes: &[u8], message: &[u8], sig_bytes: &[u8]) -> Result<bool, CryptoError> {
    if pubkey_bytes.len() != 32 {
        return Err(CryptoError::InvalidKeyLength { expected: 32, found: pubkey_bytes.len() });
    }
    if sig_bytes.len() != 64 {
        return Err(CryptoError::InvalidKeyLength { expected: 64, found: sig_bytes.len() });
    }

    let mut pk_arr = [0u8; 32];
    pk_arr.copy_from_slice(pubkey_bytes);
    let vk = VerifyingKey::from_bytes(&pk_arr).map_err(|_| CryptoError::VerifyFailed)?;

    let mut sig_arr = [0u8; 64];
    sig_arr.copy_from_slice(sig_bytes);
    let sig = Signature::from_bytes(&sig_arr);

    match vk.verify(message, &sig) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false),
    }
}

/// Hex helpers
pub fn keypair_bytes_to_hex(kp_bytes: &[u8]) -> String {
    hex_encode(kp_bytes)
}

pub fn keypair_bytes_from_hex(hexstr: &str) -> Result<Vec<u8>, CryptoError> {
    Ok(hex_decode(hexstr.trim())?)
}
