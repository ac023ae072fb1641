//! Token-at-rest sealing: AES-256-GCM keyed by PBKDF2-HMAC-SHA256 over the
//! user's master password and a per-profile random salt (§4.6; §8's
//! `seal(token, password) -> unseal(password) = token` property). The
//! plaintext token and password live in memory only for as long as it
//! takes to build an `Authorization` header.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;

use crate::error::StorageError;

pub const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const PBKDF2_ROUNDS: u32 = 210_000;

pub fn new_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

fn derive_key(password: &str, salt: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ROUNDS, &mut key);
    key
}

/// Seals `plaintext` under a key derived from `password` and `salt`. The
/// salt is random per profile, so two profiles never share a key even
/// when given the same password.
pub fn seal(password: &str, salt: &[u8], plaintext: &str) -> Result<String, StorageError> {
    let key_bytes = derive_key(password, salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| StorageError::Other(format!("token sealing failed: {e}")))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(hex::encode(out))
}

/// Fails (as a generic storage error; AES-GCM's tag check does not
/// distinguish causes) for a wrong password, a wrong salt, or corrupted
/// ciphertext alike.
pub fn unseal(password: &str, salt: &[u8], sealed: &str) -> Result<String, StorageError> {
    let raw = hex::decode(sealed).map_err(|e| StorageError::Other(format!("malformed sealed token: {e}")))?;
    if raw.len() < NONCE_LEN {
        return Err(StorageError::Other("sealed token too short".to_string()));
    }
    let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);

    let key_bytes = derive_key(password, salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    let nonce = Nonce::from_slice(nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| StorageError::Other(format!("token unsealing failed: {e}")))?;
    String::from_utf8(plaintext).map_err(|e| StorageError::Other(format!("sealed token is not utf-8: {e}")))
}
