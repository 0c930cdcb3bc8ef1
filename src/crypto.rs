//! Seams to the factory's cryptographic material.
//!
//! The primitives themselves live outside this crate; intake only needs to turn a request's
//! encrypted key code into a symmetric key and decrypt hex-encoded attributes with it.
//! Implementations report failures as `anyhow::Error`, the intake path maps them onto
//! authentication errors.

use anyhow::Result;

/// Per-request symmetric key recovered from `ReqEncKeyCode`.
pub trait SymmetricKey: Send + Sync {
    /// Decrypt a hex-encoded ciphertext. Malformed input must fail rather than yield garbage.
    fn decrypt_hex(&self, ciphertext: &str) -> Result<Vec<u8>>;
}

/// Factory private key able to unwrap the per-request symmetric key.
pub trait FactoryKey: Send + Sync {
    fn extract_sym_key(&self, enc_key_code: &str) -> Result<Box<dyn SymmetricKey>>;
}

/// Decrypt and decode as UTF-8 in one step; most decrypted attributes are names.
pub(crate) fn decrypt_utf8(key: &dyn SymmetricKey, ciphertext: &str) -> Result<String> {
    let bytes = key.decrypt_hex(ciphertext)?;
    Ok(String::from_utf8(bytes)?)
}
