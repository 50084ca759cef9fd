//! The injected-cipher seam. The runtime negotiates encryption and derives
//! the key, but the symmetric cipher itself is supplied by the embedding
//! application; nothing here implements one.

use thiserror::Error;

/// Errors raised by a cipher implementation or its construction.
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("key derivation failed: {0}")]
    Key(String),

    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("decryption failed: {0}")]
    Decrypt(String),
}

/// Symmetric cipher over wire strings. Implementations must be their own
/// inverse pair: `decrypt(encrypt(s)) == s` for the same instance.
pub trait SessionCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String, CipherError>;
    fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError>;
}

/// Factory the embedding application injects. Called once per encryption
/// bootstrap with the full-hash digit sequence; every re-derivation replaces
/// the previous instance rather than mutating it.
pub trait CipherProvider: Send + Sync {
    fn create(&self, key: &[u64]) -> Result<Box<dyn SessionCipher>, CipherError>;
}
