//! Stream transforms for protected tunnels
//!
//! This module provides:
//! - [`Encryptor`] and [`Decryptor`], the two capabilities a relay needs
//! - AES-GCM implementation of both ([`AesGcm`])
//! - Secure random number generation

mod aead;

pub use aead::AesGcm;

use thiserror::Error;

/// Length of the per-message nonce in bytes
pub const NONCE_LEN: usize = 12;

/// Length of the authentication tag in bytes
pub const TAG_LEN: usize = 16;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key length: {0} bytes (expected 16 or 32)")]
    InvalidKeyLength(usize),

    #[error("Too short crypted text: {0} bytes")]
    TooShort(usize),

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Random generator failure")]
    Random,
}

impl CryptoError {
    /// Whether the error means the peer sent bytes we cannot trust
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::TooShort(_) | Self::AuthenticationFailed)
    }
}

/// Turns plaintext into protected bytes.
pub trait Encryptor: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// Turns protected bytes back into plaintext.
pub trait Decryptor: Send + Sync {
    fn decrypt(&self, crypted: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Largest output the matching encryptor produces for `plaintext_len` bytes
    fn max_ciphertext_len(&self, plaintext_len: usize) -> usize;
}

/// Fill `buf` with cryptographically secure random bytes
pub fn random_bytes(buf: &mut [u8]) -> Result<(), CryptoError> {
    use ring::rand::{SecureRandom, SystemRandom};
    SystemRandom::new()
        .fill(buf)
        .map_err(|_| CryptoError::Random)
}

/// Generate a random nonce
pub fn generate_nonce() -> Result<[u8; NONCE_LEN], CryptoError> {
    let mut nonce = [0u8; NONCE_LEN];
    random_bytes(&mut nonce)?;
    Ok(nonce)
}
