//! AES-GCM transform
//!
//! Every message is sealed under a fresh random nonce which travels in front
//! of the ciphertext:
//!
//! ```text
//! +-----------+---------------------+----------+
//! | Nonce(12) |     Ciphertext      |  Tag(16) |
//! +-----------+---------------------+----------+
//! ```

use super::{generate_nonce, CryptoError, Decryptor, Encryptor, NONCE_LEN, TAG_LEN};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_128_GCM, AES_256_GCM};

/// AES-GCM cipher bound to a single key
pub struct AesGcm {
    key: LessSafeKey,
}

impl AesGcm {
    /// Create a cipher from a 16-byte (AES-128) or 32-byte (AES-256) key
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        let algorithm = match key.len() {
            16 => &AES_128_GCM,
            32 => &AES_256_GCM,
            n => return Err(CryptoError::InvalidKeyLength(n)),
        };
        let unbound_key =
            UnboundKey::new(algorithm, key).map_err(|_| CryptoError::InvalidKeyLength(key.len()))?;

        Ok(Self {
            key: LessSafeKey::new(unbound_key),
        })
    }

    /// Bytes added to every message (nonce + tag)
    pub const fn overhead() -> usize {
        NONCE_LEN + TAG_LEN
    }
}

impl Encryptor for AesGcm {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = generate_nonce()?;

        let mut sealed = Vec::with_capacity(plaintext.len() + TAG_LEN);
        sealed.extend_from_slice(plaintext);
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce),
                Aad::empty(),
                &mut sealed,
            )
            .map_err(|_| CryptoError::Encryption("seal failed".to_string()))?;

        let mut crypted = Vec::with_capacity(NONCE_LEN + sealed.len());
        crypted.extend_from_slice(&nonce);
        crypted.extend_from_slice(&sealed);
        Ok(crypted)
    }
}

impl Decryptor for AesGcm {
    fn decrypt(&self, crypted: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if crypted.len() < NONCE_LEN {
            return Err(CryptoError::TooShort(crypted.len()));
        }
        let (nonce, sealed) = crypted.split_at(NONCE_LEN);
        let nonce =
            Nonce::try_assume_unique_for_key(nonce).map_err(|_| CryptoError::AuthenticationFailed)?;

        let mut buffer = sealed.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut buffer)
            .map_err(|_| CryptoError::AuthenticationFailed)?;

        Ok(plaintext.to_vec())
    }

    fn max_ciphertext_len(&self, plaintext_len: usize) -> usize {
        plaintext_len + Self::overhead()
    }
}
