//! Keystream obfuscation layer
//!
//! Provides:
//! - [`Keystream`]: a deterministic byte sequence derived from a 64-bit seed
//! - [`XorWriter`] / [`XorReader`]: async stream decorators that XOR every
//!   byte passing through them with the keystream
//!
//! XOR is its own inverse, so a writer and a reader built from the same seed
//! undo each other as long as both sides see the same byte stream. The
//! keystream advances one byte per byte of data regardless of how the data
//! is split into calls, so chunking may differ freely between the two ends.
//!
//! ## Not encryption
//!
//! The keystream is fully determined by the seed. It hides the byte patterns
//! of the stream from casual inspection but gives no confidentiality.
//!
//! ## Keystream reuse
//!
//! A fresh keystream is started for every connection, so all connections of a
//! tunnel are XOR-ed against the same sequence from offset zero. Both tunnel
//! ends depend on this to stay in step without any handshake.

mod stream;

pub use stream::{XorReader, XorWriter};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

const WORD_LEN: usize = 8;

/// Seeded pseudo-random byte sequence.
///
/// The bytes are part of the wire format and must not change between builds,
/// hence ChaCha20 with a fixed seed expansion.
pub struct Keystream {
    rng: ChaCha20Rng,
    word: [u8; WORD_LEN],
    /// Bytes of `word` already handed out
    used: usize,
}

impl Keystream {
    /// Start the sequence for `seed` at offset zero
    pub fn new(seed: i64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed as u64),
            word: [0; WORD_LEN],
            used: WORD_LEN,
        }
    }

    /// Overwrite `out` with the next `out.len()` keystream bytes
    pub fn fill(&mut self, out: &mut [u8]) {
        for byte in out {
            *byte = self.next_byte();
        }
    }

    /// XOR `data` in place with the next `data.len()` keystream bytes
    pub fn apply(&mut self, data: &mut [u8]) {
        for byte in data {
            *byte ^= self.next_byte();
        }
    }

    #[inline]
    fn next_byte(&mut self) -> u8 {
        if self.used == WORD_LEN {
            self.word = self.rng.next_u64().to_le_bytes();
            self.used = 0;
        }
        let byte = self.word[self.used];
        self.used += 1;
        byte
    }
}

impl std::fmt::Debug for Keystream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keystream").finish_non_exhaustive()
    }
}
