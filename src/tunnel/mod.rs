//! Tunnel layer - relays connections between a source and a destination
//!
//! Provides:
//! - Frame encoding/decoding for encrypted streams
//! - The three relay loop shapes (plain, encrypting, decrypting)
//! - Per-connection handling (dial, one task per direction)
//! - Per-tunnel accept loops and the multi-tunnel supervisor

mod frame;
mod handler;
mod relay;
mod supervisor;

pub use frame::{encode_frame, max_frame_len, FrameReader, LENGTH_PREFIX_LEN};
pub use handler::handle_connection;
pub use relay::{relay_decrypt, relay_encrypt, relay_plain, Relay};
pub use supervisor::{StopPolicy, StopSignal, Supervisor, TunnelListener};

use crate::crypto::CryptoError;
use crate::transport::TransportError;
use std::io;
use thiserror::Error;

/// Tunnel layer errors
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("Frame too large: {0} > {1}")]
    FrameTooLarge(usize, usize),

    #[error("Accept failed: {0}")]
    Accept(io::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl TunnelError {
    /// Plain socket failures, which are how connections normally end
    pub fn is_disconnect(&self) -> bool {
        matches!(self, TunnelError::Io(_))
    }
}
