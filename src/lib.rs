//! # ett
//!
//! A TCP tunnel: accepts connections on a source address and relays the bytes
//! to a destination address, optionally protecting the stream with AES-GCM
//! framing and/or obfuscating it with a seeded XOR keystream.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   Supervisor                         │
//! │     (one accept loop per tunnel, stop policy)        │
//! ├─────────────────────────────────────────────────────┤
//! │               Connection Handler                     │
//! │   (dial destination, one relay task per direction)   │
//! ├─────────────────────────────────────────────────────┤
//! │                  Relay Loops                         │
//! │        (plain, encrypt-on-write, decrypt-on-read)    │
//! ├─────────────────────────────────────────────────────┤
//! │       Framing  ·  AEAD transform  ·  XOR keystream   │
//! ├─────────────────────────────────────────────────────┤
//! │                  Transport Layer                     │
//! │                (tcp, tcp4, tcp6)                     │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Two tunnels configured with the same key and seed, one as the encrypting
//! end and one as the decrypting end, form a protected link:
//!
//! ```text
//! client ──► [encrypt] ══ frames ══► [decrypt] ──► server
//! ```

pub mod config;
pub mod crypto;
pub mod obfuscation;
pub mod transport;
pub mod tunnel;

pub use config::{Config, Mode, TunnelDescriptor};
pub use transport::Endpoint;
pub use tunnel::{StopPolicy, Supervisor, TunnelListener};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Read chunk size used when a tunnel does not configure one
pub const DEFAULT_BUFFER_SIZE: u16 = 1024;
