//! Configuration management
//!
//! The configuration file is TOML with one `[[tunnels]]` table per tunnel:
//!
//! ```toml
//! [[tunnels]]
//! source = "tcp://127.0.0.1:9101"
//! destination = "tcp://203.0.113.7:9102"
//! encrypt = "q83vEjRWeJCrze8SNFZ4kKvN7xI0VniQq83vEjRWeJA="
//! seed = 42
//! buffer = 1024
//! ```
//!
//! [`Config::tunnel_descriptors`] validates every entry and turns it into an
//! immutable [`TunnelDescriptor`] before anything starts listening.

use crate::crypto::{AesGcm, CryptoError};
use crate::transport::{Endpoint, TransportError};
use crate::DEFAULT_BUFFER_SIZE;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("No tunnels configured")]
    NoTunnels,

    #[error("Tunnel #{tunnel}: invalid {field}: {source}")]
    Endpoint {
        tunnel: usize,
        field: &'static str,
        source: TransportError,
    },

    #[error("Tunnel #{tunnel}: {field} is not valid base64: {source}")]
    Base64 {
        tunnel: usize,
        field: &'static str,
        source: base64::DecodeError,
    },

    #[error("Tunnel #{tunnel}: unusable {field} key: {source}")]
    Key {
        tunnel: usize,
        field: &'static str,
        source: CryptoError,
    },

    #[error("Tunnel #{0}: encrypt and decrypt are mutually exclusive")]
    ConflictingKeys(usize),
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Tunnels to run
    #[serde(default, alias = "Tunnels")]
    pub tunnels: Vec<TunnelConfig>,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        content.parse()
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate every tunnel and build its descriptor
    pub fn tunnel_descriptors(&self) -> Result<Vec<TunnelDescriptor>, ConfigError> {
        if self.tunnels.is_empty() {
            return Err(ConfigError::NoTunnels);
        }

        self.tunnels
            .iter()
            .enumerate()
            .map(|(i, tunnel)| tunnel.descriptor(i + 1))
            .collect()
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}

/// One `[[tunnels]]` entry as written in the file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Listen endpoint, e.g. `tcp://127.0.0.1:8888`
    #[serde(alias = "Source")]
    pub source: String,
    /// Endpoint every accepted connection is relayed to
    #[serde(alias = "Destination")]
    pub destination: String,
    /// Base64 key; this end encrypts towards the destination
    #[serde(default, alias = "Encrypt", skip_serializing_if = "Option::is_none")]
    pub encrypt: Option<String>,
    /// Base64 key; this end decrypts traffic from the source
    #[serde(default, alias = "Decrypt", skip_serializing_if = "Option::is_none")]
    pub decrypt: Option<String>,
    /// Keystream seed for XOR obfuscation
    #[serde(default, alias = "Seed", skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    /// Read chunk size in bytes, 0 means the default
    #[serde(default, alias = "Buff", alias = "buff")]
    pub buffer: u16,
}

impl TunnelConfig {
    fn descriptor(&self, tunnel: usize) -> Result<TunnelDescriptor, ConfigError> {
        let endpoint = |field, value: &str| {
            value
                .parse::<Endpoint>()
                .map_err(|source| ConfigError::Endpoint {
                    tunnel,
                    field,
                    source,
                })
        };
        let source = endpoint("source", &self.source)?;
        let destination = endpoint("destination", &self.destination)?;

        let mode = match (&self.encrypt, &self.decrypt) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingKeys(tunnel)),
            (Some(key), None) => Mode::Encrypt(Key::decode(tunnel, "encrypt", key)?),
            (None, Some(key)) => Mode::Decrypt(Key::decode(tunnel, "decrypt", key)?),
            (None, None) => Mode::Plain,
        };

        Ok(TunnelDescriptor::new(source, destination)
            .with_mode(mode)
            .with_seed(self.seed)
            .with_buffer_size(self.buffer as usize))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Symmetric key material. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Key(Vec<u8>);

impl Key {
    /// Wrap raw key bytes after checking the cipher accepts them
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        AesGcm::new(&bytes)?;
        Ok(Self(bytes))
    }

    fn decode(tunnel: usize, field: &'static str, encoded: &str) -> Result<Self, ConfigError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|source| ConfigError::Base64 {
                tunnel,
                field,
                source,
            })?;
        Self::new(bytes).map_err(|source| ConfigError::Key {
            tunnel,
            field,
            source,
        })
    }

    /// Build a fresh cipher bound to this key
    pub fn cipher(&self) -> Result<AesGcm, CryptoError> {
        AesGcm::new(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key(<{} bytes>)", self.0.len())
    }
}

/// Which end of a protected link a tunnel is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Relay bytes unchanged (apart from optional obfuscation)
    Plain,
    /// Frame and encrypt source→destination, decrypt the way back
    Encrypt(Key),
    /// Decrypt source→destination, frame and encrypt the way back
    Decrypt(Key),
}

impl Mode {
    pub fn key(&self) -> Option<&Key> {
        match self {
            Mode::Plain => None,
            Mode::Encrypt(key) | Mode::Decrypt(key) => Some(key),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mode::Plain => "plain",
            Mode::Encrypt(_) => "encrypt",
            Mode::Decrypt(_) => "decrypt",
        }
    }
}

/// Validated, immutable description of one tunnel
#[derive(Debug, Clone)]
pub struct TunnelDescriptor {
    pub source: Endpoint,
    pub destination: Endpoint,
    pub mode: Mode,
    /// Keystream seed; `None` disables obfuscation
    pub seed: Option<i64>,
    /// Plaintext read chunk size
    pub buffer_size: usize,
}

impl TunnelDescriptor {
    /// A plain tunnel with the default buffer size
    pub fn new(source: Endpoint, destination: Endpoint) -> Self {
        Self {
            source,
            destination,
            mode: Mode::Plain,
            seed: None,
            buffer_size: DEFAULT_BUFFER_SIZE as usize,
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_seed(mut self, seed: Option<i64>) -> Self {
        self.seed = seed;
        self
    }

    /// Set the read chunk size; 0 selects the default
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = if buffer_size == 0 {
            DEFAULT_BUFFER_SIZE as usize
        } else {
            buffer_size
        };
        self
    }
}

/// Expand a leading `~/` using `$HOME`
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}

/// Generate example configuration: an encrypting and a decrypting tunnel
pub fn generate_example_config() -> Config {
    let key = base64::engine::general_purpose::STANDARD.encode([0x2au8; 32]);
    Config {
        tunnels: vec![
            TunnelConfig {
                source: "tcp://127.0.0.1:9101".to_string(),
                destination: "tcp://127.0.0.1:9102".to_string(),
                encrypt: Some(key.clone()),
                seed: Some(42),
                buffer: DEFAULT_BUFFER_SIZE,
                ..Default::default()
            },
            TunnelConfig {
                source: "tcp://127.0.0.1:9102".to_string(),
                destination: "tcp://127.0.0.1:9103".to_string(),
                decrypt: Some(key),
                seed: Some(42),
                buffer: DEFAULT_BUFFER_SIZE,
                ..Default::default()
            },
        ],
        logging: LoggingConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Transport;
    use std::io::Write;

    const KEY_B64: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";

    #[test]
    fn test_parse_full_tunnel() {
        let config: Config = format!(
            r#"
            [[tunnels]]
            source = "tcp://127.0.0.1:9101"
            destination = "tcp4://localhost:9102"
            encrypt = "{KEY_B64}"
            seed = -5
            buffer = 4096
            "#
        )
        .parse()
        .unwrap();

        let tunnels = config.tunnel_descriptors().unwrap();
        assert_eq!(tunnels.len(), 1);

        let tunnel = &tunnels[0];
        assert_eq!(tunnel.source, Endpoint::tcp("127.0.0.1:9101"));
        assert_eq!(tunnel.destination.transport, Transport::Tcp4);
        assert_eq!(tunnel.seed, Some(-5));
        assert_eq!(tunnel.buffer_size, 4096);
        match &tunnel.mode {
            Mode::Encrypt(key) => assert_eq!(key.as_bytes(), &(0u8..32).collect::<Vec<_>>()[..]),
            other => panic!("unexpected mode {:?}", other),
        }
    }

    #[test]
    fn test_defaults() {
        let config: Config = r#"
            [[tunnels]]
            source = "tcp://127.0.0.1:9001"
            destination = "tcp://127.0.0.1:9002"
        "#
        .parse()
        .unwrap();

        let tunnel = &config.tunnel_descriptors().unwrap()[0];
        assert_eq!(tunnel.mode, Mode::Plain);
        assert_eq!(tunnel.seed, None);
        assert_eq!(tunnel.buffer_size, DEFAULT_BUFFER_SIZE as usize);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_capitalised_field_names() {
        let config: Config = format!(
            r#"
            [[Tunnels]]
            Source = "tcp://127.0.0.1:9001"
            Destination = "tcp://127.0.0.1:9002"
            Decrypt = "{KEY_B64}"
            Seed = 7
            Buff = 0
            "#
        )
        .parse()
        .unwrap();

        let tunnel = &config.tunnel_descriptors().unwrap()[0];
        assert!(matches!(tunnel.mode, Mode::Decrypt(_)));
        assert_eq!(tunnel.seed, Some(7));
        assert_eq!(tunnel.buffer_size, DEFAULT_BUFFER_SIZE as usize);
    }

    #[test]
    fn test_conflicting_keys() {
        let config: Config = format!(
            r#"
            [[tunnels]]
            source = "tcp://127.0.0.1:1"
            destination = "tcp://127.0.0.1:2"
            encrypt = "{KEY_B64}"
            decrypt = "{KEY_B64}"
            "#
        )
        .parse()
        .unwrap();

        assert!(matches!(
            config.tunnel_descriptors(),
            Err(ConfigError::ConflictingKeys(1))
        ));
    }

    #[test]
    fn test_invalid_entries() {
        let bad_endpoint = Config {
            tunnels: vec![TunnelConfig {
                source: "tcp://127.0.0.1:1".to_string(),
                destination: "127.0.0.1:2".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(matches!(
            bad_endpoint.tunnel_descriptors(),
            Err(ConfigError::Endpoint { tunnel: 1, field: "destination", .. })
        ));

        let bad_base64 = Config {
            tunnels: vec![TunnelConfig {
                source: "tcp://127.0.0.1:1".to_string(),
                destination: "tcp://127.0.0.1:2".to_string(),
                encrypt: Some("not base64!".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(matches!(
            bad_base64.tunnel_descriptors(),
            Err(ConfigError::Base64 { field: "encrypt", .. })
        ));

        // 24 bytes: valid base64, wrong key size
        let bad_key = Config {
            tunnels: vec![TunnelConfig {
                source: "tcp://127.0.0.1:1".to_string(),
                destination: "tcp://127.0.0.1:2".to_string(),
                decrypt: Some(base64::engine::general_purpose::STANDARD.encode([1u8; 24])),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(matches!(
            bad_key.tunnel_descriptors(),
            Err(ConfigError::Key {
                field: "decrypt",
                source: CryptoError::InvalidKeyLength(24),
                ..
            })
        ));
    }

    #[test]
    fn test_no_tunnels() {
        assert!(matches!(
            Config::default().tunnel_descriptors(),
            Err(ConfigError::NoTunnels)
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [logging]
            level = "debug"
            format = "json"

            [[tunnels]]
            source = "tcp://127.0.0.1:9001"
            destination = "tcp://127.0.0.1:9002"
            seed = 1
            "#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.tunnel_descriptors().unwrap()[0].seed, Some(1));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_example_config_roundtrips() {
        let rendered = generate_example_config().to_toml().unwrap();
        let parsed: Config = rendered.parse().unwrap();
        let tunnels = parsed.tunnel_descriptors().unwrap();
        assert!(matches!(tunnels[0].mode, Mode::Encrypt(_)));
        assert!(matches!(tunnels[1].mode, Mode::Decrypt(_)));
        assert_eq!(tunnels[0].mode.key(), tunnels[1].mode.key());
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = Key::new(vec![0xAB; 16]).unwrap();
        assert_eq!(format!("{:?}", key), "Key(<16 bytes>)");
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/etc/ett.toml"), PathBuf::from("/etc/ett.toml"));
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(
                expand_home("~/.config/ett/ett.toml"),
                PathBuf::from(home).join(".config/ett/ett.toml")
            );
        }
    }
}
