//! Transport layer
//!
//! Provides:
//! - [`Endpoint`]: a parsed `scheme://host:port` address
//! - TCP listening and dialling honouring the endpoint's address family
//! - Forced socket shutdown used to tear down both relay directions

mod tcp;

pub use tcp::{dial, listen, shutdown};

use std::fmt;
use std::io;
use std::str::FromStr;
use thiserror::Error;

/// Transport layer errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid endpoint {0:?}: {1}")]
    InvalidEndpoint(String, &'static str),

    #[error("Unsupported transport: {0}")]
    UnsupportedTransport(String),

    #[error("No {transport} address found for {address}")]
    NoAddress {
        transport: Transport,
        address: String,
    },

    #[error("Connection to {0} failed: {1}")]
    ConnectionFailed(Endpoint, io::Error),

    #[error("Bind to {0} failed: {1}")]
    BindFailed(Endpoint, io::Error),
}

/// Stream transport protocol of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    /// TCP over any address family
    Tcp,
    /// TCP over IPv4 only
    Tcp4,
    /// TCP over IPv6 only
    Tcp6,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Tcp4 => "tcp4",
            Transport::Tcp6 => "tcp6",
        }
    }

    /// Whether a resolved address is usable with this transport
    pub fn accepts(&self, addr: &std::net::SocketAddr) -> bool {
        match self {
            Transport::Tcp => true,
            Transport::Tcp4 => addr.is_ipv4(),
            Transport::Tcp6 => addr.is_ipv6(),
        }
    }
}

impl FromStr for Transport {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Transport::Tcp),
            "tcp4" => Ok(Transport::Tcp4),
            "tcp6" => Ok(Transport::Tcp6),
            _ => Err(TransportError::UnsupportedTransport(s.to_string())),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (transport, address) pair such as `tcp://127.0.0.1:8888`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub transport: Transport,
    /// `host:port`, where host may be a name, an IPv4 address or a bracketed IPv6 address
    pub address: String,
}

impl Endpoint {
    pub fn new(transport: Transport, address: impl Into<String>) -> Self {
        Self {
            transport,
            address: address.into(),
        }
    }

    /// Shorthand for a `tcp` endpoint
    pub fn tcp(address: impl Into<String>) -> Self {
        Self::new(Transport::Tcp, address)
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| TransportError::InvalidEndpoint(s.to_string(), reason);

        let (scheme, rest) = s.split_once("://").ok_or_else(|| invalid("missing scheme"))?;
        let transport: Transport = scheme.parse()?;

        // Anything after the authority is ignored, like a URL path
        let authority = rest.split(&['/', '?', '#'][..]).next().unwrap_or_default();
        let (host, port) = authority
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing port"))?;

        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        if host.starts_with('[') != host.ends_with(']') {
            return Err(invalid("unbalanced brackets"));
        }
        port.parse::<u16>().map_err(|_| invalid("invalid port"))?;

        Ok(Self::new(transport, authority))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.transport, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp() {
        let ep: Endpoint = "tcp://127.0.0.1:8888".parse().unwrap();
        assert_eq!(ep.transport, Transport::Tcp);
        assert_eq!(ep.address, "127.0.0.1:8888");
        assert_eq!(ep.to_string(), "tcp://127.0.0.1:8888");
    }

    #[test]
    fn test_parse_hostname_and_ipv6() {
        let ep: Endpoint = "tcp4://localhost:80".parse().unwrap();
        assert_eq!(ep.transport, Transport::Tcp4);
        assert_eq!(ep.address, "localhost:80");

        let ep: Endpoint = "tcp6://[::1]:9000".parse().unwrap();
        assert_eq!(ep.transport, Transport::Tcp6);
        assert_eq!(ep.address, "[::1]:9000");
    }

    #[test]
    fn test_parse_ignores_path() {
        let ep: Endpoint = "TCP://example.com:443/ignored?x=1".parse().unwrap();
        assert_eq!(ep.transport, Transport::Tcp);
        assert_eq!(ep.address, "example.com:443");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "127.0.0.1:80".parse::<Endpoint>(),
            Err(TransportError::InvalidEndpoint(_, "missing scheme"))
        ));
        assert!(matches!(
            "udp://127.0.0.1:80".parse::<Endpoint>(),
            Err(TransportError::UnsupportedTransport(s)) if s == "udp"
        ));
        assert!(matches!(
            "tcp://127.0.0.1".parse::<Endpoint>(),
            Err(TransportError::InvalidEndpoint(_, "missing port"))
        ));
        assert!(matches!(
            "tcp://:80".parse::<Endpoint>(),
            Err(TransportError::InvalidEndpoint(_, "missing host"))
        ));
        assert!(matches!(
            "tcp://host:http".parse::<Endpoint>(),
            Err(TransportError::InvalidEndpoint(_, "invalid port"))
        ));
        assert!(matches!(
            "tcp://[::1:80".parse::<Endpoint>(),
            Err(TransportError::InvalidEndpoint(_, "unbalanced brackets"))
        ));
    }

    #[test]
    fn test_transport_family_filter() {
        let v4: std::net::SocketAddr = "127.0.0.1:1".parse().unwrap();
        let v6: std::net::SocketAddr = "[::1]:1".parse().unwrap();
        assert!(Transport::Tcp.accepts(&v4) && Transport::Tcp.accepts(&v6));
        assert!(Transport::Tcp4.accepts(&v4) && !Transport::Tcp4.accepts(&v6));
        assert!(Transport::Tcp6.accepts(&v6) && !Transport::Tcp6.accepts(&v4));
    }
}
