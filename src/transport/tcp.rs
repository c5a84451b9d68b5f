//! TCP listen/dial for [`Endpoint`]s

use super::{Endpoint, TransportError};
use std::net::{Shutdown, SocketAddr};
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tracing::trace;

/// Resolve an endpoint, keeping only addresses its transport accepts
async fn resolve(endpoint: &Endpoint) -> Result<Vec<SocketAddr>, std::io::Error> {
    Ok(lookup_host(endpoint.address.as_str())
        .await?
        .filter(|addr| endpoint.transport.accepts(addr))
        .collect())
}

/// Bind a listener on the first usable address of `endpoint`
pub async fn listen(endpoint: &Endpoint) -> Result<TcpListener, TransportError> {
    let addrs = resolve(endpoint)
        .await
        .map_err(|e| TransportError::BindFailed(endpoint.clone(), e))?;

    let mut last_err = None;
    for addr in addrs {
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) => last_err = Some(e),
        }
    }

    Err(match last_err {
        Some(e) => TransportError::BindFailed(endpoint.clone(), e),
        None => TransportError::NoAddress {
            transport: endpoint.transport,
            address: endpoint.address.clone(),
        },
    })
}

/// Connect to the first reachable address of `endpoint`
pub async fn dial(endpoint: &Endpoint) -> Result<TcpStream, TransportError> {
    let addrs = resolve(endpoint)
        .await
        .map_err(|e| TransportError::ConnectionFailed(endpoint.clone(), e))?;

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                // Frames are written as one unit; don't let Nagle hold them back
                stream.set_nodelay(true).ok();
                return Ok(stream);
            }
            Err(e) => {
                trace!("Dial {} failed: {}", addr, e);
                last_err = Some(e);
            }
        }
    }

    Err(match last_err {
        Some(e) => TransportError::ConnectionFailed(endpoint.clone(), e),
        None => TransportError::NoAddress {
            transport: endpoint.transport,
            address: endpoint.address.clone(),
        },
    })
}

/// Shut down both directions of a socket.
///
/// Unlike dropping one half of a split stream this also wakes any task
/// blocked reading the other half, which then sees end of stream.
pub fn shutdown(stream: &TcpStream) {
    // NotConnected just means the peer got there first
    let _ = socket2::SockRef::from(stream).shutdown(Shutdown::Both);
}
