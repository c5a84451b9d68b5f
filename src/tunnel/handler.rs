//! Per-connection handling

use super::relay::Relay;
use crate::config::{Mode, TunnelDescriptor};
use crate::transport;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, error, Instrument};

/// Relay one accepted connection to the tunnel's destination.
///
/// The direction that ends in the destination for plain and encrypting
/// tunnels, or in the source for decrypting tunnels, runs in this task; the
/// other one is spawned. Returns once this task's direction is over. The
/// spawned direction is not awaited: closing the sockets ends it.
pub async fn handle_connection(inbound: TcpStream, peer: SocketAddr, tunnel: Arc<TunnelDescriptor>) {
    let outbound = match transport::dial(&tunnel.destination).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("{}", e);
            return;
        }
    };
    debug!("Connection from {} relayed to {}", peer, tunnel.destination);

    let cipher = match tunnel.mode.key().map(|key| key.cipher()).transpose() {
        Ok(cipher) => cipher.map(Arc::new),
        Err(e) => {
            error!("Cannot build cipher for {}: {}", tunnel.source, e);
            return;
        }
    };

    let (source_read, source_write) = inbound.into_split();
    let (dest_read, dest_write) = outbound.into_split();
    let seed = tunnel.seed;
    let size = tunnel.buffer_size;

    let sent = match (&tunnel.mode, cipher) {
        (Mode::Encrypt(_), Some(cipher)) => {
            spawn_relay(Relay::decrypt(cipher.clone(), seed, size), dest_read, source_write);
            Relay::encrypt(cipher, seed, size)
                .run(source_read, dest_write)
                .await
        }
        (Mode::Decrypt(_), Some(cipher)) => {
            spawn_relay(Relay::decrypt(cipher.clone(), seed, size), source_read, dest_write);
            Relay::encrypt(cipher, seed, size)
                .run(dest_read, source_write)
                .await
        }
        _ => {
            spawn_relay(Relay::plain(seed, size), dest_read, source_write);
            Relay::plain(seed, size).run(source_read, dest_write).await
        }
    };

    debug!("Connection from {} closed after {} bytes", peer, sent);
}

fn spawn_relay(relay: Relay, reader: OwnedReadHalf, writer: OwnedWriteHalf) {
    tokio::spawn(relay.run(reader, writer).in_current_span());
}
