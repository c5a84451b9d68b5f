//! Tunnel accept loops and the multi-tunnel supervisor

use super::handler::handle_connection;
use super::TunnelError;
use crate::config::TunnelDescriptor;
use crate::transport::{self, Endpoint};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, debug_span, error, info, Instrument};

/// When the supervisor stops waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopPolicy {
    /// Return as soon as any tunnel stops
    FirstStop,
    /// Return once every tunnel has stopped
    #[default]
    AllStopped,
}

impl StopPolicy {
    pub fn from_exit_on_first(exit_on_first: bool) -> Self {
        if exit_on_first {
            StopPolicy::FirstStop
        } else {
            StopPolicy::AllStopped
        }
    }
}

/// Notification that a tunnel's accept loop has ended
#[derive(Debug)]
pub struct StopSignal {
    /// Source endpoint of the stopped tunnel
    pub tunnel: Endpoint,
    /// Why it stopped; `None` if its task ended without reporting (panic)
    pub reason: Option<TunnelError>,
}

/// Sends exactly one [`StopSignal`] when dropped
struct StopNotifier {
    tunnel: Endpoint,
    reason: Option<TunnelError>,
    tx: mpsc::UnboundedSender<StopSignal>,
}

impl Drop for StopNotifier {
    fn drop(&mut self) {
        let _ = self.tx.send(StopSignal {
            tunnel: self.tunnel.clone(),
            reason: self.reason.take(),
        });
    }
}

/// A tunnel bound to its source endpoint
pub struct TunnelListener {
    listener: TcpListener,
    tunnel: Arc<TunnelDescriptor>,
}

impl TunnelListener {
    /// Bind the tunnel's source endpoint
    pub async fn bind(tunnel: Arc<TunnelDescriptor>) -> Result<Self, TunnelError> {
        let listener = transport::listen(&tunnel.source).await?;
        info!(
            "Listening at {} -> {} ({})",
            tunnel.source,
            tunnel.destination,
            tunnel.mode.name()
        );
        Ok(Self { listener, tunnel })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until accepting fails, handling each one in its
    /// own task. Returns the error that ended the loop.
    pub async fn serve(self) -> TunnelError {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("New connection to {} from {}", self.tunnel.source, peer);
                    let tunnel = Arc::clone(&self.tunnel);
                    let span = debug_span!("conn", %peer);
                    tokio::spawn(handle_connection(stream, peer, tunnel).instrument(span));
                }
                Err(e) => return TunnelError::Accept(e),
            }
        }
    }
}

/// Bind and serve one tunnel, reporting through `notifier` when done
async fn run_tunnel(tunnel: Arc<TunnelDescriptor>, mut notifier: StopNotifier) {
    let reason = match TunnelListener::bind(tunnel).await {
        Ok(listener) => listener.serve().await,
        Err(e) => e,
    };
    error!("Tunnel {} stopped: {}", notifier.tunnel, reason);
    notifier.reason = Some(reason);
}

/// Runs every configured tunnel and waits according to a [`StopPolicy`]
pub struct Supervisor {
    tunnels: Vec<Arc<TunnelDescriptor>>,
    policy: StopPolicy,
}

impl Supervisor {
    pub fn new(tunnels: Vec<TunnelDescriptor>, policy: StopPolicy) -> Self {
        Self {
            tunnels: tunnels.into_iter().map(Arc::new).collect(),
            policy,
        }
    }

    /// Start one accept loop per tunnel and wait until the policy is met.
    ///
    /// Returns the stop signals received. Connections that are still open
    /// when this returns are left running.
    pub async fn run(self) -> Vec<StopSignal> {
        let (tx, mut rx) = mpsc::unbounded_channel();

        for tunnel in &self.tunnels {
            let notifier = StopNotifier {
                tunnel: tunnel.source.clone(),
                reason: None,
                tx: tx.clone(),
            };
            let span = debug_span!("tunnel", source = %tunnel.source);
            tokio::spawn(run_tunnel(Arc::clone(tunnel), notifier).instrument(span));
        }
        drop(tx);

        let wanted = match self.policy {
            StopPolicy::FirstStop => self.tunnels.len().min(1),
            StopPolicy::AllStopped => self.tunnels.len(),
        };

        let mut stopped = Vec::with_capacity(wanted);
        while stopped.len() < wanted {
            match rx.recv().await {
                Some(signal) => stopped.push(signal),
                None => break,
            }
        }

        info!(
            "{} of {} tunnel(s) stopped, shutting down",
            stopped.len(),
            self.tunnels.len()
        );
        stopped
    }
}
