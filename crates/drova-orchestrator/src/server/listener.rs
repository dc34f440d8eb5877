//! Socket mode
//!
//! Accepts one connection at a time. Each connection is relayed to the
//! streaming endpoint on the rented machine; only when the backend sends its
//! acknowledgment is the session classified and provisioned. The listen
//! backlog holds a single pending connection while one is being served.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_util::sync::CancellationToken;

use drova_relay::HandshakeRelay;

use crate::workflow::SessionWorkflow;

/// How long a relay may keep running once its session is over or the
/// process is shutting down
const DRAIN_GRACE: Duration = Duration::from_secs(5);

const LISTEN_BACKLOG: u32 = 1;

/// Bind a listener that queues at most one pending connection
pub fn bind_listener(address: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = if address.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(address)?;
    socket.listen(LISTEN_BACKLOG)
}

pub struct SocketDriver {
    workflow: SessionWorkflow,
    backend_address: String,
    cancel: CancellationToken,
}

impl SocketDriver {
    pub fn new(workflow: SessionWorkflow, backend_address: String, cancel: CancellationToken) -> Self {
        Self {
            workflow,
            backend_address,
            cancel,
        }
    }

    /// Bind `listen_address` and serve until cancelled
    pub async fn run(self, listen_address: &str) -> Result<()> {
        let address = tokio::net::lookup_host(listen_address)
            .await
            .with_context(|| format!("Invalid listen address {}", listen_address))?
            .next()
            .with_context(|| format!("{} did not resolve", listen_address))?;
        let listener = bind_listener(address)
            .with_context(|| format!("Failed to bind to {}", address))?;
        self.serve(listener).await
    }

    /// Recover a leftover session, then serve `listener` until cancelled
    pub async fn serve(mut self, listener: TcpListener) -> Result<()> {
        let recovered = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(()),
            recovered = self.workflow.recover() => recovered,
        };
        if let Err(e) = recovered {
            self.workflow.handle_error(e).await;
        }

        let local_addr = listener.local_addr()?;
        tracing::info!(
            "Relay listening on {}, backend {}",
            local_addr,
            self.backend_address
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("Relay listener shutting down");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((socket, peer_addr)) => {
                            self.handle_connection(socket, peer_addr).await;
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Relay one connection for its whole lifetime
    async fn handle_connection(&mut self, client: TcpStream, peer_addr: SocketAddr) {
        tracing::info!("New connection from {}", peer_addr);

        let backend = match TcpStream::connect(&self.backend_address).await {
            Ok(backend) => backend,
            Err(e) => {
                tracing::warn!("Backend {} unreachable: {}", self.backend_address, e);
                return;
            }
        };
        let _ = client.set_nodelay(true);
        let _ = backend.set_nodelay(true);

        let relay = HandshakeRelay::start(client, backend);

        tracing::info!("Waiting for the backend to answer");
        let answered = tokio::select! {
            _ = self.cancel.cancelled() => false,
            answered = relay.await_handshake() => answered,
        };
        if !answered {
            tracing::info!("Connection from {} closed before the backend answered", peer_addr);
            relay.clear().await;
            return;
        }

        tracing::info!("Backend answered, checking the session");
        let session = tokio::select! {
            _ = self.cancel.cancelled() => {
                relay.drain(DRAIN_GRACE).await;
                return;
            }
            session = self.workflow.poller().check_desktop_session() => session,
        };

        match session {
            Ok(Some(session)) => {
                tracing::info!("Session {} is a desktop session", session.uuid);
                let result = tokio::select! {
                    _ = self.cancel.cancelled() => {
                        tracing::warn!("Shutdown during desktop session {}", session.uuid);
                        relay.drain(DRAIN_GRACE).await;
                        return;
                    }
                    result = self.workflow.run_desktop_session() => result,
                };
                if let Err(e) = result {
                    self.workflow.handle_error(e).await;
                }
                // The machine is rebooting; whatever is left of the stream is stale
                relay.drain(DRAIN_GRACE).await;
            }
            Ok(None) => {
                tracing::info!("Not a desktop session, relaying only");
                self.wait_relay(relay).await;
            }
            Err(e) => {
                // Only reboot-level failures get here; the stream will not survive
                self.workflow.handle_error(e).await;
                relay.drain(DRAIN_GRACE).await;
            }
        }

        tracing::info!("Connection from {} finished", peer_addr);
    }

    async fn wait_relay(&self, relay: HandshakeRelay) {
        relay.join_until(self.cancel.clone(), DRAIN_GRACE).await;
    }
}
