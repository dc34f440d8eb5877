//! Client <-> backend byte relay with acknowledgment detection
//!
//! Two pumps run for the whole lifetime of a relay:
//! - client -> backend forwards chunks unchanged and shuts the backend's
//!   write side down when the client reaches EOF
//! - backend -> client forwards chunks unchanged and resolves the handshake
//!   signal to `true` on the first chunk containing [`HANDSHAKE_ACK`]
//!
//! Whichever pump stops first without an acknowledgment having been seen
//! resolves the signal to `false`. Pumps keep forwarding after the signal
//! resolves; callers only wait for the signal, not for the pumps.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::signal::HandshakeSignal;

/// Byte the backend sends once it accepts the relayed session
pub const HANDSHAKE_ACK: u8 = 0x01;

/// Read chunk size for both pumps
pub const BLOCK_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ClientToBackend,
    BackendToClient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpEnd {
    ReaderEof,
    ReadFailed,
    WriteFailed,
    Cancelled,
}

/// Bytes forwarded in each direction over the relay's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub client_to_backend: u64,
    pub backend_to_client: u64,
}

/// One relayed connection: two pumps and a handshake signal
pub struct HandshakeRelay {
    signal: Arc<HandshakeSignal>,
    cancel: CancellationToken,
    upstream: JoinHandle<u64>,
    downstream: JoinHandle<u64>,
}

impl HandshakeRelay {
    /// Split both connections and start the two pumps.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<C, B>(client: C, backend: B) -> Self
    where
        C: AsyncRead + AsyncWrite + Send + 'static,
        B: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (client_read, client_write) = tokio::io::split(client);
        let (backend_read, backend_write) = tokio::io::split(backend);

        let signal = Arc::new(HandshakeSignal::new());
        let cancel = CancellationToken::new();

        let upstream = tokio::spawn(pump(
            client_read,
            backend_write,
            Direction::ClientToBackend,
            Arc::clone(&signal),
            cancel.clone(),
        ));
        let downstream = tokio::spawn(pump(
            backend_read,
            client_write,
            Direction::BackendToClient,
            Arc::clone(&signal),
            cancel.clone(),
        ));

        Self {
            signal,
            cancel,
            upstream,
            downstream,
        }
    }

    /// Wait until the handshake resolves.
    ///
    /// `true` iff the backend sent the acknowledgment before either side
    /// closed. Calling again returns the same value without waiting.
    pub async fn await_handshake(&self) -> bool {
        self.signal.wait().await
    }

    /// Handshake result so far, `None` while undecided
    pub fn handshake(&self) -> Option<bool> {
        self.signal.get()
    }

    /// Force-close both connections and stop both pumps
    pub async fn clear(self) -> RelayStats {
        self.cancel.cancel();
        self.signal.resolve(false);
        self.finish().await
    }

    /// Wait for both sides to close on their own
    pub async fn join(self) -> RelayStats {
        self.finish().await
    }

    /// Wait up to `grace` for both sides to close, then force-close
    pub async fn drain(self, grace: Duration) -> RelayStats {
        let cancel = self.cancel.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            cancel.cancel();
        });
        let stats = self.finish().await;
        timer.abort();
        stats
    }

    /// Wait for both sides to close on their own; once `shutdown` fires,
    /// allow `grace` more before force-closing
    pub async fn join_until(self, shutdown: CancellationToken, grace: Duration) -> RelayStats {
        let cancel = self.cancel.clone();
        let timer = tokio::spawn(async move {
            shutdown.cancelled().await;
            tokio::time::sleep(grace).await;
            cancel.cancel();
        });
        let stats = self.finish().await;
        timer.abort();
        stats
    }

    async fn finish(self) -> RelayStats {
        let client_to_backend = self.upstream.await.unwrap_or_else(|e| {
            tracing::warn!("client->backend pump panicked: {}", e);
            0
        });
        let backend_to_client = self.downstream.await.unwrap_or_else(|e| {
            tracing::warn!("backend->client pump panicked: {}", e);
            0
        });

        let stats = RelayStats {
            client_to_backend,
            backend_to_client,
        };
        tracing::debug!(
            "Relay finished: {} bytes up, {} bytes down",
            stats.client_to_backend,
            stats.backend_to_client
        );
        stats
    }
}

/// Copy chunks from `reader` to `writer` until EOF, failure or cancellation.
/// Returns the number of bytes forwarded.
async fn pump<R, W>(
    mut reader: R,
    mut writer: W,
    direction: Direction,
    signal: Arc<HandshakeSignal>,
    cancel: CancellationToken,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(BLOCK_SIZE);
    let mut forwarded = 0u64;

    let end = loop {
        buf.clear();
        let read = tokio::select! {
            _ = cancel.cancelled() => break PumpEnd::Cancelled,
            read = reader.read_buf(&mut buf) => read,
        };

        match read {
            Ok(0) => break PumpEnd::ReaderEof,
            Ok(n) => {
                tracing::trace!("{:?}: {} bytes", direction, n);

                if direction == Direction::BackendToClient
                    && buf.contains(&HANDSHAKE_ACK)
                    && signal.resolve(true)
                {
                    tracing::debug!("Backend acknowledged the session");
                }

                let written = tokio::select! {
                    _ = cancel.cancelled() => break PumpEnd::Cancelled,
                    written = write_chunk(&mut writer, &buf) => written,
                };
                if let Err(e) = written {
                    // Peer went away (reset / broken pipe); not a relay error
                    tracing::debug!("{:?}: write to closed peer: {}", direction, e);
                    break PumpEnd::WriteFailed;
                }
                forwarded += n as u64;
            }
            Err(e) => {
                tracing::debug!("{:?}: read failed: {}", direction, e);
                break PumpEnd::ReadFailed;
            }
        }
    };

    if end == PumpEnd::ReaderEof {
        let _ = writer.shutdown().await;
    }

    if signal.resolve(false) {
        tracing::debug!("{:?} stopped ({:?}) before acknowledgment", direction, end);
    } else {
        tracing::debug!("{:?} stopped ({:?})", direction, end);
    }

    forwarded
}

async fn write_chunk<W: AsyncWrite + Unpin>(writer: &mut W, chunk: &[u8]) -> std::io::Result<()> {
    writer.write_all(chunk).await?;
    writer.flush().await
}
