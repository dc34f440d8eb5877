//! drova-relay: Handshake-sensing relay
//!
//! Duplexes opaque bytes between an inbound client and the game-streaming
//! backend, watching the backend's stream for the one-byte acknowledgment
//! that tells us the backend accepted the session.

pub mod relay;
pub mod signal;

pub use relay::{HandshakeRelay, RelayStats, BLOCK_SIZE, HANDSHAKE_ACK};
pub use signal::HandshakeSignal;
