//! Top-level drivers
//!
//! - [`SocketDriver`]: relays one inbound connection at a time and
//!   provisions once the backend accepts it
//! - [`PollDriver`]: provisions for every new desktop session, with no
//!   inbound listener

mod listener;
mod poll;

pub use listener::{bind_listener, SocketDriver};
pub use poll::PollDriver;
