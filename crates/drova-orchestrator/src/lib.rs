//! drova-orchestrator: Session lifecycle for a rented desktop machine
//!
//! The orchestrator sits between the renter's streaming client and the
//! rented machine. It relays the connection, waits for the machine to accept
//! it, and around every desktop rental freezes the disk, strips launcher
//! credentials and locks the desktop down, then reverts the machine once
//! the session ends.

pub mod classifier;
pub mod directory;
pub mod poller;
pub mod provision;
pub mod server;
pub mod token;
pub mod validate;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;

pub use directory::HttpSessionDirectory;
pub use poller::SessionPoller;
pub use provision::{Patch, ProvisionReport, Provisioner};
pub use server::{bind_listener, PollDriver, SocketDriver};
pub use token::TokenCache;
pub use workflow::SessionWorkflow;
