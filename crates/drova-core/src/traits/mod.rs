//! Core trait definitions

mod directory;
mod remote;

pub use directory::SessionDirectory;
pub use remote::{CommandOutput, RemoteShell};
