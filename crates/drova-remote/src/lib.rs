//! drova-remote: Remote command channel to the rented machine
//!
//! An SSH client (commands over `exec` channels, files over SFTP), a lazily
//! reconnecting wrapper that survives the machine's reboots, and builders
//! for the Windows command lines the provisioning workflow runs.

pub mod commands;
pub mod machine;
pub mod ssh;

pub use machine::RemoteMachine;
pub use ssh::SshSession;
