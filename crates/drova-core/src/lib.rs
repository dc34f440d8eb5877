//! drova-core: Core abstractions and configuration for drova-desktop
//!
//! This crate provides the session directory data model, the error
//! taxonomy, configuration structures, and the collaborator traits used by
//! the relay, remote and orchestrator crates.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::DrovaError;
pub use types::{AuthToken, ProductInfo, ServerIdentity, SessionRecord, SessionStatus};
