//! Core error types for drova-desktop

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the session lifecycle
#[derive(Error, Debug)]
pub enum DrovaError {
    /// The remote agent is in a state only a restart recovers from
    #[error("Reboot required: {0}")]
    RebootRequired(#[from] TokenError),

    /// Remote command channel error
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Session directory error
    #[error("Session directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DrovaError {
    /// Whether the failure is expected to clear up on its own
    /// (machine rebooting, network blip, directory hiccup).
    pub fn is_transient(&self) -> bool {
        match self {
            DrovaError::Remote(e) => e.is_transient(),
            DrovaError::Directory(_) => true,
            DrovaError::Io(_) => true,
            DrovaError::RebootRequired(_) | DrovaError::Config(_) => false,
        }
    }

    /// Whether the remote machine must be restarted before retrying
    pub fn requires_reboot(&self) -> bool {
        matches!(self, DrovaError::RebootRequired(_))
    }
}

/// Remote command channel errors
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Could not reach or handshake with the remote machine
    #[error("Remote machine unreachable: {0}")]
    Unreachable(String),

    /// An established session or channel went away
    #[error("Remote channel closed: {0}")]
    Disconnected(String),

    /// Credentials were rejected
    #[error("Authentication failed for user '{username}'")]
    AuthenticationFailed { username: String },

    /// Private key could not be loaded
    #[error("Failed to load private key: {0}")]
    Key(String),

    /// A command exited with a non-zero status
    #[error("Command `{command}` failed with status {status:?}: {stderr}")]
    CommandFailed {
        command: String,
        status: Option<u32>,
        stderr: String,
    },

    /// A remote file operation failed
    #[error("File operation on {path} failed: {message}")]
    File { path: String, message: String },
}

impl RemoteError {
    /// Connectivity failures are retried; everything else is reported
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::Unreachable(_) | RemoteError::Disconnected(_)
        )
    }
}

/// Failures extracting the server identity and auth token
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// No `auth_token` value (or no server path) in the registry output
    #[error("auth_token not found in registry output")]
    AuthTokenMissing,

    /// More than one `auth_token` value in the registry output
    #[error("auth_token found more than once in registry output")]
    AuthTokenDuplicate,

    /// The registry query itself failed
    #[error("registry query exited with status {status:?}")]
    QueryFailed { status: Option<u32> },
}

/// Session directory (HTTP) errors
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// Transport-level failure
    #[error("Request failed: {0}")]
    Request(String),

    /// The auth token was rejected
    #[error("Auth token rejected")]
    Unauthorized,

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unexpected HTTP status
    #[error("Unexpected status {0}")]
    Status(u16),

    /// Response body could not be decoded
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

/// Patch application errors
#[derive(Error, Debug)]
pub enum PatchError {
    /// Remote file or command failure
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Some registry writes were rejected
    #[error("{failed} registry writes failed")]
    Registry { failed: usize },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_errors_require_reboot() {
        let err: DrovaError = TokenError::AuthTokenDuplicate.into();
        assert!(err.requires_reboot());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_connectivity_is_transient() {
        let err: DrovaError = RemoteError::Unreachable("timeout".into()).into();
        assert!(err.is_transient());
        assert!(!err.requires_reboot());

        let err: DrovaError = RemoteError::AuthenticationFailed {
            username: "gamer".into(),
        }
        .into();
        assert!(!err.is_transient());
    }
}
