//! Remote machine connection settings

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;

/// How to reach the rented Windows machine over SSH
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Host name or address of the machine
    pub host: String,

    /// SSH port
    pub port: u16,

    /// Windows login
    pub username: String,

    /// Password authentication (takes precedence over the key)
    pub password: Option<String>,

    /// Private key authentication
    pub private_key_path: Option<PathBuf>,

    /// Expected host key fingerprint. Mismatches are logged, not rejected.
    pub host_key_fingerprint: Option<String>,

    /// Connection timeout
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            username: String::new(),
            password: None,
            private_key_path: None,
            host_key_fingerprint: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl RemoteConfig {
    /// `host:port` for the SSH connection
    pub fn ssh_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
