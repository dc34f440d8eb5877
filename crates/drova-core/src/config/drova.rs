//! Top-level configuration for the session broker

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::remote::RemoteConfig;
use super::serde_utils::{duration_millis, duration_secs};
use crate::error::ConfigError;

/// Complete configuration, loaded once at process start
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DrovaConfig {
    /// SSH access to the rented machine
    pub remote: RemoteConfig,

    /// Disk freeze tool on the rented machine
    pub shadow_defender: ShadowDefenderConfig,

    /// Inbound relay settings (socket mode)
    pub socket: SocketConfig,

    /// Session directory endpoint
    pub directory: DirectoryConfig,

    /// Poll cadence and token lifetime
    pub poll: PollConfig,

    /// Settling delays around provisioning steps
    pub provision: ProvisionConfig,
}

impl DrovaConfig {
    /// Check that every setting without a usable default was provided
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote.host.is_empty() {
            return Err(ConfigError::MissingField("remote.host".into()));
        }
        if self.remote.username.is_empty() {
            return Err(ConfigError::MissingField("remote.username".into()));
        }
        if self.remote.password.is_none() && self.remote.private_key_path.is_none() {
            return Err(ConfigError::MissingField(
                "remote.password or remote.private_key_path".into(),
            ));
        }
        if self.shadow_defender.password.is_empty() {
            return Err(ConfigError::MissingField("shadow_defender.password".into()));
        }
        if self.shadow_defender.drives.is_empty() {
            return Err(ConfigError::MissingField("shadow_defender.drives".into()));
        }
        if !self
            .shadow_defender
            .drives
            .chars()
            .all(|c| c.is_ascii_alphabetic())
        {
            return Err(ConfigError::Invalid(format!(
                "shadow_defender.drives must be drive letters, got {:?}",
                self.shadow_defender.drives
            )));
        }
        if self.poll.interval.is_zero() {
            return Err(ConfigError::Invalid("poll.interval_ms must be positive".into()));
        }
        Ok(())
    }

    /// Address of the game-streaming endpoint on the rented machine
    pub fn backend_address(&self) -> String {
        format!("{}:{}", self.remote.host, self.socket.backend_port)
    }
}

/// Shadow Defender command-line tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowDefenderConfig {
    /// Tool password
    pub password: String,

    /// Drive letters to freeze, e.g. `"CD"`
    pub drives: String,

    /// Path of `CmdTool.exe` on the remote machine
    pub executable: String,
}

impl Default for ShadowDefenderConfig {
    fn default() -> Self {
        Self {
            password: String::new(),
            drives: String::new(),
            executable: r"C:\Program Files\Shadow Defender\CmdTool.exe".to_string(),
        }
    }
}

/// Inbound relay settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    /// Address the relay listens on
    pub listen_address: String,

    /// Game-streaming port on the rented machine
    pub backend_port: u16,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:7985".to_string(),
            backend_port: 7985,
        }
    }
}

/// Session directory endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Base URL of the marketplace services
    pub base_url: String,

    /// Per-request timeout
    #[serde(rename = "request_timeout_secs", with = "duration_secs")]
    pub request_timeout: Duration,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://services.drova.io".to_string(),
            request_timeout: Duration::from_secs(15),
        }
    }
}

/// Poll cadence and token lifetime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Delay between directory polls
    #[serde(rename = "interval_ms", with = "duration_millis")]
    pub interval: Duration,

    /// How long a fetched auth token is reused
    #[serde(rename = "token_ttl_secs", with = "duration_secs")]
    pub token_ttl: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            token_ttl: Duration::from_secs(60),
        }
    }
}

/// Settling delays around provisioning steps
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// After entering frozen-disk mode
    #[serde(rename = "freeze_settle_ms", with = "duration_millis")]
    pub freeze_settle: Duration,

    /// After terminating a launcher, before patching its files
    #[serde(rename = "kill_settle_ms", with = "duration_millis")]
    pub kill_settle: Duration,

    /// After the group policy refresh, before restarting the shell
    #[serde(rename = "policy_settle_ms", with = "duration_millis")]
    pub policy_settle: Duration,

    /// Before leaving frozen-disk mode at session end
    #[serde(rename = "revert_delay_ms", with = "duration_millis")]
    pub revert_delay: Duration,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            freeze_settle: Duration::from_secs(2),
            kill_settle: Duration::from_millis(200),
            policy_settle: Duration::from_secs(1),
            revert_delay: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> DrovaConfig {
        let mut config = DrovaConfig::default();
        config.remote.host = "10.0.0.2".into();
        config.remote.username = "gamer".into();
        config.remote.password = Some("pw".into());
        config.shadow_defender.password = "sd".into();
        config.shadow_defender.drives = "C".into();
        config
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validate_requires_credentials() {
        let mut config = valid();
        config.remote.password = None;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField(_))
        ));

        config.remote.private_key_path = Some("/root/.ssh/id_ed25519".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_drives() {
        let mut config = valid();
        config.shadow_defender.drives = "C:".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_backend_address() {
        assert_eq!(valid().backend_address(), "10.0.0.2:7985");
    }
}
