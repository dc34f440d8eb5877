//! SSH session to the rented machine
//!
//! Each command runs on its own `exec` channel. File access goes through a
//! single SFTP subsystem channel opened on first use.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Config, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use russh_sftp::client::SftpSession;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::OnceCell;

use drova_core::config::RemoteConfig;
use drova_core::error::RemoteError;
use drova_core::traits::{CommandOutput, RemoteShell};

/// Keepalive probe interval; lets a rebooting machine surface as a
/// disconnect instead of a hang
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Extended data stream id for stderr
const STDERR_STREAM: u32 = 1;

/// An authenticated SSH session
pub struct SshSession {
    handle: Handle<ClientHandler>,
    sftp: OnceCell<SftpSession>,
    address: String,
}

impl SshSession {
    /// Connect and authenticate (password first, then private key)
    pub async fn connect(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let ssh_config = Arc::new(Config {
            keepalive_interval: Some(KEEPALIVE_INTERVAL),
            ..Config::default()
        });
        let handler = ClientHandler::new(config.host_key_fingerprint.clone());
        let address = config.ssh_address();

        tracing::debug!("Connecting to {}", address);
        let mut handle = tokio::time::timeout(
            config.connect_timeout,
            client::connect(ssh_config, address.as_str(), handler),
        )
        .await
        .map_err(|_| RemoteError::Unreachable(format!("{}: connection timed out", address)))?
        .map_err(|e| RemoteError::Unreachable(format!("{}: {}", address, e)))?;

        tracing::debug!("Authenticating as user '{}'", config.username);
        let authenticated = if let Some(password) = &config.password {
            handle
                .authenticate_password(config.username.as_str(), password.as_str())
                .await
        } else if let Some(key_path) = &config.private_key_path {
            let key = russh_keys::load_secret_key(key_path, None)
                .map_err(|e| RemoteError::Key(format!("{}: {}", key_path.display(), e)))?;
            handle
                .authenticate_publickey(config.username.as_str(), Arc::new(key))
                .await
        } else {
            Ok(false)
        }
        .map_err(channel_error)?;

        if !authenticated {
            return Err(RemoteError::AuthenticationFailed {
                username: config.username.clone(),
            });
        }

        tracing::info!("SSH session established with {}", address);
        Ok(Self {
            handle,
            sftp: OnceCell::new(),
            address,
        })
    }

    /// Address this session is connected to
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Close the session
    pub async fn close(&self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "closing", "en")
            .await
        {
            tracing::debug!("Disconnect from {} failed: {}", self.address, e);
        }
    }

    async fn sftp(&self) -> Result<&SftpSession, RemoteError> {
        self.sftp
            .get_or_try_init(|| async {
                let channel = self
                    .handle
                    .channel_open_session()
                    .await
                    .map_err(channel_error)?;
                channel
                    .request_subsystem(true, "sftp")
                    .await
                    .map_err(channel_error)?;
                SftpSession::new(channel.into_stream())
                    .await
                    .map_err(|e| RemoteError::Disconnected(format!("sftp subsystem: {}", e)))
            })
            .await
    }
}

#[async_trait]
impl RemoteShell for SshSession {
    async fn run(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(channel_error)?;
        channel.exec(true, command).await.map_err(channel_error)?;

        let mut output = CommandOutput::default();
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => output.stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext } if ext == STDERR_STREAM => {
                    output.stderr.extend_from_slice(data)
                }
                ChannelMsg::ExitStatus { exit_status } => output.status = Some(exit_status),
                _ => {}
            }
        }

        tracing::trace!(
            "Remote command exited with {:?} ({} bytes stdout)",
            output.status,
            output.stdout.len()
        );
        Ok(output)
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, RemoteError> {
        let sftp = self.sftp().await?;
        let mut file = sftp.open(path).await.map_err(|e| file_error(path, e))?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .await
            .map_err(|e| file_error(path, e))?;
        Ok(contents)
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<(), RemoteError> {
        let sftp = self.sftp().await?;
        let mut file = sftp.create(path).await.map_err(|e| file_error(path, e))?;
        file.write_all(contents)
            .await
            .map_err(|e| file_error(path, e))?;
        file.shutdown().await.map_err(|e| file_error(path, e))?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, RemoteError> {
        let sftp = self.sftp().await?;
        sftp.try_exists(path)
            .await
            .map_err(|e| file_error(path, e))
    }

    async fn remove_file(&self, path: &str) -> Result<(), RemoteError> {
        let sftp = self.sftp().await?;
        sftp.remove_file(path)
            .await
            .map_err(|e| file_error(path, e))
    }
}

fn channel_error(e: russh::Error) -> RemoteError {
    RemoteError::Disconnected(e.to_string())
}

fn file_error(path: &str, e: impl std::fmt::Display) -> RemoteError {
    RemoteError::File {
        path: path.to_string(),
        message: e.to_string(),
    }
}

/// SSH client handler for the remote machine
struct ClientHandler {
    /// Expected host key fingerprint (for verification)
    expected_host_key: Option<String>,
}

impl ClientHandler {
    fn new(expected_host_key: Option<String>) -> Self {
        Self { expected_host_key }
    }
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = anyhow::Error;

    /// The machine sits on the operator's LAN and is reinstalled often,
    /// so host keys are accepted; a configured fingerprint only warns.
    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        tracing::debug!("Server host key: {}", fingerprint);

        if let Some(expected) = &self.expected_host_key {
            if fingerprint != *expected {
                tracing::warn!(
                    "Host key differs from configured: expected {}, got {}",
                    expected,
                    fingerprint
                );
            }
        }

        Ok(true)
    }
}
