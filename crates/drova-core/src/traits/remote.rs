//! Remote command channel trait

use async_trait::async_trait;

use crate::error::RemoteError;

/// Result of a command executed on the remote machine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status, if the remote side reported one
    pub status: Option<u32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    /// Failed output with the given status
    pub fn failed(status: u32) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Stdout as text. Windows consoles do not guarantee UTF-8, so invalid
    /// sequences are replaced rather than rejected.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Abstraction over the command and file channel to the rented machine
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Run a command and collect its output, whatever the exit status
    async fn run(&self, command: &str) -> Result<CommandOutput, RemoteError>;

    /// Read a whole remote file
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, RemoteError>;

    /// Create or truncate a remote file with the given contents
    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<(), RemoteError>;

    /// Check whether a remote path exists
    async fn exists(&self, path: &str) -> Result<bool, RemoteError>;

    /// Delete a remote file
    async fn remove_file(&self, path: &str) -> Result<(), RemoteError>;

    /// Drop the connection, if any; the next call reconnects
    async fn close(&self) {}

    /// Run a command and fail unless it exits with status 0
    async fn run_checked(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        let output = self.run(command).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(RemoteError::CommandFailed {
                command: command.to_string(),
                status: output.status,
                stderr: output.stderr_text(),
            })
        }
    }
}
