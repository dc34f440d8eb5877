//! Credential check for a fresh install

use thiserror::Error;

use drova_core::config::ShadowDefenderConfig;
use drova_core::error::RemoteError;
use drova_core::traits::RemoteShell;
use drova_remote::commands::{ShadowAction, ShadowDefenderCli};

use crate::provision::SHADOW_DEFENDER_BAD_PASSWORD;

/// Small file every Windows install has, read to prove SFTP works
pub const PROBE_FILE: &str = r"C:\Windows\System32\drivers\etc\hosts";

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Remote machine check failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("Shadow Defender rejected the password")]
    ShadowDefenderPassword,

    #[error("{0} is empty, file transfer is not working")]
    EmptyProbeFile(&'static str),
}

/// Check the Shadow Defender password and SFTP access on the machine
pub async fn validate_credentials(
    shell: &dyn RemoteShell,
    shadow: &ShadowDefenderConfig,
) -> Result<(), ValidationError> {
    let output = shell
        .run(&ShadowDefenderCli::new(shadow, &[ShadowAction::List]).to_string())
        .await?;
    if output.stdout_text().contains(SHADOW_DEFENDER_BAD_PASSWORD) {
        return Err(ValidationError::ShadowDefenderPassword);
    }
    tracing::info!("Shadow Defender password accepted");

    let contents = shell.read_file(PROBE_FILE).await?;
    if contents.is_empty() {
        return Err(ValidationError::EmptyProbeFile(PROBE_FILE));
    }
    tracing::info!("SFTP access works ({} bytes read)", contents.len());

    Ok(())
}
