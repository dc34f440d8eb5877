//! Provisioning around a desktop rental
//!
//! Before the renter gets the machine: enter frozen-disk mode, then for each
//! patch terminate its launcher and sanitize it. Each step captures its own
//! failure and the sequence carries on; a half-sanitized machine is still
//! better than an untouched one. After the rental: leave frozen-disk mode
//! and reboot, which discards everything written during the session.

mod patch;

pub use patch::{
    default_patches, policy_values, remove_ini_sections, Patch, PatchKind, PatchOutcome,
    BLOCKED_APPLICATIONS,
};

use std::time::Duration;

use drova_core::config::{DrovaConfig, ProvisionConfig, ShadowDefenderConfig};
use drova_core::error::{DrovaError, RemoteError};
use drova_core::traits::{CommandOutput, RemoteShell};
use drova_remote::commands::{Reboot, ShadowAction, ShadowDefenderCli, TaskKill};

/// Marker Shadow Defender prints when the password is wrong
pub const SHADOW_DEFENDER_BAD_PASSWORD: &str = "not correct";

/// Interactive account and timings the patches need
#[derive(Debug, Clone)]
pub struct PatchContext {
    /// Account the desktop shell is restarted as
    pub user: String,
    pub password: Option<String>,
    /// Wait after the policy refresh before restarting the shell
    pub policy_settle: Duration,
}

/// Outcome of [`Provisioner::run_before`]
#[derive(Debug, Clone, Default)]
pub struct ProvisionReport {
    /// Frozen-disk mode was entered
    pub frozen: bool,
    pub applied: Vec<&'static str>,
    /// Failed patches with the error text
    pub failed: Vec<(&'static str, String)>,
}

impl ProvisionReport {
    pub fn is_clean(&self) -> bool {
        self.frozen && self.failed.is_empty()
    }
}

pub struct Provisioner {
    shadow: ShadowDefenderConfig,
    timings: ProvisionConfig,
    context: PatchContext,
}

impl Provisioner {
    pub fn new(config: &DrovaConfig) -> Self {
        Self {
            shadow: config.shadow_defender.clone(),
            timings: config.provision.clone(),
            context: PatchContext {
                user: config.remote.username.clone(),
                password: config.remote.password.clone(),
                policy_settle: config.provision.policy_settle,
            },
        }
    }

    /// Freeze the disk and apply `patches` in order, best-effort
    pub async fn run_before(&self, shell: &dyn RemoteShell, patches: &[Patch]) -> ProvisionReport {
        let mut report = ProvisionReport::default();

        match run_shadow_defender(shell, &self.shadow, &[ShadowAction::Enter]).await {
            Ok(_) => {
                tracing::info!("Entered frozen-disk mode on {}", self.shadow.drives);
                report.frozen = true;
            }
            Err(e) => tracing::error!("Failed to enter frozen-disk mode: {}", e),
        }
        tokio::time::sleep(self.timings.freeze_settle).await;

        for patch in patches {
            if let Some(image) = patch.kill_image {
                match shell.run(&TaskKill::force(image).to_string()).await {
                    Ok(output) if output.success() => tracing::info!("Terminated {}", image),
                    Ok(_) => tracing::debug!("{} was not running", image),
                    Err(e) => tracing::warn!("Failed to terminate {}: {}", image, e),
                }
                tokio::time::sleep(self.timings.kill_settle).await;
            }

            match patch.apply(shell, &self.context).await {
                Ok(outcome) => {
                    tracing::info!("Patch {}: {}", patch.name, outcome);
                    report.applied.push(patch.name);
                }
                Err(e) => {
                    tracing::error!("Patch {} failed: {}", patch.name, e);
                    report.failed.push((patch.name, e.to_string()));
                }
            }
        }

        report
    }

    /// Leave frozen-disk mode and reboot, discarding the session's writes.
    ///
    /// Runs regardless of how [`run_before`](Self::run_before) went.
    pub async fn run_after(&self, shell: &dyn RemoteShell) -> Result<(), DrovaError> {
        tokio::time::sleep(self.timings.revert_delay).await;

        tracing::info!("Leaving frozen-disk mode and rebooting");
        let result = run_shadow_defender(
            shell,
            &self.shadow,
            &[ShadowAction::Exit, ShadowAction::Reboot],
        )
        .await;
        going_down(result.map(drop))
    }

    /// Plain forced restart, for a remote agent in a bad state
    pub async fn reboot(&self, shell: &dyn RemoteShell) -> Result<(), DrovaError> {
        tracing::warn!("Rebooting the remote machine");
        let result = shell.run_checked(&Reboot.to_string()).await;
        going_down(result.map(drop))
    }
}

/// A reboot may drop the connection before the command reports back
fn going_down(result: Result<(), RemoteError>) -> Result<(), DrovaError> {
    match result {
        Err(e) if e.is_transient() => {
            tracing::debug!("Connection dropped while rebooting: {}", e);
            Ok(())
        }
        other => Ok(other?),
    }
}

/// Run the Shadow Defender tool, failing on a non-zero exit or a rejected
/// password. The password is kept out of the error.
pub async fn run_shadow_defender(
    shell: &dyn RemoteShell,
    config: &ShadowDefenderConfig,
    actions: &[ShadowAction],
) -> Result<CommandOutput, RemoteError> {
    let output = shell
        .run(&ShadowDefenderCli::new(config, actions).to_string())
        .await?;

    let stdout = output.stdout_text();
    if output.success() && !stdout.contains(SHADOW_DEFENDER_BAD_PASSWORD) {
        return Ok(output);
    }

    Err(RemoteError::CommandFailed {
        command: format!("CmdTool.exe {:?}", actions),
        status: output.status,
        stderr: if stdout.contains(SHADOW_DEFENDER_BAD_PASSWORD) {
            "password not correct".to_string()
        } else {
            output.stderr_text()
        },
    })
}
