//! Session workflow: provision, wait for the end, revert

use std::sync::Arc;

use drova_core::config::DrovaConfig;
use drova_core::error::DrovaError;
use drova_core::traits::{RemoteShell, SessionDirectory};

use crate::poller::SessionPoller;
use crate::provision::{default_patches, Patch, ProvisionReport, Provisioner};

/// Everything one rented machine needs: poller, provisioner and patches
pub struct SessionWorkflow {
    shell: Arc<dyn RemoteShell>,
    poller: SessionPoller,
    provisioner: Provisioner,
    patches: Vec<Patch>,
}

impl SessionWorkflow {
    pub fn new(
        shell: Arc<dyn RemoteShell>,
        directory: Arc<dyn SessionDirectory>,
        config: &DrovaConfig,
    ) -> Self {
        Self {
            poller: SessionPoller::new(Arc::clone(&shell), directory, &config.poll),
            provisioner: Provisioner::new(config),
            patches: default_patches(),
            shell,
        }
    }

    /// Replace the patch list
    pub fn with_patches(mut self, patches: Vec<Patch>) -> Self {
        self.patches = patches;
        self
    }

    pub fn poller(&mut self) -> &mut SessionPoller {
        &mut self.poller
    }

    /// Finish a desktop session left over from a previous run.
    ///
    /// Waits out an unreachable machine or directory at the poll interval.
    pub async fn recover(&mut self) -> Result<(), DrovaError> {
        if let Some(session) = self.poller.check_desktop_session().await? {
            tracing::info!(
                "Desktop session {} already running ({}), waiting for it to end",
                session.uuid,
                session.status
            );
            self.finish_session().await?;
        }
        Ok(())
    }

    /// Provision, wait for the session to end, then revert.
    ///
    /// Reverting happens even when waiting fails.
    pub async fn run_desktop_session(&mut self) -> Result<ProvisionReport, DrovaError> {
        tracing::info!("Provisioning for desktop session");
        let report = self
            .provisioner
            .run_before(self.shell.as_ref(), &self.patches)
            .await;
        if !report.is_clean() {
            tracing::warn!(
                "Provisioning incomplete (frozen: {}, failed: {:?})",
                report.frozen,
                report.failed
            );
        }

        self.finish_session().await?;
        Ok(report)
    }

    /// A failed wait is only logged once the revert went out; the machine is
    /// already rebooting.
    async fn finish_session(&mut self) -> Result<(), DrovaError> {
        let ended = self.poller.wait_for_session_end().await;
        let reverted = self.provisioner.run_after(self.shell.as_ref()).await;
        self.shell.close().await;

        match (ended, reverted) {
            (Ok(true), Ok(())) => tracing::info!("Session finished, machine reverted"),
            (Ok(false), Ok(())) => tracing::info!("Session gone, machine reverted"),
            (Err(e), Ok(())) => {
                tracing::warn!("Lost track of the session ({}), machine reverted anyway", e)
            }
            (_, Err(e)) => return Err(e),
        }
        Ok(())
    }

    /// Per-cycle error policy of the drivers: request a reboot when the
    /// remote agent needs one, then back off for one poll interval.
    pub async fn handle_error(&mut self, e: DrovaError) {
        if e.requires_reboot() {
            tracing::error!("{}", e);
            if let Err(reboot) = self.provisioner.reboot(self.shell.as_ref()).await {
                tracing::error!("Reboot request failed: {}", reboot);
            }
        } else if e.is_transient() {
            tracing::warn!("Machine unavailable: {}", e);
        } else {
            tracing::error!("Session cycle failed: {}", e);
        }
        tokio::time::sleep(self.poller.interval()).await;
    }
}
