//! Poll mode: provision for every desktop session without relaying

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::workflow::SessionWorkflow;

pub struct PollDriver {
    workflow: SessionWorkflow,
    cancel: CancellationToken,
}

impl PollDriver {
    pub fn new(workflow: SessionWorkflow, cancel: CancellationToken) -> Self {
        Self { workflow, cancel }
    }

    /// Recover a leftover session, then loop until cancelled
    pub async fn run(mut self) -> Result<()> {
        let recovered = tokio::select! {
            _ = self.cancel.cancelled() => return Ok(()),
            recovered = self.workflow.recover() => recovered,
        };
        if let Err(e) = recovered {
            self.workflow.handle_error(e).await;
        }

        tracing::info!("Polling for desktop sessions");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("Poll loop shutting down");
                    break;
                }
                _ = Self::cycle(&mut self.workflow) => {}
            }
        }

        Ok(())
    }

    /// Wait for one desktop session and see it through
    async fn cycle(workflow: &mut SessionWorkflow) {
        let interval = workflow.poller().interval();
        match workflow.poller().wait_for_desktop_session().await {
            Ok(true) => {
                tracing::info!("Desktop session starting");
                if let Err(e) = workflow.run_desktop_session().await {
                    workflow.handle_error(e).await;
                }
            }
            Ok(false) => {
                tracing::debug!("Not a desktop session");
                tokio::time::sleep(interval).await;
            }
            Err(e) => workflow.handle_error(e).await,
        }
    }
}
