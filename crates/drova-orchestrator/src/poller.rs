//! Session poller
//!
//! Tracks the rental session on the directory:
//!
//! ```text
//! NO_SESSION -> NEW | HANDSHAKE -> ACTIVE -> ABORTED | FINISHED
//! ```
//!
//! Every poll re-uses the cached auth token. Transient failures (the
//! machine rebooting, a directory hiccup) are logged and retried after one
//! interval; a rejected token is dropped from the cache before retrying.
//! Only [`DrovaError::RebootRequired`] and configuration-level failures
//! reach the caller.

use std::sync::Arc;
use std::time::Duration;

use drova_core::config::PollConfig;
use drova_core::error::{DirectoryError, DrovaError};
use drova_core::traits::{RemoteShell, SessionDirectory};
use drova_core::types::{AuthToken, ServerIdentity, SessionRecord};

use crate::classifier;
use crate::token::TokenCache;

pub struct SessionPoller {
    shell: Arc<dyn RemoteShell>,
    directory: Arc<dyn SessionDirectory>,
    tokens: TokenCache,
    interval: Duration,
}

impl SessionPoller {
    pub fn new(
        shell: Arc<dyn RemoteShell>,
        directory: Arc<dyn SessionDirectory>,
        config: &PollConfig,
    ) -> Self {
        Self {
            shell,
            directory,
            tokens: TokenCache::new(config.token_ttl),
            interval: config.interval,
        }
    }

    /// Delay between polls
    pub fn interval(&self) -> Duration {
        self.interval
    }

    async fn credentials(&mut self) -> Result<(ServerIdentity, AuthToken), DrovaError> {
        self.tokens.get_identity_and_token(self.shell.as_ref()).await
    }

    /// Most recent session for this server, in any status
    pub async fn latest_session(&mut self) -> Result<Option<SessionRecord>, DrovaError> {
        let (server, token) = self.credentials().await?;
        Ok(self.directory.latest_session(&server, &token).await?)
    }

    /// Most recent session still in NEW or HANDSHAKE
    pub async fn new_session(&mut self) -> Result<Option<SessionRecord>, DrovaError> {
        let (server, token) = self.credentials().await?;
        Ok(self.directory.new_session(&server, &token).await?)
    }

    /// See [`classifier::is_desktop_eligible`]
    pub async fn is_desktop_eligible(&mut self, session: &SessionRecord) -> Result<bool, DrovaError> {
        let (_, token) = self.credentials().await?;
        Ok(classifier::is_desktop_eligible(self.directory.as_ref(), session, &token).await?)
    }

    /// One-shot check: the latest session, if it is starting or active and
    /// is a desktop session
    pub async fn current_desktop_session(&mut self) -> Result<Option<SessionRecord>, DrovaError> {
        let Some(session) = self.latest_session().await? else {
            return Ok(None);
        };
        if !session.status.is_live() {
            tracing::debug!("Latest session {} is {}", session.uuid, session.status);
            return Ok(None);
        }

        match self.is_desktop_eligible(&session).await {
            Ok(true) => Ok(Some(session)),
            Ok(false) => Ok(None),
            Err(DrovaError::Directory(DirectoryError::NotFound(_))) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// [`current_desktop_session`](Self::current_desktop_session), retried
    /// at the poll interval until the directory and the machine answer
    pub async fn check_desktop_session(&mut self) -> Result<Option<SessionRecord>, DrovaError> {
        loop {
            match self.current_desktop_session().await {
                Ok(current) => return Ok(current),
                Err(e) => self.absorb(e).await?,
            }
        }
    }

    /// Wait for a session in NEW or HANDSHAKE and classify it.
    ///
    /// Returns `false` when that session is not a desktop session or its
    /// product can no longer be found.
    pub async fn wait_for_desktop_session(&mut self) -> Result<bool, DrovaError> {
        loop {
            let session = match self.new_session().await {
                Ok(Some(session)) if session.status.is_starting() => session,
                Ok(_) => {
                    tokio::time::sleep(self.interval).await;
                    continue;
                }
                Err(e) => {
                    self.absorb(e).await?;
                    continue;
                }
            };

            tracing::info!(
                "New session {} ({}) for product {}",
                session.uuid,
                session.status,
                session.product_id
            );
            match self.is_desktop_eligible(&session).await {
                Ok(eligible) => return Ok(eligible),
                Err(DrovaError::Directory(DirectoryError::NotFound(what))) => {
                    tracing::warn!("Product of session {} disappeared: {}", session.uuid, what);
                    return Ok(false);
                }
                Err(e) => self.absorb(e).await?,
            }
        }
    }

    /// Wait until the latest session is over.
    ///
    /// `true` when it reached ABORTED or FINISHED, `false` when it vanished
    /// without a terminal status.
    pub async fn wait_for_session_end(&mut self) -> Result<bool, DrovaError> {
        loop {
            match self.latest_session().await {
                Ok(None) => {
                    tracing::info!("Session vanished from the directory");
                    return Ok(false);
                }
                Ok(Some(session)) if session.status.is_terminal() => {
                    tracing::info!("Session {} ended ({})", session.uuid, session.status);
                    return Ok(true);
                }
                Ok(Some(session)) => {
                    tracing::trace!("Session {} is {}", session.uuid, session.status);
                    tokio::time::sleep(self.interval).await;
                }
                Err(e) => self.absorb(e).await?,
            }
        }
    }

    /// Swallow a transient poll failure (after one interval), or hand it back
    async fn absorb(&mut self, e: DrovaError) -> Result<(), DrovaError> {
        if matches!(e, DrovaError::Directory(DirectoryError::Unauthorized)) {
            tracing::info!("Auth token rejected, re-reading it");
            self.tokens.invalidate();
        }
        if !e.is_transient() {
            return Err(e);
        }

        tracing::warn!("Machine currently unavailable: {}", e);
        tokio::time::sleep(self.interval).await;
        Ok(())
    }
}
