//! Lazily reconnecting handle to the rented machine
//!
//! The machine reboots at the end of every rental, so a single SSH session
//! never lives for the whole process. `RemoteMachine` connects on first use
//! and forgets its session after any connectivity failure; the next call
//! dials again.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use drova_core::config::RemoteConfig;
use drova_core::error::RemoteError;
use drova_core::traits::{CommandOutput, RemoteShell};

use crate::ssh::SshSession;

pub struct RemoteMachine {
    config: RemoteConfig,
    session: Mutex<Option<Arc<SshSession>>>,
}

impl RemoteMachine {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
        }
    }

    /// Current session, connecting if there is none
    pub async fn session(&self) -> Result<Arc<SshSession>, RemoteError> {
        let mut current = self.session.lock().await;
        if let Some(session) = current.as_ref() {
            return Ok(Arc::clone(session));
        }

        let session = Arc::new(SshSession::connect(&self.config).await?);
        *current = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Close the current session, if any
    pub async fn disconnect(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            session.close().await;
        }
    }

    /// Drop `session` if `result` says the link is gone
    async fn observe<T>(&self, session: &Arc<SshSession>, result: &Result<T, RemoteError>) {
        let Err(e) = result else { return };
        if !e.is_transient() {
            return;
        }

        let mut current = self.session.lock().await;
        if current
            .as_ref()
            .is_some_and(|cached| Arc::ptr_eq(cached, session))
        {
            tracing::info!(
                "Lost SSH session with {} ({}), will reconnect",
                session.address(),
                e
            );
            *current = None;
        }
    }
}

#[async_trait]
impl RemoteShell for RemoteMachine {
    async fn run(&self, command: &str) -> Result<CommandOutput, RemoteError> {
        let session = self.session().await?;
        let result = session.run(command).await;
        self.observe(&session, &result).await;
        result
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, RemoteError> {
        let session = self.session().await?;
        let result = session.read_file(path).await;
        self.observe(&session, &result).await;
        result
    }

    async fn write_file(&self, path: &str, contents: &[u8]) -> Result<(), RemoteError> {
        let session = self.session().await?;
        let result = session.write_file(path, contents).await;
        self.observe(&session, &result).await;
        result
    }

    async fn exists(&self, path: &str) -> Result<bool, RemoteError> {
        let session = self.session().await?;
        let result = session.exists(path).await;
        self.observe(&session, &result).await;
        result
    }

    async fn remove_file(&self, path: &str) -> Result<(), RemoteError> {
        let session = self.session().await?;
        let result = session.remove_file(path).await;
        self.observe(&session, &result).await;
        result
    }

    async fn close(&self) {
        self.disconnect().await;
    }
}
