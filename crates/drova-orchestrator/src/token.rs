//! Cached server identity and auth token
//!
//! The marketplace agent on the rented machine stores its credentials in
//! the registry. Reading them costs a remote command, so the pair is kept
//! for a short TTL and re-read when it expires or the directory rejects it.

use std::time::Duration;

use tokio::time::Instant;

use drova_core::error::{DrovaError, TokenError};
use drova_core::traits::RemoteShell;
use drova_core::types::{AuthToken, ServerIdentity};
use drova_remote::commands::RegQueryEsme;

struct CachedToken {
    server: ServerIdentity,
    token: AuthToken,
    fetched_at: Instant,
}

/// Explicitly owned token cache with TTL-based invalidation
pub struct TokenCache {
    ttl: Duration,
    cached: Option<CachedToken>,
}

impl TokenCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, cached: None }
    }

    /// Current `(server identity, auth token)`, re-read from the registry
    /// when the cache is empty or older than the TTL.
    ///
    /// A failed or unparsable query is returned as
    /// [`DrovaError::RebootRequired`].
    pub async fn get_identity_and_token(
        &mut self,
        shell: &dyn RemoteShell,
    ) -> Result<(ServerIdentity, AuthToken), DrovaError> {
        if let Some(cached) = &self.cached {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok((cached.server.clone(), cached.token.clone()));
            }
        }

        tracing::debug!("Refreshing auth token from the registry");
        let output = shell.run(&RegQueryEsme.to_string()).await?;
        if !output.success() {
            return Err(TokenError::QueryFailed {
                status: output.status,
            }
            .into());
        }

        let (server, token) = RegQueryEsme::parse_auth_token(&output.stdout_text())?;
        tracing::debug!("Server identity: {}", server);

        self.cached = Some(CachedToken {
            server: server.clone(),
            token: token.clone(),
            fetched_at: Instant::now(),
        });
        Ok((server, token))
    }

    /// Forget the cached pair; the next read queries the registry again
    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}
