//! Session directory trait

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DirectoryError;
use crate::types::{AuthToken, ProductInfo, ServerIdentity, SessionRecord};

/// Read-only view of the marketplace's session bookkeeping
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    /// Most recent session for the server, in any status
    async fn latest_session(
        &self,
        server: &ServerIdentity,
        token: &AuthToken,
    ) -> Result<Option<SessionRecord>, DirectoryError>;

    /// Most recent session still in NEW or HANDSHAKE
    async fn new_session(
        &self,
        server: &ServerIdentity,
        token: &AuthToken,
    ) -> Result<Option<SessionRecord>, DirectoryError>;

    /// Product metadata
    async fn product_info(
        &self,
        product_id: Uuid,
        token: &AuthToken,
    ) -> Result<ProductInfo, DirectoryError>;
}
