//! Desktop session classification

use drova_core::error::DirectoryError;
use drova_core::traits::SessionDirectory;
use drova_core::types::{AuthToken, SessionRecord, DESKTOP_PRODUCT_ID};

/// Whether `session` is a desktop rental that needs provisioning.
///
/// The generic desktop product qualifies without a lookup. Any other
/// product qualifies if its metadata asks for the default desktop; that
/// flag is fetched on every call since operators can change it at any time.
pub async fn is_desktop_eligible(
    directory: &dyn SessionDirectory,
    session: &SessionRecord,
    token: &AuthToken,
) -> Result<bool, DirectoryError> {
    if session.product_id == DESKTOP_PRODUCT_ID {
        return Ok(true);
    }

    let product = directory.product_info(session.product_id, token).await?;
    tracing::debug!(
        "Product {} ({}) use_default_desktop={}",
        product.product_id,
        product.title,
        product.use_default_desktop
    );
    Ok(product.use_default_desktop)
}
