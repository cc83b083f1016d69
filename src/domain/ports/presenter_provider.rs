/// Presenter provider port (trait) for dependency injection.
///
/// When a request carries no explicit presenter, the pipeline asks this
/// port for the overlay window. Implementations must create the overlay
/// lazily and idempotently: repeated calls return the same handle.
use async_trait::async_trait;

use crate::domain::models::PresenterHandle;

#[async_trait]
pub trait PresenterProvider: Send + Sync {
    /// The fallback overlay presenter, or `None` when the host cannot show
    /// UI at all (headless extension, background process).
    async fn overlay(&self) -> Option<PresenterHandle>;
}

/// Provider that always hands out the overlay handle.
#[derive(Debug, Clone, Default)]
pub struct OverlayPresenterProvider;

#[async_trait]
impl PresenterProvider for OverlayPresenterProvider {
    async fn overlay(&self) -> Option<PresenterHandle> {
        Some(PresenterHandle::Overlay)
    }
}
