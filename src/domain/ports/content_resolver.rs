/// Content resolver port (trait) for dependency injection.
///
/// Owns paywall content materialization and the actual on-screen present
/// operation. Required contract: at most one concurrent fetch per paywall
/// id, since the preload path and the presentation path may ask for the
/// same identifier at once.
use async_trait::async_trait;

use crate::domain::error::ContentError;
use crate::domain::models::{CachePolicy, PaywallContent, PaywallOverrides, PresenterHandle};

/// Result of asking the resolver to put content on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentResult {
    Presented,
    /// Another paywall beat this one to the screen.
    AlreadyPresented,
}

#[async_trait]
pub trait ContentResolver: Send + Sync {
    /// Materializes paywall content, from cache or the network depending on
    /// `policy`. The resolver manages its own timeouts and retries.
    async fn resolve(
        &self,
        paywall_id: &str,
        policy: CachePolicy,
        overrides: &PaywallOverrides,
    ) -> Result<PaywallContent, ContentError>;

    /// Presents resolved content on the given presenter, completing when the
    /// presentation transition finishes.
    async fn present(
        &self,
        content: &PaywallContent,
        presenter: &PresenterHandle,
    ) -> Result<PresentResult, ContentError>;
}
