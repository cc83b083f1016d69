/// Entitlement provider port (trait) for dependency injection.
///
/// Reflects asynchronous subscription status from the host's receipt or
/// billing layer.
use async_trait::async_trait;

#[async_trait]
pub trait EntitlementProvider: Send + Sync {
    /// Suspends until the subscription status is known (resolved receipts,
    /// first billing query, etc.). Callers bound this with a timeout.
    async fn status_known(&self);

    /// Whether the user currently holds an active entitlement.
    async fn is_subscribed(&self) -> bool;
}
