/// Session delivery ports (traits) for dependency injection.
use anyhow::Result;
use async_trait::async_trait;

use crate::domain::models::TriggerSession;

/// Transport for batched analytics delivery. Fire-and-forget with its own
/// retry policy.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    async fn send_session_batch(&self, sessions: Vec<TriggerSession>);
}

/// Durable cache for the most recent sessions, written when the app resigns
/// active so a hard kill does not lose them.
#[async_trait]
pub trait SessionCache: Send + Sync {
    async fn save_recent(&self, sessions: &[TriggerSession]) -> Result<()>;

    /// Returns persisted sessions and clears the cache.
    async fn take_recent(&self) -> Result<Vec<TriggerSession>>;
}

/// Transport that drops everything. Used when analytics are disabled and in
/// tests that do not care about delivery.
#[derive(Debug, Clone, Default)]
pub struct NullDeliveryTransport;

#[async_trait]
impl DeliveryTransport for NullDeliveryTransport {
    async fn send_session_batch(&self, _sessions: Vec<TriggerSession>) {}
}

/// Cache that persists nothing.
#[derive(Debug, Clone, Default)]
pub struct NullSessionCache;

#[async_trait]
impl SessionCache for NullSessionCache {
    async fn save_recent(&self, _sessions: &[TriggerSession]) -> Result<()> {
        Ok(())
    }

    async fn take_recent(&self) -> Result<Vec<TriggerSession>> {
        Ok(Vec::new())
    }
}
