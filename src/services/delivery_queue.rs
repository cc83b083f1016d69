//! Batched delivery queue for trigger sessions.
//!
//! Favors frequent small updates: trackers re-enqueue the session on every
//! mutation, and the queue flushes on a fixed timer so a crash mid-flow
//! still yields a mostly-complete analytics record. On app resignation the
//! most recent sessions are persisted through the `SessionCache` port and
//! re-enqueued on the next cold start.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::domain::models::TriggerSession;
use crate::domain::ports::{DeliveryTransport, SessionCache};

/// Sessions per batch sent to the transport.
const MAX_BATCH: usize = 50;
/// Bound on the drain loop so a huge backlog cannot flush-storm.
const MAX_DRAIN_DEPTH: usize = 10;
/// How many recent sessions survive a hard process termination.
const PERSISTED_CAP: usize = 20;

pub struct DeliveryQueue {
    backlog: Mutex<VecDeque<TriggerSession>>,
    /// Ring buffer of the most recent sessions, persisted on resign-active.
    recent: Mutex<VecDeque<TriggerSession>>,
    transport: Arc<dyn DeliveryTransport>,
    cache: Arc<dyn SessionCache>,
}

impl DeliveryQueue {
    pub fn new(transport: Arc<dyn DeliveryTransport>, cache: Arc<dyn SessionCache>) -> Self {
        Self {
            backlog: Mutex::new(VecDeque::new()),
            recent: Mutex::new(VecDeque::new()),
            transport,
            cache,
        }
    }

    pub async fn enqueue(&self, session: TriggerSession) {
        self.backlog.lock().await.push_back(session.clone());
        self.remember(session).await;
    }

    pub async fn enqueue_all(&self, sessions: Vec<TriggerSession>) {
        let mut backlog = self.backlog.lock().await;
        for session in &sessions {
            backlog.push_back(session.clone());
        }
        drop(backlog);
        for session in sessions {
            self.remember(session).await;
        }
    }

    /// Drains the backlog in batches, bounded by the drain depth.
    pub async fn flush(&self) {
        for _ in 0..MAX_DRAIN_DEPTH {
            let batch: Vec<TriggerSession> = {
                let mut backlog = self.backlog.lock().await;
                let take = backlog.len().min(MAX_BATCH);
                backlog.drain(..take).collect()
            };
            if batch.is_empty() {
                return;
            }
            tracing::debug!(count = batch.len(), "Flushing trigger session batch");
            self.transport.send_session_batch(batch).await;

            if self.backlog.lock().await.is_empty() {
                return;
            }
        }
        tracing::warn!("Delivery backlog still non-empty after bounded drain");
    }

    /// Spawns the periodic flush task. The returned handle aborts the loop
    /// when dropped by the owning context.
    pub fn start(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                queue.flush().await;
            }
        })
    }

    /// Flushes and persists the recent-session ring so a hard kill right
    /// after backgrounding loses nothing.
    pub async fn will_resign_active(&self) {
        self.flush().await;
        let recent: Vec<TriggerSession> = self.recent.lock().await.iter().cloned().collect();
        if let Err(error) = self.cache.save_recent(&recent).await {
            tracing::warn!(%error, "Failed to persist recent trigger sessions");
        }
    }

    /// Re-enqueues sessions persisted by a previous process and clears the
    /// durable cache. Called once at cold start.
    pub async fn restore_persisted(&self) {
        match self.cache.take_recent().await {
            Ok(sessions) if !sessions.is_empty() => {
                tracing::info!(count = sessions.len(), "Restored persisted trigger sessions");
                let mut backlog = self.backlog.lock().await;
                for session in sessions {
                    backlog.push_back(session);
                }
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(%error, "Failed to restore persisted trigger sessions");
            }
        }
    }

    /// Current backlog size, for tests and diagnostics.
    pub async fn backlog_len(&self) -> usize {
        self.backlog.lock().await.len()
    }

    async fn remember(&self, session: TriggerSession) {
        let mut recent = self.recent.lock().await;
        recent.push_back(session);
        while recent.len() > PERSISTED_CAP {
            recent.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::AppSession;
    use crate::domain::ports::NullSessionCache;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTransport {
        batches: AtomicUsize,
        sessions: AtomicUsize,
    }

    #[async_trait]
    impl DeliveryTransport for CountingTransport {
        async fn send_session_batch(&self, sessions: Vec<TriggerSession>) {
            self.batches.fetch_add(1, Ordering::SeqCst);
            self.sessions.fetch_add(sessions.len(), Ordering::SeqCst);
        }
    }

    fn session(name: &str) -> TriggerSession {
        TriggerSession::pending(
            name,
            None,
            BTreeMap::new(),
            false,
            vec![],
            AppSession::new(),
        )
    }

    #[tokio::test]
    async fn test_flush_batches_at_fifty() {
        let transport = Arc::new(CountingTransport {
            batches: AtomicUsize::new(0),
            sessions: AtomicUsize::new(0),
        });
        let queue = DeliveryQueue::new(transport.clone(), Arc::new(NullSessionCache));

        for i in 0..120 {
            queue.enqueue(session(&format!("t{i}"))).await;
        }
        queue.flush().await;

        assert_eq!(transport.batches.load(Ordering::SeqCst), 3);
        assert_eq!(transport.sessions.load(Ordering::SeqCst), 120);
        assert_eq!(queue.backlog_len().await, 0);
    }

    #[tokio::test]
    async fn test_flush_with_empty_backlog_sends_nothing() {
        let transport = Arc::new(CountingTransport {
            batches: AtomicUsize::new(0),
            sessions: AtomicUsize::new(0),
        });
        let queue = DeliveryQueue::new(transport.clone(), Arc::new(NullSessionCache));
        queue.flush().await;
        assert_eq!(transport.batches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_recent_ring_caps_at_twenty() {
        let transport = Arc::new(CountingTransport {
            batches: AtomicUsize::new(0),
            sessions: AtomicUsize::new(0),
        });
        let queue = DeliveryQueue::new(transport, Arc::new(NullSessionCache));
        for i in 0..30 {
            queue.enqueue(session(&format!("t{i}"))).await;
        }
        assert_eq!(queue.recent.lock().await.len(), PERSISTED_CAP);
    }
}
