// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Durable job queue on top of the `job_queue` table.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::JobQueue;
use crate::config::DEFAULT_QUEUE_RETRY_INTERVAL;
use crate::error::Result;
use crate::persistence::Persistence;

/// Persistent queue configuration.
#[derive(Debug, Clone)]
pub struct PersistentQueueConfig {
    /// How often an empty queue is re-checked for rows added by other processes.
    pub poll_interval: Duration,
    /// Sleep after a store error before trying again.
    pub retry_interval: Duration,
}

impl Default for PersistentQueueConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            retry_interval: DEFAULT_QUEUE_RETRY_INTERVAL,
        }
    }
}

/// Database-backed FIFO.
///
/// Each row is removed by a single atomic statement, so controllers sharing
/// the database never receive the same ID. Store errors never surface from
/// [`dequeue`](JobQueue::dequeue); they are logged and retried.
pub struct PersistentQueue {
    persistence: Arc<dyn Persistence>,
    config: PersistentQueueConfig,
    enqueued: Notify,
}

impl PersistentQueue {
    /// Create a queue over `persistence`.
    pub fn new(persistence: Arc<dyn Persistence>, config: PersistentQueueConfig) -> Self {
        Self {
            persistence,
            config,
            enqueued: Notify::new(),
        }
    }

    /// Number of queued IDs.
    pub async fn len(&self) -> Result<i64> {
        self.persistence.queue_len().await
    }
}

#[async_trait]
impl JobQueue for PersistentQueue {
    async fn enqueue(&self, job_id: &str) -> Result<()> {
        self.persistence.enqueue_job(job_id).await?;
        self.enqueued.notify_one();
        debug!(job_id = %job_id, "Job enqueued");
        Ok(())
    }

    async fn dequeue(&self) -> Result<String> {
        loop {
            match self.persistence.dequeue_job().await {
                Ok(Some(job_id)) => {
                    debug!(job_id = %job_id, "Job dequeued");
                    return Ok(job_id);
                }
                Ok(None) => {
                    // Local enqueues wake us early; other processes are seen on the next poll.
                    tokio::select! {
                        _ = self.enqueued.notified() => {}
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_in_secs = self.config.retry_interval.as_secs(),
                        "Failed to dequeue job, retrying"
                    );
                    tokio::time::sleep(self.config.retry_interval).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::SqlitePersistence;

    async fn queue() -> (Arc<SqlitePersistence>, PersistentQueue) {
        let persistence = Arc::new(SqlitePersistence::in_memory().await.unwrap());
        let queue = PersistentQueue::new(
            persistence.clone(),
            PersistentQueueConfig {
                poll_interval: Duration::from_millis(20),
                retry_interval: Duration::from_millis(20),
            },
        );
        (persistence, queue)
    }

    #[test]
    fn test_persistent_queue_config_default() {
        let config = PersistentQueueConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.retry_interval, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_enqueue_dequeue_order() {
        let (_persistence, queue) = queue().await;
        for id in ["j-a", "j-b", "j-c"] {
            queue.enqueue(id).await.unwrap();
        }
        assert_eq!(queue.len().await.unwrap(), 3);
        assert_eq!(queue.dequeue().await.unwrap(), "j-a");
        assert_eq!(queue.dequeue().await.unwrap(), "j-b");
        assert_eq!(queue.dequeue().await.unwrap(), "j-c");
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dequeue_sees_rows_written_by_another_process() {
        let (persistence, queue) = queue().await;
        let queue = Arc::new(queue);

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!consumer.is_finished());

        // Bypasses the queue's notify, as a second controller would.
        persistence.enqueue_job("j-remote").await.unwrap();

        let job_id = tokio::time::timeout(Duration::from_secs(2), consumer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(job_id, "j-remote");
    }

    #[tokio::test]
    async fn test_store_errors_are_retried_not_returned() {
        let (persistence, queue) = queue().await;
        persistence.pool().close().await;

        let result = tokio::time::timeout(Duration::from_millis(200), queue.dequeue()).await;
        assert!(result.is_err(), "dequeue must keep retrying on store errors");
    }
}
