// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process job queue.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::JobQueue;
use crate::error::{Error, Result};

/// Process-local FIFO. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    items: Mutex<VecDeque<String>>,
    available: Notify,
}

impl MemoryQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued IDs.
    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn pop(&self) -> Result<Option<String>> {
        let mut items = self
            .items
            .lock()
            .map_err(|_| Error::Queue("queue mutex poisoned".to_string()))?;
        Ok(items.pop_front())
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, job_id: &str) -> Result<()> {
        self.items
            .lock()
            .map_err(|_| Error::Queue("queue mutex poisoned".to_string()))?
            .push_back(job_id.to_string());
        self.available.notify_one();
        Ok(())
    }

    async fn dequeue(&self) -> Result<String> {
        loop {
            if let Some(job_id) = self.pop()? {
                return Ok(job_id);
            }
            // notify_one stores a permit when nobody waits, so an enqueue
            // between pop() and here is not lost.
            self.available.notified().await;
        }
    }
}
