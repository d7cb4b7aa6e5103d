// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Job ID queue feeding the controller.
//!
//! [`PersistentQueue`] is the durable FIFO shared by every controller that
//! points at the same database; [`MemoryQueue`] is a process-local stand-in
//! for embedding and tests.

mod memory;
mod persistent;

pub use memory::MemoryQueue;
pub use persistent::{PersistentQueue, PersistentQueueConfig};

use async_trait::async_trait;

use crate::error::Result;

/// FIFO of job IDs.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append a job ID.
    async fn enqueue(&self, job_id: &str) -> Result<()>;

    /// Remove and return the oldest job ID, waiting until one is available.
    ///
    /// Delivery is at-most-once per ID: once returned, the ID is gone from the
    /// queue even if the caller never finishes the job.
    async fn dequeue(&self) -> Result<String>;
}
