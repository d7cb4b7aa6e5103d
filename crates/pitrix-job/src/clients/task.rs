// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task dispatch and completion polling.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::config::{DEFAULT_TASK_POLL_INTERVAL, DEFAULT_TASK_TIMEOUT};
use crate::error::{Error, Result};
use crate::models::{Task, TaskStatus, new_id};
use crate::persistence::Persistence;

/// The remote side that runs tasks.
#[async_trait]
pub trait TaskService: Send + Sync {
    /// Hand a task over for execution and return its assigned ID.
    async fn send_task(&self, task: &Task) -> Result<String>;

    /// Current status of a task as reported by the service.
    ///
    /// Returned raw: task runners may report values outside [`TaskStatus`].
    async fn describe_task(&self, task_id: &str) -> Result<String>;
}

/// Polling parameters for [`TaskClient::wait_task`].
#[derive(Debug, Clone)]
pub struct TaskClientConfig {
    /// Timeout for tasks whose directive does not set one.
    pub default_timeout: Duration,
    /// Delay between status polls.
    pub poll_interval: Duration,
    /// Consecutive unknown statuses tolerated before the wait fails.
    pub max_unknown_status: u32,
}

impl Default for TaskClientConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TASK_TIMEOUT,
            poll_interval: DEFAULT_TASK_POLL_INTERVAL,
            max_unknown_status: 10,
        }
    }
}

/// Front end to a [`TaskService`] adding the wait loop.
#[derive(Clone)]
pub struct TaskClient {
    service: Arc<dyn TaskService>,
    config: TaskClientConfig,
}

impl TaskClient {
    /// Create a client over `service`.
    pub fn new(service: Arc<dyn TaskService>, config: TaskClientConfig) -> Self {
        Self { service, config }
    }

    /// Polling parameters.
    pub fn config(&self) -> &TaskClientConfig {
        &self.config
    }

    /// Wait timeout that applies to `task`.
    pub fn timeout_for(&self, task: &Task) -> Duration {
        task.timeout.unwrap_or(self.config.default_timeout)
    }

    /// Dispatch a task, returning the ID assigned by the service.
    pub async fn send_task(&self, task: &Task) -> Result<String> {
        let task_id = self.service.send_task(task).await?;
        debug!(
            task_id = %task_id,
            task_action = %task.task_action,
            node_id = %task.node_id,
            "Task dispatched"
        );
        Ok(task_id)
    }

    /// Poll `task_id` every `poll_interval` until it reaches a terminal state.
    ///
    /// Returns `Ok` once the task is successful. Describe errors are retried
    /// until `timeout` elapses. A failed task, an elapsed timeout, or more than
    /// the configured number of consecutive unknown statuses end the wait with
    /// an error.
    pub async fn wait_task(
        &self,
        task_id: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<()> {
        let started = Instant::now();
        let mut unknown_polls = 0u32;

        loop {
            match self.service.describe_task(task_id).await {
                Ok(raw) => match raw.parse::<TaskStatus>() {
                    Ok(TaskStatus::Successful) => {
                        debug!(
                            task_id = %task_id,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Task successful"
                        );
                        return Ok(());
                    }
                    Ok(TaskStatus::Failed) => {
                        return Err(Error::TaskFailed {
                            task_id: task_id.to_string(),
                        });
                    }
                    Ok(TaskStatus::Pending | TaskStatus::Working) => {
                        unknown_polls = 0;
                    }
                    Err(_) => {
                        unknown_polls += 1;
                        error!(
                            task_id = %task_id,
                            status = %raw,
                            count = unknown_polls,
                            "Unknown task status"
                        );
                        if unknown_polls >= self.config.max_unknown_status {
                            return Err(Error::UnknownTaskStatus {
                                task_id: task_id.to_string(),
                                status: raw,
                            });
                        }
                    }
                },
                Err(e) => {
                    warn!(task_id = %task_id, error = %e, "Failed to describe task, will retry");
                }
            }

            if started.elapsed() >= timeout {
                return Err(Error::TaskTimeout {
                    task_id: task_id.to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// [`TaskService`] that records tasks in the `tasks` table.
///
/// Task runners pick up pending rows and write their status back; this side
/// only inserts and reads.
pub struct PersistenceTaskService {
    persistence: Arc<dyn Persistence>,
}

impl PersistenceTaskService {
    /// Create a task service over `persistence`.
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self { persistence }
    }
}

#[async_trait]
impl TaskService for PersistenceTaskService {
    async fn send_task(&self, task: &Task) -> Result<String> {
        let mut row = task.clone();
        row.task_id = new_id("t");
        row.status = TaskStatus::Pending;
        self.persistence.insert_task(&row).await?;
        Ok(row.task_id)
    }

    async fn describe_task(&self, task_id: &str) -> Result<String> {
        match self.persistence.get_task(task_id).await? {
            Some(record) => Ok(record.status),
            None => Err(Error::TaskService(format!("task {} not found", task_id))),
        }
    }
}
