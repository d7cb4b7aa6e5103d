// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task model.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Status of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, not yet picked up by a task runner.
    Pending,
    /// Being executed.
    Working,
    /// Finished successfully.
    Successful,
    /// Finished with an error (or never dispatched because an ancestor failed).
    Failed,
}

impl TaskStatus {
    /// Persisted name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Working => "working",
            Self::Successful => "successful",
            Self::Failed => "failed",
        }
    }

    /// Whether the task will not change status again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Successful | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "working" => Ok(Self::Working),
            "successful" => Ok(Self::Successful),
            "failed" => Ok(Self::Failed),
            other => Err(Error::unknown("task status", other)),
        }
    }
}

/// An atomic unit of work dispatched to the task service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Assigned by the task service on dispatch; empty before that.
    pub task_id: String,
    /// Job the task belongs to.
    pub job_id: String,
    /// Cluster node the task acts on (empty for cluster-wide tasks).
    pub node_id: String,
    /// Where the task runs (provider name, frontgate ID, ...).
    pub target: String,
    /// What the task does (`RunInstances`, `StartConfd`, ...).
    pub task_action: String,
    /// Serialized task parameters.
    pub directive: String,
    /// A failure of this task does not fail the job.
    pub failure_allowed: bool,
    /// Current status.
    pub status: TaskStatus,
    /// Per-task wait timeout, read from the directive's `timeout` key (seconds).
    pub timeout: Option<Duration>,
}

impl Task {
    /// Create a pending task. A numeric `timeout` key in `directive` overrides
    /// the default wait timeout for this task.
    pub fn new(
        job_id: impl Into<String>,
        node_id: impl Into<String>,
        target: impl Into<String>,
        task_action: impl Into<String>,
        directive: serde_json::Value,
    ) -> Self {
        let timeout = directive
            .get("timeout")
            .and_then(serde_json::Value::as_u64)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Self {
            task_id: String::new(),
            job_id: job_id.into(),
            node_id: node_id.into(),
            target: target.into(),
            task_action: task_action.into(),
            directive: directive.to_string(),
            failure_allowed: false,
            status: TaskStatus::Pending,
            timeout,
        }
    }

    /// Mark whether a failure of this task may be tolerated.
    pub fn failure_allowed(mut self, allowed: bool) -> Self {
        self.failure_allowed = allowed;
        self
    }
}
