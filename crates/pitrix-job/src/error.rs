// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for pitrix-job.

use std::time::Duration;

use thiserror::Error;

/// Job engine errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Job row was not found.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Job exists but has already left `pending`.
    #[error("Job {job_id} cannot be claimed in status '{status}'")]
    JobNotClaimable {
        /// The job.
        job_id: String,
        /// Its current status.
        status: String,
    },

    /// Cluster row was not found.
    #[error("Cluster not found: {0}")]
    ClusterNotFound(String),

    /// A persisted value could not be mapped onto a known variant.
    #[error("Unknown {kind} '{value}'")]
    UnknownValue {
        /// What was being parsed (job action, job status, ...).
        kind: &'static str,
        /// The offending value.
        value: String,
    },

    /// No provider plugin is registered under the given name.
    #[error("No provider plugin registered for '{0}'")]
    ProviderNotFound(String),

    /// The provider cannot execute this job action.
    #[error("Provider '{provider}' does not support action {action}")]
    UnsupportedAction {
        /// Provider name.
        provider: String,
        /// Job action.
        action: String,
    },

    /// Job or task directive could not be interpreted.
    #[error("Invalid directive: {0}")]
    InvalidDirective(String),

    /// Request rejected before anything was written.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Task reached the failed state.
    #[error("Task '{task_id}' failed")]
    TaskFailed {
        /// Task ID.
        task_id: String,
    },

    /// Task did not reach a terminal state in time.
    #[error("Task '{task_id}' timed out after {}s", timeout.as_secs())]
    TaskTimeout {
        /// Task ID.
        task_id: String,
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// Task kept reporting a status outside the known set.
    #[error("Task '{task_id}' reported unknown status '{status}'")]
    UnknownTaskStatus {
        /// Task ID.
        task_id: String,
        /// Last status reported.
        status: String,
    },

    /// Transient failure talking to the task service.
    #[error("Task service unavailable: {0}")]
    TaskService(String),

    /// Queue operation failed.
    #[error("Queue error: {0}")]
    Queue(String),

    /// Job handler panicked.
    #[error("Job handler panicked: {0}")]
    Panicked(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error is worth retrying while polling.
    ///
    /// Store and transport hiccups are transient; anything describing the
    /// task itself is not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::TaskService(_) | Self::Queue(_)
        )
    }

    pub(crate) fn unknown(kind: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownValue {
            kind,
            value: value.into(),
        }
    }
}

/// Result type using pitrix-job Error.
pub type Result<T> = std::result::Result<T, Error>;
