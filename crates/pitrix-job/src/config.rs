// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::time::Duration;

/// Default number of jobs handled concurrently.
pub const DEFAULT_JOB_LENGTH: usize = 20;
/// Default time a single task may take before its wait gives up.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(3600);
/// Default interval between task status polls.
pub const DEFAULT_TASK_POLL_INTERVAL: Duration = Duration::from_secs(3);
/// Default sleep after a queue store error.
pub const DEFAULT_QUEUE_RETRY_INTERVAL: Duration = Duration::from_secs(3);

/// pitrix-job configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL or SQLite connection URL
    pub database_url: String,
    /// Maximum number of jobs handled concurrently
    pub job_length: usize,
    /// Default per-task wait timeout (overridable per task)
    pub task_timeout: Duration,
    /// Interval between task status polls
    pub task_poll_interval: Duration,
    /// Sleep after a queue store error before retrying
    pub queue_retry_interval: Duration,
    /// Re-check interval while the queue is empty
    pub queue_poll_interval: Duration,
    /// Consecutive unknown task statuses tolerated before a wait fails
    pub max_unknown_task_status: u32,
    /// Provider names handled by the VM-based plugin
    pub vm_providers: Vec<String>,
    /// Identity recorded as executor on claimed jobs
    pub hostname: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `PITRIX_DATABASE_URL`: PostgreSQL or SQLite connection string
    ///
    /// Optional (with defaults):
    /// - `PITRIX_JOB_LENGTH`: Max concurrent jobs (default: 20)
    /// - `PITRIX_TASK_TIMEOUT_SECS`: Task wait timeout (default: 3600)
    /// - `PITRIX_TASK_POLL_INTERVAL_SECS`: Task poll interval (default: 3)
    /// - `PITRIX_QUEUE_RETRY_INTERVAL_SECS`: Dequeue retry after store errors (default: 3)
    /// - `PITRIX_QUEUE_POLL_INTERVAL_MS`: Dequeue re-check when empty (default: 1000)
    /// - `PITRIX_MAX_UNKNOWN_TASK_STATUS`: Unknown status tolerance (default: 10)
    /// - `PITRIX_VM_PROVIDERS`: Comma-separated VM provider names (default: qingcloud,aws,aliyun)
    /// - `PITRIX_HOSTNAME`: Executor identity (default: `HOSTNAME` or localhost)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("PITRIX_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("PITRIX_DATABASE_URL"))?;

        let job_length: usize =
            parse_positive("PITRIX_JOB_LENGTH", "20", "must be a positive integer")?;

        let task_timeout: u64 = parse_var(
            "PITRIX_TASK_TIMEOUT_SECS",
            "3600",
            "must be a number of seconds",
        )?;
        let task_poll_interval: u64 = parse_positive(
            "PITRIX_TASK_POLL_INTERVAL_SECS",
            "3",
            "must be a positive number of seconds",
        )?;
        let queue_retry_interval: u64 = parse_positive(
            "PITRIX_QUEUE_RETRY_INTERVAL_SECS",
            "3",
            "must be a positive number of seconds",
        )?;
        let queue_poll_interval: u64 = parse_positive(
            "PITRIX_QUEUE_POLL_INTERVAL_MS",
            "1000",
            "must be a positive number of milliseconds",
        )?;
        let max_unknown_task_status: u32 = parse_positive(
            "PITRIX_MAX_UNKNOWN_TASK_STATUS",
            "10",
            "must be a positive integer",
        )?;

        let vm_providers = std::env::var("PITRIX_VM_PROVIDERS")
            .unwrap_or_else(|_| "qingcloud,aws,aliyun".to_string())
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        let hostname = std::env::var("PITRIX_HOSTNAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| "localhost".to_string());

        Ok(Self {
            database_url,
            job_length,
            task_timeout: Duration::from_secs(task_timeout),
            task_poll_interval: Duration::from_secs(task_poll_interval),
            queue_retry_interval: Duration::from_secs(queue_retry_interval),
            queue_poll_interval: Duration::from_millis(queue_poll_interval),
            max_unknown_task_status,
            vm_providers,
            hostname,
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    key: &'static str,
    default: &str,
    reason: &'static str,
) -> Result<T, ConfigError> {
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ConfigError::Invalid(key, reason))
}

fn parse_positive<T: std::str::FromStr + Default + PartialEq>(
    key: &'static str,
    default: &str,
    reason: &'static str,
) -> Result<T, ConfigError> {
    let value: T = parse_var(key, default, reason)?;
    if value == T::default() {
        return Err(ConfigError::Invalid(key, reason));
    }
    Ok(value)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
