// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for pitrix-job.
//!
//! [`JobRuntime`] wires persistence, queue, clients, plugins and the
//! controller together and runs the controller on a background task.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pitrix_job::persistence::SqlitePersistence;
//! use pitrix_job::runtime::JobRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let persistence = Arc::new(SqlitePersistence::from_path(".data/pitrix.db").await?);
//!
//!     let runtime = JobRuntime::builder()
//!         .persistence(persistence)
//!         .max_concurrent_jobs(10)
//!         .hostname("controller-1")
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     let job_id = runtime.server().create_job(new_job).await?;
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! Any collaborator left unset falls back to the persistence-backed one: the
//! `job_queue` table, the `tasks` table and the `clusters` tables.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::clients::{
    ClusterClient, PersistenceClusterClient, PersistenceTaskService, TaskClient, TaskClientConfig,
    TaskService,
};
use crate::config::{
    Config, DEFAULT_JOB_LENGTH, DEFAULT_QUEUE_RETRY_INTERVAL, DEFAULT_TASK_POLL_INTERVAL,
    DEFAULT_TASK_TIMEOUT,
};
use crate::controller::{JobController, JobControllerConfig};
use crate::persistence::Persistence;
use crate::plugins::ProviderRegistry;
use crate::queue::{JobQueue, PersistentQueue, PersistentQueueConfig};
use crate::server::JobServer;

/// Builder for creating a [`JobRuntime`].
pub struct JobRuntimeBuilder {
    persistence: Option<Arc<dyn Persistence>>,
    queue: Option<Arc<dyn JobQueue>>,
    task_service: Option<Arc<dyn TaskService>>,
    cluster_client: Option<Arc<dyn ClusterClient>>,
    registry: Option<ProviderRegistry>,
    max_concurrent_jobs: usize,
    hostname: String,
    task_timeout: Duration,
    task_poll_interval: Duration,
    max_unknown_task_status: u32,
    queue_poll_interval: Duration,
    queue_retry_interval: Duration,
    vm_providers: Vec<String>,
}

impl Default for JobRuntimeBuilder {
    fn default() -> Self {
        Self {
            persistence: None,
            queue: None,
            task_service: None,
            cluster_client: None,
            registry: None,
            max_concurrent_jobs: DEFAULT_JOB_LENGTH,
            hostname: "localhost".to_string(),
            task_timeout: DEFAULT_TASK_TIMEOUT,
            task_poll_interval: DEFAULT_TASK_POLL_INTERVAL,
            max_unknown_task_status: 10,
            queue_poll_interval: Duration::from_secs(1),
            queue_retry_interval: DEFAULT_QUEUE_RETRY_INTERVAL,
            vm_providers: vec![
                "qingcloud".to_string(),
                "aws".to_string(),
                "aliyun".to_string(),
            ],
        }
    }
}

impl JobRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every tunable from a loaded [`Config`].
    pub fn config(mut self, config: &Config) -> Self {
        self.max_concurrent_jobs = config.job_length;
        self.hostname = config.hostname.clone();
        self.task_timeout = config.task_timeout;
        self.task_poll_interval = config.task_poll_interval;
        self.max_unknown_task_status = config.max_unknown_task_status;
        self.queue_poll_interval = config.queue_poll_interval;
        self.queue_retry_interval = config.queue_retry_interval;
        self.vm_providers = config.vm_providers.clone();
        self
    }

    /// Set the persistence layer (required).
    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Use a custom job queue.
    pub fn queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Use a custom task service.
    pub fn task_service(mut self, service: Arc<dyn TaskService>) -> Self {
        self.task_service = Some(service);
        self
    }

    /// Use a custom cluster client.
    pub fn cluster_client(mut self, client: Arc<dyn ClusterClient>) -> Self {
        self.cluster_client = Some(client);
        self
    }

    /// Use a custom plugin registry instead of the default VM + Kubernetes set.
    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the maximum number of jobs handled at once.
    pub fn max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    /// Set the executor identity written on claimed jobs.
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Set the default per-task timeout.
    pub fn task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Set the task status poll interval.
    pub fn task_poll_interval(mut self, interval: Duration) -> Self {
        self.task_poll_interval = interval;
        self
    }

    /// Set how long an empty persistent queue waits before re-checking.
    pub fn queue_poll_interval(mut self, interval: Duration) -> Self {
        self.queue_poll_interval = interval;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<JobRuntimeConfig> {
        let persistence = self
            .persistence
            .ok_or_else(|| anyhow::anyhow!("persistence is required"))?;
        if self.max_concurrent_jobs == 0 {
            anyhow::bail!("max_concurrent_jobs must be positive");
        }

        let queue: Arc<dyn JobQueue> = match self.queue {
            Some(queue) => queue,
            None => Arc::new(PersistentQueue::new(
                persistence.clone(),
                PersistentQueueConfig {
                    poll_interval: self.queue_poll_interval,
                    retry_interval: self.queue_retry_interval,
                },
            )),
        };
        let task_service: Arc<dyn TaskService> = match self.task_service {
            Some(service) => service,
            None => Arc::new(PersistenceTaskService::new(persistence.clone())),
        };
        let cluster_client: Arc<dyn ClusterClient> = match self.cluster_client {
            Some(client) => client,
            None => Arc::new(PersistenceClusterClient::new(persistence.clone())),
        };
        let registry = match self.registry {
            Some(registry) => registry,
            None => ProviderRegistry::with_defaults(&self.vm_providers, cluster_client.clone()),
        };

        Ok(JobRuntimeConfig {
            persistence,
            queue,
            task_client: TaskClient::new(
                task_service,
                TaskClientConfig {
                    default_timeout: self.task_timeout,
                    poll_interval: self.task_poll_interval,
                    max_unknown_status: self.max_unknown_task_status,
                },
            ),
            cluster_client,
            registry: Arc::new(registry),
            controller: JobControllerConfig {
                max_concurrent_jobs: self.max_concurrent_jobs,
                hostname: self.hostname,
                dequeue_retry_interval: self.queue_retry_interval,
            },
        })
    }
}

/// Configuration for a [`JobRuntime`].
pub struct JobRuntimeConfig {
    persistence: Arc<dyn Persistence>,
    queue: Arc<dyn JobQueue>,
    task_client: TaskClient,
    cluster_client: Arc<dyn ClusterClient>,
    registry: Arc<ProviderRegistry>,
    controller: JobControllerConfig,
}

impl JobRuntimeConfig {
    /// Start the runtime, spawning the controller loop.
    pub async fn start(self) -> Result<JobRuntime> {
        let server = JobServer::new(self.persistence.clone(), self.queue.clone());
        let controller = JobController::new(
            self.controller,
            self.persistence,
            self.queue,
            self.task_client,
            self.cluster_client,
            self.registry,
            server.clone(),
        );

        let shutdown = controller.shutdown_handle();
        let controller_handle = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.run().await })
        };

        info!("JobRuntime started");
        Ok(JobRuntime {
            controller,
            controller_handle,
            shutdown,
            server,
        })
    }
}

/// A running job engine.
pub struct JobRuntime {
    controller: JobController,
    controller_handle: JoinHandle<()>,
    shutdown: Arc<Notify>,
    server: JobServer,
}

impl JobRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> JobRuntimeBuilder {
        JobRuntimeBuilder::new()
    }

    /// Job submission and lookup.
    pub fn server(&self) -> &JobServer {
        &self.server
    }

    /// The controller, e.g. to inspect running jobs.
    pub fn controller(&self) -> &JobController {
        &self.controller
    }

    /// Check if the controller loop is still running.
    pub fn is_running(&self) -> bool {
        !self.controller_handle.is_finished()
    }

    /// Gracefully shut down the runtime.
    ///
    /// Stops taking jobs off the queue and waits for running jobs to finish.
    pub async fn shutdown(self) -> Result<()> {
        info!("JobRuntime shutting down...");
        self.shutdown.notify_one();

        if let Err(e) = self.controller_handle.await {
            error!("Job controller task panicked: {}", e);
            return Err(anyhow::anyhow!("controller task panicked: {}", e));
        }
        info!("JobRuntime shutdown complete");
        Ok(())
    }
}
