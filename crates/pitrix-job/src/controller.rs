// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Job controller.
//!
//! Pulls job IDs off the queue and runs each one in its own task, never more
//! than `max_concurrent_jobs` at a time. A permit is taken before dequeuing,
//! so a job only leaves the queue once there is room to run it.
//!
//! Per job:
//!
//! ```text
//!   claim ─► load ─► pre ─► split ─► walk ─► post ─► finalize ─► terminal status
//!                     │                              ▲
//!                     └──────── on any error ────────┘
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{Notify, Semaphore};
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::clients::{ClusterClient, TaskClient};
use crate::config::{DEFAULT_JOB_LENGTH, DEFAULT_QUEUE_RETRY_INTERVAL};
use crate::error::{Error, Result};
use crate::executor::TaskLayerExecutor;
use crate::models::{Job, JobStatus};
use crate::persistence::{JobFilter, Persistence};
use crate::plugins::ProviderRegistry;
use crate::processor::Processor;
use crate::queue::JobQueue;
use crate::server::JobServer;

const RECOVERY_PAGE_SIZE: i64 = 100;

/// Controller configuration.
#[derive(Debug, Clone)]
pub struct JobControllerConfig {
    /// Upper bound on jobs handled at once.
    pub max_concurrent_jobs: usize,
    /// Executor identity written on claimed jobs.
    pub hostname: String,
    /// Pause after a queue error.
    pub dequeue_retry_interval: Duration,
}

impl Default for JobControllerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: DEFAULT_JOB_LENGTH,
            hostname: "localhost".to_string(),
            dequeue_retry_interval: DEFAULT_QUEUE_RETRY_INTERVAL,
        }
    }
}

impl JobControllerConfig {
    /// Semaphore size: `max_concurrent_jobs` clamped to what one
    /// `acquire_many` can drain.
    fn permit_count(&self) -> u32 {
        let max = Semaphore::MAX_PERMITS.min(u32::MAX as usize);
        u32::try_from(self.max_concurrent_jobs.clamp(1, max)).unwrap_or(u32::MAX)
    }
}

struct ControllerInner {
    config: JobControllerConfig,
    persistence: Arc<dyn Persistence>,
    queue: Arc<dyn JobQueue>,
    task_client: TaskClient,
    cluster_client: Arc<dyn ClusterClient>,
    registry: Arc<ProviderRegistry>,
    server: JobServer,
    permits: Arc<Semaphore>,
    running: AtomicUsize,
    shutdown: Arc<Notify>,
}

/// Bounded-concurrency job runner.
#[derive(Clone)]
pub struct JobController {
    inner: Arc<ControllerInner>,
}

/// Keeps the running-jobs gauge accurate even if the handler unwinds.
struct RunningGuard<'a>(&'a AtomicUsize);

impl<'a> RunningGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl JobController {
    /// Create a controller.
    pub fn new(
        config: JobControllerConfig,
        persistence: Arc<dyn Persistence>,
        queue: Arc<dyn JobQueue>,
        task_client: TaskClient,
        cluster_client: Arc<dyn ClusterClient>,
        registry: Arc<ProviderRegistry>,
        server: JobServer,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.permit_count() as usize));
        Self {
            inner: Arc::new(ControllerInner {
                config,
                persistence,
                queue,
                task_client,
                cluster_client,
                registry,
                server,
                permits,
                running: AtomicUsize::new(0),
                shutdown: Arc::new(Notify::new()),
            }),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.inner.shutdown.clone()
    }

    /// Number of jobs currently being handled.
    pub fn running_jobs(&self) -> usize {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Run the dispatch loop until shutdown is signalled, then wait for the
    /// jobs in flight to finish.
    pub async fn run(&self) {
        let inner = &self.inner;
        info!(
            max_concurrent_jobs = inner.config.max_concurrent_jobs,
            hostname = %inner.config.hostname,
            "Job controller started"
        );

        match self.recover_orphaned_jobs().await {
            Ok(0) => {}
            Ok(count) => warn!(count, "Failed jobs left working by a previous run"),
            Err(e) => error!(error = %e, "Failed to recover orphaned jobs"),
        }

        loop {
            let permit = tokio::select! {
                biased;

                _ = inner.shutdown.notified() => break,
                permit = inner.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let job_id = tokio::select! {
                biased;

                _ = inner.shutdown.notified() => break,
                job_id = inner.queue.dequeue() => match job_id {
                    Ok(job_id) => job_id,
                    Err(e) => {
                        error!(error = %e, "Failed to dequeue job");
                        drop(permit);
                        tokio::time::sleep(inner.config.dequeue_retry_interval).await;
                        continue;
                    }
                },
            };

            let controller = self.clone();
            tokio::spawn(async move {
                let _permit = permit;
                // Outcome is already logged and persisted by the handler.
                let _ = controller.handle_job(&job_id).await;
            });
        }

        info!(
            running_jobs = self.running_jobs(),
            "Job controller stopping, waiting for running jobs"
        );
        let _ = inner.permits.acquire_many(inner.config.permit_count()).await;
        info!("Job controller stopped");
    }

    /// Handle one job end to end and return its terminal status.
    ///
    /// Returns `Err` only when the job could not be claimed or loaded (a job
    /// that already left `pending` is never run again); every
    /// failure after that is recorded on the job and yields
    /// `Ok(JobStatus::Failed)`.
    pub async fn handle_job(&self, job_id: &str) -> Result<JobStatus> {
        let span = info_span!("job", job_id = %job_id);
        self.handle_job_inner(job_id).instrument(span).await
    }

    async fn handle_job_inner(&self, job_id: &str) -> Result<JobStatus> {
        let inner = &self.inner;
        let _running = RunningGuard::enter(&inner.running);
        let started = Instant::now();

        match inner.persistence.claim_job(job_id, &inner.config.hostname).await {
            Ok(()) => {}
            Err(e @ Error::JobNotClaimable { .. }) => {
                warn!(error = %e, "Skipping job that is not pending");
                return Err(e);
            }
            Err(e) => {
                error!(error = %e, "Failed to claim job");
                return Err(e);
            }
        }

        let job = match inner.persistence.get_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                error!("Claimed job disappeared");
                return Err(Error::JobNotFound(job_id.to_string()));
            }
            Err(e) => {
                error!(error = %e, "Failed to load job");
                self.write_status(job_id, JobStatus::Failed).await;
                return Err(e);
            }
        };
        info!(
            cluster_id = %job.cluster_id,
            job_action = %job.job_action,
            provider = %job.provider,
            "Handling job"
        );

        let mut processor = Processor::new(
            job,
            inner.cluster_client.clone(),
            inner.registry.clone(),
            inner.server.clone(),
        );

        let result = AssertUnwindSafe(self.run_job(&mut processor))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(Error::Panicked(panic_message(panic.as_ref()))));

        let status = match &result {
            Ok(()) => processor.job.status,
            Err(e) => {
                error!(error = %e, "Job failed");
                JobStatus::Failed
            }
        };
        processor.job.status = status;

        if let Err(e) = processor.finalize().await {
            error!(error = %e, "Failed to clear cluster transition status");
        }
        self.write_status(job_id, status).await;

        info!(
            status = %status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Job finished"
        );
        Ok(status)
    }

    /// Everything between claim and finalize. Sets `processor.job.status` to
    /// the walk's verdict before running post-processing.
    async fn run_job(&self, processor: &mut Processor) -> Result<()> {
        processor.pre().await?;

        let walk = self.execute_tasks(&processor.job).await;
        processor.job.status = match walk {
            Ok(true) => JobStatus::Successful,
            _ => JobStatus::Failed,
        };

        if let Err(e) = processor.post().await {
            error!(error = %e, status = %processor.job.status, "Post-processing failed");
        }

        walk.map(|_| ())
    }

    async fn execute_tasks(&self, job: &Job) -> Result<bool> {
        let inner = &self.inner;
        let plugin = inner.registry.get(&job.provider)?;
        let mut tree = plugin.split_job_into_tasks(job).await?;

        let total_tasks = tree.task_count();
        info!(total_tasks, depth = tree.depth(), plugin = plugin.kind(), "Job split into tasks");
        if let Err(e) = inner
            .persistence
            .update_job_total_tasks(&job.job_id, total_tasks as i32)
            .await
        {
            warn!(error = %e, "Failed to record task count");
        }

        let outcome = TaskLayerExecutor::new(inner.task_client.clone())
            .execute(&mut tree)
            .await?;
        Ok(outcome.successful)
    }

    async fn write_status(&self, job_id: &str, status: JobStatus) {
        if let Err(e) = self.inner.persistence.update_job_status(job_id, status).await {
            error!(error = %e, status = %status, "Failed to write job status");
        }
    }

    /// Fail jobs this host left in `working`, e.g. after a crash.
    ///
    /// Queue entries are removed on dequeue, so such jobs would otherwise
    /// stay working forever. Returns the number of jobs failed.
    pub async fn recover_orphaned_jobs(&self) -> Result<usize> {
        let inner = &self.inner;
        let filter = JobFilter {
            statuses: vec![JobStatus::Working],
            executor: Some(inner.config.hostname.clone()),
            ..Default::default()
        };

        let mut orphans = Vec::new();
        loop {
            let (page, total) = inner
                .persistence
                .list_jobs(&filter, orphans.len() as i64, RECOVERY_PAGE_SIZE)
                .await?;
            let done = page.is_empty() || orphans.len() + page.len() >= total as usize;
            orphans.extend(page);
            if done {
                break;
            }
        }

        for job in &orphans {
            warn!(job_id = %job.job_id, cluster_id = %job.cluster_id, "Failing orphaned job");
            self.write_status(&job.job_id, JobStatus::Failed).await;
            if let Err(e) = inner
                .cluster_client
                .modify_cluster_transition_status(&job.cluster_id, None)
                .await
            {
                warn!(
                    job_id = %job.job_id,
                    error = %e,
                    "Failed to clear transition status of orphaned job"
                );
            }
        }
        debug!(count = orphans.len(), "Orphan recovery done");
        Ok(orphans.len())
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
