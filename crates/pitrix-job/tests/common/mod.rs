// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for pitrix-job tests.
//!
//! Provides TestContext: an in-memory SQLite store, the persistent queue,
//! mock task and cluster clients, and a controller wired over them.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use pitrix_job::clients::mock::{MockClusterClient, MockTaskService};
use pitrix_job::clients::{TaskClient, TaskClientConfig};
use pitrix_job::controller::{JobController, JobControllerConfig};
use pitrix_job::models::{
    CLUSTER_TYPE_FRONTGATE, CLUSTER_TYPE_NORMAL, Cluster, ClusterNode, ClusterWrapper, Job,
    JobAction, JobStatus, NewJob,
};
use pitrix_job::persistence::{Persistence, SqlitePersistence};
use pitrix_job::plugins::ProviderRegistry;
use pitrix_job::queue::{PersistentQueue, PersistentQueueConfig};
use pitrix_job::server::JobServer;

pub const HOSTNAME: &str = "test-host";
pub const PROVIDER: &str = "qingcloud";
pub const POLL: Duration = Duration::from_millis(10);

/// Test context wiring a controller over in-memory collaborators.
pub struct TestContext {
    pub persistence: Arc<SqlitePersistence>,
    pub queue: Arc<PersistentQueue>,
    pub tasks: Arc<MockTaskService>,
    pub clusters: Arc<MockClusterClient>,
    pub server: JobServer,
    pub controller: JobController,
}

impl TestContext {
    /// Context with `max_jobs` concurrent jobs and tasks that finish on their
    /// first poll.
    pub async fn new(max_jobs: usize) -> Self {
        Self::with_options(max_jobs, MockTaskService::new(), None).await
    }

    /// Context with a custom task service and, optionally, plugin registry.
    pub async fn with_options(
        max_jobs: usize,
        tasks: MockTaskService,
        registry: Option<ProviderRegistry>,
    ) -> Self {
        let persistence = Arc::new(
            SqlitePersistence::in_memory()
                .await
                .expect("Failed to create in-memory database"),
        );
        let queue = Arc::new(PersistentQueue::new(
            persistence.clone(),
            PersistentQueueConfig {
                poll_interval: POLL,
                retry_interval: POLL,
            },
        ));
        let tasks = Arc::new(tasks);
        let clusters = Arc::new(MockClusterClient::new());
        let registry = registry.unwrap_or_else(|| {
            ProviderRegistry::with_defaults(&[PROVIDER.to_string()], clusters.clone())
        });
        let server = JobServer::new(persistence.clone(), queue.clone());

        let controller = JobController::new(
            JobControllerConfig {
                max_concurrent_jobs: max_jobs,
                hostname: HOSTNAME.to_string(),
                dequeue_retry_interval: POLL,
            },
            persistence.clone(),
            queue.clone(),
            TaskClient::new(
                tasks.clone(),
                TaskClientConfig {
                    default_timeout: Duration::from_secs(5),
                    poll_interval: POLL,
                    max_unknown_status: 3,
                },
            ),
            clusters.clone(),
            Arc::new(registry),
            server.clone(),
        );

        Self {
            persistence,
            queue,
            tasks,
            clusters,
            server,
            controller,
        }
    }

    /// Spawn the controller loop.
    pub fn start(&self) -> JoinHandle<()> {
        let controller = self.controller.clone();
        tokio::spawn(async move { controller.run().await })
    }

    /// Signal shutdown and wait for the loop to drain.
    pub async fn stop(&self, handle: JoinHandle<()>) {
        self.controller.shutdown_handle().notify_one();
        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("Controller did not shut down")
            .expect("Controller task panicked");
    }

    /// Register `wrapper` with the cluster mock and submit a job for it.
    pub async fn submit(&self, action: JobAction, wrapper: &ClusterWrapper) -> String {
        self.clusters.insert(wrapper.clone()).await;
        self.server
            .create_job(new_job(action, wrapper))
            .await
            .expect("Failed to create job")
    }

    /// Poll until the job is terminal.
    pub async fn wait_for_job(&self, job_id: &str) -> Job {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let job = self.server.get_job(job_id).await.expect("Failed to load job");
                if job.status.is_terminal() {
                    return job;
                }
                tokio::time::sleep(POLL).await;
            }
        })
        .await
        .expect("Job did not finish in time")
    }

    /// Poll until the queue is empty and no job is running.
    pub async fn wait_idle(&self) {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let queued = self.persistence.queue_len().await.expect("queue_len");
                if queued == 0 && self.controller.running_jobs() == 0 {
                    return;
                }
                tokio::time::sleep(POLL).await;
            }
        })
        .await
        .expect("Controller did not go idle")
    }

    /// Status of a job as stored.
    pub async fn job_status(&self, job_id: &str) -> JobStatus {
        self.server.get_job(job_id).await.expect("Failed to load job").status
    }
}

pub fn new_job(action: JobAction, wrapper: &ClusterWrapper) -> NewJob {
    NewJob {
        cluster_id: wrapper.cluster.cluster_id.clone(),
        app_id: wrapper.cluster.app_id.clone(),
        version_id: wrapper.cluster.version_id.clone(),
        job_action: action,
        directive: wrapper.to_directive().expect("directive"),
        provider: PROVIDER.to_string(),
        owner: "usr-test".to_string(),
    }
}

pub fn cluster(cluster_id: &str, frontgate_id: &str, status: &str) -> Cluster {
    Cluster {
        cluster_id: cluster_id.to_string(),
        app_id: "app-test".to_string(),
        version_id: "appv-test".to_string(),
        vpc_id: "vpc-test".to_string(),
        frontgate_id: frontgate_id.to_string(),
        cluster_type: CLUSTER_TYPE_NORMAL,
        provider: PROVIDER.to_string(),
        owner: "usr-test".to_string(),
        status: status.to_string(),
        transition_status: String::new(),
    }
}

pub fn frontgate(cluster_id: &str, status: &str) -> Cluster {
    Cluster {
        cluster_type: CLUSTER_TYPE_FRONTGATE,
        ..cluster(cluster_id, "", status)
    }
}

pub fn node(node_id: &str, cluster_id: &str, status: &str) -> ClusterNode {
    ClusterNode {
        node_id: node_id.to_string(),
        cluster_id: cluster_id.to_string(),
        instance_id: format!("i-{}", node_id),
        role: "worker".to_string(),
        status: status.to_string(),
        transition_status: String::new(),
    }
}

/// A cluster behind `cl-fg` with `nodes` pending/active nodes.
pub fn wrapper(cluster_id: &str, status: &str, nodes: usize) -> ClusterWrapper {
    ClusterWrapper {
        cluster: cluster(cluster_id, "cl-fg", status),
        cluster_nodes: (1..=nodes)
            .map(|i| node(&format!("{}-n{}", cluster_id, i), cluster_id, status))
            .collect(),
    }
}
