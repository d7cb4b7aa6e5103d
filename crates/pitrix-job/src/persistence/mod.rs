//! Persistence interfaces and backends for pitrix-job.
//!
//! One [`Persistence`] trait covers every table the job engine touches: job
//! rows, the durable job queue, task rows and the cluster rows the processor
//! reconciles.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresPersistence;
pub use self::sqlite::SqlitePersistence;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::models::{Cluster, ClusterNode, Job, JobStatus, Task};

/// Job row as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRecord {
    /// Job ID.
    pub job_id: String,
    /// Target cluster.
    pub cluster_id: String,
    /// App ID.
    pub app_id: String,
    /// App version ID.
    pub version_id: String,
    /// Action name.
    pub job_action: String,
    /// Serialized execution plan.
    pub directive: String,
    /// Provider name.
    pub provider: String,
    /// Owner.
    pub owner: String,
    /// Status name.
    pub status: String,
    /// Claiming controller.
    pub executor: String,
    /// Number of tasks the job was split into.
    pub total_tasks: i32,
    /// Creation time.
    pub create_time: DateTime<Utc>,
    /// Last status change.
    pub status_time: DateTime<Utc>,
}

impl TryFrom<JobRecord> for Job {
    type Error = Error;

    fn try_from(record: JobRecord) -> Result<Self> {
        Ok(Job {
            job_action: record.job_action.parse()?,
            status: record.status.parse()?,
            job_id: record.job_id,
            cluster_id: record.cluster_id,
            app_id: record.app_id,
            version_id: record.version_id,
            directive: record.directive,
            provider: record.provider,
            owner: record.owner,
            executor: record.executor,
            total_tasks: record.total_tasks,
            create_time: record.create_time,
            status_time: record.status_time,
        })
    }
}

/// Task row as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRecord {
    /// Task ID.
    pub task_id: String,
    /// Owning job.
    pub job_id: String,
    /// Target node.
    pub node_id: String,
    /// Execution target.
    pub target: String,
    /// Action name.
    pub task_action: String,
    /// Serialized parameters.
    pub directive: String,
    /// Whether failure is tolerated.
    pub failure_allowed: bool,
    /// Status name. Written by task runners, so not guaranteed to be a
    /// known [`TaskStatus`](crate::models::TaskStatus).
    pub status: String,
    /// Creation time.
    pub create_time: DateTime<Utc>,
    /// Last status change.
    pub status_time: DateTime<Utc>,
}

/// Filter options for listing jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Only these job IDs (ignored when empty).
    pub job_ids: Vec<String>,
    /// Only jobs for this cluster.
    pub cluster_id: Option<String>,
    /// Only jobs for this app.
    pub app_id: Option<String>,
    /// Only jobs in one of these statuses (ignored when empty).
    pub statuses: Vec<JobStatus>,
    /// Only jobs for this provider.
    pub provider: Option<String>,
    /// Only jobs owned by this user.
    pub owner: Option<String>,
    /// Only jobs claimed by this controller.
    pub executor: Option<String>,
}

/// Persistence interface used by the queue, the controller and the clients.
#[allow(missing_docs)]
#[async_trait]
pub trait Persistence: Send + Sync {
    // Jobs

    async fn insert_job(&self, job: &Job) -> Result<()>;

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>>;

    /// Move a pending job to working under `executor`. Fails with
    /// `JobNotClaimable` for a job in any other status.
    async fn claim_job(&self, job_id: &str, executor: &str) -> Result<()>;

    /// Write a job status. Writing the same status twice is a no-op.
    async fn update_job_status(&self, job_id: &str, status: JobStatus) -> Result<()>;

    async fn update_job_total_tasks(&self, job_id: &str, total_tasks: i32) -> Result<()>;

    /// List jobs newest first, returning the page and the total match count.
    async fn list_jobs(
        &self,
        filter: &JobFilter,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Job>, i64)>;

    // Queue

    async fn enqueue_job(&self, job_id: &str) -> Result<()>;

    /// Remove and return the oldest queued job ID, atomically with respect to
    /// other dequeuers.
    async fn dequeue_job(&self) -> Result<Option<String>>;

    async fn queue_len(&self) -> Result<i64>;

    // Tasks

    async fn insert_task(&self, task: &Task) -> Result<()>;

    async fn get_task(&self, task_id: &str) -> Result<Option<TaskRecord>>;

    async fn update_task_status(&self, task_id: &str, status: &str) -> Result<()>;

    async fn list_job_tasks(&self, job_id: &str) -> Result<Vec<TaskRecord>>;

    // Clusters

    async fn insert_cluster(&self, cluster: &Cluster) -> Result<()>;

    async fn insert_cluster_node(&self, node: &ClusterNode) -> Result<()>;

    async fn get_cluster(&self, cluster_id: &str) -> Result<Option<Cluster>>;

    async fn list_cluster_nodes(&self, cluster_id: &str) -> Result<Vec<ClusterNode>>;

    async fn update_cluster_status(&self, cluster_id: &str, status: &str) -> Result<()>;

    async fn update_cluster_transition_status(
        &self,
        cluster_id: &str,
        transition_status: &str,
    ) -> Result<()>;

    /// Clusters served by `frontgate_id` whose status is one of `statuses`.
    async fn list_clusters_by_frontgate(
        &self,
        frontgate_id: &str,
        statuses: &[&str],
    ) -> Result<Vec<Cluster>>;

    async fn update_cluster_nodes_status(&self, node_ids: &[String], status: &str) -> Result<()>;

    async fn delete_cluster_nodes(&self, node_ids: &[String]) -> Result<()>;
}

pub(crate) const JOB_COLUMNS: &str = "job_id, cluster_id, app_id, version_id, job_action, \
     directive, provider, owner, status, executor, total_tasks, create_time, status_time";

pub(crate) const TASK_COLUMNS: &str = "task_id, job_id, node_id, target, task_action, \
     directive, failure_allowed, status, create_time, status_time";

pub(crate) const CLUSTER_COLUMNS: &str = "cluster_id, app_id, version_id, vpc_id, frontgate_id, \
     cluster_type, provider, owner, status, transition_status";

pub(crate) const NODE_COLUMNS: &str =
    "node_id, cluster_id, instance_id, role, status, transition_status";

/// Append `WHERE` clauses for a [`JobFilter`]; works for either backend since
/// `QueryBuilder` renders the placeholders.
pub(crate) fn push_job_filter<'args, DB>(
    builder: &mut sqlx::QueryBuilder<'args, DB>,
    filter: &JobFilter,
) where
    DB: sqlx::Database,
    String: 'args + sqlx::Encode<'args, DB> + sqlx::Type<DB>,
{
    builder.push(" WHERE 1 = 1");

    if !filter.job_ids.is_empty() {
        builder.push(" AND job_id IN (");
        let mut separated = builder.separated(", ");
        for job_id in &filter.job_ids {
            separated.push_bind(job_id.clone());
        }
        separated.push_unseparated(")");
    }
    if !filter.statuses.is_empty() {
        builder.push(" AND status IN (");
        let mut separated = builder.separated(", ");
        for status in &filter.statuses {
            separated.push_bind(status.as_str().to_string());
        }
        separated.push_unseparated(")");
    }
    for (column, value) in [
        ("cluster_id", &filter.cluster_id),
        ("app_id", &filter.app_id),
        ("provider", &filter.provider),
        ("owner", &filter.owner),
        ("executor", &filter.executor),
    ] {
        if let Some(value) = value {
            builder.push(format!(" AND {} = ", column));
            builder.push_bind(value.clone());
        }
    }
}
