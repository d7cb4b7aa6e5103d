// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed persistence implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::error::{Error, Result};
use crate::models::{Cluster, ClusterNode, Job, JobStatus, Task};

use super::{
    CLUSTER_COLUMNS, JOB_COLUMNS, JobFilter, JobRecord, NODE_COLUMNS, Persistence, TASK_COLUMNS,
    TaskRecord, push_job_filter,
};

/// PostgreSQL-backed persistence provider.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Create a new Postgres-backed persistence implementation.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` and run all migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        crate::migrations::run_postgres(&pool).await?;

        Ok(Self { pool })
    }

    /// Underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Persistence for PostgresPersistence {
    async fn insert_job(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (job_id, cluster_id, app_id, version_id, job_action,
                              directive, provider, owner, status, executor,
                              total_tasks, create_time, status_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&job.job_id)
        .bind(&job.cluster_id)
        .bind(&job.app_id)
        .bind(&job.version_id)
        .bind(job.job_action.as_str())
        .bind(&job.directive)
        .bind(&job.provider)
        .bind(&job.owner)
        .bind(job.status.as_str())
        .bind(&job.executor)
        .bind(job.total_tasks)
        .bind(job.create_time)
        .bind(job.status_time)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        let record = sqlx::query_as::<_, JobRecord>(&format!(
            "SELECT {} FROM jobs WHERE job_id = $1",
            JOB_COLUMNS
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        record.map(Job::try_from).transpose()
    }

    async fn claim_job(&self, job_id: &str, executor: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $1, executor = $2, status_time = $3
            WHERE job_id = $4 AND status = $5
            "#,
        )
        .bind(JobStatus::Working.as_str())
        .bind(executor)
        .bind(Utc::now())
        .bind(job_id)
        .bind(JobStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let status: Option<String> =
                sqlx::query_scalar("SELECT status FROM jobs WHERE job_id = $1")
                    .bind(job_id)
                    .fetch_optional(&self.pool)
                    .await?;
            return Err(match status {
                Some(status) => Error::JobNotClaimable {
                    job_id: job_id.to_string(),
                    status,
                },
                None => Error::JobNotFound(job_id.to_string()),
            });
        }
        Ok(())
    }

    async fn update_job_status(&self, job_id: &str, status: JobStatus) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = $1, status_time = $2
            WHERE job_id = $3
            "#,
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_job_total_tasks(&self, job_id: &str, total_tasks: i32) -> Result<()> {
        sqlx::query("UPDATE jobs SET total_tasks = $1 WHERE job_id = $2")
            .bind(total_tasks)
            .bind(job_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_jobs(
        &self,
        filter: &JobFilter,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Job>, i64)> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM jobs");
        push_job_filter(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut query = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM jobs", JOB_COLUMNS));
        push_job_filter(&mut query, filter);
        query.push(" ORDER BY create_time DESC, job_id DESC LIMIT ");
        query.push_bind(limit);
        query.push(" OFFSET ");
        query.push_bind(offset);

        let records: Vec<JobRecord> = query.build_query_as().fetch_all(&self.pool).await?;
        let jobs = records
            .into_iter()
            .map(Job::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok((jobs, total))
    }

    async fn enqueue_job(&self, job_id: &str) -> Result<()> {
        sqlx::query("INSERT INTO job_queue (job_id, enqueued_at) VALUES ($1, $2)")
            .bind(job_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn dequeue_job(&self) -> Result<Option<String>> {
        // SKIP LOCKED lets concurrent controllers each take a different row.
        let job_id = sqlx::query_scalar::<_, String>(
            r#"
            DELETE FROM job_queue
            WHERE seq = (
                SELECT seq FROM job_queue
                ORDER BY seq
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING job_id
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(job_id)
    }

    async fn queue_len(&self) -> Result<i64> {
        let len = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM job_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(len)
    }

    async fn insert_task(&self, task: &Task) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO tasks (task_id, job_id, node_id, target, task_action, directive,
                               failure_allowed, status, create_time, status_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&task.task_id)
        .bind(&task.job_id)
        .bind(&task.node_id)
        .bind(&task.target)
        .bind(&task.task_action)
        .bind(&task.directive)
        .bind(task.failure_allowed)
        .bind(task.status.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<TaskRecord>> {
        let record = sqlx::query_as::<_, TaskRecord>(&format!(
            "SELECT {} FROM tasks WHERE task_id = $1",
            TASK_COLUMNS
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn update_task_status(&self, task_id: &str, status: &str) -> Result<()> {
        sqlx::query("UPDATE tasks SET status = $1, status_time = $2 WHERE task_id = $3")
            .bind(status)
            .bind(Utc::now())
            .bind(task_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_job_tasks(&self, job_id: &str) -> Result<Vec<TaskRecord>> {
        let records = sqlx::query_as::<_, TaskRecord>(&format!(
            "SELECT {} FROM tasks WHERE job_id = $1 ORDER BY create_time, task_id",
            TASK_COLUMNS
        ))
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn insert_cluster(&self, cluster: &Cluster) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO clusters (cluster_id, app_id, version_id, vpc_id, frontgate_id,
                                  cluster_type, provider, owner, status, transition_status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&cluster.cluster_id)
        .bind(&cluster.app_id)
        .bind(&cluster.version_id)
        .bind(&cluster.vpc_id)
        .bind(&cluster.frontgate_id)
        .bind(cluster.cluster_type)
        .bind(&cluster.provider)
        .bind(&cluster.owner)
        .bind(&cluster.status)
        .bind(&cluster.transition_status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_cluster_node(&self, node: &ClusterNode) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cluster_nodes
                (node_id, cluster_id, instance_id, role, status, transition_status)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&node.node_id)
        .bind(&node.cluster_id)
        .bind(&node.instance_id)
        .bind(&node.role)
        .bind(&node.status)
        .bind(&node.transition_status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_cluster(&self, cluster_id: &str) -> Result<Option<Cluster>> {
        let cluster = sqlx::query_as::<_, Cluster>(&format!(
            "SELECT {} FROM clusters WHERE cluster_id = $1",
            CLUSTER_COLUMNS
        ))
        .bind(cluster_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(cluster)
    }

    async fn list_cluster_nodes(&self, cluster_id: &str) -> Result<Vec<ClusterNode>> {
        let nodes = sqlx::query_as::<_, ClusterNode>(&format!(
            "SELECT {} FROM cluster_nodes WHERE cluster_id = $1 ORDER BY node_id",
            NODE_COLUMNS
        ))
        .bind(cluster_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(nodes)
    }

    async fn update_cluster_status(&self, cluster_id: &str, status: &str) -> Result<()> {
        sqlx::query("UPDATE clusters SET status = $1, status_time = $2 WHERE cluster_id = $3")
            .bind(status)
            .bind(Utc::now())
            .bind(cluster_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_cluster_transition_status(
        &self,
        cluster_id: &str,
        transition_status: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE clusters SET transition_status = $1, status_time = $2 WHERE cluster_id = $3",
        )
        .bind(transition_status)
        .bind(Utc::now())
        .bind(cluster_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::ClusterNotFound(cluster_id.to_string()));
        }
        Ok(())
    }

    async fn list_clusters_by_frontgate(
        &self,
        frontgate_id: &str,
        statuses: &[&str],
    ) -> Result<Vec<Cluster>> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM clusters WHERE frontgate_id = ",
            CLUSTER_COLUMNS
        ));
        query.push_bind(frontgate_id.to_string());
        if !statuses.is_empty() {
            query.push(" AND status IN (");
            let mut separated = query.separated(", ");
            for status in statuses {
                separated.push_bind(status.to_string());
            }
            separated.push_unseparated(")");
        }
        query.push(" ORDER BY cluster_id");

        let clusters = query.build_query_as().fetch_all(&self.pool).await?;
        Ok(clusters)
    }

    async fn update_cluster_nodes_status(&self, node_ids: &[String], status: &str) -> Result<()> {
        if node_ids.is_empty() {
            return Ok(());
        }

        let mut query = QueryBuilder::<Postgres>::new("UPDATE cluster_nodes SET status = ");
        query.push_bind(status.to_string());
        query.push(" WHERE node_id IN (");
        let mut separated = query.separated(", ");
        for node_id in node_ids {
            separated.push_bind(node_id.clone());
        }
        separated.push_unseparated(")");

        query.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_cluster_nodes(&self, node_ids: &[String]) -> Result<()> {
        if node_ids.is_empty() {
            return Ok(());
        }

        let mut query =
            QueryBuilder::<Postgres>::new("DELETE FROM cluster_nodes WHERE node_id IN (");
        let mut separated = query.separated(", ");
        for node_id in node_ids {
            separated.push_bind(node_id.clone());
        }
        separated.push_unseparated(")");

        query.build().execute(&self.pool).await?;
        Ok(())
    }
}
