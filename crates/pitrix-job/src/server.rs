// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Job submission and lookup.
//!
//! [`JobServer`] is the front door for jobs: it writes the pending job row and
//! enqueues the ID. The processor uses it too, for follow-up frontgate jobs.

use std::sync::Arc;

use tracing::info;

use crate::error::{Error, Result};
use crate::models::{Job, NewJob};
use crate::persistence::{JobFilter, Persistence};
use crate::queue::JobQueue;

/// Page size when a request does not set one.
pub const DEFAULT_PAGE_LIMIT: i64 = 20;
/// Largest page size a request may ask for.
pub const MAX_PAGE_LIMIT: i64 = 200;

/// Job listing request.
#[derive(Debug, Clone, Default)]
pub struct DescribeJobsRequest {
    /// Row filter.
    pub filter: JobFilter,
    /// Rows to skip.
    pub offset: i64,
    /// Page size; `0` means [`DEFAULT_PAGE_LIMIT`].
    pub limit: i64,
}

/// Job listing response.
#[derive(Debug, Clone)]
pub struct DescribeJobsResponse {
    /// Matching jobs across all pages.
    pub total_count: i64,
    /// This page, newest first.
    pub jobs: Vec<Job>,
}

/// Creates and describes jobs.
#[derive(Clone)]
pub struct JobServer {
    persistence: Arc<dyn Persistence>,
    queue: Arc<dyn JobQueue>,
}

impl JobServer {
    /// Create a server writing to `persistence` and enqueuing on `queue`.
    pub fn new(persistence: Arc<dyn Persistence>, queue: Arc<dyn JobQueue>) -> Self {
        Self { persistence, queue }
    }

    /// Persist a pending job and enqueue it. Returns the new job ID.
    pub async fn create_job(&self, new_job: NewJob) -> Result<String> {
        if new_job.cluster_id.is_empty() {
            return Err(Error::InvalidRequest("cluster_id is required".to_string()));
        }
        if new_job.provider.is_empty() {
            return Err(Error::InvalidRequest("provider is required".to_string()));
        }

        let job = Job::new(new_job);
        self.persistence.insert_job(&job).await?;
        self.queue.enqueue(&job.job_id).await?;

        info!(
            job_id = %job.job_id,
            cluster_id = %job.cluster_id,
            job_action = %job.job_action,
            provider = %job.provider,
            "Job created"
        );
        Ok(job.job_id)
    }

    /// Load one job.
    pub async fn get_job(&self, job_id: &str) -> Result<Job> {
        self.persistence
            .get_job(job_id)
            .await?
            .ok_or_else(|| Error::JobNotFound(job_id.to_string()))
    }

    /// List jobs matching a filter.
    pub async fn describe_jobs(
        &self,
        request: DescribeJobsRequest,
    ) -> Result<DescribeJobsResponse> {
        if request.offset < 0 || request.limit < 0 {
            return Err(Error::InvalidRequest(
                "offset and limit must not be negative".to_string(),
            ));
        }
        let limit = match request.limit {
            0 => DEFAULT_PAGE_LIMIT,
            limit => limit.min(MAX_PAGE_LIMIT),
        };

        let (jobs, total_count) = self
            .persistence
            .list_jobs(&request.filter, request.offset, limit)
            .await?;
        Ok(DescribeJobsResponse { total_count, jobs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobAction, JobStatus};
    use crate::persistence::SqlitePersistence;
    use crate::queue::MemoryQueue;

    fn new_job(cluster_id: &str) -> NewJob {
        NewJob {
            cluster_id: cluster_id.to_string(),
            app_id: "app-1".to_string(),
            version_id: "appv-1".to_string(),
            job_action: JobAction::CreateCluster,
            directive: "{}".to_string(),
            provider: "qingcloud".to_string(),
            owner: "usr-1".to_string(),
        }
    }

    async fn server() -> (Arc<MemoryQueue>, JobServer) {
        let persistence = Arc::new(SqlitePersistence::in_memory().await.unwrap());
        let queue = Arc::new(MemoryQueue::new());
        (queue.clone(), JobServer::new(persistence, queue))
    }

    #[tokio::test]
    async fn test_create_job_persists_and_enqueues() {
        let (queue, server) = server().await;
        let job_id = server.create_job(new_job("cl-1")).await.unwrap();

        assert!(job_id.starts_with("j-"));
        assert_eq!(queue.dequeue().await.unwrap(), job_id);
        let job = server.get_job(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.cluster_id, "cl-1");
    }

    #[tokio::test]
    async fn test_create_job_validates() {
        let (queue, server) = server().await;
        let err = server.create_job(new_job("")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_describe_jobs_paging() {
        let (_queue, server) = server().await;
        for i in 0..5 {
            server.create_job(new_job(&format!("cl-{}", i % 2))).await.unwrap();
        }

        let response = server
            .describe_jobs(DescribeJobsRequest {
                limit: 2,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(response.total_count, 5);
        assert_eq!(response.jobs.len(), 2);

        let response = server
            .describe_jobs(DescribeJobsRequest {
                filter: JobFilter {
                    cluster_id: Some("cl-0".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(response.total_count, 3);
        assert!(response.jobs.iter().all(|j| j.cluster_id == "cl-0"));
    }

    #[tokio::test]
    async fn test_get_missing_job() {
        let (_queue, server) = server().await;
        assert!(matches!(
            server.get_job("j-missing").await.unwrap_err(),
            Error::JobNotFound(_)
        ));
    }
}
