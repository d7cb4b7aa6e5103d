// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence backends: file-backed SQLite always, PostgreSQL when
//! TEST_PITRIX_DATABASE_URL is set.

use std::sync::Arc;

use pitrix_job::error::Error;
use pitrix_job::models::{Job, JobAction, JobStatus, NewJob};
use pitrix_job::persistence::{
    JobFilter, Persistence, PostgresPersistence, SqlitePersistence,
};

/// Helper macro to skip tests if database URL is not set.
macro_rules! skip_if_no_db {
    () => {
        if std::env::var("TEST_PITRIX_DATABASE_URL").is_err() {
            eprintln!("Skipping test: TEST_PITRIX_DATABASE_URL not set");
            return;
        }
    };
}

fn new_job(cluster_id: &str) -> Job {
    Job::new(NewJob {
        cluster_id: cluster_id.to_string(),
        app_id: "app-test".to_string(),
        version_id: "appv-test".to_string(),
        job_action: JobAction::CreateCluster,
        directive: "{}".to_string(),
        provider: "qingcloud".to_string(),
        owner: "usr-test".to_string(),
    })
}

/// Job row and queue behavior every backend must share.
async fn exercise_jobs_and_queue(persistence: Arc<dyn Persistence>, cluster_id: &str) {
    let first = new_job(cluster_id);
    let second = new_job(cluster_id);
    persistence.insert_job(&first).await.unwrap();
    persistence.insert_job(&second).await.unwrap();
    persistence.enqueue_job(&first.job_id).await.unwrap();
    persistence.enqueue_job(&second.job_id).await.unwrap();

    assert_eq!(persistence.dequeue_job().await.unwrap().as_deref(), Some(first.job_id.as_str()));

    persistence.claim_job(&first.job_id, "host-a").await.unwrap();
    persistence
        .update_job_status(&first.job_id, JobStatus::Successful)
        .await
        .unwrap();
    // Same terminal status again is harmless.
    persistence
        .update_job_status(&first.job_id, JobStatus::Successful)
        .await
        .unwrap();

    // A finished job is never claimed again.
    let err = persistence.claim_job(&first.job_id, "host-b").await.unwrap_err();
    assert!(matches!(err, Error::JobNotClaimable { .. }));

    let job = persistence.get_job(&first.job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Successful);
    assert_eq!(job.executor, "host-a");

    let filter = JobFilter {
        cluster_id: Some(cluster_id.to_string()),
        statuses: vec![JobStatus::Pending],
        ..Default::default()
    };
    let (jobs, total) = persistence.list_jobs(&filter, 0, 10).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(jobs[0].job_id, second.job_id);

    assert_eq!(persistence.dequeue_job().await.unwrap().as_deref(), Some(second.job_id.as_str()));
}

#[tokio::test]
async fn test_sqlite_file_backend() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("nested").join("pitrix.db");

    let persistence = Arc::new(SqlitePersistence::from_path(&path).await.unwrap());
    exercise_jobs_and_queue(persistence.clone(), "cl-file").await;
    assert!(path.exists());

    // Reopening runs migrations again without complaint and sees the rows.
    drop(persistence);
    let reopened = SqlitePersistence::from_path(&path).await.unwrap();
    let (_, total) = reopened.list_jobs(&JobFilter::default(), 0, 10).await.unwrap();
    assert_eq!(total, 2);
}

#[tokio::test]
async fn test_postgres_backend() {
    skip_if_no_db!();
    let database_url = std::env::var("TEST_PITRIX_DATABASE_URL").unwrap();
    let persistence = Arc::new(PostgresPersistence::connect(&database_url, 5).await.unwrap());

    // Drain leftovers from earlier runs so FIFO assertions hold.
    while persistence.dequeue_job().await.unwrap().is_some() {}

    let cluster_id = format!("cl-pg-{}", uuid::Uuid::new_v4().simple());
    exercise_jobs_and_queue(persistence, &cluster_id).await;
}
