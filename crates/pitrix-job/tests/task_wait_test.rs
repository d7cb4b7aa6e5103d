// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task waiting and tree execution against the mock task service, on a
//! paused clock.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use pitrix_job::clients::mock::{MockTaskService, ScriptedStatus, TaskBehavior};
use pitrix_job::clients::{TaskClient, TaskClientConfig};
use pitrix_job::error::Error;
use pitrix_job::executor::TaskLayerExecutor;
use pitrix_job::models::{Task, TaskLayer, TaskStatus};

const POLL: Duration = Duration::from_secs(3);

fn client(service: Arc<MockTaskService>) -> TaskClient {
    TaskClient::new(
        service,
        TaskClientConfig {
            default_timeout: Duration::from_secs(3600),
            poll_interval: POLL,
            max_unknown_status: 10,
        },
    )
}

fn task(action: &str, node_id: &str) -> Task {
    Task::new("j-test", node_id, "qingcloud", action, json!({}))
}

#[tokio::test(start_paused = true)]
async fn test_transient_describe_errors_are_retried() {
    let service = Arc::new(MockTaskService::new());
    service
        .set_behavior(
            "RunInstances",
            TaskBehavior::Script(vec![
                ScriptedStatus::TransientError,
                ScriptedStatus::TransientError,
                ScriptedStatus::Status("successful".to_string()),
            ]),
        )
        .await;
    let client = client(service.clone());

    let task_id = client.send_task(&task("RunInstances", "n1")).await.unwrap();
    let started = Instant::now();
    client
        .wait_task(&task_id, Duration::from_secs(3600), POLL)
        .await
        .unwrap();

    assert_eq!(started.elapsed(), POLL * 2);
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_until_timeout() {
    let service = Arc::new(MockTaskService::new());
    service
        .set_behavior(
            "RunInstances",
            TaskBehavior::Script(vec![ScriptedStatus::TransientError; 100]),
        )
        .await;
    let client = client(service.clone());

    let task_id = client.send_task(&task("RunInstances", "n1")).await.unwrap();
    let err = client
        .wait_task(&task_id, Duration::from_secs(30), POLL)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TaskTimeout { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_layer_timeout_is_per_task() {
    let service = Arc::new(MockTaskService::new().with_working_polls(4));
    service.set_node_behavior("StartConfd", "n2", TaskBehavior::Hang).await;
    let executor = TaskLayerExecutor::new(client(service.clone()));

    let mut tree = TaskLayer::chain(vec![
        vec![
            task("StartConfd", "n1"),
            Task::new("j-test", "n2", "cl-fg", "StartConfd", json!({"timeout": 60}))
                .failure_allowed(true),
        ],
        vec![task("RegisterMetadata", "")],
    ]);

    let started = Instant::now();
    let outcome = executor.execute(&mut tree).await.unwrap();

    assert!(outcome.successful);
    assert_eq!(outcome.tolerated, 1);
    assert_eq!(tree.tasks[0].status, TaskStatus::Successful);
    assert_eq!(tree.tasks[1].status, TaskStatus::Failed);
    assert_eq!(tree.children[0].tasks[0].status, TaskStatus::Successful);
    // The hung task gives up on the poll at 60s, then the child layer takes
    // four working polls.
    assert_eq!(started.elapsed(), Duration::from_secs(60) + POLL * 4);
}
