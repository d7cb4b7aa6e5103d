// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task tree execution.
//!
//! The tree is walked depth-first. Every task of a layer is dispatched, then
//! the whole layer is awaited concurrently, then each child layer is walked in
//! order. A child never starts before all of its parent's tasks are terminal.
//!
//! Once any task that is not failure-allowed fails, every task not yet
//! dispatched (anywhere in the tree) is marked failed without being sent.
//! A dispatch error aborts the walk outright.

use futures::future::{BoxFuture, join_all};
use tracing::{debug, error, info, warn};

use crate::clients::TaskClient;
use crate::error::Result;
use crate::models::{TaskLayer, TaskStatus};

/// Result of walking a task tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOutcome {
    /// No failure that counts against the job happened.
    pub successful: bool,
    /// Tasks sent to the task service.
    pub dispatched: usize,
    /// Tasks marked failed without being sent.
    pub skipped: usize,
    /// Failed tasks that were not failure-allowed.
    pub failed: usize,
    /// Failed tasks that were failure-allowed.
    pub tolerated: usize,
}

impl Default for WalkOutcome {
    fn default() -> Self {
        Self {
            successful: true,
            dispatched: 0,
            skipped: 0,
            failed: 0,
            tolerated: 0,
        }
    }
}

/// Walks [`TaskLayer`] trees through a [`TaskClient`].
#[derive(Clone)]
pub struct TaskLayerExecutor {
    client: TaskClient,
}

impl TaskLayerExecutor {
    /// Create an executor.
    pub fn new(client: TaskClient) -> Self {
        Self { client }
    }

    /// Execute `root` and its descendants, recording task IDs and final
    /// statuses in place.
    ///
    /// Returns `Err` only when a task could not be dispatched; task failures
    /// are reported through [`WalkOutcome::successful`].
    pub async fn execute(&self, root: &mut TaskLayer) -> Result<WalkOutcome> {
        let mut outcome = WalkOutcome::default();
        self.run_layer(root, &mut outcome).await?;
        info!(
            successful = outcome.successful,
            dispatched = outcome.dispatched,
            skipped = outcome.skipped,
            failed = outcome.failed,
            tolerated = outcome.tolerated,
            "Task tree finished"
        );
        Ok(outcome)
    }

    fn run_layer<'a>(
        &'a self,
        layer: &'a mut TaskLayer,
        outcome: &'a mut WalkOutcome,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut sent = Vec::with_capacity(layer.tasks.len());
            for (index, task) in layer.tasks.iter_mut().enumerate() {
                if !outcome.successful {
                    task.status = TaskStatus::Failed;
                    outcome.skipped += 1;
                    debug!(
                        task_action = %task.task_action,
                        node_id = %task.node_id,
                        "Skipping task after earlier failure"
                    );
                    continue;
                }
                task.task_id = self.client.send_task(task).await?;
                task.status = TaskStatus::Working;
                outcome.dispatched += 1;
                sent.push(index);
            }

            if !sent.is_empty() {
                let poll_interval = self.client.config().poll_interval;
                let results = join_all(sent.iter().map(|&index| {
                    let task = &layer.tasks[index];
                    self.client
                        .wait_task(&task.task_id, self.client.timeout_for(task), poll_interval)
                }))
                .await;

                for (index, result) in sent.into_iter().zip(results) {
                    let task = &mut layer.tasks[index];
                    match result {
                        Ok(()) => task.status = TaskStatus::Successful,
                        Err(e) if task.failure_allowed => {
                            task.status = TaskStatus::Failed;
                            outcome.tolerated += 1;
                            warn!(
                                task_id = %task.task_id,
                                task_action = %task.task_action,
                                error = %e,
                                "Task failed, failure allowed"
                            );
                        }
                        Err(e) => {
                            task.status = TaskStatus::Failed;
                            outcome.failed += 1;
                            outcome.successful = false;
                            error!(
                                task_id = %task.task_id,
                                task_action = %task.task_action,
                                error = %e,
                                "Task failed"
                            );
                        }
                    }
                }
            }

            for child in layer.children.iter_mut() {
                self.run_layer(child, outcome).await?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::TaskClientConfig;
    use crate::clients::mock::{MockTaskService, TaskBehavior, TaskEvent};
    use crate::error::Error;
    use crate::models::Task;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn task(action: &str, node: &str) -> Task {
        Task::new("j-1", node, "qingcloud", action, json!({}))
    }

    fn executor(service: Arc<MockTaskService>) -> TaskLayerExecutor {
        TaskLayerExecutor::new(TaskClient::new(
            service,
            TaskClientConfig {
                default_timeout: Duration::from_secs(60),
                poll_interval: Duration::from_secs(1),
                max_unknown_status: 10,
            },
        ))
    }

    fn is_sent(event: &TaskEvent, action: &str) -> bool {
        matches!(event, TaskEvent::Sent { task_action, .. } if task_action == action)
    }

    fn is_finished(event: &TaskEvent, action: &str) -> bool {
        matches!(event, TaskEvent::Finished { task_action, .. } if task_action == action)
    }

    fn three_layers() -> TaskLayer {
        TaskLayer::chain(vec![
            vec![task("A", "n1"), task("A", "n2")],
            vec![task("B", "")],
            vec![task("C", "n1"), task("C", "n2")],
        ])
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_layers_succeed_in_order() {
        let service = Arc::new(MockTaskService::new().with_working_polls(1));
        let mut tree = three_layers();

        let outcome = executor(service.clone()).execute(&mut tree).await.unwrap();
        assert!(outcome.successful);
        assert_eq!(outcome.dispatched, 5);
        assert!(tree.all_tasks().iter().all(|t| t.status == TaskStatus::Successful));
        assert!(tree.all_tasks().iter().all(|t| !t.task_id.is_empty()));

        // Every dispatch of a layer comes after every completion of its parent.
        let events = service.events().await;
        let position = |pred: &dyn Fn(&TaskEvent) -> bool| -> Vec<usize> {
            events
                .iter()
                .enumerate()
                .filter(|(_, e)| pred(e))
                .map(|(i, _)| i)
                .collect()
        };
        let a_done = position(&|e| is_finished(e, "A"));
        let b_sent = position(&|e| is_sent(e, "B"));
        let b_done = position(&|e| is_finished(e, "B"));
        let c_sent = position(&|e| is_sent(e, "C"));
        assert!(a_done.iter().max() < b_sent.iter().min());
        assert!(b_done.iter().max() < c_sent.iter().min());
    }

    #[tokio::test(start_paused = true)]
    async fn test_layer_tasks_are_awaited_concurrently() {
        let service = Arc::new(MockTaskService::new().with_working_polls(3));
        let mut tree = TaskLayer::new((0..4).map(|i| task("A", &format!("n{}", i))).collect());

        let started = tokio::time::Instant::now();
        executor(service.clone()).execute(&mut tree).await.unwrap();
        assert_eq!(service.max_in_flight().await, 4);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_skips_remaining_layers() {
        let service = Arc::new(MockTaskService::new());
        service.set_node_behavior("A", "n2", TaskBehavior::Fail).await;
        let mut tree = three_layers();

        let outcome = executor(service.clone()).execute(&mut tree).await.unwrap();
        assert!(!outcome.successful);
        assert_eq!(outcome.dispatched, 2);
        assert_eq!(outcome.skipped, 3);
        assert_eq!(outcome.failed, 1);

        // Sibling in the failing layer still ran to completion.
        assert_eq!(tree.tasks[0].status, TaskStatus::Successful);
        assert_eq!(tree.tasks[1].status, TaskStatus::Failed);
        let descendants: Vec<_> = tree.children[0].all_tasks();
        assert!(descendants.iter().all(|t| t.status == TaskStatus::Failed && t.task_id.is_empty()));

        let sent: Vec<String> = service
            .sent_tasks()
            .await
            .into_iter()
            .map(|t| t.task_action)
            .collect();
        assert_eq!(sent, vec!["A", "A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_skips_later_sibling_subtrees() {
        let service = Arc::new(MockTaskService::new());
        service.set_behavior("B1", TaskBehavior::Fail).await;
        let mut tree = TaskLayer::new(vec![task("A", "")])
            .with_child(TaskLayer::new(vec![task("B1", "")]))
            .with_child(TaskLayer::new(vec![task("B2", "")]));

        let outcome = executor(service.clone()).execute(&mut tree).await.unwrap();
        assert!(!outcome.successful);
        assert_eq!(tree.children[1].tasks[0].status, TaskStatus::Failed);
        assert_eq!(outcome.skipped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_allowed_does_not_fail_job() {
        let service = Arc::new(MockTaskService::new());
        service.set_behavior("A", TaskBehavior::Fail).await;
        let mut tree = TaskLayer::chain(vec![
            vec![task("A", "n1").failure_allowed(true)],
            vec![task("B", "n1")],
        ]);

        let outcome = executor(service.clone()).execute(&mut tree).await.unwrap();
        assert!(outcome.successful);
        assert_eq!(outcome.tolerated, 1);
        assert_eq!(tree.tasks[0].status, TaskStatus::Failed);
        assert_eq!(tree.children[0].tasks[0].status, TaskStatus::Successful);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let service = Arc::new(MockTaskService::new());
        service.set_behavior("A", TaskBehavior::Hang).await;
        let mut tree = TaskLayer::chain(vec![
            vec![Task::new("j-1", "", "qingcloud", "A", json!({"timeout": 5}))],
            vec![task("B", "")],
        ]);

        let outcome = executor(service.clone()).execute(&mut tree).await.unwrap();
        assert!(!outcome.successful);
        assert_eq!(outcome.skipped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_error_aborts() {
        let service = Arc::new(MockTaskService::new());
        service.fail_send("B").await;
        let mut tree = three_layers();

        let err = executor(service.clone()).execute(&mut tree).await.unwrap_err();
        assert!(matches!(err, Error::TaskService(_)));
        let sent: Vec<String> = service
            .sent_tasks()
            .await
            .into_iter()
            .map(|t| t.task_action)
            .collect();
        assert_eq!(sent, vec!["A", "A"]);
    }

    #[tokio::test]
    async fn test_empty_tree() {
        let service = Arc::new(MockTaskService::new());
        let mut tree = TaskLayer::default();
        let outcome = executor(service).execute(&mut tree).await.unwrap();
        assert_eq!(outcome, WalkOutcome::default());
    }
}
