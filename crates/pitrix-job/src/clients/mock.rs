// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock clients for testing.
//!
//! [`MockTaskService`] simulates task runners: every task reports `working`
//! for a configurable number of polls and then finishes according to the
//! behavior registered for its action. It records dispatch and completion
//! order so tests can check layer ordering and concurrency.
//!
//! [`MockClusterClient`] keeps clusters in memory and records every status
//! write.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{ClusterClient, TaskService};
use crate::error::{Error, Result};
use crate::models::{
    Cluster, ClusterNode, ClusterStatus, ClusterWrapper, Task, TaskStatus, TransitionStatus,
};

/// One scripted answer to `describe_task`.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedStatus {
    /// Report this raw status.
    Status(String),
    /// Fail the describe call with a transient error.
    TransientError,
}

/// How a mock task finishes.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskBehavior {
    /// Successful after the working polls.
    Succeed,
    /// Failed after the working polls.
    Fail,
    /// Working forever.
    Hang,
    /// Answer describe calls from this list; successful once it runs out.
    Script(Vec<ScriptedStatus>),
}

/// Something the mock observed, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// A task was dispatched.
    Sent {
        /// Assigned task ID.
        task_id: String,
        /// Owning job.
        job_id: String,
        /// Task action.
        task_action: String,
        /// Target node.
        node_id: String,
    },
    /// A task reported a terminal status for the first time.
    Finished {
        /// Task ID.
        task_id: String,
        /// Task action.
        task_action: String,
        /// Terminal status.
        status: TaskStatus,
    },
}

#[derive(Debug)]
struct MockTask {
    task: Task,
    remaining_working: u32,
    behavior: TaskBehavior,
    script: VecDeque<ScriptedStatus>,
    finished: bool,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: u64,
    tasks: HashMap<String, MockTask>,
    events: Vec<TaskEvent>,
    behaviors: HashMap<String, TaskBehavior>,
    failing_sends: HashSet<String>,
    describe_calls: usize,
    in_flight: usize,
    max_in_flight: usize,
}

/// Scriptable in-memory task service.
#[derive(Debug, Default)]
pub struct MockTaskService {
    state: Mutex<MockState>,
    working_polls: u32,
}

impl MockTaskService {
    /// Tasks succeed on their first poll.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `working` for `polls` describe calls before finishing.
    pub fn with_working_polls(mut self, polls: u32) -> Self {
        self.working_polls = polls;
        self
    }

    /// Behavior for tasks with this action.
    pub async fn set_behavior(&self, task_action: &str, behavior: TaskBehavior) {
        self.state
            .lock()
            .await
            .behaviors
            .insert(task_action.to_string(), behavior);
    }

    /// Behavior for tasks with this action on one node. Takes precedence over
    /// [`set_behavior`](Self::set_behavior).
    pub async fn set_node_behavior(
        &self,
        task_action: &str,
        node_id: &str,
        behavior: TaskBehavior,
    ) {
        self.state
            .lock()
            .await
            .behaviors
            .insert(format!("{}@{}", task_action, node_id), behavior);
    }

    /// Make `send_task` fail for this action.
    pub async fn fail_send(&self, task_action: &str) {
        self.state
            .lock()
            .await
            .failing_sends
            .insert(task_action.to_string());
    }

    /// Tasks dispatched so far, in order.
    pub async fn sent_tasks(&self) -> Vec<Task> {
        let state = self.state.lock().await;
        state
            .events
            .iter()
            .filter_map(|event| match event {
                TaskEvent::Sent { task_id, .. } => state.tasks.get(task_id).map(|t| t.task.clone()),
                TaskEvent::Finished { .. } => None,
            })
            .collect()
    }

    /// Everything observed, in order.
    pub async fn events(&self) -> Vec<TaskEvent> {
        self.state.lock().await.events.clone()
    }

    /// Number of `describe_task` calls.
    pub async fn describe_calls(&self) -> usize {
        self.state.lock().await.describe_calls
    }

    /// Largest number of dispatched tasks that had not yet finished at once.
    pub async fn max_in_flight(&self) -> usize {
        self.state.lock().await.max_in_flight
    }
}

#[async_trait]
impl TaskService for MockTaskService {
    async fn send_task(&self, task: &Task) -> Result<String> {
        let mut state = self.state.lock().await;
        if state.failing_sends.contains(&task.task_action) {
            return Err(Error::TaskService(format!(
                "rejected task {}",
                task.task_action
            )));
        }

        state.next_id += 1;
        let task_id = format!("t-mock-{}", state.next_id);
        let behavior = state
            .behaviors
            .get(&format!("{}@{}", task.task_action, task.node_id))
            .or_else(|| state.behaviors.get(&task.task_action))
            .cloned()
            .unwrap_or(TaskBehavior::Succeed);
        let script = match &behavior {
            TaskBehavior::Script(script) => script.iter().cloned().collect(),
            _ => VecDeque::new(),
        };

        let mut row = task.clone();
        row.task_id = task_id.clone();
        state.events.push(TaskEvent::Sent {
            task_id: task_id.clone(),
            job_id: task.job_id.clone(),
            task_action: task.task_action.clone(),
            node_id: task.node_id.clone(),
        });
        state.tasks.insert(
            task_id.clone(),
            MockTask {
                task: row,
                remaining_working: self.working_polls,
                behavior,
                script,
                finished: false,
            },
        );
        state.in_flight += 1;
        state.max_in_flight = state.max_in_flight.max(state.in_flight);

        Ok(task_id)
    }

    async fn describe_task(&self, task_id: &str) -> Result<String> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.describe_calls += 1;

        let mock = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| Error::TaskService(format!("task {} not found", task_id)))?;

        let raw = if let TaskBehavior::Script(_) = mock.behavior {
            match mock.script.pop_front() {
                Some(ScriptedStatus::TransientError) => {
                    return Err(Error::TaskService("connection reset".to_string()));
                }
                Some(ScriptedStatus::Status(raw)) => raw,
                None => TaskStatus::Successful.as_str().to_string(),
            }
        } else if mock.remaining_working > 0 {
            mock.remaining_working -= 1;
            TaskStatus::Working.as_str().to_string()
        } else {
            match mock.behavior {
                TaskBehavior::Fail => TaskStatus::Failed.as_str().to_string(),
                TaskBehavior::Hang => TaskStatus::Working.as_str().to_string(),
                _ => TaskStatus::Successful.as_str().to_string(),
            }
        };

        let terminal = raw.parse::<TaskStatus>().ok().filter(TaskStatus::is_terminal);
        if let Some(status) = terminal
            && !mock.finished
        {
            mock.finished = true;
            let task_action = mock.task.task_action.clone();
            state.in_flight -= 1;
            state.events.push(TaskEvent::Finished {
                task_id: task_id.to_string(),
                task_action,
                status,
            });
        }

        Ok(raw)
    }
}

#[derive(Debug, Default)]
struct ClusterState {
    clusters: HashMap<String, Cluster>,
    nodes: Vec<ClusterNode>,
    transition_writes: Vec<(String, Option<TransitionStatus>)>,
    status_writes: Vec<(String, ClusterStatus)>,
}

/// In-memory cluster client.
#[derive(Debug, Default)]
pub struct MockClusterClient {
    state: Mutex<ClusterState>,
    fail_status_writes: AtomicBool,
}

impl MockClusterClient {
    /// Empty client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `modify_cluster_status` call fail.
    pub fn fail_status_writes(&self, fail: bool) {
        self.fail_status_writes.store(fail, Ordering::SeqCst);
    }

    /// Add a cluster and its nodes.
    pub async fn insert(&self, wrapper: ClusterWrapper) {
        let mut state = self.state.lock().await;
        state
            .nodes
            .retain(|n| n.cluster_id != wrapper.cluster.cluster_id);
        state.nodes.extend(wrapper.cluster_nodes);
        state
            .clusters
            .insert(wrapper.cluster.cluster_id.clone(), wrapper.cluster);
    }

    /// Current cluster row.
    pub async fn cluster(&self, cluster_id: &str) -> Option<Cluster> {
        self.state.lock().await.clusters.get(cluster_id).cloned()
    }

    /// Current node rows of a cluster.
    pub async fn nodes(&self, cluster_id: &str) -> Vec<ClusterNode> {
        self.state
            .lock()
            .await
            .nodes
            .iter()
            .filter(|n| n.cluster_id == cluster_id)
            .cloned()
            .collect()
    }

    /// Transition writes, in order.
    pub async fn transition_writes(&self) -> Vec<(String, Option<TransitionStatus>)> {
        self.state.lock().await.transition_writes.clone()
    }

    /// Status writes, in order.
    pub async fn status_writes(&self) -> Vec<(String, ClusterStatus)> {
        self.state.lock().await.status_writes.clone()
    }
}

#[async_trait]
impl ClusterClient for MockClusterClient {
    async fn modify_cluster_transition_status(
        &self,
        cluster_id: &str,
        transition_status: Option<TransitionStatus>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .transition_writes
            .push((cluster_id.to_string(), transition_status));
        let cluster = state
            .clusters
            .get_mut(cluster_id)
            .ok_or_else(|| Error::ClusterNotFound(cluster_id.to_string()))?;
        cluster.transition_status = transition_status
            .map(|t| t.as_str().to_string())
            .unwrap_or_default();
        Ok(())
    }

    async fn modify_cluster_status(&self, cluster_id: &str, status: ClusterStatus) -> Result<()> {
        if self.fail_status_writes.load(Ordering::SeqCst) {
            return Err(Error::Other("cluster store unavailable".to_string()));
        }
        let mut state = self.state.lock().await;
        state.status_writes.push((cluster_id.to_string(), status));
        let cluster = state
            .clusters
            .get_mut(cluster_id)
            .ok_or_else(|| Error::ClusterNotFound(cluster_id.to_string()))?;
        cluster.status = status.as_str().to_string();
        Ok(())
    }

    async fn get_cluster_wrappers(&self, cluster_ids: &[String]) -> Result<Vec<ClusterWrapper>> {
        let state = self.state.lock().await;
        cluster_ids
            .iter()
            .map(|cluster_id| {
                let cluster = state
                    .clusters
                    .get(cluster_id)
                    .cloned()
                    .ok_or_else(|| Error::ClusterNotFound(cluster_id.clone()))?;
                let cluster_nodes = state
                    .nodes
                    .iter()
                    .filter(|n| &n.cluster_id == cluster_id)
                    .cloned()
                    .collect();
                Ok(ClusterWrapper {
                    cluster,
                    cluster_nodes,
                })
            })
            .collect()
    }

    async fn describe_clusters_with_frontgate_id(
        &self,
        frontgate_id: &str,
        statuses: &[ClusterStatus],
    ) -> Result<Vec<Cluster>> {
        let state = self.state.lock().await;
        let mut clusters: Vec<Cluster> = state
            .clusters
            .values()
            .filter(|c| c.frontgate_id == frontgate_id)
            .filter(|c| statuses.is_empty() || statuses.iter().any(|s| s.as_str() == c.status))
            .cloned()
            .collect();
        clusters.sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));
        Ok(clusters)
    }

    async fn delete_table_cluster_nodes(&self, node_ids: &[String]) -> Result<()> {
        self.state
            .lock()
            .await
            .nodes
            .retain(|n| !node_ids.contains(&n.node_id));
        Ok(())
    }

    async fn modify_cluster_node_status(
        &self,
        node_ids: &[String],
        status: ClusterStatus,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        for node in state.nodes.iter_mut() {
            if node_ids.contains(&node.node_id) {
                node.status = status.as_str().to_string();
            }
        }
        Ok(())
    }
}
