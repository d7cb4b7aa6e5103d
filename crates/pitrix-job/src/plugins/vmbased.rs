// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Plugin for VM-based clouds.
//!
//! Instances are driven through the cloud API (target: the provider name),
//! while metadata and confd tasks go through the cluster's frontgate.
//!
//! | Action                 | Layers                                               |
//! |------------------------|------------------------------------------------------|
//! | Create, AddNodes       | RunInstances → RegisterMetadata → StartConfd         |
//! | Start                  | StartInstances → StartConfd                          |
//! | Stop                   | StopConfd* → StopInstances                           |
//! | Delete                 | StopConfd* → TerminateInstances → DeregisterMetadata |
//! | Recover                | RunInstances → RegisterMetadata → StartConfd         |
//! | Cease                  | TerminateInstances* → DeregisterMetadata             |
//! | DeleteNodes            | StopConfd* → TerminateInstances → DeregisterMetadata |
//! | Resize                 | StopConfd → StopInstances → ResizeInstances →        |
//! |                        | StartInstances → StartConfd                          |
//! | Upgrade, Rollback, Env | StopConfd → UpdateMetadata → StartConfd              |
//!
//! `*` marks layers whose failures are tolerated. A scale-out (AddNodes)
//! covers only the pending nodes it added, not the live ones.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::{ProviderPlugin, reconcile_nodes};
use crate::clients::ClusterClient;
use crate::error::Result;
use crate::models::{ClusterNode, ClusterWrapper, Job, JobAction, Task, TaskLayer};

const CONFD_TIMEOUT_SECS: u64 = 600;

/// Plugin shared by every VM-based provider.
pub struct VmBasedProvider {
    cluster_client: Arc<dyn ClusterClient>,
}

impl VmBasedProvider {
    /// Create the plugin.
    pub fn new(cluster_client: Arc<dyn ClusterClient>) -> Self {
        Self { cluster_client }
    }
}

/// Task factory for one job.
struct Planner<'a> {
    job: &'a Job,
    wrapper: &'a ClusterWrapper,
    nodes: Vec<&'a ClusterNode>,
}

impl<'a> Planner<'a> {
    fn new(job: &'a Job, wrapper: &'a ClusterWrapper) -> Self {
        Self {
            job,
            wrapper,
            nodes: wrapper.nodes_for(job.job_action),
        }
    }

    /// Where metadata and confd tasks are sent.
    fn frontgate_target(&self) -> &str {
        let cluster = &self.wrapper.cluster;
        if cluster.is_frontgate() || cluster.frontgate_id.is_empty() {
            &cluster.cluster_id
        } else {
            &cluster.frontgate_id
        }
    }

    fn instance_task(&self, action: &str, node: &ClusterNode) -> Task {
        Task::new(
            &self.job.job_id,
            &node.node_id,
            &self.job.provider,
            action,
            json!({
                "cluster_id": self.wrapper.cluster.cluster_id,
                "node_id": node.node_id,
                "instance_id": node.instance_id,
                "role": node.role,
                "vpc_id": self.wrapper.cluster.vpc_id,
            }),
        )
    }

    fn confd_task(&self, action: &str, node: &ClusterNode) -> Task {
        Task::new(
            &self.job.job_id,
            &node.node_id,
            self.frontgate_target(),
            action,
            json!({
                "cluster_id": self.wrapper.cluster.cluster_id,
                "node_id": node.node_id,
                "instance_id": node.instance_id,
                "timeout": CONFD_TIMEOUT_SECS,
            }),
        )
    }

    fn metadata_task(&self, action: &str) -> Task {
        let node_ids: Vec<&str> = self.nodes.iter().map(|n| n.node_id.as_str()).collect();
        Task::new(
            &self.job.job_id,
            "",
            self.frontgate_target(),
            action,
            json!({
                "cluster_id": self.wrapper.cluster.cluster_id,
                "node_ids": node_ids,
            }),
        )
    }

    fn instances(&self, action: &str, failure_allowed: bool) -> Vec<Task> {
        self.nodes
            .iter()
            .map(|node| self.instance_task(action, node).failure_allowed(failure_allowed))
            .collect()
    }

    fn confd(&self, action: &str, failure_allowed: bool) -> Vec<Task> {
        self.nodes
            .iter()
            .map(|node| self.confd_task(action, node).failure_allowed(failure_allowed))
            .collect()
    }

    fn metadata(&self, action: &str) -> Vec<Task> {
        vec![self.metadata_task(action)]
    }

    fn plan(&self) -> TaskLayer {
        let layers = match self.job.job_action {
            JobAction::CreateCluster | JobAction::AddClusterNodes => vec![
                self.instances("RunInstances", false),
                self.metadata("RegisterMetadata"),
                self.confd("StartConfd", false),
            ],
            JobAction::StartClusters => vec![
                self.instances("StartInstances", false),
                self.confd("StartConfd", false),
            ],
            JobAction::StopClusters => vec![
                self.confd("StopConfd", true),
                self.instances("StopInstances", false),
            ],
            JobAction::DeleteClusters => vec![
                self.confd("StopConfd", true),
                self.instances("TerminateInstances", false),
                self.metadata("DeregisterMetadata"),
            ],
            JobAction::RecoverClusters => vec![
                self.instances("RunInstances", false),
                self.metadata("RegisterMetadata"),
                self.confd("StartConfd", false),
            ],
            JobAction::CeaseClusters => vec![
                self.instances("TerminateInstances", true),
                self.metadata("DeregisterMetadata"),
            ],
            JobAction::DeleteClusterNodes => vec![
                self.confd("StopConfd", true),
                self.instances("TerminateInstances", false),
                self.metadata("DeregisterMetadata"),
            ],
            JobAction::ResizeCluster => vec![
                self.confd("StopConfd", false),
                self.instances("StopInstances", false),
                self.instances("ResizeInstances", false),
                self.instances("StartInstances", false),
                self.confd("StartConfd", false),
            ],
            JobAction::UpgradeCluster
            | JobAction::RollbackCluster
            | JobAction::UpdateClusterEnv => vec![
                self.confd("StopConfd", false),
                self.metadata("UpdateMetadata"),
                self.confd("StartConfd", false),
            ],
        };
        TaskLayer::chain(layers)
    }
}

#[async_trait]
impl ProviderPlugin for VmBasedProvider {
    fn kind(&self) -> &'static str {
        "vmbased"
    }

    async fn split_job_into_tasks(&self, job: &Job) -> Result<TaskLayer> {
        let wrapper = ClusterWrapper::from_directive(&job.directive)?;
        let planner = Planner::new(job, &wrapper);
        let tree = planner.plan();
        debug!(
            job_action = %job.job_action,
            nodes = planner.nodes.len(),
            tasks = tree.task_count(),
            "Planned VM job"
        );
        Ok(tree)
    }

    async fn update_cluster_status(&self, job: &Job) -> Result<()> {
        let wrapper = ClusterWrapper::from_directive(&job.directive)?;
        let node_ids: Vec<String> = wrapper
            .nodes_for(job.job_action)
            .into_iter()
            .map(|n| n.node_id.clone())
            .collect();
        reconcile_nodes(self.cluster_client.as_ref(), job.job_action, &node_ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::mock::MockClusterClient;
    use crate::error::Error;
    use crate::models::{Cluster, ClusterStatus, NewJob};

    fn wrapper(node_count: usize) -> ClusterWrapper {
        ClusterWrapper {
            cluster: Cluster {
                cluster_id: "cl-1".to_string(),
                app_id: "app-1".to_string(),
                version_id: "appv-1".to_string(),
                vpc_id: "vpc-1".to_string(),
                frontgate_id: "cl-fg".to_string(),
                cluster_type: 0,
                provider: "qingcloud".to_string(),
                owner: "usr-1".to_string(),
                status: "active".to_string(),
                transition_status: String::new(),
            },
            cluster_nodes: (1..=node_count)
                .map(|i| ClusterNode {
                    node_id: format!("cln-{}", i),
                    cluster_id: "cl-1".to_string(),
                    instance_id: format!("i-{}", i),
                    role: "worker".to_string(),
                    status: "pending".to_string(),
                    transition_status: String::new(),
                })
                .collect(),
        }
    }

    fn job(action: JobAction, wrapper: &ClusterWrapper) -> Job {
        Job::new(NewJob {
            cluster_id: wrapper.cluster.cluster_id.clone(),
            app_id: "app-1".to_string(),
            version_id: "appv-1".to_string(),
            job_action: action,
            directive: wrapper.to_directive().unwrap(),
            provider: "qingcloud".to_string(),
            owner: "usr-1".to_string(),
        })
    }

    fn layer_actions(tree: &TaskLayer) -> Vec<Vec<String>> {
        let mut out = Vec::new();
        tree.walk(&mut |_, layer| {
            out.push(layer.tasks.iter().map(|t| t.task_action.clone()).collect());
        });
        out
    }

    fn provider() -> VmBasedProvider {
        VmBasedProvider::new(Arc::new(MockClusterClient::new()))
    }

    #[tokio::test]
    async fn test_create_cluster_plan() {
        let wrapper = wrapper(2);
        let tree = provider()
            .split_job_into_tasks(&job(JobAction::CreateCluster, &wrapper))
            .await
            .unwrap();

        assert_eq!(tree.depth(), 3);
        assert_eq!(tree.task_count(), 5);
        assert_eq!(
            layer_actions(&tree),
            vec![
                vec!["RunInstances", "RunInstances"],
                vec!["RegisterMetadata"],
                vec!["StartConfd", "StartConfd"],
            ]
        );

        let run = &tree.tasks[0];
        assert_eq!(run.target, "qingcloud");
        assert_eq!(run.node_id, "cln-1");
        let register = &tree.children[0].tasks[0];
        assert_eq!(register.target, "cl-fg");
        assert!(register.node_id.is_empty());
        let confd = &tree.children[0].children[0].tasks[0];
        assert_eq!(confd.timeout, Some(std::time::Duration::from_secs(CONFD_TIMEOUT_SECS)));
    }

    #[tokio::test]
    async fn test_stop_plan_tolerates_confd_failures() {
        let wrapper = wrapper(2);
        let tree = provider()
            .split_job_into_tasks(&job(JobAction::StopClusters, &wrapper))
            .await
            .unwrap();

        assert_eq!(
            layer_actions(&tree),
            vec![vec!["StopConfd", "StopConfd"], vec!["StopInstances", "StopInstances"]]
        );
        assert!(tree.tasks.iter().all(|t| t.failure_allowed));
        assert!(tree.children[0].tasks.iter().all(|t| !t.failure_allowed));
    }

    #[tokio::test]
    async fn test_every_action_is_planned() {
        let wrapper = wrapper(1);
        for action in JobAction::ALL {
            let tree = provider()
                .split_job_into_tasks(&job(action, &wrapper))
                .await
                .unwrap();
            assert!(tree.task_count() > 0, "{} produced no tasks", action);
            assert!(tree.all_tasks().iter().all(|t| t.job_id == tree.tasks[0].job_id));
        }
    }

    #[tokio::test]
    async fn test_scale_out_plans_only_new_nodes() {
        let mut wrapper = wrapper(2);
        wrapper.cluster_nodes[0].status = ClusterStatus::Active.as_str().to_string();
        let tree = provider()
            .split_job_into_tasks(&job(JobAction::AddClusterNodes, &wrapper))
            .await
            .unwrap();

        let nodes: Vec<&str> = tree.tasks.iter().map(|t| t.node_id.as_str()).collect();
        assert_eq!(nodes, vec!["cln-2"]);
        let metadata: serde_json::Value =
            serde_json::from_str(&tree.children[0].tasks[0].directive).unwrap();
        assert_eq!(metadata["node_ids"], serde_json::json!(["cln-2"]));
        let confd = &tree.children[0].children[0].tasks;
        assert_eq!(confd.len(), 1);
        assert_eq!(confd[0].node_id, "cln-2");
    }

    #[tokio::test]
    async fn test_scale_out_reconciles_only_new_nodes() {
        let clusters = Arc::new(MockClusterClient::new());
        let mut wrapper = wrapper(2);
        wrapper.cluster_nodes[0].status = ClusterStatus::Stopped.as_str().to_string();
        clusters.insert(wrapper.clone()).await;
        let provider = VmBasedProvider::new(clusters.clone());

        provider
            .update_cluster_status(&job(JobAction::AddClusterNodes, &wrapper))
            .await
            .unwrap();
        let statuses: Vec<(String, String)> = clusters
            .nodes("cl-1")
            .await
            .into_iter()
            .map(|n| (n.node_id, n.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("cln-1".to_string(), "stopped".to_string()),
                ("cln-2".to_string(), "active".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_cluster_without_nodes_skips_node_layers() {
        let wrapper = wrapper(0);
        let tree = provider()
            .split_job_into_tasks(&job(JobAction::CeaseClusters, &wrapper))
            .await
            .unwrap();
        assert_eq!(layer_actions(&tree), vec![vec!["DeregisterMetadata"]]);
    }

    #[tokio::test]
    async fn test_frontgate_targets_itself() {
        let mut wrapper = wrapper(1);
        wrapper.cluster.cluster_type = crate::models::CLUSTER_TYPE_FRONTGATE;
        wrapper.cluster.frontgate_id = String::new();
        let tree = provider()
            .split_job_into_tasks(&job(JobAction::CreateCluster, &wrapper))
            .await
            .unwrap();
        assert_eq!(tree.children[0].tasks[0].target, "cl-1");
    }

    #[tokio::test]
    async fn test_invalid_directive() {
        let mut job = job(JobAction::CreateCluster, &wrapper(1));
        job.directive = "{\"nope\": true}".to_string();
        let err = provider().split_job_into_tasks(&job).await.unwrap_err();
        assert!(matches!(err, Error::InvalidDirective(_)));
    }

    #[tokio::test]
    async fn test_update_cluster_status_reconciles_nodes() {
        let clusters = Arc::new(MockClusterClient::new());
        let wrapper = wrapper(2);
        clusters.insert(wrapper.clone()).await;
        let provider = VmBasedProvider::new(clusters.clone());

        provider
            .update_cluster_status(&job(JobAction::StopClusters, &wrapper))
            .await
            .unwrap();
        let nodes = clusters.nodes("cl-1").await;
        assert!(nodes.iter().all(|n| n.status == ClusterStatus::Stopped.as_str()));

        provider
            .update_cluster_status(&job(JobAction::DeleteClusterNodes, &wrapper))
            .await
            .unwrap();
        assert!(clusters.nodes("cl-1").await.is_empty());
    }
}
