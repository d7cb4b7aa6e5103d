// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Plugin for clusters deployed as Helm releases.
//!
//! Every supported action is a single release operation; pods come and go
//! with the release, so node reconciliation reloads the node rows instead of
//! trusting the directive.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::{ProviderPlugin, reconcile_nodes, unsupported};
use crate::clients::ClusterClient;
use crate::error::Result;
use crate::models::{ClusterWrapper, Job, JobAction, Task, TaskLayer};

/// Provider name the Kubernetes plugin is registered under.
pub const KUBERNETES_PROVIDER: &str = "kubernetes";

const RELEASE_TIMEOUT_SECS: u64 = 1800;

/// Helm release plugin.
pub struct KubernetesProvider {
    cluster_client: Arc<dyn ClusterClient>,
}

impl KubernetesProvider {
    /// Create the plugin.
    pub fn new(cluster_client: Arc<dyn ClusterClient>) -> Self {
        Self { cluster_client }
    }

    fn release_action(job: &Job) -> Result<&'static str> {
        match job.job_action {
            JobAction::CreateCluster => Ok("HelmInstall"),
            JobAction::UpgradeCluster | JobAction::UpdateClusterEnv => Ok("HelmUpgrade"),
            JobAction::RollbackCluster | JobAction::RecoverClusters => Ok("HelmRollback"),
            JobAction::DeleteClusters => Ok("HelmDelete"),
            JobAction::CeaseClusters => Ok("HelmPurge"),
            JobAction::ResizeCluster
            | JobAction::AddClusterNodes
            | JobAction::DeleteClusterNodes
            | JobAction::StopClusters
            | JobAction::StartClusters => Err(unsupported(&job.provider, job.job_action)),
        }
    }
}

#[async_trait]
impl ProviderPlugin for KubernetesProvider {
    fn kind(&self) -> &'static str {
        "kubernetes"
    }

    async fn split_job_into_tasks(&self, job: &Job) -> Result<TaskLayer> {
        let action = Self::release_action(job)?;
        let wrapper = ClusterWrapper::from_directive(&job.directive)?;
        let cluster = &wrapper.cluster;

        let task = Task::new(
            &job.job_id,
            "",
            KUBERNETES_PROVIDER,
            action,
            json!({
                "cluster_id": cluster.cluster_id,
                "release_name": cluster.cluster_id,
                "namespace": cluster.owner,
                "app_id": job.app_id,
                "version_id": job.version_id,
                "timeout": RELEASE_TIMEOUT_SECS,
            }),
        );
        Ok(TaskLayer::new(vec![task]))
    }

    async fn update_cluster_status(&self, job: &Job) -> Result<()> {
        let node_ids: Vec<String> = self
            .cluster_client
            .get_cluster_wrappers(std::slice::from_ref(&job.cluster_id))
            .await?
            .into_iter()
            .flat_map(|w| w.cluster_nodes)
            .map(|n| n.node_id)
            .collect();
        reconcile_nodes(self.cluster_client.as_ref(), job.job_action, &node_ids).await
    }
}
