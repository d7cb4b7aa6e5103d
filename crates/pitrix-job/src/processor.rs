// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster bookkeeping around a job.
//!
//! ```text
//!   pre()       transition_status := action's transition
//!   ... tasks run ...
//!   post()      success: node statuses, cluster status, frontgate follow-up
//!               failure: scale-out cleanup
//!   finalize()  transition_status := ""   (always)
//! ```

use std::sync::Arc;

use tracing::{debug, info};

use crate::clients::ClusterClient;
use crate::error::{Error, Result};
use crate::models::{ClusterNode, ClusterStatus, ClusterWrapper, Job, JobAction, JobStatus, NewJob};
use crate::plugins::ProviderRegistry;
use crate::server::JobServer;

/// Cluster state hooks for one job.
pub struct Processor {
    /// The job being processed. Its status drives [`post`](Self::post).
    pub job: Job,
    cluster_client: Arc<dyn ClusterClient>,
    registry: Arc<ProviderRegistry>,
    server: JobServer,
}

impl Processor {
    /// Create a processor for `job`.
    pub fn new(
        job: Job,
        cluster_client: Arc<dyn ClusterClient>,
        registry: Arc<ProviderRegistry>,
        server: JobServer,
    ) -> Self {
        Self {
            job,
            cluster_client,
            registry,
            server,
        }
    }

    /// Mark the cluster as in transition.
    pub async fn pre(&self) -> Result<()> {
        let transition = self.job.job_action.transition_status();
        self.cluster_client
            .modify_cluster_transition_status(&self.job.cluster_id, Some(transition))
            .await?;
        debug!(
            cluster_id = %self.job.cluster_id,
            transition_status = %transition,
            "Cluster in transition"
        );
        Ok(())
    }

    /// Apply the job's effect on cluster state, according to `job.status`.
    pub async fn post(&self) -> Result<()> {
        match self.job.status {
            JobStatus::Successful => self.post_success().await,
            JobStatus::Failed if self.job.job_action == JobAction::AddClusterNodes => {
                self.remove_unprovisioned_nodes().await
            }
            _ => Ok(()),
        }
    }

    /// Clear the cluster's transition status.
    pub async fn finalize(&self) -> Result<()> {
        self.cluster_client
            .modify_cluster_transition_status(&self.job.cluster_id, None)
            .await
    }

    async fn post_success(&self) -> Result<()> {
        let plugin = self.registry.get(&self.job.provider)?;
        plugin.update_cluster_status(&self.job).await?;

        let status = self.job.job_action.success_status();
        self.cluster_client
            .modify_cluster_status(&self.job.cluster_id, status)
            .await?;
        info!(cluster_id = %self.job.cluster_id, status = %status, "Cluster status updated");

        match self.job.job_action {
            JobAction::StopClusters => {
                self.follow_up_frontgate(&[ClusterStatus::Active, ClusterStatus::Pending])
                    .await
            }
            JobAction::DeleteClusters => {
                self.follow_up_frontgate(&[
                    ClusterStatus::Active,
                    ClusterStatus::Stopped,
                    ClusterStatus::Pending,
                ])
                .await
            }
            _ => Ok(()),
        }
    }

    /// Queue the same action for the cluster's frontgate once no cluster in
    /// `live_statuses` depends on it any more.
    async fn follow_up_frontgate(&self, live_statuses: &[ClusterStatus]) -> Result<()> {
        let cluster = self.load_wrapper(&self.job.cluster_id).await?.cluster;
        if cluster.is_frontgate() || cluster.frontgate_id.is_empty() {
            return Ok(());
        }
        let frontgate_id = cluster.frontgate_id;

        let dependents: Vec<String> = self
            .cluster_client
            .describe_clusters_with_frontgate_id(&frontgate_id, live_statuses)
            .await?
            .into_iter()
            .filter(|c| c.cluster_id != self.job.cluster_id)
            .map(|c| c.cluster_id)
            .collect();
        if !dependents.is_empty() {
            debug!(
                frontgate_id = %frontgate_id,
                dependents = dependents.len(),
                "Frontgate still in use"
            );
            return Ok(());
        }

        let frontgate = self.load_wrapper(&frontgate_id).await?;
        let target = self.job.job_action.success_status();
        if frontgate.cluster.status == target.as_str() {
            debug!(frontgate_id = %frontgate_id, status = %target, "Frontgate already settled");
            return Ok(());
        }

        let job_id = self
            .server
            .create_job(NewJob {
                cluster_id: frontgate_id.clone(),
                app_id: frontgate.cluster.app_id.clone(),
                version_id: frontgate.cluster.version_id.clone(),
                job_action: self.job.job_action,
                directive: frontgate.to_directive()?,
                provider: self.job.provider.clone(),
                owner: self.job.owner.clone(),
            })
            .await?;
        info!(
            frontgate_id = %frontgate_id,
            follow_up_job_id = %job_id,
            job_action = %self.job.job_action,
            "Queued frontgate job"
        );
        Ok(())
    }

    /// Drop nodes a failed scale-out never provisioned.
    async fn remove_unprovisioned_nodes(&self) -> Result<()> {
        let wrapper = ClusterWrapper::from_directive(&self.job.directive)?;
        let node_ids: Vec<String> = wrapper
            .cluster_nodes
            .into_iter()
            .filter(ClusterNode::is_unprovisioned)
            .map(|n| n.node_id)
            .collect();
        if node_ids.is_empty() {
            return Ok(());
        }
        self.cluster_client.delete_table_cluster_nodes(&node_ids).await?;
        info!(
            cluster_id = %self.job.cluster_id,
            removed = node_ids.len(),
            "Removed unprovisioned nodes"
        );
        Ok(())
    }

    async fn load_wrapper(&self, cluster_id: &str) -> Result<ClusterWrapper> {
        self.cluster_client
            .get_cluster_wrappers(&[cluster_id.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::ClusterNotFound(cluster_id.to_string()))
    }
}
