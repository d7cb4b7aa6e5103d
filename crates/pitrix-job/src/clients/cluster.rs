// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster status client.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{Cluster, ClusterStatus, ClusterWrapper, TransitionStatus};
use crate::persistence::Persistence;

/// Cluster operations the processor and the provider plugins perform.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Set (`Some`) or clear (`None`) a cluster's transition status.
    async fn modify_cluster_transition_status(
        &self,
        cluster_id: &str,
        transition_status: Option<TransitionStatus>,
    ) -> Result<()>;

    /// Set a cluster's status.
    async fn modify_cluster_status(&self, cluster_id: &str, status: ClusterStatus) -> Result<()>;

    /// Load clusters together with their nodes. Fails if any ID is unknown.
    async fn get_cluster_wrappers(&self, cluster_ids: &[String]) -> Result<Vec<ClusterWrapper>>;

    /// Clusters behind `frontgate_id` whose status is one of `statuses`.
    async fn describe_clusters_with_frontgate_id(
        &self,
        frontgate_id: &str,
        statuses: &[ClusterStatus],
    ) -> Result<Vec<Cluster>>;

    /// Remove node rows.
    async fn delete_table_cluster_nodes(&self, node_ids: &[String]) -> Result<()>;

    /// Set the status of several nodes.
    async fn modify_cluster_node_status(
        &self,
        node_ids: &[String],
        status: ClusterStatus,
    ) -> Result<()>;
}

/// [`ClusterClient`] over the `clusters` and `cluster_nodes` tables.
pub struct PersistenceClusterClient {
    persistence: Arc<dyn Persistence>,
}

impl PersistenceClusterClient {
    /// Create a cluster client over `persistence`.
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self { persistence }
    }
}

#[async_trait]
impl ClusterClient for PersistenceClusterClient {
    async fn modify_cluster_transition_status(
        &self,
        cluster_id: &str,
        transition_status: Option<TransitionStatus>,
    ) -> Result<()> {
        let value = transition_status.map(|t| t.as_str()).unwrap_or("");
        self.persistence
            .update_cluster_transition_status(cluster_id, value)
            .await
    }

    async fn modify_cluster_status(&self, cluster_id: &str, status: ClusterStatus) -> Result<()> {
        self.persistence
            .update_cluster_status(cluster_id, status.as_str())
            .await
    }

    async fn get_cluster_wrappers(&self, cluster_ids: &[String]) -> Result<Vec<ClusterWrapper>> {
        let mut wrappers = Vec::with_capacity(cluster_ids.len());
        for cluster_id in cluster_ids {
            let cluster = self
                .persistence
                .get_cluster(cluster_id)
                .await?
                .ok_or_else(|| Error::ClusterNotFound(cluster_id.clone()))?;
            let cluster_nodes = self.persistence.list_cluster_nodes(cluster_id).await?;
            wrappers.push(ClusterWrapper {
                cluster,
                cluster_nodes,
            });
        }
        Ok(wrappers)
    }

    async fn describe_clusters_with_frontgate_id(
        &self,
        frontgate_id: &str,
        statuses: &[ClusterStatus],
    ) -> Result<Vec<Cluster>> {
        let statuses: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        self.persistence
            .list_clusters_by_frontgate(frontgate_id, &statuses)
            .await
    }

    async fn delete_table_cluster_nodes(&self, node_ids: &[String]) -> Result<()> {
        self.persistence.delete_cluster_nodes(node_ids).await
    }

    async fn modify_cluster_node_status(
        &self,
        node_ids: &[String],
        status: ClusterStatus,
    ) -> Result<()> {
        self.persistence
            .update_cluster_nodes_status(node_ids, status.as_str())
            .await
    }
}
