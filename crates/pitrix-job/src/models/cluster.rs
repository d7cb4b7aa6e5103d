// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster records as seen by the job engine.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::job::JobAction;

/// Persisted cluster status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    /// Being created, not yet usable.
    Pending,
    /// Running.
    Active,
    /// Instances stopped.
    Stopped,
    /// Soft-deleted.
    Deleted,
    /// Destroyed.
    Ceased,
}

impl ClusterStatus {
    /// Persisted name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Stopped => "stopped",
            Self::Deleted => "deleted",
            Self::Ceased => "ceased",
        }
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-flight state change on a cluster.
///
/// An empty transition status means the cluster is idle; the job engine
/// always resets it to empty when a job finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionStatus {
    /// Cluster is being provisioned.
    Creating,
    /// App version is being upgraded.
    Upgrading,
    /// App version is being rolled back.
    Rollbacking,
    /// Instances are being resized.
    Resizing,
    /// Nodes are being added or removed.
    Scaling,
    /// Instances are being stopped.
    Stopping,
    /// Instances are being started.
    Starting,
    /// Cluster is being soft-deleted.
    Deleting,
    /// Soft delete is being undone.
    Recovering,
    /// Cluster is being destroyed.
    Ceasing,
    /// Environment is being updated.
    Updating,
}

impl TransitionStatus {
    /// Persisted name of the transition.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Upgrading => "upgrading",
            Self::Rollbacking => "rollbacking",
            Self::Resizing => "resizing",
            Self::Scaling => "scaling",
            Self::Stopping => "stopping",
            Self::Starting => "starting",
            Self::Deleting => "deleting",
            Self::Recovering => "recovering",
            Self::Ceasing => "ceasing",
            Self::Updating => "updating",
        }
    }
}

impl fmt::Display for TransitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normal tenant cluster.
pub const CLUSTER_TYPE_NORMAL: i32 = 0;
/// Shared gateway cluster serving the tenant clusters of one VPC.
pub const CLUSTER_TYPE_FRONTGATE: i32 = 1;

/// Cluster row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Cluster {
    /// Cluster ID.
    pub cluster_id: String,
    /// App the cluster runs.
    #[serde(default)]
    pub app_id: String,
    /// App version.
    #[serde(default)]
    pub version_id: String,
    /// VPC the cluster lives in.
    #[serde(default)]
    pub vpc_id: String,
    /// Frontgate serving this cluster (empty for frontgates themselves).
    #[serde(default)]
    pub frontgate_id: String,
    /// [`CLUSTER_TYPE_NORMAL`] or [`CLUSTER_TYPE_FRONTGATE`].
    #[serde(default)]
    pub cluster_type: i32,
    /// Provider name.
    #[serde(default)]
    pub provider: String,
    /// Owner.
    #[serde(default)]
    pub owner: String,
    /// Status ([`ClusterStatus`] name).
    #[serde(default)]
    pub status: String,
    /// Transition status ([`TransitionStatus`] name or empty).
    #[serde(default)]
    pub transition_status: String,
}

impl Cluster {
    /// Whether this cluster is a shared frontgate.
    pub fn is_frontgate(&self) -> bool {
        self.cluster_type == CLUSTER_TYPE_FRONTGATE
    }
}

/// Cluster node row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ClusterNode {
    /// Node ID.
    pub node_id: String,
    /// Owning cluster.
    pub cluster_id: String,
    /// Backing instance (VM or pod), empty until provisioned.
    #[serde(default)]
    pub instance_id: String,
    /// Role within the app (master, worker, ...).
    #[serde(default)]
    pub role: String,
    /// Status.
    #[serde(default)]
    pub status: String,
    /// Transition status.
    #[serde(default)]
    pub transition_status: String,
}

impl ClusterNode {
    /// A node added for a scale-out that no job has provisioned yet.
    pub fn is_unprovisioned(&self) -> bool {
        self.status == ClusterStatus::Pending.as_str() && self.transition_status.is_empty()
    }
}

/// A cluster with its nodes. This is the directive format for cluster jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterWrapper {
    /// The cluster row.
    pub cluster: Cluster,
    /// The node rows.
    #[serde(default)]
    pub cluster_nodes: Vec<ClusterNode>,
}

impl ClusterWrapper {
    /// Decode a job directive.
    pub fn from_directive(directive: &str) -> crate::error::Result<Self> {
        serde_json::from_str(directive)
            .map_err(|e| crate::error::Error::InvalidDirective(e.to_string()))
    }

    /// Nodes a job with `action` operates on. A scale-out only touches the
    /// nodes it added; every other action covers all nodes in the directive.
    pub fn nodes_for(&self, action: JobAction) -> Vec<&ClusterNode> {
        self.cluster_nodes
            .iter()
            .filter(|n| action != JobAction::AddClusterNodes || n.is_unprovisioned())
            .collect()
    }

    /// Encode as a job directive.
    pub fn to_directive(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
