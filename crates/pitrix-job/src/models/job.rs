// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Job model and the action/status enums that drive the cluster state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cluster::{ClusterStatus, TransitionStatus};
use crate::error::Error;

/// Cluster operation a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobAction {
    /// Provision a new cluster.
    CreateCluster,
    /// Move a cluster to a newer app version.
    UpgradeCluster,
    /// Return a cluster to its previous app version.
    RollbackCluster,
    /// Change instance sizing.
    ResizeCluster,
    /// Scale out.
    AddClusterNodes,
    /// Scale in.
    DeleteClusterNodes,
    /// Stop all instances.
    StopClusters,
    /// Start stopped instances.
    StartClusters,
    /// Soft-delete (recoverable).
    DeleteClusters,
    /// Undo a soft delete.
    RecoverClusters,
    /// Permanently destroy.
    CeaseClusters,
    /// Push a new environment to running nodes.
    UpdateClusterEnv,
}

impl JobAction {
    /// Every action, in declaration order.
    pub const ALL: [JobAction; 12] = [
        Self::CreateCluster,
        Self::UpgradeCluster,
        Self::RollbackCluster,
        Self::ResizeCluster,
        Self::AddClusterNodes,
        Self::DeleteClusterNodes,
        Self::StopClusters,
        Self::StartClusters,
        Self::DeleteClusters,
        Self::RecoverClusters,
        Self::CeaseClusters,
        Self::UpdateClusterEnv,
    ];

    /// Persisted name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateCluster => "CreateCluster",
            Self::UpgradeCluster => "UpgradeCluster",
            Self::RollbackCluster => "RollbackCluster",
            Self::ResizeCluster => "ResizeCluster",
            Self::AddClusterNodes => "AddClusterNodes",
            Self::DeleteClusterNodes => "DeleteClusterNodes",
            Self::StopClusters => "StopClusters",
            Self::StartClusters => "StartClusters",
            Self::DeleteClusters => "DeleteClusters",
            Self::RecoverClusters => "RecoverClusters",
            Self::CeaseClusters => "CeaseClusters",
            Self::UpdateClusterEnv => "UpdateClusterEnv",
        }
    }

    /// Transition status written on the cluster while this action runs.
    pub fn transition_status(&self) -> TransitionStatus {
        match self {
            Self::CreateCluster => TransitionStatus::Creating,
            Self::UpgradeCluster => TransitionStatus::Upgrading,
            Self::RollbackCluster => TransitionStatus::Rollbacking,
            Self::ResizeCluster => TransitionStatus::Resizing,
            Self::AddClusterNodes | Self::DeleteClusterNodes => TransitionStatus::Scaling,
            Self::StopClusters => TransitionStatus::Stopping,
            Self::StartClusters => TransitionStatus::Starting,
            Self::DeleteClusters => TransitionStatus::Deleting,
            Self::RecoverClusters => TransitionStatus::Recovering,
            Self::CeaseClusters => TransitionStatus::Ceasing,
            Self::UpdateClusterEnv => TransitionStatus::Updating,
        }
    }

    /// Cluster status written once the action has succeeded.
    pub fn success_status(&self) -> ClusterStatus {
        match self {
            Self::StopClusters => ClusterStatus::Stopped,
            Self::DeleteClusters => ClusterStatus::Deleted,
            Self::CeaseClusters => ClusterStatus::Ceased,
            _ => ClusterStatus::Active,
        }
    }
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| Error::unknown("job action", s))
    }
}

/// Lifecycle status of a job.
///
/// ```text
/// pending ──claim──► working ──┬──► successful
///                              └──► failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, waiting in the queue.
    Pending,
    /// Claimed by a controller.
    Working,
    /// All tasks finished successfully.
    Successful,
    /// Aborted or a required task failed.
    Failed,
}

impl JobStatus {
    /// Persisted name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Working => "working",
            Self::Successful => "successful",
            Self::Failed => "failed",
        }
    }

    /// Terminal statuses are never left again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Successful | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "working" => Ok(Self::Working),
            "successful" => Ok(Self::Successful),
            "failed" => Ok(Self::Failed),
            other => Err(Error::unknown("job status", other)),
        }
    }
}

/// Parameters for a job that has not been persisted yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    /// Target cluster.
    pub cluster_id: String,
    /// App the cluster runs.
    pub app_id: String,
    /// App version the cluster runs (or moves to).
    pub version_id: String,
    /// Operation to perform.
    pub job_action: JobAction,
    /// Serialized execution plan handed to the provider plugin.
    pub directive: String,
    /// Provider name used to resolve the plugin.
    pub provider: String,
    /// Owner of the cluster.
    pub owner: String,
}

/// A unit of orchestration work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Job ID (`j-` prefixed).
    pub job_id: String,
    /// Target cluster.
    pub cluster_id: String,
    /// App the cluster runs.
    pub app_id: String,
    /// App version.
    pub version_id: String,
    /// Operation to perform.
    pub job_action: JobAction,
    /// Serialized execution plan.
    pub directive: String,
    /// Provider name.
    pub provider: String,
    /// Owner of the cluster.
    pub owner: String,
    /// Current status.
    pub status: JobStatus,
    /// Hostname of the controller that claimed the job.
    pub executor: String,
    /// Number of tasks the job was split into.
    pub total_tasks: i32,
    /// When the job was created.
    pub create_time: DateTime<Utc>,
    /// When the status last changed.
    pub status_time: DateTime<Utc>,
}

impl Job {
    /// Build a pending job with a fresh ID.
    pub fn new(new_job: NewJob) -> Self {
        let now = Utc::now();
        Self {
            job_id: super::new_id("j"),
            cluster_id: new_job.cluster_id,
            app_id: new_job.app_id,
            version_id: new_job.version_id,
            job_action: new_job.job_action,
            directive: new_job.directive,
            provider: new_job.provider,
            owner: new_job.owner,
            status: JobStatus::Pending,
            executor: String::new(),
            total_tasks: 0,
            create_time: now,
            status_time: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_action_round_trips_by_name() {
        for action in JobAction::ALL {
            assert_eq!(action.as_str().parse::<JobAction>().unwrap(), action);
        }
        let err = "RebootCluster".parse::<JobAction>().unwrap_err();
        assert!(matches!(err, Error::UnknownValue { kind: "job action", .. }));
    }

    #[test]
    fn test_transition_status_mapping() {
        assert_eq!(
            JobAction::CreateCluster.transition_status(),
            TransitionStatus::Creating
        );
        assert_eq!(
            JobAction::AddClusterNodes.transition_status(),
            TransitionStatus::Scaling
        );
        assert_eq!(
            JobAction::DeleteClusterNodes.transition_status(),
            TransitionStatus::Scaling
        );
        assert_eq!(
            JobAction::RollbackCluster.transition_status().as_str(),
            "rollbacking"
        );
        assert_eq!(
            JobAction::UpdateClusterEnv.transition_status().as_str(),
            "updating"
        );
    }

    #[test]
    fn test_success_status_mapping() {
        assert_eq!(JobAction::CreateCluster.success_status(), ClusterStatus::Active);
        assert_eq!(JobAction::StopClusters.success_status(), ClusterStatus::Stopped);
        assert_eq!(JobAction::DeleteClusters.success_status(), ClusterStatus::Deleted);
        assert_eq!(JobAction::CeaseClusters.success_status(), ClusterStatus::Ceased);
        assert_eq!(JobAction::RecoverClusters.success_status(), ClusterStatus::Active);
    }

    #[test]
    fn test_job_status_parse_and_terminal() {
        assert_eq!("working".parse::<JobStatus>().unwrap(), JobStatus::Working);
        assert!("done".parse::<JobStatus>().is_err());
        assert!(JobStatus::Successful.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Working.is_terminal());
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = Job::new(NewJob {
            cluster_id: "cl-1".to_string(),
            app_id: "app-1".to_string(),
            version_id: "appv-1".to_string(),
            job_action: JobAction::CreateCluster,
            directive: "{}".to_string(),
            provider: "qingcloud".to_string(),
            owner: "usr-1".to_string(),
        });
        assert!(job.job_id.starts_with("j-"));
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.executor.is_empty());
        assert_eq!(job.create_time, job.status_time);
    }
}
