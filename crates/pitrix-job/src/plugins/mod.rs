// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Provider plugins.
//!
//! A plugin turns a job into a [`TaskLayer`] tree and, once the job has
//! succeeded, reconciles node statuses with what the tasks did. Plugins are
//! looked up by the job's provider name in a [`ProviderRegistry`].
//!
//! | Provider name                  | Plugin               |
//! |--------------------------------|----------------------|
//! | any name in `PITRIX_VM_PROVIDERS` | [`VmBasedProvider`]  |
//! | `kubernetes`                   | [`KubernetesProvider`] |

mod kubernetes;
mod vmbased;

pub use kubernetes::{KUBERNETES_PROVIDER, KubernetesProvider};
pub use vmbased::VmBasedProvider;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::clients::ClusterClient;
use crate::error::{Error, Result};
use crate::models::{Job, JobAction, TaskLayer};

/// Provider-specific job planning and status reconciliation.
#[async_trait]
pub trait ProviderPlugin: Send + Sync {
    /// Plugin family name, for logs.
    fn kind(&self) -> &'static str;

    /// Build the task tree for `job`.
    async fn split_job_into_tasks(&self, job: &Job) -> Result<TaskLayer>;

    /// Bring node statuses in line with a successfully finished `job`.
    async fn update_cluster_status(&self, job: &Job) -> Result<()>;
}

/// Provider name to plugin mapping.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    plugins: HashMap<String, Arc<dyn ProviderPlugin>>,
}

impl ProviderRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the VM plugin under each of `vm_providers` and the
    /// Kubernetes plugin under [`KUBERNETES_PROVIDER`].
    pub fn with_defaults(vm_providers: &[String], cluster_client: Arc<dyn ClusterClient>) -> Self {
        let mut registry = Self::new();
        let vm: Arc<dyn ProviderPlugin> = Arc::new(VmBasedProvider::new(cluster_client.clone()));
        for provider in vm_providers {
            registry.register(provider.clone(), vm.clone());
        }
        registry.register(
            KUBERNETES_PROVIDER,
            Arc::new(KubernetesProvider::new(cluster_client)),
        );
        registry
    }

    /// Register `plugin` under `provider`, replacing any previous entry.
    pub fn register(&mut self, provider: impl Into<String>, plugin: Arc<dyn ProviderPlugin>) {
        let provider = provider.into();
        debug!(provider = %provider, kind = plugin.kind(), "Registered provider plugin");
        self.plugins.insert(provider, plugin);
    }

    /// Plugin for `provider`.
    pub fn get(&self, provider: &str) -> Result<Arc<dyn ProviderPlugin>> {
        self.plugins
            .get(provider)
            .cloned()
            .ok_or_else(|| Error::ProviderNotFound(provider.to_string()))
    }

    /// Registered provider names, sorted.
    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Write the post-success node status for `job_action` to `node_ids`.
///
/// Scale-in removes the node rows instead.
pub(crate) async fn reconcile_nodes(
    cluster_client: &dyn ClusterClient,
    job_action: JobAction,
    node_ids: &[String],
) -> Result<()> {
    if node_ids.is_empty() {
        return Ok(());
    }
    match job_action {
        JobAction::DeleteClusterNodes => cluster_client.delete_table_cluster_nodes(node_ids).await,
        action => {
            cluster_client
                .modify_cluster_node_status(node_ids, action.success_status())
                .await
        }
    }
}

fn unsupported(provider: &str, job_action: JobAction) -> Error {
    Error::UnsupportedAction {
        provider: provider.to_string(),
        action: job_action.to_string(),
    }
}
