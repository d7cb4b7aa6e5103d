// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Clients for the services the job engine drives.
//!
//! - [`TaskService`] / [`TaskClient`]: dispatch tasks and poll them to completion
//! - [`ClusterClient`]: cluster and node status writes
//!
//! Persistence-backed implementations are used in production; [`mock`]
//! provides scriptable doubles for tests.

mod cluster;
pub mod mock;
mod task;

pub use cluster::{ClusterClient, PersistenceClusterClient};
pub use task::{PersistenceTaskService, TaskClient, TaskClientConfig, TaskService};
