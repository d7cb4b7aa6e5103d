// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain models for jobs, tasks, task layers and clusters.

mod cluster;
mod job;
mod task;
mod task_layer;

pub use cluster::*;
pub use job::*;
pub use task::*;
pub use task_layer::*;

/// Generate a prefixed short identifier (`j-1a2b3c4d5e6f`).
pub(crate) fn new_id(prefix: &str) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &uuid[..12])
}
