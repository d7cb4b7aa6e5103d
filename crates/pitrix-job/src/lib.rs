// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! pitrix-job - Cluster Job Controller
//!
//! This crate runs cluster lifecycle jobs (create, stop, scale, upgrade,
//! ...). Each job is split by a provider plugin into a tree of task layers;
//! the controller dispatches the layers in dependency order, waits for the
//! tasks, and keeps the cluster's status and transition status in step.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                          JobServer::create_job                         │
//! └───────────────────────────────────────────────────────────────────────┘
//!                                   │ insert pending row + enqueue ID
//!                                   ▼
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                            JobQueue (FIFO)                             │
//! └───────────────────────────────────────────────────────────────────────┘
//!                                   │ dequeue (after a permit is free)
//!                                   ▼
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                   JobController (≤ job_length jobs)                    │
//! │  ┌──────────┐   ┌────────────────┐   ┌─────────────────────────────┐  │
//! │  │Processor │   │ ProviderPlugin │   │     TaskLayerExecutor       │  │
//! │  │pre / post│   │ split into     │   │ send layer → wait layer →   │  │
//! │  │finalize  │   │ task layers    │   │ recurse into children       │  │
//! │  └──────────┘   └────────────────┘   └─────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────────────────┘
//!        │                                          │
//!        ▼                                          ▼
//! ┌──────────────────┐                    ┌──────────────────────┐
//! │  ClusterClient   │                    │   TaskService        │
//! │ (cluster tables) │                    │ (tasks table/runner) │
//! └──────────────────┘                    └──────────────────────┘
//! ```
//!
//! # Job lifecycle
//!
//! | Step | What happens |
//! |------|--------------|
//! | claim | status `working`, executor = this host |
//! | pre | cluster transition status set from the action |
//! | split | provider plugin builds the task tree |
//! | walk | layers dispatched and awaited in order |
//! | post | success: node + cluster status, frontgate follow-up; failure: scale-out cleanup |
//! | finalize | transition status cleared, always |
//! | finish | status `successful` or `failed` |
//!
//! # Configuration
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `PITRIX_DATABASE_URL` | required | PostgreSQL or `sqlite:` URL |
//! | `PITRIX_JOB_LENGTH` | 20 | Max concurrent jobs |
//! | `PITRIX_TASK_TIMEOUT_SECS` | 3600 | Default task wait timeout |
//! | `PITRIX_TASK_POLL_INTERVAL_SECS` | 3 | Task status poll interval |
//! | `PITRIX_QUEUE_RETRY_INTERVAL_SECS` | 3 | Sleep after a queue store error |
//! | `PITRIX_QUEUE_POLL_INTERVAL_MS` | 1000 | Re-check interval of an empty queue |
//! | `PITRIX_MAX_UNKNOWN_TASK_STATUS` | 10 | Unknown task statuses tolerated in a row |
//! | `PITRIX_VM_PROVIDERS` | qingcloud,aws,aliyun | Providers using the VM plugin |
//! | `PITRIX_HOSTNAME` | `HOSTNAME` or localhost | Executor identity |
//!
//! # Modules
//!
//! - [`models`]: jobs, tasks, task layers, clusters
//! - [`persistence`]: storage trait with PostgreSQL and SQLite backends
//! - [`queue`]: job ID queue
//! - [`clients`]: task and cluster clients, plus mocks
//! - [`plugins`]: provider plugins and their registry
//! - [`executor`]: task tree walk
//! - [`processor`]: cluster bookkeeping around a job
//! - [`controller`]: bounded-concurrency job loop
//! - [`server`]: job creation and listing
//! - [`runtime`]: embeddable runtime wiring it all together

#![deny(missing_docs)]

pub mod clients;
pub mod config;
pub mod controller;
pub mod error;
pub mod executor;
pub mod migrations;
pub mod models;
pub mod persistence;
pub mod plugins;
pub mod processor;
pub mod queue;
pub mod runtime;
pub mod server;

pub use config::Config;
pub use error::{Error, Result};
