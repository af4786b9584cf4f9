// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! WLM Core - Workload Group Governance Engine
//!
//! This crate isolates tenants and use-cases of a query-serving node into
//! workload groups. It admits or rejects queries at request start, rewrites
//! their execution settings to the group's caps, keeps per-group statistics,
//! and cancels in-flight work of groups that exceed their resource limits.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Control plane / replication                        │
//! │               (create, update, delete workload groups)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                    │ WorkloadGroupMetadata snapshots
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        WorkloadGroupService                              │
//! │   ArcSwap<metadata>   DashMap<id, WorkloadGroupState>   duress flags     │
//! └─────────────────────────────────────────────────────────────────────────┘
//!           ▲                                              ▲
//!           │ on_request_start / end / failure             │ record usage,
//!           │                                              │ cancel tasks
//! ┌───────────────────────┐                    ┌─────────────────────────────┐
//! │ WorkloadGroupRequest  │                    │  Cancellation sweep         │
//! │ Listener              │                    │  (TaskTracker,              │
//! │ (query pipeline)      │                    │   NodeResourceMonitor)      │
//! └───────────────────────┘                    └─────────────────────────────┘
//! ```
//!
//! # Request lifecycle
//!
//! | Hook | Effect |
//! |------|--------|
//! | `on_request_start` | resolve group from the `wlm_workload_group_id` header, admission check, merge search-setting overrides |
//! | `on_request_end` | count a completion |
//! | `on_request_failure` | count a failure (undefined groups count against the default group) |
//! | `on_phase_end` | record phase timing |
//!
//! # Resiliency modes
//!
//! | Mode | Admission | Sweep |
//! |------|-----------|-------|
//! | `enforced` | rejects over-limit groups while the node is in duress | always cancels |
//! | `soft` | never rejects | cancels only while the node is in duress |
//! | `monitor` | never rejects | logs only |
//!
//! # Configuration
//!
//! See [`config::WlmConfig::from_env`] for the `WLM_*` environment variables.

#![deny(missing_docs)]

/// Configuration loaded from environment variables.
pub mod config;

/// Error types with error code mapping.
pub mod error;

/// Node resources tracked per workload group.
pub mod resource;

/// Closed registry of overridable search settings.
pub mod search_settings;

/// Updatable part of a workload group definition.
pub mod fragment;

/// Workload group definitions.
pub mod group;

/// Snapshots of all defined workload groups.
pub mod metadata;

/// Search request model seen by the lifecycle hooks.
pub mod request;

/// Most-restrictive-wins merge of group overrides into requests.
pub mod merge;

/// Lock-free runtime state per workload group.
pub mod state;

/// Point-in-time statistics.
pub mod stats;

/// Node duress detection.
pub mod duress;

/// Running tasks and node usage sources (traits and mocks).
pub mod tasks;

/// Admission control and accounting.
pub mod service;

/// Request lifecycle hooks.
pub mod listener;

/// Background cancellation sweep.
pub mod cancellation;

/// Embeddable runtime.
pub mod runtime;

pub use config::WlmConfig;
pub use error::WlmError;
