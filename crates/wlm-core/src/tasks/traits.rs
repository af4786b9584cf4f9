// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task tracking trait definitions.
//!
//! Resource usage is measured elsewhere; these traits only hand already
//! measured numbers to the sweep and carry its cancellation requests back.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resource::ResourceType;

/// Errors from cancelling a task.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CancellationError {
    /// The task finished before the cancellation arrived.
    #[error("Task {0} already finished")]
    AlreadyFinished(u64),

    /// The task is unknown to the tracker.
    #[error("Task {0} not found")]
    NotFound(u64),

    /// The cancellation could not be delivered.
    #[error("Cancellation channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// Other error.
    #[error("Other: {0}")]
    Other(String),
}

impl CancellationError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyFinished(_) => "TASK_ALREADY_FINISHED",
            Self::NotFound(_) => "TASK_NOT_FOUND",
            Self::ChannelUnavailable(_) => "CHANNEL_UNAVAILABLE",
            Self::Other(_) => "CANCELLATION_FAILED",
        }
    }
}

/// A running search task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadGroupTask {
    /// Task id, unique on the node.
    pub task_id: u64,
    /// Workload group header of the request that spawned the task.
    pub workload_group_id: Option<String>,
    /// Usage as a fraction of the node, per resource.
    pub resource_usage: BTreeMap<ResourceType, f64>,
}

impl WorkloadGroupTask {
    /// Create a task with no usage recorded.
    pub fn new(task_id: u64, workload_group_id: Option<&str>) -> Self {
        Self {
            task_id,
            workload_group_id: workload_group_id.map(str::to_string),
            resource_usage: BTreeMap::new(),
        }
    }

    /// Set the usage of one resource.
    pub fn with_usage(mut self, resource: ResourceType, usage: f64) -> Self {
        self.resource_usage.insert(resource, usage);
        self
    }

    /// Usage of one resource; zero when not measured.
    pub fn usage(&self, resource: ResourceType) -> f64 {
        self.resource_usage.get(&resource).copied().unwrap_or(0.0)
    }
}

/// Source of running tasks and sink for cancellations.
#[async_trait]
pub trait TaskTracker: Send + Sync {
    /// Tracker type identifier (e.g., "mock")
    fn tracker_type(&self) -> &'static str;

    /// Snapshot of the tasks currently running on the node.
    async fn running_tasks(&self) -> Vec<WorkloadGroupTask>;

    /// Request cancellation of a task.
    ///
    /// Fire-and-forget: returning `Ok` only means the request was delivered.
    async fn cancel(&self, task_id: u64, reason: &str) -> Result<(), CancellationError>;
}

/// Source of node-level usage ratios.
#[async_trait]
pub trait NodeResourceMonitor: Send + Sync {
    /// Current node usage as a fraction of capacity, per resource.
    async fn node_usage(&self) -> BTreeMap<ResourceType, f64>;
}
