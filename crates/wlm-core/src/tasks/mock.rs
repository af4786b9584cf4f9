// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock task tracker and resource monitor for testing.
//!
//! Tasks are registered by hand with fixed usage figures; cancellations are
//! recorded instead of delivered.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::traits::*;
use crate::resource::ResourceType;

/// Mock task tracker for testing.
pub struct MockTaskTracker {
    tasks: Arc<Mutex<BTreeMap<u64, WorkloadGroupTask>>>,
    cancelled: Arc<Mutex<Vec<(u64, String)>>>,
    stalled_groups: Arc<Mutex<HashSet<String>>>,
    /// If true, a cancelled task disappears from `running_tasks`.
    pub remove_on_cancel: bool,
}

impl Default for MockTaskTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTaskTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(BTreeMap::new())),
            cancelled: Arc::new(Mutex::new(Vec::new())),
            stalled_groups: Arc::new(Mutex::new(HashSet::new())),
            remove_on_cancel: true,
        }
    }

    /// Create a tracker whose cancelled tasks keep running.
    /// This is useful for testing repeated sweeps over the same tasks.
    pub fn sticky() -> Self {
        Self {
            remove_on_cancel: false,
            ..Self::new()
        }
    }

    /// Register a running task.
    pub async fn add_task(&self, task: WorkloadGroupTask) {
        self.tasks.lock().await.insert(task.task_id, task);
    }

    /// Mark a task as finished.
    pub async fn finish_task(&self, task_id: u64) {
        self.tasks.lock().await.remove(&task_id);
    }

    /// Make cancellations of this group's tasks hang forever.
    pub async fn stall_group(&self, workload_group_id: &str) {
        self.stalled_groups
            .lock()
            .await
            .insert(workload_group_id.to_string());
    }

    /// Ids of tasks cancelled so far, in cancellation order.
    pub async fn cancelled_task_ids(&self) -> Vec<u64> {
        self.cancelled.lock().await.iter().map(|(id, _)| *id).collect()
    }

    /// Cancellations with their reasons.
    pub async fn cancellations(&self) -> Vec<(u64, String)> {
        self.cancelled.lock().await.clone()
    }
}

#[async_trait]
impl TaskTracker for MockTaskTracker {
    fn tracker_type(&self) -> &'static str {
        "mock"
    }

    async fn running_tasks(&self) -> Vec<WorkloadGroupTask> {
        self.tasks.lock().await.values().cloned().collect()
    }

    async fn cancel(&self, task_id: u64, reason: &str) -> Result<(), CancellationError> {
        let group = {
            let tasks = self.tasks.lock().await;
            let task = tasks
                .get(&task_id)
                .ok_or(CancellationError::AlreadyFinished(task_id))?;
            task.workload_group_id.clone()
        };

        if let Some(group) = group
            && self.stalled_groups.lock().await.contains(&group)
        {
            std::future::pending::<()>().await;
        }

        self.cancelled
            .lock()
            .await
            .push((task_id, reason.to_string()));
        if self.remove_on_cancel {
            self.tasks.lock().await.remove(&task_id);
        }
        Ok(())
    }
}

/// Mock node resource monitor for testing.
pub struct MockNodeResourceMonitor {
    usage: Mutex<BTreeMap<ResourceType, f64>>,
}

impl Default for MockNodeResourceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNodeResourceMonitor {
    /// A monitor reporting an idle node.
    pub fn new() -> Self {
        Self {
            usage: Mutex::new(BTreeMap::new()),
        }
    }

    /// A monitor reporting fixed usage.
    pub fn with_usage(cpu: f64, memory: f64) -> Self {
        Self {
            usage: Mutex::new(BTreeMap::from([
                (ResourceType::Cpu, cpu),
                (ResourceType::Memory, memory),
            ])),
        }
    }

    /// Change the reported usage.
    pub async fn set_usage(&self, resource: ResourceType, usage: f64) {
        self.usage.lock().await.insert(resource, usage);
    }
}

#[async_trait]
impl NodeResourceMonitor for MockNodeResourceMonitor {
    async fn node_usage(&self) -> BTreeMap<ResourceType, f64> {
        self.usage.lock().await.clone()
    }
}
