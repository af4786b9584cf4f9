// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Point-in-time workload group statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::resource::ResourceType;

/// Filter value selecting every workload group.
pub const ALL_GROUPS: &str = "_all";

/// Usage and enforcement counters for one resource of one group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceStats {
    /// Usage recorded by the latest sweep.
    pub last_recorded_usage: f64,
    /// Smallest recorded usage.
    pub min_usage: f64,
    /// Largest recorded usage.
    pub max_usage: f64,
    /// Mean of recorded usage samples.
    pub mean_usage: f64,
    /// Tasks cancelled for breaching this resource.
    pub cancellations: u64,
    /// Requests rejected for breaching this resource.
    pub rejections: u64,
}

/// Counters of one workload group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadGroupStatsHolder {
    /// Requests that completed.
    pub completions: u64,
    /// Requests rejected at admission.
    pub rejections: u64,
    /// Requests that failed.
    pub failures: u64,
    /// Tasks cancelled by the sweep.
    pub cancellations: u64,
    /// Per-resource stats.
    pub resource_stats: BTreeMap<ResourceType, ResourceStats>,
}

/// Stats of the node's workload groups, keyed by group id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadGroupStats {
    workload_groups: BTreeMap<String, WorkloadGroupStatsHolder>,
}

impl WorkloadGroupStats {
    pub(crate) fn new(workload_groups: BTreeMap<String, WorkloadGroupStatsHolder>) -> Self {
        Self { workload_groups }
    }

    /// Stats of one group.
    pub fn get(&self, id: &str) -> Option<&WorkloadGroupStatsHolder> {
        self.workload_groups.get(id)
    }

    /// Iterate in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &WorkloadGroupStatsHolder)> {
        self.workload_groups.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of groups in the snapshot.
    pub fn len(&self) -> usize {
        self.workload_groups.len()
    }

    /// Whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.workload_groups.is_empty()
    }
}
