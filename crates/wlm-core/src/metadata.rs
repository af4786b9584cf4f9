// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Replicated workload group definitions.
//!
//! A [`WorkloadGroupMetadata`] is an immutable snapshot. Mutations return a new
//! snapshot, which is then published to the engine with
//! [`WorkloadGroupService::apply_metadata`](crate::service::WorkloadGroupService::apply_metadata).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WlmError};
use crate::fragment::MutableWorkloadGroupFragment;
use crate::group::{DEFAULT_WORKLOAD_GROUP_ID, WorkloadGroup};
use crate::resource::ResourceType;

/// Allowed rounding slack when summing limits.
const LIMIT_SUM_TOLERANCE: f64 = 1e-9;

/// Snapshot of every defined workload group, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadGroupMetadata {
    workload_groups: HashMap<String, WorkloadGroup>,
}

impl WorkloadGroupMetadata {
    /// Build a snapshot without control-plane checks.
    ///
    /// Definitions arriving from replication were already validated by the
    /// node that accepted them.
    pub fn new(groups: impl IntoIterator<Item = WorkloadGroup>) -> Self {
        Self {
            workload_groups: groups
                .into_iter()
                .map(|g| (g.id().to_string(), g))
                .collect(),
        }
    }

    /// Build a snapshot, enforcing name uniqueness and limit sums.
    pub fn validated(groups: impl IntoIterator<Item = WorkloadGroup>) -> Result<Self> {
        groups
            .into_iter()
            .try_fold(Self::default(), |metadata, group| metadata.with_group(group))
    }

    /// Look up a group by id.
    pub fn get(&self, id: &str) -> Option<&WorkloadGroup> {
        self.workload_groups.get(id)
    }

    /// Whether a group with this id is defined.
    pub fn contains(&self, id: &str) -> bool {
        self.workload_groups.contains_key(id)
    }

    /// Look up a group by name.
    pub fn find_by_name(&self, name: &str) -> Option<&WorkloadGroup> {
        self.workload_groups.values().find(|g| g.name() == name)
    }

    /// Iterate over all groups.
    pub fn groups(&self) -> impl Iterator<Item = &WorkloadGroup> {
        self.workload_groups.values()
    }

    /// Ids of all groups.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.workload_groups.keys().map(String::as_str)
    }

    /// Number of defined groups.
    pub fn len(&self) -> usize {
        self.workload_groups.len()
    }

    /// Whether no group is defined.
    pub fn is_empty(&self) -> bool {
        self.workload_groups.is_empty()
    }

    /// Add a new group.
    pub fn with_group(&self, group: WorkloadGroup) -> Result<Self> {
        if self.find_by_name(group.name()).is_some() {
            return Err(WlmError::invalid_argument(
                "name",
                format!("workload group with name [{}] already exists", group.name()),
            ));
        }
        if self.contains(group.id()) {
            return Err(WlmError::invalid_argument(
                "_id",
                format!("workload group with id [{}] already exists", group.id()),
            ));
        }
        let mut next = self.clone();
        next.workload_groups.insert(group.id().to_string(), group);
        next.validate_limit_sums()?;
        Ok(next)
    }

    /// Apply a partial update to the group called `name`.
    pub fn with_updated_group(
        &self,
        name: &str,
        update: &MutableWorkloadGroupFragment,
    ) -> Result<Self> {
        let current = self.find_by_name(name).ok_or_else(|| not_found(name))?;
        let updated = current.updated(update)?;
        let mut next = self.clone();
        next.workload_groups.insert(updated.id().to_string(), updated);
        next.validate_limit_sums()?;
        Ok(next)
    }

    /// Remove the group called `name`.
    pub fn without_group(&self, name: &str) -> Result<Self> {
        let id = self
            .find_by_name(name)
            .map(|g| g.id().to_string())
            .ok_or_else(|| not_found(name))?;
        let mut next = self.clone();
        next.workload_groups.remove(&id);
        Ok(next)
    }

    /// Check that, per resource, limits of non-default groups sum to at most 1.0.
    pub fn validate_limit_sums(&self) -> Result<()> {
        for resource in ResourceType::ALL {
            let total = self.allocated(resource);
            if total > 1.0 + LIMIT_SUM_TOLERANCE {
                return Err(WlmError::invalid_argument(
                    "resource_limits",
                    format!(
                        "Total resource allocation for {} will go above the max limit of 1.0 ({})",
                        resource, total
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Sum of one resource's limits across non-default groups.
    pub fn allocated(&self, resource: ResourceType) -> f64 {
        self.workload_groups
            .values()
            .filter(|g| g.id() != DEFAULT_WORKLOAD_GROUP_ID)
            .filter_map(|g| g.resource_limit(resource))
            .sum()
    }
}

fn not_found(name: &str) -> WlmError {
    WlmError::invalid_argument("name", format!("workload group [{}] not found", name))
}
