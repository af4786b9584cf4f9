// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workload group service - admission control and per-group accounting.
//!
//! The service owns the current definitions snapshot and the runtime state map.
//! Request threads read the snapshot through an [`ArcSwap`] and touch only
//! atomic counters, so admission never waits on the sweep or on a definitions
//! update.

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, info, warn};

use crate::config::{WlmConfig, WlmMode};
use crate::duress::NodeDuressTracker;
use crate::error::{Result, WlmError};
use crate::fragment::ResiliencyMode;
use crate::group::DEFAULT_WORKLOAD_GROUP_ID;
use crate::metadata::WorkloadGroupMetadata;
use crate::resource::ResourceType;
use crate::state::{WorkloadGroupState, WorkloadGroupsStateAccessor};
use crate::stats::WorkloadGroupStats;

/// Admission control and accounting for workload groups.
pub struct WorkloadGroupService {
    mode: WlmMode,
    metadata: ArcSwap<WorkloadGroupMetadata>,
    state: WorkloadGroupsStateAccessor,
    duress: NodeDuressTracker,
}

impl WorkloadGroupService {
    /// Create a service with no groups defined.
    pub fn new(config: &WlmConfig) -> Self {
        Self {
            mode: config.mode,
            metadata: ArcSwap::from_pointee(WorkloadGroupMetadata::default()),
            state: WorkloadGroupsStateAccessor::new(),
            duress: NodeDuressTracker::new(config.duress.clone()),
        }
    }

    /// The node-wide WLM mode.
    pub fn mode(&self) -> WlmMode {
        self.mode
    }

    /// The current definitions snapshot.
    pub fn metadata(&self) -> Arc<WorkloadGroupMetadata> {
        self.metadata.load_full()
    }

    /// The runtime state map.
    pub fn state_accessor(&self) -> &WorkloadGroupsStateAccessor {
        &self.state
    }

    /// The node duress tracker.
    pub fn duress_tracker(&self) -> &NodeDuressTracker {
        &self.duress
    }

    /// Publish a new definitions snapshot.
    ///
    /// New groups get state, re-created groups are revived, and groups missing
    /// from the snapshot are retired for a later sweep to purge. Snapshots are
    /// expected from a single control-plane applier.
    pub fn apply_metadata(&self, metadata: WorkloadGroupMetadata) {
        let metadata = Arc::new(metadata);
        for id in metadata.ids() {
            self.state.revive(id);
        }
        let previous = self.metadata.swap(Arc::clone(&metadata));

        let mut retired = 0;
        for id in self.state.ids() {
            if !metadata.contains(&id) && self.state.retire(&id) {
                retired += 1;
            }
        }

        info!(
            groups = metadata.len(),
            previous_groups = previous.len(),
            retired,
            "Applied workload group metadata"
        );
    }

    /// The id a request is accounted under: its own if defined, else the default.
    pub fn resolve_group_id<'a>(
        &self,
        workload_group_id: Option<&'a str>,
        metadata: &WorkloadGroupMetadata,
    ) -> &'a str {
        match workload_group_id {
            Some(id) if metadata.contains(id) => id,
            _ => DEFAULT_WORKLOAD_GROUP_ID,
        }
    }

    fn state_for(&self, workload_group_id: Option<&str>) -> Arc<WorkloadGroupState> {
        let metadata = self.metadata.load();
        match workload_group_id {
            Some(id) if metadata.contains(id) => self.state.get_or_default(id),
            _ => self.state.default_state(),
        }
    }

    /// Reject the request if its group is contended.
    ///
    /// Only enforced groups reject, only while WLM is enabled and the node is in
    /// duress, and only when the group's last recorded usage exceeds a limit.
    /// Undefined groups are admitted. The decision uses `metadata`, the
    /// snapshot the caller loaded for this request.
    pub fn reject_if_needed(
        &self,
        workload_group_id: Option<&str>,
        metadata: &WorkloadGroupMetadata,
    ) -> Result<()> {
        if !self.mode.is_enforcing() {
            return Ok(());
        }
        let id = workload_group_id.unwrap_or(DEFAULT_WORKLOAD_GROUP_ID);
        let Some(group) = metadata.get(id) else {
            return Ok(());
        };
        if group.resiliency_mode() != ResiliencyMode::Enforced || !self.duress.is_node_in_duress()
        {
            return Ok(());
        }

        let Some(state) = self.state.get(id) else {
            return Ok(());
        };
        let breached = ResourceType::ALL.into_iter().find_map(|resource| {
            let limit = group.resource_limit(resource)?;
            let usage = state.resource(resource).last_recorded_usage();
            (usage > limit).then_some((resource, limit, usage))
        });

        match breached {
            Some((resource, limit, usage)) => {
                state.increment_rejections();
                state.resource(resource).increment_rejections();
                warn!(
                    workload_group_id = %id,
                    resource = %resource,
                    limit,
                    usage,
                    "Rejecting request for contended workload group"
                );
                Err(WlmError::AdmissionRejected {
                    workload_group_id: id.to_string(),
                    reason: format!(
                        "{} limit is breaching for enforced workload group: ({} < {}).",
                        resource, limit, usage
                    ),
                })
            }
            None => Ok(()),
        }
    }

    /// Count a failed request against its group (or the default group).
    pub fn increment_failures_for(&self, workload_group_id: Option<&str>) {
        self.state_for(workload_group_id).increment_failures();
        debug!(workload_group_id = ?workload_group_id, "Recorded request failure");
    }

    /// Count a completed request against its group (or the default group).
    pub fn increment_completions_for(&self, workload_group_id: Option<&str>) {
        self.state_for(workload_group_id).increment_completions();
    }

    /// Point-in-time stats for the requested ids (or `_all`).
    pub fn node_stats(
        &self,
        ids: &HashSet<String>,
        resource_filter: Option<ResourceType>,
    ) -> WorkloadGroupStats {
        self.state.stats(ids, resource_filter)
    }
}
