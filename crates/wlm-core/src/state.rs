// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runtime state of workload groups on this node.
//!
//! Every counter is an atomic cell; floating-point samples are stored as their
//! bit patterns in an `AtomicU64` and merged with compare-and-swap loops. A
//! snapshot taken while requests are in flight may mix values from slightly
//! different moments, but every individual counter is exact.
//!
//! States live in a [`DashMap`] keyed by group id. Removal is two-phase: a
//! group that disappears from the definitions is first marked retired, and a
//! later sweep drops it once it is idle.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::debug;

use crate::group::DEFAULT_WORKLOAD_GROUP_ID;
use crate::resource::ResourceType;
use crate::stats::{ALL_GROUPS, ResourceStats, WorkloadGroupStats, WorkloadGroupStatsHolder};

/// An `f64` cell supporting atomic read-modify-write.
#[derive(Debug)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    fn update(&self, f: impl Fn(f64) -> f64) {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = f(f64::from_bits(current)).to_bits();
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Usage samples and enforcement counters for one resource.
#[derive(Debug)]
pub struct ResourceState {
    last_recorded_usage: AtomicF64,
    min_usage: AtomicF64,
    max_usage: AtomicF64,
    usage_sum: AtomicF64,
    samples: AtomicU64,
    cancellations: AtomicU64,
    rejections: AtomicU64,
}

impl Default for ResourceState {
    fn default() -> Self {
        Self {
            last_recorded_usage: AtomicF64::new(0.0),
            min_usage: AtomicF64::new(f64::INFINITY),
            max_usage: AtomicF64::new(0.0),
            usage_sum: AtomicF64::new(0.0),
            samples: AtomicU64::new(0),
            cancellations: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }
}

impl ResourceState {
    /// Record a usage sample.
    pub fn record_usage(&self, usage: f64) {
        if usage.is_nan() {
            return;
        }
        self.last_recorded_usage.store(usage);
        self.min_usage.update(|m| m.min(usage));
        self.max_usage.update(|m| m.max(usage));
        self.usage_sum.update(|s| s + usage);
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Usage recorded by the latest sample.
    pub fn last_recorded_usage(&self) -> f64 {
        self.last_recorded_usage.load()
    }

    /// Count a cancellation attributed to this resource.
    pub fn increment_cancellations(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a rejection attributed to this resource.
    pub fn increment_rejections(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time stats.
    pub fn snapshot(&self) -> ResourceStats {
        let samples = self.samples.load(Ordering::Relaxed);
        let (min_usage, mean_usage) = if samples == 0 {
            (0.0, 0.0)
        } else {
            (
                self.min_usage.load(),
                self.usage_sum.load() / samples as f64,
            )
        };
        ResourceStats {
            last_recorded_usage: self.last_recorded_usage.load(),
            min_usage,
            max_usage: self.max_usage.load(),
            mean_usage,
            cancellations: self.cancellations.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
        }
    }
}

/// Counters of one workload group on this node.
#[derive(Debug, Default)]
pub struct WorkloadGroupState {
    completions: AtomicU64,
    rejections: AtomicU64,
    failures: AtomicU64,
    cancellations: AtomicU64,
    resources: [ResourceState; 2],
    retired: AtomicBool,
}

impl WorkloadGroupState {
    /// Count a completed request.
    pub fn increment_completions(&self) {
        self.completions.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a rejected request.
    pub fn increment_rejections(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed request.
    pub fn increment_failures(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a cancelled task.
    pub fn increment_cancellations(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
    }

    /// Completed requests so far.
    pub fn completions(&self) -> u64 {
        self.completions.load(Ordering::Relaxed)
    }

    /// Rejected requests so far.
    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }

    /// Failed requests so far.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Cancelled tasks so far.
    pub fn cancellations(&self) -> u64 {
        self.cancellations.load(Ordering::Relaxed)
    }

    /// State of one resource.
    pub fn resource(&self, resource: ResourceType) -> &ResourceState {
        &self.resources[resource.index()]
    }

    /// Whether the group was removed from the definitions.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    fn set_retired(&self, retired: bool) {
        self.retired.store(retired, Ordering::Release);
    }

    /// Point-in-time stats, optionally restricted to one resource.
    pub fn snapshot(&self, resource_filter: Option<ResourceType>) -> WorkloadGroupStatsHolder {
        let resource_stats = ResourceType::ALL
            .into_iter()
            .filter(|r| resource_filter.is_none_or(|f| f == *r))
            .map(|r| (r, self.resource(r).snapshot()))
            .collect();
        WorkloadGroupStatsHolder {
            completions: self.completions(),
            rejections: self.rejections(),
            failures: self.failures(),
            cancellations: self.cancellations(),
            resource_stats,
        }
    }
}

/// Concurrent map of group id to state.
#[derive(Debug)]
pub struct WorkloadGroupsStateAccessor {
    states: DashMap<String, Arc<WorkloadGroupState>>,
}

impl Default for WorkloadGroupsStateAccessor {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkloadGroupsStateAccessor {
    /// A map holding only the default group's state.
    pub fn new() -> Self {
        let states = DashMap::new();
        states.insert(
            DEFAULT_WORKLOAD_GROUP_ID.to_string(),
            Arc::new(WorkloadGroupState::default()),
        );
        Self { states }
    }

    /// State of a group, if tracked.
    pub fn get(&self, id: &str) -> Option<Arc<WorkloadGroupState>> {
        self.states.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Create or revive the state of a newly defined group.
    ///
    /// Only the definitions applier calls this; request and sweep paths look
    /// states up and never clear the retired mark.
    pub fn revive(&self, id: &str) -> Arc<WorkloadGroupState> {
        let entry = self.states.entry(id.to_string()).or_default();
        entry.value().set_retired(false);
        Arc::clone(entry.value())
    }

    /// State of a group, or the default group's when it is not tracked.
    pub fn get_or_default(&self, id: &str) -> Arc<WorkloadGroupState> {
        self.get(id).unwrap_or_else(|| self.default_state())
    }

    /// The default group's state.
    pub fn default_state(&self) -> Arc<WorkloadGroupState> {
        Arc::clone(
            self.states
                .entry(DEFAULT_WORKLOAD_GROUP_ID.to_string())
                .or_default()
                .value(),
        )
    }

    /// Mark a group for removal. The default group is never retired.
    pub fn retire(&self, id: &str) -> bool {
        if id == DEFAULT_WORKLOAD_GROUP_ID {
            return false;
        }
        match self.states.get(id) {
            Some(entry) => {
                entry.value().set_retired(true);
                true
            }
            None => false,
        }
    }

    /// Drop retired states that are idle.
    ///
    /// A state is dropped only when no task of its group is running (`busy`)
    /// and no other holder keeps a reference to it. Returns the dropped ids.
    pub fn purge_retired(&self, busy: &HashSet<String>) -> Vec<String> {
        let candidates: Vec<String> = self
            .states
            .iter()
            .filter(|entry| entry.value().is_retired() && !busy.contains(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        let mut purged = Vec::new();
        for id in candidates {
            let removed = self
                .states
                .remove_if(&id, |_, state| state.is_retired() && Arc::strong_count(state) == 1);
            if removed.is_some() {
                debug!(workload_group_id = %id, "Purged retired workload group state");
                purged.push(id);
            }
        }
        purged
    }

    /// Ids of all tracked groups.
    pub fn ids(&self) -> Vec<String> {
        self.states.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of tracked groups.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether nothing is tracked. Never true while the default group exists.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Stats for the requested ids (or [`ALL_GROUPS`]). Unknown ids are omitted.
    pub fn stats(
        &self,
        ids: &HashSet<String>,
        resource_filter: Option<ResourceType>,
    ) -> WorkloadGroupStats {
        let groups: BTreeMap<String, WorkloadGroupStatsHolder> = if ids.contains(ALL_GROUPS) {
            self.states
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().snapshot(resource_filter)))
                .collect()
        } else {
            ids.iter()
                .filter_map(|id| {
                    self.get(id)
                        .map(|state| (id.clone(), state.snapshot(resource_filter)))
                })
                .collect()
        };
        WorkloadGroupStats::new(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_samples() {
        let state = ResourceState::default();
        assert_eq!(state.snapshot(), ResourceStats::default());

        state.record_usage(0.2);
        state.record_usage(0.6);
        state.record_usage(0.4);
        state.record_usage(f64::NAN);

        let stats = state.snapshot();
        assert_eq!(stats.last_recorded_usage, 0.4);
        assert_eq!(stats.min_usage, 0.2);
        assert_eq!(stats.max_usage, 0.6);
        assert!((stats.mean_usage - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_default_group_always_present() {
        let accessor = WorkloadGroupsStateAccessor::new();
        assert!(accessor.get(DEFAULT_WORKLOAD_GROUP_ID).is_some());
        assert!(!accessor.retire(DEFAULT_WORKLOAD_GROUP_ID));

        let state = accessor.get_or_default("missing");
        state.increment_failures();
        assert_eq!(accessor.default_state().failures(), 1);
        assert!(accessor.get("missing").is_none());
    }

    #[test]
    fn test_retire_and_purge() {
        let accessor = WorkloadGroupsStateAccessor::new();
        accessor.revive("a");
        accessor.revive("b");
        accessor.revive("c");
        assert!(accessor.retire("a"));
        assert!(accessor.retire("b"));
        assert!(accessor.retire("c"));
        assert!(!accessor.retire("unknown"));

        let held = accessor.get("c").unwrap();
        let busy = HashSet::from(["b".to_string()]);

        let purged = accessor.purge_retired(&busy);
        assert_eq!(purged, vec!["a".to_string()]);
        assert!(accessor.get("b").is_some());

        drop(held);
        let mut purged = accessor.purge_retired(&HashSet::new());
        purged.sort();
        assert_eq!(purged, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(accessor.ids(), vec![DEFAULT_WORKLOAD_GROUP_ID.to_string()]);
    }

    #[test]
    fn test_revive_keeps_counters() {
        let accessor = WorkloadGroupsStateAccessor::new();
        accessor.revive("a").increment_completions();
        accessor.retire("a");
        assert!(accessor.get("a").unwrap().is_retired());

        let revived = accessor.revive("a");
        assert!(!revived.is_retired());
        assert_eq!(revived.completions(), 1);
        drop(revived);
        assert!(accessor.purge_retired(&HashSet::new()).is_empty());
    }

    #[test]
    fn test_lookups_never_revive() {
        let accessor = WorkloadGroupsStateAccessor::new();
        accessor.revive("a");
        accessor.retire("a");

        let state = accessor.get_or_default("a");
        assert!(state.is_retired());
        assert!(accessor.get("a").unwrap().is_retired());
        drop(state);

        assert_eq!(accessor.purge_retired(&HashSet::new()), vec!["a".to_string()]);
        assert!(Arc::ptr_eq(&accessor.get_or_default("a"), &accessor.default_state()));
    }

    #[test]
    fn test_stats_filters() {
        let accessor = WorkloadGroupsStateAccessor::new();
        let state = accessor.revive("a");
        state.increment_rejections();
        state.resource(ResourceType::Cpu).increment_rejections();

        let all = accessor.stats(&HashSet::from([ALL_GROUPS.to_string()]), None);
        assert_eq!(all.len(), 2);

        let some = accessor.stats(
            &HashSet::from(["a".to_string(), "nope".to_string()]),
            Some(ResourceType::Cpu),
        );
        assert_eq!(some.len(), 1);
        let holder = some.get("a").unwrap();
        assert_eq!(holder.rejections, 1);
        assert_eq!(holder.resource_stats.len(), 1);
        assert_eq!(holder.resource_stats[&ResourceType::Cpu].rejections, 1);

        assert!(accessor.stats(&HashSet::from(["nope".to_string()]), None).is_empty());
    }
}
