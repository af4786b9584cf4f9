// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for wlm-core integration tests.
//!
//! Provides TestContext wiring a service, listener and sweep over mock
//! collaborators.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use wlm_core::cancellation::{CancellationServiceConfig, WorkloadGroupTaskCancellationService};
use wlm_core::config::{WlmConfig, WlmMode};
use wlm_core::duress::DuressSettings;
use wlm_core::fragment::{MutableWorkloadGroupFragment, ResiliencyMode, ResourceLimits};
use wlm_core::group::WorkloadGroup;
use wlm_core::listener::WorkloadGroupRequestListener;
use wlm_core::metadata::WorkloadGroupMetadata;
use wlm_core::resource::ResourceType;
use wlm_core::service::WorkloadGroupService;
use wlm_core::tasks::{MockNodeResourceMonitor, MockTaskTracker, WorkloadGroupTask};

/// Build a group with a fixed id (also used as its name).
pub fn group(
    id: &str,
    mode: ResiliencyMode,
    limits: &[(ResourceType, f64)],
    settings: Option<&[(&str, &str)]>,
) -> WorkloadGroup {
    let settings = settings.map(|entries| {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>()
    });
    let fragment = MutableWorkloadGroupFragment::new(
        Some(mode),
        limits.iter().copied().collect::<ResourceLimits>(),
        settings,
    )
    .expect("valid fragment");
    WorkloadGroup::new(id, id, fragment, Utc::now()).expect("valid group")
}

/// A task of `group` with the given usage.
pub fn task(id: u64, group: Option<&str>, cpu: f64, memory: f64) -> WorkloadGroupTask {
    WorkloadGroupTask::new(id, group)
        .with_usage(ResourceType::Cpu, cpu)
        .with_usage(ResourceType::Memory, memory)
}

/// Config with a one-sample duress streak and a short group timeout.
pub fn test_config(mode: WlmMode) -> WlmConfig {
    WlmConfig {
        mode,
        sweep_interval: Duration::from_millis(50),
        group_sweep_timeout: Duration::from_millis(100),
        duress: DuressSettings {
            cpu_threshold: 0.9,
            memory_threshold: 0.9,
            streak: 1,
        },
    }
}

/// Service, listener and sweep over mock collaborators.
pub struct TestContext {
    pub service: Arc<WorkloadGroupService>,
    pub listener: WorkloadGroupRequestListener,
    pub tracker: Arc<MockTaskTracker>,
    pub monitor: Arc<MockNodeResourceMonitor>,
    pub sweeper: WorkloadGroupTaskCancellationService,
}

impl TestContext {
    /// Create a context in the given mode with the given groups defined.
    pub fn new(mode: WlmMode, groups: Vec<WorkloadGroup>) -> Self {
        Self::with_tracker(mode, groups, MockTaskTracker::new())
    }

    /// Same as `new` with a custom tracker.
    pub fn with_tracker(
        mode: WlmMode,
        groups: Vec<WorkloadGroup>,
        tracker: MockTaskTracker,
    ) -> Self {
        let config = test_config(mode);
        let service = Arc::new(WorkloadGroupService::new(&config));
        service.apply_metadata(WorkloadGroupMetadata::new(groups));

        let tracker = Arc::new(tracker);
        let monitor = Arc::new(MockNodeResourceMonitor::new());
        let sweeper = WorkloadGroupTaskCancellationService::new(
            service.clone(),
            tracker.clone(),
            monitor.clone(),
            CancellationServiceConfig::from(&config),
        );

        Self {
            listener: WorkloadGroupRequestListener::new(service.clone()),
            service,
            tracker,
            monitor,
            sweeper,
        }
    }

    /// Report node CPU usage above the duress threshold.
    pub async fn stress_node(&self) {
        self.monitor.set_usage(ResourceType::Cpu, 0.95).await;
    }

    /// Report node CPU usage below the duress threshold.
    pub async fn relax_node(&self) {
        self.monitor.set_usage(ResourceType::Cpu, 0.1).await;
    }
}
