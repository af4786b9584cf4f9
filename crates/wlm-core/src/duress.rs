// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Node duress detection.
//!
//! A resource is in duress after its node-level usage stayed at or above the
//! threshold for `streak` consecutive samples. The node is in duress while any
//! resource is. Samples are fed by the cancellation sweep; admission reads the
//! flag without locking.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tracing::{info, warn};

use crate::resource::ResourceType;

/// Thresholds for duress detection.
#[derive(Debug, Clone, PartialEq)]
pub struct DuressSettings {
    /// Node CPU usage ratio considered breaching.
    pub cpu_threshold: f64,
    /// Node memory usage ratio considered breaching.
    pub memory_threshold: f64,
    /// Consecutive breaching samples before a resource is in duress.
    pub streak: u32,
}

impl Default for DuressSettings {
    fn default() -> Self {
        Self {
            cpu_threshold: 0.9,
            memory_threshold: 0.9,
            streak: 3,
        }
    }
}

impl DuressSettings {
    /// Threshold for one resource.
    pub fn threshold(&self, resource: ResourceType) -> f64 {
        match resource {
            ResourceType::Cpu => self.cpu_threshold,
            ResourceType::Memory => self.memory_threshold,
        }
    }
}

/// Tracks breaching streaks per resource.
#[derive(Debug)]
pub struct NodeDuressTracker {
    settings: DuressSettings,
    streaks: [AtomicU32; 2],
    in_duress: AtomicBool,
}

impl NodeDuressTracker {
    /// Create a tracker; the node starts out healthy.
    pub fn new(settings: DuressSettings) -> Self {
        Self {
            settings,
            streaks: Default::default(),
            in_duress: AtomicBool::new(false),
        }
    }

    /// The thresholds in use.
    pub fn settings(&self) -> &DuressSettings {
        &self.settings
    }

    /// Feed one node usage sample and return whether the node is in duress.
    ///
    /// A resource missing from the sample counts as not breaching.
    pub fn record(&self, usage: &BTreeMap<ResourceType, f64>) -> bool {
        for resource in ResourceType::ALL {
            let streak = &self.streaks[resource.index()];
            let breaching = usage
                .get(&resource)
                .is_some_and(|u| *u >= self.settings.threshold(resource));
            if breaching {
                let _ = streak.fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                    Some(s.saturating_add(1))
                });
            } else {
                streak.store(0, Ordering::Release);
            }
        }

        let in_duress = ResourceType::ALL
            .into_iter()
            .any(|r| self.resource_in_duress(r));
        let was_in_duress = self.in_duress.swap(in_duress, Ordering::AcqRel);
        if in_duress && !was_in_duress {
            warn!(?usage, "Node entered duress");
        } else if !in_duress && was_in_duress {
            info!(?usage, "Node left duress");
        }
        in_duress
    }

    /// Whether one resource is in duress.
    pub fn resource_in_duress(&self, resource: ResourceType) -> bool {
        self.streaks[resource.index()].load(Ordering::Acquire) >= self.settings.streak
    }

    /// Whether the node is in duress.
    pub fn is_node_in_duress(&self) -> bool {
        self.in_duress.load(Ordering::Acquire)
    }
}
