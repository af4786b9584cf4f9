// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background worker that cancels work of groups over their limits.
//!
//! Every sweep samples node usage, records each group's usage (the sum of its
//! tasks' usage), then acts on groups over a limit according to their
//! resiliency mode:
//! - monitor (or WLM `monitor_only`): log the tasks that would be cancelled
//! - soft: cancel only while the node is in duress
//! - enforced: always cancel
//!
//! Tasks are picked greedily, highest usage of the breached resource first,
//! until the group is back within its limit. Cancellation is fire-and-forget;
//! a task that already finished is a no-op. Each group's cancellation work is
//! bounded by a timeout so one stalled group cannot hold up the others.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::config::{WlmConfig, WlmMode};
use crate::fragment::ResiliencyMode;
use crate::group::WorkloadGroup;
use crate::resource::ResourceType;
use crate::service::WorkloadGroupService;
use crate::state::WorkloadGroupState;
use crate::tasks::{NodeResourceMonitor, TaskTracker, WorkloadGroupTask};

/// Configuration for the cancellation sweep.
#[derive(Debug, Clone)]
pub struct CancellationServiceConfig {
    /// How often to sweep.
    pub sweep_interval: Duration,
    /// Bound on one group's cancellation work.
    pub group_timeout: Duration,
}

impl Default for CancellationServiceConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(1),
            group_timeout: Duration::from_millis(500),
        }
    }
}

impl From<&WlmConfig> for CancellationServiceConfig {
    fn from(config: &WlmConfig) -> Self {
        Self {
            sweep_interval: config.sweep_interval,
            group_timeout: config.group_sweep_timeout,
        }
    }
}

/// A task picked for cancellation.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskCancellation {
    /// The task.
    pub task_id: u64,
    /// Group the task is accounted under.
    pub workload_group_id: String,
    /// The breached resource the task was picked for.
    pub resource: ResourceType,
    /// Human readable reason, passed to the tracker.
    pub reason: String,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Whether the node was in duress during the sweep.
    pub node_in_duress: bool,
    /// Cancellations delivered to the tracker.
    pub cancelled: Vec<TaskCancellation>,
    /// Cancellations that were only logged.
    pub would_cancel: Vec<TaskCancellation>,
    /// Groups whose cancellation work timed out.
    pub failed_groups: Vec<String>,
    /// Retired group states dropped by this sweep.
    pub purged_groups: Vec<String>,
}

impl SweepReport {
    /// Ids of cancelled tasks.
    pub fn cancelled_task_ids(&self) -> Vec<u64> {
        self.cancelled.iter().map(|c| c.task_id).collect()
    }
}

enum BreachAction {
    Log,
    Skip,
    Cancel,
}

/// Background worker that cancels tasks of groups over their limits.
pub struct WorkloadGroupTaskCancellationService {
    service: Arc<WorkloadGroupService>,
    tracker: Arc<dyn TaskTracker>,
    monitor: Arc<dyn NodeResourceMonitor>,
    config: CancellationServiceConfig,
    shutdown: Arc<Notify>,
}

impl WorkloadGroupTaskCancellationService {
    /// Create a new cancellation service.
    pub fn new(
        service: Arc<WorkloadGroupService>,
        tracker: Arc<dyn TaskTracker>,
        monitor: Arc<dyn NodeResourceMonitor>,
        config: CancellationServiceConfig,
    ) -> Self {
        Self {
            service,
            tracker,
            monitor,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle that can be used to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the sweep loop until the shutdown signal is received.
    pub async fn run(&self) {
        info!(
            sweep_interval_ms = self.config.sweep_interval.as_millis() as u64,
            group_timeout_ms = self.config.group_timeout.as_millis() as u64,
            tracker = self.tracker.tracker_type(),
            "Workload group cancellation service started"
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.notified() => {
                    info!("Cancellation service received shutdown signal");
                    break;
                }

                _ = tokio::time::sleep(self.config.sweep_interval) => {
                    let report = self.sweep().await;
                    if !report.cancelled.is_empty() || !report.failed_groups.is_empty() {
                        info!(
                            cancelled = report.cancelled.len(),
                            failed_groups = report.failed_groups.len(),
                            node_in_duress = report.node_in_duress,
                            "Cancellation sweep finished"
                        );
                    }
                }
            }
        }

        info!("Workload group cancellation service stopped");
    }

    /// Run one sweep.
    pub async fn sweep(&self) -> SweepReport {
        let node_usage = self.monitor.node_usage().await;
        let node_in_duress = self.service.duress_tracker().record(&node_usage);
        let metadata = self.service.metadata();
        let state = self.service.state_accessor();
        let tasks = self.tracker.running_tasks().await;

        let busy: HashSet<String> = tasks
            .iter()
            .filter_map(|t| t.workload_group_id.clone())
            .collect();

        let mut by_group: HashMap<&str, Vec<WorkloadGroupTask>> = HashMap::new();
        for task in tasks.iter() {
            let id = self
                .service
                .resolve_group_id(task.workload_group_id.as_deref(), &metadata);
            by_group.entry(id).or_default().push(task.clone());
        }

        for id in state.ids() {
            let Some(group_state) = state.get(&id) else {
                continue;
            };
            let group_tasks = by_group.get(id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            for resource in ResourceType::ALL {
                group_state
                    .resource(resource)
                    .record_usage(total_usage(group_tasks, resource));
            }
        }

        let mut report = SweepReport {
            node_in_duress,
            ..SweepReport::default()
        };

        let mode = self.service.mode();
        if mode != WlmMode::Disabled {
            for group in metadata.groups() {
                let Some(group_tasks) = by_group.get(group.id()) else {
                    continue;
                };
                let plan = select_tasks_to_cancel(group, group_tasks);
                if plan.is_empty() {
                    continue;
                }

                match breach_action(mode, group.resiliency_mode(), node_in_duress) {
                    BreachAction::Log => {
                        for c in &plan {
                            warn!(
                                workload_group_id = %c.workload_group_id,
                                task_id = c.task_id,
                                resource = %c.resource,
                                "Task would be cancelled"
                            );
                        }
                        report.would_cancel.extend(plan);
                    }
                    BreachAction::Skip => {
                        debug!(
                            workload_group_id = %group.id(),
                            "Soft workload group over its limit, node not in duress"
                        );
                    }
                    BreachAction::Cancel => {
                        let group_state = state.get_or_default(group.id());
                        let outcome = tokio::time::timeout(
                            self.config.group_timeout,
                            self.cancel_tasks(&group_state, &plan, &mut report.cancelled),
                        )
                        .await;
                        if outcome.is_err() {
                            error!(
                                workload_group_id = %group.id(),
                                timeout_ms = self.config.group_timeout.as_millis() as u64,
                                "Cancellation for workload group timed out"
                            );
                            report.failed_groups.push(group.id().to_string());
                        }
                    }
                }
            }
        }

        report.purged_groups = state.purge_retired(&busy);
        report
    }

    async fn cancel_tasks(
        &self,
        group_state: &WorkloadGroupState,
        plan: &[TaskCancellation],
        issued: &mut Vec<TaskCancellation>,
    ) {
        for cancellation in plan {
            match self
                .tracker
                .cancel(cancellation.task_id, &cancellation.reason)
                .await
            {
                Ok(()) => {
                    group_state.increment_cancellations();
                    group_state
                        .resource(cancellation.resource)
                        .increment_cancellations();
                    info!(
                        workload_group_id = %cancellation.workload_group_id,
                        task_id = cancellation.task_id,
                        resource = %cancellation.resource,
                        "Cancelled task"
                    );
                    issued.push(cancellation.clone());
                }
                Err(e) => {
                    debug!(
                        task_id = cancellation.task_id,
                        error = %e,
                        "Task cancellation was a no-op"
                    );
                }
            }
        }
    }
}

fn breach_action(mode: WlmMode, resiliency: ResiliencyMode, node_in_duress: bool) -> BreachAction {
    match (mode, resiliency) {
        (WlmMode::MonitorOnly, _) | (_, ResiliencyMode::Monitor) => BreachAction::Log,
        (_, ResiliencyMode::Soft) if !node_in_duress => BreachAction::Skip,
        _ => BreachAction::Cancel,
    }
}

fn total_usage(tasks: &[WorkloadGroupTask], resource: ResourceType) -> f64 {
    tasks.iter().map(|t| t.usage(resource)).sum()
}

/// Pick the tasks whose cancellation brings `group` back within its limits.
///
/// For each breached resource, tasks are taken in decreasing usage of that
/// resource (ties by task id) until usage is within the limit. A task is picked
/// at most once and its usage is subtracted from every resource.
pub fn select_tasks_to_cancel(
    group: &WorkloadGroup,
    tasks: &[WorkloadGroupTask],
) -> Vec<TaskCancellation> {
    let mut usage: BTreeMap<ResourceType, f64> = ResourceType::ALL
        .into_iter()
        .map(|r| (r, total_usage(tasks, r)))
        .collect();
    let mut selected: HashSet<u64> = HashSet::new();
    let mut plan = Vec::new();

    for resource in ResourceType::ALL {
        let Some(limit) = group.resource_limit(resource) else {
            continue;
        };
        let observed = usage[&resource];
        if observed <= limit {
            continue;
        }

        let mut candidates: Vec<&WorkloadGroupTask> = tasks
            .iter()
            .filter(|t| !selected.contains(&t.task_id) && t.usage(resource) > 0.0)
            .collect();
        candidates.sort_by(|a, b| {
            b.usage(resource)
                .total_cmp(&a.usage(resource))
                .then(a.task_id.cmp(&b.task_id))
        });

        let reason = format!(
            "Workload group {} breached its {} limit: usage {:.4} > limit {}",
            group.id(),
            resource,
            observed,
            limit
        );
        for task in candidates {
            if usage[&resource] <= limit {
                break;
            }
            selected.insert(task.task_id);
            for (r, u) in usage.iter_mut() {
                *u -= task.usage(*r);
            }
            plan.push(TaskCancellation {
                task_id: task.task_id,
                workload_group_id: group.id().to_string(),
                resource,
                reason: reason.clone(),
            });
        }
    }
    plan
}
