// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Search request lifecycle hooks.
//!
//! The query pipeline drives a [`RequestOperationListener`] through a request's
//! life. [`WorkloadGroupRequestListener`] plugs workload management in:
//! admission and setting overrides at start, accounting at the end.

use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use crate::error::Result;
use crate::merge::apply_search_settings;
use crate::metadata::WorkloadGroupMetadata;
use crate::request::SearchRequestContext;
use crate::service::WorkloadGroupService;

/// Phase information passed to failure hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPhaseContext {
    /// Name of the phase that failed (e.g. "query", "fetch").
    pub phase: String,
}

/// Callbacks invoked by the query pipeline.
///
/// Every hook has a no-op default so listeners implement only what they need.
pub trait RequestOperationListener: Send + Sync {
    /// The request is about to execute. An error aborts the request.
    fn on_request_start(&self, ctx: &mut SearchRequestContext) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// The request completed.
    fn on_request_end(&self, ctx: &SearchRequestContext) {
        let _ = ctx;
    }

    /// The request failed. Either context may be missing.
    fn on_request_failure(
        &self,
        phase: Option<&SearchPhaseContext>,
        ctx: Option<&SearchRequestContext>,
    ) {
        let _ = (phase, ctx);
    }

    /// A phase is starting.
    fn on_phase_start(&self, ctx: &mut SearchRequestContext, phase: &str) {
        let _ = (ctx, phase);
    }

    /// A phase finished after `took`.
    fn on_phase_end(&self, ctx: &mut SearchRequestContext, phase: &str, took: Duration) {
        let _ = (ctx, phase, took);
    }
}

/// Fans every hook out to a list of listeners, in order.
///
/// `on_request_start` stops at the first listener that fails.
#[derive(Default, Clone)]
pub struct CompositeListener {
    listeners: Vec<Arc<dyn RequestOperationListener>>,
}

impl CompositeListener {
    /// An empty composite.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener.
    pub fn with(mut self, listener: Arc<dyn RequestOperationListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Number of listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether there are no listeners.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl RequestOperationListener for CompositeListener {
    fn on_request_start(&self, ctx: &mut SearchRequestContext) -> Result<()> {
        self.listeners
            .iter()
            .try_for_each(|l| l.on_request_start(ctx))
    }

    fn on_request_end(&self, ctx: &SearchRequestContext) {
        for listener in &self.listeners {
            listener.on_request_end(ctx);
        }
    }

    fn on_request_failure(
        &self,
        phase: Option<&SearchPhaseContext>,
        ctx: Option<&SearchRequestContext>,
    ) {
        for listener in &self.listeners {
            listener.on_request_failure(phase, ctx);
        }
    }

    fn on_phase_start(&self, ctx: &mut SearchRequestContext, phase: &str) {
        for listener in &self.listeners {
            listener.on_phase_start(ctx, phase);
        }
    }

    fn on_phase_end(&self, ctx: &mut SearchRequestContext, phase: &str, took: Duration) {
        for listener in &self.listeners {
            listener.on_phase_end(ctx, phase, took);
        }
    }
}

/// Records phase timings into the request context.
#[derive(Debug, Default, Clone, Copy)]
pub struct PhaseTookListener;

impl RequestOperationListener for PhaseTookListener {
    fn on_phase_end(&self, ctx: &mut SearchRequestContext, phase: &str, took: Duration) {
        ctx.record_phase_took(phase, took);
    }
}

/// Workload management hooks.
#[derive(Clone)]
pub struct WorkloadGroupRequestListener {
    service: Arc<WorkloadGroupService>,
}

impl WorkloadGroupRequestListener {
    /// Create a listener backed by `service`.
    pub fn new(service: Arc<WorkloadGroupService>) -> Self {
        Self { service }
    }

    /// The backing service.
    pub fn service(&self) -> &Arc<WorkloadGroupService> {
        &self.service
    }

    /// Admission and overrides for one request against a single definitions
    /// snapshot.
    fn start_request(
        &self,
        ctx: &mut SearchRequestContext,
        metadata: &WorkloadGroupMetadata,
    ) -> Result<()> {
        let workload_group_id = ctx.workload_group_id().map(str::to_string);
        self.service
            .reject_if_needed(workload_group_id.as_deref(), metadata)?;
        if let Some(id) = workload_group_id {
            apply_workload_group_search_settings(&id, metadata, ctx);
        }
        Ok(())
    }
}

fn apply_workload_group_search_settings(
    workload_group_id: &str,
    metadata: &WorkloadGroupMetadata,
    ctx: &mut SearchRequestContext,
) {
    let Some(settings) = metadata
        .get(workload_group_id)
        .and_then(|group| group.search_settings())
    else {
        return;
    };

    for skipped in apply_search_settings(settings, ctx) {
        error!(
            workload_group_id = %workload_group_id,
            error = %skipped,
            "Failed to apply workload group search setting"
        );
    }
}

impl RequestOperationListener for WorkloadGroupRequestListener {
    fn on_request_start(&self, ctx: &mut SearchRequestContext) -> Result<()> {
        let metadata = self.service.metadata();
        self.start_request(ctx, &metadata)
    }

    fn on_request_end(&self, ctx: &SearchRequestContext) {
        self.service
            .increment_completions_for(ctx.workload_group_id());
    }

    fn on_request_failure(
        &self,
        _phase: Option<&SearchPhaseContext>,
        ctx: Option<&SearchRequestContext>,
    ) {
        self.service
            .increment_failures_for(ctx.and_then(|c| c.workload_group_id()));
    }
}
