// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for workload management.
//!
//! [`WlmRuntime`] wires the service, the request listener and the background
//! cancellation sweep together inside an existing tokio application.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wlm_core::config::WlmConfig;
//! use wlm_core::runtime::WlmRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = WlmRuntime::builder()
//!         .config(WlmConfig::from_env()?)
//!         .task_tracker(Arc::new(MyTracker::new()))
//!         .resource_monitor(Arc::new(MyMonitor::new()))
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // Hand runtime.listener() to the query pipeline, and publish
//!     // definitions with runtime.service().apply_metadata(..)
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::cancellation::{CancellationServiceConfig, WorkloadGroupTaskCancellationService};
use crate::config::WlmConfig;
use crate::listener::WorkloadGroupRequestListener;
use crate::metadata::WorkloadGroupMetadata;
use crate::service::WorkloadGroupService;
use crate::tasks::{NodeResourceMonitor, TaskTracker};

/// Builder for creating a [`WlmRuntime`].
#[derive(Default)]
pub struct WlmRuntimeBuilder {
    config: WlmConfig,
    tracker: Option<Arc<dyn TaskTracker>>,
    monitor: Option<Arc<dyn NodeResourceMonitor>>,
    metadata: Option<WorkloadGroupMetadata>,
}

impl std::fmt::Debug for WlmRuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WlmRuntimeBuilder")
            .field("config", &self.config)
            .field("tracker", &self.tracker.as_ref().map(|t| t.tracker_type()))
            .field("monitor", &self.monitor.as_ref().map(|_| "..."))
            .field("groups", &self.metadata.as_ref().map(|m| m.len()))
            .finish()
    }
}

impl WlmRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    ///
    /// Default: [`WlmConfig::default`]
    pub fn config(mut self, config: WlmConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the task tracker (required).
    pub fn task_tracker(mut self, tracker: Arc<dyn TaskTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Set the node resource monitor (required).
    pub fn resource_monitor(mut self, monitor: Arc<dyn NodeResourceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Definitions to apply before the sweep starts.
    pub fn metadata(mut self, metadata: WorkloadGroupMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<WlmRuntimeConfig> {
        let tracker = self
            .tracker
            .ok_or_else(|| anyhow::anyhow!("task tracker is required"))?;
        let monitor = self
            .monitor
            .ok_or_else(|| anyhow::anyhow!("resource monitor is required"))?;

        Ok(WlmRuntimeConfig {
            config: self.config,
            tracker,
            monitor,
            metadata: self.metadata.unwrap_or_default(),
        })
    }
}

/// Configuration for a [`WlmRuntime`].
pub struct WlmRuntimeConfig {
    config: WlmConfig,
    tracker: Arc<dyn TaskTracker>,
    monitor: Arc<dyn NodeResourceMonitor>,
    metadata: WorkloadGroupMetadata,
}

impl std::fmt::Debug for WlmRuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WlmRuntimeConfig")
            .field("config", &self.config)
            .field("tracker", &self.tracker.tracker_type())
            .field("groups", &self.metadata.len())
            .finish()
    }
}

impl WlmRuntimeConfig {
    /// Start the runtime, spawning the cancellation sweep task.
    pub async fn start(self) -> Result<WlmRuntime> {
        let service = Arc::new(WorkloadGroupService::new(&self.config));
        service.apply_metadata(self.metadata);

        let listener = Arc::new(WorkloadGroupRequestListener::new(service.clone()));
        let sweeper = WorkloadGroupTaskCancellationService::new(
            service.clone(),
            self.tracker,
            self.monitor,
            CancellationServiceConfig::from(&self.config),
        );
        let shutdown = sweeper.shutdown_handle();
        let sweep_handle = tokio::spawn(async move { sweeper.run().await });

        info!(mode = %self.config.mode, "WlmRuntime started");

        Ok(WlmRuntime {
            service,
            listener,
            sweep_handle,
            shutdown,
        })
    }
}

/// A running workload management engine.
///
/// The runtime manages:
/// - the workload group service (admission, accounting, stats)
/// - the request listener for the query pipeline
/// - the background cancellation sweep
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct WlmRuntime {
    service: Arc<WorkloadGroupService>,
    listener: Arc<WorkloadGroupRequestListener>,
    sweep_handle: JoinHandle<()>,
    shutdown: Arc<Notify>,
}

impl WlmRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> WlmRuntimeBuilder {
        WlmRuntimeBuilder::new()
    }

    /// The workload group service.
    pub fn service(&self) -> &Arc<WorkloadGroupService> {
        &self.service
    }

    /// The request listener to register with the query pipeline.
    pub fn listener(&self) -> &Arc<WorkloadGroupRequestListener> {
        &self.listener
    }

    /// Gracefully shut down the runtime.
    ///
    /// Signals the sweep loop to stop and waits for it. A sweep in progress
    /// finishes first.
    pub async fn shutdown(self) -> Result<()> {
        info!("WlmRuntime shutting down...");

        self.shutdown.notify_one();

        match self.sweep_handle.await {
            Ok(()) => {
                info!("WlmRuntime shutdown complete");
                Ok(())
            }
            Err(e) => {
                error!("WlmRuntime sweep task panicked: {}", e);
                Err(anyhow::anyhow!("sweep task panicked: {}", e))
            }
        }
    }

    /// Check if the sweep loop is still running.
    pub fn is_running(&self) -> bool {
        !self.sweep_handle.is_finished()
    }
}
