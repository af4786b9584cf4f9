// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::duress::DuressSettings;

/// Node-wide workload management switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WlmMode {
    /// Admission rejection and cancellation are active.
    #[default]
    Enabled,
    /// Usage is recorded, nothing is enforced.
    Disabled,
    /// Would-be cancellations are logged, nothing is enforced.
    MonitorOnly,
}

impl WlmMode {
    /// Wire name of the mode.
    pub fn name(&self) -> &'static str {
        match self {
            WlmMode::Enabled => "enabled",
            WlmMode::Disabled => "disabled",
            WlmMode::MonitorOnly => "monitor_only",
        }
    }

    /// Whether admission rejection and cancellation are active.
    pub fn is_enforcing(&self) -> bool {
        matches!(self, WlmMode::Enabled)
    }
}

impl FromStr for WlmMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "enabled" => Ok(WlmMode::Enabled),
            "disabled" => Ok(WlmMode::Disabled),
            "monitor_only" => Ok(WlmMode::MonitorOnly),
            _ => Err(ConfigError::Invalid(
                "WLM_MODE",
                "must be one of enabled, disabled, monitor_only",
            )),
        }
    }
}

impl fmt::Display for WlmMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Workload management configuration
#[derive(Debug, Clone, PartialEq)]
pub struct WlmConfig {
    /// Node-wide enforcement switch
    pub mode: WlmMode,
    /// Period of the cancellation sweep
    pub sweep_interval: Duration,
    /// Bound on one group's cancellation work within a sweep
    pub group_sweep_timeout: Duration,
    /// Node duress detection
    pub duress: DuressSettings,
}

impl Default for WlmConfig {
    fn default() -> Self {
        Self {
            mode: WlmMode::Enabled,
            sweep_interval: Duration::from_millis(1000),
            group_sweep_timeout: Duration::from_millis(500),
            duress: DuressSettings::default(),
        }
    }
}

impl WlmConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `WLM_MODE`: enabled, disabled or monitor_only (default: enabled)
    /// - `WLM_SWEEP_INTERVAL_MS`: sweep period (default: 1000)
    /// - `WLM_GROUP_SWEEP_TIMEOUT_MS`: per-group cancellation bound (default: 500)
    /// - `WLM_NODE_CPU_DURESS_THRESHOLD`: node CPU duress ratio (default: 0.9)
    /// - `WLM_NODE_MEMORY_DURESS_THRESHOLD`: node memory duress ratio (default: 0.9)
    /// - `WLM_DURESS_STREAK`: consecutive breaching samples (default: 3)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mode: WlmMode = std::env::var("WLM_MODE")
            .unwrap_or_else(|_| "enabled".to_string())
            .parse()?;

        let sweep_interval = Duration::from_millis(positive_millis("WLM_SWEEP_INTERVAL_MS", 1000)?);
        let group_sweep_timeout =
            Duration::from_millis(positive_millis("WLM_GROUP_SWEEP_TIMEOUT_MS", 500)?);

        let cpu_threshold = ratio("WLM_NODE_CPU_DURESS_THRESHOLD", 0.9)?;
        let memory_threshold = ratio("WLM_NODE_MEMORY_DURESS_THRESHOLD", 0.9)?;

        let streak: u32 = match std::env::var("WLM_DURESS_STREAK") {
            Ok(v) => v
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or(ConfigError::Invalid("WLM_DURESS_STREAK", "must be a positive integer"))?,
            Err(_) => 3,
        };

        Ok(Self {
            mode,
            sweep_interval,
            group_sweep_timeout,
            duress: DuressSettings {
                cpu_threshold,
                memory_threshold,
                streak,
            },
        })
    }
}

fn positive_millis(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|ms| *ms > 0)
            .ok_or(ConfigError::Invalid(key, "must be a positive number of milliseconds")),
        Err(_) => Ok(default),
    }
}

fn ratio(key: &'static str, default: f64) -> Result<f64, ConfigError> {
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|r| *r > 0.0 && *r <= 1.0)
            .ok_or(ConfigError::Invalid(key, "must be a number in (0, 1]")),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
