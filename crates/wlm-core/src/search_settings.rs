// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Registry of search settings a workload group may override.
//!
//! The registry is closed: only the settings listed in [`WlmSearchSetting`] can
//! be stored in a group definition. Every setting has a validator, used both
//! when a definition is created/updated and when the stored value is applied to
//! a live request, and a [`MergeStrategy`] describing how the group value is
//! reconciled with the value the request already carries.
//!
//! | Setting | Accepted values | Merge |
//! |---------|-----------------|-------|
//! | `batched_reduce_size` | integer >= 2 | smaller wins |
//! | `cancel_after_time_interval` | time value | shorter wins |
//! | `max_concurrent_shard_requests` | positive integer | smaller wins |
//! | `phase_took` | `true` / `false` | set when unset |
//! | `timeout` | time value | shorter wins |
//! | `max_buckets` | positive integer | request header |

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::error::{Result, WlmError};

/// How a group-level value is combined with the request's own value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeStrategy {
    /// Numeric cap: the smaller value wins; an unset request value takes the group value.
    MostRestrictiveNumber,
    /// Duration cap: the shorter value wins; an unset request value takes the group value.
    MostRestrictiveTime,
    /// Flag: the group value is used only when the request did not set one.
    OverrideIfUnset,
    /// Consumed by downstream nodes: stored as a request header.
    PropagateAsHeader,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MergeStrategy::MostRestrictiveNumber => "most_restrictive_number",
            MergeStrategy::MostRestrictiveTime => "most_restrictive_time",
            MergeStrategy::OverrideIfUnset => "override_if_unset",
            MergeStrategy::PropagateAsHeader => "propagate_as_header",
        };
        f.write_str(s)
    }
}

/// Search settings that can be overridden per workload group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WlmSearchSetting {
    /// Number of shard results reduced at once on the coordinator.
    BatchedReduceSize,
    /// Cancel the search after this interval.
    CancelAfterTimeInterval,
    /// Number of shard requests a search executes concurrently per node.
    MaxConcurrentShardRequests,
    /// Include per-phase timing in the response.
    PhaseTook,
    /// Search source timeout.
    Timeout,
    /// Maximum aggregation buckets, enforced on data nodes.
    MaxBuckets,
}

impl WlmSearchSetting {
    /// Every registered setting.
    pub const ALL: [WlmSearchSetting; 6] = [
        WlmSearchSetting::BatchedReduceSize,
        WlmSearchSetting::CancelAfterTimeInterval,
        WlmSearchSetting::MaxConcurrentShardRequests,
        WlmSearchSetting::PhaseTook,
        WlmSearchSetting::Timeout,
        WlmSearchSetting::MaxBuckets,
    ];

    /// The setting's name as stored in definitions.
    pub fn name(&self) -> &'static str {
        match self {
            WlmSearchSetting::BatchedReduceSize => "batched_reduce_size",
            WlmSearchSetting::CancelAfterTimeInterval => "cancel_after_time_interval",
            WlmSearchSetting::MaxConcurrentShardRequests => "max_concurrent_shard_requests",
            WlmSearchSetting::PhaseTook => "phase_took",
            WlmSearchSetting::Timeout => "timeout",
            WlmSearchSetting::MaxBuckets => "max_buckets",
        }
    }

    /// How the setting is merged into a request.
    pub fn merge_strategy(&self) -> MergeStrategy {
        match self {
            WlmSearchSetting::BatchedReduceSize | WlmSearchSetting::MaxConcurrentShardRequests => {
                MergeStrategy::MostRestrictiveNumber
            }
            WlmSearchSetting::CancelAfterTimeInterval | WlmSearchSetting::Timeout => {
                MergeStrategy::MostRestrictiveTime
            }
            WlmSearchSetting::PhaseTook => MergeStrategy::OverrideIfUnset,
            WlmSearchSetting::MaxBuckets => MergeStrategy::PropagateAsHeader,
        }
    }

    /// Look up a setting by exact, case-sensitive name.
    ///
    /// Returns `None` for empty or unknown names.
    pub fn from_key(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    /// Validate a raw value for this setting.
    pub fn validate(&self, value: &str) -> Result<()> {
        let outcome = match self {
            WlmSearchSetting::BatchedReduceSize => parse_batch_size(value).map(|_| ()),
            WlmSearchSetting::MaxConcurrentShardRequests | WlmSearchSetting::MaxBuckets => {
                parse_positive_int(value).map(|_| ())
            }
            WlmSearchSetting::CancelAfterTimeInterval | WlmSearchSetting::Timeout => {
                parse_time_value(value).map(|_| ())
            }
            WlmSearchSetting::PhaseTook => parse_bool(value).map(|_| ()),
        };
        outcome.map_err(|reason| self.invalid(reason))
    }

    /// Parse a validated count value (`batched_reduce_size`, `max_concurrent_shard_requests`, `max_buckets`).
    pub(crate) fn parse_count(&self, value: &str) -> Result<u32> {
        let parsed = match self {
            WlmSearchSetting::BatchedReduceSize => parse_batch_size(value),
            _ => parse_positive_int(value),
        };
        parsed.map_err(|reason| self.invalid(reason))
    }

    /// Parse a validated time value.
    pub(crate) fn parse_duration(&self, value: &str) -> Result<Duration> {
        parse_time_value(value).map_err(|reason| self.invalid(reason))
    }

    /// Parse a validated flag value.
    pub(crate) fn parse_flag(&self, value: &str) -> Result<bool> {
        parse_bool(value).map_err(|reason| self.invalid(reason))
    }

    fn invalid(&self, reason: &str) -> WlmError {
        WlmError::invalid_argument(
            self.name(),
            format!("Invalid value for {}: {}", self.name(), reason),
        )
    }
}

impl fmt::Display for WlmSearchSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Validate every entry of a search-settings map.
///
/// `None` means the settings were not specified and is always valid.
pub fn validate_search_settings(settings: Option<&BTreeMap<String, String>>) -> Result<()> {
    let Some(settings) = settings else {
        return Ok(());
    };
    for (name, value) in settings {
        let setting = WlmSearchSetting::from_key(name).ok_or_else(|| {
            WlmError::invalid_argument(name.as_str(), format!("Unknown search setting: {}", name))
        })?;
        setting.validate(value)?;
    }
    Ok(())
}

/// Parse a time value such as `30s`, `5m`, `1h`, `250ms`.
///
/// Accepted units are `nanos`, `micros`, `ms`, `s`, `m`, `h` and `d`
/// (case-insensitive). A bare `0` is accepted; any other number needs a unit.
pub fn parse_time_value(value: &str) -> std::result::Result<Duration, &'static str> {
    const INVALID: &str = "must be a valid time value";

    let normalized = value.trim().to_ascii_lowercase();
    if normalized == "0" {
        return Ok(Duration::ZERO);
    }

    // Longer suffixes first: "nanos" and "micros" also end in "s", "ms" in "s".
    const SUFFIXES: [&str; 7] = ["nanos", "micros", "ms", "s", "m", "h", "d"];

    let (number, suffix) = SUFFIXES
        .iter()
        .find_map(|suffix| {
            normalized
                .strip_suffix(suffix)
                .map(|number| (number.trim(), *suffix))
        })
        .ok_or(INVALID)?;

    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return Err(INVALID);
    }
    let amount: u64 = number.parse().map_err(|_| INVALID)?;

    let duration = match suffix {
        "nanos" => Some(Duration::from_nanos(amount)),
        "micros" => Some(Duration::from_micros(amount)),
        "ms" => Some(Duration::from_millis(amount)),
        "s" => Some(Duration::from_secs(amount)),
        "m" => amount.checked_mul(60).map(Duration::from_secs),
        "h" => amount.checked_mul(3_600).map(Duration::from_secs),
        _ => amount.checked_mul(86_400).map(Duration::from_secs),
    };
    duration.ok_or(INVALID)
}

fn parse_bool(value: &str) -> std::result::Result<bool, &'static str> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err("must be true or false")
    }
}

fn parse_int(value: &str) -> std::result::Result<i32, &'static str> {
    value.trim().parse().map_err(|_| "must be a valid integer")
}

fn parse_positive_int(value: &str) -> std::result::Result<u32, &'static str> {
    match parse_int(value)? {
        n if n < 1 => Err("must be positive"),
        n => Ok(n as u32),
    }
}

fn parse_batch_size(value: &str) -> std::result::Result<u32, &'static str> {
    match parse_int(value)? {
        n if n < 2 => Err("must be >= 2"),
        n => Ok(n as u32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setting_names() {
        assert_eq!(WlmSearchSetting::BatchedReduceSize.name(), "batched_reduce_size");
        assert_eq!(
            WlmSearchSetting::CancelAfterTimeInterval.name(),
            "cancel_after_time_interval"
        );
        assert_eq!(
            WlmSearchSetting::MaxConcurrentShardRequests.name(),
            "max_concurrent_shard_requests"
        );
        assert_eq!(WlmSearchSetting::PhaseTook.name(), "phase_took");
        assert_eq!(WlmSearchSetting::Timeout.name(), "timeout");
        assert_eq!(WlmSearchSetting::MaxBuckets.name(), "max_buckets");
    }

    #[test]
    fn test_from_key() {
        for setting in WlmSearchSetting::ALL {
            assert_eq!(WlmSearchSetting::from_key(setting.name()), Some(setting));
        }
        assert_eq!(WlmSearchSetting::from_key("invalid_setting"), None);
        assert_eq!(WlmSearchSetting::from_key(""), None);
        // Lookup is case-sensitive.
        assert_eq!(WlmSearchSetting::from_key("TIMEOUT"), None);
    }

    #[test]
    fn test_merge_strategies() {
        assert_eq!(
            WlmSearchSetting::BatchedReduceSize.merge_strategy(),
            MergeStrategy::MostRestrictiveNumber
        );
        assert_eq!(
            WlmSearchSetting::MaxConcurrentShardRequests.merge_strategy(),
            MergeStrategy::MostRestrictiveNumber
        );
        assert_eq!(
            WlmSearchSetting::CancelAfterTimeInterval.merge_strategy(),
            MergeStrategy::MostRestrictiveTime
        );
        assert_eq!(
            WlmSearchSetting::Timeout.merge_strategy(),
            MergeStrategy::MostRestrictiveTime
        );
        assert_eq!(
            WlmSearchSetting::PhaseTook.merge_strategy(),
            MergeStrategy::OverrideIfUnset
        );
        assert_eq!(
            WlmSearchSetting::MaxBuckets.merge_strategy(),
            MergeStrategy::PropagateAsHeader
        );
    }

    #[test]
    fn test_validate_time_values() {
        WlmSearchSetting::Timeout.validate("30s").unwrap();
        WlmSearchSetting::Timeout.validate("5m").unwrap();
        WlmSearchSetting::CancelAfterTimeInterval.validate("1h").unwrap();

        let err = WlmSearchSetting::Timeout.validate("invalid").unwrap_err();
        assert!(err.to_string().contains("Invalid value for timeout"));
        assert!(matches!(err, WlmError::InvalidArgument { ref field, .. } if field == "timeout"));
    }

    #[test]
    fn test_parse_time_value_units() {
        assert_eq!(parse_time_value("100nanos"), Ok(Duration::from_nanos(100)));
        assert_eq!(parse_time_value("7micros"), Ok(Duration::from_micros(7)));
        assert_eq!(parse_time_value("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_time_value("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_time_value("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_time_value("1H"), Ok(Duration::from_secs(3_600)));
        assert_eq!(parse_time_value(" 1d "), Ok(Duration::from_secs(86_400)));
        assert_eq!(parse_time_value("0"), Ok(Duration::ZERO));

        assert!(parse_time_value("30").is_err());
        assert!(parse_time_value("s").is_err());
        assert!(parse_time_value("-1s").is_err());
        assert!(parse_time_value("1.5s").is_err());
        assert!(parse_time_value("").is_err());
    }

    #[test]
    fn test_validate_positive_int() {
        WlmSearchSetting::MaxConcurrentShardRequests.validate("1").unwrap();
        WlmSearchSetting::MaxConcurrentShardRequests.validate("100").unwrap();
        WlmSearchSetting::MaxBuckets.validate("10000").unwrap();

        let err = WlmSearchSetting::MaxConcurrentShardRequests.validate("0").unwrap_err();
        assert!(err.to_string().contains("must be positive"));
        let err = WlmSearchSetting::MaxConcurrentShardRequests.validate("-1").unwrap_err();
        assert!(err.to_string().contains("must be positive"));
        let err = WlmSearchSetting::MaxConcurrentShardRequests.validate("abc").unwrap_err();
        assert!(err.to_string().contains("must be a valid integer"));
    }

    #[test]
    fn test_validate_batched_reduce_size() {
        WlmSearchSetting::BatchedReduceSize.validate("2").unwrap();
        WlmSearchSetting::BatchedReduceSize.validate("512").unwrap();

        for bad in ["1", "0"] {
            let err = WlmSearchSetting::BatchedReduceSize.validate(bad).unwrap_err();
            assert!(err.to_string().contains("must be >= 2"), "{}", err);
        }
        let err = WlmSearchSetting::BatchedReduceSize.validate("abc").unwrap_err();
        assert!(err.to_string().contains("must be a valid integer"));
    }

    #[test]
    fn test_validate_boolean() {
        for ok in ["true", "false", "TRUE", "False", " true", "false\n"] {
            WlmSearchSetting::PhaseTook.validate(ok).unwrap();
        }
        // Padding is tolerated the same way for every value kind.
        assert!(WlmSearchSetting::PhaseTook.parse_flag(" true ").unwrap());
        WlmSearchSetting::BatchedReduceSize.validate(" 64").unwrap();
        WlmSearchSetting::Timeout.validate(" 30s").unwrap();
        let err = WlmSearchSetting::PhaseTook.validate("yes").unwrap_err();
        assert!(err.to_string().contains("must be true or false"));
    }

    #[test]
    fn test_validate_search_settings() {
        let mut settings = BTreeMap::new();
        settings.insert("timeout".to_string(), "30s".to_string());
        settings.insert("phase_took".to_string(), "true".to_string());
        settings.insert("max_concurrent_shard_requests".to_string(), "5".to_string());
        validate_search_settings(Some(&settings)).unwrap();

        validate_search_settings(None).unwrap();
        validate_search_settings(Some(&BTreeMap::new())).unwrap();

        let mut unknown = BTreeMap::new();
        unknown.insert("unknown_setting".to_string(), "true".to_string());
        let err = validate_search_settings(Some(&unknown)).unwrap_err();
        assert!(err.to_string().contains("Unknown search setting: unknown_setting"));

        let mut invalid = BTreeMap::new();
        invalid.insert("timeout".to_string(), "invalid_time".to_string());
        let err = validate_search_settings(Some(&invalid)).unwrap_err();
        assert!(err.to_string().contains("Invalid value for timeout"));
    }
}
