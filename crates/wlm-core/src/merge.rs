// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Merging a group's search-setting overrides into a live request.
//!
//! Caps (numbers and durations) follow most-restrictive-wins: the request keeps
//! its own value when that is tighter, and takes the group value when it is
//! unset or looser. `phase_took` is only filled in when the request left it
//! unset. `max_buckets` is forwarded as a request header for the data nodes.

use std::time::Duration;

use crate::error::{Result, WlmError};
use crate::fragment::SearchSettings;
use crate::request::SearchRequestContext;
use crate::search_settings::WlmSearchSetting;

/// The tighter of a request value and a group value.
pub fn most_restrictive<T: Ord + Copy>(request: Option<T>, group: T) -> T {
    request.map_or(group, |r| r.min(group))
}

/// Apply every override to the request.
///
/// Keys are applied independently: a key that cannot be applied is skipped and
/// reported, the others still take effect. Returns the skipped keys.
pub fn apply_search_settings(
    settings: &SearchSettings,
    ctx: &mut SearchRequestContext,
) -> Vec<WlmError> {
    settings
        .iter()
        .filter_map(|(name, value)| {
            apply_setting(name, value, ctx)
                .err()
                .map(|err| WlmError::MergeSkipped {
                    setting: name.clone(),
                    value: value.clone(),
                    reason: err.to_string(),
                })
        })
        .collect()
}

fn apply_setting(name: &str, value: &str, ctx: &mut SearchRequestContext) -> Result<()> {
    let setting = WlmSearchSetting::from_key(name).ok_or_else(|| {
        WlmError::invalid_argument(name, format!("Unknown search setting: {}", name))
    })?;
    let request = ctx.request_mut();

    match setting {
        WlmSearchSetting::BatchedReduceSize => {
            let group = setting.parse_count(value)?;
            request.batched_reduce_size = Some(most_restrictive(request.batched_reduce_size, group));
        }
        WlmSearchSetting::MaxConcurrentShardRequests => {
            let group = setting.parse_count(value)?;
            request.max_concurrent_shard_requests =
                Some(most_restrictive(request.max_concurrent_shard_requests, group));
        }
        WlmSearchSetting::CancelAfterTimeInterval => {
            let group = setting.parse_duration(value)?;
            request.cancel_after_time_interval =
                Some(most_restrictive(request.cancel_after_time_interval, group));
        }
        WlmSearchSetting::Timeout => {
            let group: Duration = setting.parse_duration(value)?;
            // Body-less requests have nowhere to carry a timeout.
            if let Some(source) = request.source.as_mut() {
                source.timeout = Some(most_restrictive(source.timeout, group));
            }
        }
        WlmSearchSetting::PhaseTook => {
            let group = setting.parse_flag(value)?;
            request.phase_took.get_or_insert(group);
        }
        WlmSearchSetting::MaxBuckets => {
            setting.parse_count(value)?;
            ctx.headers_mut().put(setting.name(), value.trim())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{SearchRequest, SearchSource};

    fn settings(entries: &[(&str, &str)]) -> SearchSettings {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_most_restrictive() {
        assert_eq!(most_restrictive(None, 10), 10);
        assert_eq!(most_restrictive(Some(3), 10), 3);
        assert_eq!(most_restrictive(Some(50), 5), 5);
        assert_eq!(
            most_restrictive(Some(Duration::from_secs(10)), Duration::from_secs(30)),
            Duration::from_secs(10)
        );
        assert_eq!(
            most_restrictive(None, Duration::from_secs(30)),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_numeric_caps() {
        let mut ctx = SearchRequestContext::new(
            SearchRequest::new()
                .with_batched_reduce_size(3)
                .with_max_concurrent_shard_requests(50),
        );
        let skipped = apply_search_settings(
            &settings(&[("batched_reduce_size", "10"), ("max_concurrent_shard_requests", "5")]),
            &mut ctx,
        );
        assert!(skipped.is_empty());
        assert_eq!(ctx.request().batched_reduce_size, Some(3));
        assert_eq!(ctx.request().max_concurrent_shard_requests, Some(5));
    }

    #[test]
    fn test_timeout_needs_a_source() {
        let group = settings(&[("timeout", "30s"), ("cancel_after_time_interval", "30s")]);

        let mut without_source = SearchRequestContext::new(SearchRequest::new());
        assert!(apply_search_settings(&group, &mut without_source).is_empty());
        assert_eq!(without_source.request().source, None);
        assert_eq!(
            without_source.request().cancel_after_time_interval,
            Some(Duration::from_secs(30))
        );

        let mut with_source = SearchRequestContext::new(
            SearchRequest::new()
                .with_cancel_after_time_interval(Duration::from_secs(10))
                .with_source(SearchSource::default()),
        );
        apply_search_settings(&group, &mut with_source);
        assert_eq!(with_source.request().timeout(), Some(Duration::from_secs(30)));
        assert_eq!(
            with_source.request().cancel_after_time_interval,
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_phase_took_only_when_unset() {
        let group = settings(&[("phase_took", "true")]);

        let mut unset = SearchRequestContext::new(SearchRequest::new());
        apply_search_settings(&group, &mut unset);
        assert_eq!(unset.request().phase_took, Some(true));

        let mut set = SearchRequestContext::new(SearchRequest::new().with_phase_took(false));
        apply_search_settings(&group, &mut set);
        assert_eq!(set.request().phase_took, Some(false));
    }

    #[test]
    fn test_max_buckets_becomes_header() {
        let mut ctx = SearchRequestContext::new(SearchRequest::new());
        apply_search_settings(&settings(&[("max_buckets", "1000")]), &mut ctx);
        assert_eq!(ctx.headers().get("max_buckets"), Some("1000"));
    }

    #[test]
    fn test_bad_keys_are_skipped_individually() {
        let mut ctx = SearchRequestContext::new(SearchRequest::new());
        ctx.headers_mut().put("max_buckets", "10").unwrap();

        let skipped = apply_search_settings(
            &settings(&[
                ("batched_reduce_size", "1"),
                ("bogus", "1"),
                ("max_buckets", "20"),
                ("max_concurrent_shard_requests", "4"),
            ]),
            &mut ctx,
        );

        assert_eq!(skipped.len(), 3);
        assert!(skipped.iter().all(|e| e.error_code() == "MERGE_SKIPPED"));
        assert_eq!(ctx.request().batched_reduce_size, None);
        assert_eq!(ctx.request().max_concurrent_shard_requests, Some(4));
        assert_eq!(ctx.headers().get("max_buckets"), Some("10"));
    }
}
