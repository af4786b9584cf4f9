// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Search request model seen by the lifecycle hooks.
//!
//! Only the execution settings that workload groups can override are modelled.
//! Every field is optional so "not set by the caller" is distinguishable from
//! any explicit value.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::error::{Result, WlmError};

/// Request header carrying the caller's workload group id.
pub const WORKLOAD_GROUP_ID_HEADER: &str = "wlm_workload_group_id";

/// The query body. Only the timeout matters here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchSource {
    /// Query timeout.
    pub timeout: Option<Duration>,
}

/// Execution settings of a search request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest {
    /// Number of shard results reduced at once.
    pub batched_reduce_size: Option<u32>,
    /// Cancel the request after this long.
    pub cancel_after_time_interval: Option<Duration>,
    /// Shard request concurrency per node.
    pub max_concurrent_shard_requests: Option<u32>,
    /// Whether per-phase timings are returned.
    pub phase_took: Option<bool>,
    /// The query body, absent for body-less requests.
    pub source: Option<SearchSource>,
}

impl SearchRequest {
    /// Create a request with nothing set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the batched reduce size.
    pub fn with_batched_reduce_size(mut self, size: u32) -> Self {
        self.batched_reduce_size = Some(size);
        self
    }

    /// Set the cancel-after interval.
    pub fn with_cancel_after_time_interval(mut self, interval: Duration) -> Self {
        self.cancel_after_time_interval = Some(interval);
        self
    }

    /// Set the shard request concurrency.
    pub fn with_max_concurrent_shard_requests(mut self, max: u32) -> Self {
        self.max_concurrent_shard_requests = Some(max);
        self
    }

    /// Set the phase-took flag.
    pub fn with_phase_took(mut self, phase_took: bool) -> Self {
        self.phase_took = Some(phase_took);
        self
    }

    /// Attach a query body.
    pub fn with_source(mut self, source: SearchSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Query timeout, if the request has a source that sets one.
    pub fn timeout(&self) -> Option<Duration> {
        self.source.as_ref().and_then(|s| s.timeout)
    }
}

/// Headers propagated with a request to the shards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    headers: HashMap<String, String>,
}

impl RequestHeaders {
    /// No headers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Header value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Add a header.
    ///
    /// Headers are write-once: setting an existing key to a different value fails.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        let value = value.into();
        match self.headers.get(&key) {
            Some(existing) if *existing != value => Err(WlmError::invalid_argument(
                key.clone(),
                format!("value for header [{}] already present", key),
            )),
            _ => {
                self.headers.insert(key, value);
                Ok(())
            }
        }
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Whether there are no headers.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

/// Per-request state carried through the lifecycle hooks.
#[derive(Debug, Clone, Default)]
pub struct SearchRequestContext {
    request: SearchRequest,
    headers: RequestHeaders,
    phase_took: BTreeMap<String, Duration>,
}

impl SearchRequestContext {
    /// Wrap a request with no headers.
    pub fn new(request: SearchRequest) -> Self {
        Self {
            request,
            ..Self::default()
        }
    }

    /// Wrap a request tagged with a workload group.
    pub fn for_workload_group(request: SearchRequest, workload_group_id: impl Into<String>) -> Self {
        let mut headers = RequestHeaders::new();
        headers.headers.insert(WORKLOAD_GROUP_ID_HEADER.to_string(), workload_group_id.into());
        Self {
            request,
            headers,
            phase_took: BTreeMap::new(),
        }
    }

    /// The caller's workload group id, from the request header.
    pub fn workload_group_id(&self) -> Option<&str> {
        self.headers.get(WORKLOAD_GROUP_ID_HEADER)
    }

    /// The request.
    pub fn request(&self) -> &SearchRequest {
        &self.request
    }

    /// The request, for merging overrides.
    pub fn request_mut(&mut self) -> &mut SearchRequest {
        &mut self.request
    }

    /// Request headers.
    pub fn headers(&self) -> &RequestHeaders {
        &self.headers
    }

    /// Request headers, for propagating overrides.
    pub fn headers_mut(&mut self) -> &mut RequestHeaders {
        &mut self.headers
    }

    /// Record how long a phase took. Repeated phases accumulate.
    pub fn record_phase_took(&mut self, phase: &str, took: Duration) {
        *self.phase_took.entry(phase.to_string()).or_default() += took;
    }

    /// Per-phase timings, returned only when the request asked for them.
    pub fn phase_took(&self) -> Option<&BTreeMap<String, Duration>> {
        self.request
            .phase_took
            .unwrap_or(false)
            .then_some(&self.phase_took)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_comes_from_source() {
        assert_eq!(SearchRequest::new().timeout(), None);
        assert_eq!(
            SearchRequest::new().with_source(SearchSource::default()).timeout(),
            None
        );

        let request = SearchRequest::new().with_source(SearchSource {
            timeout: Some(Duration::from_secs(5)),
        });
        assert_eq!(request.timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_headers_are_write_once() {
        let mut headers = RequestHeaders::new();
        headers.put("max_buckets", "100").unwrap();
        headers.put("max_buckets", "100").unwrap();
        let err = headers.put("max_buckets", "200").unwrap_err();
        assert!(err.to_string().contains("already present"));
        assert_eq!(headers.get("max_buckets"), Some("100"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_workload_group_header() {
        let ctx = SearchRequestContext::new(SearchRequest::new());
        assert_eq!(ctx.workload_group_id(), None);

        let ctx = SearchRequestContext::for_workload_group(SearchRequest::new(), "analytics");
        assert_eq!(ctx.workload_group_id(), Some("analytics"));
    }

    #[test]
    fn test_phase_took_gated_by_flag() {
        let mut ctx = SearchRequestContext::new(SearchRequest::new());
        ctx.record_phase_took("query", Duration::from_millis(10));
        assert!(ctx.phase_took().is_none());

        ctx.request_mut().phase_took = Some(true);
        ctx.record_phase_took("query", Duration::from_millis(5));
        ctx.record_phase_took("fetch", Duration::from_millis(2));
        let took = ctx.phase_took().unwrap();
        assert_eq!(took.get("query"), Some(&Duration::from_millis(15)));
        assert_eq!(took.get("fetch"), Some(&Duration::from_millis(2)));
    }
}
