// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for wlm-core.
//!
//! Only the definition/update path is strict. Request-time merge failures are
//! reported as [`WlmError::MergeSkipped`] values and logged rather than raised,
//! and cancellation failures never leave the sweep.

use thiserror::Error;

/// Result type using WlmError
pub type Result<T> = std::result::Result<T, WlmError>;

/// Errors raised by the workload management engine.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum WlmError {
    /// A definition field or search setting is invalid.
    #[error("{message}")]
    InvalidArgument {
        /// The offending field or setting name.
        field: String,
        /// Human readable description, naming the field.
        message: String,
    },

    /// The request was rejected at admission because its workload group is
    /// contended while the node is under duress.
    #[error("Workload group '{workload_group_id}' is already contended. {reason}")]
    AdmissionRejected {
        /// The workload group that rejected the request.
        workload_group_id: String,
        /// Which limit was breached.
        reason: String,
    },

    /// A single search-setting override could not be applied to a request.
    #[error("Failed to apply workload group setting [{setting}={value}]: {reason}")]
    MergeSkipped {
        /// Setting name as stored in the group definition.
        setting: String,
        /// Raw stored value.
        value: String,
        /// Why it was skipped.
        reason: String,
    },

    /// The runtime state map was used incorrectly.
    #[error("State access error for workload group '{workload_group_id}': {details}")]
    StateAccess {
        /// The workload group id.
        workload_group_id: String,
        /// Error details.
        details: String,
    },
}

impl WlmError {
    /// Shorthand for an [`WlmError::InvalidArgument`].
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::AdmissionRejected { .. } => "ADMISSION_REJECTED",
            Self::MergeSkipped { .. } => "MERGE_SKIPPED",
            Self::StateAccess { .. } => "STATE_ACCESS",
        }
    }

    /// Whether the caller may retry the request later.
    ///
    /// Admission rejections are transient: the group stops being contended once
    /// its usage drops or the node leaves duress.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AdmissionRejected { .. })
    }
}
