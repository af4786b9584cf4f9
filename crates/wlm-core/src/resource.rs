// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Node resources tracked by workload management.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WlmError};

/// A node resource whose consumption is limited per workload group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// CPU time, as a fraction of the node's available cores.
    Cpu,
    /// Heap/memory, as a fraction of the node's budget.
    Memory,
}

impl ResourceType {
    /// All tracked resources, in a stable order.
    pub const ALL: [ResourceType; 2] = [ResourceType::Cpu, ResourceType::Memory];

    /// Wire name of the resource.
    pub fn name(&self) -> &'static str {
        match self {
            ResourceType::Cpu => "cpu",
            ResourceType::Memory => "memory",
        }
    }

    /// Position in [`ResourceType::ALL`], used for fixed-size per-resource tables.
    pub(crate) fn index(self) -> usize {
        match self {
            ResourceType::Cpu => 0,
            ResourceType::Memory => 1,
        }
    }

    /// Parse a resource from its wire name (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|r| r.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                WlmError::invalid_argument(
                    "resource_limits",
                    format!("Unknown resource type: [{}]", name),
                )
            })
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name() {
        assert_eq!(ResourceType::from_name("cpu").unwrap(), ResourceType::Cpu);
        assert_eq!(
            ResourceType::from_name("MEMORY").unwrap(),
            ResourceType::Memory
        );

        let err = ResourceType::from_name("gpu").unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
        assert!(err.to_string().contains("gpu"));
    }

    #[test]
    fn test_serde_uses_wire_names() {
        assert_eq!(serde_json::to_string(&ResourceType::Cpu).unwrap(), "\"cpu\"");
        let parsed: ResourceType = serde_json::from_str("\"memory\"").unwrap();
        assert_eq!(parsed, ResourceType::Memory);
    }
}
