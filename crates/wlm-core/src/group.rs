// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workload group definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, WlmError};
use crate::fragment::{
    MutableWorkloadGroupFragment, ResiliencyMode, ResourceLimits, SearchSettings,
};
use crate::resource::ResourceType;

/// Group id used for requests that carry no (or an undefined) workload group.
pub const DEFAULT_WORKLOAD_GROUP_ID: &str = "DEFAULT_WORKLOAD_GROUP";

/// Maximum length of a workload group name.
pub const MAX_NAME_LENGTH: usize = 50;

/// A named, limited slice of query capacity.
///
/// Identity (`id`, `name`) and `created_at` never change; updates produce a new
/// value through [`WorkloadGroup::updated`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawWorkloadGroup")]
pub struct WorkloadGroup {
    id: String,
    name: String,
    #[serde(flatten)]
    mutable: MutableWorkloadGroupFragment,
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawWorkloadGroup {
    id: String,
    name: String,
    #[serde(flatten)]
    mutable: MutableWorkloadGroupFragment,
    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,
}

impl TryFrom<RawWorkloadGroup> for WorkloadGroup {
    type Error = WlmError;

    fn try_from(raw: RawWorkloadGroup) -> Result<Self> {
        Self::new(raw.id, raw.name, raw.mutable, raw.created_at)
    }
}

impl WorkloadGroup {
    /// Build a group from all of its parts, validating identity and mode.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        mutable: MutableWorkloadGroupFragment,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        let id = id.into();
        let name = name.into();
        validate_name(&name)?;
        if id.is_empty() {
            return Err(WlmError::invalid_argument("_id", "WorkloadGroup._id can't be empty"));
        }
        if mutable.resiliency_mode().is_none() {
            return Err(WlmError::invalid_argument(
                "resiliency_mode",
                "WorkloadGroup.resiliency_mode must be set",
            ));
        }
        Ok(Self {
            id,
            name,
            mutable,
            created_at,
        })
    }

    /// Create a new group with a fresh id, created now.
    pub fn create(name: impl Into<String>, mutable: MutableWorkloadGroupFragment) -> Result<Self> {
        Self::new(Uuid::new_v4().to_string(), name, mutable, Utc::now())
    }

    /// Apply a partial update, keeping identity and creation time.
    pub fn updated(&self, update: &MutableWorkloadGroupFragment) -> Result<Self> {
        Self::new(
            self.id.clone(),
            self.name.clone(),
            self.mutable.merged_with(update),
            self.created_at,
        )
    }

    /// Opaque group id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Unique, human-readable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The resiliency mode.
    pub fn resiliency_mode(&self) -> ResiliencyMode {
        // Checked in `new`.
        self.mutable
            .resiliency_mode()
            .unwrap_or(ResiliencyMode::Soft)
    }

    /// Per-resource limits.
    pub fn resource_limits(&self) -> &ResourceLimits {
        self.mutable.resource_limits()
    }

    /// The limit for one resource; `None` means unlimited.
    pub fn resource_limit(&self, resource: ResourceType) -> Option<f64> {
        self.mutable.resource_limit(resource)
    }

    /// Search-setting overrides, if specified.
    pub fn search_settings(&self) -> Option<&SearchSettings> {
        self.mutable.search_settings()
    }

    /// The mutable part of the definition.
    pub fn mutable_fragment(&self) -> &MutableWorkloadGroupFragment {
        &self.mutable
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(WlmError::invalid_argument("name", "WorkloadGroup.name can't be empty"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(WlmError::invalid_argument(
            "name",
            format!(
                "WorkloadGroup.name shouldn't be longer than {} characters",
                MAX_NAME_LENGTH
            ),
        ));
    }
    if name.starts_with('_') {
        return Err(WlmError::invalid_argument(
            "name",
            "WorkloadGroup.name shouldn't start with '_'",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fragment(mode: Option<ResiliencyMode>, cpu: f64) -> MutableWorkloadGroupFragment {
        MutableWorkloadGroupFragment::new(
            mode,
            ResourceLimits::from([(ResourceType::Cpu, cpu)]),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_create_assigns_identity() {
        let a = WorkloadGroup::create("analytics", fragment(Some(ResiliencyMode::Soft), 0.3)).unwrap();
        let b = WorkloadGroup::create("analytics", fragment(Some(ResiliencyMode::Soft), 0.3)).unwrap();
        assert_ne!(a.id(), b.id());
        assert!(Uuid::parse_str(a.id()).is_ok());
        assert_eq!(a.name(), "analytics");
        assert!(a.created_at() <= Utc::now());
    }

    #[test]
    fn test_name_validation() {
        let long = "x".repeat(MAX_NAME_LENGTH + 1);
        for bad in ["", "_hidden", long.as_str()] {
            let err = WorkloadGroup::create(bad, fragment(Some(ResiliencyMode::Soft), 0.3)).unwrap_err();
            assert!(
                matches!(err, WlmError::InvalidArgument { ref field, .. } if field == "name"),
                "name {:?} should be rejected",
                bad
            );
        }
        assert!(
            WorkloadGroup::create("x".repeat(MAX_NAME_LENGTH), fragment(Some(ResiliencyMode::Soft), 0.3))
                .is_ok()
        );
    }

    #[test]
    fn test_mode_required() {
        let err = WorkloadGroup::create("g", fragment(None, 0.3)).unwrap_err();
        assert!(err.to_string().contains("resiliency_mode"));
    }

    #[test]
    fn test_updated_keeps_identity() {
        let group =
            WorkloadGroup::create("analytics", fragment(Some(ResiliencyMode::Enforced), 0.3)).unwrap();
        let update = MutableWorkloadGroupFragment::new(
            None,
            ResourceLimits::from([(ResourceType::Memory, 0.2)]),
            Some(SearchSettings::from([("timeout".to_string(), "10s".to_string())])),
        )
        .unwrap();

        let updated = group.updated(&update).unwrap();
        assert_eq!(updated.id(), group.id());
        assert_eq!(updated.created_at(), group.created_at());
        assert_eq!(updated.resiliency_mode(), ResiliencyMode::Enforced);
        assert_eq!(updated.resource_limit(ResourceType::Cpu), Some(0.3));
        assert_eq!(updated.resource_limit(ResourceType::Memory), Some(0.2));
        assert_eq!(updated.search_settings().map(|s| s.len()), Some(1));
    }

    #[test]
    fn test_json_shape() {
        let group = WorkloadGroup::new(
            "id-1",
            "analytics",
            MutableWorkloadGroupFragment::new(
                Some(ResiliencyMode::Monitor),
                ResourceLimits::from([(ResourceType::Memory, 0.5)]),
                Some(SearchSettings::new()),
            )
            .unwrap(),
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        )
        .unwrap();

        let value = serde_json::to_value(&group).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "id-1",
                "name": "analytics",
                "resiliency_mode": "monitor",
                "resource_limits": {"memory": 0.5},
                "search_settings": {},
                "created_at": "2025-01-01T00:00:00Z"
            })
        );

        let parsed: WorkloadGroup = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, group);
    }

    #[test]
    fn test_deserialize_validates() {
        let err = serde_json::from_value::<WorkloadGroup>(json!({
            "id": "id-1",
            "name": "analytics",
            "resiliency_mode": "soft",
            "resource_limits": {"cpu": 3.0}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("cpu"));
    }
}
