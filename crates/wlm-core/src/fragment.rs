// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The updatable part of a workload group definition.
//!
//! A [`MutableWorkloadGroupFragment`] holds the resiliency mode, resource limits
//! and search-setting overrides of a group. The same type is used for partial
//! updates: a field left unset in an update body keeps its current value.
//!
//! `search_settings` is tri-state:
//!
//! | Value | Meaning | JSON |
//! |-------|---------|------|
//! | `None` | not specified | field absent (or `null` on input) |
//! | `Some({})` | explicitly cleared | `"search_settings": {}` |
//! | `Some({..})` | overrides | `"search_settings": {"timeout": "30s"}` |
//!
//! Field-level parsing and writing go through a small dispatch table keyed by
//! field name so the update API can handle one field at a time.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, WlmError};
use crate::resource::ResourceType;
use crate::search_settings::validate_search_settings;

/// Field name of the resiliency mode.
pub const RESILIENCY_MODE: &str = "resiliency_mode";
/// Field name of the resource limits.
pub const RESOURCE_LIMITS: &str = "resource_limits";
/// Field name of the search-setting overrides.
pub const SEARCH_SETTINGS: &str = "search_settings";

/// Resource limits: fraction of the node a group may use, per resource.
pub type ResourceLimits = BTreeMap<ResourceType, f64>;

/// Search-setting overrides: setting name to raw value.
pub type SearchSettings = BTreeMap<String, String>;

/// How strictly a workload group's limits are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum ResiliencyMode {
    /// The group may exceed its limits while the node is not in duress.
    Soft,
    /// The group never exceeds its limits; breaches are cancelled immediately.
    Enforced,
    /// Breaches are only logged.
    Monitor,
}

impl ResiliencyMode {
    /// Wire name of the mode.
    pub fn name(&self) -> &'static str {
        match self {
            ResiliencyMode::Soft => "soft",
            ResiliencyMode::Enforced => "enforced",
            ResiliencyMode::Monitor => "monitor",
        }
    }

    /// Parse a mode from its name (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self> {
        [
            ResiliencyMode::Soft,
            ResiliencyMode::Enforced,
            ResiliencyMode::Monitor,
        ]
        .into_iter()
        .find(|m| m.name().eq_ignore_ascii_case(name))
        .ok_or_else(|| {
            WlmError::invalid_argument(
                RESILIENCY_MODE,
                format!("Invalid value for WorkloadGroupMode: {}", name),
            )
        })
    }
}

impl TryFrom<String> for ResiliencyMode {
    type Error = WlmError;

    fn try_from(value: String) -> Result<Self> {
        Self::from_name(&value)
    }
}

impl fmt::Display for ResiliencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Updatable fields of a workload group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFragment")]
pub struct MutableWorkloadGroupFragment {
    #[serde(skip_serializing_if = "Option::is_none")]
    resiliency_mode: Option<ResiliencyMode>,
    resource_limits: ResourceLimits,
    #[serde(skip_serializing_if = "Option::is_none")]
    search_settings: Option<SearchSettings>,
}

/// Unvalidated wire shape.
#[derive(Deserialize)]
struct RawFragment {
    resiliency_mode: Option<ResiliencyMode>,
    #[serde(default)]
    resource_limits: ResourceLimits,
    search_settings: Option<SearchSettings>,
}

impl TryFrom<RawFragment> for MutableWorkloadGroupFragment {
    type Error = WlmError;

    fn try_from(raw: RawFragment) -> Result<Self> {
        Self::new(raw.resiliency_mode, raw.resource_limits, raw.search_settings)
    }
}

// Limits are validated to lie in (0, 1], so no NaN can be stored.
impl Eq for MutableWorkloadGroupFragment {}

impl Hash for MutableWorkloadGroupFragment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.resiliency_mode.hash(state);
        for (resource, limit) in &self.resource_limits {
            resource.hash(state);
            limit.to_bits().hash(state);
        }
        // Option's discriminant keeps "unset" and "empty" apart.
        self.search_settings.hash(state);
    }
}

type FieldParser = fn(&mut MutableWorkloadGroupFragment, &Value) -> Result<()>;
type FieldWriter = fn(&MutableWorkloadGroupFragment) -> Option<Value>;

struct FieldHandler {
    name: &'static str,
    parse: FieldParser,
    write: FieldWriter,
}

const FIELD_HANDLERS: [FieldHandler; 3] = [
    FieldHandler {
        name: RESILIENCY_MODE,
        parse: parse_resiliency_mode,
        write: write_resiliency_mode,
    },
    FieldHandler {
        name: RESOURCE_LIMITS,
        parse: parse_resource_limits,
        write: write_resource_limits,
    },
    FieldHandler {
        name: SEARCH_SETTINGS,
        parse: parse_search_settings,
        write: write_search_settings,
    },
];

fn handler_for(field: &str) -> Option<&'static FieldHandler> {
    FIELD_HANDLERS.iter().find(|h| h.name == field)
}

fn parsing_error(field: &str) -> WlmError {
    WlmError::invalid_argument(
        field,
        format!("parsing error encountered for the field '{}'", field),
    )
}

fn parse_resiliency_mode(fragment: &mut MutableWorkloadGroupFragment, raw: &Value) -> Result<()> {
    let name = raw.as_str().ok_or_else(|| parsing_error(RESILIENCY_MODE))?;
    fragment.set_resiliency_mode(ResiliencyMode::from_name(name)?);
    Ok(())
}

fn parse_resource_limits(fragment: &mut MutableWorkloadGroupFragment, raw: &Value) -> Result<()> {
    let object = raw.as_object().ok_or_else(|| parsing_error(RESOURCE_LIMITS))?;
    let mut limits = ResourceLimits::new();
    for (name, value) in object {
        let resource = ResourceType::from_name(name)?;
        let limit = value.as_f64().ok_or_else(|| parsing_error(RESOURCE_LIMITS))?;
        limits.insert(resource, limit);
    }
    fragment.set_resource_limits(limits)
}

fn parse_search_settings(fragment: &mut MutableWorkloadGroupFragment, raw: &Value) -> Result<()> {
    if raw.is_null() {
        return fragment.set_search_settings(None);
    }
    let object = raw.as_object().ok_or_else(|| parsing_error(SEARCH_SETTINGS))?;
    let mut settings = SearchSettings::new();
    for (name, value) in object {
        let value = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return Err(parsing_error(SEARCH_SETTINGS)),
        };
        settings.insert(name.clone(), value);
    }
    fragment.set_search_settings(Some(settings))
}

fn write_resiliency_mode(fragment: &MutableWorkloadGroupFragment) -> Option<Value> {
    fragment
        .resiliency_mode
        .map(|mode| Value::String(mode.name().to_string()))
}

fn write_resource_limits(fragment: &MutableWorkloadGroupFragment) -> Option<Value> {
    let object: Map<String, Value> = fragment
        .resource_limits
        .iter()
        .map(|(resource, limit)| (resource.name().to_string(), Value::from(*limit)))
        .collect();
    Some(Value::Object(object))
}

fn write_search_settings(fragment: &MutableWorkloadGroupFragment) -> Option<Value> {
    fragment.search_settings.as_ref().map(|settings| {
        Value::Object(
            settings
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    })
}

impl MutableWorkloadGroupFragment {
    /// Names of the fields a fragment accepts.
    pub const ACCEPTED_FIELDS: [&'static str; 3] = [RESILIENCY_MODE, RESOURCE_LIMITS, SEARCH_SETTINGS];

    /// Create a validated fragment.
    pub fn new(
        resiliency_mode: Option<ResiliencyMode>,
        resource_limits: ResourceLimits,
        search_settings: Option<SearchSettings>,
    ) -> Result<Self> {
        validate_resource_limits(&resource_limits)?;
        validate_search_settings(search_settings.as_ref())?;
        Ok(Self {
            resiliency_mode,
            resource_limits,
            search_settings,
        })
    }

    /// Parse an update body, picking up every accepted field that is present.
    ///
    /// Keys that do not belong to the fragment (such as `name`) are ignored.
    pub fn from_json(body: &Value) -> Result<Self> {
        let object = body.as_object().ok_or_else(|| {
            WlmError::invalid_argument("body", "workload group body must be a JSON object")
        })?;
        let mut fragment = Self::default();
        for (field, raw) in object {
            if Self::should_parse(field) {
                fragment.parse_field(field, raw)?;
            }
        }
        Ok(fragment)
    }

    /// Whether `field` is one of the fragment's fields.
    pub fn should_parse(field: &str) -> bool {
        handler_for(field).is_some()
    }

    /// Parse and apply a single field from its JSON value.
    pub fn parse_field(&mut self, field: &str, raw: &Value) -> Result<()> {
        let handler = handler_for(field).ok_or_else(|| {
            WlmError::invalid_argument(field, format!("unknown workload group field [{}]", field))
        })?;
        (handler.parse)(self, raw)
    }

    /// Serialize a single field.
    ///
    /// Returns `Ok(None)` when the field is unset (a `None` resiliency mode or
    /// unspecified search settings), so the caller omits it.
    pub fn write_field(&self, field: &str) -> Result<Option<Value>> {
        let handler = handler_for(field).ok_or_else(|| {
            WlmError::invalid_argument(field, format!("unknown workload group field [{}]", field))
        })?;
        Ok((handler.write)(self))
    }

    /// The resiliency mode, if set.
    pub fn resiliency_mode(&self) -> Option<ResiliencyMode> {
        self.resiliency_mode
    }

    /// Per-resource limits. A missing resource is unlimited.
    pub fn resource_limits(&self) -> &ResourceLimits {
        &self.resource_limits
    }

    /// The limit for one resource, if any.
    pub fn resource_limit(&self, resource: ResourceType) -> Option<f64> {
        self.resource_limits.get(&resource).copied()
    }

    /// Search-setting overrides; `None` when not specified.
    pub fn search_settings(&self) -> Option<&SearchSettings> {
        self.search_settings.as_ref()
    }

    /// Set the resiliency mode.
    pub fn set_resiliency_mode(&mut self, mode: ResiliencyMode) {
        self.resiliency_mode = Some(mode);
    }

    /// Replace the resource limits after validating them.
    pub fn set_resource_limits(&mut self, limits: ResourceLimits) -> Result<()> {
        validate_resource_limits(&limits)?;
        self.resource_limits = limits;
        Ok(())
    }

    /// Replace the search settings after validating them.
    pub fn set_search_settings(&mut self, settings: Option<SearchSettings>) -> Result<()> {
        validate_search_settings(settings.as_ref())?;
        self.search_settings = settings;
        Ok(())
    }

    /// Apply a partial update: every field set in `update` replaces the current
    /// value, resource limits are merged per resource.
    pub fn merged_with(&self, update: &MutableWorkloadGroupFragment) -> Self {
        let mut resource_limits = self.resource_limits.clone();
        resource_limits.extend(update.resource_limits.iter().map(|(r, l)| (*r, *l)));
        Self {
            resiliency_mode: update.resiliency_mode.or(self.resiliency_mode),
            resource_limits,
            search_settings: update
                .search_settings
                .clone()
                .or_else(|| self.search_settings.clone()),
        }
    }
}

/// Check that every limit lies in `(0.0, 1.0]`.
pub fn validate_resource_limits(limits: &ResourceLimits) -> Result<()> {
    for (resource, limit) in limits {
        if !(*limit > 0.0 && *limit <= 1.0) {
            return Err(WlmError::invalid_argument(
                RESOURCE_LIMITS,
                format!(
                    "resource value for {} should be greater than 0 and less or equal to 1.0, got {}",
                    resource, limit
                ),
            ));
        }
    }
    Ok(())
}
