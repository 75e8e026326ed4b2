use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, Result};
use crate::metadata::{Environment, InstallableUnit, UnitKey};

/// Unit property marking a unit the user asked for
pub const PROP_ROOT: &str = "provis.type.root";
/// Unit property recording how a root was requested
pub const PROP_INCLUSION: &str = "provis.inclusion.rule";
/// Profile property holding the filter context, `key=value,key=value`
pub const PROP_ENVIRONMENTS: &str = "provis.environments";

/// How a root unit is requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InclusionRule {
    /// Must be installed, or the plan fails
    #[default]
    Strict,
    /// Installed when possible, silently left out otherwise
    Optional,
}

impl InclusionRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            InclusionRule::Strict => "strict",
            InclusionRule::Optional => "optional",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "strict" => Some(InclusionRule::Strict),
            "optional" => Some(InclusionRule::Optional),
            _ => None,
        }
    }
}

impl fmt::Display for InclusionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit recorded in a profile together with its per-unit properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledUnit {
    pub unit: Arc<InstallableUnit>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, String>,
}

impl InstalledUnit {
    pub fn new(unit: Arc<InstallableUnit>) -> Self {
        Self {
            unit,
            properties: IndexMap::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.properties.get(PROP_ROOT).map(|v| v == "true").unwrap_or(false)
    }

    pub fn inclusion_rule(&self) -> InclusionRule {
        self.properties
            .get(PROP_INCLUSION)
            .and_then(|rule| InclusionRule::from_str(rule))
            .unwrap_or_default()
    }
}

/// Persisted layout of a profile snapshot
#[derive(Debug, Serialize, Deserialize)]
struct ProfileData {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<i64>,
    #[serde(default)]
    properties: IndexMap<String, String>,
    #[serde(default)]
    units: Vec<InstalledUnit>,
}

/// A named installation state.
///
/// Profiles are edited freely in memory. Once persisted by the registry a
/// snapshot carries its timestamp and is never rewritten; the next change is
/// a new snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ProfileData", into = "ProfileData")]
pub struct Profile {
    name: String,
    timestamp: Option<i64>,
    properties: IndexMap<String, String>,
    units: BTreeMap<UnitKey, InstalledUnit>,
}

impl From<ProfileData> for Profile {
    fn from(data: ProfileData) -> Self {
        Self {
            name: data.name,
            timestamp: data.timestamp,
            properties: data.properties,
            units: data.units.into_iter().map(|iu| (iu.unit.key(), iu)).collect(),
        }
    }
}

impl From<Profile> for ProfileData {
    fn from(profile: Profile) -> Self {
        Self {
            name: profile.name,
            timestamp: profile.timestamp,
            properties: profile.properties,
            units: profile.units.into_values().collect(),
        }
    }
}

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timestamp: None,
            properties: IndexMap::new(),
            units: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Milliseconds since the epoch of the snapshot this profile was read
    /// from, None if it was never persisted
    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        self.timestamp.and_then(DateTime::from_timestamp_millis)
    }

    pub(crate) fn set_timestamp(&mut self, timestamp: Option<i64>) {
        self.timestamp = timestamp;
    }

    /// Copy of this profile's content under another name, not yet persisted
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timestamp: None,
            ..self.clone()
        }
    }

    pub fn properties(&self) -> &IndexMap<String, String> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn remove_property(&mut self, key: &str) -> Option<String> {
        self.properties.shift_remove(key)
    }

    /// Filter context stored on the profile
    pub fn environment(&self) -> Result<Environment> {
        match self.property(PROP_ENVIRONMENTS) {
            Some(raw) => Environment::parse(raw).map_err(|e| {
                ProvisionError::Config(format!("Profile {} has invalid {}: {}", self.name, PROP_ENVIRONMENTS, e))
            }),
            None => Ok(Environment::new()),
        }
    }

    /// Installed units in (id, version) order
    pub fn units(&self) -> impl Iterator<Item = &Arc<InstallableUnit>> {
        self.units.values().map(|iu| &iu.unit)
    }

    pub fn installed(&self) -> impl Iterator<Item = &InstalledUnit> {
        self.units.values()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn contains(&self, key: &UnitKey) -> bool {
        self.units.contains_key(key)
    }

    pub fn unit(&self, key: &UnitKey) -> Option<&InstalledUnit> {
        self.units.get(key)
    }

    /// Installed units with the given id, ascending by version
    pub fn find_by_id(&self, id: &str) -> Vec<&Arc<InstallableUnit>> {
        self.units.values().filter(|iu| iu.unit.id() == id).map(|iu| &iu.unit).collect()
    }

    /// Add a unit, keeping its properties if it is already installed
    pub fn add_unit(&mut self, unit: Arc<InstallableUnit>) {
        self.units
            .entry(unit.key())
            .or_insert_with(|| InstalledUnit::new(unit));
    }

    /// Add or replace a unit together with its properties
    pub fn add_installed(&mut self, installed: InstalledUnit) {
        self.units.insert(installed.unit.key(), installed);
    }

    pub fn remove_unit(&mut self, key: &UnitKey) -> Option<InstalledUnit> {
        self.units.remove(key)
    }

    pub fn unit_property(&self, key: &UnitKey, property: &str) -> Option<&str> {
        self.units
            .get(key)
            .and_then(|iu| iu.properties.get(property))
            .map(String::as_str)
    }

    /// Set a per-unit property; returns false when the unit is not installed
    pub fn set_unit_property(&mut self, key: &UnitKey, property: impl Into<String>, value: impl Into<String>) -> bool {
        match self.units.get_mut(key) {
            Some(iu) => {
                iu.properties.insert(property.into(), value.into());
                true
            }
            None => false,
        }
    }

    pub fn remove_unit_property(&mut self, key: &UnitKey, property: &str) -> Option<String> {
        self.units
            .get_mut(key)
            .and_then(|iu| iu.properties.shift_remove(property))
    }

    /// Units the user asked for, with the rule they were requested under
    pub fn roots(&self) -> Vec<(Arc<InstallableUnit>, InclusionRule)> {
        self.units
            .values()
            .filter(|iu| iu.is_root())
            .map(|iu| (iu.unit.clone(), iu.inclusion_rule()))
            .collect()
    }

    /// Whether two profiles hold the same units and properties, ignoring
    /// name and timestamp
    pub fn same_state(&self, other: &Profile) -> bool {
        self.properties == other.properties && self.units == other.units
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.timestamp {
            Some(ts) => write!(f, "{}@{}", self.name, ts),
            None => write!(f, "{}", self.name),
        }
    }
}
