use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use provis_version::{Version, VersionRange};

use super::environment::Environment;
use super::filter::{is_applicable, Filter};

/// Namespace of the identity capability every unit provides
pub const NAMESPACE_UNIT: &str = "unit";

/// Identity of an installable unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitKey {
    pub id: String,
    pub version: Version,
}

impl UnitKey {
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        Self { id: id.into(), version }
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}

/// A named, versioned thing a unit provides
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capability {
    pub namespace: String,
    pub name: String,
    pub version: Version,
}

impl Capability {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, version: Version) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            version,
        }
    }

    /// Check this capability against a requirement.
    ///
    /// For a negated requirement the answer is inverted: any capability that
    /// does not match the positive form satisfies it.
    pub fn satisfies(&self, requirement: &Requirement) -> bool {
        requirement.matches_capability(self) != requirement.negated
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.namespace, self.name, self.version)
    }
}

fn default_true() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A capability a unit needs.
///
/// Requirements are mandatory, greedy and positive unless built otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Requirement {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub range: VersionRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub greedy: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub negated: bool,
}

impl Requirement {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, range: VersionRange) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            range,
            filter: None,
            optional: false,
            greedy: true,
            negated: false,
        }
    }

    /// Requirement on another unit's identity capability
    pub fn unit(id: impl Into<String>, range: VersionRange) -> Self {
        Self::new(NAMESPACE_UNIT, id, range)
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn non_greedy(mut self) -> Self {
        self.greedy = false;
        self
    }

    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// The positive form of this requirement
    pub fn positive(&self) -> Requirement {
        Self {
            negated: false,
            ..self.clone()
        }
    }

    /// Positive matching: namespace and name equal, version in range
    pub fn matches_capability(&self, capability: &Capability) -> bool {
        capability.namespace == self.namespace && capability.name == self.name && self.range.includes(&capability.version)
    }

    /// Whether any capability of `unit` matches the positive form
    pub fn matches_unit(&self, unit: &InstallableUnit) -> bool {
        unit.provided().iter().any(|cap| self.matches_capability(cap))
    }

    pub fn is_applicable(&self, env: &Environment) -> bool {
        is_applicable(self.filter.as_ref(), env)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "not ")?;
        }
        write!(f, "{}/{} {}", self.namespace, self.name, self.range)?;
        if self.optional {
            write!(f, " (optional)")?;
        }
        if !self.greedy {
            write!(f, " (non-greedy)")?;
        }
        Ok(())
    }
}

/// Tag selecting which family of actions applies a unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TouchpointType(String);

impl TouchpointType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Units with this touchpoint get no actions at all
    pub fn none() -> Self {
        Self(String::new())
    }

    pub fn is_none(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TouchpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("none")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// Reference to an artifact a unit needs on disk
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub classifier: String,
    pub id: String,
    pub version: Version,
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.classifier, self.id, self.version)
    }
}

/// Mutable description a unit is built from.
///
/// [`InstallableUnit`] deserializes through this type, so units read from
/// JSON always carry their identity capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitDescription {
    pub id: String,
    pub version: Version,
    #[serde(default)]
    pub provided: Vec<Capability>,
    #[serde(default)]
    pub required: Vec<Requirement>,
    #[serde(default)]
    pub filter: Option<Filter>,
    #[serde(default)]
    pub singleton: bool,
    #[serde(default)]
    pub touchpoint: TouchpointType,
    #[serde(default)]
    pub artifacts: Vec<ArtifactKey>,
    #[serde(default)]
    pub properties: IndexMap<String, String>,
}

impl UnitDescription {
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
            provided: Vec::new(),
            required: Vec::new(),
            filter: None,
            singleton: false,
            touchpoint: TouchpointType::none(),
            artifacts: Vec::new(),
            properties: IndexMap::new(),
        }
    }

    pub fn provides(mut self, capability: Capability) -> Self {
        self.provided.push(capability);
        self
    }

    pub fn requires(mut self, requirement: Requirement) -> Self {
        self.required.push(requirement);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn singleton(mut self, singleton: bool) -> Self {
        self.singleton = singleton;
        self
    }

    pub fn touchpoint(mut self, touchpoint: TouchpointType) -> Self {
        self.touchpoint = touchpoint;
        self
    }

    pub fn artifact(mut self, artifact: ArtifactKey) -> Self {
        self.artifacts.push(artifact);
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> InstallableUnit {
        InstallableUnit::from(self)
    }
}

/// An addressable, versioned software component.
///
/// Units are immutable. Equality, hashing and ordering only look at the
/// identity: id first, then version ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "UnitDescription")]
pub struct InstallableUnit {
    id: String,
    version: Version,
    provided: Vec<Capability>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    required: Vec<Requirement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Filter>,
    #[serde(skip_serializing_if = "is_false")]
    singleton: bool,
    #[serde(skip_serializing_if = "TouchpointType::is_none")]
    touchpoint: TouchpointType,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    artifacts: Vec<ArtifactKey>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    properties: IndexMap<String, String>,
}

impl InstallableUnit {
    pub fn builder(id: impl Into<String>, version: Version) -> UnitDescription {
        UnitDescription::new(id, version)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn key(&self) -> UnitKey {
        UnitKey::new(self.id.clone(), self.version.clone())
    }

    pub fn provided(&self) -> &[Capability] {
        &self.provided
    }

    pub fn required(&self) -> &[Requirement] {
        &self.required
    }

    pub fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    pub fn touchpoint(&self) -> &TouchpointType {
        &self.touchpoint
    }

    pub fn artifacts(&self) -> &[ArtifactKey] {
        &self.artifacts
    }

    pub fn properties(&self) -> &IndexMap<String, String> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Whether this unit's own filter admits the environment
    pub fn is_applicable(&self, env: &Environment) -> bool {
        is_applicable(self.filter.as_ref(), env)
    }

    /// Whether this unit provides a capability matching the positive form of `requirement`
    pub fn satisfies(&self, requirement: &Requirement) -> bool {
        requirement.matches_unit(self)
    }
}

impl From<UnitDescription> for InstallableUnit {
    fn from(mut desc: UnitDescription) -> Self {
        let has_identity = desc
            .provided
            .iter()
            .any(|cap| cap.namespace == NAMESPACE_UNIT && cap.name == desc.id && cap.version == desc.version);
        if !has_identity {
            desc.provided
                .insert(0, Capability::new(NAMESPACE_UNIT, desc.id.clone(), desc.version.clone()));
        }

        Self {
            id: desc.id,
            version: desc.version,
            provided: desc.provided,
            required: desc.required,
            filter: desc.filter,
            singleton: desc.singleton,
            touchpoint: desc.touchpoint,
            artifacts: desc.artifacts,
            properties: desc.properties,
        }
    }
}

impl PartialEq for InstallableUnit {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.version == other.version
    }
}

impl Eq for InstallableUnit {}

impl Hash for InstallableUnit {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.version.hash(state);
    }
}

impl PartialOrd for InstallableUnit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InstallableUnit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id).then_with(|| self.version.cmp(&other.version))
    }
}

impl fmt::Display for InstallableUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}
