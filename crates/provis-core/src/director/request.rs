use std::sync::Arc;

use indexmap::IndexMap;

use crate::metadata::{InstallableUnit, UnitKey};
pub use crate::profile::InclusionRule;
use crate::profile::Profile;

/// A change to apply to a profile: units to add or remove and properties to
/// set or clear.
///
/// Property values of `None` mean removal.
#[derive(Debug, Clone)]
pub struct ProfileChangeRequest {
    profile: Profile,
    additions: IndexMap<UnitKey, (Arc<InstallableUnit>, InclusionRule)>,
    removals: Vec<UnitKey>,
    inclusion_rules: IndexMap<UnitKey, InclusionRule>,
    property_changes: IndexMap<String, Option<String>>,
    unit_property_changes: IndexMap<UnitKey, IndexMap<String, Option<String>>>,
}

impl ProfileChangeRequest {
    /// Start a request against the given profile snapshot
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            additions: IndexMap::new(),
            removals: Vec::new(),
            inclusion_rules: IndexMap::new(),
            property_changes: IndexMap::new(),
            unit_property_changes: IndexMap::new(),
        }
    }

    /// Request a unit as a strict root
    pub fn add_unit(&mut self, unit: Arc<InstallableUnit>) -> &mut Self {
        self.additions.insert(unit.key(), (unit, InclusionRule::Strict));
        self
    }

    /// Request a unit that is installed only if it fits
    pub fn add_optional_unit(&mut self, unit: Arc<InstallableUnit>) -> &mut Self {
        self.additions.insert(unit.key(), (unit, InclusionRule::Optional));
        self
    }

    pub fn add_units(&mut self, units: impl IntoIterator<Item = Arc<InstallableUnit>>) -> &mut Self {
        for unit in units {
            self.add_unit(unit);
        }
        self
    }

    /// Change how a root (added here or already in the profile) is requested
    pub fn set_inclusion_rule(&mut self, key: &UnitKey, rule: InclusionRule) -> &mut Self {
        if let Some((_, current)) = self.additions.get_mut(key) {
            *current = rule;
        } else {
            self.inclusion_rules.insert(key.clone(), rule);
        }
        self
    }

    /// Stop requesting a unit. It stays installed only if something else
    /// still needs it.
    pub fn remove_unit(&mut self, key: UnitKey) -> &mut Self {
        if !self.removals.contains(&key) {
            self.removals.push(key);
        }
        self
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.property_changes.insert(key.into(), Some(value.into()));
        self
    }

    pub fn remove_property(&mut self, key: impl Into<String>) -> &mut Self {
        self.property_changes.insert(key.into(), None);
        self
    }

    pub fn set_unit_property(
        &mut self,
        unit: &UnitKey,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.unit_property_changes
            .entry(unit.clone())
            .or_default()
            .insert(key.into(), Some(value.into()));
        self
    }

    pub fn remove_unit_property(&mut self, unit: &UnitKey, key: impl Into<String>) -> &mut Self {
        self.unit_property_changes
            .entry(unit.clone())
            .or_default()
            .insert(key.into(), None);
        self
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn additions(&self) -> impl Iterator<Item = (&Arc<InstallableUnit>, InclusionRule)> {
        self.additions.values().map(|(unit, rule)| (unit, *rule))
    }

    pub fn removals(&self) -> &[UnitKey] {
        &self.removals
    }

    pub fn property_changes(&self) -> &IndexMap<String, Option<String>> {
        &self.property_changes
    }

    pub fn unit_property_changes(&self) -> &IndexMap<UnitKey, IndexMap<String, Option<String>>> {
        &self.unit_property_changes
    }

    /// Roots after the change: the profile's roots, minus removals, plus
    /// additions. A unit both in the profile and added takes the added rule.
    pub fn roots(&self) -> IndexMap<UnitKey, (Arc<InstallableUnit>, InclusionRule)> {
        let mut roots: IndexMap<UnitKey, (Arc<InstallableUnit>, InclusionRule)> = self
            .profile
            .roots()
            .into_iter()
            .map(|(unit, rule)| (unit.key(), (unit, rule)))
            .collect();

        for key in &self.removals {
            roots.shift_remove(key);
        }
        for (key, rule) in &self.inclusion_rules {
            if let Some((_, current)) = roots.get_mut(key) {
                *current = *rule;
            }
        }
        for (key, addition) in &self.additions {
            roots.insert(key.clone(), addition.clone());
        }
        roots
    }
}
