use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use provis_version::Version;

use super::traits::Repository;
use crate::error::{ProvisionError, Result};
use crate::metadata::{InstallableUnit, Requirement, UnitKey};

/// On-disk layout of a repository file
#[derive(Debug, Default, Serialize, Deserialize)]
struct RepositoryFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default)]
    units: Vec<InstallableUnit>,
}

/// Repository holding its units in memory, indexed by provided capability
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    name: String,
    units: IndexMap<UnitKey, Arc<InstallableUnit>>,
    /// (namespace, name) -> keys of units providing it
    capabilities: HashMap<(String, String), Vec<UnitKey>>,
}

impl InMemoryRepository {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_units(name: impl Into<String>, units: impl IntoIterator<Item = Arc<InstallableUnit>>) -> Self {
        let mut repo = Self::new(name);
        for unit in units {
            repo.add_unit(unit);
        }
        repo
    }

    /// Add a unit; a unit with the same identity replaces the previous one
    pub fn add_unit(&mut self, unit: Arc<InstallableUnit>) {
        let key = unit.key();
        if self.units.insert(key.clone(), unit.clone()).is_some() {
            for keys in self.capabilities.values_mut() {
                keys.retain(|k| k != &key);
            }
        }
        for cap in unit.provided() {
            self.capabilities
                .entry((cap.namespace.clone(), cap.name.clone()))
                .or_default()
                .push(key.clone());
        }
    }

    /// Load a JSON repository file: `{"name": "...", "units": [...]}`
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ProvisionError::RepositoryUnavailable {
            repository: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let default_name = path.display().to_string();
        Self::from_json_str(&contents, &default_name).map_err(|e| ProvisionError::RepositoryUnavailable {
            repository: default_name.clone(),
            reason: e.to_string(),
        })
    }

    pub fn from_json_str(contents: &str, default_name: &str) -> Result<Self> {
        let file: RepositoryFile = serde_json::from_str(contents)?;
        let name = file.name.unwrap_or_else(|| default_name.to_string());
        Ok(Self::with_units(name, file.units.into_iter().map(Arc::new)))
    }

    /// Serialize this repository in the format read by [`Self::from_json_file`]
    pub fn to_json(&self) -> Result<String> {
        let file = RepositoryFile {
            name: Some(self.name.clone()),
            units: self.units.values().map(|unit| unit.as_ref().clone()).collect(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl Repository for InMemoryRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn find_matches(&self, requirement: &Requirement) -> Result<Vec<Arc<InstallableUnit>>> {
        let key = (requirement.namespace.clone(), requirement.name.clone());
        let Some(keys) = self.capabilities.get(&key) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<Arc<InstallableUnit>> = keys
            .iter()
            .filter_map(|k| self.units.get(k))
            .filter(|unit| requirement.matches_unit(unit))
            .cloned()
            .collect();
        matches.sort();
        matches.dedup();
        Ok(matches)
    }

    fn units(&self) -> Result<Vec<Arc<InstallableUnit>>> {
        Ok(self.units.values().cloned().collect())
    }

    fn find_unit(&self, id: &str, version: &Version) -> Result<Option<Arc<InstallableUnit>>> {
        Ok(self.units.get(&UnitKey::new(id, version.clone())).cloned())
    }
}
