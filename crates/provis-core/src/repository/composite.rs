use std::sync::Arc;

use indexmap::IndexMap;

use super::traits::Repository;
use crate::error::Result;
use crate::metadata::{InstallableUnit, Requirement};

/// Union of several repositories. When two children hold the same unit
/// identity the first one wins.
#[derive(Clone, Default)]
pub struct CompositeRepository {
    name: String,
    children: Vec<Arc<dyn Repository>>,
}

impl CompositeRepository {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn add(&mut self, repository: Arc<dyn Repository>) {
        self.children.push(repository);
    }

    pub fn with(mut self, repository: Arc<dyn Repository>) -> Self {
        self.add(repository);
        self
    }

    pub fn children(&self) -> &[Arc<dyn Repository>] {
        &self.children
    }

    fn collect<F>(&self, mut query: F) -> Result<Vec<Arc<InstallableUnit>>>
    where
        F: FnMut(&dyn Repository) -> Result<Vec<Arc<InstallableUnit>>>,
    {
        let mut seen = IndexMap::new();
        for child in &self.children {
            for unit in query(child.as_ref())? {
                seen.entry(unit.key()).or_insert(unit);
            }
        }
        let mut units: Vec<_> = seen.into_values().collect();
        units.sort();
        Ok(units)
    }
}

impl Repository for CompositeRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn find_matches(&self, requirement: &Requirement) -> Result<Vec<Arc<InstallableUnit>>> {
        self.collect(|repo| repo.find_matches(requirement))
    }

    fn units(&self) -> Result<Vec<Arc<InstallableUnit>>> {
        self.collect(|repo| repo.units())
    }
}
