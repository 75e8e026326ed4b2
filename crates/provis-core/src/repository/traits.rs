use std::sync::Arc;

use provis_version::Version;

use crate::error::Result;
use crate::metadata::{InstallableUnit, Requirement};

/// Repository interface - read-only source of installable units
pub trait Repository: Send + Sync {
    /// Get a unique name for this repository
    fn name(&self) -> &str;

    /// Find every unit with a capability matching the positive form of
    /// `requirement`. The requirement's own filter is not evaluated here.
    fn find_matches(&self, requirement: &Requirement) -> Result<Vec<Arc<InstallableUnit>>>;

    /// Get all units in the repository
    fn units(&self) -> Result<Vec<Arc<InstallableUnit>>>;

    /// Find a specific unit by identity
    fn find_unit(&self, id: &str, version: &Version) -> Result<Option<Arc<InstallableUnit>>> {
        Ok(self
            .units()?
            .into_iter()
            .find(|unit| unit.id() == id && unit.version() == version))
    }

    /// Find all versions of a unit, ascending
    fn find_versions(&self, id: &str) -> Result<Vec<Arc<InstallableUnit>>> {
        let mut units: Vec<_> = self.units()?.into_iter().filter(|unit| unit.id() == id).collect();
        units.sort();
        Ok(units)
    }
}
