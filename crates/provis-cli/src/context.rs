//! Shared command state: configuration, the profile registry and the
//! name of the profile being operated on.

use anyhow::{Context as _, Result};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use provis_core::engine::{ActionRegistry, PhaseSet};
use provis_core::profile::PROP_ENVIRONMENTS;
use provis_core::{
    Config, ConfigLoader, Engine, InMemoryRepository, Planner, Profile, ProfileRegistry, ProvisioningPlan,
    Repository, TouchpointType,
};

use crate::touchpoint::LoggingAction;

pub struct Context {
    pub config: Config,
    pub registry: Arc<ProfileRegistry>,
    pub profile_name: String,
    working_dir: PathBuf,
}

impl Context {
    pub fn load(working_dir: &Path, profile: Option<&str>) -> Result<Self> {
        let working_dir = working_dir
            .canonicalize()
            .context("Failed to resolve working directory")?;

        let config = Config::build(Some(&working_dir), true).context("Failed to load configuration")?;
        let loader = ConfigLoader::new(true);
        let registry_dir = config.get_registry_dir(&loader);
        log::debug!("Using profile registry at {}", registry_dir.display());

        let profile_name = profile
            .map(str::to_string)
            .unwrap_or_else(|| config.profile.clone());

        Ok(Self {
            registry: Arc::new(ProfileRegistry::open(registry_dir)),
            config,
            profile_name,
            working_dir,
        })
    }

    /// Load a JSON repository, resolving relative paths against the working directory
    pub fn repository(&self, path: &Path) -> Result<Arc<InMemoryRepository>> {
        let path = self.working_dir.join(path);
        let repository = InMemoryRepository::from_json_file(&path)
            .with_context(|| format!("Failed to load repository {}", path.display()))?;
        log::info!("Loaded {} unit(s) from {}", repository.len(), repository.name());
        Ok(Arc::new(repository))
    }

    /// Like [`Context::repository`], but an absent path yields an empty repository
    pub fn optional_repository(&self, path: Option<&Path>) -> Result<Arc<InMemoryRepository>> {
        match path {
            Some(path) => self.repository(path),
            None => Ok(Arc::new(InMemoryRepository::new("empty"))),
        }
    }

    pub fn planner(&self, repository: Arc<dyn Repository>) -> Planner {
        Planner::from_config(repository, &self.config)
    }

    /// Build an engine with the logging touchpoint registered for every
    /// touchpoint type the plan's units use
    pub fn engine(&self, plan: &ProvisioningPlan) -> Engine {
        let touchpoints: BTreeSet<TouchpointType> = plan
            .operands()
            .iter()
            .flat_map(|op| op.before().into_iter().chain(op.after()))
            .map(|unit| unit.touchpoint().clone())
            .filter(|touchpoint| !touchpoint.is_none())
            .collect();

        let action = Arc::new(LoggingAction::new());
        let mut actions = ActionRegistry::new();
        for touchpoint in touchpoints {
            for phase in PhaseSet::default().phases() {
                actions.register(*phase, touchpoint.clone(), action.clone());
            }
        }

        Engine::new(self.registry.clone(), Arc::new(actions))
    }

    pub fn current_profile(&self) -> Result<Option<Profile>> {
        self.registry
            .get_profile(&self.profile_name)
            .with_context(|| format!("Failed to read profile {}", self.profile_name))
    }

    /// The current profile, or an unsaved empty one carrying the configured environment
    pub fn profile_or_new(&self) -> Result<Profile> {
        Ok(match self.current_profile()? {
            Some(profile) => profile,
            None => {
                let mut profile = Profile::new(&self.profile_name);
                for (key, value) in self.initial_properties() {
                    profile.set_property(key, value);
                }
                profile
            }
        })
    }

    /// The current profile, created in the registry when missing
    pub fn ensure_profile(&self) -> Result<Profile> {
        if let Some(profile) = self.current_profile()? {
            return Ok(profile);
        }

        log::info!("Creating profile {}", self.profile_name);
        self.registry
            .add_profile(&self.profile_name, self.initial_properties())
            .with_context(|| format!("Failed to create profile {}", self.profile_name))
    }

    fn initial_properties(&self) -> IndexMap<String, String> {
        let mut properties = IndexMap::new();
        if !self.config.environment.is_empty() {
            properties.insert(PROP_ENVIRONMENTS.to_string(), self.config.environment.to_string());
        }
        properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("provis.json"),
            r#"{"registry-dir": "registry", "profile": "desk", "environment": "os=linux"}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("repository.json"),
            r#"{"name": "local", "units": [{"id": "tool", "version": "1.0.0", "touchpoint": "native"}]}"#,
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_load_uses_project_config() {
        let dir = project();
        let ctx = Context::load(dir.path(), None).unwrap();
        assert_eq!(ctx.profile_name, "desk");

        let ctx = Context::load(dir.path(), Some("other")).unwrap();
        assert_eq!(ctx.profile_name, "other");
    }

    #[test]
    fn test_ensure_profile_records_environment() {
        let dir = project();
        let ctx = Context::load(dir.path(), None).unwrap();
        assert!(ctx.current_profile().unwrap().is_none());

        let unsaved = ctx.profile_or_new().unwrap();
        assert_eq!(unsaved.property(PROP_ENVIRONMENTS), Some("os=linux"));
        assert!(ctx.current_profile().unwrap().is_none());

        let created = ctx.ensure_profile().unwrap();
        assert_eq!(created.property(PROP_ENVIRONMENTS), Some("os=linux"));
        assert!(dir.path().join("registry").join("desk.profile").is_dir());
        assert_eq!(ctx.ensure_profile().unwrap().timestamp(), created.timestamp());
    }

    #[test]
    fn test_repository_paths_are_relative_to_working_dir() {
        let dir = project();
        let ctx = Context::load(dir.path(), None).unwrap();

        assert_eq!(ctx.repository(Path::new("repository.json")).unwrap().len(), 1);
        assert!(ctx.repository(Path::new("missing.json")).is_err());
        assert!(ctx.optional_repository(None).unwrap().is_empty());
    }
}
