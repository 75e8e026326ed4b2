use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::source::{ConfigLoader, ConfigSource, RawConfig};
use crate::error::{ProvisionError, Result};
use crate::metadata::Environment;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Seconds the solver may run before giving up
    #[serde(rename = "solver-timeout", default = "default_solver_timeout")]
    pub solver_timeout: u64,

    /// Directory receiving a copy of every solver problem
    #[serde(rename = "dump-dir", default, skip_serializing_if = "Option::is_none")]
    pub dump_dir: Option<PathBuf>,

    #[serde(rename = "registry-dir", default, skip_serializing_if = "Option::is_none")]
    pub registry_dir: Option<PathBuf>,

    /// Default filter context, overlaid by the profile's own environment
    #[serde(default)]
    pub environment: Environment,

    /// Profile used when a command names none
    #[serde(default = "default_profile")]
    pub profile: String,

    #[serde(skip)]
    base_dir: Option<PathBuf>,

    #[serde(skip)]
    sources: HashMap<String, ConfigSource>,
}

fn default_solver_timeout() -> u64 {
    60
}

fn default_profile() -> String {
    "default".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            solver_timeout: default_solver_timeout(),
            dump_dir: None,
            registry_dir: None,
            environment: Environment::new(),
            profile: default_profile(),
            base_dir: None,
            sources: HashMap::new(),
        }
    }
}

impl Config {
    const KEYS: [&'static str; 5] = ["solver-timeout", "dump-dir", "registry-dir", "environment", "profile"];

    /// Build configuration from all sources (defaults, global, project, env)
    pub fn build<P: AsRef<Path>>(project_dir: Option<P>, use_environment: bool) -> Result<Self> {
        let loader = ConfigLoader::new(use_environment);
        let mut config = Self::default();

        if let Some(ref dir) = project_dir {
            config.base_dir = Some(dir.as_ref().to_path_buf());
        }

        for key in Self::KEYS {
            config.sources.insert(key.to_string(), ConfigSource::Default);
        }

        // 1. Global provis.json
        let global_config = loader.load_global_config()?;
        config.merge_raw_config(global_config, ConfigSource::Global)?;

        // 2. Project provis.json
        if let Some(project_dir) = &project_dir {
            let project_config = loader.load_project_config(project_dir)?;
            config.merge_raw_config(project_config, ConfigSource::Project)?;
        }

        // 3. Environment variable overrides
        if use_environment {
            config.apply_env_overrides(&loader)?;
        }

        log::debug!(
            "Configuration loaded (solver-timeout={}s, registry-dir={:?})",
            config.solver_timeout,
            config.registry_dir
        );

        Ok(config)
    }

    /// Get the source of a configuration value
    pub fn get_source(&self, key: &str) -> Option<&ConfigSource> {
        self.sources.get(key)
    }

    /// Override a value programmatically, e.g. from a command line flag
    pub fn set(&mut self, key: &str, value: serde_json::Value) -> Result<()> {
        self.merge_config_value(key, value, ConfigSource::Command)
    }

    pub fn solver_timeout(&self) -> Duration {
        Duration::from_secs(self.solver_timeout)
    }

    /// Registry directory (resolved as absolute path)
    pub fn get_registry_dir(&self, loader: &ConfigLoader) -> PathBuf {
        match &self.registry_dir {
            Some(dir) => self.resolve_path(dir),
            None => loader.get_data_dir(),
        }
    }

    pub fn get_dump_dir(&self) -> Option<PathBuf> {
        self.dump_dir.as_ref().map(|dir| self.resolve_path(dir))
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else if let Some(ref base) = self.base_dir {
            base.join(path)
        } else {
            path.to_path_buf()
        }
    }

    fn merge_raw_config(&mut self, raw: RawConfig, source: ConfigSource) -> Result<()> {
        for (key, value) in raw.values {
            self.merge_config_value(&key, value, source.clone())?;
        }
        Ok(())
    }

    fn merge_config_value(&mut self, key: &str, value: serde_json::Value, source: ConfigSource) -> Result<()> {
        let invalid = || ProvisionError::Config(format!("Invalid value for \"{}\" from {}", key, source.as_str()));

        match key {
            "solver-timeout" => {
                self.solver_timeout = value.as_u64().ok_or_else(invalid)?;
            }
            "dump-dir" => {
                self.dump_dir = Some(PathBuf::from(value.as_str().ok_or_else(invalid)?));
            }
            "registry-dir" => {
                self.registry_dir = Some(PathBuf::from(value.as_str().ok_or_else(invalid)?));
            }
            "environment" => {
                self.environment = match value {
                    serde_json::Value::String(s) => Environment::parse(&s)?,
                    other => serde_json::from_value(other).map_err(|_| invalid())?,
                };
            }
            "profile" => {
                self.profile = value.as_str().ok_or_else(invalid)?.to_string();
            }
            _ => {
                log::warn!("Ignoring unknown configuration key \"{}\" from {}", key, source.as_str());
                return Ok(());
            }
        }

        self.sources.insert(key.to_string(), source);
        Ok(())
    }

    fn apply_env_overrides(&mut self, loader: &ConfigLoader) -> Result<()> {
        if let Some(raw) = loader.get_env_config("solver-timeout") {
            let timeout = raw
                .parse::<u64>()
                .map_err(|_| ProvisionError::Config(format!("Invalid PROVIS_SOLVER_TIMEOUT \"{}\"", raw)))?;
            self.solver_timeout = timeout;
            self.sources.insert(
                "solver-timeout".to_string(),
                ConfigSource::Environment(ConfigLoader::env_var_name("solver-timeout")),
            );
        }

        if let Some(dump_dir) = loader.get_env_path("dump-dir") {
            self.dump_dir = Some(dump_dir);
            self.sources.insert(
                "dump-dir".to_string(),
                ConfigSource::Environment(ConfigLoader::env_var_name("dump-dir")),
            );
        }

        if let Some(registry_dir) = loader.get_env_path("registry-dir") {
            self.registry_dir = Some(registry_dir);
            self.sources.insert(
                "registry-dir".to_string(),
                ConfigSource::Environment(ConfigLoader::env_var_name("registry-dir")),
            );
        }

        if let Some(environment) = loader.get_env_config("environment") {
            self.environment = Environment::parse(&environment)?;
            self.sources.insert(
                "environment".to_string(),
                ConfigSource::Environment(ConfigLoader::env_var_name("environment")),
            );
        }

        if let Some(profile) = loader.get_env_config("profile") {
            self.profile = profile;
            self.sources.insert(
                "profile".to_string(),
                ConfigSource::Environment(ConfigLoader::env_var_name("profile")),
            );
        }

        Ok(())
    }
}
