use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ProvisionError, Result};

/// Name of the configuration file looked up globally and per project
pub const CONFIG_FILE: &str = "provis.json";

/// Represents the source of a configuration value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Default built-in value
    Default,
    /// From the global provis.json
    Global,
    /// From the project provis.json
    Project,
    /// From environment variable
    Environment(String),
    /// Programmatically set
    Command,
}

impl ConfigSource {
    pub fn as_str(&self) -> &str {
        match self {
            ConfigSource::Default => "default",
            ConfigSource::Global => "global",
            ConfigSource::Project => "project",
            ConfigSource::Environment(var) => var,
            ConfigSource::Command => "command",
        }
    }
}

/// Raw configuration data as read from a provis.json file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawConfig {
    pub values: IndexMap<String, serde_json::Value>,
}

/// Loads configuration from various sources
#[derive(Debug)]
pub struct ConfigLoader {
    use_environment: bool,
}

impl ConfigLoader {
    pub fn new(use_environment: bool) -> Self {
        Self { use_environment }
    }

    /// Get a PROVIS_* environment variable
    pub fn get_provis_env(&self, var: &str) -> Option<String> {
        if !self.use_environment {
            return None;
        }

        env::var(var).ok().filter(|s| !s.is_empty())
    }

    /// Get the provis home directory holding the global configuration
    pub fn get_provis_home(&self) -> PathBuf {
        if let Some(home) = self.get_provis_env("PROVIS_HOME") {
            return PathBuf::from(home);
        }

        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "provis") {
            proj_dirs.config_dir().to_path_buf()
        } else if let Some(home_dir) = directories::BaseDirs::new() {
            home_dir.home_dir().join(".provis")
        } else {
            PathBuf::from(".provis")
        }
    }

    /// Get the default profile registry directory
    pub fn get_data_dir(&self) -> PathBuf {
        if let Some(home) = self.get_provis_env("PROVIS_HOME") {
            return PathBuf::from(home).join("registry");
        }

        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "provis") {
            proj_dirs.data_dir().join("registry")
        } else {
            self.get_provis_home().join("registry")
        }
    }

    /// Load configuration from a JSON file; a missing file is empty
    pub fn load_config_file<P: AsRef<Path>>(&self, path: P) -> Result<RawConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(RawConfig::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| ProvisionError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let config: RawConfig = serde_json::from_str(&contents)
            .map_err(|e| ProvisionError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        Ok(config)
    }

    pub fn load_global_config(&self) -> Result<RawConfig> {
        self.load_config_file(self.get_provis_home().join(CONFIG_FILE))
    }

    pub fn load_project_config<P: AsRef<Path>>(&self, project_dir: P) -> Result<RawConfig> {
        self.load_config_file(project_dir.as_ref().join(CONFIG_FILE))
    }

    /// Get a configuration value from environment variable
    /// Converts "foo-bar" to "PROVIS_FOO_BAR"
    pub fn get_env_config(&self, key: &str) -> Option<String> {
        let env_var = Self::env_var_name(key);
        self.get_provis_env(&env_var)
    }

    pub fn env_var_name(key: &str) -> String {
        format!("PROVIS_{}", key.replace('-', "_").to_uppercase())
    }

    /// Get unsigned integer value from environment variable
    pub fn get_env_u64(&self, key: &str) -> Option<u64> {
        self.get_env_config(key).and_then(|val| val.parse().ok())
    }

    /// Get a path value from environment variable
    pub fn get_env_path(&self, key: &str) -> Option<PathBuf> {
        self.get_env_config(key).map(PathBuf::from)
    }
}
