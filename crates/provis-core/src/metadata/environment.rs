use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, Result};

/// Key/value context that unit and requirement filters are evaluated against.
///
/// Keys are case-insensitive; values are compared as written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "IndexMap<String, String>", into = "IndexMap<String, String>")]
pub struct Environment {
    values: IndexMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `key=value,key=value`. Empty entries are ignored.
    pub fn parse(input: &str) -> Result<Self> {
        let mut env = Self::new();
        for entry in input.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (key, value) = entry.split_once('=').ok_or_else(|| {
                ProvisionError::Config(format!("Invalid environment entry \"{}\", expected key=value", entry))
            })?;
            if key.trim().is_empty() {
                return Err(ProvisionError::Config(format!(
                    "Invalid environment entry \"{}\", key is empty",
                    entry
                )));
            }
            env.set(key.trim(), value.trim());
        }
        Ok(env)
    }

    pub fn set(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.values.insert(key.as_ref().to_lowercase(), value.into());
    }

    pub fn with(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&key.to_lowercase()).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy every entry of `other` over this environment
    pub fn extend(&mut self, other: &Environment) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<IndexMap<String, String>> for Environment {
    fn from(map: IndexMap<String, String>) -> Self {
        let mut env = Self::new();
        for (key, value) in map {
            env.set(key, value);
        }
        env
    }
}

impl From<Environment> for IndexMap<String, String> {
    fn from(env: Environment) -> Self {
        env.values
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.values.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{}", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let env = Environment::parse("osgi.os=linux, osgi.ARCH=x86_64,,").unwrap();
        assert_eq!(env.get("osgi.os"), Some("linux"));
        assert_eq!(env.get("OSGI.arch"), Some("x86_64"));
        assert_eq!(env.to_string(), "osgi.os=linux,osgi.arch=x86_64");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(Environment::parse("linux").is_err());
        assert!(Environment::parse("=linux").is_err());
        assert!(Environment::parse("").unwrap().is_empty());
    }
}
