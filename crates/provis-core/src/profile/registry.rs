use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;

use super::profile::Profile;
use super::store::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
use crate::error::{ProvisionError, Result};

lazy_static! {
    static ref PROFILE_NAME_RE: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap();
}

/// Exclusive write access to one profile. Released on drop.
pub struct ProfileLock {
    name: String,
    held: Arc<Mutex<HashSet<String>>>,
    store: Arc<dyn SnapshotStore>,
}

impl ProfileLock {
    pub fn profile_name(&self) -> &str {
        &self.name
    }
}

impl Drop for ProfileLock {
    fn drop(&mut self) {
        if let Err(e) = self.store.release_lock(&self.name) {
            log::warn!("Failed to release lock of profile {}: {}", self.name, e);
        }
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.name);
        log::debug!("Released lock of profile {}", self.name);
    }
}

impl std::fmt::Debug for ProfileLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileLock").field("name", &self.name).finish()
    }
}

/// Owner of every profile's snapshot history.
///
/// Readers see committed snapshots without locking. Writers go through a
/// [`ProfileLock`]; only one may exist per profile name at a time.
pub struct ProfileRegistry {
    store: Arc<dyn SnapshotStore>,
    held: Arc<Mutex<HashSet<String>>>,
}

impl ProfileRegistry {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            store,
            held: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySnapshotStore::new()))
    }

    /// Registry persisted under `root`
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileSnapshotStore::new(root)))
    }

    fn validate_name(name: &str) -> Result<()> {
        if PROFILE_NAME_RE.is_match(name) {
            Ok(())
        } else {
            Err(ProvisionError::InvalidProfileName(name.to_string()))
        }
    }

    /// Acquire the writer lock of a profile
    pub fn lock(&self, name: &str) -> Result<ProfileLock> {
        Self::validate_name(name)?;

        {
            let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
            if !held.insert(name.to_string()) {
                return Err(ProvisionError::LockContention {
                    profile: name.to_string(),
                });
            }
        }

        match self.store.acquire_lock(name) {
            Ok(true) => {}
            other => {
                self.held
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(name);
                other?;
                return Err(ProvisionError::LockContention {
                    profile: name.to_string(),
                });
            }
        }

        log::debug!("Locked profile {}", name);
        Ok(ProfileLock {
            name: name.to_string(),
            held: self.held.clone(),
            store: self.store.clone(),
        })
    }

    pub fn is_locked(&self, name: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(name)
    }

    /// Names of every profile with at least one snapshot
    pub fn profile_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for name in self.store.profile_names()? {
            if !self.store.timestamps(&name)?.is_empty() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Latest snapshot of a profile
    pub fn get_profile(&self, name: &str) -> Result<Option<Profile>> {
        match self.store.timestamps(name)?.last() {
            Some(&ts) => self.store.load(name, ts),
            None => Ok(None),
        }
    }

    /// Snapshot of a profile at an exact timestamp
    pub fn get_profile_at(&self, name: &str, timestamp: i64) -> Result<Option<Profile>> {
        self.store.load(name, timestamp)
    }

    pub fn timestamps(&self, name: &str) -> Result<Vec<i64>> {
        self.store.timestamps(name)
    }

    /// Whether `profile` was read from the latest snapshot of its name
    pub fn is_current(&self, profile: &Profile) -> Result<bool> {
        let latest = self.store.timestamps(profile.name())?.last().copied();
        Ok(latest.is_some() && latest == profile.timestamp())
    }

    /// Create a new, empty profile and persist its first snapshot
    pub fn add_profile(&self, name: &str, properties: IndexMap<String, String>) -> Result<Profile> {
        let lock = self.lock(name)?;
        if !self.store.timestamps(name)?.is_empty() {
            return Err(ProvisionError::ProfileExists { name: name.to_string() });
        }

        let mut profile = Profile::new(name);
        for (key, value) in properties {
            profile.set_property(key, value);
        }
        let profile = self.update_profile(&lock, &profile)?;
        log::info!("Created profile {}", name);
        Ok(profile)
    }

    /// Persist `profile` as a new snapshot and return it with its timestamp.
    ///
    /// Timestamps strictly increase per profile: a snapshot taken within the
    /// same millisecond as the previous one is stamped one millisecond later.
    pub fn update_profile(&self, lock: &ProfileLock, profile: &Profile) -> Result<Profile> {
        if lock.name != profile.name() {
            return Err(ProvisionError::LockContention {
                profile: profile.name().to_string(),
            });
        }

        let last = self.store.timestamps(profile.name())?.last().copied();
        let now = Utc::now().timestamp_millis();
        let timestamp = match last {
            Some(last) => now.max(last + 1),
            None => now,
        };

        let mut snapshot = profile.clone();
        snapshot.set_timestamp(Some(timestamp));
        self.store.save(&snapshot)?;
        log::debug!("Persisted snapshot {} of profile {}", timestamp, profile.name());
        Ok(snapshot)
    }

    /// Delete a profile with its whole history
    pub fn remove_profile(&self, name: &str) -> Result<()> {
        let _lock = self.lock(name)?;
        if self.store.timestamps(name)?.is_empty() {
            return Err(ProvisionError::ProfileNotFound { name: name.to_string() });
        }
        self.store.remove(name)?;
        log::info!("Removed profile {}", name);
        Ok(())
    }
}
