use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;

use super::profile::Profile;
use crate::error::{ProvisionError, Result};

/// Storage for profile snapshots, keyed by (profile name, timestamp)
pub trait SnapshotStore: Send + Sync {
    /// Names of all stored profiles, sorted
    fn profile_names(&self) -> Result<Vec<String>>;

    /// Snapshot timestamps of a profile, ascending. Empty if unknown.
    fn timestamps(&self, name: &str) -> Result<Vec<i64>>;

    fn load(&self, name: &str, timestamp: i64) -> Result<Option<Profile>>;

    /// Store a snapshot. The profile must carry its timestamp.
    fn save(&self, profile: &Profile) -> Result<()>;

    /// Drop a profile and its whole history
    fn remove(&self, name: &str) -> Result<()>;

    /// Take the store-level writer lock of a profile; false if someone else
    /// holds it
    fn acquire_lock(&self, _name: &str) -> Result<bool> {
        Ok(true)
    }

    fn release_lock(&self, _name: &str) -> Result<()> {
        Ok(())
    }
}

fn snapshot_timestamp(profile: &Profile) -> Result<i64> {
    profile.timestamp().ok_or_else(|| {
        ProvisionError::Io(std::io::Error::new(
            ErrorKind::InvalidInput,
            format!("Profile {} has no snapshot timestamp", profile.name()),
        ))
    })
}

/// Snapshot store that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    profiles: Mutex<BTreeMap<String, BTreeMap<i64, Profile>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn profiles(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, BTreeMap<i64, Profile>>> {
        self.profiles.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn profile_names(&self) -> Result<Vec<String>> {
        Ok(self.profiles().keys().cloned().collect())
    }

    fn timestamps(&self, name: &str) -> Result<Vec<i64>> {
        Ok(self
            .profiles()
            .get(name)
            .map(|history| history.keys().copied().collect())
            .unwrap_or_default())
    }

    fn load(&self, name: &str, timestamp: i64) -> Result<Option<Profile>> {
        Ok(self
            .profiles()
            .get(name)
            .and_then(|history| history.get(&timestamp))
            .cloned())
    }

    fn save(&self, profile: &Profile) -> Result<()> {
        let timestamp = snapshot_timestamp(profile)?;
        self.profiles()
            .entry(profile.name().to_string())
            .or_default()
            .insert(timestamp, profile.clone());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.profiles().remove(name);
        Ok(())
    }
}

/// Snapshot store on disk: `<root>/<name>.profile/<timestamp>.json`, with the
/// writer lock of each profile at `<root>/<name>.lock` holding the owner's pid.
///
/// Snapshots are written to a temporary file in the profile directory and
/// renamed into place, so readers never see a partial snapshot.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    root: PathBuf,
}

const PROFILE_SUFFIX: &str = ".profile";
const LOCK_SUFFIX: &str = ".lock";

impl FileSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn profile_dir(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}{}", name, PROFILE_SUFFIX))
    }

    fn snapshot_path(&self, name: &str, timestamp: i64) -> PathBuf {
        self.profile_dir(name).join(format!("{}.json", timestamp))
    }

    /// Lock files live beside the profile directories so locking a profile
    /// that has no snapshots yet creates nothing but the lock
    fn lock_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}{}", name, LOCK_SUFFIX))
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn profile_names(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let file_name = entry.file_name();
            if let Some(name) = file_name.to_str().and_then(|n| n.strip_suffix(PROFILE_SUFFIX)) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn timestamps(&self, name: &str) -> Result<Vec<i64>> {
        let dir = self.profile_dir(name);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut timestamps = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(ts) = path.file_stem().and_then(|s| s.to_str()).and_then(|s| s.parse::<i64>().ok()) {
                timestamps.push(ts);
            }
        }
        timestamps.sort_unstable();
        Ok(timestamps)
    }

    fn load(&self, name: &str, timestamp: i64) -> Result<Option<Profile>> {
        let path = self.snapshot_path(name, timestamp);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut profile: Profile = serde_json::from_str(&contents)?;
        profile.set_timestamp(Some(timestamp));
        Ok(Some(profile))
    }

    fn save(&self, profile: &Profile) -> Result<()> {
        let timestamp = snapshot_timestamp(profile)?;
        let dir = self.profile_dir(profile.name());
        fs::create_dir_all(&dir)?;

        let json = serde_json::to_string_pretty(profile)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;

        let target = self.snapshot_path(profile.name(), timestamp);
        tmp.persist(&target).map_err(|e| ProvisionError::Io(e.error))?;
        log::debug!("Wrote profile snapshot {}", target.display());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        let dir = self.profile_dir(name);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    fn acquire_lock(&self, name: &str) -> Result<bool> {
        fs::create_dir_all(&self.root)?;
        let path = self.lock_path(name);

        for _ in 0..2 {
            match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    writeln!(file, "{}", std::process::id())?;
                    return Ok(true);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }

            let holder = lock_holder(&path);
            if holder.map(process_exited).unwrap_or(false) {
                log::warn!(
                    "Removing stale lock of profile {} left by exited process {}",
                    name,
                    holder.unwrap_or_default()
                );
                match fs::remove_file(&path) {
                    Ok(()) => continue,
                    Err(e) if e.kind() == ErrorKind::NotFound => continue,
                    Err(e) => return Err(e.into()),
                }
            }

            match holder {
                Some(pid) => log::warn!("Profile {} is locked by process {} ({})", name, pid, path.display()),
                None => log::warn!("Profile {} is locked ({})", name, path.display()),
            }
            return Ok(false);
        }
        Ok(false)
    }

    fn release_lock(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.lock_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process id recorded in a lock file
fn lock_holder(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Whether `pid` is known to be gone. Only decidable where `/proc` exists;
/// elsewhere every holder is assumed alive.
fn process_exited(pid: u32) -> bool {
    let proc_root = Path::new("/proc");
    proc_root.join("self").exists() && !proc_root.join(pid.to_string()).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn snapshot(name: &str, timestamp: i64) -> Profile {
        let mut profile = Profile::new(name);
        profile.set_property("ts", timestamp.to_string());
        profile.set_timestamp(Some(timestamp));
        profile
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySnapshotStore::new();
        store.save(&snapshot("a", 2)).unwrap();
        store.save(&snapshot("a", 1)).unwrap();
        store.save(&snapshot("b", 5)).unwrap();

        assert_eq!(store.profile_names().unwrap(), vec!["a", "b"]);
        assert_eq!(store.timestamps("a").unwrap(), vec![1, 2]);
        assert_eq!(store.load("a", 1).unwrap().unwrap().property("ts"), Some("1"));
        assert!(store.load("a", 3).unwrap().is_none());

        store.remove("a").unwrap();
        assert!(store.timestamps("a").unwrap().is_empty());
    }

    #[test]
    fn test_unstamped_profile_is_rejected() {
        let store = MemorySnapshotStore::new();
        assert!(store.save(&Profile::new("a")).is_err());
    }

    #[test]
    fn test_file_store_layout() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        store.save(&snapshot("main", 100)).unwrap();
        store.save(&snapshot("main", 200)).unwrap();

        assert!(dir.path().join("main.profile").join("100.json").exists());
        assert_eq!(store.profile_names().unwrap(), vec!["main"]);
        assert_eq!(store.timestamps("main").unwrap(), vec![100, 200]);

        let loaded = store.load("main", 200).unwrap().unwrap();
        assert_eq!(loaded.timestamp(), Some(200));
        assert_eq!(loaded.property("ts"), Some("200"));
        assert!(store.load("main", 300).unwrap().is_none());
    }

    #[test]
    fn test_file_store_lock() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path());

        assert!(store.acquire_lock("main").unwrap());
        assert!(!store.acquire_lock("main").unwrap());
        store.release_lock("main").unwrap();
        assert!(store.acquire_lock("main").unwrap());
        store.release_lock("main").unwrap();
        // locking an unknown profile creates no profile directory
        assert!(!dir.path().join("main.profile").exists());
        assert!(store.timestamps("main").unwrap().is_empty());
        assert!(store.profile_names().unwrap().is_empty());
    }

    #[test]
    fn test_lock_records_holder() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path());

        assert!(store.acquire_lock("main").unwrap());
        let path = dir.path().join("main.lock");
        assert_eq!(lock_holder(&path), Some(std::process::id()));
        // a live holder is never evicted
        assert!(!store.acquire_lock("main").unwrap());
        assert!(path.exists());
    }

    #[test]
    fn test_stale_lock_of_exited_process_is_taken_over() {
        if !Path::new("/proc/self").exists() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        // above the kernel's pid_max, so never a running process
        fs::write(dir.path().join("main.lock"), "999999999\n").unwrap();

        assert!(store.acquire_lock("main").unwrap());
        assert_eq!(lock_holder(&dir.path().join("main.lock")), Some(std::process::id()));
    }

    #[test]
    fn test_unreadable_lock_is_contention() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        fs::write(dir.path().join("main.lock"), "not a pid").unwrap();

        assert!(!store.acquire_lock("main").unwrap());
    }
}
