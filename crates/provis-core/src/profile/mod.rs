//! Profiles and their snapshot history

mod profile;
mod registry;
mod store;

pub use profile::{InclusionRule, InstalledUnit, Profile, PROP_ENVIRONMENTS, PROP_INCLUSION, PROP_ROOT};
pub use registry::{ProfileLock, ProfileRegistry};
pub use store::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
