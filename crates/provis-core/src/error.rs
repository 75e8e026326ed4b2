use thiserror::Error;

use provis_version::VersionError;

#[derive(Error, Debug)]
pub enum ProvisionError {
    // Resolution errors
    #[error("No solution satisfies the requested installation")]
    Unsatisfiable,

    #[error("The requested installation contradicts itself")]
    Contradiction,

    #[error("Solver gave up after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Solver input/output failure: {0}")]
    SolverIo(String),

    // Apply errors
    #[error("Action {action} failed for {unit} during {phase}: {message}")]
    ActionFailure {
        phase: String,
        unit: String,
        action: String,
        message: String,
    },

    // Profile errors
    #[error("Profile {profile} is locked by another writer")]
    LockContention { profile: String },

    #[error("Profile not found: {name}")]
    ProfileNotFound { name: String },

    #[error("Profile {name} already exists")]
    ProfileExists { name: String },

    #[error("Profile {name} changed since the plan was computed")]
    ProfileOutOfSync { name: String },

    #[error("Invalid profile name: {0}")]
    InvalidProfileName(String),

    // Repository errors
    #[error("Repository {repository} unavailable: {reason}")]
    RepositoryUnavailable { repository: String, reason: String },

    #[error("Operation canceled")]
    Canceled,

    // Metadata errors
    #[error(transparent)]
    InvalidVersion(#[from] VersionError),

    #[error("Invalid filter \"{filter}\": {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Invalid installable unit: {0}")]
    InvalidUnit(String),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
