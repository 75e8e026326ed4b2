//! Provisioning core: resolve installable units into a consistent
//! installation state and apply the resulting plan to a profile.

pub mod cancel;
pub mod config;
pub mod director;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod profile;
pub mod repository;
pub mod status;

pub use cancel::CancellationToken;
pub use config::{Config, ConfigLoader};
pub use director::{Operand, OperandKind, Planner, ProfileChangeRequest, ProvisioningPlan};
pub use engine::{ActionRegistry, ApplyOutcome, Engine, EngineResult, PhaseId, ProvisioningAction};
pub use error::{ProvisionError, Result};
pub use metadata::{Capability, Environment, Filter, InstallableUnit, Requirement, TouchpointType, UnitKey};
pub use profile::{InclusionRule, Profile, ProfileRegistry};
pub use repository::{CompositeRepository, InMemoryRepository, Repository};
pub use status::{Severity, Status, StatusCode};
