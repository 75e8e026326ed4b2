//! Capability model: installable units, what they provide and require, and
//! the environment filters that gate them.

mod environment;
mod filter;
mod unit;

pub use environment::Environment;
pub use filter::{is_applicable, Filter};
pub use unit::{
    ArtifactKey, Capability, InstallableUnit, Requirement, TouchpointType, UnitDescription, UnitKey, NAMESPACE_UNIT,
};
