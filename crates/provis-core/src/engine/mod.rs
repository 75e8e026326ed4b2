//! Transactional apply of provisioning plans.
//!
//! A plan's operands run through an ordered set of phases. In each phase
//! the touchpoint actions registered for the phase and the unit's
//! touchpoint type execute; a failure undoes the phase and aborts the
//! apply without persisting anything.

mod action;
mod engine;
mod ordering;
mod phase;

pub use action::{
    ActionParameters, ActionRegistry, ProvisioningAction, PARM_ARTIFACTS, PARM_PHASE, PARM_PROFILE, PARM_TOUCHPOINT,
    PARM_UNIT_ID, PARM_UNIT_PROPERTY, PARM_UNIT_VERSION,
};
pub use engine::{ApplyOutcome, Engine, EngineResult};
pub use ordering::order_operands;
pub use phase::{PhaseId, PhaseSet};
