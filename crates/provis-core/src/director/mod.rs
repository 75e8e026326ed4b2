//! Resolution: from a change request to a provisioning plan.
//!
//! The planner slices the universe of units down to what the roots can
//! reach, encodes the slice as a pseudo-boolean minimization problem, hands
//! it to a solver and decodes the answer into the future profile state.

mod decisions;
mod plan;
mod planner;
mod problem;
mod projector;
mod request;
mod slicer;
mod solver;


pub use decisions::BranchAndBoundSolver;
pub use plan::{Operand, OperandKind, PlanSummary, PropertyChange, ProvisioningPlan};
pub use planner::Planner;
pub use problem::{Constraint, ConstraintKind, Problem, Relation, Term, Var};
pub use projector::{Encoding, EncodingContext, Explanation, Projector};
pub use request::{InclusionRule, ProfileChangeRequest};
pub use slicer::{Exclusion, Slice, Slicer};
pub use solver::{Assignment, PbSolver, SolverAdapter, SolverLimits, SolverOutcome};
