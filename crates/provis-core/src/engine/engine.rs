use std::sync::Arc;
use std::time::Instant;

use super::action::{ActionParameters, ActionRegistry, ProvisioningAction};
use super::ordering::order_operands;
use super::phase::{PhaseId, PhaseSet};
use crate::cancel::CancellationToken;
use crate::director::{Operand, ProvisioningPlan};
use crate::error::{ProvisionError, Result};
use crate::profile::{InstalledUnit, Profile, ProfileLock, ProfileRegistry};
use crate::status::{Status, StatusCode};

/// How an apply ended
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// Every phase succeeded; the new snapshot as persisted
    Committed(Profile),
    /// Nothing was persisted
    Aborted,
}

#[derive(Debug, Clone)]
pub struct EngineResult {
    pub status: Status,
    pub outcome: ApplyOutcome,
}

impl EngineResult {
    fn aborted(status: Status) -> Self {
        Self {
            status,
            outcome: ApplyOutcome::Aborted,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self.outcome, ApplyOutcome::Committed(_))
    }

    /// The persisted snapshot of a committed apply
    pub fn profile(&self) -> Option<&Profile> {
        match &self.outcome {
            ApplyOutcome::Committed(profile) => Some(profile),
            ApplyOutcome::Aborted => None,
        }
    }
}

type Executed = Vec<(Arc<dyn ProvisioningAction>, ActionParameters)>;

/// Applies provisioning plans to the profiles of a registry.
///
/// Phases run one after the other, each over the ordered operands. A
/// failing action aborts the apply: the actions already executed in that
/// phase are undone in reverse order and nothing is persisted.
pub struct Engine {
    registry: Arc<ProfileRegistry>,
    actions: Arc<ActionRegistry>,
    phases: PhaseSet,
}

impl Engine {
    pub fn new(registry: Arc<ProfileRegistry>, actions: Arc<ActionRegistry>) -> Self {
        Self {
            registry,
            actions,
            phases: PhaseSet::default(),
        }
    }

    pub fn with_phases(mut self, phases: PhaseSet) -> Self {
        self.phases = phases;
        self
    }

    pub fn registry(&self) -> &Arc<ProfileRegistry> {
        &self.registry
    }

    pub fn perform(&self, plan: &ProvisioningPlan, cancel: &CancellationToken) -> EngineResult {
        let start = Instant::now();
        let name = plan.profile().name();

        if plan.status().is_error() {
            return EngineResult::aborted(
                Status::error(format!("The plan for profile {} has errors and cannot be applied", name))
                    .with_children([plan.status().clone()]),
            );
        }

        let lock = match self.prepare(plan) {
            Ok(lock) => lock,
            Err(err) => {
                log::warn!("Cannot apply plan to profile {}: {}", name, err);
                return EngineResult::aborted(Status::from_error(&err));
            }
        };

        let operands = order_operands(plan.operands());
        let mut working = plan.profile().clone();
        let mut status = Status::ok();

        for &phase in self.phases.phases() {
            log::debug!("Running {} phase on profile {}", phase, name);
            let phase_status = self.run_phase(phase, plan, &operands, &mut working, cancel);
            let failed = phase_status.is_error();
            status.merge(phase_status);
            if failed {
                log::warn!("Apply to profile {} aborted during {} phase", name, phase);
                return EngineResult::aborted(status);
            }
        }

        match self.registry.update_profile(&lock, &working) {
            Ok(snapshot) => {
                log::info!(
                    "Applied {} to profile {} in {:.3} seconds",
                    plan.summary(),
                    name,
                    start.elapsed().as_secs_f64()
                );
                EngineResult {
                    status,
                    outcome: ApplyOutcome::Committed(snapshot),
                }
            }
            Err(err) => {
                log::warn!("Failed to persist profile {}: {}", name, err);
                status.merge(Status::from_error(&err));
                EngineResult::aborted(status)
            }
        }
    }

    /// Lock the profile and check the plan was computed against its latest
    /// snapshot. The lock is held until the apply returns.
    fn prepare(&self, plan: &ProvisioningPlan) -> Result<ProfileLock> {
        let name = plan.profile().name();
        let lock = self.registry.lock(name)?;

        if self.registry.get_profile(name)?.is_none() {
            return Err(ProvisionError::ProfileNotFound { name: name.to_string() });
        }
        if !self.registry.is_current(plan.profile())? {
            return Err(ProvisionError::ProfileOutOfSync { name: name.to_string() });
        }
        Ok(lock)
    }

    fn run_phase(
        &self,
        phase: PhaseId,
        plan: &ProvisioningPlan,
        operands: &[Operand],
        working: &mut Profile,
        cancel: &CancellationToken,
    ) -> Status {
        let snapshot = working.clone();
        let mut executed: Executed = Vec::new();
        let mut status = Status::ok();

        if phase == PhaseId::Property {
            if cancel.is_canceled() {
                return Status::cancel();
            }
            apply_property_changes(plan, working);
            return status;
        }

        for operand in operands {
            if cancel.is_canceled() {
                log::info!("Apply canceled during {} phase", phase);
                let mut canceled = Status::cancel();
                undo(&mut executed, &mut canceled);
                *working = snapshot;
                return canceled;
            }

            let Some(unit) = phase.unit_for(operand) else {
                continue;
            };
            let params = ActionParameters::new(phase, working.name(), operand, unit);

            for action in self.actions.resolve_actions(phase, unit.touchpoint()) {
                log::debug!("{} {} for {}", phase, action.name(), unit);
                let result = action.execute(&params);
                if result.is_error() {
                    let err = ProvisionError::ActionFailure {
                        phase: phase.to_string(),
                        unit: unit.to_string(),
                        action: action.name().to_string(),
                        message: result.message().to_string(),
                    };
                    log::warn!("{}", err);
                    let mut failure = Status::from_error(&err).with_children([result]);
                    undo(&mut executed, &mut failure);
                    *working = snapshot;
                    return failure;
                }
                status.merge(result);
                executed.push((action, params.clone()));
            }

            match phase {
                PhaseId::Uninstall => {
                    working.remove_unit(&unit.key());
                }
                PhaseId::Install => {
                    let installed = plan
                        .future_state()
                        .unit(&unit.key())
                        .cloned()
                        .unwrap_or_else(|| InstalledUnit::new(unit.clone()));
                    working.add_installed(installed);
                }
                _ => {}
            }
        }
        status
    }
}

/// Undo executed actions in reverse order, each exactly once. Failed undos
/// are recorded as warnings.
fn undo(executed: &mut Executed, status: &mut Status) {
    while let Some((action, params)) = executed.pop() {
        let result = action.undo(&params);
        if result.is_error() {
            log::warn!(
                "Undo of {} failed for {} during {} phase: {}",
                action.name(),
                params.unit(),
                params.phase(),
                result.message()
            );
            status.add(
                Status::warning(format!(
                    "Could not undo {} for {}: {}",
                    action.name(),
                    params.unit(),
                    result.message()
                ))
                .with_code(StatusCode::UndoFailure),
            );
        }
    }
}

fn apply_property_changes(plan: &ProvisioningPlan, working: &mut Profile) {
    for change in plan.property_changes() {
        match (&change.unit, &change.after) {
            (None, Some(value)) => working.set_property(change.key.clone(), value.clone()),
            (None, None) => {
                working.remove_property(&change.key);
            }
            (Some(unit), Some(value)) => {
                working.set_unit_property(unit, change.key.clone(), value.clone());
            }
            (Some(unit), None) => {
                working.remove_unit_property(unit, &change.key);
            }
        }
    }
}
