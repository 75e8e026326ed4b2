use std::fmt;
use std::sync::Arc;

use crate::director::Operand;
use crate::metadata::InstallableUnit;

/// Steps of an apply, in their default order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PhaseId {
    /// Fetch what the incoming units need
    Collect,
    Unconfigure,
    Uninstall,
    Install,
    Configure,
    /// Commit profile and per-unit property changes
    Property,
}

impl PhaseId {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseId::Collect => "collect",
            PhaseId::Unconfigure => "unconfigure",
            PhaseId::Uninstall => "uninstall",
            PhaseId::Install => "install",
            PhaseId::Configure => "configure",
            PhaseId::Property => "property",
        }
    }

    /// The unit this phase acts on for `operand`, or None when the phase
    /// does not apply to it.
    ///
    /// Incoming phases act on the `after` unit, outgoing phases on the
    /// `before` unit, and only when the two differ. The property phase
    /// never runs per operand.
    pub fn unit_for<'a>(&self, operand: &'a Operand) -> Option<&'a Arc<InstallableUnit>> {
        let (before, after) = (operand.before(), operand.after());
        match self {
            PhaseId::Collect | PhaseId::Install | PhaseId::Configure => after.filter(|unit| before != Some(*unit)),
            PhaseId::Unconfigure | PhaseId::Uninstall => before.filter(|unit| after != Some(*unit)),
            PhaseId::Property => None,
        }
    }

    pub fn is_applicable(&self, operand: &Operand) -> bool {
        self.unit_for(operand).is_some()
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered phases an engine runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSet {
    phases: Vec<PhaseId>,
}

impl PhaseSet {
    pub fn new(phases: Vec<PhaseId>) -> Self {
        Self { phases }
    }

    pub fn default_phases() -> Self {
        Self::new(vec![
            PhaseId::Collect,
            PhaseId::Unconfigure,
            PhaseId::Uninstall,
            PhaseId::Install,
            PhaseId::Configure,
            PhaseId::Property,
        ])
    }

    /// Same set without `phase`, e.g. to skip collecting
    pub fn without(mut self, phase: PhaseId) -> Self {
        self.phases.retain(|p| *p != phase);
        self
    }

    pub fn phases(&self) -> &[PhaseId] {
        &self.phases
    }

    pub fn contains(&self, phase: PhaseId) -> bool {
        self.phases.contains(&phase)
    }
}

impl Default for PhaseSet {
    fn default() -> Self {
        Self::default_phases()
    }
}
