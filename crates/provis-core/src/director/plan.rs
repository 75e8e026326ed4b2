use std::fmt;
use std::sync::Arc;

use crate::metadata::{InstallableUnit, UnitKey};
use crate::profile::Profile;
use crate::status::Status;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    Install,
    Uninstall,
    Update,
    /// Same unit before and after; only its properties change
    Unchanged,
}

/// One unit-level change: `before` is replaced by `after`
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    before: Option<Arc<InstallableUnit>>,
    after: Option<Arc<InstallableUnit>>,
}

impl Operand {
    pub fn install(unit: Arc<InstallableUnit>) -> Self {
        Self {
            before: None,
            after: Some(unit),
        }
    }

    pub fn uninstall(unit: Arc<InstallableUnit>) -> Self {
        Self {
            before: Some(unit),
            after: None,
        }
    }

    pub fn update(from: Arc<InstallableUnit>, to: Arc<InstallableUnit>) -> Self {
        Self {
            before: Some(from),
            after: Some(to),
        }
    }

    pub fn unchanged(unit: Arc<InstallableUnit>) -> Self {
        Self {
            before: Some(unit.clone()),
            after: Some(unit),
        }
    }

    pub fn before(&self) -> Option<&Arc<InstallableUnit>> {
        self.before.as_ref()
    }

    pub fn after(&self) -> Option<&Arc<InstallableUnit>> {
        self.after.as_ref()
    }

    pub fn kind(&self) -> OperandKind {
        match (&self.before, &self.after) {
            (None, _) => OperandKind::Install,
            (Some(_), None) => OperandKind::Uninstall,
            (Some(before), Some(after)) if before.key() == after.key() => OperandKind::Unchanged,
            (Some(_), Some(_)) => OperandKind::Update,
        }
    }

    /// Unit id the operand is about
    pub fn id(&self) -> &str {
        self.after
            .as_ref()
            .or(self.before.as_ref())
            .map(|unit| unit.id())
            .unwrap_or_default()
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.before, &self.after) {
            (None, Some(after)) => write!(f, "Installing {} ({})", after.id(), after.version()),
            (Some(before), None) => write!(f, "Removing {} ({})", before.id(), before.version()),
            (Some(before), Some(after)) if before.key() == after.key() => {
                write!(f, "Reconfiguring {} ({})", after.id(), after.version())
            }
            (Some(before), Some(after)) => write!(
                f,
                "Updating {} ({} => {})",
                after.id(),
                before.version(),
                after.version()
            ),
            (None, None) => write!(f, "Nothing"),
        }
    }
}

/// A property that differs between the current and the future profile.
/// `unit` is None for profile-level properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChange {
    pub unit: Option<UnitKey>,
    pub key: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

impl fmt::Display for PropertyChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(unit) = &self.unit {
            write!(f, "{}: ", unit)?;
        }
        match (&self.before, &self.after) {
            (_, Some(after)) => write!(f, "{} = {}", self.key, after),
            (Some(_), None) => write!(f, "{} removed", self.key),
            (None, None) => write!(f, "{} unchanged", self.key),
        }
    }
}

/// What the planner decided: the operands turning `profile` into
/// `future_state`, and how the resolution went
#[derive(Debug, Clone)]
pub struct ProvisioningPlan {
    profile: Profile,
    future_state: Profile,
    operands: Vec<Operand>,
    property_changes: Vec<PropertyChange>,
    status: Status,
}

impl ProvisioningPlan {
    pub fn new(
        profile: Profile,
        future_state: Profile,
        operands: Vec<Operand>,
        property_changes: Vec<PropertyChange>,
        status: Status,
    ) -> Self {
        Self {
            profile,
            future_state,
            operands,
            property_changes,
            status,
        }
    }

    /// A plan that changes nothing and reports why
    pub fn failed(profile: Profile, status: Status) -> Self {
        Self {
            future_state: profile.clone(),
            profile,
            operands: Vec::new(),
            property_changes: Vec::new(),
            status,
        }
    }

    /// The snapshot the plan was computed against
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn future_state(&self) -> &Profile {
        &self.future_state
    }

    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    pub fn property_changes(&self) -> &[PropertyChange] {
        &self.property_changes
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn is_empty(&self) -> bool {
        self.operands.is_empty() && self.property_changes.is_empty()
    }

    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for operand in &self.operands {
            match operand.kind() {
                OperandKind::Install => summary.installs += 1,
                OperandKind::Update => summary.updates += 1,
                OperandKind::Uninstall => summary.uninstalls += 1,
                OperandKind::Unchanged => summary.reconfigures += 1,
            }
        }
        summary.property_changes = self.property_changes.len();
        summary
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub installs: usize,
    pub updates: usize,
    pub uninstalls: usize,
    pub reconfigures: usize,
    pub property_changes: usize,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if self.installs > 0 {
            parts.push(format!("{} install(s)", self.installs));
        }
        if self.updates > 0 {
            parts.push(format!("{} update(s)", self.updates));
        }
        if self.uninstalls > 0 {
            parts.push(format!("{} removal(s)", self.uninstalls));
        }
        if self.reconfigures > 0 {
            parts.push(format!("{} reconfigure(s)", self.reconfigures));
        }
        if self.property_changes > 0 {
            parts.push(format!("{} property change(s)", self.property_changes));
        }

        if parts.is_empty() {
            write!(f, "Nothing to do")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}
