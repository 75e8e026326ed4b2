use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::phase::PhaseId;
use crate::director::Operand;
use crate::metadata::{InstallableUnit, TouchpointType};
use crate::status::Status;

pub const PARM_PROFILE: &str = "profile";
pub const PARM_PHASE: &str = "phase";
pub const PARM_UNIT_ID: &str = "unit.id";
pub const PARM_UNIT_VERSION: &str = "unit.version";
pub const PARM_TOUCHPOINT: &str = "touchpoint";
pub const PARM_ARTIFACTS: &str = "artifacts";
/// Prefix of the unit's own properties in the parameter map
pub const PARM_UNIT_PROPERTY: &str = "unit.property.";

/// Something a touchpoint does to the system for one unit in one phase.
///
/// `undo` must revert what a successful `execute` with the same parameters
/// did. It is called at most once per execution, in reverse execution
/// order, when a later action of the same phase fails.
pub trait ProvisioningAction: Send + Sync {
    fn name(&self) -> &str;

    fn execute(&self, params: &ActionParameters) -> Status;

    fn undo(&self, params: &ActionParameters) -> Status;
}

/// Parameters of a single action invocation, scoped to one operand and phase
#[derive(Debug, Clone)]
pub struct ActionParameters {
    phase: PhaseId,
    profile: String,
    unit: Arc<InstallableUnit>,
    operand: Operand,
    values: IndexMap<String, String>,
}

impl ActionParameters {
    pub fn new(phase: PhaseId, profile: &str, operand: &Operand, unit: &Arc<InstallableUnit>) -> Self {
        let mut values = IndexMap::new();
        values.insert(PARM_PROFILE.to_string(), profile.to_string());
        values.insert(PARM_PHASE.to_string(), phase.to_string());
        values.insert(PARM_UNIT_ID.to_string(), unit.id().to_string());
        values.insert(PARM_UNIT_VERSION.to_string(), unit.version().to_string());
        values.insert(PARM_TOUCHPOINT.to_string(), unit.touchpoint().to_string());
        let artifacts: Vec<String> = unit.artifacts().iter().map(|a| a.to_string()).collect();
        values.insert(PARM_ARTIFACTS.to_string(), artifacts.join(";"));
        for (key, value) in unit.properties() {
            values.insert(format!("{}{}", PARM_UNIT_PROPERTY, key), value.clone());
        }

        Self {
            phase,
            profile: profile.to_string(),
            unit: unit.clone(),
            operand: operand.clone(),
            values,
        }
    }

    pub fn phase(&self) -> PhaseId {
        self.phase
    }

    pub fn profile_name(&self) -> &str {
        &self.profile
    }

    /// The unit the phase acts on: `before` for outgoing phases, `after`
    /// for incoming ones
    pub fn unit(&self) -> &Arc<InstallableUnit> {
        &self.unit
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn values(&self) -> &IndexMap<String, String> {
        &self.values
    }
}

/// Lookup of actions by phase and touchpoint type
#[derive(Default)]
pub struct ActionRegistry {
    actions: HashMap<(PhaseId, TouchpointType), Vec<Arc<dyn ProvisioningAction>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an action; actions of one phase and touchpoint run in
    /// registration order
    pub fn register(&mut self, phase: PhaseId, touchpoint: TouchpointType, action: Arc<dyn ProvisioningAction>) {
        self.actions.entry((phase, touchpoint)).or_default().push(action);
    }

    pub fn with(mut self, phase: PhaseId, touchpoint: TouchpointType, action: Arc<dyn ProvisioningAction>) -> Self {
        self.register(phase, touchpoint, action);
        self
    }

    /// Actions to run for a unit of `touchpoint` in `phase`. Units without
    /// touchpoint never get any.
    pub fn resolve_actions(&self, phase: PhaseId, touchpoint: &TouchpointType) -> Vec<Arc<dyn ProvisioningAction>> {
        if touchpoint.is_none() {
            return Vec::new();
        }
        match self.actions.get(&(phase, touchpoint.clone())) {
            Some(actions) => actions.clone(),
            None => {
                log::trace!("No {} actions for touchpoint {}", phase, touchpoint);
                Vec::new()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.actions.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self
            .actions
            .keys()
            .map(|(phase, touchpoint)| format!("{}/{}", phase, touchpoint))
            .collect();
        keys.sort();
        f.debug_struct("ActionRegistry").field("actions", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ArtifactKey;
    use provis_version::Version;

    struct Noop(&'static str);

    impl ProvisioningAction for Noop {
        fn name(&self) -> &str {
            self.0
        }

        fn execute(&self, _params: &ActionParameters) -> Status {
            Status::ok()
        }

        fn undo(&self, _params: &ActionParameters) -> Status {
            Status::ok()
        }
    }

    #[test]
    fn test_resolve_in_registration_order() {
        let native = TouchpointType::new("native");
        let registry = ActionRegistry::new()
            .with(PhaseId::Install, native.clone(), Arc::new(Noop("mkdir")))
            .with(PhaseId::Install, native.clone(), Arc::new(Noop("copy")))
            .with(PhaseId::Uninstall, native.clone(), Arc::new(Noop("remove")));

        let names: Vec<String> = registry
            .resolve_actions(PhaseId::Install, &native)
            .iter()
            .map(|a| a.name().to_string())
            .collect();
        assert_eq!(names, vec!["mkdir", "copy"]);
        assert!(registry.resolve_actions(PhaseId::Configure, &native).is_empty());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_none_touchpoint_has_no_actions() {
        let registry = ActionRegistry::new().with(PhaseId::Install, TouchpointType::none(), Arc::new(Noop("x")));
        assert!(registry.resolve_actions(PhaseId::Install, &TouchpointType::none()).is_empty());
    }

    #[test]
    fn test_parameters() {
        let unit = Arc::new(
            InstallableUnit::builder("org.example.tool", Version::parse("1.2").unwrap())
                .touchpoint(TouchpointType::new("native"))
                .artifact(ArtifactKey {
                    classifier: "binary".to_string(),
                    id: "tool".to_string(),
                    version: Version::parse("1.2").unwrap(),
                })
                .property("install.dir", "/opt/tool")
                .build(),
        );
        let operand = Operand::install(unit.clone());
        let params = ActionParameters::new(PhaseId::Install, "default", &operand, &unit);

        assert_eq!(params.get(PARM_PROFILE), Some("default"));
        assert_eq!(params.get(PARM_PHASE), Some("install"));
        assert_eq!(params.get(PARM_UNIT_VERSION), Some("1.2.0"));
        assert_eq!(params.get(PARM_TOUCHPOINT), Some("native"));
        assert_eq!(params.get(PARM_ARTIFACTS), Some("binary,tool,1.2.0"));
        assert_eq!(params.get("unit.property.install.dir"), Some("/opt/tool"));
    }
}
