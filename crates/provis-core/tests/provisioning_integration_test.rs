/// End-to-end tests: plan against a repository, apply through the engine,
/// and read the result back from a file-backed profile registry.

use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use provis_core::director::{OperandKind, Planner, ProfileChangeRequest};
use provis_core::engine::{ActionParameters, ActionRegistry, Engine, PhaseSet, ProvisioningAction};
use provis_core::metadata::{InstallableUnit, Requirement, TouchpointType};
use provis_core::profile::ProfileRegistry;
use provis_core::repository::InMemoryRepository;
use provis_core::{CancellationToken, Config, Status, StatusCode};
use provis_version::{Version, VersionRange};
use tempfile::TempDir;

const REPOSITORY: &str = r#"{
    "name": "integration",
    "units": [
        {"id": "runtime", "version": "1.0.0", "touchpoint": "native"},
        {"id": "runtime", "version": "2.0.0", "touchpoint": "native"},
        {
            "id": "editor",
            "version": "3.1.0",
            "touchpoint": "native",
            "required": [
                {"namespace": "unit", "name": "runtime", "range": "[1.0.0,3.0.0)"}
            ]
        },
        {
            "id": "legacy-plugin",
            "version": "1.0.0",
            "touchpoint": "native",
            "required": [
                {"namespace": "unit", "name": "runtime", "range": "[1.0.0,2.0.0)"}
            ]
        }
    ]
}"#;

/// Touchpoint writing every execute and undo to a shared journal
#[derive(Default)]
struct Journal {
    entries: Mutex<Vec<String>>,
    fail_on: Option<(String, String)>,
}

impl Journal {
    fn failing(phase: &str, unit: &str) -> Self {
        Self {
            fail_on: Some((phase.to_string(), unit.to_string())),
            ..Default::default()
        }
    }

    fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }
}

impl ProvisioningAction for Journal {
    fn name(&self) -> &str {
        "journal"
    }

    fn execute(&self, params: &ActionParameters) -> Status {
        let entry = format!("{} {}", params.phase(), params.unit().key());
        if let Some((phase, unit)) = &self.fail_on {
            if params.phase().as_str() == phase && params.unit().id() == unit {
                return Status::error(format!("{} refused", entry));
            }
        }
        self.entries.lock().unwrap().push(entry);
        Status::ok()
    }

    fn undo(&self, params: &ActionParameters) -> Status {
        self.entries
            .lock()
            .unwrap()
            .push(format!("undo {} {}", params.phase(), params.unit().key()));
        Status::ok()
    }
}

struct Fixture {
    _dir: TempDir,
    repository: Arc<InMemoryRepository>,
    registry: Arc<ProfileRegistry>,
    journal: Arc<Journal>,
    engine: Engine,
}

fn fixture(journal: Journal) -> Fixture {
    let dir = TempDir::new().unwrap();
    let repository = Arc::new(InMemoryRepository::from_json_str(REPOSITORY, "integration").unwrap());
    let registry = Arc::new(ProfileRegistry::open(dir.path().join("registry")));
    let journal = Arc::new(journal);

    let mut actions = ActionRegistry::new();
    for phase in PhaseSet::default().phases() {
        actions.register(*phase, TouchpointType::new("native"), journal.clone());
    }
    let engine = Engine::new(registry.clone(), Arc::new(actions));

    registry
        .add_profile("workstation", IndexMap::from([("provis.environments".to_string(), "os=linux".to_string())]))
        .unwrap();

    Fixture {
        _dir: dir,
        repository,
        registry,
        journal,
        engine,
    }
}

impl Fixture {
    fn planner(&self) -> Planner {
        Planner::from_config(self.repository.clone(), &Config::default())
    }

    fn unit(&self, id: &str, version: &str) -> Arc<InstallableUnit> {
        use provis_core::repository::Repository;
        self.repository
            .find_unit(id, &Version::parse(version).unwrap())
            .unwrap()
            .unwrap()
    }

    fn request(&self) -> ProfileChangeRequest {
        ProfileChangeRequest::new(self.registry.get_profile("workstation").unwrap().unwrap())
    }

    fn installed(&self) -> Vec<String> {
        self.registry
            .get_profile("workstation")
            .unwrap()
            .unwrap()
            .units()
            .map(|unit| unit.key().to_string())
            .collect()
    }
}

#[test]
fn test_install_update_and_revert() {
    let fx = fixture(Journal::default());
    let cancel = CancellationToken::new();

    let mut request = fx.request();
    request.add_unit(fx.unit("editor", "3.1.0"));
    let plan = fx.planner().get_provisioning_plan(&request, &cancel);
    assert!(plan.status().is_ok(), "{}", plan.status());

    let result = fx.engine.perform(&plan, &cancel);
    assert!(result.is_committed(), "{}", result.status);
    assert_eq!(fx.installed(), vec!["editor 3.1.0", "runtime 2.0.0"]);
    let after_install = fx.registry.get_profile("workstation").unwrap().unwrap();

    // the plugin pins the older runtime
    let mut request = fx.request();
    request.add_unit(fx.unit("legacy-plugin", "1.0.0"));
    let plan = fx.planner().get_provisioning_plan(&request, &cancel);
    let kinds: Vec<OperandKind> = plan.operands().iter().map(|op| op.kind()).collect();
    assert_eq!(kinds, vec![OperandKind::Install, OperandKind::Update]);
    assert!(fx.engine.perform(&plan, &cancel).is_committed());
    assert_eq!(fx.installed(), vec!["editor 3.1.0", "legacy-plugin 1.0.0", "runtime 1.0.0"]);

    // go back to the snapshot taken after the first install
    let current = fx.registry.get_profile("workstation").unwrap().unwrap();
    let revert = fx.planner().get_diff_plan(&current, &after_install);
    assert!(fx.engine.perform(&revert, &cancel).is_committed());
    assert_eq!(fx.installed(), vec!["editor 3.1.0", "runtime 2.0.0"]);

    // reverting again is a no-op
    let current = fx.registry.get_profile("workstation").unwrap().unwrap();
    let again = fx.planner().get_diff_plan(&current, &after_install);
    assert!(again.operands().is_empty());
    assert!(current.same_state(&after_install));
    assert_eq!(fx.registry.timestamps("workstation").unwrap().len(), 4);
}

#[test]
fn test_failed_install_leaves_registry_untouched() {
    let fx = fixture(Journal::failing("install", "editor"));
    let cancel = CancellationToken::new();

    let mut request = fx.request();
    request.add_unit(fx.unit("editor", "3.1.0"));
    let plan = fx.planner().get_provisioning_plan(&request, &cancel);
    let result = fx.engine.perform(&plan, &cancel);

    assert!(!result.is_committed());
    assert!(result.status.find_code(StatusCode::ActionFailure).is_some());
    assert!(fx.installed().is_empty());
    assert_eq!(fx.registry.timestamps("workstation").unwrap().len(), 1);
    assert_eq!(
        fx.journal.entries(),
        vec![
            "collect runtime 2.0.0",
            "collect editor 3.1.0",
            "install runtime 2.0.0",
            "undo install runtime 2.0.0",
        ]
    );
}

#[test]
fn test_snapshots_survive_reopening() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("registry");
    let unit = Arc::new(InstallableUnit::builder("tool", Version::parse("1.0").unwrap()).build());

    {
        let registry = Arc::new(ProfileRegistry::open(&root));
        registry.add_profile("p", IndexMap::new()).unwrap();
        let planner = Planner::new(Arc::new(InMemoryRepository::with_units("r", [unit.clone()])));
        let mut request = ProfileChangeRequest::new(registry.get_profile("p").unwrap().unwrap());
        request.add_unit(unit.clone());
        let plan = planner.get_provisioning_plan(&request, &CancellationToken::new());
        let engine = Engine::new(registry.clone(), Arc::new(ActionRegistry::new()));
        assert!(engine.perform(&plan, &CancellationToken::new()).is_committed());
    }

    let registry = ProfileRegistry::open(&root);
    let timestamps = registry.timestamps("p").unwrap();
    assert_eq!(timestamps.len(), 2);
    assert!(timestamps[0] < timestamps[1]);
    assert!(registry.get_profile("p").unwrap().unwrap().contains(&unit.key()));
    assert!(registry.get_profile_at("p", timestamps[0]).unwrap().unwrap().is_empty());
}

#[test]
fn test_two_writers_on_one_profile() {
    let fx = fixture(Journal::default());
    let cancel = CancellationToken::new();

    let mut first = fx.request();
    first.add_unit(fx.unit("runtime", "2.0.0"));
    let mut second = fx.request();
    second.add_unit(fx.unit("runtime", "1.0.0"));
    let first = fx.planner().get_provisioning_plan(&first, &cancel);
    let second = fx.planner().get_provisioning_plan(&second, &cancel);

    assert!(fx.engine.perform(&first, &cancel).is_committed());
    let stale = fx.engine.perform(&second, &cancel);
    assert!(stale.status.find_code(StatusCode::ProfileOutOfSync).is_some());
    assert_eq!(fx.installed(), vec!["runtime 2.0.0"]);
}

#[test]
fn test_filtered_root_is_dropped_with_warning() {
    let fx = fixture(Journal::default());
    let windows_only = Arc::new(
        InstallableUnit::builder("win-shell", Version::parse("1.0").unwrap())
            .filter("(os=win32)".parse().unwrap())
            .requires(Requirement::unit("runtime", VersionRange::parse("").unwrap()))
            .build(),
    );

    let mut request = fx.request();
    request.add_unit(windows_only);
    let plan = fx.planner().get_provisioning_plan(&request, &CancellationToken::new());

    assert!(!plan.status().is_error());
    assert!(plan.status().find_code(StatusCode::RootDropped).is_some());
    assert!(plan.is_empty());
}
