use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use indexmap::IndexMap;

use super::plan::{Operand, PropertyChange, ProvisioningPlan};
use super::projector::{Encoding, Projector};
use super::request::ProfileChangeRequest;
use super::slicer::Slicer;
use super::solver::SolverAdapter;
use crate::cancel::CancellationToken;
use crate::config::Config;
use crate::error::{ProvisionError, Result};
use crate::metadata::{Environment, InstallableUnit, UnitKey};
use crate::profile::{InclusionRule, InstalledUnit, Profile, PROP_INCLUSION, PROP_ROOT};
use crate::repository::{CompositeRepository, InMemoryRepository, Repository};
use crate::status::{Status, StatusCode};

type Roots = Vec<(Arc<InstallableUnit>, InclusionRule)>;

/// Computes provisioning plans.
///
/// A plan is resolved against the planner's repository together with the
/// units already installed in the profile, so installed units stay
/// resolvable after they disappear from the repository.
pub struct Planner {
    repository: Arc<dyn Repository>,
    solver: SolverAdapter,
    environment: Environment,
}

impl Planner {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self {
            repository,
            solver: SolverAdapter::default(),
            environment: Environment::new(),
        }
    }

    /// Planner set up with the configured solver timeout, dump directory and
    /// default environment
    pub fn from_config(repository: Arc<dyn Repository>, config: &Config) -> Self {
        Self::new(repository)
            .with_solver(
                SolverAdapter::default()
                    .with_timeout(config.solver_timeout())
                    .with_dump_dir(config.get_dump_dir()),
            )
            .with_environment(config.environment.clone())
    }

    pub fn with_solver(mut self, solver: SolverAdapter) -> Self {
        self.solver = solver;
        self
    }

    /// Default filter context; a profile's own environment overrides it
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Resolve a change request into a plan.
    ///
    /// Failures never escape as errors: the plan then has no operands and
    /// its status explains what went wrong.
    pub fn get_provisioning_plan(&self, request: &ProfileChangeRequest, cancel: &CancellationToken) -> ProvisioningPlan {
        let start = std::time::Instant::now();
        let mut status = Status::ok();

        let plan = match self.resolve(request, cancel, &mut status) {
            Ok(plan) => plan,
            Err(err) => {
                log::warn!("Planning for profile {} failed: {}", request.profile().name(), err);
                let mut failure = Status::from_error(&err);
                failure.merge(status);
                ProvisioningPlan::failed(request.profile().clone(), failure)
            }
        };

        log::info!(
            "Planned {} for profile {} in {:.3} seconds",
            plan.summary(),
            request.profile().name(),
            start.elapsed().as_secs_f64()
        );
        plan
    }

    fn resolve(
        &self,
        request: &ProfileChangeRequest,
        cancel: &CancellationToken,
        status: &mut Status,
    ) -> Result<ProvisioningPlan> {
        let profile = request.profile();

        let mut environment = self.environment.clone();
        environment.extend(&profile.environment()?);

        let roots = validate_roots(request.roots().into_values().collect(), &environment, status);
        let root_units: Vec<Arc<InstallableUnit>> = roots.iter().map(|(unit, _)| unit.clone()).collect();

        let mut local = InMemoryRepository::new(format!("profile:{}", profile.name()));
        for unit in profile.units().chain(root_units.iter()) {
            local.add_unit(unit.clone());
        }
        let repository = CompositeRepository::new("planner")
            .with(self.repository.clone())
            .with(Arc::new(local));

        let slice = Slicer::new(&repository, &environment)
            .with_cancellation(cancel.clone())
            .slice(&root_units)?;
        status.merge(slice.status().clone());

        let encoding = Projector::new(&environment).encode(&slice, &roots);
        status.merge(encoding.status().clone());
        cancel.check()?;

        let assignment = match self.solver.solve(encoding.problem()) {
            Ok(assignment) => assignment,
            Err(err) => return Ok(self.failed_plan(profile, &err, &encoding, std::mem::take(status))),
        };
        cancel.check()?;

        let selected = encoding.decode(&assignment, &root_units);
        let selected_keys: BTreeSet<UnitKey> = selected.iter().map(|unit| unit.key()).collect();
        for (root, rule) in &roots {
            if *rule == InclusionRule::Optional && !selected_keys.contains(&root.key()) {
                log::info!("Optional root {} could not be installed", root);
                status.add(Status::info(format!("{} was requested optionally and is not installed", root)));
            }
        }

        let future_state = future_state(request, &roots, &selected);
        let (operands, property_changes) = diff_profiles(profile, &future_state);
        Ok(ProvisioningPlan::new(
            profile.clone(),
            future_state,
            operands,
            property_changes,
            std::mem::take(status),
        ))
    }

    fn failed_plan(&self, profile: &Profile, err: &ProvisionError, encoding: &Encoding, warnings: Status) -> ProvisioningPlan {
        let mut failure = Status::from_error(err).with_children(encoding.explanations().iter().map(|e| e.to_status()));
        failure.merge(warnings);
        ProvisioningPlan::failed(profile.clone(), failure)
    }

    /// Plan turning profile `a` into the state of profile `b`, without
    /// resolving anything
    pub fn get_diff_plan(&self, a: &Profile, b: &Profile) -> ProvisioningPlan {
        let future_state = b.renamed(a.name());
        let (operands, property_changes) = diff_profiles(a, &future_state);
        ProvisioningPlan::new(a.clone(), future_state, operands, property_changes, Status::ok())
    }
}

/// Drop roots that cannot apply: filtered out by the environment, or
/// singleton roots shadowed by a higher version of the same id
fn validate_roots(roots: Roots, environment: &Environment, status: &mut Status) -> Roots {
    let mut highest_singleton: BTreeMap<String, Arc<InstallableUnit>> = BTreeMap::new();
    for (unit, _) in &roots {
        if unit.is_singleton() && unit.is_applicable(environment) {
            let entry = highest_singleton.entry(unit.id().to_string()).or_insert_with(|| unit.clone());
            if unit.version() > entry.version() {
                *entry = unit.clone();
            }
        }
    }

    let mut kept = Vec::with_capacity(roots.len());
    for (unit, rule) in roots {
        if !unit.is_applicable(environment) {
            log::warn!("Ignoring {}: its filter does not apply", unit);
            status.add(
                Status::warning(format!("{} does not apply to this environment and was ignored", unit))
                    .with_code(StatusCode::RootDropped),
            );
            continue;
        }
        if unit.is_singleton() {
            if let Some(highest) = highest_singleton.get(unit.id()) {
                if highest.key() != unit.key() {
                    log::warn!("Ignoring {}: {} is requested too", unit, highest);
                    status.add(
                        Status::warning(format!("{} was ignored in favor of {}", unit, highest))
                            .with_code(StatusCode::RootDropped),
                    );
                    continue;
                }
            }
        }
        kept.push((unit, rule));
    }
    kept
}

fn apply_changes(properties: &mut IndexMap<String, String>, changes: &IndexMap<String, Option<String>>) {
    for (key, value) in changes {
        match value {
            Some(value) => {
                properties.insert(key.clone(), value.clone());
            }
            None => {
                properties.shift_remove(key);
            }
        }
    }
}

/// The profile as it will look once the plan is applied
fn future_state(request: &ProfileChangeRequest, roots: &Roots, selected: &[Arc<InstallableUnit>]) -> Profile {
    let current = request.profile();
    let mut future = Profile::new(current.name());

    let mut properties = current.properties().clone();
    apply_changes(&mut properties, request.property_changes());
    for (key, value) in properties {
        future.set_property(key, value);
    }

    let root_rules: BTreeMap<UnitKey, InclusionRule> = roots.iter().map(|(unit, rule)| (unit.key(), *rule)).collect();
    for unit in selected {
        let key = unit.key();
        let mut installed = current
            .unit(&key)
            .cloned()
            .unwrap_or_else(|| InstalledUnit::new(unit.clone()));
        installed.properties.shift_remove(PROP_ROOT);
        installed.properties.shift_remove(PROP_INCLUSION);
        if let Some(rule) = root_rules.get(&key) {
            installed.properties.insert(PROP_ROOT.to_string(), "true".to_string());
            installed.properties.insert(PROP_INCLUSION.to_string(), rule.as_str().to_string());
        }
        if let Some(changes) = request.unit_property_changes().get(&key) {
            apply_changes(&mut installed.properties, changes);
        }
        future.add_installed(installed);
    }
    future
}

fn property_diff(
    unit: Option<&UnitKey>,
    before: &IndexMap<String, String>,
    after: &IndexMap<String, String>,
    out: &mut Vec<PropertyChange>,
) {
    for (key, value) in before {
        if after.get(key) != Some(value) {
            out.push(PropertyChange {
                unit: unit.cloned(),
                key: key.clone(),
                before: Some(value.clone()),
                after: after.get(key).cloned(),
            });
        }
    }
    for (key, value) in after {
        if !before.contains_key(key) {
            out.push(PropertyChange {
                unit: unit.cloned(),
                key: key.clone(),
                before: None,
                after: Some(value.clone()),
            });
        }
    }
}

/// Operands and property changes turning `current` into `future`.
///
/// Units present in both are left alone unless their properties differ.
/// The rest is paired per id in version order: pairs become updates, the
/// surplus becomes removals or installs. Operands come out ordered by id.
pub(crate) fn diff_profiles(current: &Profile, future: &Profile) -> (Vec<Operand>, Vec<PropertyChange>) {
    let mut property_changes = Vec::new();
    property_diff(None, current.properties(), future.properties(), &mut property_changes);

    let mut by_id: BTreeMap<String, Vec<Operand>> = BTreeMap::new();
    let mut removed: BTreeMap<String, Vec<Arc<InstallableUnit>>> = BTreeMap::new();
    let mut added: BTreeMap<String, Vec<Arc<InstallableUnit>>> = BTreeMap::new();

    for installed in current.installed() {
        let key = installed.unit.key();
        match future.unit(&key) {
            Some(next) => {
                if next.properties != installed.properties {
                    property_diff(Some(&key), &installed.properties, &next.properties, &mut property_changes);
                    by_id
                        .entry(key.id.clone())
                        .or_default()
                        .push(Operand::unchanged(installed.unit.clone()));
                }
            }
            None => removed.entry(key.id.clone()).or_default().push(installed.unit.clone()),
        }
    }
    for unit in future.units() {
        if !current.contains(&unit.key()) {
            added.entry(unit.id().to_string()).or_default().push(unit.clone());
        }
    }

    let ids: BTreeSet<String> = removed.keys().chain(added.keys()).cloned().collect();
    for id in ids {
        let mut from = removed.remove(&id).unwrap_or_default().into_iter();
        let mut to = added.remove(&id).unwrap_or_default().into_iter();
        let operands = by_id.entry(id).or_default();
        loop {
            match (from.next(), to.next()) {
                (Some(before), Some(after)) => operands.push(Operand::update(before, after)),
                (Some(before), None) => operands.push(Operand::uninstall(before)),
                (None, Some(after)) => operands.push(Operand::install(after)),
                (None, None) => break,
            }
        }
    }

    (by_id.into_values().flatten().collect(), property_changes)
}
