use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use crate::cancel::CancellationToken;
use crate::error::{ProvisionError, Result};
use crate::metadata::{Environment, InstallableUnit, Requirement, UnitKey};
use crate::repository::Repository;
use crate::status::{Status, StatusCode};

/// Why a unit was pinned out of every solution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exclusion {
    /// The unit's own filter rejects the environment
    FilterNotApplicable,
    /// No applicable unit anywhere satisfies this requirement
    MissingRequirement(Requirement),
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exclusion::FilterNotApplicable => write!(f, "filter does not apply to the environment"),
            Exclusion::MissingRequirement(req) => write!(f, "nothing satisfies {}", req),
        }
    }
}

/// The closure of units relevant to a resolution.
///
/// Units are grouped by id, each group ascending by version. Excluded units
/// stay in their group so the encoder can pin them.
#[derive(Debug, Clone, Default)]
pub struct Slice {
    groups: BTreeMap<String, Vec<Arc<InstallableUnit>>>,
    excluded: BTreeMap<UnitKey, Exclusion>,
    status: Status,
}

impl Slice {
    fn insert(&mut self, unit: Arc<InstallableUnit>) {
        let group = self.groups.entry(unit.id().to_string()).or_default();
        if let Err(pos) = group.binary_search(&unit) {
            group.insert(pos, unit);
        }
    }

    fn exclude(&mut self, unit: &InstallableUnit, reason: Exclusion) {
        log::warn!("Excluding {}: {}", unit, reason);
        self.status
            .add(Status::warning(format!("{} cannot be installed: {}", unit, reason)).with_code(StatusCode::UnitExcluded));
        self.excluded.insert(unit.key(), reason);
    }

    /// Every sliced unit in (id, version) order
    pub fn units(&self) -> impl Iterator<Item = &Arc<InstallableUnit>> {
        self.groups.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &BTreeMap<String, Vec<Arc<InstallableUnit>>> {
        &self.groups
    }

    pub fn group(&self, id: &str) -> &[Arc<InstallableUnit>] {
        self.groups.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, key: &UnitKey) -> bool {
        self.groups
            .get(&key.id)
            .map(|group| group.iter().any(|unit| unit.version() == &key.version))
            .unwrap_or(false)
    }

    pub fn exclusion(&self, key: &UnitKey) -> Option<&Exclusion> {
        self.excluded.get(key)
    }

    pub fn excluded(&self) -> &BTreeMap<UnitKey, Exclusion> {
        &self.excluded
    }

    /// Warnings recorded while slicing
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Sliced units providing a capability that matches the positive form
    /// of `requirement`
    pub fn find_matches(&self, requirement: &Requirement) -> Vec<Arc<InstallableUnit>> {
        self.units()
            .filter(|unit| requirement.matches_unit(unit))
            .cloned()
            .collect()
    }
}

/// Computes the slice reachable from a set of roots
pub struct Slicer<'a> {
    repository: &'a dyn Repository,
    environment: &'a Environment,
    cancel: CancellationToken,
}

impl<'a> Slicer<'a> {
    pub fn new(repository: &'a dyn Repository, environment: &'a Environment) -> Self {
        Self {
            repository,
            environment,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn find_applicable(&self, requirement: &Requirement) -> Result<Vec<Arc<InstallableUnit>>> {
        let matches = self.repository.find_matches(requirement).map_err(|e| match e {
            ProvisionError::RepositoryUnavailable { .. } => e,
            other => ProvisionError::RepositoryUnavailable {
                repository: self.repository.name().to_string(),
                reason: other.to_string(),
            },
        })?;
        Ok(matches
            .into_iter()
            .filter(|unit| unit.is_applicable(self.environment))
            .collect())
    }

    /// Walk the requirements of `roots` and collect every unit a solution
    /// could need.
    ///
    /// Exclusions are recorded on the slice, never returned as errors. Only
    /// repository failures and cancellation abort slicing.
    pub fn slice(&self, roots: &[Arc<InstallableUnit>]) -> Result<Slice> {
        let start = std::time::Instant::now();
        let mut slice = Slice::default();
        let mut seen: HashSet<UnitKey> = HashSet::new();
        let mut queue: VecDeque<Arc<InstallableUnit>> = VecDeque::new();

        for root in roots {
            if seen.insert(root.key()) {
                queue.push_back(root.clone());
            }
        }

        while let Some(unit) = queue.pop_front() {
            self.cancel.check()?;
            slice.insert(unit.clone());

            if !unit.is_applicable(self.environment) {
                slice.exclude(&unit, Exclusion::FilterNotApplicable);
                continue;
            }

            for requirement in unit.required() {
                if requirement.optional || requirement.negated || !requirement.is_applicable(self.environment) {
                    continue;
                }
                // non-greedy requirements are encoded against the slice, never followed
                if !requirement.greedy {
                    continue;
                }

                let matches = self.find_applicable(requirement)?;
                if matches.is_empty() {
                    slice.exclude(&unit, Exclusion::MissingRequirement(requirement.clone()));
                    break;
                }
                for candidate in matches {
                    if seen.insert(candidate.key()) {
                        log::debug!("Slicing {} (needed by {})", candidate, unit);
                        queue.push_back(candidate);
                    }
                }
            }
        }

        log::info!(
            "Sliced {} units ({} excluded) in {:.3} seconds",
            slice.len(),
            slice.excluded.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Capability, Filter};
    use crate::repository::InMemoryRepository;
    use provis_version::{Version, VersionRange};

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn range(s: &str) -> VersionRange {
        VersionRange::parse(s).unwrap()
    }

    fn unit(id: &str, version: &str) -> Arc<InstallableUnit> {
        Arc::new(InstallableUnit::builder(id, v(version)).build())
    }

    fn repo(units: Vec<Arc<InstallableUnit>>) -> InMemoryRepository {
        InMemoryRepository::with_units("test", units)
    }

    #[test]
    fn test_transitive_closure() {
        let a = Arc::new(
            InstallableUnit::builder("a", v("1.0"))
                .requires(Requirement::unit("b", range("[1.0,2.0)")))
                .build(),
        );
        let b = Arc::new(
            InstallableUnit::builder("b", v("1.0"))
                .requires(Requirement::unit("c", range("")))
                .build(),
        );
        let b2 = unit("b", "2.0");
        let c = unit("c", "1.0");
        let unrelated = unit("d", "1.0");
        let repository = repo(vec![a.clone(), b, b2, c, unrelated]);
        let env = Environment::new();

        let slice = Slicer::new(&repository, &env).slice(&[a]).unwrap();
        let keys: Vec<String> = slice.units().map(|u| u.key().to_string()).collect();
        assert_eq!(keys, vec!["a 1.0.0", "b 1.0.0", "c 1.0.0"]);
        assert!(slice.excluded().is_empty());
        assert!(slice.status().is_ok());
    }

    #[test]
    fn test_filtered_unit_is_excluded_and_not_expanded() {
        let a = Arc::new(
            InstallableUnit::builder("a", v("1.0"))
                .filter(Filter::parse("(os=win32)").unwrap())
                .requires(Requirement::unit("b", range("")))
                .build(),
        );
        let repository = repo(vec![a.clone(), unit("b", "1.0")]);
        let env = Environment::parse("os=linux").unwrap();

        let slice = Slicer::new(&repository, &env).slice(&[a.clone()]).unwrap();
        assert_eq!(slice.len(), 1);
        assert_eq!(slice.exclusion(&a.key()), Some(&Exclusion::FilterNotApplicable));
        assert!(slice.status().find_code(StatusCode::UnitExcluded).is_some());
    }

    #[test]
    fn test_filtered_requirements_and_candidates_are_skipped() {
        let a = Arc::new(
            InstallableUnit::builder("a", v("1.0"))
                .requires(Requirement::unit("win", range("")).with_filter(Filter::parse("(os=win32)").unwrap()))
                .requires(Requirement::unit("b", range("")))
                .build(),
        );
        let b_win = Arc::new(
            InstallableUnit::builder("b", v("2.0"))
                .filter(Filter::parse("(os=win32)").unwrap())
                .build(),
        );
        let repository = repo(vec![a.clone(), unit("win", "1.0"), unit("b", "1.0"), b_win]);
        let env = Environment::parse("os=linux").unwrap();

        let slice = Slicer::new(&repository, &env).slice(&[a]).unwrap();
        assert!(slice.group("win").is_empty());
        assert_eq!(slice.group("b").len(), 1);
        assert_eq!(slice.group("b")[0].version(), &v("1.0"));
    }

    #[test]
    fn test_missing_requirement_excludes_unit() {
        let a = Arc::new(
            InstallableUnit::builder("a", v("1.0"))
                .requires(Requirement::new("ns", "never", range("")))
                .requires(Requirement::unit("b", range("")))
                .build(),
        );
        let repository = repo(vec![a.clone(), unit("b", "1.0")]);
        let env = Environment::new();

        let slice = Slicer::new(&repository, &env).slice(&[a.clone()]).unwrap();
        assert!(matches!(slice.exclusion(&a.key()), Some(Exclusion::MissingRequirement(_))));
        // expansion stopped at the missing requirement
        assert!(slice.group("b").is_empty());
    }

    #[test]
    fn test_optional_and_negated_requirements_do_not_expand() {
        let a = Arc::new(
            InstallableUnit::builder("a", v("1.0"))
                .requires(Requirement::unit("opt", range("")).optional())
                .requires(Requirement::unit("bad", range("")).negate())
                .build(),
        );
        let repository = repo(vec![a.clone(), unit("opt", "1.0"), unit("bad", "1.0")]);
        let env = Environment::new();

        let slice = Slicer::new(&repository, &env).slice(&[a]).unwrap();
        assert_eq!(slice.len(), 1);
        assert!(slice.excluded().is_empty());
    }

    #[test]
    fn test_non_greedy_resolved_against_slice() {
        let a = Arc::new(
            InstallableUnit::builder("a", v("1.0"))
                .requires(Requirement::new("ns", "impl", range("")).non_greedy())
                .requires(Requirement::unit("b", range("")))
                .build(),
        );
        let b = Arc::new(
            InstallableUnit::builder("b", v("1.0"))
                .provides(Capability::new("ns", "impl", v("1.0")))
                .build(),
        );
        let other_impl = Arc::new(
            InstallableUnit::builder("c", v("1.0"))
                .provides(Capability::new("ns", "impl", v("1.0")))
                .build(),
        );
        let repository = repo(vec![a.clone(), b, other_impl]);
        let env = Environment::new();

        let slice = Slicer::new(&repository, &env).slice(&[a.clone()]).unwrap();
        // the non-greedy requirement never pulled c in
        assert!(slice.group("c").is_empty());
        assert!(slice.exclusion(&a.key()).is_none());

        let lonely = Arc::new(
            InstallableUnit::builder("lonely", v("1.0"))
                .requires(Requirement::new("ns", "impl", range("")).non_greedy())
                .build(),
        );
        // nothing provides it, yet the unit stays installable
        let slice = Slicer::new(&repository, &env).slice(&[lonely.clone()]).unwrap();
        assert_eq!(slice.len(), 1);
        assert!(slice.exclusion(&lonely.key()).is_none());
    }

    #[test]
    fn test_cancellation() {
        let a = unit("a", "1.0");
        let repository = repo(vec![a.clone()]);
        let env = Environment::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = Slicer::new(&repository, &env)
            .with_cancellation(cancel)
            .slice(&[a])
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Canceled));
    }

    #[test]
    fn test_repository_failure_aborts() {
        struct Broken;
        impl Repository for Broken {
            fn name(&self) -> &str {
                "broken"
            }
            fn find_matches(&self, _requirement: &Requirement) -> Result<Vec<Arc<InstallableUnit>>> {
                Err(ProvisionError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk gone")))
            }
            fn units(&self) -> Result<Vec<Arc<InstallableUnit>>> {
                Ok(Vec::new())
            }
        }

        let a = Arc::new(
            InstallableUnit::builder("a", v("1.0"))
                .requires(Requirement::unit("b", range("")))
                .build(),
        );
        let env = Environment::new();
        let err = Slicer::new(&Broken, &env).slice(&[a]).unwrap_err();
        assert!(matches!(err, ProvisionError::RepositoryUnavailable { ref repository, .. } if repository == "broken"));
    }
}
