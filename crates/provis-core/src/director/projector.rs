use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use super::problem::{Constraint, ConstraintKind, Problem, Term, Var};
use super::slicer::{Exclusion, Slice};
use super::solver::Assignment;
use crate::metadata::{Environment, InstallableUnit, Requirement, UnitKey};
use crate::profile::InclusionRule;
use crate::status::{Status, StatusCode};

/// One step of the trace explaining why the encoding constrains a unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Explanation {
    /// Pinned out by the slicer
    Excluded { unit: UnitKey, reason: Exclusion },
    /// Pinned out because a mandatory requirement has no applicable match
    MissingMatch { unit: UnitKey, requirement: Requirement },
    /// Pinned in as a strict root
    Root { unit: UnitKey },
    /// Rewarded in the objective as an optional root
    OptionalRoot { unit: UnitKey },
    /// At most one singleton of an id
    Singleton { id: String, members: Vec<UnitKey> },
    /// `unit` and `conflicting` exclude each other through a negated requirement
    Negation {
        unit: UnitKey,
        requirement: Requirement,
        conflicting: UnitKey,
    },
    /// `unit` needs one of `candidates`
    Dependency {
        unit: UnitKey,
        requirement: Requirement,
        candidates: Vec<UnitKey>,
    },
}

impl Explanation {
    /// Whether this step constrains the given unit
    pub fn involves(&self, key: &UnitKey) -> bool {
        match self {
            Explanation::Excluded { unit, .. }
            | Explanation::MissingMatch { unit, .. }
            | Explanation::Root { unit }
            | Explanation::OptionalRoot { unit } => unit == key,
            Explanation::Singleton { members, .. } => members.contains(key),
            Explanation::Negation { unit, conflicting, .. } => unit == key || conflicting == key,
            Explanation::Dependency { unit, candidates, .. } => unit == key || candidates.contains(key),
        }
    }

    pub fn to_status(&self) -> Status {
        let status = Status::info(self.to_string());
        match self {
            Explanation::Excluded { .. } | Explanation::MissingMatch { .. } => status.with_code(StatusCode::UnitExcluded),
            Explanation::Root { .. } => status.with_code(StatusCode::UnitIncluded),
            _ => status,
        }
    }
}

fn join_keys(keys: &[UnitKey]) -> String {
    keys.iter().map(UnitKey::to_string).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Explanation::Excluded { unit, reason } => write!(f, "{} is excluded: {}", unit, reason),
            Explanation::MissingMatch { unit, requirement } => {
                write!(f, "{} is excluded: no unit satisfies {}", unit, requirement)
            }
            Explanation::Root { unit } => write!(f, "{} was requested", unit),
            Explanation::OptionalRoot { unit } => write!(f, "{} was requested optionally", unit),
            Explanation::Singleton { id, members } => {
                write!(f, "Only one of {} may be installed ({})", id, join_keys(members))
            }
            Explanation::Negation {
                unit,
                requirement,
                conflicting,
            } => write!(f, "{} conflicts with {} through {}", unit, conflicting, requirement),
            Explanation::Dependency {
                unit,
                requirement,
                candidates,
            } => write!(f, "{} requires {}: one of {}", unit, requirement, join_keys(candidates)),
        }
    }
}

/// Per-resolution mapping between units and variables.
///
/// Variables are handed out lazily on first use and stay stable for the
/// lifetime of the context.
#[derive(Debug, Default)]
pub struct EncodingContext {
    variables: BTreeMap<UnitKey, Var>,
    units: Vec<Arc<InstallableUnit>>,
    explanations: Vec<Explanation>,
    status: Status,
}

impl EncodingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variable of `unit`, created on first request
    pub fn var(&mut self, unit: &Arc<InstallableUnit>) -> Var {
        if let Some(var) = self.variables.get(&unit.key()) {
            return *var;
        }
        let var = Var::new(self.units.len() as u32 + 1);
        self.variables.insert(unit.key(), var);
        self.units.push(unit.clone());
        var
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    fn explain(&mut self, explanation: Explanation) {
        log::debug!("{}", explanation);
        self.explanations.push(explanation);
    }
}

/// The pseudo-boolean form of a slice, plus what is needed to read a
/// solution back
#[derive(Debug)]
pub struct Encoding {
    problem: Problem,
    context: EncodingContext,
    environment: Environment,
}

impl Encoding {
    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn variable(&self, key: &UnitKey) -> Option<Var> {
        self.context.variables.get(key).copied()
    }

    pub fn unit(&self, var: Var) -> Option<&Arc<InstallableUnit>> {
        self.context.units.get(var.offset())
    }

    pub fn explanations(&self) -> &[Explanation] {
        &self.context.explanations
    }

    /// Trace of every step that constrains `key`
    pub fn explain(&self, key: &UnitKey) -> Vec<&Explanation> {
        self.context
            .explanations
            .iter()
            .filter(|explanation| explanation.involves(key))
            .collect()
    }

    /// Warnings recorded while encoding
    pub fn status(&self) -> &Status {
        &self.context.status
    }

    /// Turn an assignment into the set of units to install.
    ///
    /// Starting from the selected roots, follows applicable non-negated
    /// requirements (optional ones included) to selected matches. Units the
    /// solver selected that nothing reaches are dropped.
    pub fn decode(&self, assignment: &Assignment, roots: &[Arc<InstallableUnit>]) -> Vec<Arc<InstallableUnit>> {
        let selected: Vec<&Arc<InstallableUnit>> = self
            .context
            .units
            .iter()
            .enumerate()
            .filter(|(offset, _)| assignment.value(Var::new(*offset as u32 + 1)))
            .map(|(_, unit)| unit)
            .collect();

        let mut reached: BTreeSet<UnitKey> = BTreeSet::new();
        let mut result: Vec<Arc<InstallableUnit>> = Vec::new();
        let mut queue: VecDeque<Arc<InstallableUnit>> = VecDeque::new();

        for root in roots {
            let is_selected = self
                .variable(&root.key())
                .map(|var| assignment.value(var))
                .unwrap_or(false);
            if is_selected && reached.insert(root.key()) {
                queue.push_back(root.clone());
            }
        }

        while let Some(unit) = queue.pop_front() {
            for requirement in unit.required() {
                if requirement.negated || !requirement.is_applicable(&self.environment) {
                    continue;
                }
                for candidate in selected.iter().filter(|c| requirement.matches_unit(c)) {
                    if reached.insert(candidate.key()) {
                        queue.push_back((*candidate).clone());
                    }
                }
            }
            result.push(unit);
        }

        result.sort();
        result
    }
}

/// Builds the pseudo-boolean encoding of a slice
pub struct Projector<'a> {
    environment: &'a Environment,
}

impl<'a> Projector<'a> {
    pub fn new(environment: &'a Environment) -> Self {
        Self { environment }
    }

    pub fn encode(&self, slice: &Slice, roots: &[(Arc<InstallableUnit>, InclusionRule)]) -> Encoding {
        let start = std::time::Instant::now();
        let mut ctx = EncodingContext::new();
        let mut problem = Problem::default();

        // variables follow (id, version) order
        for unit in slice.units() {
            ctx.var(unit);
        }

        for unit in slice.units() {
            if let Some(reason) = slice.exclusion(&unit.key()) {
                let var = ctx.var(unit);
                problem.add_constraint(Constraint::equal(vec![Term::new(1, var)], 0, ConstraintKind::Exclusion));
                ctx.explain(Explanation::Excluded {
                    unit: unit.key(),
                    reason: reason.clone(),
                });
            }
        }

        for (id, group) in slice.groups() {
            self.encode_singleton(&mut ctx, &mut problem, id, group);
        }

        for unit in slice.units() {
            if slice.exclusion(&unit.key()).is_some() {
                continue;
            }
            self.encode_requirements(&mut ctx, &mut problem, slice, unit);
        }

        let objective = self.objective(&mut ctx, slice, roots);
        problem.set_objective(objective);

        for (root, rule) in roots {
            if *rule == InclusionRule::Strict {
                let var = ctx.var(root);
                problem.add_constraint(Constraint::equal(vec![Term::new(1, var)], 1, ConstraintKind::Root));
                ctx.explain(Explanation::Root { unit: root.key() });
            }
        }

        problem.set_num_variables(ctx.len() as u32);
        log::info!(
            "Encoded {} variables and {} constraints in {:.3} seconds",
            problem.num_variables(),
            problem.constraints().len(),
            start.elapsed().as_secs_f64()
        );

        Encoding {
            problem,
            context: ctx,
            environment: self.environment.clone(),
        }
    }

    fn encode_singleton(
        &self,
        ctx: &mut EncodingContext,
        problem: &mut Problem,
        id: &str,
        group: &[Arc<InstallableUnit>],
    ) {
        if group.len() < 2 || !group.iter().any(|unit| unit.is_singleton()) {
            return;
        }

        let (singletons, others): (Vec<_>, Vec<_>) = group.iter().partition(|unit| unit.is_singleton());
        let singleton_terms: Vec<Term> = singletons.iter().map(|unit| Term::new(-1, ctx.var(unit))).collect();

        if singleton_terms.len() > 1 {
            problem.add_constraint(Constraint::at_least(singleton_terms.clone(), -1, ConstraintKind::Singleton));
        }
        for other in &others {
            let mut terms = singleton_terms.clone();
            terms.push(Term::new(-1, ctx.var(other)));
            problem.add_constraint(Constraint::at_least(terms, -1, ConstraintKind::Singleton));
        }

        ctx.explain(Explanation::Singleton {
            id: id.to_string(),
            members: group.iter().map(|unit| unit.key()).collect(),
        });
    }

    fn encode_requirements(
        &self,
        ctx: &mut EncodingContext,
        problem: &mut Problem,
        slice: &Slice,
        unit: &Arc<InstallableUnit>,
    ) {
        let var = ctx.var(unit);

        for requirement in unit.required() {
            if requirement.optional || !requirement.is_applicable(self.environment) {
                continue;
            }

            if requirement.negated {
                for conflicting in slice.find_matches(requirement) {
                    if conflicting.key() == unit.key() {
                        continue;
                    }
                    let other = ctx.var(&conflicting);
                    problem.add_constraint(Constraint::at_least(
                        vec![Term::new(-1, var), Term::new(-1, other)],
                        -1,
                        ConstraintKind::Negation,
                    ));
                    ctx.explain(Explanation::Negation {
                        unit: unit.key(),
                        requirement: requirement.clone(),
                        conflicting: conflicting.key(),
                    });
                }
                continue;
            }

            let candidates: Vec<Arc<InstallableUnit>> = slice
                .find_matches(requirement)
                .into_iter()
                .filter(|candidate| candidate.is_applicable(self.environment))
                .collect();

            if candidates.is_empty() {
                if !requirement.greedy {
                    log::debug!("Ignoring {} of {}: no match in the slice", requirement, unit);
                    continue;
                }
                problem.add_constraint(Constraint::equal(vec![Term::new(1, var)], 0, ConstraintKind::Exclusion));
                log::warn!("Excluding {}: no unit in the slice satisfies {}", unit, requirement);
                ctx.status.add(
                    Status::warning(format!("{} cannot be installed: nothing satisfies {}", unit, requirement))
                        .with_code(StatusCode::UnitExcluded),
                );
                ctx.explain(Explanation::MissingMatch {
                    unit: unit.key(),
                    requirement: requirement.clone(),
                });
                continue;
            }

            let mut terms = vec![Term::new(-1, var)];
            terms.extend(candidates.iter().map(|candidate| Term::new(1, ctx.var(candidate))));
            problem.add_constraint(Constraint::at_least(terms, 0, ConstraintKind::Requirement));
            ctx.explain(Explanation::Dependency {
                unit: unit.key(),
                requirement: requirement.clone(),
                candidates: candidates.iter().map(|candidate| candidate.key()).collect(),
            });
        }
    }

    /// Lowest version of a group costs `n`, the highest costs 1. Optional
    /// roots are rewarded by more than every other weight combined.
    fn objective(
        &self,
        ctx: &mut EncodingContext,
        slice: &Slice,
        roots: &[(Arc<InstallableUnit>, InclusionRule)],
    ) -> Vec<Term> {
        let mut weights: BTreeMap<Var, i64> = BTreeMap::new();
        for group in slice.groups().values() {
            let n = group.len() as i64;
            for (index, unit) in group.iter().enumerate() {
                weights.insert(ctx.var(unit), n - index as i64);
            }
        }

        let reward: i64 = weights.values().filter(|w| **w > 0).sum::<i64>() + 1;
        for (root, rule) in roots {
            if *rule == InclusionRule::Optional {
                let var = ctx.var(root);
                *weights.entry(var).or_insert(0) -= reward;
                ctx.explain(Explanation::OptionalRoot { unit: root.key() });
            }
        }

        weights
            .into_iter()
            .map(|(var, weight)| Term::new(weight, var))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::director::problem::Relation;
    use crate::director::slicer::Slicer;
    use crate::repository::InMemoryRepository;
    use provis_version::{Version, VersionRange};

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn range(s: &str) -> VersionRange {
        VersionRange::parse(s).unwrap()
    }

    fn singleton(id: &str, version: &str) -> Arc<InstallableUnit> {
        Arc::new(InstallableUnit::builder(id, v(version)).singleton(true).build())
    }

    fn encode(
        units: Vec<Arc<InstallableUnit>>,
        roots: &[(Arc<InstallableUnit>, InclusionRule)],
    ) -> Encoding {
        let repository = InMemoryRepository::with_units("test", units);
        let env = Environment::new();
        let root_units: Vec<_> = roots.iter().map(|(unit, _)| unit.clone()).collect();
        let slice = Slicer::new(&repository, &env).slice(&root_units).unwrap();
        Projector::new(&env).encode(&slice, roots)
    }

    fn constraints_of(encoding: &Encoding, kind: ConstraintKind) -> Vec<&Constraint> {
        encoding
            .problem()
            .constraints()
            .iter()
            .filter(|c| c.kind == kind)
            .collect()
    }

    #[test]
    fn test_objective_prefers_highest_version() {
        let root = Arc::new(
            InstallableUnit::builder("root", v("1.0"))
                .requires(Requirement::unit("lib", range("")))
                .build(),
        );
        let libs = vec![
            Arc::new(InstallableUnit::builder("lib", v("1.0")).build()),
            Arc::new(InstallableUnit::builder("lib", v("2.0")).build()),
            Arc::new(InstallableUnit::builder("lib", v("3.0")).build()),
        ];
        let mut units = libs.clone();
        units.push(root.clone());
        let encoding = encode(units, &[(root.clone(), InclusionRule::Strict)]);

        let weight = |key: UnitKey| {
            let var = encoding.variable(&key).unwrap();
            encoding
                .problem()
                .objective()
                .iter()
                .find(|t| t.var == var)
                .map(|t| t.coefficient)
                .unwrap()
        };
        assert_eq!(weight(libs[0].key()), 3);
        assert_eq!(weight(libs[1].key()), 2);
        assert_eq!(weight(libs[2].key()), 1);
        assert_eq!(weight(root.key()), 1);
    }

    #[test]
    fn test_variables_follow_unit_order() {
        let root = Arc::new(
            InstallableUnit::builder("b", v("1.0"))
                .requires(Requirement::unit("a", range("")))
                .build(),
        );
        let a = Arc::new(InstallableUnit::builder("a", v("1.0")).build());
        let encoding = encode(vec![root.clone(), a.clone()], &[(root.clone(), InclusionRule::Strict)]);

        assert_eq!(encoding.variable(&a.key()), Some(Var::new(1)));
        assert_eq!(encoding.variable(&root.key()), Some(Var::new(2)));
        assert_eq!(encoding.unit(Var::new(1)), Some(&a));
    }

    #[test]
    fn test_singleton_constraints() {
        let root = Arc::new(
            InstallableUnit::builder("root", v("1.0"))
                .requires(Requirement::unit("s", range("")))
                .build(),
        );
        let s1 = singleton("s", "1.0");
        let s2 = singleton("s", "2.0");
        let plain = Arc::new(InstallableUnit::builder("s", v("3.0")).build());
        let encoding = encode(
            vec![root.clone(), s1, s2, plain],
            &[(root.clone(), InclusionRule::Strict)],
        );

        let singletons = constraints_of(&encoding, ConstraintKind::Singleton);
        // one among the singletons, one pairing them with the plain sibling
        assert_eq!(singletons.len(), 2);
        assert_eq!(singletons[0].terms.len(), 2);
        assert_eq!(singletons[1].terms.len(), 3);
        assert!(singletons.iter().all(|c| c.degree == -1 && c.relation == Relation::AtLeast));
    }

    #[test]
    fn test_strict_and_optional_roots() {
        let strict = Arc::new(InstallableUnit::builder("strict", v("1.0")).build());
        let optional = Arc::new(InstallableUnit::builder("optional", v("1.0")).build());
        let encoding = encode(
            vec![strict.clone(), optional.clone()],
            &[
                (strict.clone(), InclusionRule::Strict),
                (optional.clone(), InclusionRule::Optional),
            ],
        );

        let roots = constraints_of(&encoding, ConstraintKind::Root);
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].terms[0].var, encoding.variable(&strict.key()).unwrap());

        let optional_var = encoding.variable(&optional.key()).unwrap();
        let reward = encoding
            .problem()
            .objective()
            .iter()
            .find(|t| t.var == optional_var)
            .unwrap()
            .coefficient;
        // positive weights are 1 + 1, so K = 3 and the coefficient is 1 - 3
        assert_eq!(reward, -2);
        assert_eq!(encoding.explain(&optional.key()).len(), 1);
    }

    #[test]
    fn test_negation_against_sliced_units_only() {
        let root = Arc::new(
            InstallableUnit::builder("root", v("1.0"))
                .requires(Requirement::unit("bad", range("")).negate())
                .requires(Requirement::unit("good", range("")))
                .build(),
        );
        let good = Arc::new(InstallableUnit::builder("good", v("1.0")).build());
        let bad = Arc::new(InstallableUnit::builder("bad", v("1.0")).build());
        let encoding = encode(
            vec![root.clone(), good, bad.clone()],
            &[(root.clone(), InclusionRule::Strict)],
        );

        // bad never entered the slice, so the negation contributes nothing
        assert!(constraints_of(&encoding, ConstraintKind::Negation).is_empty());
        assert!(encoding.variable(&bad.key()).is_none());
    }

    #[test]
    fn test_missing_match_pins_unit_with_warning() {
        let root = Arc::new(
            InstallableUnit::builder("root", v("1.0"))
                .requires(Requirement::unit("dep", range("")))
                .build(),
        );
        let dep = Arc::new(
            InstallableUnit::builder("dep", v("1.0"))
                .filter(crate::metadata::Filter::parse("(os=linux)").unwrap())
                .build(),
        );
        let repository = InMemoryRepository::with_units("test", vec![root.clone(), dep]);
        let linux = Environment::parse("os=linux").unwrap();
        let slice = Slicer::new(&repository, &linux).slice(&[root.clone()]).unwrap();
        assert_eq!(slice.len(), 2);

        // projected against another environment the only candidate drops out
        let win32 = Environment::parse("os=win32").unwrap();
        let encoding = Projector::new(&win32).encode(&slice, &[(root.clone(), InclusionRule::Strict)]);

        let exclusions = constraints_of(&encoding, ConstraintKind::Exclusion);
        assert_eq!(exclusions.len(), 1);
        assert_eq!(exclusions[0].terms[0].var, encoding.variable(&root.key()).unwrap());
        assert!(encoding
            .explain(&root.key())
            .iter()
            .any(|e| matches!(e, Explanation::MissingMatch { .. })));
        assert!(encoding.status().find_code(StatusCode::UnitExcluded).is_some());
    }

    #[test]
    fn test_non_greedy_requirement_constrains_only_sliced_matches() {
        use crate::metadata::Capability;

        let consumer = Arc::new(
            InstallableUnit::builder("consumer", v("1.0"))
                .requires(Requirement::new("ns", "impl", range("")).non_greedy())
                .build(),
        );
        let provider = Arc::new(
            InstallableUnit::builder("provider", v("1.0"))
                .provides(Capability::new("ns", "impl", v("1.0")))
                .build(),
        );

        // the provider is only sliced when something greedy asks for it
        let encoding = encode(
            vec![consumer.clone(), provider.clone()],
            &[(consumer.clone(), InclusionRule::Strict), (provider.clone(), InclusionRule::Strict)],
        );
        assert_eq!(constraints_of(&encoding, ConstraintKind::Requirement).len(), 1);

        let encoding = encode(
            vec![consumer.clone(), provider],
            &[(consumer.clone(), InclusionRule::Strict)],
        );
        assert!(constraints_of(&encoding, ConstraintKind::Requirement).is_empty());
        assert!(constraints_of(&encoding, ConstraintKind::Exclusion).is_empty());
        assert!(encoding.status().find_code(StatusCode::UnitExcluded).is_none());
    }
}
