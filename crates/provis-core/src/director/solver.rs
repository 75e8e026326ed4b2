use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use super::decisions::BranchAndBoundSolver;
use super::problem::{Problem, Term, Var};
use crate::error::{ProvisionError, Result};

/// Truth value of every variable of a problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    values: Vec<bool>,
}

impl Assignment {
    pub fn new(values: Vec<bool>) -> Self {
        Self { values }
    }

    /// Value of `var`; variables beyond the assignment are false
    pub fn value(&self, var: Var) -> bool {
        self.values.get(var.offset()).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Variables set to true
    pub fn selected(&self) -> impl Iterator<Item = Var> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, value)| **value)
            .map(|(offset, _)| Var::new(offset as u32 + 1))
    }

    pub fn cost(&self, objective: &[Term]) -> i64 {
        objective
            .iter()
            .filter(|term| self.value(term.var))
            .map(|term| term.coefficient)
            .sum()
    }
}

/// What a solver binding reports back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverOutcome {
    Satisfiable(Assignment),
    /// The search space was exhausted without a solution
    Unsatisfiable,
    /// Propagation failed before any decision was taken
    Contradiction,
    Timeout,
    IoError(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SolverLimits {
    pub deadline: Option<Instant>,
}

impl SolverLimits {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn expired(&self) -> bool {
        self.deadline.map(|deadline| Instant::now() >= deadline).unwrap_or(false)
    }
}

/// A pseudo-boolean optimizer: minimize the objective subject to the
/// constraints
pub trait PbSolver: Send + Sync {
    fn name(&self) -> &str;

    fn solve(&self, problem: &Problem, limits: &SolverLimits) -> SolverOutcome;
}

/// Hands problems to a [`PbSolver`] and maps its outcome to a result.
///
/// The problem always travels as OPB text, the same form written to the
/// dump directory when one is configured.
#[derive(Clone)]
pub struct SolverAdapter {
    solver: Arc<dyn PbSolver>,
    timeout: Duration,
    dump_dir: Option<PathBuf>,
}

impl SolverAdapter {
    pub fn new(solver: Arc<dyn PbSolver>) -> Self {
        Self {
            solver,
            timeout: Duration::from_secs(60),
            dump_dir: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_dump_dir(mut self, dump_dir: Option<PathBuf>) -> Self {
        self.dump_dir = dump_dir;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn dump(&self, dir: &Path, text: &str) {
        let path = dir.join(format!("problem-{}.opb", Utc::now().format("%Y%m%d%H%M%S%3f")));
        match fs::create_dir_all(dir).and_then(|_| fs::write(&path, text)) {
            Ok(()) => log::debug!("Wrote solver problem to {}", path.display()),
            Err(e) => log::warn!("Could not write solver problem to {}: {}", path.display(), e),
        }
    }

    pub fn solve(&self, problem: &Problem) -> Result<Assignment> {
        let text = problem.to_opb();
        if let Some(dir) = &self.dump_dir {
            self.dump(dir, &text);
        }
        let problem = Problem::from_opb(&text)?;

        log::debug!(
            "Running {} on {} variables and {} constraints",
            self.solver.name(),
            problem.num_variables(),
            problem.constraints().len()
        );
        let start = Instant::now();
        let outcome = self.solver.solve(&problem, &SolverLimits::with_timeout(self.timeout));
        log::info!("Solver finished in {:.3} seconds", start.elapsed().as_secs_f64());

        match outcome {
            SolverOutcome::Satisfiable(assignment) => Ok(assignment),
            SolverOutcome::Unsatisfiable => Err(ProvisionError::Unsatisfiable),
            SolverOutcome::Contradiction => Err(ProvisionError::Contradiction),
            SolverOutcome::Timeout => Err(ProvisionError::Timeout {
                seconds: self.timeout.as_secs(),
            }),
            SolverOutcome::IoError(message) => Err(ProvisionError::SolverIo(message)),
        }
    }
}

impl Default for SolverAdapter {
    fn default() -> Self {
        Self::new(Arc::new(BranchAndBoundSolver::new()))
    }
}

impl std::fmt::Debug for SolverAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolverAdapter")
            .field("solver", &self.solver.name())
            .field("timeout", &self.timeout)
            .field("dump_dir", &self.dump_dir)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::director::problem::{Constraint, ConstraintKind};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records the problem it receives and answers with a fixed outcome
    struct Scripted {
        outcome: SolverOutcome,
        seen: Mutex<Option<Problem>>,
    }

    impl Scripted {
        fn new(outcome: SolverOutcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                seen: Mutex::new(None),
            })
        }
    }

    impl PbSolver for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn solve(&self, problem: &Problem, _limits: &SolverLimits) -> SolverOutcome {
            *self.seen.lock().unwrap() = Some(problem.clone());
            self.outcome.clone()
        }
    }

    fn problem() -> Problem {
        let mut problem = Problem::new(1);
        problem.set_objective(vec![Term::new(1, Var::new(1))]);
        problem.add_constraint(Constraint::equal(vec![Term::new(1, Var::new(1))], 1, ConstraintKind::Root));
        problem
    }

    #[test]
    fn test_problem_travels_as_opb() {
        let solver = Scripted::new(SolverOutcome::Satisfiable(Assignment::new(vec![true])));
        let adapter = SolverAdapter::new(solver.clone());

        let assignment = adapter.solve(&problem()).unwrap();
        assert!(assignment.value(Var::new(1)));
        assert_eq!(solver.seen.lock().unwrap().as_ref(), Some(&problem()));
    }

    #[test]
    fn test_outcomes_map_to_errors() {
        let cases = [
            (SolverOutcome::Unsatisfiable, "Unsatisfiable"),
            (SolverOutcome::Contradiction, "Contradiction"),
            (SolverOutcome::Timeout, "Timeout"),
            (SolverOutcome::IoError("pipe".to_string()), "SolverIo"),
        ];
        for (outcome, expected) in cases {
            let adapter = SolverAdapter::new(Scripted::new(outcome)).with_timeout(Duration::from_secs(3));
            let err = adapter.solve(&problem()).unwrap_err();
            assert!(format!("{:?}", err).starts_with(expected), "{:?}", err);
        }
    }

    #[test]
    fn test_dump_dir() {
        let dir = TempDir::new().unwrap();
        let dumps = dir.path().join("dumps");
        let adapter = SolverAdapter::default().with_dump_dir(Some(dumps.clone()));
        adapter.solve(&problem()).unwrap();

        let files: Vec<_> = fs::read_dir(&dumps).unwrap().collect();
        assert_eq!(files.len(), 1);
        let text = fs::read_to_string(files[0].as_ref().unwrap().path()).unwrap();
        assert!(text.starts_with("* #variable= 1 #constraint= 1"));
    }

    #[test]
    fn test_unwritable_dump_dir_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();
        let adapter = SolverAdapter::default().with_dump_dir(Some(blocker.join("dumps")));
        assert!(adapter.solve(&problem()).is_ok());
    }

    #[test]
    fn test_assignment_cost() {
        let assignment = Assignment::new(vec![true, false, true]);
        let objective = vec![
            Term::new(3, Var::new(1)),
            Term::new(5, Var::new(2)),
            Term::new(-2, Var::new(3)),
        ];
        assert_eq!(assignment.cost(&objective), 1);
        assert_eq!(assignment.selected().collect::<Vec<_>>(), vec![Var::new(1), Var::new(3)]);
        assert!(!assignment.value(Var::new(9)));
    }
}
