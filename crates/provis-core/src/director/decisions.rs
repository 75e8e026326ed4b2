//! Default solver binding: exact branch and bound over boolean variables.
//!
//! Constraints are normalized to `Σ c·l >= d` with positive `c` over
//! literals. Each constraint keeps its slack (the coefficients of its
//! non-false literals minus `d`). A negative slack is a conflict, and any
//! unassigned literal whose coefficient exceeds the slack is implied.

use std::collections::BTreeMap;

use super::problem::{Problem, Relation, Term};
use super::solver::{Assignment, PbSolver, SolverLimits, SolverOutcome};

/// Nodes visited between two deadline checks
const DEADLINE_INTERVAL: u32 = 256;

#[derive(Debug, Clone, Copy)]
struct Literal {
    var: usize,
    positive: bool,
    coefficient: i64,
}

#[derive(Debug)]
struct NormalizedConstraint {
    literals: Vec<Literal>,
}

/// Occurrence of a variable in a constraint
#[derive(Debug, Clone, Copy)]
struct Watch {
    constraint: usize,
    positive: bool,
    coefficient: i64,
}

#[derive(Debug, Clone, Copy)]
struct Decision {
    trail_len: usize,
    var: usize,
    value: bool,
    flipped: bool,
}

/// Normalize `Σ terms >= degree` and append it; false if it can never hold
fn normalize(terms: &[Term], degree: i64, out: &mut Vec<(Vec<Literal>, i64)>) -> bool {
    let mut merged: BTreeMap<usize, i64> = BTreeMap::new();
    for term in terms {
        *merged.entry(term.var.offset()).or_insert(0) += term.coefficient;
    }

    let mut degree = degree;
    let mut literals = Vec::new();
    for (var, coefficient) in merged {
        if coefficient > 0 {
            literals.push(Literal {
                var,
                positive: true,
                coefficient,
            });
        } else if coefficient < 0 {
            // c·x = c - c·¬x
            degree -= coefficient;
            literals.push(Literal {
                var,
                positive: false,
                coefficient: -coefficient,
            });
        }
    }

    if degree <= 0 {
        return true;
    }
    let total: i64 = literals.iter().map(|l| l.coefficient).sum();
    if total < degree {
        return false;
    }
    out.push((literals, degree));
    true
}

struct Search<'a> {
    objective: Vec<i64>,
    constraints: Vec<NormalizedConstraint>,
    slack: Vec<i64>,
    watches: Vec<Vec<Watch>>,
    values: Vec<Option<bool>>,
    trail: Vec<usize>,
    decisions: Vec<Decision>,
    limits: &'a SolverLimits,
}

impl<'a> Search<'a> {
    fn new(problem: &Problem, limits: &'a SolverLimits) -> Option<Self> {
        let used = problem
            .constraints()
            .iter()
            .flat_map(|c| c.terms.iter())
            .chain(problem.objective())
            .map(|t| t.var.index())
            .max()
            .unwrap_or(0);
        let n = problem.num_variables().max(used) as usize;

        let mut normalized = Vec::new();
        for constraint in problem.constraints() {
            if !normalize(&constraint.terms, constraint.degree, &mut normalized) {
                return None;
            }
            if constraint.relation == Relation::Equal {
                let negated: Vec<Term> = constraint
                    .terms
                    .iter()
                    .map(|t| Term::new(-t.coefficient, t.var))
                    .collect();
                if !normalize(&negated, -constraint.degree, &mut normalized) {
                    return None;
                }
            }
        }

        let mut objective = vec![0i64; n];
        for term in problem.objective() {
            objective[term.var.offset()] += term.coefficient;
        }

        let mut watches: Vec<Vec<Watch>> = vec![Vec::new(); n];
        let mut slack = Vec::with_capacity(normalized.len());
        let mut constraints = Vec::with_capacity(normalized.len());
        for (index, (literals, degree)) in normalized.into_iter().enumerate() {
            let total: i64 = literals.iter().map(|l| l.coefficient).sum();
            slack.push(total - degree);
            for literal in &literals {
                watches[literal.var].push(Watch {
                    constraint: index,
                    positive: literal.positive,
                    coefficient: literal.coefficient,
                });
            }
            constraints.push(NormalizedConstraint { literals });
        }

        Some(Self {
            objective,
            constraints,
            slack,
            watches,
            values: vec![None; n],
            trail: Vec::new(),
            decisions: Vec::new(),
            limits,
        })
    }

    /// Literals implied by a constraint at its current slack
    fn implied(&self, constraint: usize) -> Vec<(usize, bool)> {
        let slack = self.slack[constraint];
        self.constraints[constraint]
            .literals
            .iter()
            .filter(|l| self.values[l.var].is_none() && l.coefficient > slack)
            .map(|l| (l.var, l.positive))
            .collect()
    }

    /// Implications that hold before any assignment
    fn propagate_initial(&mut self) -> bool {
        let mut queue = Vec::new();
        for constraint in 0..self.constraints.len() {
            queue.extend(self.implied(constraint));
        }
        self.propagate(queue)
    }

    /// Assign and propagate; false on conflict. The trail records every
    /// assignment made, conflicting or not, so undo stays exact.
    fn propagate(&mut self, mut queue: Vec<(usize, bool)>) -> bool {
        while let Some((var, value)) = queue.pop() {
            match self.values[var] {
                Some(current) if current == value => continue,
                Some(_) => return false,
                None => {}
            }
            self.values[var] = Some(value);
            self.trail.push(var);

            let mut touched = Vec::new();
            for i in 0..self.watches[var].len() {
                let watch = self.watches[var][i];
                if watch.positive != value {
                    self.slack[watch.constraint] -= watch.coefficient;
                    touched.push(watch.constraint);
                }
            }
            for constraint in touched {
                if self.slack[constraint] < 0 {
                    return false;
                }
                queue.extend(self.implied(constraint));
            }
        }
        true
    }

    fn undo_to(&mut self, trail_len: usize) {
        while self.trail.len() > trail_len {
            let Some(var) = self.trail.pop() else { break };
            if let Some(value) = self.values[var].take() {
                for i in 0..self.watches[var].len() {
                    let watch = self.watches[var][i];
                    if watch.positive != value {
                        self.slack[watch.constraint] += watch.coefficient;
                    }
                }
            }
        }
    }

    /// Cost of the assigned-true variables plus every negative coefficient
    /// still open
    fn lower_bound(&self) -> i64 {
        self.values
            .iter()
            .zip(&self.objective)
            .map(|(value, c)| match value {
                Some(true) => *c,
                Some(false) => 0,
                None => (*c).min(0),
            })
            .sum()
    }

    fn decide(&mut self, var: usize, value: bool, flipped: bool) -> bool {
        self.decisions.push(Decision {
            trail_len: self.trail.len(),
            var,
            value,
            flipped,
        });
        self.propagate(vec![(var, value)])
    }

    /// Pop decisions until one can be flipped without conflict; false when
    /// the search space is exhausted
    fn backtrack(&mut self) -> bool {
        while let Some(decision) = self.decisions.pop() {
            self.undo_to(decision.trail_len);
            if decision.flipped {
                continue;
            }
            if self.decide(decision.var, !decision.value, true) {
                return true;
            }
        }
        false
    }

    fn run(&mut self) -> SolverOutcome {
        if !self.propagate_initial() {
            return SolverOutcome::Contradiction;
        }

        let mut best: Option<(i64, Vec<bool>)> = None;
        let mut nodes: u32 = 0;

        loop {
            if nodes % DEADLINE_INTERVAL == 0 && self.limits.expired() {
                return SolverOutcome::Timeout;
            }
            nodes = nodes.wrapping_add(1);

            let pruned = matches!(&best, Some((cost, _)) if self.lower_bound() >= *cost);
            let next = if pruned {
                None
            } else {
                self.values.iter().position(Option::is_none)
            };

            let descend = match next {
                Some(var) => {
                    let first = self.objective[var] < 0;
                    self.decide(var, first, false)
                }
                None => {
                    if !pruned {
                        let cost = self.lower_bound();
                        if best.as_ref().map(|(b, _)| cost < *b).unwrap_or(true) {
                            log::trace!("Found solution with cost {}", cost);
                            best = Some((cost, self.values.iter().map(|v| v.unwrap_or(false)).collect()));
                        }
                    }
                    false
                }
            };

            if !descend && !self.backtrack() {
                break;
            }
        }

        match best {
            Some((cost, values)) => {
                log::debug!("Optimal solution has cost {}", cost);
                SolverOutcome::Satisfiable(Assignment::new(values))
            }
            None => SolverOutcome::Unsatisfiable,
        }
    }
}

/// Exact minimizing solver used when no other binding is configured
#[derive(Debug, Default, Clone)]
pub struct BranchAndBoundSolver;

impl BranchAndBoundSolver {
    pub fn new() -> Self {
        Self
    }
}

impl PbSolver for BranchAndBoundSolver {
    fn name(&self) -> &str {
        "branch-and-bound"
    }

    fn solve(&self, problem: &Problem, limits: &SolverLimits) -> SolverOutcome {
        match Search::new(problem, limits) {
            Some(mut search) => search.run(),
            None => SolverOutcome::Contradiction,
        }
    }
}
