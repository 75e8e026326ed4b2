//! Pseudo-boolean problem description and its OPB text form.
//!
//! ```text
//! * #variable= 3 #constraint= 2
//! min: +2 x1 +1 x2 +1 x3 ;
//! * [singleton]
//! -1 x1 -1 x2 >= -1 ;
//! * [root]
//! +1 x3 = 1 ;
//! ```
//!
//! Comment lines of the form `* [kind]` tag the next constraint with the
//! reason it was emitted; other comment lines are ignored.

use std::fmt;

use crate::error::{ProvisionError, Result};

/// Boolean decision variable, numbered from 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(u32);

impl Var {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> u32 {
        self.0
    }

    /// Zero-based position, for indexing assignment vectors
    pub fn offset(self) -> usize {
        (self.0 - 1) as usize
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Term {
    pub coefficient: i64,
    pub var: Var,
}

impl Term {
    pub fn new(coefficient: i64, var: Var) -> Self {
        Self { coefficient, var }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+} {}", self.coefficient, self.var)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    AtLeast,
    Equal,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::AtLeast => ">=",
            Relation::Equal => "=",
        }
    }
}

/// Why a constraint was emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    Exclusion,
    Singleton,
    Requirement,
    Negation,
    Root,
    Other,
}

impl ConstraintKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintKind::Exclusion => "exclusion",
            ConstraintKind::Singleton => "singleton",
            ConstraintKind::Requirement => "requirement",
            ConstraintKind::Negation => "negation",
            ConstraintKind::Root => "root",
            ConstraintKind::Other => "other",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "exclusion" => Some(ConstraintKind::Exclusion),
            "singleton" => Some(ConstraintKind::Singleton),
            "requirement" => Some(ConstraintKind::Requirement),
            "negation" => Some(ConstraintKind::Negation),
            "root" => Some(ConstraintKind::Root),
            "other" => Some(ConstraintKind::Other),
            _ => None,
        }
    }
}

/// Linear constraint `Σ terms <relation> degree`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub terms: Vec<Term>,
    pub relation: Relation,
    pub degree: i64,
    pub kind: ConstraintKind,
}

impl Constraint {
    pub fn at_least(terms: Vec<Term>, degree: i64, kind: ConstraintKind) -> Self {
        Self {
            terms,
            relation: Relation::AtLeast,
            degree,
            kind,
        }
    }

    pub fn equal(terms: Vec<Term>, degree: i64, kind: ConstraintKind) -> Self {
        Self {
            terms,
            relation: Relation::Equal,
            degree,
            kind,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for term in &self.terms {
            write!(f, "{} ", term)?;
        }
        write!(f, "{} {} ;", self.relation.as_str(), self.degree)
    }
}

/// A minimization problem over boolean variables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Problem {
    variables: u32,
    objective: Vec<Term>,
    constraints: Vec<Constraint>,
}

impl Problem {
    pub fn new(variables: u32) -> Self {
        Self {
            variables,
            ..Default::default()
        }
    }

    pub fn num_variables(&self) -> u32 {
        self.variables
    }

    pub fn set_num_variables(&mut self, variables: u32) {
        self.variables = variables;
    }

    pub fn objective(&self) -> &[Term] {
        &self.objective
    }

    pub fn set_objective(&mut self, objective: Vec<Term>) {
        self.objective = objective;
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    /// Render as OPB text
    pub fn to_opb(&self) -> String {
        let mut out = format!(
            "* #variable= {} #constraint= {}\n",
            self.variables,
            self.constraints.len()
        );
        out.push_str("min:");
        for term in &self.objective {
            out.push(' ');
            out.push_str(&term.to_string());
        }
        out.push_str(" ;\n");
        for constraint in &self.constraints {
            out.push_str(&format!("* [{}]\n{}\n", constraint.kind.as_str(), constraint));
        }
        out
    }

    /// Parse OPB text produced by [`Problem::to_opb`] or any writer of the
    /// same linear subset
    pub fn from_opb(text: &str) -> Result<Self> {
        let mut problem = Problem::default();
        let mut declared_variables = None;
        let mut pending_kind = None;
        let mut max_var = 0u32;

        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let err = |reason: &str| ProvisionError::SolverIo(format!("OPB line {}: {}", lineno + 1, reason));

            if let Some(comment) = line.strip_prefix('*') {
                let comment = comment.trim();
                if let Some(rest) = comment.strip_prefix("#variable=") {
                    let count = rest
                        .split_whitespace()
                        .next()
                        .and_then(|n| n.parse::<u32>().ok())
                        .ok_or_else(|| err("invalid variable count"))?;
                    declared_variables = Some(count);
                } else if let Some(tag) = comment.strip_prefix('[').and_then(|c| c.strip_suffix(']')) {
                    pending_kind = ConstraintKind::from_tag(tag);
                }
                continue;
            }

            let body = line.strip_suffix(';').ok_or_else(|| err("missing ';'"))?.trim();

            if let Some(objective) = body.strip_prefix("min:") {
                let tokens: Vec<&str> = objective.split_whitespace().collect();
                problem.objective = parse_terms(&tokens, &mut max_var).map_err(|r| err(&r))?;
                continue;
            }

            let tokens: Vec<&str> = body.split_whitespace().collect();
            let op_pos = tokens
                .iter()
                .position(|t| *t == ">=" || *t == "=")
                .ok_or_else(|| err("missing relation"))?;
            if op_pos + 2 != tokens.len() {
                return Err(err("expected a single degree after the relation"));
            }
            let relation = if tokens[op_pos] == ">=" {
                Relation::AtLeast
            } else {
                Relation::Equal
            };
            let degree = tokens[op_pos + 1]
                .parse::<i64>()
                .map_err(|_| err("invalid degree"))?;
            let terms = parse_terms(&tokens[..op_pos], &mut max_var).map_err(|r| err(&r))?;

            problem.constraints.push(Constraint {
                terms,
                relation,
                degree,
                kind: pending_kind.take().unwrap_or(ConstraintKind::Other),
            });
        }

        problem.variables = match declared_variables {
            Some(declared) if declared < max_var => {
                return Err(ProvisionError::SolverIo(format!(
                    "OPB declares {} variables but uses x{}",
                    declared, max_var
                )))
            }
            Some(declared) => declared,
            None => max_var,
        };
        Ok(problem)
    }
}

fn parse_terms(tokens: &[&str], max_var: &mut u32) -> std::result::Result<Vec<Term>, String> {
    if tokens.len() % 2 != 0 {
        return Err("terms must be coefficient/variable pairs".to_string());
    }
    let mut terms = Vec::with_capacity(tokens.len() / 2);
    for pair in tokens.chunks(2) {
        let coefficient = pair[0]
            .parse::<i64>()
            .map_err(|_| format!("invalid coefficient \"{}\"", pair[0]))?;
        let index = pair[1]
            .strip_prefix('x')
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .ok_or_else(|| format!("invalid variable \"{}\"", pair[1]))?;
        *max_var = (*max_var).max(index);
        terms.push(Term::new(coefficient, Var::new(index)));
    }
    Ok(terms)
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_opb())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x(i: u32) -> Var {
        Var::new(i)
    }

    #[test]
    fn test_render() {
        let mut problem = Problem::new(2);
        problem.set_objective(vec![Term::new(2, x(1)), Term::new(1, x(2))]);
        problem.add_constraint(Constraint::at_least(
            vec![Term::new(-1, x(1)), Term::new(-1, x(2))],
            -1,
            ConstraintKind::Singleton,
        ));
        problem.add_constraint(Constraint::equal(vec![Term::new(1, x(2))], 1, ConstraintKind::Root));

        assert_eq!(
            problem.to_opb(),
            "* #variable= 2 #constraint= 2\n\
             min: +2 x1 +1 x2 ;\n\
             * [singleton]\n\
             -1 x1 -1 x2 >= -1 ;\n\
             * [root]\n\
             +1 x2 = 1 ;\n"
        );
    }

    #[test]
    fn test_parse_rendered() {
        let mut problem = Problem::new(3);
        problem.set_objective(vec![Term::new(-7, x(3))]);
        problem.add_constraint(Constraint::at_least(
            vec![Term::new(-1, x(1)), Term::new(1, x(2)), Term::new(1, x(3))],
            0,
            ConstraintKind::Requirement,
        ));
        problem.add_constraint(Constraint::equal(vec![Term::new(1, x(1))], 0, ConstraintKind::Exclusion));

        let parsed = Problem::from_opb(&problem.to_opb()).unwrap();
        assert_eq!(parsed, problem);
    }

    #[test]
    fn test_parse_foreign_opb() {
        let text = "* a comment\nmin: +1 x1 ;\n+1 x1 +1 x2 >= 1 ;\n";
        let problem = Problem::from_opb(text).unwrap();
        assert_eq!(problem.num_variables(), 2);
        assert_eq!(problem.constraints()[0].kind, ConstraintKind::Other);
    }

    #[test]
    fn test_parse_errors() {
        for text in [
            "min: +1 x1\n",
            "+1 x1 >= ;\n",
            "+1 y1 >= 1 ;\n",
            "+1 x1 1 ;\n",
            "+1 x0 >= 1 ;\n",
            "* #variable= 1 #constraint= 1\n+1 x2 >= 1 ;\n",
        ] {
            let err = Problem::from_opb(text).unwrap_err();
            assert!(matches!(err, ProvisionError::SolverIo(_)), "{}", text);
        }
    }
}
