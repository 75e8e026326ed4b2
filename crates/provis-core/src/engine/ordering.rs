use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crate::director::{Operand, OperandKind};
use crate::metadata::InstallableUnit;

/// Order operands for execution.
///
/// Uninstalls come first, dependents before what they depend on. Then
/// updates and installs, dependencies first. Operands that only change
/// properties come last.
pub fn order_operands(operands: &[Operand]) -> Vec<Operand> {
    let mut uninstalls = Vec::new();
    let mut updates = Vec::new();
    let mut installs = Vec::new();
    let mut unchanged = Vec::new();

    for op in operands {
        match op.kind() {
            OperandKind::Uninstall => uninstalls.push(op.clone()),
            OperandKind::Update => updates.push(op.clone()),
            OperandKind::Install => installs.push(op.clone()),
            OperandKind::Unchanged => unchanged.push(op.clone()),
        }
    }

    let mut ordered = topological_sort(uninstalls, |op| op.before());
    ordered.reverse();
    ordered.extend(topological_sort(updates, |op| op.after()));
    ordered.extend(topological_sort(installs, |op| op.after()));
    ordered.extend(unchanged);
    ordered
}

/// Kahn's algorithm over the requirements of `unit_of(op)`: an operand
/// whose unit provides what another one requires is placed first. Cycles
/// keep their input order.
fn topological_sort<F>(operands: Vec<Operand>, unit_of: F) -> Vec<Operand>
where
    F: Fn(&Operand) -> Option<&Arc<InstallableUnit>>,
{
    if operands.len() < 2 {
        return operands;
    }

    let units: Vec<Option<&Arc<InstallableUnit>>> = operands.iter().map(&unit_of).collect();
    let mut in_degree = vec![0usize; operands.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); operands.len()];

    for (idx, unit) in units.iter().enumerate() {
        let Some(unit) = unit else { continue };
        for requirement in unit.required().iter().filter(|r| !r.negated) {
            for (dep_idx, dep) in units.iter().enumerate() {
                if dep_idx == idx {
                    continue;
                }
                if dep.is_some_and(|dep| dep.satisfies(requirement)) {
                    dependents[dep_idx].push(idx);
                    in_degree[idx] += 1;
                }
            }
        }
    }

    let mut queue: VecDeque<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(idx, _)| idx)
        .collect();
    let mut result: Vec<usize> = Vec::with_capacity(operands.len());

    while let Some(idx) = queue.pop_front() {
        result.push(idx);
        for &dependent in &dependents[idx] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if result.len() != operands.len() {
        log::debug!("Dependency cycle among {} operands", operands.len() - result.len());
        let placed: HashSet<usize> = result.iter().copied().collect();
        result.extend((0..operands.len()).filter(|idx| !placed.contains(idx)));
    }

    let mut slots: Vec<Option<Operand>> = operands.into_iter().map(Some).collect();
    result.into_iter().filter_map(|idx| slots[idx].take()).collect()
}
