//! Console rendering of plans and status trees.

use console::style;

use provis_core::{OperandKind, ProvisioningPlan, Severity, Status};

pub fn print_plan(plan: &ProvisioningPlan) {
    for operand in plan.operands() {
        match (operand.kind(), operand.before(), operand.after()) {
            (OperandKind::Install, _, Some(after)) => {
                println!("  {} {}", style("+").green(), style(after.key()).white().bold());
            }
            (OperandKind::Uninstall, Some(before), _) => {
                println!("  {} {}", style("-").red(), style(before.key()).white().bold());
            }
            (OperandKind::Update, Some(before), Some(after)) => {
                println!(
                    "  {} {} ({} => {})",
                    style("~").yellow(),
                    style(after.id()).white().bold(),
                    style(before.version()).dim(),
                    style(after.version()).yellow()
                );
            }
            (OperandKind::Unchanged, _, Some(after)) => {
                println!("  {} {} (reconfigure)", style("*").cyan(), style(after.key()).white());
            }
            _ => {}
        }
    }

    for change in plan.property_changes() {
        println!("  {} {}", style("=").cyan(), change);
    }

    if !plan.status().is_error() {
        println!("{} {}", style("Plan:").green().bold(), plan.summary());
    }
    print_status(plan.status());
}

/// Print every non-OK node of a status tree, indented by depth
pub fn print_status(status: &Status) {
    print_node(status, 0);
}

fn print_node(status: &Status, depth: usize) {
    let shown = !status.message().is_empty() && status.severity() > Severity::Ok;
    if shown {
        let label = match status.severity() {
            Severity::Ok => style("OK:").green(),
            Severity::Info => style("Info:").cyan(),
            Severity::Warning => style("Warning:").yellow(),
            Severity::Error => style("Error:").red().bold(),
            Severity::Cancel => style("Canceled:").magenta(),
        };
        let line = format!("{:indent$}{} {}", "", label, status.message(), indent = depth * 2);
        if status.is_error() {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }

    let next = if shown { depth + 1 } else { depth };
    for child in status.children() {
        print_node(child, next);
    }
}
