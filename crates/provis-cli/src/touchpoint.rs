//! Touchpoint that reports each provisioning step without touching the system.

use console::style;

use provis_core::engine::{ActionParameters, PhaseId, ProvisioningAction, PARM_ARTIFACTS};
use provis_core::Status;

/// Prints every step the engine performs. Registered for all touchpoint
/// types found in a plan, so applying a plan records the state change in the
/// profile registry and shows what a real touchpoint would have done.
#[derive(Debug, Default)]
pub struct LoggingAction;

impl LoggingAction {
    pub fn new() -> Self {
        Self
    }
}

impl ProvisioningAction for LoggingAction {
    fn name(&self) -> &str {
        "log"
    }

    fn execute(&self, params: &ActionParameters) -> Status {
        let unit = params.unit();
        log::debug!(
            "{} {} via {} touchpoint",
            params.phase(),
            unit.key(),
            unit.touchpoint()
        );

        let marker = match params.phase() {
            PhaseId::Install | PhaseId::Configure => style("+").green(),
            PhaseId::Uninstall | PhaseId::Unconfigure => style("-").red(),
            _ => style("·").dim(),
        };
        println!(
            "  {} {:<11} {}",
            marker,
            params.phase().as_str(),
            style(unit.key()).white().bold()
        );

        if params.phase() == PhaseId::Collect {
            if let Some(artifacts) = params.get(PARM_ARTIFACTS).filter(|a| !a.is_empty()) {
                for artifact in artifacts.split(';') {
                    println!("                {}", style(artifact).dim());
                }
            }
        }

        Status::ok()
    }

    fn undo(&self, params: &ActionParameters) -> Status {
        log::info!("Undoing {} of {}", params.phase(), params.unit().key());
        println!(
            "  {} undo {} {}",
            style("!").yellow(),
            params.phase().as_str(),
            params.unit().key()
        );
        Status::ok()
    }
}
