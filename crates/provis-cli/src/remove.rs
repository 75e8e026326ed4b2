//! Remove command - stop requesting root units.

use anyhow::Result;
use clap::Args;
use console::style;
use std::path::PathBuf;

use provis_core::{CancellationToken, ProfileChangeRequest};

use crate::context::Context;
use crate::install::apply_plan;
use crate::output;

#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Ids of the root units to remove
    #[arg(value_name = "UNITS", required = true)]
    pub units: Vec<String>,

    /// JSON repository offering replacements for what stays installed
    #[arg(short = 'r', long)]
    pub repository: Option<PathBuf>,

    /// Print the plan without applying it
    #[arg(long)]
    pub dry_run: bool,
}

pub fn execute(ctx: &Context, args: RemoveArgs) -> Result<i32> {
    let Some(profile) = ctx.current_profile()? else {
        eprintln!(
            "{} Profile {} does not exist",
            style("Error:").red().bold(),
            ctx.profile_name
        );
        return Ok(1);
    };

    let roots = profile.roots();
    let mut request = ProfileChangeRequest::new(profile);
    let mut removed = 0;

    for id in &args.units {
        let matching: Vec<_> = roots.iter().filter(|(unit, _)| unit.id() == id).collect();
        if matching.is_empty() {
            println!("  {} {} is not a root of the profile", style("!").yellow(), style(id).white());
            continue;
        }
        for (unit, _) in matching {
            request.remove_unit(unit.key());
            removed += 1;
        }
    }

    if removed == 0 {
        println!("{} Nothing to remove", style("Info:").cyan());
        return Ok(0);
    }

    let repository = ctx.optional_repository(args.repository.as_deref())?;
    let plan = ctx
        .planner(repository)
        .get_provisioning_plan(&request, &CancellationToken::new());
    output::print_plan(&plan);

    if plan.status().is_error() {
        return Ok(1);
    }
    if args.dry_run {
        return Ok(0);
    }
    apply_plan(ctx, &plan)
}
