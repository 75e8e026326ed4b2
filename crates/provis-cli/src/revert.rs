//! Revert command - return a profile to one of its earlier snapshots.

use anyhow::Result;
use clap::Args;
use console::style;
use std::sync::Arc;

use provis_core::InMemoryRepository;

use crate::context::Context;
use crate::install::apply_plan;
use crate::output;

#[derive(Args, Debug)]
pub struct RevertArgs {
    /// Timestamp of the snapshot to return to (see `provis history`)
    #[arg(value_name = "TIMESTAMP")]
    pub timestamp: i64,

    /// Print the plan without applying it
    #[arg(long)]
    pub dry_run: bool,
}

pub fn execute(ctx: &Context, args: RevertArgs) -> Result<i32> {
    let Some(current) = ctx.current_profile()? else {
        eprintln!("{} Profile {} does not exist", style("Error:").red().bold(), ctx.profile_name);
        return Ok(1);
    };
    let Some(target) = ctx.registry.get_profile_at(&ctx.profile_name, args.timestamp)? else {
        eprintln!(
            "{} Profile {} has no snapshot {}",
            style("Error:").red().bold(),
            ctx.profile_name,
            args.timestamp
        );
        return Ok(1);
    };

    println!(
        "{} Reverting {} to snapshot {}",
        style("Provis").green().bold(),
        style(&ctx.profile_name).white().bold(),
        args.timestamp
    );

    let plan = ctx
        .planner(Arc::new(InMemoryRepository::new("empty")))
        .get_diff_plan(&current, &target);
    output::print_plan(&plan);

    if plan.status().is_error() {
        return Ok(1);
    }
    if args.dry_run {
        return Ok(0);
    }
    apply_plan(ctx, &plan)
}
