//! Install command - add root units to the profile.

use anyhow::{anyhow, Context as _, Result};
use clap::Args;
use console::style;
use std::path::PathBuf;
use std::sync::Arc;

use provis_core::{CancellationToken, InstallableUnit, ProfileChangeRequest, ProvisioningPlan, Repository, Requirement};
use provis_version::{Version, VersionRange};

use crate::context::Context;
use crate::output;

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Units to install: `id`, `id@version` or `id@[1.0,2.0)`
    #[arg(value_name = "UNITS", required = true)]
    pub units: Vec<String>,

    /// Request the units optionally; they are left out if they cannot be installed
    #[arg(long)]
    pub optional: bool,

    /// JSON repository to resolve against
    #[arg(short = 'r', long, default_value = "repository.json")]
    pub repository: PathBuf,

    /// Print the plan without applying it
    #[arg(long)]
    pub dry_run: bool,
}

pub fn execute(ctx: &Context, args: InstallArgs, plan_only: bool) -> Result<i32> {
    let repository = ctx.repository(&args.repository)?;
    let apply = !(plan_only || args.dry_run);
    let profile = if apply { ctx.ensure_profile()? } else { ctx.profile_or_new()? };

    let mut request = ProfileChangeRequest::new(profile);
    for requested in &args.units {
        let unit = resolve_unit(repository.as_ref(), requested)?;
        if args.optional {
            request.add_optional_unit(unit);
        } else {
            request.add_unit(unit);
        }
    }

    println!(
        "{} Resolving {} unit(s) for profile {}",
        style("Provis").green().bold(),
        args.units.len(),
        style(&ctx.profile_name).white().bold()
    );

    let plan = ctx
        .planner(repository)
        .get_provisioning_plan(&request, &CancellationToken::new());
    output::print_plan(&plan);

    if plan.status().is_error() {
        return Ok(1);
    }
    if !apply {
        return Ok(0);
    }
    apply_plan(ctx, &plan)
}

/// Pick the highest unit matching `id`, `id@version` or `id@range`
pub fn resolve_unit(repository: &dyn Repository, requested: &str) -> Result<Arc<InstallableUnit>> {
    let (id, range) = match requested.split_once('@') {
        None => (requested, VersionRange::any()),
        Some((id, constraint)) if constraint.starts_with(['[', '(']) => (
            id,
            VersionRange::parse(constraint).with_context(|| format!("Invalid version range in {}", requested))?,
        ),
        Some((id, version)) => (
            id,
            VersionRange::exact(Version::parse(version).with_context(|| format!("Invalid version in {}", requested))?),
        ),
    };

    let matches = repository.find_matches(&Requirement::unit(id, range.clone()))?;
    matches
        .into_iter()
        .filter(|unit| unit.id() == id)
        .max_by(|a, b| a.version().cmp(b.version()))
        .ok_or_else(|| anyhow!("No unit {} matching {} in repository {}", id, range, repository.name()))
}

/// Apply a resolved plan and report the outcome
pub fn apply_plan(ctx: &Context, plan: &ProvisioningPlan) -> Result<i32> {
    if plan.is_empty() {
        println!("{} Nothing to apply", style("Info:").cyan());
        return Ok(0);
    }

    let result = ctx.engine(plan).perform(plan, &CancellationToken::new());
    output::print_status(&result.status);

    match result.profile() {
        Some(profile) => {
            println!(
                "{} Profile {} updated ({} unit(s))",
                style("Done:").green().bold(),
                style(profile.name()).white().bold(),
                profile.len()
            );
            Ok(0)
        }
        None => {
            eprintln!("{} Changes were rolled back", style("Aborted:").red().bold());
            Ok(1)
        }
    }
}
