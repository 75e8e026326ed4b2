//! Show command - print a profile snapshot.

use anyhow::{Context as _, Result};
use clap::Args;
use console::style;

use provis_core::{InclusionRule, Profile};

use crate::context::Context;

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Snapshot timestamp (milliseconds) to show instead of the current profile
    #[arg(long)]
    pub at: Option<i64>,

    /// Print the profile as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(ctx: &Context, args: ShowArgs) -> Result<i32> {
    let profile = match args.at {
        Some(timestamp) => ctx.registry.get_profile_at(&ctx.profile_name, timestamp)?,
        None => ctx.current_profile()?,
    };

    let Some(profile) = profile else {
        eprintln!(
            "{} No such profile snapshot: {}",
            style("Error:").red().bold(),
            ctx.profile_name
        );
        return Ok(1);
    };

    if args.json {
        let json = serde_json::to_string_pretty(&profile).context("Failed to serialize profile")?;
        println!("{}", json);
    } else {
        print_profile(&profile);
    }
    Ok(0)
}

fn print_profile(profile: &Profile) {
    let when = profile
        .timestamp_utc()
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never saved".to_string());
    println!("{} {} ({})", style("Profile").green().bold(), style(profile.name()).white().bold(), when);

    if !profile.properties().is_empty() {
        println!("{}", style("Properties:").yellow());
        for (key, value) in profile.properties() {
            println!("  {} = {}", key, value);
        }
    }

    println!("{} {}", style("Units:").yellow(), profile.len());
    for installed in profile.installed() {
        let marker = match (installed.is_root(), installed.inclusion_rule()) {
            (true, InclusionRule::Strict) => style("root").green().to_string(),
            (true, InclusionRule::Optional) => style("root, optional").cyan().to_string(),
            (false, _) => String::new(),
        };
        println!("  {} {}", style(installed.unit.key()).white().bold(), marker);
    }
}
