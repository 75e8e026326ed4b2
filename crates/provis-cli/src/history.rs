//! History command - list the snapshots of a profile.

use anyhow::Result;
use chrono::DateTime;
use clap::Args;
use console::style;
use std::sync::Arc;

use provis_core::InMemoryRepository;

use crate::context::Context;

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Also print what changed between consecutive snapshots
    #[arg(long)]
    pub changes: bool,
}

pub fn execute(ctx: &Context, args: HistoryArgs) -> Result<i32> {
    let timestamps = ctx.registry.timestamps(&ctx.profile_name)?;
    if timestamps.is_empty() {
        println!("{} Profile {} has no snapshots", style("Info:").cyan(), ctx.profile_name);
        return Ok(0);
    }

    // diff plans only compare profiles, no repository is consulted
    let planner = ctx.planner(Arc::new(InMemoryRepository::new("empty")));
    let mut previous = None;

    println!("{} {}", style("History of").green().bold(), style(&ctx.profile_name).white().bold());
    for (idx, timestamp) in timestamps.iter().enumerate() {
        let when = DateTime::from_timestamp_millis(*timestamp)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
            .unwrap_or_else(|| "?".to_string());
        let current = if idx + 1 == timestamps.len() {
            style(" (current)").green().to_string()
        } else {
            String::new()
        };
        println!("  {}  {}{}", style(timestamp).yellow(), when, current);

        if args.changes {
            let Some(snapshot) = ctx.registry.get_profile_at(&ctx.profile_name, *timestamp)? else {
                continue;
            };
            if let Some(before) = &previous {
                let plan = planner.get_diff_plan(before, &snapshot);
                println!("      {}", style(plan.summary()).dim());
            } else {
                println!("      {} unit(s)", snapshot.len());
            }
            previous = Some(snapshot);
        }
    }

    Ok(0)
}
