mod context;
mod history;
mod install;
mod output;
mod remove;
mod revert;
mod show;
mod touchpoint;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "provis")]
#[command(about = "Resolve installable units and apply them to a profile")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Directory holding the project provis.json
    #[arg(short = 'd', long, default_value = ".", global = true)]
    working_dir: PathBuf,

    /// Profile to operate on (defaults to the configured profile)
    #[arg(short, long, global = true)]
    profile: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute and print the plan for installing units, without applying it
    Plan(install::InstallArgs),

    /// Install units into the profile
    Install(install::InstallArgs),

    /// Stop requesting units; whatever nothing else needs is removed
    Remove(remove::RemoveArgs),

    /// Show the installed units and properties of the profile
    Show(show::ShowArgs),

    /// List the snapshots of the profile
    History(history::HistoryArgs),

    /// Return the profile to an earlier snapshot
    Revert(revert::RevertArgs),
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(if cli.quiet { log::LevelFilter::Error } else { level })
        .format_timestamp(None)
        .init();

    let ctx = context::Context::load(&cli.working_dir, cli.profile.as_deref())?;

    match cli.command {
        Commands::Plan(args) => install::execute(&ctx, args, true),
        Commands::Install(args) => install::execute(&ctx, args, false),
        Commands::Remove(args) => remove::execute(&ctx, args),
        Commands::Show(args) => show::execute(&ctx, args),
        Commands::History(args) => history::execute(&ctx, args),
        Commands::Revert(args) => revert::execute(&ctx, args),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            eprintln!("Error: {}", e);
            for cause in e.chain().skip(1) {
                eprintln!("  Caused by: {}", cause);
            }
            ExitCode::FAILURE
        }
    }
}
