#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod logging;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "moorhen")]
#[command(author, version, about = "A dependency materializer for node_modules trees", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Materialize a resolved dependency graph into node_modules
    Link {
        /// Path to the serialized resolution graph
        graph: PathBuf,

        /// Skip linking executable scripts into .bin directories
        #[arg(long)]
        no_bin_links: bool,

        /// Hardlink duplicate package content instead of copying it again
        #[arg(long)]
        link_duplicates: bool,

        /// Override the modules folder location
        #[arg(long, value_name = "PATH")]
        modules_folder: Option<PathBuf>,
    },
}

/// The working directory for a run: an explicit `--cwd`, or the enclosing
/// project root, falling back to the current directory itself.
fn resolve_cwd(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => {
            let current = std::env::current_dir().into_diagnostic()?;
            Ok(moorhen_core::paths::project_root(&current).unwrap_or(current))
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json);

    let cwd = resolve_cwd(cli.cwd.clone())?;

    match cli.command {
        Commands::Version => commands::version::run(cli.json),
        Commands::Link {
            graph,
            no_bin_links,
            link_duplicates,
            modules_folder,
        } => {
            let action = commands::link::LinkAction {
                graph,
                cwd,
                bin_links: !no_bin_links,
                link_duplicates,
                modules_folder,
            };
            let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
            runtime.block_on(commands::link::run(action, cli.json))
        }
    }
}
