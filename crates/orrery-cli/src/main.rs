mod commands;
mod progress;
mod summary;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "orrery", about = "Deferred processing pipelines for astronomical images")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (TOML); built-in defaults when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured pipelines and their flags
    Pipelines,
    /// Show FITS header units and observation date
    Info(commands::info::InfoArgs),
    /// Run a pipeline over a set of input files
    Run(commands::run::RunArgs),
    /// Print or save the default settings
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.config.as_deref();
    match &cli.command {
        Commands::Pipelines => commands::pipelines::run(config),
        Commands::Info(args) => commands::info::run(args),
        Commands::Run(args) => commands::run::run(args, config),
        Commands::Config(args) => commands::config::run(args),
    }
}
