mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use cmd::run::RunArgs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "analyst",
    about = "Answer questions about a dataset with generated, sandboxed analysis scripts",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .analyst/ or .git/)
    #[arg(long, global = true, env = "ANALYST_ROOT")]
    root: Option<PathBuf>,

    /// Config file (default: <root>/.analyst/config.yaml)
    #[arg(long, global = true, env = "ANALYST_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse a dataset: select tasks, generate and run their scripts, write a report
    Run(RunArgs),

    /// List the analysis task catalog
    Tasks,

    /// Sanitize and validate a script the way generated code is checked
    Check {
        /// Python file to check
        file: PathBuf,
    },

    /// Initialise, show, or validate the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run(_) => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Run(args) => cmd::run::run(&root, config, args, cli.json),
        Commands::Tasks => cmd::tasks::run(&root, config, cli.json).map(|()| 0),
        Commands::Check { file } => cmd::check::run(&file, cli.json).map(|()| 0),
        Commands::Config { subcommand } => {
            cmd::config::run(&root, config, subcommand, cli.json).map(|()| 0)
        }
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            // Print the full error chain (anyhow's alternate Display)
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}
