//! Aedris CLI - Command-line interface for the Aedris build tools.
//!
//! Plugins are compiled into the binary. The stock `aedris` binary ships an
//! empty [`PluginCatalog`]; a project with plugins builds its own binary and
//! hands its catalog to [`run_with_catalog`]:
//!
//! ```no_run
//! use aedris_cli::{PluginCatalog, run_with_catalog};
//! use aedris_engine::BuildPlugin;
//!
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     let catalog = PluginCatalog::new().with("my-plugin", || BuildPlugin::new("my-plugin").shared());
//!     run_with_catalog(catalog).await
//! }
//! ```

mod commands;
mod discovery;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use aedris_core::{BuildEnvironment, Mode};
use aedris_engine::{DEFAULT_BUNDLER, SharedPlugin};
use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::EnvFilter;

use commands::Project;

pub use aedris_plugin::PluginCatalog;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "AEDRIS_LOG";

#[derive(Parser)]
#[command(name = "aedris")]
#[command(
    author,
    version,
    about = "A pluggable build orchestrator for multi-target web applications"
)]
#[command(propagate_version = true)]
#[command(
    after_help = "Plugins are resolved from the catalog compiled into this binary. The stock binary has none registered."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file name or path (searched upwards from the project directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Project directory to start the config search from
    #[arg(short, long, global = true)]
    project_dir: Option<PathBuf>,

    /// Build in production mode
    #[arg(long, global = true)]
    production: bool,

    /// Bundler executable
    #[arg(long, global = true, default_value = DEFAULT_BUNDLER)]
    bundler: String,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build every target
    Build {
        /// Rebuild when files change
        #[arg(short, long)]
        watch: bool,

        /// Print the normalized project config instead of building
        #[arg(long)]
        print_config: bool,

        /// Print the compiler config of every target instead of building
        #[arg(long)]
        print_compiler_config: bool,
    },

    /// Remove build outputs
    Clean,

    /// List available tasks
    Tasks,

    /// Run a task registered by a plugin
    Run {
        /// Task to run
        task: String,
    },
}

/// Parses the command line and runs it with the plugins in `catalog`.
pub async fn run_with_catalog(catalog: PluginCatalog<SharedPlugin>) -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    match run(cli, Arc::new(catalog)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:?}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(cli: Cli, catalog: Arc<PluginCatalog<SharedPlugin>>) -> Result<()> {
    let config_path = discovery::find_config(cli.project_dir.as_deref(), cli.config.as_deref())?;
    tracing::debug!(target: "aedris::cli", config = %config_path.display(), "using config");

    let mut env = BuildEnvironment::from_env();
    if cli.production {
        env.mode = Mode::Production;
    }

    let project = Project {
        config_path,
        env,
        bundler: cli.bundler,
        catalog,
    };

    match cli.command {
        Commands::Build {
            watch,
            print_config,
            print_compiler_config,
        } => commands::build::execute(&project, watch, print_config, print_compiler_config).await,

        Commands::Clean => commands::clean::execute(&project).await,

        Commands::Tasks => commands::tasks::execute(&project).await,

        Commands::Run { task } => {
            commands::run::execute(&project, &task, aedris_engine::TaskArgs::default()).await
        }
    }
}
