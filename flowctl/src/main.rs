//! flowctl: manage integration flows, their versions and connections from the command line.

mod commands;
mod logging;
mod session;

use clap::{Args, Parser, Subcommand};
use flowctl_core::config::{EnvSettings, Preferences};
use flowctl_core::context::RequestContextBuilder;
use flowctl_integrations::pipeline::DEFAULT_CONCURRENCY;
use std::path::PathBuf;
use std::process;
use tracing::error;

#[derive(Parser)]
#[command(
    name = "flowctl",
    version,
    about = "Manage integration flows through the control plane"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every command.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Project id, defaults to the preferences file
    #[arg(long, short = 'p', global = true)]
    pub project: Option<String>,

    /// Region, defaults to the preferences file
    #[arg(long, short = 'r', global = true)]
    pub region: Option<String>,

    /// Access token to use instead of the cached or ambient credentials
    #[arg(long, short = 't', global = true)]
    pub token: Option<String>,

    /// Skip every API call
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Report HTTP 409 as success instead of failing
    #[arg(long, global = true)]
    pub ignore_conflicts: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage integrations and their versions
    Integrations {
        #[command(subcommand)]
        action: IntegrationsAction,
    },
}

#[derive(Subcommand)]
pub enum IntegrationsAction {
    /// List integration names
    List,
    /// Print a version, the latest one unless --version-id is given
    Get {
        name: String,
        /// Version id
        #[arg(long = "version-id", short = 'v')]
        version: Option<String>,
        /// Write the definition to a file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Write the override template extracted from the definition
        #[arg(long, short = 'x')]
        extract: Option<PathBuf>,
    },
    /// Create a version from a definition file, applying overrides first
    Apply {
        name: String,
        /// Definition file (JSON or YAML)
        #[arg(long, short = 'f')]
        file: PathBuf,
        /// Override file applied before creation
        #[arg(long, short = 'o')]
        overrides: Option<PathBuf>,
        /// Fail when an override does not match the definition
        #[arg(long)]
        strict: bool,
    },
    /// Upload a definition file as a new version
    Upload {
        name: String,
        /// Definition file (JSON or YAML)
        #[arg(long, short = 'f')]
        file: PathBuf,
    },
    /// Export integration versions to a folder
    Export {
        /// Output folder
        #[arg(long, short = 'f')]
        folder: PathBuf,
        /// Number of concurrent workers
        #[arg(long, short = 'c', default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,
        /// Export every version instead of the latest one
        #[arg(long)]
        all_versions: bool,
        /// Name files <name>_<snapshot>_<version>.json
        #[arg(long)]
        legacy_names: bool,
        /// Stop dispatching after the first failure
        #[arg(long)]
        fail_fast: bool,
    },
    /// Import version files from a folder
    Import {
        /// Input folder
        #[arg(long, short = 'f')]
        folder: PathBuf,
        /// Number of concurrent workers
        #[arg(long, short = 'c', default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,
        /// Read files named <name>_<snapshot>_<version>.json
        #[arg(long)]
        legacy_names: bool,
        /// Stop dispatching after the first failure
        #[arg(long)]
        fail_fast: bool,
    },
}

impl IntegrationsAction {
    pub fn operation(&self) -> &'static str {
        match self {
            IntegrationsAction::List => "list",
            IntegrationsAction::Get { .. } => "get",
            IntegrationsAction::Apply { .. } => "apply",
            IntegrationsAction::Upload { .. } => "upload",
            IntegrationsAction::Export { .. } => "export",
            IntegrationsAction::Import { .. } => "import",
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = EnvSettings::load();
    let level = match &settings {
        Ok(settings) => logging::level(settings, cli.global.log_level.as_str()),
        Err(_) => cli.global.log_level.as_str(),
    };
    logging::init(level);

    let settings = settings.unwrap_or_else(|err| {
        error!("{}", err);
        process::exit(1);
    });
    let prefs = Preferences::load().unwrap_or_else(|err| {
        error!("{}", err);
        process::exit(1);
    });

    let Commands::Integrations { action } = cli.command;
    let ctx = RequestContextBuilder::new()
        .operation(action.operation())
        .suppress_warnings(settings.skiplog)
        .build()
        .unwrap_or_else(|err| {
            error!("{}", err);
            process::exit(1);
        });

    if let Err(err) = commands::run(action, &cli.global, &settings, prefs, ctx).await {
        error!("{}", err);
        process::exit(1);
    }
}
