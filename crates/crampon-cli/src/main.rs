//! Crampon CLI - module and hook manager for chart-driven clusters

use clap::{Parser, Subcommand};
use miette::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "crampon")]
#[command(author = "Crampon Contributors")]
#[command(version)]
#[command(about = "Module and hook manager for chart-driven clusters", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding global hooks
    #[arg(long, global = true, default_value = "global-hooks")]
    global_hooks_dir: PathBuf,

    /// Directory whose subdirectories are modules
    #[arg(long, global = true, default_value = "modules")]
    modules_dir: PathBuf,

    /// Temp directory for hook files
    #[arg(long, global = true, default_value = "/tmp/crampon")]
    tmp_dir: PathBuf,

    /// Directory for locally persisted config values
    #[arg(long, global = true, default_value = ".crampon")]
    state_dir: PathBuf,

    /// Static global values file(s), merged in order
    #[arg(short = 'f', long = "values", global = true)]
    values: Vec<PathBuf>,

    /// Target namespace for chart releases
    #[arg(short, long, global = true, default_value = "default")]
    namespace: String,

    /// Helm-compatible binary used for chart operations
    #[arg(long, global = true, default_value = "werf")]
    helm_bin: String,

    /// Dedicated release-storage namespace (overrides --namespace for
    /// chart operations and is exported as TILLER_NAMESPACE to hooks)
    #[arg(long, global = true)]
    tiller_namespace: Option<String>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run startup hooks and one full reconciliation cycle
    Converge,

    /// List discovered global hooks and modules
    Hooks,

    /// Print the effective global values
    Values,
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_panic_hook();

    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Converge => commands::converge::run(&cli).await,
        Commands::Hooks => commands::hooks::run(&cli).await,
        Commands::Values => commands::values::run(&cli).await,
    }
}
