mod commands;
mod config;
mod progress;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::Session;
use crate::config::AppConfig;

#[derive(Parser)]
#[command(
    name = "storager",
    version,
    about = "Inspect and move data through a unified storage backend"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: <config dir>/storager/storager.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Give up on a backend request after this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let session = Session {
        config_path: cli.config.unwrap_or_else(AppConfig::default_path),
        timeout: cli.timeout.map(Duration::from_secs),
    };

    use commands::Command;
    match cli.command {
        Command::Init(args) => commands::init::run(args, &session).await,
        Command::Ls(args) => commands::ls::run(args, &session).await,
        Command::Stat(args) => commands::stat::run(args, &session).await,
        Command::Cat(args) => commands::cat::run(args, &session).await,
        Command::Put(args) => commands::put::run(args, &session).await,
        Command::Rm(args) => commands::rm::run(args, &session).await,
        Command::Cp(args) => commands::cp::run_copy(args, &session).await,
        Command::Mv(args) => commands::cp::run_move(args, &session).await,
        Command::Upload(args) => commands::upload::run(args, &session).await,
        Command::Segments(args) => commands::segments::run(args, &session).await,
    }
}
