use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dashfeed")]
#[command(about = "Dashboard feed poller", long_about = None)]
pub struct Cli {
    /// Configuration file (default: $DASHFEED_CONFIG or config/dashfeed.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll every feed until interrupted
    Run,
    /// Print recent log entries, newest first
    Logs(LogsArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(clap::Args, Debug)]
pub struct LogsArgs {
    /// Read the error log instead of the normal log
    #[arg(long)]
    pub error: bool,

    /// Maximum number of entries (default: storage.max_log_entries)
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// One JSON object per line
    #[arg(long)]
    pub json: bool,
}
