mod cli;

use clap::Parser;
use cli::{Cli, Commands, LogsArgs};
use dashfeed::app::{self, Exit};
use dashfeed::config::Config;
use dashfeed::storage::{ERROR_LOG, LogLine, NORMAL_LOG};
use tracing_subscriber::EnvFilter;

/// Exit code asking the supervisor to restart us after a firmware update
const RESTART_EXIT_CODE: i32 = 75;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Run => {
            if app::run(config).await? == Exit::Restart {
                std::process::exit(RESTART_EXIT_CODE);
            }
        }
        Commands::Logs(args) => print_logs(&config, &args).await?,
        Commands::Config => print!("{}", config.to_toml()?),
    }

    Ok(())
}

async fn print_logs(config: &Config, args: &LogsArgs) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let log_name = if args.error { ERROR_LOG } else { NORMAL_LOG };
    let limit = args.limit.unwrap_or(config.storage.max_log_entries);

    for line in app::read_logs(config, log_name, limit).await? {
        if args.json {
            println!("{}", serde_json::to_string(&line)?);
        } else {
            println!("{}  {}", when(&line), line.message);
        }
    }
    Ok(())
}

/// Wall-clock date, or uptime for entries logged before the clock was set
fn when(line: &LogLine) -> String {
    if !line.clock_synced {
        return format!("+{}s", line.timestamp);
    }
    chrono::DateTime::from_timestamp(line.timestamp, 0)
        .map(|at| {
            at.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| line.timestamp.to_string())
}
