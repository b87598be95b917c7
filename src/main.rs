use std::{path::PathBuf, process};

use clap::Parser;
use serverhealth::{
    config::Config,
    core::{scheduler::Scheduler, state::StateTracker},
    logger::LoggerManager,
    print_error,
};
use tracing::{error, info, warn};

/// Reports host CPU, load and memory to a UDP collector, forever.
#[derive(Parser, Debug)]
#[command(name = "serverhealth", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(env = "SERVERHEALTH_CONFIG")]
    config: Option<PathBuf>,
}

fn log_core_count() {
    match std::thread::available_parallelism() {
        Ok(cores) => info!("Detected {} CPU cores", cores),
        Err(e) => warn!("Could not determine CPU core count: {}", e),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let cfg = Config::new(cli.config.as_deref()).unwrap_or_else(|e| {
        print_error!("{}", e);
        process::exit(1);
    });

    let logger_manager = LoggerManager::new(cfg.logger.clone()).unwrap_or_else(|e| {
        print_error!("Failed to setup Log Manager: {}", e);
        process::exit(1);
    });
    logger_manager.init().unwrap_or_else(|e| {
        print_error!("Failed to init Log Manager: {}", e);
        process::exit(1);
    });

    info!("Starting serverhealth version {}...", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", cfg.logger.level);
    info!("Collector endpoint: {}", cfg.collector);
    log_core_count();

    let scheduler = match Scheduler::bootstrap(&cfg, StateTracker::new()).await {
        Ok(scheduler) => scheduler,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    tokio::select! {
        _ = scheduler.run() => {
            error!("Scheduler unexpectedly finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }
}
