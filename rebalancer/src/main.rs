//! CLI entry point for the driftwise rebalancer.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use driftwise_rebalancer::config::Config;
use driftwise_rebalancer::error::Error;
use driftwise_rebalancer::execution::{self, RunOptions};
use driftwise_rebalancer::request::RebalanceRequest;

#[derive(Parser)]
#[command(name = "rebalancer")]
#[command(about = "Model portfolio rebalancer: drift-banded integer trade planning")]
#[command(version)]
struct Cli {
    /// Path to config.toml (defaults apply when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Optimize, show, confirm, and write a rebalance plan
    Plan {
        /// Path to request.json
        request: PathBuf,

        /// Show plan without writing it
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompt (for automation/cron)
        #[arg(long)]
        force: bool,
    },

    /// Show the selected solver backend and run its health check
    Solver,

    /// Report whether current holdings are outside their drift bands
    Check {
        /// Path to request.json
        request: PathBuf,
    },
}

fn load_request(path: &Path) -> RebalanceRequest {
    match RebalanceRequest::load(path) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error loading request: {e}");
            process::exit(1);
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match Config::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {e}");
                process::exit(1);
            }
        },
        None => Config::default(),
    };

    let result = match cli.command {
        Command::Plan {
            request,
            dry_run,
            force,
        } => {
            let req = load_request(&request);
            let opts = RunOptions {
                dry_run,
                force,
                request_file: request,
            };
            execution::run(&config, &req, &opts).map(|_| ())
        }
        Command::Solver => match execution::solver_status(&config) {
            Ok(true) => Ok(()),
            Ok(false) => {
                eprintln!("Solver health check failed");
                process::exit(1);
            }
            Err(e) => Err(e),
        },
        Command::Check { request } => {
            let req = load_request(&request);
            execution::check(&req).map(|_| ())
        }
    };

    if let Err(e) = result {
        match &e {
            Error::Infeasible(msg) => {
                eprintln!("\nNo plan: {msg}");
                process::exit(2);
            }
            Error::Aborted(msg) => {
                eprintln!("{msg}");
                process::exit(0);
            }
            _ => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    }
}
