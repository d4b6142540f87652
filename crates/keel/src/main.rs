use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{error, info};

use keel_core::kernel::bootstrap::Kernel;
use keel_core::kernel::config::KernelConfig;

/// Keel: a micro-kernel for unit deployment
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Simple ping command for a liveness check
    #[arg(long)]
    ping: bool,

    /// Kernel home directory
    #[arg(long, default_value = ".")]
    home: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Boot the kernel and run until interrupted
    Run {},
    /// Parse a unit descriptor file and print its units
    Check {
        /// The descriptor file to check
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CliArgs::parse();

    if args.ping {
        println!("pong");
        return ExitCode::SUCCESS;
    }

    match args.command {
        Some(Commands::Check { file }) => check_file(&file),
        Some(Commands::Run {}) | None => run_kernel(args.home).await,
    }
}

fn check_file(file: &std::path::Path) -> ExitCode {
    let bytes = match std::fs::read(file) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Cannot read {}: {e}", file.display());
            return ExitCode::FAILURE;
        }
    };
    match keel_core::deployment::unit_file::parse_unit_file(file, &bytes) {
        Ok(descriptors) => {
            println!("{}: {} unit(s)", file.display(), descriptors.len());
            for descriptor in &descriptors {
                let deps: Vec<String> = descriptor.dependency_names().into_iter().collect();
                if deps.is_empty() {
                    println!("  {descriptor}");
                } else {
                    println!("  {descriptor} depends on {}", deps.join(", "));
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_kernel(home: PathBuf) -> ExitCode {
    let config = match KernelConfig::discover(home) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut kernel = match Kernel::new(config) {
        Ok(kernel) => kernel,
        Err(e) => {
            error!("Failed to create kernel: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = kernel.boot().await {
        error!("Boot failed: {e}");
        // Best-effort teardown of whatever came up before the failure.
        if let Err(shutdown_error) = kernel.shutdown().await {
            error!("Shutdown after failed boot reported: {shutdown_error}");
        }
        return ExitCode::FAILURE;
    }

    info!("Kernel running; press Ctrl-C to shut down");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to wait for Ctrl-C: {e}");
    }

    match kernel.shutdown().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Shutdown reported: {e}");
            ExitCode::FAILURE
        }
    }
}
