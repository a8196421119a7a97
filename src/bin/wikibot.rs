//! wikibot CLI Binary
//!
//! Command-line front end for the site registry, write queue and throttle log.

use clap::Parser;
use std::process;
use tracing::{error, info};
use wikibot::cli::{Cli, RunContext};
use wikibot::config::ConfigLoader;
use wikibot::logging::{init_logging, LoggingConfig};
use wikibot::queue::{InterruptFlag, ShutdownGuard};

fn main() {
    let code = run();
    process::exit(code);
}

/// Exit status after a Ctrl+C, once queued writes have drained
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Runs the command; the shutdown guard drains the queue before the exit code is returned
fn run() -> i32 {
    let cli = Cli::parse();

    let logging_config = build_logging_config(&cli);
    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        return 1;
    }

    info!("wikibot starting");

    let interrupt = InterruptFlag::new();
    if let Err(e) = interrupt.install_ctrlc_handler() {
        error!("Failed to install interrupt handler: {}", e);
        eprintln!("{}", wikibot::cli::map_error(&e));
        return 1;
    }

    let context = match RunContext::new(
        cli.workspace.clone(),
        cli.config.clone(),
        interrupt.clone(),
    ) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Error initializing run context: {}", e);
            eprintln!("{}", wikibot::cli::map_error(&e));
            return 1;
        }
    };
    let guard = ShutdownGuard::new(context.queue());

    let code = match context.execute(&cli.command) {
        Ok(output) => {
            info!("Command completed successfully");
            println!("{}", output);
            0
        }
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("{}", wikibot::cli::map_error(&e));
            1
        }
    };
    drop(guard);

    if interrupt.shutdown_requested() {
        INTERRUPTED_EXIT_CODE
    } else {
        code
    }
}

/// Build logging configuration from CLI args, environment, and config file
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    if !cli.verbose && cli.log_level.is_none() {
        return LoggingConfig {
            level: "off".to_string(),
            ..LoggingConfig::default()
        };
    }

    let mut config = if let Some(ref config_path) = cli.config {
        ConfigLoader::load_from_file(config_path)
            .ok()
            .map(|c| c.logging)
            .unwrap_or_default()
    } else {
        ConfigLoader::load(&cli.workspace)
            .ok()
            .map(|c| c.logging)
            .unwrap_or_default()
    };

    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    config
}
