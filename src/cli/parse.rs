//! CLI parse: clap types for wikibot. No behavior; definitions only.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// wikibot - client core for collaborative-editing deployments
#[derive(Parser, Debug)]
#[command(name = "wikibot")]
#[command(about = "Site registry, write queue and throttle tooling for wiki bots")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Print the resolved configuration
    Config {
        /// Output format
        #[arg(long, value_enum, default_value = "toml")]
        format: ConfigFormat,
    },
    /// Resolve a site from configuration and print its key and interface
    Site {
        /// Language code (defaults to `mylang`)
        #[arg(long)]
        code: Option<String>,
        /// Family name (defaults to `family`)
        #[arg(long)]
        family: Option<String>,
        /// Account name (defaults to the configured username)
        #[arg(long)]
        user: Option<String>,
        /// Administrator account (defaults to the configured sysop name)
        #[arg(long)]
        sysop: Option<String>,
        /// Site implementation, e.g. APISite or DataSite
        #[arg(long)]
        interface: Option<String>,
    },
    /// List the processes registered in the throttle log
    Throttle,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}
