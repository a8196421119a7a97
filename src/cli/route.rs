//! CLI route: run context and command dispatch.

use crate::cli::output::{format_site, format_throttle_entries};
use crate::cli::parse::{Commands, ConfigFormat};
use crate::config::{ConfigLoader, WikiConfig};
use crate::error::WikiError;
use crate::queue::{InterruptFlag, SubmissionQueue};
use crate::site::SiteRegistry;
use crate::throttle::{FileThrottleLog, ThrottleLog};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Runtime context for CLI execution: configuration, site registry and write queue.
pub struct RunContext {
    config: Arc<WikiConfig>,
    registry: Arc<SiteRegistry>,
    queue: Arc<SubmissionQueue>,
    workspace_root: PathBuf,
}

impl RunContext {
    /// Load configuration and build the registry and queue. Uses ConfigLoader only.
    pub fn new(
        workspace_root: PathBuf,
        config_path: Option<PathBuf>,
        interrupt: InterruptFlag,
    ) -> Result<Self, WikiError> {
        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };
        let config = Arc::new(config);
        let registry = Arc::new(SiteRegistry::from_config(Arc::clone(&config)));
        let queue = Arc::new(
            SubmissionQueue::new(config.queue.clone(), Arc::clone(&registry))
                .with_interrupt(interrupt),
        );
        debug!(workspace_root = %workspace_root.display(), "Run context ready");

        Ok(Self {
            config,
            registry,
            queue,
            workspace_root,
        })
    }

    pub fn config(&self) -> &WikiConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SiteRegistry> {
        &self.registry
    }

    /// Write queue; shut it down (e.g. through a `ShutdownGuard`) before exiting
    pub fn queue(&self) -> Arc<SubmissionQueue> {
        Arc::clone(&self.queue)
    }

    pub fn workspace_root(&self) -> &PathBuf {
        &self.workspace_root
    }

    /// Execute a command and return its printable output
    pub fn execute(&self, command: &Commands) -> Result<String, WikiError> {
        match command {
            Commands::Config { format } => self.handle_config(*format),
            Commands::Site {
                code,
                family,
                user,
                sysop,
                interface,
            } => {
                let resolved = self.config.resolve_site(
                    code.as_deref(),
                    family.as_deref(),
                    user.as_deref(),
                    sysop.as_deref(),
                    interface.as_deref(),
                );
                let site = self.registry.get_with_sysop(
                    &resolved.key,
                    resolved.sysop.as_deref(),
                    &resolved.interface,
                )?;
                Ok(format_site(site.as_ref(), &resolved.interface))
            }
            Commands::Throttle => {
                let path = self
                    .config
                    .throttle_log
                    .clone()
                    .unwrap_or_else(FileThrottleLog::default_path);
                let entries = FileThrottleLog::new(path).entries()?;
                Ok(format_throttle_entries(&entries))
            }
        }
    }

    fn handle_config(&self, format: ConfigFormat) -> Result<String, WikiError> {
        match format {
            ConfigFormat::Toml => toml::to_string_pretty(self.config.as_ref())
                .map_err(|e| WikiError::ConfigError(format!("Failed to render config: {}", e))),
            ConfigFormat::Json => serde_json::to_string_pretty(self.config.as_ref())
                .map_err(|e| WikiError::ConfigError(format!("Failed to render config: {}", e))),
        }
    }
}
