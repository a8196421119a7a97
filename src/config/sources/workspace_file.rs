//! Settings kept next to a bot's working directory.
//!
//! `config/config.toml` holds what every run from the workspace shares, and one
//! overlay per deployment (`config/production.toml`, ...) is picked by `WIKIBOT_ENV`.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Selects the deployment overlay
pub const DEPLOYMENT_VAR: &str = "WIKIBOT_ENV";

/// Overlay used when `WIKIBOT_ENV` is unset or empty
pub const DEFAULT_DEPLOYMENT: &str = "development";

const SHARED_FILE: &str = "config.toml";

pub fn deployment_name() -> String {
    std::env::var(DEPLOYMENT_VAR)
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DEPLOYMENT.to_string())
}

/// Workspace files present on disk, lowest precedence first
pub fn workspace_config_paths(workspace_root: &Path, deployment: &str) -> Vec<PathBuf> {
    let dir = workspace_root.join("config");
    let mut paths = vec![dir.join(SHARED_FILE)];
    let overlay = format!("{}.toml", deployment);
    if overlay != SHARED_FILE {
        paths.push(dir.join(overlay));
    }
    paths.retain(|path| path.is_file());
    paths
}

pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let deployment = deployment_name();
    let paths = workspace_config_paths(workspace_root, &deployment);
    if paths.is_empty() {
        debug!(
            workspace = %workspace_root.display(),
            deployment = %deployment,
            "No workspace configuration files"
        );
    }
    Ok(paths.into_iter().fold(builder, |builder, path| {
        debug!(config_path = %path.display(), "Layering workspace configuration");
        builder.add_source(File::from(path))
    }))
}
