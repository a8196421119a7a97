//! Config loading facade: assembles sources in precedence order and deserializes.

use super::merge::merge_policy;
use super::sources::{global_file, workspace_file};
use super::WikiConfig;
use crate::error::WikiError;
use config::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loads [`WikiConfig`] from layered sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Precedence (lowest to highest): defaults, global file, workspace files,
    /// `WIKIBOT__*` environment variables.
    pub fn load(workspace_root: &Path) -> Result<WikiConfig, WikiError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = merge_policy::with_environment(builder);

        let config: WikiConfig = builder.build()?.try_deserialize()?;
        config.ensure_valid()?;
        debug!(
            workspace_root = %workspace_root.display(),
            family = %config.family,
            mylang = %config.mylang,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Load configuration from one explicit file, on top of the defaults only.
    pub fn load_from_file(path: &Path) -> Result<WikiConfig, WikiError> {
        let builder = merge_policy::builder_with_defaults()?
            .add_source(File::from(path.to_path_buf()).required(true));

        let config: WikiConfig = builder.build()?.try_deserialize()?;
        config.ensure_valid()?;
        Ok(config)
    }

    /// Path of the user-level config file, if a home directory is known
    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }
}
