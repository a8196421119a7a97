//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("family", "wikipedia")?
        .set_default("mylang", "en")?
        .set_default("site_interface", "APISite")?
        .set_default("queue.put_throttle", 10.0)?
        .set_default("queue.max_queue_size", 64)?
        .set_default("queue.poll_interval_ms", 1000)
}

/// Environment overrides always apply last: `WIKIBOT__QUEUE__PUT_THROTTLE=2`.
pub fn with_environment(
    builder: ConfigBuilder<config::builder::DefaultState>,
) -> ConfigBuilder<config::builder::DefaultState> {
    builder.add_source(
        Environment::with_prefix("WIKIBOT")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    )
}
