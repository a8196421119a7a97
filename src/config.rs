//! Configuration System
//!
//! Layered runtime configuration: built-in defaults, the user-level config file, the
//! workspace config files and `WIKIBOT__*` environment variables, in increasing order of
//! precedence. Also owns the rules for filling in site parameters a caller leaves out.

use crate::error::WikiError;
use crate::logging::LoggingConfig;
use crate::queue::QueueConfig;
use crate::site::SiteKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Key under `usernames` that applies to every code of a family
pub const ANY_CODE: &str = "*";

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WikiConfig {
    /// Default family when a site request leaves it out
    #[serde(default = "default_family")]
    pub family: String,

    /// Default language code when a site request leaves it out
    #[serde(default = "default_mylang")]
    pub mylang: String,

    /// Bot account per family and code (`*` matches any code)
    #[serde(default)]
    pub usernames: HashMap<String, HashMap<String, String>>,

    /// Administrator account per family and code
    #[serde(default)]
    pub sysopnames: HashMap<String, HashMap<String, String>>,

    /// Site implementation used when a request does not name one
    #[serde(default = "default_site_interface")]
    pub site_interface: String,

    /// Throttle log location; defaults to the platform data directory
    #[serde(default)]
    pub throttle_log: Option<PathBuf>,

    /// Submission queue settings
    #[serde(default)]
    pub queue: QueueConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_family() -> String {
    "wikipedia".to_string()
}

fn default_mylang() -> String {
    "en".to_string()
}

fn default_site_interface() -> String {
    "APISite".to_string()
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            family: default_family(),
            mylang: default_mylang(),
            usernames: HashMap::new(),
            sysopnames: HashMap::new(),
            site_interface: default_site_interface(),
            throttle_log: None,
            queue: QueueConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Site parameters with every default applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSite {
    pub key: SiteKey,
    pub sysop: Option<String>,
    pub interface: String,
}

impl WikiConfig {
    /// Fill in the parameters of a site request from configuration.
    ///
    /// `code` falls back to `mylang`, `family` to `family`, `user` to the
    /// `usernames[family][code]` entry and then to `usernames[family]["*"]`, `sysop`
    /// to `sysopnames[family][code]`, and `interface` to `site_interface`.
    pub fn resolve_site(
        &self,
        code: Option<&str>,
        family: Option<&str>,
        user: Option<&str>,
        sysop: Option<&str>,
        interface: Option<&str>,
    ) -> ResolvedSite {
        let code = code.unwrap_or(&self.mylang).to_string();
        let family = family.unwrap_or(&self.family).to_string();

        let user = user.map(str::to_string).or_else(|| {
            self.usernames.get(&family).and_then(|codes| {
                codes
                    .get(&code)
                    .or_else(|| codes.get(ANY_CODE))
                    .cloned()
            })
        });
        let sysop = sysop.map(str::to_string).or_else(|| {
            self.sysopnames
                .get(&family)
                .and_then(|codes| codes.get(&code))
                .cloned()
        });
        let interface = interface.unwrap_or(&self.site_interface).to_string();

        ResolvedSite {
            key: SiteKey::new(family, code, user),
            sysop,
            interface,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.family.trim().is_empty() {
            errors.push("family cannot be empty".to_string());
        }
        if self.mylang.trim().is_empty() {
            errors.push("mylang cannot be empty".to_string());
        }
        if self.site_interface.trim().is_empty() {
            errors.push("site_interface cannot be empty".to_string());
        }
        if !self.queue.put_throttle.is_finite() || self.queue.put_throttle < 0.0 {
            errors.push(format!(
                "queue.put_throttle must be a non-negative number of seconds, got {}",
                self.queue.put_throttle
            ));
        }
        if self.queue.poll_interval_ms == 0 {
            errors.push("queue.poll_interval_ms must be greater than zero".to_string());
        }
        for (family, codes) in &self.usernames {
            for (code, user) in codes {
                if user.trim().is_empty() {
                    errors.push(format!("usernames.{}.{} is empty", family, code));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and convert the collected problems into a single configuration error
    pub fn ensure_valid(&self) -> Result<(), WikiError> {
        self.validate().map_err(|errors| {
            WikiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            ))
        })
    }
}
