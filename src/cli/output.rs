//! CLI output: error mapping and plain-text rendering.

use crate::error::WikiError;
use crate::site::Site;
use crate::throttle::ThrottleEntry;
use owo_colors::OwoColorize;

/// Map domain errors to a string for CLI output.
pub fn map_error(e: &WikiError) -> String {
    if e.is_configuration() {
        format!("{} {}", "configuration:".red().bold(), e)
    } else {
        format!("{} {}", "error:".red().bold(), e)
    }
}

pub fn format_site(site: &dyn Site, interface: &str) -> String {
    let key = site.key();
    let mut out = format!("site:      {}\n", key);
    out.push_str(&format!("interface: {}\n", interface));
    out.push_str(&format!("user:      {}\n", key.user().unwrap_or("-")));
    out.push_str(&format!("sysop:     {}", site.sysop().unwrap_or("-")));
    out
}

pub fn format_throttle_entries(entries: &[ThrottleEntry]) -> String {
    if entries.is_empty() {
        return "No processes registered".to_string();
    }
    entries
        .iter()
        .map(|entry| {
            format!(
                "{:>8}  {}  {}",
                entry.pid,
                entry.registered_at.format("%Y-%m-%d %H:%M:%S"),
                entry.site
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
