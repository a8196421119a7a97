//! CLI domain: parse, route and output only. Commands dispatch to the library services.

mod output;
mod parse;
mod route;

pub use output::{format_site, format_throttle_entries, map_error};
pub use parse::{Cli, Commands, ConfigFormat};
pub use route::RunContext;
