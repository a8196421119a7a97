//! wikibot: client core for collaborative-editing deployments
//!
//! A cache of remote site handles, a bounded single-worker queue that serializes
//! write actions and drains them on shutdown, and lazy cursor-driven pagination
//! for large listings such as the topics of a discussion board.

pub mod cli;
pub mod config;
pub mod error;
pub mod flow;
pub mod logging;
pub mod pagination;
pub mod queue;
pub mod site;
pub mod throttle;
