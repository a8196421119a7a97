//! Site handles: identity, the handle trait and its built-in implementations.

pub mod interfaces;
pub mod registry;

pub use interfaces::{ApiSite, DataSite, SiteFactory, SiteInterfaces, SiteParams};
pub use registry::SiteRegistry;

use crate::throttle::Throttle;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identity of a remote session configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SiteKey {
    family: String,
    code: String,
    user: Option<String>,
}

impl SiteKey {
    pub fn new(
        family: impl Into<String>,
        code: impl Into<String>,
        user: Option<impl Into<String>>,
    ) -> Self {
        Self {
            family: family.into(),
            code: code.into(),
            user: user.map(Into::into),
        }
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }
}

impl fmt::Display for SiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.user {
            Some(user) => write!(f, "{}:{}:{}", self.family, self.code, user),
            None => write!(f, "{}:{}", self.family, self.code),
        }
    }
}

/// An authenticated, reusable connection context for one remote deployment.
///
/// Handles are shared through `Arc`; read-style use from several threads is fine,
/// writes should go through the submission queue.
pub trait Site: Send + Sync + fmt::Debug {
    fn key(&self) -> &SiteKey;

    /// Administrator account used for privileged actions
    fn sysop(&self) -> Option<&str>;

    /// Write throttle shared by every site of the owning registry
    fn throttle(&self) -> &Arc<Throttle>;
}
