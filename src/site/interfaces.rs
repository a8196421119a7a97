//! Known site implementations, looked up by interface name.

use crate::error::WikiError;
use crate::site::{Site, SiteKey};
use crate::throttle::Throttle;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Interface name of [`ApiSite`]
pub const API_SITE: &str = "APISite";
/// Interface name of [`DataSite`]
pub const DATA_SITE: &str = "DataSite";

/// Everything a site constructor receives
#[derive(Debug, Clone, Copy)]
pub struct SiteParams<'a> {
    pub key: &'a SiteKey,
    pub sysop: Option<&'a str>,
    pub throttle: &'a Arc<Throttle>,
}

/// Constructor for one site implementation
pub type SiteFactory =
    Arc<dyn Fn(SiteParams<'_>) -> Result<Arc<dyn Site>, WikiError> + Send + Sync>;

/// Table of known site implementations
#[derive(Clone)]
pub struct SiteInterfaces {
    factories: BTreeMap<String, SiteFactory>,
}

impl SiteInterfaces {
    /// An empty table
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Table holding the built-in `APISite` and `DataSite` implementations
    pub fn builtin() -> Self {
        let mut interfaces = Self::empty();
        interfaces.register(API_SITE, |params| {
            Ok(Arc::new(ApiSite::connect(params)?) as Arc<dyn Site>)
        });
        interfaces.register(DATA_SITE, |params| {
            Ok(Arc::new(DataSite::connect(params)?) as Arc<dyn Site>)
        });
        interfaces
    }

    /// Register (or replace) an implementation under `name`
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(SiteParams<'_>) -> Result<Arc<dyn Site>, WikiError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Constructor for `name`, or the invalid-interface configuration error
    pub fn factory(&self, name: &str) -> Result<SiteFactory, WikiError> {
        self.factories
            .get(name)
            .cloned()
            .ok_or_else(|| WikiError::InvalidInterface(name.to_string()))
    }
}

impl Default for SiteInterfaces {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for SiteInterfaces {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

/// Site backed by the deployment's action API
#[derive(Debug)]
pub struct ApiSite {
    key: SiteKey,
    sysop: Option<String>,
    throttle: Arc<Throttle>,
}

impl ApiSite {
    /// Build the handle and register this process with the write throttle
    pub fn connect(params: SiteParams<'_>) -> Result<Self, WikiError> {
        params.throttle.register(&params.key.to_string())?;
        Ok(Self {
            key: params.key.clone(),
            sysop: params.sysop.map(str::to_string),
            throttle: Arc::clone(params.throttle),
        })
    }
}

impl Site for ApiSite {
    fn key(&self) -> &SiteKey {
        &self.key
    }

    fn sysop(&self) -> Option<&str> {
        self.sysop.as_deref()
    }

    fn throttle(&self) -> &Arc<Throttle> {
        &self.throttle
    }
}

/// Site of a structured-data repository; same session model as [`ApiSite`]
#[derive(Debug)]
pub struct DataSite {
    api: ApiSite,
}

impl DataSite {
    pub fn connect(params: SiteParams<'_>) -> Result<Self, WikiError> {
        Ok(Self {
            api: ApiSite::connect(params)?,
        })
    }

    /// The plain API view of this repository
    pub fn api(&self) -> &ApiSite {
        &self.api
    }
}

impl Site for DataSite {
    fn key(&self) -> &SiteKey {
        self.api.key()
    }

    fn sysop(&self) -> Option<&str> {
        self.api.sysop()
    }

    fn throttle(&self) -> &Arc<Throttle> {
        self.api.throttle()
    }
}
