//! Site registry: process-lifetime cache of site handles keyed by [`SiteKey`].

use crate::config::WikiConfig;
use crate::error::WikiError;
use crate::site::interfaces::{SiteInterfaces, SiteParams};
use crate::site::{Site, SiteKey};
use crate::throttle::{FileThrottleLog, Throttle};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A cached handle together with the interface it was built for
struct CachedSite {
    interface: String,
    site: Arc<dyn Site>,
}

/// Cache of site handles
///
/// A handle is built at most once per key unless a different interface is requested
/// for that key, in which case the new handle replaces the cached one.
pub struct SiteRegistry {
    config: Arc<WikiConfig>,
    interfaces: RwLock<SiteInterfaces>,
    sites: RwLock<HashMap<SiteKey, CachedSite>>,
    throttle: Arc<Throttle>,
}

impl SiteRegistry {
    /// Create a registry with the built-in interfaces and an explicit throttle
    pub fn new(config: Arc<WikiConfig>, throttle: Arc<Throttle>) -> Self {
        Self::with_interfaces(config, throttle, SiteInterfaces::builtin())
    }

    /// Create a registry with a specific interface table
    pub fn with_interfaces(
        config: Arc<WikiConfig>,
        throttle: Arc<Throttle>,
        interfaces: SiteInterfaces,
    ) -> Self {
        Self {
            config,
            interfaces: RwLock::new(interfaces),
            sites: RwLock::new(HashMap::new()),
            throttle,
        }
    }

    /// Create a registry whose throttle writes to the configured throttle log file
    pub fn from_config(config: Arc<WikiConfig>) -> Self {
        let log_path = config
            .throttle_log
            .clone()
            .unwrap_or_else(FileThrottleLog::default_path);
        let write_delay = config.queue.put_delay();
        let throttle = Throttle::for_current_process(
            write_delay,
            Arc::new(FileThrottleLog::new(log_path)),
        );
        Self::new(config, Arc::new(throttle))
    }

    pub fn config(&self) -> &WikiConfig {
        &self.config
    }

    /// Write throttle shared by every site of this registry
    pub fn throttle(&self) -> &Arc<Throttle> {
        &self.throttle
    }

    /// Add or replace a site implementation
    pub fn register_interface<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(SiteParams<'_>) -> Result<Arc<dyn Site>, WikiError> + Send + Sync + 'static,
    {
        self.interfaces.write().register(name, factory);
    }

    /// Return the specified site, resolving omitted parameters from configuration.
    pub fn site(
        &self,
        code: Option<&str>,
        family: Option<&str>,
        user: Option<&str>,
        sysop: Option<&str>,
        interface: Option<&str>,
    ) -> Result<Arc<dyn Site>, WikiError> {
        let resolved = self
            .config
            .resolve_site(code, family, user, sysop, interface);
        self.get_with_sysop(&resolved.key, resolved.sysop.as_deref(), &resolved.interface)
    }

    /// Return the cached handle for `key` built by `interface`, building it if needed
    pub fn get(&self, key: &SiteKey, interface: &str) -> Result<Arc<dyn Site>, WikiError> {
        self.get_with_sysop(key, None, interface)
    }

    /// Like [`SiteRegistry::get`], passing the sysop account to a newly built handle
    pub fn get_with_sysop(
        &self,
        key: &SiteKey,
        sysop: Option<&str>,
        interface: &str,
    ) -> Result<Arc<dyn Site>, WikiError> {
        // Unknown interfaces fail before anything is built.
        let factory = self.interfaces.read().factory(interface)?;

        if let Some(site) = self.lookup(key, interface) {
            return Ok(site);
        }

        let mut sites = self.sites.write();
        // Another thread may have built it while we waited for the write lock.
        if let Some(cached) = sites.get(key) {
            if cached.interface == interface {
                return Ok(Arc::clone(&cached.site));
            }
        }

        let site = factory(SiteParams {
            key,
            sysop,
            throttle: &self.throttle,
        })?;
        debug!(site = %key, interface, "Instantiating site object");
        if let Some(previous) = sites.insert(
            key.clone(),
            CachedSite {
                interface: interface.to_string(),
                site: Arc::clone(&site),
            },
        ) {
            debug!(
                site = %key,
                previous_interface = %previous.interface,
                interface,
                "Replaced cached site with a different interface"
            );
        }
        Ok(site)
    }

    fn lookup(&self, key: &SiteKey, interface: &str) -> Option<Arc<dyn Site>> {
        let sites = self.sites.read();
        sites
            .get(key)
            .filter(|cached| cached.interface == interface)
            .map(|cached| Arc::clone(&cached.site))
    }

    /// Interface the cached handle for `key` was built with
    pub fn cached_interface(&self, key: &SiteKey) -> Option<String> {
        self.sites
            .read()
            .get(key)
            .map(|cached| cached.interface.clone())
    }

    pub fn len(&self) -> usize {
        self.sites.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.read().is_empty()
    }

    /// Any one cached site, if a site has been built at all
    pub fn any_site(&self) -> Option<Arc<dyn Site>> {
        self.sites
            .read()
            .values()
            .next()
            .map(|cached| Arc::clone(&cached.site))
    }

    /// Drop this process from the throttle log.
    ///
    /// All sites share one pid, so one release covers every site. Nothing happens when
    /// no site was ever built. Returns whether this call performed the release.
    pub fn release_throttle(&self) -> Result<bool, WikiError> {
        match self.any_site() {
            Some(site) => Ok(site.throttle().release()?),
            None => Ok(false),
        }
    }
}

impl std::fmt::Debug for SiteRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteRegistry")
            .field("interfaces", &*self.interfaces.read())
            .field("sites", &self.len())
            .field("throttle", &self.throttle)
            .finish()
    }
}
