//! Write throttle and process-wide throttle log.
//!
//! Every process that talks to a remote deployment registers its pid in a shared
//! throttle log so that cooperating processes can see who holds a write slot. The
//! registration is dropped exactly once, after all queued writes have drained.

use crate::error::ThrottleError;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use parking_lot::Mutex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// One registration line of the throttle log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleEntry {
    pub pid: u32,
    pub registered_at: DateTime<Utc>,
    pub site: String,
}

impl ThrottleEntry {
    fn to_line(&self) -> String {
        format!("{} {} {}", self.pid, self.registered_at.to_rfc3339(), self.site)
    }

    fn parse(line: &str) -> Result<Self, ThrottleError> {
        let mut parts = line.splitn(3, ' ');
        let (Some(pid), Some(timestamp), Some(site)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ThrottleError::Corrupt(line.to_string()));
        };
        let pid = pid
            .parse()
            .map_err(|_| ThrottleError::Corrupt(line.to_string()))?;
        let registered_at = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|_| ThrottleError::Corrupt(line.to_string()))?
            .with_timezone(&Utc);
        Ok(Self {
            pid,
            registered_at,
            site: site.to_string(),
        })
    }
}

/// Storage port for the process-wide throttle log, keyed by process id
pub trait ThrottleLog: Send + Sync {
    fn register(&self, entry: &ThrottleEntry) -> Result<(), ThrottleError>;

    /// Remove every registration held by `pid`
    fn drop_process(&self, pid: u32) -> Result<(), ThrottleError>;

    fn entries(&self) -> Result<Vec<ThrottleEntry>, ThrottleError>;
}

/// Throttle log kept in a plain text file, one `pid timestamp site` line per registration
pub struct FileThrottleLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileThrottleLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Default location under the platform data directory
    pub fn default_path() -> PathBuf {
        ProjectDirs::from("", "", "wikibot")
            .map(|dirs| dirs.data_dir().join("throttle.log"))
            .unwrap_or_else(|| PathBuf::from(".wikibot/throttle.log"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_lines(&self) -> Result<Vec<String>, ThrottleError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl ThrottleLog for FileThrottleLog {
    fn register(&self, entry: &ThrottleEntry) -> Result<(), ThrottleError> {
        let _guard = self.lock.lock();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", entry.to_line())?;
        Ok(())
    }

    fn drop_process(&self, pid: u32) -> Result<(), ThrottleError> {
        let _guard = self.lock.lock();
        let lines = self.read_lines()?;
        let prefix = format!("{} ", pid);
        let kept: Vec<String> = lines
            .into_iter()
            .filter(|line| !line.starts_with(&prefix))
            .collect();
        let mut content = kept.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        if self.path.exists() || !content.is_empty() {
            fs::write(&self.path, content)?;
        }
        Ok(())
    }

    fn entries(&self) -> Result<Vec<ThrottleEntry>, ThrottleError> {
        let _guard = self.lock.lock();
        self.read_lines()?
            .iter()
            .map(|line| ThrottleEntry::parse(line))
            .collect()
    }
}

/// In-memory throttle log for embedding and tests
#[derive(Default)]
pub struct MemoryThrottleLog {
    entries: Mutex<Vec<ThrottleEntry>>,
    drops: Mutex<Vec<u32>>,
}

impl MemoryThrottleLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process ids passed to `drop_process`, in call order
    pub fn drops(&self) -> Vec<u32> {
        self.drops.lock().clone()
    }
}

impl ThrottleLog for MemoryThrottleLog {
    fn register(&self, entry: &ThrottleEntry) -> Result<(), ThrottleError> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }

    fn drop_process(&self, pid: u32) -> Result<(), ThrottleError> {
        self.entries.lock().retain(|entry| entry.pid != pid);
        self.drops.lock().push(pid);
        Ok(())
    }

    fn entries(&self) -> Result<Vec<ThrottleEntry>, ThrottleError> {
        Ok(self.entries.lock().clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Registration {
    Unregistered,
    Registered,
    Released,
}

/// Per-process write throttle shared by every site of a registry
pub struct Throttle {
    pid: u32,
    write_delay: Duration,
    log: Arc<dyn ThrottleLog>,
    registration: Mutex<Registration>,
    last_write: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(pid: u32, write_delay: Duration, log: Arc<dyn ThrottleLog>) -> Self {
        Self {
            pid,
            write_delay,
            log,
            registration: Mutex::new(Registration::Unregistered),
            last_write: Mutex::new(None),
        }
    }

    /// Throttle for the current process
    pub fn for_current_process(write_delay: Duration, log: Arc<dyn ThrottleLog>) -> Self {
        Self::new(std::process::id(), write_delay, log)
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn write_delay(&self) -> Duration {
        self.write_delay
    }

    /// Record this process in the throttle log. Only the first call writes.
    pub fn register(&self, site: &str) -> Result<(), ThrottleError> {
        let mut registration = self.registration.lock();
        if *registration != Registration::Unregistered {
            return Ok(());
        }
        self.log.register(&ThrottleEntry {
            pid: self.pid,
            registered_at: Utc::now(),
            site: site.to_string(),
        })?;
        *registration = Registration::Registered;
        debug!(pid = self.pid, site, "Registered process in throttle log");
        Ok(())
    }

    pub fn is_registered(&self) -> bool {
        *self.registration.lock() == Registration::Registered
    }

    /// Drop this process from the throttle log.
    ///
    /// Returns `true` only for the call that actually removed the registration.
    pub fn release(&self) -> Result<bool, ThrottleError> {
        let mut registration = self.registration.lock();
        if *registration != Registration::Registered {
            return Ok(false);
        }
        self.log.drop_process(self.pid)?;
        *registration = Registration::Released;
        info!(pid = self.pid, "Dropped throttle(s)");
        Ok(true)
    }

    /// Block until at least `write_delay` has passed since the previous write.
    pub fn wait_for_write(&self) {
        self.wait_at_least(self.write_delay);
    }

    /// Block until `gap` has passed since the previous write, then record this one.
    pub fn wait_at_least(&self, gap: Duration) {
        if gap.is_zero() {
            return;
        }
        let mut last = self.last_write.lock();
        if let Some(remaining) = last.and_then(|at| gap.checked_sub(at.elapsed())) {
            std::thread::sleep(remaining);
        }
        *last = Some(Instant::now());
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("pid", &self.pid)
            .field("write_delay", &self.write_delay)
            .field("registration", &*self.registration.lock())
            .finish()
    }
}
