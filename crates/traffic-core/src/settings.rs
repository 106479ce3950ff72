//! Runtime capture switches, toggled by the CLI and read by every process.
//!
//! Running processes pick up changes through [`SettingsWatch`], which
//! re-reads the settings file once its modification stamp changes.

use crate::error::Result;
use crate::filter::{ExclusionRule, ExclusionRules};
use crate::record::Bound;
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::{Duration, Instant, SystemTime};

/// How often a watched settings file is checked for changes.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSettings {
    #[serde(default = "enabled")]
    pub inbound: bool,

    #[serde(default = "enabled")]
    pub outbound: bool,

    /// Publish captured records to the live buffer
    #[serde(default)]
    pub live: bool,

    #[serde(default)]
    pub exclusions: Vec<ExclusionRule>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            inbound: true,
            outbound: true,
            live: false,
            exclusions: Vec::new(),
        }
    }
}

impl CaptureSettings {
    /// Read settings from `path`, falling back to defaults when the file is missing.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn captures(&self, bound: Bound) -> bool {
        match bound {
            Bound::Inbound => self.inbound,
            Bound::Outbound => self.outbound,
            Bound::Unknown => false,
        }
    }

    /// Toggle one direction, or both when `bound` is `None`.
    pub fn set_capture(&mut self, bound: Option<Bound>, on: bool) {
        match bound {
            Some(Bound::Inbound) => self.inbound = on,
            Some(Bound::Outbound) => self.outbound = on,
            Some(Bound::Unknown) => {}
            None => {
                self.inbound = on;
                self.outbound = on;
            }
        }
    }

    pub fn exclusion_rules(&self) -> ExclusionRules {
        ExclusionRules::from_rules(&self.exclusions)
    }
}

/// Settings in effect, with their exclusion rules compiled.
#[derive(Debug)]
pub struct ActiveSettings {
    pub settings: CaptureSettings,
    pub exclusions: ExclusionRules,
}

impl ActiveSettings {
    pub fn new(settings: CaptureSettings) -> Self {
        let exclusions = settings.exclusion_rules();
        Self {
            settings,
            exclusions,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    fn of(path: &Path) -> Option<Self> {
        let meta = fs::metadata(path).ok()?;
        Some(Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        })
    }
}

#[derive(Debug, Default)]
struct LastCheck {
    at: Option<Instant>,
    stamp: Option<FileStamp>,
}

/// Current capture settings of a running process.
///
/// A watch over a file checks the file at most once per refresh interval
/// and reloads it when its modification time or length changed. An
/// unreadable file keeps the previous settings.
pub struct SettingsWatch {
    path: Option<PathBuf>,
    refresh: Duration,
    current: ArcSwap<ActiveSettings>,
    last_check: Mutex<LastCheck>,
}

impl SettingsWatch {
    /// Settings that never change.
    pub fn fixed(settings: CaptureSettings) -> Self {
        Self {
            path: None,
            refresh: DEFAULT_REFRESH_INTERVAL,
            current: ArcSwap::from_pointee(ActiveSettings::new(settings)),
            last_check: Mutex::new(LastCheck::default()),
        }
    }

    /// Settings read from `path` now and again whenever the file changes.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let stamp = FileStamp::of(&path);
        let settings = CaptureSettings::load(&path).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Unreadable capture settings, using defaults");
            CaptureSettings::default()
        });
        Self {
            path: Some(path),
            refresh: DEFAULT_REFRESH_INTERVAL,
            current: ArcSwap::from_pointee(ActiveSettings::new(settings)),
            last_check: Mutex::new(LastCheck {
                at: Some(Instant::now()),
                stamp,
            }),
        }
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh = interval;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The settings in effect, reloading the file first if it is due for a check.
    pub fn current(&self) -> Arc<ActiveSettings> {
        if let Some(path) = &self.path {
            self.refresh_from(path);
        }
        self.current.load_full()
    }

    fn refresh_from(&self, path: &Path) {
        // Another thread already checking is as good as checking.
        let mut last = match self.last_check.try_lock() {
            Ok(last) => last,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
            Err(TryLockError::WouldBlock) => return,
        };
        if last.at.is_some_and(|at| at.elapsed() < self.refresh) {
            return;
        }
        last.at = Some(Instant::now());

        let stamp = FileStamp::of(path);
        if stamp == last.stamp {
            return;
        }
        match CaptureSettings::load(path) {
            Ok(settings) => {
                tracing::debug!(
                    inbound = settings.inbound,
                    outbound = settings.outbound,
                    live = settings.live,
                    "Capture settings reloaded"
                );
                self.current.store(Arc::new(ActiveSettings::new(settings)));
                last.stamp = stamp;
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Unreadable capture settings, keeping previous"
                );
            }
        }
    }
}

impl From<CaptureSettings> for SettingsWatch {
    fn from(settings: CaptureSettings) -> Self {
        Self::fixed(settings)
    }
}
