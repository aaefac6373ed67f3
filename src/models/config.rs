//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Target site location
    #[serde(default)]
    pub site: SiteConfig,

    /// Settle and wait durations used by page automation
    #[serde(default)]
    pub timing: TimingConfig,

    /// Durable key-value store location
    #[serde(default)]
    pub storage: StorageConfig,

    /// Chrome DevTools endpoint
    #[serde(default)]
    pub cdp: CdpConfig,

    /// Periodic trigger
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        let base = Url::parse(&self.site.base_url)?;
        if base.host_str().is_none() {
            return Err(AppError::validation("site.base_url has no host"));
        }
        if !self.site.home_path.starts_with('/') {
            return Err(AppError::validation("site.home_path must start with '/'"));
        }
        if self.timing.poll_ms == 0 {
            return Err(AppError::validation("timing.poll_ms must be > 0"));
        }
        if self.timing.element_timeout_ms < self.timing.poll_ms {
            return Err(AppError::validation(
                "timing.element_timeout_ms must be >= timing.poll_ms",
            ));
        }
        if self.cdp.request_timeout_secs == 0 {
            return Err(AppError::validation("cdp.request_timeout_secs must be > 0"));
        }
        if self.cdp.load_poll_ms == 0 {
            return Err(AppError::validation("cdp.load_poll_ms must be > 0"));
        }
        Ok(())
    }
}

/// Target site settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Origin of the reservation site
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Path of the entry page
    #[serde(default = "defaults::home_path")]
    pub home_path: String,
}

impl SiteConfig {
    /// Absolute URL of the entry page.
    pub fn home_url(&self) -> Result<Url> {
        Ok(Url::parse(&self.base_url)?.join(&self.home_path)?)
    }

    /// Whether `url` belongs to the configured site.
    pub fn is_same_origin(&self, url: &str) -> bool {
        match (Url::parse(&self.base_url), Url::parse(url)) {
            (Ok(base), Ok(url)) => base.origin() == url.origin(),
            _ => false,
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            home_path: defaults::home_path(),
        }
    }
}

/// Page automation delays, all in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Wait after a document load before touching it
    #[serde(default = "defaults::settle")]
    pub settle_ms: u64,

    /// Wait after each checkbox/radio toggle
    #[serde(default = "defaults::toggle")]
    pub toggle_ms: u64,

    /// Wait after each day-of-week toggle
    #[serde(default = "defaults::day_toggle")]
    pub day_toggle_ms: u64,

    /// Wait after switching a search tab
    #[serde(default = "defaults::tab_wait")]
    pub tab_wait_ms: u64,

    /// Wait after revealing the area filter
    #[serde(default = "defaults::reveal_wait")]
    pub reveal_wait_ms: u64,

    /// Wait before activating the search action
    #[serde(default = "defaults::submit_wait")]
    pub submit_wait_ms: u64,

    /// Upper bound for element-appearance waits
    #[serde(default = "defaults::element_timeout")]
    pub element_timeout_ms: u64,

    /// Interval between element-appearance polls
    #[serde(default = "defaults::poll")]
    pub poll_ms: u64,

    /// Dictionary sync: wait after the entry page loads
    #[serde(default = "defaults::sync_settle")]
    pub sync_settle_ms: u64,

    /// Dictionary sync: wait after opening the purpose tab
    #[serde(default = "defaults::sync_purpose_wait")]
    pub sync_purpose_wait_ms: u64,

    /// Dictionary sync: wait after revealing the area list
    #[serde(default = "defaults::sync_area_wait")]
    pub sync_area_wait_ms: u64,

    /// Dictionary sync: give up when the entry page has not loaded by then
    #[serde(default = "defaults::sync_load_timeout")]
    pub sync_load_timeout_ms: u64,

    /// Delay before closing a surface after a scheduled run
    #[serde(default = "defaults::close_delay")]
    pub close_delay_ms: u64,
}

impl TimingConfig {
    /// Zero delays with short element waits, for driving in-memory pages.
    pub fn instant() -> Self {
        Self {
            settle_ms: 0,
            toggle_ms: 0,
            day_toggle_ms: 0,
            tab_wait_ms: 0,
            reveal_wait_ms: 0,
            submit_wait_ms: 0,
            element_timeout_ms: 20,
            poll_ms: 5,
            sync_settle_ms: 0,
            sync_purpose_wait_ms: 0,
            sync_area_wait_ms: 0,
            sync_load_timeout_ms: 1_000,
            close_delay_ms: 0,
        }
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn close_delay(&self) -> Duration {
        Duration::from_millis(self.close_delay_ms)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_ms: defaults::settle(),
            toggle_ms: defaults::toggle(),
            day_toggle_ms: defaults::day_toggle(),
            tab_wait_ms: defaults::tab_wait(),
            reveal_wait_ms: defaults::reveal_wait(),
            submit_wait_ms: defaults::submit_wait(),
            element_timeout_ms: defaults::element_timeout(),
            poll_ms: defaults::poll(),
            sync_settle_ms: defaults::sync_settle(),
            sync_purpose_wait_ms: defaults::sync_purpose_wait(),
            sync_area_wait_ms: defaults::sync_area_wait(),
            sync_load_timeout_ms: defaults::sync_load_timeout(),
            close_delay_ms: defaults::close_delay(),
        }
    }
}

/// Key-value store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one JSON file per key
    #[serde(default = "defaults::storage_dir")]
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: defaults::storage_dir(),
        }
    }
}

/// Chrome DevTools Protocol settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdpConfig {
    /// HTTP endpoint of a browser started with `--remote-debugging-port`
    #[serde(default = "defaults::cdp_endpoint")]
    pub endpoint: String,

    /// Timeout for a single protocol command
    #[serde(default = "defaults::cdp_timeout")]
    pub request_timeout_secs: u64,

    /// Interval for document-load polling
    #[serde(default = "defaults::cdp_load_poll")]
    pub load_poll_ms: u64,
}

impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::cdp_endpoint(),
            request_timeout_secs: defaults::cdp_timeout(),
            load_poll_ms: defaults::cdp_load_poll(),
        }
    }
}

/// Periodic trigger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Minutes between periodic runs; zero disables the trigger
    #[serde(default)]
    pub interval_minutes: u64,

    /// Delay between scheduled profiles within one trigger
    #[serde(default = "defaults::profile_delay")]
    pub profile_delay_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 0,
            profile_delay_secs: defaults::profile_delay(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Site defaults
    pub fn base_url() -> String {
        "https://www.shisetsu.city.yokohama.lg.jp".into()
    }
    pub fn home_path() -> String {
        "/user/Home".into()
    }

    // Timing defaults
    pub fn settle() -> u64 {
        1500
    }
    pub fn toggle() -> u64 {
        300
    }
    pub fn day_toggle() -> u64 {
        200
    }
    pub fn tab_wait() -> u64 {
        2000
    }
    pub fn reveal_wait() -> u64 {
        1500
    }
    pub fn submit_wait() -> u64 {
        1000
    }
    pub fn element_timeout() -> u64 {
        10_000
    }
    pub fn poll() -> u64 {
        250
    }
    pub fn sync_settle() -> u64 {
        2000
    }
    pub fn sync_purpose_wait() -> u64 {
        2000
    }
    pub fn sync_area_wait() -> u64 {
        1500
    }
    pub fn sync_load_timeout() -> u64 {
        30_000
    }
    pub fn close_delay() -> u64 {
        3000
    }

    // Storage defaults
    pub fn storage_dir() -> PathBuf {
        PathBuf::from("storage")
    }

    // CDP defaults
    pub fn cdp_endpoint() -> String {
        "http://127.0.0.1:9222".into()
    }
    pub fn cdp_timeout() -> u64 {
        30
    }
    pub fn cdp_load_poll() -> u64 {
        500
    }

    // Schedule defaults
    pub fn profile_delay() -> u64 {
        60
    }
}
