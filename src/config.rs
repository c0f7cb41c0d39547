//! TOML configuration.
//!
//! Every key is optional. A missing key silently takes its default; a key
//! with an unusable value is reported and replaced with the default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use toml::{Table, Value};
use tracing::{debug, warn};

use crate::constants::*;
use crate::error::ConfigError;
use crate::sysfs::{DEFAULT_CPU_ROOT, DEFAULT_PROC_STAT};

pub const DEFAULT_CONTROL_DIR: &str = "/run/hotplug-governor";
pub const DEFAULT_DISPLAY_POLL_MS: u64 = 500;
pub const DEFAULT_CONTROL_POLL_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct GovernorConfig {
    pub load_threshold: u32,
    // kHz
    pub suspend_frequency: u32,
    pub tick_interval: Duration,
    pub startup_delay: Duration,
    pub resume_delay: Duration,
    pub cpu_root: PathBuf,
    pub proc_stat: PathBuf,
    pub brightness_path: Option<PathBuf>,
    pub display_poll_interval: Duration,
    pub control_dir: PathBuf,
    pub control_poll_interval: Duration,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            load_threshold: DEFAULT_LOAD_THRESHOLD,
            suspend_frequency: DEFAULT_SUSPEND_FREQ_KHZ,
            tick_interval: Duration::from_millis(TICK_INTERVAL_MS),
            startup_delay: Duration::from_secs(STARTUP_DELAY_SECS),
            resume_delay: Duration::from_millis(RESUME_DELAY_MS),
            cpu_root: PathBuf::from(DEFAULT_CPU_ROOT),
            proc_stat: PathBuf::from(DEFAULT_PROC_STAT),
            brightness_path: None,
            display_poll_interval: Duration::from_millis(DEFAULT_DISPLAY_POLL_MS),
            control_dir: PathBuf::from(DEFAULT_CONTROL_DIR),
            control_poll_interval: Duration::from_millis(DEFAULT_CONTROL_POLL_MS),
        }
    }
}

/// `<config dir>/hotplug-governor/config.toml`, if a config dir is known.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("hotplug-governor").join("config.toml"))
}

fn lookup<'a>(config: &'a Table, section: &str, key: &str) -> Option<&'a Value> {
    config
        .get(section)
        .and_then(|t| t.as_table())
        .and_then(|t| t.get(key))
}

/// Integer key in `0..=max`, `positive` additionally rejects 0.
fn integer(config: &Table, section: &str, key: &str, max: u64, positive: bool) -> Option<u64> {
    let value = lookup(config, section, key)?;
    value
        .as_integer()
        .ok_or("must be an integer")
        .and_then(|v| {
            (!v.is_negative())
                .then_some(v)
                .ok_or("must not be negative")
        })
        .and_then(|v| {
            (!positive || v > 0)
                .then_some(v)
                .ok_or("must be positive")
        })
        .and_then(|v| {
            u64::try_from(v)
                .ok()
                .filter(|v| *v <= max)
                .ok_or("is too large")
        })
        .map_err(|s| warn!("{section}.{key} {s}, replaced with the default value"))
        .ok()
}

fn path(config: &Table, section: &str, key: &str) -> Option<PathBuf> {
    let value = lookup(config, section, key)?;
    value
        .as_str()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            warn!("{section}.{key} must be a non-empty string, replaced with the default value");
            None
        })
}

impl GovernorConfig {
    pub fn from_table(config: &Table) -> Self {
        let defaults = Self::default();
        let u32_max = u64::from(u32::MAX);
        let millis = |section: &str, key: &str, default: Duration| {
            integer(config, section, key, u64::MAX, true)
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            load_threshold: integer(config, "tunables", "load-threshold", u32_max, false)
                .map(|v| v as u32)
                .unwrap_or(defaults.load_threshold),
            suspend_frequency: integer(config, "tunables", "suspend-frequency", u32_max, true)
                .map(|v| v as u32)
                .unwrap_or(defaults.suspend_frequency),
            tick_interval: millis("timing", "tick-interval-ms", defaults.tick_interval),
            startup_delay: integer(config, "timing", "startup-delay-secs", u64::MAX, false)
                .map(Duration::from_secs)
                .unwrap_or(defaults.startup_delay),
            resume_delay: integer(config, "timing", "resume-delay-ms", u64::MAX, false)
                .map(Duration::from_millis)
                .unwrap_or(defaults.resume_delay),
            cpu_root: path(config, "platform", "sysfs-root").unwrap_or(defaults.cpu_root),
            proc_stat: path(config, "platform", "proc-stat").unwrap_or(defaults.proc_stat),
            brightness_path: path(config, "display", "brightness-path"),
            display_poll_interval: millis(
                "display",
                "poll-interval-ms",
                defaults.display_poll_interval,
            ),
            control_dir: path(config, "control", "dir").unwrap_or(defaults.control_dir),
            control_poll_interval: millis(
                "control",
                "poll-interval-ms",
                defaults.control_poll_interval,
            ),
        }
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(Self::from_table(&text.parse::<Table>()?))
    }

    /// Load `path`, or the default location if it exists, or the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => path,
                None => {
                    debug!("no configuration file, using defaults");
                    return Ok(Self::default());
                }
            },
        };
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "configuration loaded");
        Self::parse(&text)
    }
}
