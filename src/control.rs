//! File-based control surface for the tunables.
//!
//! The control directory holds one file per tunable, each containing a single
//! decimal value, in the manner of sysfs attributes. The daemon publishes the
//! current values at start and picks up edits on every poll.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use crate::error::GovernorError;
use crate::tunables::{TunableSnapshot, Tunables};

pub const LOAD_THRESHOLD_FILE: &str = "load_threshold";
pub const SUSPEND_FREQUENCY_FILE: &str = "suspend_frequency";

fn control_error(path: &Path, source: std::io::Error) -> GovernorError {
    GovernorError::Control {
        path: path.to_path_buf(),
        source,
    }
}

/// Write `value` to `dir/name` through a temporary file and a rename.
pub fn write_value(dir: &Path, name: &str, value: u32) -> Result<(), GovernorError> {
    let path = dir.join(name);
    let temp_path = dir.join(format!(".{name}.tmp"));

    let mut file = File::create(&temp_path).map_err(|e| control_error(&temp_path, e))?;
    file.write_all(format!("{value}\n").as_bytes())
        .and_then(|()| file.flush())
        .map_err(|e| control_error(&temp_path, e))?;
    fs::rename(&temp_path, &path).map_err(|e| control_error(&path, e))
}

/// Read `dir/name`; `Ok(None)` if the content is not a valid `u32`.
pub fn read_value(dir: &Path, name: &str) -> Result<Option<u32>, GovernorError> {
    let path = dir.join(name);
    let content = fs::read_to_string(&path).map_err(|e| control_error(&path, e))?;
    Ok(content.trim().parse().ok())
}

pub fn read_snapshot(dir: &Path) -> Result<Option<TunableSnapshot>, GovernorError> {
    let load_threshold = read_value(dir, LOAD_THRESHOLD_FILE)?;
    let suspend_frequency = read_value(dir, SUSPEND_FREQUENCY_FILE)?;
    Ok(load_threshold
        .zip(suspend_frequency)
        .map(|(load_threshold, suspend_frequency)| TunableSnapshot {
            load_threshold,
            suspend_frequency,
        }))
}

pub struct ControlFiles {
    dir: PathBuf,
    tunables: Arc<Tunables>,
}

impl ControlFiles {
    /// Create the directory and publish the current values.
    pub fn create(dir: impl Into<PathBuf>, tunables: Arc<Tunables>) -> Result<Self, GovernorError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| control_error(&dir, e))?;
        let files = Self { dir, tunables };
        files.publish()?;
        Ok(files)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn publish(&self) -> Result<(), GovernorError> {
        write_value(&self.dir, LOAD_THRESHOLD_FILE, self.tunables.load_threshold())?;
        write_value(
            &self.dir,
            SUSPEND_FREQUENCY_FILE,
            self.tunables.suspend_frequency(),
        )
    }

    /// Apply edited files to the tunables. Returns how many values changed.
    pub fn sync(&self) -> Result<usize, GovernorError> {
        let mut changed = 0;

        if let Some(value) = self.read_or_restore(LOAD_THRESHOLD_FILE, self.tunables.load_threshold())? {
            info!(old = self.tunables.load_threshold(), new = value, "load threshold updated");
            self.tunables.set_load_threshold(value);
            changed += 1;
        }
        if let Some(value) =
            self.read_or_restore(SUSPEND_FREQUENCY_FILE, self.tunables.suspend_frequency())?
        {
            info!(old = self.tunables.suspend_frequency(), new = value, "suspend frequency updated");
            self.tunables.set_suspend_frequency(value);
            changed += 1;
        }
        Ok(changed)
    }

    /// New value of `name` if it differs from `current`. Unparseable or
    /// deleted files are rewritten with `current`.
    fn read_or_restore(&self, name: &str, current: u32) -> Result<Option<u32>, GovernorError> {
        let value = match read_value(&self.dir, name) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "control file unreadable");
                None
            }
        };
        match value {
            Some(value) if value != current => Ok(Some(value)),
            Some(_) => Ok(None),
            None => {
                warn!(file = name, "invalid control value, restoring {current}");
                write_value(&self.dir, name, current)?;
                Ok(None)
            }
        }
    }

    /// Poll forever on a dedicated thread.
    pub fn spawn(self, poll_interval: Duration) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("control-files".to_string())
            .spawn(move || {
                info!(dir = %self.dir.display(), "control files ready");
                loop {
                    thread::sleep(poll_interval);
                    if let Err(e) = self.sync() {
                        warn!(error = %e, "control sync failed");
                    }
                }
            })
    }
}
