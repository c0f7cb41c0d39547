//! Display power-state source.
//!
//! The kernel early-suspend hook is not available to user space, so the
//! display state is inferred from a backlight brightness file: `0` means the
//! panel is off. The daemon connects the monitor to the handler thread that
//! feeds the [`PowerStateMachine`] through a `watch` channel.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{PlatformError, PlatformResult};
use crate::power::PowerStateMachine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayState {
    On,
    LowPower,
}

/// Read one brightness value.
pub fn read_display_state(path: &Path) -> PlatformResult<DisplayState> {
    let content = std::fs::read_to_string(path).map_err(|e| PlatformError::io(path, e))?;
    let brightness: u64 = content
        .trim()
        .parse()
        .map_err(|_| PlatformError::Malformed {
            path: path.to_path_buf(),
            content: content.clone(),
        })?;
    Ok(if brightness == 0 {
        DisplayState::LowPower
    } else {
        DisplayState::On
    })
}

pub struct BrightnessMonitor {
    path: PathBuf,
    poll_interval: Duration,
    last: DisplayState,
}

impl BrightnessMonitor {
    /// `initial` is the state the governor currently assumes.
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration, initial: DisplayState) -> Self {
        Self {
            path: path.into(),
            poll_interval,
            last: initial,
        }
    }

    /// Read the file and return the new state if it changed.
    pub fn poll(&mut self) -> PlatformResult<Option<DisplayState>> {
        let state = read_display_state(&self.path)?;
        if state == self.last {
            return Ok(None);
        }
        self.last = state;
        Ok(Some(state))
    }

    /// Poll forever on a dedicated thread, handing every edge to `publish`.
    pub fn spawn<F>(mut self, publish: F) -> std::io::Result<JoinHandle<()>>
    where
        F: Fn(DisplayState) + Send + 'static,
    {
        thread::Builder::new()
            .name("display-monitor".to_string())
            .spawn(move || {
                info!(path = %self.path.display(), "watching display brightness");
                loop {
                    match self.poll() {
                        Ok(Some(state)) => {
                            info!(?state, "display state changed");
                            publish(state);
                        }
                        Ok(None) => {}
                        Err(e) => warn!(error = %e, "cannot read display state"),
                    }
                    thread::sleep(self.poll_interval);
                }
            })
    }
}

/// Apply every display state returned by the blocking `next` to `machine`.
pub fn spawn_power_handler<F>(
    machine: Arc<PowerStateMachine>,
    mut next: F,
) -> std::io::Result<JoinHandle<()>>
where
    F: FnMut() -> DisplayState + Send + 'static,
{
    thread::Builder::new()
        .name("power-handler".to_string())
        .spawn(move || {
            loop {
                let state = next();
                machine.handle(state);
            }
        })
}
