use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_LOAD_THRESHOLD, DEFAULT_SUSPEND_FREQ_KHZ};

/// Runtime-adjustable governor settings.
///
/// Shared between the sampling tick, the suspend handler and the
/// configuration surface. Writes take effect on the next tick (threshold)
/// or the next suspend (frequency ceiling); nothing is re-evaluated eagerly.
#[derive(Debug)]
pub struct Tunables {
    load_threshold: AtomicU32,
    suspend_frequency: AtomicU32,
}

/// Plain copy of the tunables, as read or written by the control utility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TunableSnapshot {
    pub load_threshold: u32,
    // kHz
    pub suspend_frequency: u32,
}

impl Tunables {
    pub fn new(load_threshold: u32, suspend_frequency: u32) -> Self {
        Self {
            load_threshold: AtomicU32::new(load_threshold),
            suspend_frequency: AtomicU32::new(suspend_frequency),
        }
    }

    pub fn set_load_threshold(&self, value: u32) {
        self.load_threshold.store(value, Ordering::Relaxed);
    }

    pub fn load_threshold(&self) -> u32 {
        self.load_threshold.load(Ordering::Relaxed)
    }

    pub fn set_suspend_frequency(&self, khz: u32) {
        self.suspend_frequency.store(khz, Ordering::Relaxed);
    }

    pub fn suspend_frequency(&self) -> u32 {
        self.suspend_frequency.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TunableSnapshot {
        TunableSnapshot {
            load_threshold: self.load_threshold(),
            suspend_frequency: self.suspend_frequency(),
        }
    }
}

impl Default for Tunables {
    fn default() -> Self {
        Self::new(DEFAULT_LOAD_THRESHOLD, DEFAULT_SUSPEND_FREQ_KHZ)
    }
}
