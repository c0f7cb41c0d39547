//! Interfaces to the host platform.
//!
//! The governor never touches hardware directly: it samples load, flips cores
//! and caps frequencies through [`CpuPlatform`], and reads time through
//! [`Clock`]. [`crate::sysfs::SysfsPlatform`] is the Linux implementation.

use std::fmt;
use std::time::Instant;

use crate::error::PlatformResult;

/// Upper or lower bound passed to [`CpuPlatform::set_frequency_limits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyLimit {
    Khz(u32),
    /// Fall back to the hardware bound.
    Unconstrained,
}

impl fmt::Display for FrequencyLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Khz(khz) => write!(f, "{} MHz", khz / 1000),
            Self::Unconstrained => f.write_str("unconstrained"),
        }
    }
}

pub trait CpuPlatform: Send + Sync {
    /// Load of `core` normalized to its maximum frequency, in percent.
    fn sample_load(&self, core: usize) -> PlatformResult<u32>;

    fn is_core_online(&self, core: usize) -> PlatformResult<bool>;

    fn bring_core_online(&self, core: usize) -> PlatformResult<()>;

    fn take_core_offline(&self, core: usize) -> PlatformResult<()>;

    /// Every core index the hardware may ever bring up, ascending.
    fn possible_cores(&self) -> PlatformResult<Vec<usize>>;

    fn set_frequency_limits(
        &self,
        core: usize,
        min: FrequencyLimit,
        max: FrequencyLimit,
    ) -> PlatformResult<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
