// Public modules
pub mod config;
pub mod control;
pub mod display;
pub mod error;
pub mod hotplug;
pub mod hysteresis;
pub mod platform;
pub mod power;
pub mod scheduler;
pub mod sysfs;
pub mod tunables;

#[cfg(test)]
pub(crate) mod testing;

// Re-export constants commonly used
pub mod constants {
    pub const DEFAULT_LOAD_THRESHOLD: u32 = 55;
    // kHz
    pub const DEFAULT_SUSPEND_FREQ_KHZ: u32 = 540_000;

    pub const HIGH_LOAD_COUNTER: u8 = 20;
    pub const ONLINE_COUNTER_THRESHOLD: u8 = 10;
    pub const MIN_TIME_CPU_ONLINE_MS: u64 = 1200;

    pub const TICK_INTERVAL_MS: u64 = 1000;
    pub const STARTUP_DELAY_SECS: u64 = 25;
    pub const RESUME_DELAY_MS: u64 = 1000;

    pub const PRIMARY_CORE: usize = 0;
    pub const MANAGED_CORE: usize = 1;
}
