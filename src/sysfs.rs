//! Linux `CpuPlatform` backed by sysfs and `/proc/stat`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::constants::PRIMARY_CORE;
use crate::error::{PlatformError, PlatformResult};
use crate::platform::{CpuPlatform, FrequencyLimit};

pub const DEFAULT_CPU_ROOT: &str = "/sys/devices/system/cpu";
pub const DEFAULT_PROC_STAT: &str = "/proc/stat";

/// Cumulative jiffies of one core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuTimes {
    idle: u64,
    total: u64,
}

#[derive(Debug, Default)]
struct LoadTracker {
    prev: HashMap<usize, CpuTimes>,
    last_load: HashMap<usize, u32>,
}

pub struct SysfsPlatform {
    cpu_root: PathBuf,
    proc_stat: PathBuf,
    loads: Mutex<LoadTracker>,
}

fn read_trimmed(path: &Path) -> PlatformResult<String> {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|e| PlatformError::io(path, e))
}

fn read_u32(path: &Path) -> PlatformResult<u32> {
    let content = read_trimmed(path)?;
    content.parse().map_err(|_| PlatformError::Malformed {
        path: path.to_path_buf(),
        content,
    })
}

fn write_value(path: &Path, value: &str) -> PlatformResult<()> {
    std::fs::write(path, value).map_err(|e| PlatformError::io(path, e))
}

/// Parse a kernel cpu list such as `0-3` or `0,2-5,7`.
pub fn parse_cpu_list(list: &str) -> Option<Vec<usize>> {
    let mut cores = Vec::new();
    for part in list.trim().split(',').filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start: usize = start.parse().ok()?;
                let end: usize = end.parse().ok()?;
                if end < start {
                    return None;
                }
                cores.extend(start..=end);
            }
            None => cores.push(part.parse().ok()?),
        }
    }
    cores.sort_unstable();
    cores.dedup();
    Some(cores)
}

/// Find the `cpuN` line of `/proc/stat` content.
///
/// Format: cpuN user nice system idle iowait irq softirq steal guest guest_nice
fn parse_cpu_times(stat: &str, core: usize) -> Option<CpuTimes> {
    let label = format!("cpu{core}");
    let line = stat
        .lines()
        .find(|line| line.split_whitespace().next() == Some(label.as_str()))?;
    let nums: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|s| s.parse().ok())
        .collect();
    if nums.len() < 5 {
        return None;
    }
    // idle + iowait
    let idle = nums[3] + nums[4];
    // guest time is already counted in user/nice
    let total = nums.iter().take(8).sum();
    Some(CpuTimes { idle, total })
}

fn busy_percent(prev: CpuTimes, curr: CpuTimes) -> u32 {
    let total = curr.total.saturating_sub(prev.total);
    if total == 0 {
        return 0;
    }
    let idle = curr.idle.saturating_sub(prev.idle).min(total);
    ((total - idle) * 100 / total) as u32
}

impl SysfsPlatform {
    pub fn new(cpu_root: impl Into<PathBuf>, proc_stat: impl Into<PathBuf>) -> Self {
        Self {
            cpu_root: cpu_root.into(),
            proc_stat: proc_stat.into(),
            loads: Mutex::new(LoadTracker::default()),
        }
    }

    fn core_path(&self, core: usize, file: &str) -> PathBuf {
        self.cpu_root.join(format!("cpu{core}")).join(file)
    }

    fn ensure_core(&self, core: usize) -> PlatformResult<()> {
        if self.cpu_root.join(format!("cpu{core}")).is_dir() {
            Ok(())
        } else {
            Err(PlatformError::NoSuchCore(core))
        }
    }

    /// Busy percentage since the previous call, scaled by cur/max frequency.
    fn measure_load(&self, core: usize) -> PlatformResult<u32> {
        let stat = std::fs::read_to_string(&self.proc_stat)
            .map_err(|e| PlatformError::io(&self.proc_stat, e))?;
        let curr = parse_cpu_times(&stat, core).ok_or_else(|| PlatformError::Malformed {
            path: self.proc_stat.clone(),
            content: format!("no usable cpu{core} line"),
        })?;

        let mut tracker = self.loads.lock().unwrap_or_else(PoisonError::into_inner);
        let busy = tracker
            .prev
            .insert(core, curr)
            .map(|prev| busy_percent(prev, curr))
            .unwrap_or(0);

        let cur_freq = read_u32(&self.core_path(core, "cpufreq/scaling_cur_freq"));
        let max_freq = read_u32(&self.core_path(core, "cpufreq/cpuinfo_max_freq"));
        let load = match (cur_freq, max_freq) {
            (Ok(cur), Ok(max)) if max > 0 => {
                (u64::from(busy) * u64::from(cur) / u64::from(max)) as u32
            }
            // no cpufreq driver: report the raw busy time
            _ => busy,
        };
        tracker.last_load.insert(core, load);
        Ok(load)
    }

    fn resolve_limit(&self, core: usize, limit: FrequencyLimit, hw_file: &str) -> PlatformResult<u32> {
        match limit {
            FrequencyLimit::Khz(khz) => Ok(khz),
            FrequencyLimit::Unconstrained => read_u32(&self.core_path(core, hw_file)),
        }
    }
}

impl Default for SysfsPlatform {
    fn default() -> Self {
        Self::new(DEFAULT_CPU_ROOT, DEFAULT_PROC_STAT)
    }
}

impl CpuPlatform for SysfsPlatform {
    fn sample_load(&self, core: usize) -> PlatformResult<u32> {
        if core != PRIMARY_CORE && !self.is_core_online(core)? {
            // an offline core has no runqueue, the work it would take sits on cpu0
            let cached = self
                .loads
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .last_load
                .get(&PRIMARY_CORE)
                .copied();
            return match cached {
                Some(load) => Ok(load),
                None => self.measure_load(PRIMARY_CORE),
            };
        }
        self.measure_load(core)
    }

    fn is_core_online(&self, core: usize) -> PlatformResult<bool> {
        self.ensure_core(core)?;
        let path = self.core_path(core, "online");
        // cpu0 usually cannot be hotplugged and has no `online` file
        if !path.exists() {
            return Ok(true);
        }
        match read_trimmed(&path)?.as_str() {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(PlatformError::Malformed {
                path,
                content: other.to_string(),
            }),
        }
    }

    fn bring_core_online(&self, core: usize) -> PlatformResult<()> {
        self.ensure_core(core)?;
        write_value(&self.core_path(core, "online"), "1")
    }

    fn take_core_offline(&self, core: usize) -> PlatformResult<()> {
        self.ensure_core(core)?;
        let result = write_value(&self.core_path(core, "online"), "0");
        // the next sample after onlining starts a fresh delta
        self.loads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .prev
            .remove(&core);
        result
    }

    fn possible_cores(&self) -> PlatformResult<Vec<usize>> {
        let path = self.cpu_root.join("possible");
        let content = read_trimmed(&path)?;
        parse_cpu_list(&content).ok_or(PlatformError::Malformed { path, content })
    }

    fn set_frequency_limits(
        &self,
        core: usize,
        min: FrequencyLimit,
        max: FrequencyLimit,
    ) -> PlatformResult<()> {
        self.ensure_core(core)?;
        let min = self.resolve_limit(core, min, "cpufreq/cpuinfo_min_freq")?;
        let max = self.resolve_limit(core, max, "cpufreq/cpuinfo_max_freq")?;
        let min_path = self.core_path(core, "cpufreq/scaling_min_freq");
        let max_path = self.core_path(core, "cpufreq/scaling_max_freq");

        // the kernel rejects min > max, so order the writes by direction
        let current_max = read_u32(&max_path).unwrap_or(u32::MAX);
        if min > current_max {
            write_value(&max_path, &max.to_string())?;
            write_value(&min_path, &min.to_string())
        } else {
            write_value(&min_path, &min.to_string())?;
            write_value(&max_path, &max.to_string())
        }
    }
}
