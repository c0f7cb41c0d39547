//! Hotplug decision engine for the managed secondary core.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::constants::{MIN_TIME_CPU_ONLINE_MS, ONLINE_COUNTER_THRESHOLD, PRIMARY_CORE};
use crate::hysteresis::LoadCounter;
use crate::platform::{Clock, CpuPlatform, FrequencyLimit};
use crate::tunables::Tunables;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    BringOnline,
    TakeOffline,
    Noop,
}

/// Picks the action for the managed core given its counter and current state.
///
/// `last_online` is when the engine last brought the core up; `None` means it
/// never did (online since boot or restored on resume), which satisfies the
/// residency guard.
pub fn decide(counter: u8, online: bool, last_online: Option<Instant>, now: Instant) -> Decision {
    let want_online = counter >= ONLINE_COUNTER_THRESHOLD;

    if want_online {
        if online {
            Decision::Noop
        } else {
            Decision::BringOnline
        }
    } else if online && residency_elapsed(last_online, now) {
        Decision::TakeOffline
    } else {
        Decision::Noop
    }
}

fn residency_elapsed(last_online: Option<Instant>, now: Instant) -> bool {
    last_online.is_none_or(|t| {
        now.saturating_duration_since(t) >= Duration::from_millis(MIN_TIME_CPU_ONLINE_MS)
    })
}

#[derive(Debug, Default)]
struct HotplugState {
    counter: LoadCounter,
    last_online: Option<Instant>,
}

/// Owns the hysteresis state of the managed core and drives the platform.
pub struct Governor {
    tunables: Arc<Tunables>,
    platform: Arc<dyn CpuPlatform>,
    clock: Arc<dyn Clock>,
    managed_core: usize,
    state: Mutex<HotplugState>,
}

impl Governor {
    pub fn new(
        tunables: Arc<Tunables>,
        platform: Arc<dyn CpuPlatform>,
        clock: Arc<dyn Clock>,
        managed_core: usize,
    ) -> Self {
        Self {
            tunables,
            platform,
            clock,
            managed_core,
            state: Mutex::new(HotplugState::default()),
        }
    }

    pub fn tunables(&self) -> &Arc<Tunables> {
        &self.tunables
    }

    pub fn managed_core(&self) -> usize {
        self.managed_core
    }

    pub fn counter(&self) -> u8 {
        self.lock().counter.value()
    }

    pub fn last_online(&self) -> Option<Instant> {
        self.lock().last_online
    }

    fn lock(&self) -> MutexGuard<'_, HotplugState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn core_online(&self, core: usize) -> Option<bool> {
        match self.platform.is_core_online(core) {
            Ok(online) => Some(online),
            Err(e) => {
                warn!(core, error = %e, "cannot read core online state");
                None
            }
        }
    }

    /// One sampling tick: sample cores up to the managed one, update its
    /// counter, then bring it up or down.
    pub fn tick(&self) -> Decision {
        let threshold = self.tunables.load_threshold();
        let mut state = self.lock();

        for core in PRIMARY_CORE..=self.managed_core {
            // the managed core is sampled even while offline
            if core != self.managed_core && self.core_online(core) != Some(true) {
                continue;
            }
            let load = match self.platform.sample_load(core) {
                Ok(load) => load,
                Err(e) => {
                    warn!(core, error = %e, "load sample failed");
                    continue;
                }
            };
            trace!(core, load, "load sample");
            if core == self.managed_core {
                state.counter.update(load, threshold);
            }
        }

        let Some(online) = self.core_online(self.managed_core) else {
            return Decision::Noop;
        };
        let now = self.clock.now();
        let counter = state.counter.value();
        let decision = decide(counter, online, state.last_online, now);
        debug!(core = self.managed_core, counter, online, ?decision, "tick");

        match decision {
            Decision::BringOnline => match self.platform.bring_core_online(self.managed_core) {
                Ok(()) => {
                    state.last_online = Some(now);
                    info!(core = self.managed_core, counter, "core online");
                }
                Err(e) => warn!(core = self.managed_core, error = %e, "cannot bring core online"),
            },
            Decision::TakeOffline => match self.platform.take_core_offline(self.managed_core) {
                Ok(()) => info!(core = self.managed_core, counter, "core offline"),
                Err(e) => warn!(core = self.managed_core, error = %e, "cannot take core offline"),
            },
            Decision::Noop => {}
        }
        decision
    }

    fn secondary_cores(&self) -> Vec<usize> {
        match self.platform.possible_cores() {
            Ok(cores) => cores.into_iter().filter(|&c| c != PRIMARY_CORE).collect(),
            Err(e) => {
                warn!(error = %e, "cannot list possible cores, assuming the managed core only");
                vec![self.managed_core]
            }
        }
    }

    /// Display-off actions: every secondary core down, primary core capped.
    ///
    /// Must only run once the periodic tick has been cancelled and drained.
    pub fn suspend(&self) {
        let _state = self.lock();

        for core in self.secondary_cores() {
            if self.core_online(core) != Some(true) {
                continue;
            }
            match self.platform.take_core_offline(core) {
                Ok(()) => info!(core, "core offline (suspend)"),
                Err(e) => warn!(core, error = %e, "cannot take core offline"),
            }
        }

        let ceiling = FrequencyLimit::Khz(self.tunables.suspend_frequency());
        match self
            .platform
            .set_frequency_limits(PRIMARY_CORE, FrequencyLimit::Unconstrained, ceiling)
        {
            Ok(()) => info!("limit cpu{PRIMARY_CORE} max frequency to {ceiling}"),
            Err(e) => warn!(error = %e, "cannot cap cpu{PRIMARY_CORE} frequency"),
        }
    }

    /// Display-on actions: every core up, counter cleared, cap removed.
    pub fn resume(&self) {
        let mut state = self.lock();

        for core in self.secondary_cores() {
            if self.core_online(core) != Some(false) {
                continue;
            }
            match self.platform.bring_core_online(core) {
                Ok(()) => info!(core, "core online (resume)"),
                Err(e) => warn!(core, error = %e, "cannot bring core online"),
            }
        }

        state.counter.reset();

        match self.platform.set_frequency_limits(
            PRIMARY_CORE,
            FrequencyLimit::Unconstrained,
            FrequencyLimit::Unconstrained,
        ) {
            Ok(()) => info!("restore cpu{PRIMARY_CORE} max frequency"),
            Err(e) => warn!(error = %e, "cannot restore cpu{PRIMARY_CORE} frequency"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{HIGH_LOAD_COUNTER, MANAGED_CORE};
    use crate::testing::{Command, FakePlatform, ManualClock};

    fn setup(cores: usize) -> (Governor, Arc<FakePlatform>, Arc<ManualClock>) {
        let platform = Arc::new(FakePlatform::new(cores));
        let clock = Arc::new(ManualClock::new());
        let governor = Governor::new(
            Arc::new(Tunables::default()),
            platform.clone(),
            clock.clone(),
            MANAGED_CORE,
        );
        (governor, platform, clock)
    }

    fn tick_every_second(governor: &Governor, clock: &ManualClock, n: usize) -> Vec<Decision> {
        (0..n)
            .map(|_| {
                clock.advance(Duration::from_secs(1));
                governor.tick()
            })
            .collect()
    }

    #[test]
    fn decide_table() {
        let t0 = Instant::now();
        let now = t0 + Duration::from_secs(2);
        let recent = Some(t0 + Duration::from_millis(1500));
        let old = Some(t0 + Duration::from_millis(800));

        assert_eq!(decide(10, false, None, now), Decision::BringOnline);
        assert_eq!(decide(10, true, None, now), Decision::Noop);
        assert_eq!(decide(9, false, None, now), Decision::Noop);
        assert_eq!(decide(9, true, recent, now), Decision::Noop);
        assert_eq!(decide(9, true, old, now), Decision::TakeOffline);
        assert_eq!(decide(0, true, None, now), Decision::TakeOffline);
    }

    #[test]
    fn onlines_after_ten_busy_ticks() {
        let (governor, platform, clock) = setup(2);
        platform.push_loads(MANAGED_CORE, &[60; 10]);

        let decisions = tick_every_second(&governor, &clock, 10);

        assert!(decisions[..9].iter().all(|d| *d == Decision::Noop));
        assert_eq!(decisions[9], Decision::BringOnline);
        assert_eq!(governor.counter(), 10);
        assert!(platform.online(MANAGED_CORE));
        assert_eq!(platform.commands(), vec![Command::Online(MANAGED_CORE)]);
    }

    #[test]
    fn stays_online_for_minimum_residency() {
        let (governor, platform, clock) = setup(2);
        platform.push_loads(MANAGED_CORE, &[60; 10]);
        tick_every_second(&governor, &clock, 10);
        platform.push_loads(MANAGED_CORE, &[0; 10]);
        platform.clear_commands();

        // ten idle ticks 100 ms apart drain the counter inside the window
        for _ in 0..10 {
            clock.advance(Duration::from_millis(100));
            assert_eq!(governor.tick(), Decision::Noop);
        }
        assert_eq!(governor.counter(), 0);
        assert!(platform.online(MANAGED_CORE));

        clock.advance(Duration::from_millis(199));
        assert_eq!(governor.tick(), Decision::Noop);

        clock.advance(Duration::from_millis(1));
        assert_eq!(governor.tick(), Decision::TakeOffline);
        assert!(!platform.online(MANAGED_CORE));
        assert_eq!(platform.commands(), vec![Command::Offline(MANAGED_CORE)]);
    }

    #[test]
    fn offlines_on_next_tick_after_residency() {
        let (governor, platform, clock) = setup(2);
        platform.push_loads(MANAGED_CORE, &[80; 10]);
        tick_every_second(&governor, &clock, 10);
        platform.push_loads(MANAGED_CORE, &[0]);

        // one second online is still inside the window
        assert_eq!(
            tick_every_second(&governor, &clock, 2),
            vec![Decision::Noop, Decision::TakeOffline]
        );
    }

    #[test]
    fn no_duplicate_commands_when_already_in_state() {
        let (governor, platform, clock) = setup(2);
        platform.push_loads(MANAGED_CORE, &[90]);
        tick_every_second(&governor, &clock, 30);
        assert_eq!(governor.counter(), HIGH_LOAD_COUNTER);
        assert_eq!(platform.commands(), vec![Command::Online(MANAGED_CORE)]);
    }

    #[test]
    fn idle_offline_core_gets_no_commands() {
        let (governor, platform, clock) = setup(2);
        tick_every_second(&governor, &clock, 30);
        assert_eq!(governor.counter(), 0);
        assert!(platform.commands().is_empty());
    }

    #[test]
    fn threshold_change_applies_on_next_tick() {
        let (governor, platform, clock) = setup(2);
        platform.push_loads(MANAGED_CORE, &[40]);
        tick_every_second(&governor, &clock, 3);
        assert_eq!(governor.counter(), 0);

        governor.tunables().set_load_threshold(40);
        tick_every_second(&governor, &clock, 3);
        assert_eq!(governor.counter(), 3);
    }

    #[test]
    fn failed_online_does_not_record_timestamp() {
        let (governor, platform, clock) = setup(2);
        platform.push_loads(MANAGED_CORE, &[100]);
        platform.fail_commands(true);
        tick_every_second(&governor, &clock, 10);
        assert_eq!(governor.last_online(), None);
        assert!(!platform.online(MANAGED_CORE));
    }

    #[test]
    fn suspend_forces_offline_and_caps_frequency() {
        let (governor, platform, clock) = setup(4);
        platform.set_online(2, true);
        platform.push_loads(MANAGED_CORE, &[100; 10]);
        tick_every_second(&governor, &clock, 10);
        platform.clear_commands();

        // still inside the residency window
        governor.suspend();

        assert_eq!(
            platform.commands(),
            vec![
                Command::Offline(1),
                Command::Offline(2),
                Command::Limits {
                    core: 0,
                    min: FrequencyLimit::Unconstrained,
                    max: FrequencyLimit::Khz(540_000),
                },
            ]
        );
        assert!(platform.online(0));
    }

    #[test]
    fn resume_restores_topology_and_counter() {
        let (governor, platform, clock) = setup(3);
        platform.push_loads(MANAGED_CORE, &[100; 5]);
        tick_every_second(&governor, &clock, 5);
        assert_eq!(governor.counter(), 5);
        platform.clear_commands();

        governor.resume();

        assert_eq!(governor.counter(), 0);
        assert!((0..3).all(|c| platform.online(c)));
        assert_eq!(
            platform.commands(),
            vec![
                Command::Online(1),
                Command::Online(2),
                Command::Limits {
                    core: 0,
                    min: FrequencyLimit::Unconstrained,
                    max: FrequencyLimit::Unconstrained,
                },
            ]
        );
    }

    #[test]
    fn platform_failures_are_not_fatal() {
        let (governor, platform, _clock) = setup(2);
        platform.set_online(MANAGED_CORE, true);
        platform.fail_commands(true);
        governor.suspend();
        governor.resume();
        assert_eq!(governor.counter(), 0);
    }
}
