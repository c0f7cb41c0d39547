//! Test doubles for the platform interfaces.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{PlatformError, PlatformResult};
use crate::platform::{Clock, CpuPlatform, FrequencyLimit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Online(usize),
    Offline(usize),
    Limits {
        core: usize,
        min: FrequencyLimit,
        max: FrequencyLimit,
    },
}

struct FakeState {
    online: Vec<bool>,
    loads: Vec<VecDeque<u32>>,
    // repeated once the queue drains
    last_load: Vec<u32>,
    commands: Vec<Command>,
    fail_commands: bool,
}

/// Records every command and serves scripted load samples.
pub struct FakePlatform {
    state: Mutex<FakeState>,
}

impl FakePlatform {
    /// `cores` cores, only the primary online.
    pub fn new(cores: usize) -> Self {
        let mut online = vec![false; cores];
        online[0] = true;
        Self {
            state: Mutex::new(FakeState {
                online,
                loads: vec![VecDeque::new(); cores],
                last_load: vec![0; cores],
                commands: Vec::new(),
                fail_commands: false,
            }),
        }
    }

    pub fn set_online(&self, core: usize, online: bool) {
        self.state.lock().unwrap().online[core] = online;
    }

    pub fn online(&self, core: usize) -> bool {
        self.state.lock().unwrap().online[core]
    }

    pub fn push_loads(&self, core: usize, loads: &[u32]) {
        self.state.lock().unwrap().loads[core].extend(loads);
    }

    pub fn commands(&self) -> Vec<Command> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.state.lock().unwrap().commands.clear();
    }

    pub fn fail_commands(&self, fail: bool) {
        self.state.lock().unwrap().fail_commands = fail;
    }

    fn check(&self, state: &FakeState, core: usize) -> PlatformResult<()> {
        if core >= state.online.len() {
            return Err(PlatformError::NoSuchCore(core));
        }
        Ok(())
    }
}

fn injected(core: usize) -> PlatformError {
    PlatformError::io(
        format!("/fake/cpu{core}"),
        std::io::Error::other("injected failure"),
    )
}

impl CpuPlatform for FakePlatform {
    fn sample_load(&self, core: usize) -> PlatformResult<u32> {
        let mut state = self.state.lock().unwrap();
        self.check(&state, core)?;
        if let Some(load) = state.loads[core].pop_front() {
            state.last_load[core] = load;
        }
        Ok(state.last_load[core])
    }

    fn is_core_online(&self, core: usize) -> PlatformResult<bool> {
        let state = self.state.lock().unwrap();
        self.check(&state, core)?;
        Ok(state.online[core])
    }

    fn bring_core_online(&self, core: usize) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        self.check(&state, core)?;
        state.commands.push(Command::Online(core));
        if state.fail_commands {
            return Err(injected(core));
        }
        state.online[core] = true;
        Ok(())
    }

    fn take_core_offline(&self, core: usize) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        self.check(&state, core)?;
        state.commands.push(Command::Offline(core));
        if state.fail_commands {
            return Err(injected(core));
        }
        state.online[core] = false;
        Ok(())
    }

    fn possible_cores(&self) -> PlatformResult<Vec<usize>> {
        Ok((0..self.state.lock().unwrap().online.len()).collect())
    }

    fn set_frequency_limits(
        &self,
        core: usize,
        min: FrequencyLimit,
        max: FrequencyLimit,
    ) -> PlatformResult<()> {
        let mut state = self.state.lock().unwrap();
        self.check(&state, core)?;
        state.commands.push(Command::Limits { core, min, max });
        if state.fail_commands {
            return Err(injected(core));
        }
        Ok(())
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap()
    }
}
