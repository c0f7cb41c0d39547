//! Display power-state transitions.
//!
//! Two states, `Active` (display on, ticks running) and `Suspended`
//! (display off, ticks stopped, primary core capped). Each transition runs
//! to completion under the state lock, so callers never observe a half
//! applied suspend or resume.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{info, warn};

use crate::display::DisplayState;
use crate::hotplug::Governor;
use crate::scheduler::TickSchedule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Active,
    Suspended,
}

pub struct PowerStateMachine {
    governor: Arc<Governor>,
    schedule: Arc<dyn TickSchedule>,
    resume_delay: Duration,
    state: Mutex<PowerState>,
}

impl PowerStateMachine {
    /// Starts in `Active`; the caller arms the first tick.
    pub fn new(
        governor: Arc<Governor>,
        schedule: Arc<dyn TickSchedule>,
        resume_delay: Duration,
    ) -> Self {
        Self {
            governor,
            schedule,
            resume_delay,
            state: Mutex::new(PowerState::Active),
        }
    }

    pub fn state(&self) -> PowerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Active -> Suspended. Returns `false` if already suspended.
    pub fn enter_low_power(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == PowerState::Suspended {
            warn!("display already in low-power state, ignoring");
            return false;
        }

        // no tick may be deciding while cores are forced down
        self.schedule.cancel_sync();
        info!("early suspend, hotplug work stopped");
        self.governor.suspend();

        *state = PowerState::Suspended;
        true
    }

    /// Suspended -> Active. Returns `false` if already active.
    pub fn leave_low_power(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == PowerState::Active {
            warn!("display already on, ignoring");
            return false;
        }

        self.governor.resume();
        info!(delay = ?self.resume_delay, "late resume, hotplug work starting");
        self.schedule.arm(self.resume_delay);

        *state = PowerState::Active;
        true
    }

    pub fn handle(&self, display: DisplayState) -> bool {
        match display {
            DisplayState::LowPower => self.enter_low_power(),
            DisplayState::On => self.leave_low_power(),
        }
    }
}
