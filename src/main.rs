use std::{path::PathBuf, sync::Arc, sync::mpsc};

use hotplug_governor::{
    config::GovernorConfig,
    constants::MANAGED_CORE,
    control::ControlFiles,
    display::{BrightnessMonitor, DisplayState, spawn_power_handler},
    hotplug::Governor,
    platform::MonotonicClock,
    power::PowerStateMachine,
    scheduler::{PeriodicScheduler, TickSchedule},
    sysfs::SysfsPlatform,
    tunables::Tunables,
};
use tracing::{info, warn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = GovernorConfig::load(config_path.as_deref())?;

    info!(
        load_threshold = config.load_threshold,
        suspend_frequency = config.suspend_frequency,
        "hotplug governor started"
    );

    let tunables = Arc::new(Tunables::new(
        config.load_threshold,
        config.suspend_frequency,
    ));
    let platform = Arc::new(SysfsPlatform::new(&config.cpu_root, &config.proc_stat));
    let governor = Arc::new(Governor::new(
        tunables.clone(),
        platform,
        Arc::new(MonotonicClock),
        MANAGED_CORE,
    ));

    let tick_governor = governor.clone();
    let scheduler = Arc::new(PeriodicScheduler::spawn(
        "hotplug-tick",
        config.tick_interval,
        move || {
            tick_governor.tick();
        },
    )?);
    scheduler.arm(config.startup_delay);
    info!(delay = ?config.startup_delay, "first hotplug tick armed");

    let machine = Arc::new(PowerStateMachine::new(
        governor.clone(),
        scheduler.clone(),
        config.resume_delay,
    ));

    if let Some(path) = &config.brightness_path {
        let (send, mut recv) = watch::channel(DisplayState::On);
        spawn_power_handler(machine.clone(), move || recv.wait())?;
        // a panel already off at start shows up as the first edge
        BrightnessMonitor::new(path, config.display_poll_interval, DisplayState::On)
            .spawn(move |state| {
                send.send(state);
            })?;
    } else {
        info!("display.brightness-path not set, running without suspend handling");
    }

    match ControlFiles::create(&config.control_dir, tunables) {
        Ok(files) => {
            files.spawn(config.control_poll_interval)?;
        }
        Err(e) => warn!(error = %e, "control files unavailable, tunables fixed to configuration"),
    }

    let (stop_send, stop_recv) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_send.send(());
    })?;
    let _ = stop_recv.recv();

    info!("stopping, restoring all cores");
    scheduler.shutdown();
    governor.resume();
    Ok(())
}
