// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! ecfand: background service that replaces the CrOS embedded controller's
//! automatic thermal control with a configurable, debounced duty-cycle
//! curve driven by CPU temperature.

use anyhow::Context;
use clap::Parser;
use ec_fan_utility::config;
use ec_fan_utility::control::ControlLoop;
use ec_fan_utility::ec::EcCommandChannel;
use ec_fan_utility::fan::{DebounceGate, EcFanController};
use ec_fan_utility::power;
use ec_fan_utility::sensors::CpuTempSensors;
use ec_fan_utility::smooth::MovingAverageSmoother;
use std::path::Path;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "ecfand", about = "CrOS EC fan control daemon")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: String,

    /// Override the EC device path.
    #[arg(short, long)]
    device: Option<String>,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config_path = config::resolve_config_path(Some(&cli.config));
    let cfg = config::load_config(&config_path)?;
    cfg.validate().context("invalid configuration")?;

    let curve = cfg.build_curve()?;
    let device_path = cli.device.as_deref().unwrap_or(&cfg.device_path);

    // Hardware first: if the EC isn't reachable there is nothing to run.
    let channel = EcCommandChannel::open_device(Path::new(device_path))?;
    let controller = EcFanController::new(channel);
    let gate = DebounceGate::new(controller, cfg.debounce_threshold);

    let sensors = CpuTempSensors::discover().context("discovering CPU temperature sensors")?;

    log::info!(
        "controlling EC fan via {device_path} from '{}' every {}s (window {}, threshold {})",
        sensors.hwmon_name(),
        cfg.update_interval_secs,
        cfg.moving_average_width,
        cfg.debounce_threshold
    );

    let smoother = MovingAverageSmoother::new(sensors, cfg.moving_average_width);

    let power_events = power::spawn_suspend_watcher(power::DEFAULT_RESUME_GAP);

    // Signal handler
    let shutdown = Arc::new(Notify::new());
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {e}");
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        log::info!("received shutdown signal");
        shutdown_signal.notify_one();
    });

    let control = ControlLoop::new(smoother, curve, gate, cfg.update_interval());
    if let Err(e) = control.run(shutdown, power_events).await {
        log::error!("fan control failed: {e:#}");
        // Exit non-zero so the service manager can apply its restart
        // policy. Automatic fan control has already been restored.
        std::process::exit(1);
    }

    log::info!("daemon shut down cleanly");
    Ok(())
}
