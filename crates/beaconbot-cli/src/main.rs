//! `beaconbot` – run the beaconing controller against the simulator.
//!
//! ```text
//! beaconbot [--config <path>] [--write-default-config]
//! ```
//!
//! 1. Loads `~/.beaconbot/config.toml` (or `--config <path>`), falling back
//!    to defaults when the file is absent.
//! 2. Builds the simulated arena, its sensor feed and the gated drive base.
//! 3. Runs one beaconing attempt to completion.  **Ctrl-C** interrupts the
//!    run; the drive base is stopped either way.
//!
//! Exit status: `0` when the beacon was reached, `130` when interrupted,
//! `1` on any error (including no beacon colour at the start marker), `2`
//! on bad arguments.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use tracing::warn;

use beaconbot_hal::sim::SimWorld;
use beaconbot_kernel::{MotionGate, StateVerifier};
use beaconbot_middleware::{EventBus, Topic, TopicReceiver};
use beaconbot_perception::{ColorTargetDetector, LidarSectorMonitor};
use beaconbot_runtime::{ControlLoop, RunOutcome, init_tracing, spawn_sim_feed};
use beaconbot_types::{BeaconError, EventPayload};

// ─────────────────────────────────────────────────────────────────────────────
// Arguments
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    config: Option<PathBuf>,
    write_default_config: bool,
}

impl CliArgs {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self, String> {
        let mut parsed = CliArgs::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    let path = args.next().ok_or("--config needs a path")?;
                    parsed.config = Some(PathBuf::from(path));
                }
                "--write-default-config" => parsed.write_default_config = true,
                other => return Err(format!("unknown argument `{other}`")),
            }
        }
        Ok(parsed)
    }
}

const USAGE: &str = "usage: beaconbot [--config <path>] [--write-default-config]";

fn main() -> ExitCode {
    let args = match CliArgs::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}: {e}\n{USAGE}", "error".red().bold());
            return ExitCode::from(2);
        }
    };

    // The guard flushes exported spans when main returns.
    let _tracing = init_tracing("beaconbot");
    print_banner();

    let path = args.config.clone().unwrap_or_else(config::config_path);

    if args.write_default_config {
        return match config::save_to(&config::Config::default(), &path) {
            Ok(()) => {
                println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    path.display().to_string().bold()
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                println!("{}: {e}", "Config error".red());
                ExitCode::FAILURE
            }
        };
    }

    let cfg = match config::load_from(&path) {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            cfg
        }
        Ok(None) => {
            println!(
                "  No config at {}; using defaults.",
                path.display().to_string().dimmed()
            );
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            if let Err(e) = cfg.validate() {
                println!("{}: {e}", "Config error".red());
                return ExitCode::FAILURE;
            }
            cfg
        }
        Err(e) => {
            println!("{}: {e}", "Config error".red());
            return ExitCode::FAILURE;
        }
    };

    // ── Ctrl-C ───────────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handler = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the robot …".yellow().bold());
        shutdown_handler.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; the run can only end at the beacon");
    }

    // Tracing is initialised first: its exporter must not need a runtime.
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            println!("{}: {e}", "Failed to start async runtime".red());
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run_simulation(&cfg, shutdown)) {
        Ok(RunOutcome::Completed) => {
            println!("\n  {} Beacon reached.", "✓".green().bold());
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::Interrupted) => {
            println!("\n  {} Run interrupted; robot stopped.", "■".yellow().bold());
            ExitCode::from(130)
        }
        Err(e) => {
            println!("\n  {}: {e}", "Run failed".red().bold());
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Simulated run
// ─────────────────────────────────────────────────────────────────────────────

async fn run_simulation(
    cfg: &config::Config,
    shutdown: Arc<AtomicBool>,
) -> Result<RunOutcome, BeaconError> {
    let world = SimWorld::new(cfg.sim.clone());
    let monitor = LidarSectorMonitor::new(cfg.sectors, cfg.sim.scan_samples);
    let sectors = monitor.reader();
    let detector = ColorTargetDetector::new(cfg.roi);

    let feed_stop = Arc::new(AtomicBool::new(false));
    let feed = spawn_sim_feed(
        world.clone(),
        monitor,
        detector.clone(),
        cfg.feed,
        Arc::clone(&feed_stop),
    );

    let bus = EventBus::default();
    let reporter = tokio::spawn(report_events(
        bus.subscribe_to(Topic::Telemetry),
        bus.subscribe_to(Topic::SystemAlerts),
    ));

    let gate = MotionGate::new(world.drive_base(), StateVerifier::with_limits(&cfg.limits))
        .with_bus(bus.clone());
    let control = ControlLoop::new(
        cfg.control_loop(),
        gate,
        world.odometry(),
        sectors,
        detector,
        bus,
    );

    // The loop owns the last bus handles; the reporter ends with it.
    let result = control.run(shutdown).await;

    feed_stop.store(true, Ordering::SeqCst);
    if let Err(e) = feed.await {
        warn!(error = %e, "sensor feed task failed");
    }
    if let Err(e) = reporter.await {
        warn!(error = %e, "event reporter task failed");
    }

    let pose = world.pose();
    println!(
        "  Final pose: x = {:.2} m, y = {:.2} m, yaw = {:.1}°  ({} collision(s))",
        pose.x,
        pose.y,
        pose.yaw.to_degrees(),
        world.collisions()
    );
    result
}

async fn report_events(mut telemetry: TopicReceiver, mut alerts: TopicReceiver) {
    let (mut telemetry_open, mut alerts_open) = (true, true);
    loop {
        tokio::select! {
            e = telemetry.recv(), if telemetry_open => match e {
                Some(event) => print_event(&event.payload),
                None => telemetry_open = false,
            },
            e = alerts.recv(), if alerts_open => match e {
                Some(event) => print_event(&event.payload),
                None => alerts_open = false,
            },
            else => break,
        }
    }
}

fn print_event(payload: &EventPayload) {
    if let Some(line) = describe(payload) {
        println!("  {line}");
    }
}

/// One user-facing line per event worth showing.
fn describe(payload: &EventPayload) -> Option<String> {
    match payload {
        EventPayload::TargetSelected { name } => {
            Some(format!("Target colour: {}", name.bold()))
        }
        EventPayload::PhaseChanged { from, to } => {
            Some(format!("{} → {}", from.to_string().dimmed(), to.to_string().cyan().bold()))
        }
        EventPayload::AvoidanceTurn { degrees, reading } => Some(format!(
            "{} turned {degrees:+.0}° (front {:.2} m, left {:.2} m, right {:.2} m)",
            "Obstacle:".yellow(),
            reading.front,
            reading.left,
            reading.right
        )),
        EventPayload::SensorStale { component } => {
            Some(format!("{} {component} stream is stale", "Sensor:".red()))
        }
        EventPayload::SensorRecovered { component } => {
            Some(format!("{} {component} stream recovered", "Sensor:".green()))
        }
        EventPayload::TaskComplete => Some(format!("{}", "Task complete".green().bold())),
        EventPayload::Motion(_) => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("  {} {}",
        "beaconbot".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Colour-beacon seeking controller (simulated run)");
    println!();
}
