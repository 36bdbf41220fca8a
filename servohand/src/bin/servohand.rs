//! Servo hand controller.
//!
//! Subcommands:
//! - `run`: read landmark/operator events (JSON lines) and drive the servos
//! - `ports`: list serial ports
//! - `plot`: render calibration graphs
//! - `gestures`: print the gesture table

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use servohand::link::{list_ports, MockConnector, MockDevice, SerialConnector};
use servohand::plot::render_calibration_graphs;
use servohand::{
    parse_line, ActuatorLink, AngleRange, AngleRangeMap, CalibrationStore, CommandScheduler,
    Connector, DriveConfig, GestureTable, HandTracker, InputEvent, LinkConfig, PercentBoard,
    SchedulerHandle, SchedulerSettings,
};

#[derive(Parser, Debug)]
#[command(name = "servohand")]
#[command(about = "Drive servo fingers from hand landmark streams")]
#[command(version)]
struct Args {
    /// Configuration file (JSON). Missing file means defaults.
    #[arg(short, long, global = true, default_value = "servohand.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read events from stdin (or --input) and drive the servos
    Run {
        /// Serial port path (overrides config)
        #[arg(short, long)]
        port: Option<String>,

        /// Baud rate (overrides config)
        #[arg(short, long)]
        baud: Option<u32>,

        /// Minimum device-angle change before re-sending
        #[arg(short, long)]
        threshold: Option<i32>,

        /// Scheduler tick interval in milliseconds
        #[arg(long)]
        tick_ms: Option<u64>,

        /// Smoothing factor 0..=1 (weight of the previous value)
        #[arg(short, long)]
        smoothing: Option<f64>,

        /// Read events from this file instead of stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Use an in-memory device and print the frames it received
        #[arg(long)]
        dry_run: bool,
    },

    /// List available serial ports
    Ports,

    /// Render one calibration graph per segment
    Plot {
        /// Output directory
        #[arg(short, long, default_value = "plots")]
        output: PathBuf,
    },

    /// Print the gesture table
    Gestures,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = DriveConfig::load_or_default(&args.config);

    match args.command {
        Command::Run {
            port,
            baud,
            threshold,
            tick_ms,
            smoothing,
            input,
            dry_run,
        } => {
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(baud) = baud {
                config.baud = baud;
            }
            if let Some(threshold) = threshold {
                config.threshold = threshold;
            }
            if let Some(tick_ms) = tick_ms {
                config.tick_ms = tick_ms;
            }
            if let Some(smoothing) = smoothing {
                config.smoothing = smoothing;
            }
            run(&config, input.as_deref(), dry_run)
        }
        Command::Ports => {
            let ports = list_ports()?;
            if ports.is_empty() {
                println!("No serial ports found");
            }
            for port in ports {
                println!("{port}");
            }
            Ok(())
        }
        Command::Plot { output } => {
            let segments = Arc::new(config.segment_set()?);
            let store = CalibrationStore::load(&config.calibration_file, segments)
                .context("Failed to load calibration")?;
            for path in render_calibration_graphs(&store, &output)? {
                println!("{}", path.display());
            }
            Ok(())
        }
        Command::Gestures => {
            let table = load_gestures(&config, config.segments.len());
            for label in table.labels() {
                println!("{label:<40} {:?}", table.get(label).unwrap_or_default());
            }
            Ok(())
        }
    }
}

fn load_gestures(config: &DriveConfig, segments: usize) -> GestureTable {
    let loaded = match &config.gesture_file {
        Some(path) => GestureTable::load(path, segments),
        None => GestureTable::builtin_for(segments),
    };
    loaded.unwrap_or_else(|e| {
        warn!("No gestures available: {e}");
        GestureTable::empty(segments)
    })
}

/// Everything an input event may touch.
struct Session {
    config: DriveConfig,
    tracker: HandTracker,
    ranges: Arc<AngleRangeMap>,
    gestures: GestureTable,
    scheduler: SchedulerHandle,
}

impl Session {
    fn apply(&self, event: InputEvent) {
        let segments = self.tracker.segments();
        match event {
            InputEvent::Landmarks { points } => {
                self.tracker.observe(points.as_deref());
            }
            InputEvent::Calibrate { percent, segment } => {
                let segment = match segment.as_deref().map(|name| segments.resolve(name)) {
                    Some(Ok(id)) => Some(id),
                    Some(Err(e)) => {
                        warn!("Calibration ignored: {e}");
                        return;
                    }
                    None => None,
                };
                if let Err(e) = self.tracker.capture(percent, segment) {
                    warn!("Calibration ignored: {e}");
                }
            }
            InputEvent::Gesture { label } => match self.gestures.resolve(&label) {
                Ok(percents) => {
                    if percents.len() != segments.len() {
                        warn!(
                            "Gesture '{label}' has {} values for {} segments",
                            percents.len(),
                            segments.len()
                        );
                    }
                    self.tracker.board().publish_all(percents);
                    info!("Gesture '{label}' applied");
                }
                Err(e) => warn!("{e}"),
            },
            InputEvent::Threshold { value } => {
                self.scheduler.scheduler().settings().set_threshold(value)
            }
            InputEvent::Interval { ms } => self.scheduler.scheduler().settings().set_tick_ms(ms),
            InputEvent::Range {
                segment,
                open,
                closed,
            } => match segments.resolve(&segment) {
                Ok(id) => {
                    self.ranges.set(id, AngleRange::new(open, closed));
                    info!("Range for '{segment}' set to {open}/{closed}");
                }
                Err(e) => warn!("Range ignored: {e}"),
            },
            InputEvent::ClearCalibration { segment } => match segments.resolve(&segment) {
                Ok(id) => {
                    self.tracker.store().clear_segment(id);
                    info!("Cleared calibration for '{segment}'");
                }
                Err(e) => warn!("Clear ignored: {e}"),
            },
            InputEvent::Park => {
                self.scheduler.park();
            }
            InputEvent::Resume => self.scheduler.resume(),
            InputEvent::Save => self.save(),
        }
    }

    fn save(&self) {
        if let Err(e) = self.tracker.store().save(&self.config.calibration_file) {
            error!("Failed to save calibration: {e}");
        }
        if let Err(e) = self.ranges.save(&self.config.angle_map_file) {
            error!("Failed to save angle ranges: {e}");
        }
    }
}

fn run(config: &DriveConfig, input: Option<&Path>, dry_run: bool) -> Result<()> {
    let segments = Arc::new(config.segment_set().context("Invalid segment definitions")?);
    info!(
        "Driving {} segments: {}",
        segments.len(),
        segments
            .iter()
            .map(|(_, s)| s.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let store = CalibrationStore::load(&config.calibration_file, Arc::clone(&segments))
        .unwrap_or_else(|e| {
            warn!("Starting with empty calibration: {e}");
            CalibrationStore::new(Arc::clone(&segments))
        });
    let ranges = AngleRangeMap::load(&config.angle_map_file, Arc::clone(&segments))
        .unwrap_or_else(|e| {
            warn!("Starting with default angle ranges: {e}");
            AngleRangeMap::with_defaults(Arc::clone(&segments))
        });
    let ranges = Arc::new(ranges);
    let gestures = load_gestures(config, segments.len());

    let board = Arc::new(PercentBoard::new(segments.len()));
    let tracker = HandTracker::new(Arc::new(store), config.smoothing, Arc::clone(&board));

    let mock_device = dry_run.then(MockDevice::new);
    let connector: Arc<dyn Connector> = match &mock_device {
        Some(device) => Arc::new(MockConnector::new(device.clone())),
        None => Arc::new(
            SerialConnector::new(config.port.clone(), config.baud)
                .with_timeout(config.write_timeout()),
        ),
    };
    let link_config = if dry_run {
        LinkConfig {
            settle_delay: Duration::ZERO,
            ..config.link_config()
        }
    } else {
        config.link_config()
    };
    let link = Arc::new(ActuatorLink::new(connector, link_config));
    link.open()?;
    if dry_run && !wait_connected(&link, Duration::from_secs(1)) {
        warn!("Mock device did not connect");
    }

    let settings = Arc::new(SchedulerSettings::new(config.threshold, config.tick_ms));
    let scheduler = Arc::new(CommandScheduler::new(
        board,
        Arc::clone(&ranges),
        Arc::clone(&link),
        settings,
    ));
    let handle = SchedulerHandle::spawn(scheduler, true).context("Failed to start scheduler")?;

    let session = Session {
        config: config.clone(),
        tracker,
        ranges,
        gestures,
        scheduler: handle,
    };

    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };

    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read input")?;
        match parse_line(index + 1, &line) {
            Ok(Some(event)) => session.apply(event),
            Ok(None) => {}
            Err(e) => warn!("Skipping input: {e}"),
        }
    }

    info!("Input finished, parking");
    session.scheduler.park();
    info!("Last sent angles: {:?}", session.scheduler.scheduler().last_sent());
    session.save();

    let Session { scheduler, .. } = session;
    scheduler.stop();
    link.close();

    let stats = link.stats();
    info!(
        "Link: {} connect attempts ({} failed), {} frames sent, {} write failures",
        stats.connect_attempts, stats.connect_failures, stats.frames_sent, stats.write_failures
    );

    if let Some(device) = mock_device {
        for line in device.lines() {
            print!("{line}");
        }
    }
    Ok(())
}

/// Block until the link is usable or `timeout` elapses.
fn wait_connected(link: &ActuatorLink, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if link.is_connected() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    link.is_connected()
}
