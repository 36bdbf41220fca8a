//! Periodic command scheduler.
//!
//! Every tick converts the latest per-segment percentages into device angles,
//! keeps only the segments whose angle moved by at least the threshold since
//! the last *sent* value, and writes them as one frame. The comparison is
//! against what the device last received, not the last computed angle, so a
//! slow drift smaller than the threshold never reaches the device.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::angle_range::AngleRangeMap;
use crate::board::PercentBoard;
use crate::link::{sleep_unless, ActuatorLink, LinkState, SendOutcome};
use crate::segment::SegmentId;
use crate::sync;

/// Minimum device-angle change that triggers a send.
pub const DEFAULT_THRESHOLD: i32 = 7;
/// Tick period in milliseconds.
pub const DEFAULT_TICK_MS: u64 = 50;

/// Parked loop re-checks its flags at this period.
const PARKED_POLL: Duration = Duration::from_millis(20);

/// Operator-tunable settings, read at the start of every tick.
#[derive(Debug)]
pub struct SchedulerSettings {
    threshold: AtomicI32,
    tick_ms: AtomicU64,
}

impl SchedulerSettings {
    pub fn new(threshold: i32, tick_ms: u64) -> Self {
        Self {
            threshold: AtomicI32::new(threshold.max(0)),
            tick_ms: AtomicU64::new(tick_ms.max(1)),
        }
    }

    pub fn threshold(&self) -> i32 {
        self.threshold.load(Ordering::Relaxed)
    }

    /// Negative thresholds are treated as 0 (send every change).
    pub fn set_threshold(&self, threshold: i32) {
        self.threshold.store(threshold.max(0), Ordering::Relaxed);
        info!("Send threshold set to {}", threshold.max(0));
    }

    pub fn tick_ms(&self) -> u64 {
        self.tick_ms.load(Ordering::Relaxed)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms())
    }

    pub fn set_tick_ms(&self, tick_ms: u64) {
        self.tick_ms.store(tick_ms.max(1), Ordering::Relaxed);
        info!("Tick interval set to {} ms", tick_ms.max(1));
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_TICK_MS)
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame carrying this many segments was written.
    Sent(usize),
    /// Nothing moved past the threshold.
    Unchanged,
    /// Link not usable; nothing attempted.
    Skipped(LinkState),
    /// Write failed; last-sent angles were cleared.
    Failed,
    /// Parked; nothing is sent until resumed.
    Parked,
}

/// Angles the device last received, valid for one link generation.
#[derive(Debug)]
struct SentAngles {
    angles: Vec<Option<i32>>,
    generation: u64,
}

impl SentAngles {
    fn clear(&mut self) {
        self.angles.iter_mut().for_each(|v| *v = None);
    }

    /// Forget everything sent over an earlier connection.
    fn sync_generation(&mut self, generation: u64) {
        if self.generation != generation {
            if self.angles.iter().any(Option::is_some) {
                debug!("Link generation {generation}, discarding last sent angles");
            }
            self.clear();
            self.generation = generation;
        }
    }
}

#[derive(Debug)]
pub struct CommandScheduler {
    board: Arc<PercentBoard>,
    ranges: Arc<AngleRangeMap>,
    link: Arc<ActuatorLink>,
    settings: Arc<SchedulerSettings>,
    /// Held for the whole tick, which also serializes ticks with `park`.
    last_sent: Mutex<SentAngles>,
    parked: AtomicBool,
}

impl CommandScheduler {
    pub fn new(
        board: Arc<PercentBoard>,
        ranges: Arc<AngleRangeMap>,
        link: Arc<ActuatorLink>,
        settings: Arc<SchedulerSettings>,
    ) -> Self {
        let segments = board.len();
        Self {
            board,
            ranges,
            link,
            settings,
            last_sent: Mutex::new(SentAngles {
                angles: vec![None; segments],
                generation: 0,
            }),
            parked: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &Arc<SchedulerSettings> {
        &self.settings
    }

    pub fn link(&self) -> &Arc<ActuatorLink> {
        &self.link
    }

    /// Device angles the controller last acknowledged writing.
    pub fn last_sent(&self) -> Vec<Option<i32>> {
        sync::lock(&self.last_sent).angles.clone()
    }

    pub fn is_parked(&self) -> bool {
        self.parked.load(Ordering::SeqCst)
    }

    /// Allow ticks to send again after [`park`](Self::park).
    pub fn resume(&self) {
        let _guard = sync::lock(&self.last_sent);
        if self.parked.swap(false, Ordering::SeqCst) {
            info!("Command scheduler resumed");
        }
    }

    pub fn tick(&self) -> TickOutcome {
        let mut last_sent = sync::lock(&self.last_sent);
        if self.is_parked() {
            return TickOutcome::Parked;
        }

        let (state, generation) = self.link.status();
        last_sent.sync_generation(generation);
        if state != LinkState::Connected {
            if state == LinkState::Disconnected {
                last_sent.clear();
            }
            return TickOutcome::Skipped(state);
        }

        let threshold = self.settings.threshold().unsigned_abs();
        let changed: Vec<(SegmentId, i32)> = self
            .board
            .snapshot()
            .into_iter()
            .enumerate()
            .filter_map(|(index, percent)| {
                let segment = SegmentId(index);
                let angle = self.ranges.get(segment).device_angle(percent?);
                match last_sent.angles.get(index).copied().flatten() {
                    Some(previous) if angle.abs_diff(previous) < threshold => None,
                    _ => Some((segment, angle)),
                }
            })
            .collect();

        if changed.is_empty() {
            return TickOutcome::Unchanged;
        }

        match self.link.send_frame(&changed) {
            SendOutcome::Sent => {
                for &(segment, angle) in &changed {
                    if let Some(slot) = last_sent.angles.get_mut(segment.index()) {
                        *slot = Some(angle);
                    }
                }
                TickOutcome::Sent(changed.len())
            }
            // Link dropped between the state check and the write.
            SendOutcome::Dropped => TickOutcome::Skipped(self.link.state()),
            SendOutcome::Failed => {
                last_sent.clear();
                TickOutcome::Failed
            }
        }
    }

    /// Send every segment to its fully-open (0 %) angle, ignoring the
    /// threshold, then stop sending until [`resume`](Self::resume).
    pub fn park(&self) -> SendOutcome {
        let mut last_sent = sync::lock(&self.last_sent);
        self.parked.store(true, Ordering::SeqCst);
        last_sent.sync_generation(self.link.generation());

        let pairs: Vec<(SegmentId, i32)> = (0..last_sent.angles.len())
            .map(|index| {
                let segment = SegmentId(index);
                (segment, self.ranges.get(segment).device_angle(0.0))
            })
            .collect();

        let outcome = self.link.send_frame(&pairs);
        match outcome {
            SendOutcome::Sent => {
                for (slot, &(_, angle)) in last_sent.angles.iter_mut().zip(&pairs) {
                    *slot = Some(angle);
                }
                info!("Parked {} segments at open position", pairs.len());
            }
            SendOutcome::Dropped => warn!("Park skipped, link is {}", self.link.state()),
            SendOutcome::Failed => last_sent.clear(),
        }
        outcome
    }
}

/// Handle to the scheduler thread.
pub struct SchedulerHandle {
    scheduler: Arc<CommandScheduler>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Spawn the tick loop. When `reconnect` is set the loop re-opens the
    /// link whenever it observes it `Disconnected`.
    pub fn spawn(scheduler: Arc<CommandScheduler>, reconnect: bool) -> std::io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));

        let scheduler_clone = Arc::clone(&scheduler);
        let shutdown_clone = Arc::clone(&shutdown);

        let join_handle = thread::Builder::new()
            .name("command-scheduler".to_string())
            .spawn(move || run_scheduler_loop(&scheduler_clone, &shutdown_clone, reconnect))?;

        info!("Command scheduler started");
        Ok(Self {
            scheduler,
            shutdown,
            join_handle: Some(join_handle),
        })
    }

    pub fn scheduler(&self) -> &Arc<CommandScheduler> {
        &self.scheduler
    }

    /// Stop ticking and send every segment to its open angle once.
    pub fn park(&self) -> SendOutcome {
        self.scheduler.park()
    }

    /// Resume ticking after [`park`](Self::park).
    pub fn resume(&self) {
        self.scheduler.resume();
    }

    pub fn is_running(&self) -> bool {
        !self.scheduler.is_parked()
            && self
                .join_handle
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    /// Signal shutdown and wait for the loop to exit.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.join_handle.take() {
            if handle.join().is_err() {
                error!("Command scheduler thread panicked");
            }
            info!("Command scheduler stopped");
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.halt();
    }
}

fn run_scheduler_loop(scheduler: &CommandScheduler, shutdown: &AtomicBool, reconnect: bool) {
    while !shutdown.load(Ordering::SeqCst) {
        if scheduler.is_parked() {
            sleep_unless(shutdown, PARKED_POLL);
            continue;
        }

        match scheduler.tick() {
            TickOutcome::Sent(count) => debug!("Tick sent {count} segments"),
            TickOutcome::Skipped(LinkState::Disconnected) if reconnect => {
                if let Err(e) = scheduler.link().open() {
                    error!("Failed to restart link: {e}");
                }
            }
            TickOutcome::Failed => warn!("Tick write failed, waiting for reconnect"),
            TickOutcome::Unchanged | TickOutcome::Skipped(_) | TickOutcome::Parked => {}
        }

        sleep_unless(shutdown, scheduler.settings().tick_interval());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angle_range::AngleRange;
    use crate::link::{LinkConfig, MockConnector, MockDevice};
    use crate::segment::SegmentSet;
    use std::time::Instant;

    fn connected(device: &MockDevice) -> Arc<ActuatorLink> {
        let link = Arc::new(ActuatorLink::new(
            Arc::new(MockConnector::new(device.clone())),
            LinkConfig {
                retry_interval: Duration::from_millis(5),
                settle_delay: Duration::from_millis(1),
                handshake: b"HELLO\n".to_vec(),
            },
        ));
        link.open().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !link.is_connected() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(link.is_connected());
        device.clear();
        link
    }

    fn scheduler(link: Arc<ActuatorLink>, threshold: i32) -> (CommandScheduler, Arc<PercentBoard>) {
        let segments = Arc::new(SegmentSet::hand());
        let board = Arc::new(PercentBoard::new(segments.len()));
        let ranges = Arc::new(AngleRangeMap::with_defaults(segments));
        let settings = Arc::new(SchedulerSettings::new(threshold, DEFAULT_TICK_MS));
        (
            CommandScheduler::new(Arc::clone(&board), ranges, link, settings),
            board,
        )
    }

    #[test]
    fn test_first_tick_sends_known_segments() {
        let device = MockDevice::new();
        let (scheduler, board) = scheduler(connected(&device), 7);

        board.publish(SegmentId(0), 50.0);
        board.publish(SegmentId(2), 87.5);
        assert_eq!(scheduler.tick(), TickOutcome::Sent(2));
        assert_eq!(device.lines(), vec!["0:120,2:75\n"]);
        assert_eq!(
            scheduler.last_sent(),
            vec![Some(120), None, Some(75), None, None]
        );
    }

    #[test]
    fn test_no_change_no_transmission() {
        let device = MockDevice::new();
        let (scheduler, board) = scheduler(connected(&device), 7);

        board.publish(SegmentId(1), 0.0);
        assert_eq!(scheduler.tick(), TickOutcome::Sent(1));
        assert_eq!(scheduler.tick(), TickOutcome::Unchanged);
        assert_eq!(device.lines().len(), 1);
    }

    #[test]
    fn test_tick_skipped_while_disconnected() {
        let device = MockDevice::new();
        let link = Arc::new(ActuatorLink::new(
            Arc::new(MockConnector::new(device.clone())),
            LinkConfig::default(),
        ));
        let (scheduler, board) = scheduler(link, 7);

        board.publish(SegmentId(0), 10.0);
        assert_eq!(
            scheduler.tick(),
            TickOutcome::Skipped(LinkState::Disconnected)
        );
        assert_eq!(scheduler.last_sent(), vec![None; 5]);
        assert_eq!(device.output(), "");
    }

    #[test]
    fn test_write_failure_clears_last_sent() {
        let device = MockDevice::new();
        let (scheduler, board) = scheduler(connected(&device), 7);

        board.publish(SegmentId(0), 0.0);
        assert_eq!(scheduler.tick(), TickOutcome::Sent(1));

        device.set_fail_writes(true);
        board.publish(SegmentId(0), 100.0);
        assert_eq!(scheduler.tick(), TickOutcome::Failed);
        assert_eq!(scheduler.last_sent(), vec![None; 5]);
        assert_eq!(scheduler.link().state(), LinkState::Disconnected);
    }

    #[test]
    fn test_reconnect_between_ticks_resends() {
        let device = MockDevice::new();
        let link = connected(&device);
        let (scheduler, board) = scheduler(Arc::clone(&link), 7);

        board.publish(SegmentId(0), 0.0);
        assert_eq!(scheduler.tick(), TickOutcome::Sent(1));

        link.close();
        link.open().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !link.is_connected() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(link.is_connected());
        device.clear();

        assert_eq!(scheduler.tick(), TickOutcome::Sent(1));
        assert_eq!(device.lines(), vec!["0:180\n"]);
    }

    #[test]
    fn test_extreme_range_does_not_overflow() {
        let device = MockDevice::new();
        let link = connected(&device);
        let segments = Arc::new(SegmentSet::hand());
        let board = Arc::new(PercentBoard::new(segments.len()));
        let ranges = Arc::new(AngleRangeMap::with_defaults(segments));
        ranges.set(SegmentId(0), AngleRange::new(i32::MAX, i32::MIN));
        let scheduler = CommandScheduler::new(
            Arc::clone(&board),
            ranges,
            link,
            Arc::new(SchedulerSettings::default()),
        );

        board.publish(SegmentId(0), 0.0);
        assert_eq!(scheduler.tick(), TickOutcome::Sent(1));
        board.publish(SegmentId(0), 100.0);
        assert_eq!(scheduler.tick(), TickOutcome::Sent(1));
        assert_eq!(
            scheduler.last_sent(),
            vec![Some(i32::MIN), None, None, None, None]
        );
    }

    #[test]
    fn test_park_sends_open_angles() {
        let device = MockDevice::new();
        let link = connected(&device);
        let segments = Arc::new(SegmentSet::hand());
        let board = Arc::new(PercentBoard::new(segments.len()));
        let ranges = Arc::new(AngleRangeMap::with_defaults(segments));
        ranges.set(SegmentId(4), AngleRange::new(20, 160));
        let scheduler = CommandScheduler::new(
            board,
            ranges,
            link,
            Arc::new(SchedulerSettings::default()),
        );

        assert_eq!(scheduler.park(), SendOutcome::Sent);
        assert_eq!(device.lines(), vec!["0:180,1:180,2:180,3:180,4:20\n"]);
        assert_eq!(
            scheduler.last_sent(),
            vec![Some(180), Some(180), Some(180), Some(180), Some(20)]
        );
        assert_eq!(scheduler.tick(), TickOutcome::Parked);

        scheduler.resume();
        assert!(!scheduler.is_parked());
        assert_eq!(scheduler.tick(), TickOutcome::Unchanged);
    }

    #[test]
    fn test_settings_clamp() {
        let settings = SchedulerSettings::new(-3, 0);
        assert_eq!(settings.threshold(), 0);
        assert_eq!(settings.tick_interval(), Duration::from_millis(1));
        settings.set_threshold(12);
        settings.set_tick_ms(100);
        assert_eq!(settings.threshold(), 12);
        assert_eq!(settings.tick_ms(), 100);
    }
}
