//! Landmarks in, frames out.

mod common;

use std::sync::Arc;

use common::{connected_link, hand_at};
use servohand::{
    AngleRangeMap, CalibrationStore, CommandScheduler, GestureTable, HandTracker, PercentBoard,
    SchedulerSettings, SegmentId, SegmentSet, TickOutcome,
};

fn calibrated_store() -> Arc<CalibrationStore> {
    let store = Arc::new(CalibrationStore::new(Arc::new(SegmentSet::hand())));
    for id in store.segments().ids() {
        store.set_point(id, 0.0, 170.0).unwrap();
        store.set_point(id, 100.0, 50.0).unwrap();
    }
    store
}

#[test]
fn test_landmarks_drive_device_angles() {
    let (link, _connector, device) = connected_link();
    let store = calibrated_store();
    let segments = Arc::clone(store.segments());
    let board = Arc::new(PercentBoard::new(segments.len()));
    let tracker = HandTracker::new(store, 0.0, Arc::clone(&board));
    let scheduler = CommandScheduler::new(
        board,
        Arc::new(AngleRangeMap::with_defaults(segments)),
        link,
        Arc::new(SchedulerSettings::default()),
    );

    // 110° is halfway between the calibrated 170° (0 %) and 50° (100 %).
    tracker.observe(Some(&hand_at(110.0)));
    assert_eq!(scheduler.tick(), TickOutcome::Sent(5));
    assert_eq!(device.lines(), vec!["0:120,1:120,2:120,3:120,4:120\n"]);

    // Hand lost for a while: nothing changes, nothing is sent.
    tracker.observe(None);
    tracker.observe(Some(&[]));
    assert_eq!(scheduler.tick(), TickOutcome::Unchanged);

    // Fully closed.
    tracker.observe(Some(&hand_at(50.0)));
    assert_eq!(scheduler.tick(), TickOutcome::Sent(5));
    assert_eq!(device.lines()[1], "0:60,1:60,2:60,3:60,4:60\n");
}

#[test]
fn test_smoothing_converges_without_overshoot() {
    let store = calibrated_store();
    let board = Arc::new(PercentBoard::new(store.segments().len()));
    let tracker = HandTracker::new(store, 0.5, Arc::clone(&board));

    tracker.observe(Some(&hand_at(170.0)));
    let mut previous = board.get(SegmentId(3)).unwrap();
    for _ in 0..20 {
        tracker.observe(Some(&hand_at(50.0)));
        let current = board.get(SegmentId(3)).unwrap();
        assert!(current >= previous);
        assert!(current <= 100.0 + 1e-9);
        previous = current;
    }
    assert!(previous > 99.9);
}

#[test]
fn test_gesture_bypasses_estimation() {
    let (link, _connector, device) = connected_link();
    let segments = Arc::new(SegmentSet::hand());
    let board = Arc::new(PercentBoard::new(segments.len()));
    let scheduler = CommandScheduler::new(
        Arc::clone(&board),
        Arc::new(AngleRangeMap::with_defaults(segments)),
        link,
        Arc::new(SchedulerSettings::default()),
    );

    let gestures = GestureTable::builtin();
    board.publish_all(gestures.resolve("Index Finger Extension").unwrap());
    assert_eq!(scheduler.tick(), TickOutcome::Sent(5));
    assert_eq!(device.lines(), vec!["0:156,1:60,2:156,3:156,4:156\n"]);
}
