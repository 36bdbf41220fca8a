//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use servohand::link::{MockConnector, MockDevice};
use servohand::{ActuatorLink, LinkConfig, LinkState, Point2};

/// Link timings short enough for tests.
pub fn fast_link_config() -> LinkConfig {
    LinkConfig {
        retry_interval: Duration::from_millis(10),
        settle_delay: Duration::from_millis(5),
        handshake: b"HELLO\n".to_vec(),
    }
}

/// Poll `condition` until it holds or five seconds pass.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Open a link to a fresh mock device and wait until it is connected. The
/// handshake is cleared from the device before returning.
pub fn connected_link() -> (Arc<ActuatorLink>, Arc<MockConnector>, MockDevice) {
    let device = MockDevice::new();
    let connector = Arc::new(MockConnector::new(device.clone()));
    let link = Arc::new(ActuatorLink::new(connector.clone(), fast_link_config()));
    link.open().expect("spawn retry thread");
    assert!(wait_until(|| link.state() == LinkState::Connected));
    device.clear();
    (link, connector, device)
}

/// 21-point hand with every finger bent to `degrees` at its middle joint.
pub fn hand_at(degrees: f64) -> Vec<Point2> {
    let mut points = vec![Point2::new(0.0, 0.0); 21];
    let rad = degrees.to_radians();
    for (joint, distal) in [(2, 4), (6, 8), (10, 12), (14, 16), (18, 20)] {
        points[joint] = Point2::new(1.0, 0.0);
        points[distal] = Point2::new(1.0 - rad.cos(), rad.sin());
    }
    points
}
