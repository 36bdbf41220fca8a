mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::{connected_link, fast_link_config, wait_until};
use servohand::link::{MockConnector, MockDevice};
use servohand::{ActuatorLink, LinkConfig, LinkState, SendOutcome};

#[test]
fn test_connects_after_three_failures() {
    let device = MockDevice::new();
    let connector = Arc::new(MockConnector::failing(device.clone(), 3));
    let link = ActuatorLink::new(connector.clone(), fast_link_config());

    link.open().unwrap();
    assert!(wait_until(|| link.state() == LinkState::Connected));

    let stats = link.stats();
    assert_eq!(connector.attempts(), 4);
    assert_eq!(stats.connect_attempts, 4);
    assert_eq!(stats.connect_failures, 3);
    assert_eq!(stats.handshakes, 1);
    assert_eq!(device.lines(), vec!["HELLO\n"]);

    // The retry thread has exited; nothing else is attempted.
    thread::sleep(Duration::from_millis(50));
    assert_eq!(connector.attempts(), 4);
    assert_eq!(device.lines(), vec!["HELLO\n"]);
}

#[test]
fn test_not_connected_before_settle_delay() {
    let device = MockDevice::new();
    let link = ActuatorLink::new(
        Arc::new(MockConnector::new(device.clone())),
        LinkConfig {
            settle_delay: Duration::from_millis(300),
            ..fast_link_config()
        },
    );

    link.open().unwrap();
    assert!(wait_until(|| device.output() == "HELLO\n"));
    assert_ne!(link.state(), LinkState::Connected);
    assert_eq!(link.send_raw("0:90\n"), SendOutcome::Dropped);

    assert!(wait_until(|| link.is_connected()));
    assert_eq!(link.send_raw("0:90\n"), SendOutcome::Sent);
}

#[test]
fn test_close_never_connected_link() {
    let connector = Arc::new(MockConnector::failing(MockDevice::new(), usize::MAX));
    let link = ActuatorLink::new(
        connector.clone(),
        LinkConfig {
            retry_interval: Duration::from_secs(30),
            ..fast_link_config()
        },
    );

    link.open().unwrap();
    assert!(wait_until(|| link.state() == LinkState::Failed));

    let started = Instant::now();
    link.close();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(link.state(), LinkState::Disconnected);
    assert_eq!(connector.attempts(), 1);

    link.close();
    assert_eq!(link.state(), LinkState::Disconnected);
}

#[test]
fn test_open_is_noop_while_connected() {
    let (link, connector, device) = connected_link();
    link.open().unwrap();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(connector.attempts(), 1);
    assert_eq!(device.output(), "");
    assert!(link.is_connected());
}

#[test]
fn test_reopen_after_write_failure() {
    let (link, connector, device) = connected_link();

    device.set_fail_writes(true);
    assert_eq!(link.send_raw("1:60\n"), SendOutcome::Failed);
    assert_eq!(link.state(), LinkState::Disconnected);

    device.set_fail_writes(false);
    link.open().unwrap();
    assert!(wait_until(|| link.is_connected()));
    assert_eq!(connector.attempts(), 2);
    assert_eq!(link.stats().handshakes, 2);
    assert_eq!(device.lines(), vec!["HELLO\n"]);
}

#[test]
fn test_close_releases_transport() {
    let (link, _connector, device) = connected_link();
    link.close();
    assert_eq!(link.state(), LinkState::Disconnected);
    assert_eq!(link.send_raw("0:90\n"), SendOutcome::Dropped);
    assert_eq!(device.output(), "");
}
