//! Scripted in-memory device for exercising [`ActuatorLink`](super::ActuatorLink)
//! without hardware.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{Connector, LinkError, Transport};
use crate::sync;

/// Bytes received by the mock device, shared with every transport it hands out.
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    written: Arc<Mutex<Vec<u8>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&sync::lock(&self.written)).into_owned()
    }

    /// Written data split into newline-terminated lines (terminators kept).
    pub fn lines(&self) -> Vec<String> {
        self.output()
            .split_inclusive('\n')
            .map(str::to_string)
            .collect()
    }

    /// Make every subsequent write fail with `BrokenPipe`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        sync::lock(&self.written).clear();
    }
}

struct MockTransport {
    device: MockDevice,
}

impl Write for MockTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.device.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock device unplugged"));
        }
        sync::lock(&self.device.written).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Connector that fails a scripted number of times before succeeding.
#[derive(Debug, Default)]
pub struct MockConnector {
    device: MockDevice,
    remaining_failures: AtomicUsize,
    attempts: AtomicUsize,
}

impl MockConnector {
    /// Connector that succeeds on the first attempt.
    pub fn new(device: MockDevice) -> Self {
        Self::failing(device, 0)
    }

    /// Connector whose first `failures` attempts fail.
    pub fn failing(device: MockDevice, failures: usize) -> Self {
        Self {
            device,
            remaining_failures: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Fail the next `failures` attempts (e.g. device unplugged again).
    pub fn fail_next(&self, failures: usize) {
        self.remaining_failures.store(failures, Ordering::SeqCst);
    }

    /// Number of connection attempts made so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn device(&self) -> &MockDevice {
        &self.device
    }
}

impl Connector for MockConnector {
    fn describe(&self) -> String {
        "mock device".to_string()
    }

    fn connect(&self) -> Result<Box<dyn Transport>, LinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let failing = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(LinkError::Open {
                target: self.describe(),
                reason: "no such device".to_string(),
            });
        }

        Ok(Box::new(MockTransport {
            device: self.device.clone(),
        }))
    }
}
