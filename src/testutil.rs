//! Test support: a scripted in-memory adapter speaking the ELM327 dialect.

use crate::transport::Transport;
use crate::Elm327;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// In-memory mock adapter.
///
/// Bytes written to it accumulate until a carriage return, then the command
/// is handed to the response closure and its reply queued for reading. A
/// drained read buffer reads as `Ok(0)`, the transport's timeout convention.
/// Every command is recorded for later assertions.
pub(crate) struct MockAdapter {
    respond: Box<dyn FnMut(&str) -> String + Send>,
    inbox: Vec<u8>,
    outbox: VecDeque<u8>,
    log: Arc<Mutex<Vec<String>>>,
}

impl MockAdapter {
    pub(crate) fn new(respond: impl FnMut(&str) -> String + Send + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            inbox: Vec::new(),
            outbox: VecDeque::new(),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle on the command log, to keep after the adapter moves into the
    /// driver.
    pub(crate) fn log_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.log)
    }
}

impl Transport for MockAdapter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &byte in buf {
            if byte == b'\r' {
                let command = String::from_utf8_lossy(&self.inbox).trim().to_string();
                self.inbox.clear();
                if command.is_empty() {
                    continue;
                }
                self.log.lock().unwrap().push(command.clone());
                let reply = (self.respond)(&command);
                self.outbox.extend(reply.bytes());
            } else {
                self.inbox.push(byte);
            }
        }
        Ok(buf.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.outbox.len());
        for slot in &mut buf[..n] {
            *slot = self.outbox.pop_front().unwrap();
        }
        Ok(n)
    }

    fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }
}

/// Canned replies of a well-behaved adapter for the init handshake,
/// reporting `protocol_digit` from `ATDPN`. Returns `None` for anything
/// that is not a handshake or header command.
pub(crate) fn handshake(command: &str, protocol_digit: char) -> Option<String> {
    match command {
        "ATZ" => Some("\r\rELM327 v1.5\r\r>".to_string()),
        "ATE0" | "ATH1" | "ATSP0" => Some("OK\r\r>".to_string()),
        "0100" => Some("SEARCHING...\r41 00 BE 3F A8 13\r\r>".to_string()),
        "ATDPN" => Some(format!("A{protocol_digit}\r\r>")),
        c if c.starts_with("ATSH") => Some("OK\r\r>".to_string()),
        _ => None,
    }
}

/// Pump the driver's event loop until `done` holds, panicking after a
/// generous deadline.
pub(crate) fn pump_until(
    driver: &mut Elm327,
    what: &str,
    mut done: impl FnMut(&Elm327) -> bool,
) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done(driver) {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        driver.wait_dispatch(Duration::from_millis(10));
    }
}
