//! End-to-end driver scenarios against the scripted mock adapter.
//!
//! These exercise the public surface the way an embedding application would:
//! register signal observers, kick off the session, pump the event loop.

use crate::testutil::{handshake, pump_until, MockAdapter};
use crate::{parse_reply, DriverState, Elm327};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

#[test]
fn test_init_success_detects_can_protocol() {
    let adapter = MockAdapter::new(|command| {
        handshake(command, '6').unwrap_or_else(|| "NO DATA\r\r>".to_string())
    });
    let log = adapter.log_handle();

    let mut driver = Elm327::new();
    let outcome = Rc::new(RefCell::new(None));
    let seen = Rc::clone(&outcome);
    driver
        .signal_init_complete()
        .connect(move |&ok| *seen.borrow_mut() = Some(ok));

    driver.init(adapter).unwrap();
    assert!(driver.is_connecting());
    assert!(!driver.is_connected());

    pump_until(&mut driver, "init completion", |d| d.is_connected());

    assert_eq!(*outcome.borrow(), Some(true));
    assert_eq!(driver.state(), DriverState::Ready);
    assert!(driver.is_can());
    assert_eq!(driver.protocol().map(|p| p.number()), Some(6));
    assert!(driver.get_error_string().is_empty());

    // The handshake runs strictly in order.
    assert_eq!(
        *log.lock().unwrap(),
        vec!["ATZ", "ATE0", "ATH1", "ATSP0", "0100", "ATDPN"]
    );
}

#[test]
fn test_init_fails_closed_when_adapter_is_silent() {
    let adapter = MockAdapter::new(|_| String::new());
    let log = adapter.log_handle();

    let mut driver = Elm327::new();
    let outcome = Rc::new(RefCell::new(None));
    let seen = Rc::clone(&outcome);
    driver
        .signal_init_complete()
        .connect(move |&ok| *seen.borrow_mut() = Some(ok));

    driver.init(adapter).unwrap();
    pump_until(&mut driver, "init failure", |d| !d.is_connecting());

    assert_eq!(*outcome.borrow(), Some(false));
    assert_eq!(driver.state(), DriverState::Idle);
    assert!(!driver.is_connected());
    assert!(!driver.get_error_string().is_empty());

    // The failed reset aborts the remaining steps.
    assert_eq!(*log.lock().unwrap(), vec!["ATZ"]);
}

#[test]
fn test_init_fails_when_configuration_step_rejected() {
    let adapter = MockAdapter::new(|command| match command {
        "ATZ" => "\r\rELM327 v1.5\r\r>".to_string(),
        _ => "?\r\r>".to_string(),
    });

    let mut driver = Elm327::new();
    driver.init(adapter).unwrap();
    pump_until(&mut driver, "init failure", |d| !d.is_connecting());

    assert!(!driver.is_connected());
    assert!(driver.get_error_string().contains("ATE0"));
}

#[test]
fn test_completions_delivered_in_fifo_order() {
    let adapter = MockAdapter::new(|command| {
        handshake(command, '6').unwrap_or_else(|| {
            // Echo the request's data byte back as the payload tag.
            format!("7 41 {}\r\r>", &command[2..])
        })
    });

    let mut driver = Elm327::new();
    let order = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&order);
    driver.signal_command_complete().connect(move |completion| {
        seen.borrow_mut().push(completion.responses[&0x7][1]);
    });

    driver.init(adapter).unwrap();
    pump_until(&mut driver, "session ready", |d| d.is_connected());

    // Tags start at 1 so no request collides with the 0100 init probe.
    for tag in 1..=10u8 {
        driver.send_command(0x7E0, 0x01, &[tag]);
    }
    pump_until(&mut driver, "all completions", |_| order.borrow().len() == 10);

    assert_eq!(*order.borrow(), (1..=10).collect::<Vec<u8>>());
}

#[test]
fn test_header_reprogrammed_only_on_address_change() {
    let adapter = MockAdapter::new(|command| {
        handshake(command, '6').unwrap_or_else(|| "7 41 00 AA\r\r>".to_string())
    });
    let log = adapter.log_handle();

    let mut driver = Elm327::new();
    let count = Rc::new(RefCell::new(0));
    let seen = Rc::clone(&count);
    driver
        .signal_command_complete()
        .connect(move |_| *seen.borrow_mut() += 1);

    driver.init(adapter).unwrap();
    pump_until(&mut driver, "session ready", |d| d.is_connected());

    driver.send_command(0x7E0, 0x01, &[0x0C]);
    driver.send_command(0x7E8, 0x01, &[0x0C]);
    driver.send_command(0x7E0, 0x01, &[0x0C]);
    pump_until(&mut driver, "three completions", |_| *count.borrow() == 3);

    // No header set for the default target, one per switch afterwards.
    let headers: Vec<String> = log
        .lock()
        .unwrap()
        .iter()
        .filter(|c| c.starts_with("ATSH"))
        .cloned()
        .collect();
    assert_eq!(headers, vec!["ATSH0007E8", "ATSH0007E0"]);
}

#[test]
fn test_broadcast_reply_fans_out_per_ecu() {
    let adapter = MockAdapter::new(|command| {
        handshake(command, '3').unwrap_or_else(|| {
            "7E8 41 05 3C\r7E9 41 05 3E\r\r>".to_string()
        })
    });

    let mut driver = Elm327::new();
    let result = Rc::new(RefCell::new(None));
    let seen = Rc::clone(&result);
    driver
        .signal_command_complete()
        .connect(move |completion| *seen.borrow_mut() = Some(completion.clone()));

    driver.init(adapter).unwrap();
    pump_until(&mut driver, "session ready", |d| d.is_connected());
    assert!(!driver.is_can());

    driver.send_command(0x7E0, 0x01, &[0x05]);
    pump_until(&mut driver, "broadcast completion", |_| result.borrow().is_some());

    let completion = result.borrow().clone().unwrap();
    assert_eq!(completion.responses.len(), 2);
    assert_eq!(completion.responses[&0x7E8], vec![0x41, 0x05, 0x3C]);
    assert_eq!(completion.responses[&0x7E9], vec![0x41, 0x05, 0x3E]);
}

#[test]
fn test_disconnect_then_send_is_a_no_op() {
    let adapter = MockAdapter::new(|command| {
        handshake(command, '6').unwrap_or_else(|| "7 41 00 AA\r\r>".to_string())
    });

    let mut driver = Elm327::new();
    let done = Rc::new(RefCell::new(false));
    let seen = Rc::clone(&done);
    driver
        .signal_disconnect()
        .connect(move |_| *seen.borrow_mut() = true);
    let completions = Rc::new(RefCell::new(0));
    let seen = Rc::clone(&completions);
    driver
        .signal_command_complete()
        .connect(move |_| *seen.borrow_mut() += 1);

    driver.init(adapter).unwrap();
    pump_until(&mut driver, "session ready", |d| d.is_connected());

    driver.disconnect().unwrap();
    pump_until(&mut driver, "disconnect completion", |_| *done.borrow());
    assert!(!driver.is_connected());
    assert_eq!(driver.state(), DriverState::Idle);

    let delivered = *completions.borrow();
    driver.send_command(0x7E0, 0x01, &[0x0C]);
    driver.wait_dispatch(Duration::from_millis(50));
    assert_eq!(*completions.borrow(), delivered);
    assert_eq!(driver.state(), DriverState::Idle);
}

#[test]
fn test_completion_exports_as_json() {
    let completion = parse_reply("7E8 41 0C 1A F8\r\r>", false);
    let json = serde_json::to_value(&completion).unwrap();

    assert_eq!(json["responses"]["2024"][0], 0x41);
    assert_eq!(json["responses"]["2024"][3], 0xF8);
}
