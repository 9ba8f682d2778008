//! OBD-II diagnostics through ELM327-family adapters.
//!
//! The adapter exposes the vehicle bus behind a line-oriented AT command
//! dialect over any duplex byte stream — a USB serial cable or a TCP socket
//! dongle. [`Elm327`] drives that dialect: it runs the configuration
//! handshake, keeps a dedicated worker thread draining a FIFO command queue,
//! and decodes the hex-text replies into per-ECU payloads. The thread owning
//! the driver stays event-driven throughout; it pumps
//! [`dispatch`](Elm327::dispatch) and all callbacks run there.
//!
//! ```no_run
//! use elm_diag::Elm327;
//! use std::time::Duration;
//!
//! let port = serialport::new("/dev/ttyUSB0", 38_400)
//!     .timeout(Duration::from_millis(1000))
//!     .open()
//!     .expect("open adapter port");
//!
//! let mut driver = Elm327::new();
//! driver
//!     .signal_init_complete()
//!     .connect(|&ok| println!("adapter ready: {ok}"));
//! driver.signal_command_complete().connect(|completion| {
//!     for (address, data) in &completion.responses {
//!         println!("{address:03X}: {data:02X?}");
//!     }
//! });
//!
//! driver.init(port).expect("driver was idle");
//! loop {
//!     driver.wait_dispatch(Duration::from_millis(50));
//!     if driver.is_connected() {
//!         // Engine RPM, service 01 PID 0C.
//!         driver.send_command(0x7E0, 0x01, &[0x0C]);
//!     }
//!     # break;
//! }
//! ```

pub mod constants;
mod elm327;
mod error;
mod protocol;
mod signal;
mod transport;

#[cfg(test)]
mod integration_tests;
#[cfg(test)]
mod testutil;

pub use elm327::{DriverState, Elm327};
pub use error::{DriverError, InitError};
pub use protocol::{format_command, parse_reply, set_header_command, Command, Completion, Protocol};
pub use signal::{Signal, SlotId};
pub use transport::Transport;
