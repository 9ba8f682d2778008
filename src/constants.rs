//! Centralized constants for ELM327 adapter communication.

use std::time::Duration;

// ============================================================================
// AT COMMANDS
// ============================================================================

/// ELM327 configuration commands, sent during the init handshake.
pub mod at {
    /// Full chip reset; replies with the version banner.
    pub const RESET: &str = "ATZ";

    /// Disable command echo so replies carry data only.
    pub const ECHO_OFF: &str = "ATE0";

    /// Include ECU response headers in replies.
    pub const HEADERS_ON: &str = "ATH1";

    /// Let the adapter auto-negotiate the bus protocol.
    pub const PROTOCOL_AUTO: &str = "ATSP0";

    /// Report the negotiated protocol number.
    pub const DESCRIBE_PROTOCOL: &str = "ATDPN";

    /// Program the request header; followed by 6 zero-padded hex digits.
    pub const SET_HEADER: &str = "ATSH";
}

// ============================================================================
// OBD ADDRESSES AND PROBES
// ============================================================================

pub mod obd {
    /// Broadcast "supported PIDs" query (service 01, PID 00), used to force
    /// the adapter through protocol negotiation.
    pub const SUPPORTED_PIDS_PROBE: &str = "0100";

    /// Standard engine ECU request address; the adapter's assumed power-on
    /// target, so the header cache is seeded with it.
    pub const DEFAULT_REQUEST_ADDRESS: u32 = 0x7E0;
}

// ============================================================================
// REPLY GRAMMAR
// ============================================================================

/// Prompt character marking the end of a reply.
pub const PROMPT: char = '>';

/// Frame separator inside a reply and command terminator on the wire.
pub const TERMINATOR: char = '\r';

/// Response header width in hex digits for CAN protocols.
pub const CAN_HEADER_DIGITS: usize = 1;

/// Response header width in hex digits for legacy (ISO 9141 / KWP) protocols.
pub const LEGACY_HEADER_DIGITS: usize = 3;

// ============================================================================
// PROTOCOL NUMBERS
// ============================================================================

pub mod proto {
    /// Lowest protocol number the adapter can report.
    pub const MIN: u8 = 1;

    /// Highest protocol number the adapter can report.
    pub const MAX: u8 = 15;

    /// Protocol numbers at or above this are CAN-based.
    pub const CAN_MIN: u8 = 6;
}

// ============================================================================
// TIMING
// ============================================================================

pub mod timing {
    use super::Duration;

    /// Read timeout for the AT configuration steps.
    pub const SETUP_READ_TIMEOUT: Duration = Duration::from_millis(1000);

    /// Read timeout while the adapter scans for a protocol; negotiation on a
    /// quiet bus can take several seconds.
    pub const SCAN_READ_TIMEOUT: Duration = Duration::from_millis(10_000);

    /// Steady-state read timeout for data requests.
    pub const COMMAND_READ_TIMEOUT: Duration = Duration::from_millis(1000);
}

/// Transport read chunk size; replies are a few dozen bytes at most.
pub const READ_CHUNK: usize = 256;
