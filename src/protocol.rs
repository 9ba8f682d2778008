//! ELM327 wire grammar.
//!
//! Requests are hex text terminated by a carriage return. Replies are one
//! line per response frame: a response header (1 hex digit on CAN
//! protocols, 3 on legacy protocols) followed by the payload as hex digit
//! pairs, each line closed by `\r` and the whole reply by the `>` prompt.
//! Adapters differ on whether they space the hex pairs, so decoding is
//! digit-pair oriented rather than whitespace oriented.

use crate::constants::{at, proto, CAN_HEADER_DIGITS, LEGACY_HEADER_DIGITS, PROMPT, TERMINATOR};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One outbound OBD request.
///
/// Created by `send_command`, immutable once enqueued, and consumed exactly
/// once by the worker thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Target ECU request address, programmed via `ATSH` when it changes.
    pub address: u32,
    /// OBD service (mode) byte.
    pub service: u8,
    /// Service parameter bytes, up to one frame's worth.
    pub data: Vec<u8>,
}

/// Per-ECU response payloads decoded from one adapter reply.
///
/// A broadcast query can be answered by several ECUs at once; each response
/// header gets its own entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub responses: HashMap<u32, Vec<u8>>,
}

/// Negotiated OBD protocol number as reported by `ATDPN` (1–15).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protocol(u8);

impl Protocol {
    pub fn from_number(number: u8) -> Option<Self> {
        (proto::MIN..=proto::MAX)
            .contains(&number)
            .then_some(Self(number))
    }

    /// Parse an `ATDPN` reply. The first character is the `A` auto-search
    /// marker, the second is the protocol digit; zero means the adapter
    /// never settled on a protocol.
    pub fn from_dpn_reply(reply: &str) -> Option<Self> {
        if reply.len() < 2 || !reply.contains(PROMPT) {
            return None;
        }
        let digit = reply.chars().nth(1)?.to_digit(16)? as u8;
        Self::from_number(digit)
    }

    pub fn number(self) -> u8 {
        self.0
    }

    /// CAN-based protocols use the short 1-digit response header.
    pub fn is_can(self) -> bool {
        self.0 >= proto::CAN_MIN
    }

    pub fn description(self) -> &'static str {
        match self.0 {
            1 => "SAE J1850 PWM",
            2 => "SAE J1850 VPW",
            3 => "ISO 9141-2",
            4 => "ISO 14230-4 KWP (5 baud init)",
            5 => "ISO 14230-4 KWP (fast init)",
            6 => "ISO 15765-4 CAN (11 bit ID, 500 kbaud)",
            7 => "ISO 15765-4 CAN (29 bit ID, 500 kbaud)",
            8 => "ISO 15765-4 CAN (11 bit ID, 250 kbaud)",
            9 => "ISO 15765-4 CAN (29 bit ID, 250 kbaud)",
            10 => "SAE J1939 CAN (29 bit ID, 250 kbaud)",
            _ => "user-defined CAN",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.number(), self.description())
    }
}

/// Format a [`Command`] as its wire string: service byte then each data byte
/// as two hex digits, terminated by a carriage return.
pub fn format_command(command: &Command) -> String {
    let mut wire = format!("{:02X}", command.service);
    for byte in &command.data {
        wire.push_str(&format!("{byte:02X}"));
    }
    wire.push(TERMINATOR);
    wire
}

/// Build the `ATSH` command programming `address` as the request header,
/// zero-padded to 6 hex digits.
pub fn set_header_command(address: u32) -> String {
    format!("{}{:06X}\r", at::SET_HEADER, address)
}

/// Decode one adapter reply into a [`Completion`].
///
/// Frames are read until the `>` prompt or the end of input. A terminator
/// where a header was expected is the adapter's error marker and stops
/// parsing, as does any non-hex token or a dangling half pair; whatever was
/// decoded up to that point is still delivered.
pub fn parse_reply(reply: &str, can: bool) -> Completion {
    let width = if can {
        CAN_HEADER_DIGITS
    } else {
        LEGACY_HEADER_DIGITS
    };
    let mut responses: HashMap<u32, Vec<u8>> = HashMap::new();
    let mut chars = reply.chars();

    loop {
        // Response header.
        let mut header = 0u32;
        let mut digits = 0usize;
        while digits < width {
            match chars.next() {
                Some(c) if c == PROMPT || c == TERMINATOR => return Completion { responses },
                Some(c) => {
                    if let Some(d) = c.to_digit(16) {
                        header = (header << 4) | d;
                        digits += 1;
                    } else if !c.is_whitespace() {
                        return Completion { responses };
                    }
                }
                None => return Completion { responses },
            }
        }

        // Payload hex pairs, up to the end of the frame.
        let mut bytes: Vec<u8> = Vec::new();
        let mut pending: Option<u32> = None;
        let mut stop = false;
        loop {
            match chars.next() {
                Some(c) if c == PROMPT => {
                    stop = true;
                    break;
                }
                Some(c) if c == TERMINATOR => {
                    stop = pending.is_some();
                    break;
                }
                Some(c) => {
                    if let Some(d) = c.to_digit(16) {
                        match pending.take() {
                            Some(hi) => bytes.push(((hi << 4) | d) as u8),
                            None => pending = Some(d),
                        }
                    } else if !c.is_whitespace() {
                        stop = true;
                        break;
                    }
                }
                None => {
                    stop = true;
                    break;
                }
            }
        }

        // Lines repeating a header extend its payload.
        responses.entry(header).or_default().append(&mut bytes);
        if stop {
            return Completion { responses };
        }
    }
}
