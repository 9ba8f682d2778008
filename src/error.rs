//! Driver error types.

use std::io;
use thiserror::Error;

/// Synchronous errors returned by [`Elm327`](crate::Elm327) entry points.
///
/// Everything else the driver reports is asynchronous and arrives through the
/// completion signals.
#[derive(Debug, Error)]
pub enum DriverError {
    /// `init` or `disconnect` was called while the driver was in a state
    /// that cannot accept it. Never retried internally.
    #[error("invalid driver state: {0}")]
    InvalidState(&'static str),
}

/// Failures inside the adapter initialization handshake.
///
/// The failing step aborts the rest of the sequence; the message is what
/// [`get_error_string`](crate::Elm327::get_error_string) reports afterwards.
#[derive(Debug, Error)]
pub enum InitError {
    /// The adapter never produced a prompt for this command.
    #[error("no response to {command}")]
    NoResponse { command: &'static str },

    /// The adapter answered but did not acknowledge the command.
    #[error("{command} rejected by adapter: {reply:?}")]
    Rejected { command: &'static str, reply: String },

    /// The protocol report was missing, malformed, or zero.
    #[error("adapter reported unusable protocol: {reply:?}")]
    Protocol { reply: String },

    /// The transport disappeared before the sequence could run.
    #[error("transport is not available")]
    TransportGone,

    /// The transport rejected a timeout adjustment.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}
