//! Protocol-driver contract
//!
//! The boundary between the multiplexing core and the wire protocol
//! implementation. A driver opens non-blocking sessions; the core advances
//! each session's connect/reset handshake and pushes requests through it
//! one at a time, entirely via these poll-style calls. None of the methods
//! may block: each reports what it could do with the bytes currently
//! buffered, and the core re-registers readiness interest accordingly.

use crate::error::Result;
use crate::types::{ResultSet, Value};

/// Outcome of advancing a connect or reset handshake one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePoll {
    /// Waiting for the socket to become readable
    NeedRead,
    /// Waiting for the socket to become writable
    NeedWrite,
    /// Handshake finished; the session is usable
    Complete,
    /// Handshake failed terminally; see [`Session::last_error`]
    Failed,
}

/// Outcome of flushing buffered outbound bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPoll {
    /// The outbound buffer is empty
    Drained,
    /// Bytes remain; flush again on the next write-readiness
    Pending,
    /// The driver rejected the flush; see [`Session::last_error`]
    Failed,
}

/// One non-blocking protocol session (one socket to the server)
///
/// Owned exclusively by a single pool connection. The core calls
/// `poll_connect`/`poll_reset` while a handshake is running and the
/// send/flush/consume/result group only once the handshake completed.
pub trait Session {
    /// Advance the connect handshake one step
    fn poll_connect(&mut self) -> HandshakePoll;

    /// Begin the reset handshake on an established session
    ///
    /// Returns false if the reset could not even start (the core then falls
    /// back to a full reconnect).
    fn start_reset(&mut self) -> bool;

    /// Advance the reset handshake one step
    fn poll_reset(&mut self) -> HandshakePoll;

    /// Whether a previously sent request's result is still incomplete
    fn is_busy(&self) -> bool;

    /// Queue a request on the wire
    ///
    /// Returns false on a protocol-level rejection.
    fn send(&mut self, command: &str, params: &[Value]) -> bool;

    /// Flush buffered outbound bytes
    fn flush(&mut self) -> FlushPoll;

    /// Feed newly arrived bytes into the session's input buffer
    ///
    /// Returns false on a protocol-level failure.
    fn consume_input(&mut self) -> bool;

    /// Take a fully received result, if one is available
    fn take_result(&mut self) -> Option<ResultSet>;

    /// Driver-side diagnostic text for the most recent failure
    fn last_error(&self) -> Option<String> {
        None
    }
}

/// Opens protocol sessions toward one target
pub trait Driver {
    /// Begin an asynchronous connect toward `target`
    ///
    /// The returned session is mid-handshake; the core drives it to
    /// completion with [`Session::poll_connect`]. An error here means the
    /// attempt could not even start (bad target, out of descriptors); the
    /// pool schedules a retry.
    fn start_connect(&self, target: &str) -> Result<Box<dyn Session>>;
}
