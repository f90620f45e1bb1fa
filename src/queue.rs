//! Requests and the per-connection FIFO
//!
//! A request carries its command text, typed positional parameters, and a
//! completion handler invoked exactly once with the closed outcome set. The
//! queue is an owned FIFO; a request moves from `pending` to the
//! connection's live slot, never existing in both.

use std::collections::VecDeque;
use std::fmt;

use crate::error::{Error, Result};
use crate::types::{ResultSet, Value};

/// How a request ended
#[derive(Debug)]
pub enum Outcome {
    /// The server answered; here is the retrieved result
    Success(ResultSet),
    /// The request will never complete; the error says why
    Failure(Error),
}

impl Outcome {
    /// Whether the request succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Convert into a `Result`
    pub fn into_result(self) -> Result<ResultSet> {
        match self {
            Self::Success(rs) => Ok(rs),
            Self::Failure(e) => Err(e),
        }
    }
}

/// Completion handler, invoked exactly once per request
///
/// Runs on the pool thread from within a reactor pump; must not block.
/// Caller context rides in the closure's captures.
pub type Completion = Box<dyn FnOnce(Outcome)>;

/// One submitted request, owned by a queue or a live slot
pub(crate) struct Request {
    command: String,
    params: Vec<Value>,
    completion: Completion,
}

impl Request {
    pub(crate) fn new(command: String, params: Vec<Value>, completion: Completion) -> Self {
        Self {
            command,
            params,
            completion,
        }
    }

    pub(crate) fn command(&self) -> &str {
        &self.command
    }

    pub(crate) fn params(&self) -> &[Value] {
        &self.params
    }

    /// Consume the request, running its completion handler
    pub(crate) fn complete(self, outcome: Outcome) {
        (self.completion)(outcome);
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("command", &self.command)
            .field("params", &self.params.len())
            .finish()
    }
}

/// FIFO of not-yet-sent requests for one connection
#[derive(Debug, Default)]
pub(crate) struct RequestQueue {
    inner: VecDeque<Request>,
}

impl RequestQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, request: Request) {
        self.inner.push_back(request);
    }

    pub(crate) fn pop(&mut self) -> Option<Request> {
        self.inner.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drain the queue, failing every request in FIFO order
    pub(crate) fn fail_all(&mut self, error: impl Fn() -> Error) {
        while let Some(request) = self.inner.pop_front() {
            request.complete(Outcome::Failure(error()));
        }
    }
}
