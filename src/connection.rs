//! Connection lifecycle state machine and readiness dispatcher
//!
//! Each pooled connection runs `New → Connecting → Ready`, with
//! `Ready → Resetting → Ready` for re-validation and a `Broken*` detour plus
//! timer-driven retry when a handshake fails. Only `Ready` connections
//! dispatch requests: one live request at a time, strict FIFO per
//! connection. A protocol-level rejection on an established connection fails
//! that connection's requests and recycles it through the reconnect path
//! without touching its siblings.

use std::fmt;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::driver::{Driver, FlushPoll, HandshakePoll, Session};
use crate::error::{Error, Result};
use crate::queue::{Outcome, Request, RequestQueue};
use crate::reactor::{Interest, Reactor, Token};
use crate::types::ResultSet;

/// Lifecycle state of a pooled connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnState {
    /// Created, connect not yet started
    New,
    /// Connect handshake in progress
    Connecting,
    /// Reset handshake in progress
    Resetting,
    /// Established; the only state that dispatches requests
    Ready,
    /// Connect handshake failed; a reconnect is scheduled
    BrokenConnection,
    /// Reset handshake failed; a reset retry is scheduled
    BrokenReset,
}

impl ConnState {
    /// Whether requests can be dispatched in this state
    #[inline]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Whether the connection is waiting out a backoff delay
    #[inline]
    pub const fn is_broken(self) -> bool {
        matches!(self, Self::BrokenConnection | Self::BrokenReset)
    }
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::Connecting => "connecting",
            Self::Resetting => "resetting",
            Self::Ready => "ready",
            Self::BrokenConnection => "broken_connection",
            Self::BrokenReset => "broken_reset",
        };
        write!(f, "{name}")
    }
}

/// Reconnect scheduling parameters, taken from the pool config
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReconnectPolicy {
    pub delay: Duration,
    pub max_attempts: Option<u32>,
}

/// One pooled connection: session, queues, registered interest
pub(crate) struct Conn {
    token: Token,
    state: ConnState,
    session: Option<Box<dyn Session>>,
    pending: RequestQueue,
    live: Option<Request>,
    /// Last interest registered with the reactor; None = unregistered
    interest: Option<Interest>,
    timer_armed: bool,
    /// Consecutive failed handshake attempts
    attempts: u32,
}

impl Conn {
    pub(crate) fn new(token: Token) -> Self {
        Self {
            token,
            state: ConnState::New,
            session: None,
            pending: RequestQueue::new(),
            live: None,
            interest: None,
            timer_armed: false,
            attempts: 0,
        }
    }

    pub(crate) fn state(&self) -> ConnState {
        self.state
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn has_live(&self) -> bool {
        self.live.is_some()
    }

    /// No pending and no live request
    pub(crate) fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.live.is_none()
    }

    /// Begin the connect sequence through the driver
    pub(crate) fn start_connect(
        &mut self,
        driver: &dyn Driver,
        target: &str,
        reactor: &mut dyn Reactor,
        policy: ReconnectPolicy,
    ) {
        match driver.start_connect(target) {
            Ok(session) => {
                self.session = Some(session);
                self.state = ConnState::Connecting;
                trace!("conn {}: connect started", self.token.0);
                self.advance_handshake(reactor, policy);
            }
            Err(e) => {
                warn!("conn {}: connect could not start: {}", self.token.0, e);
                self.enter_broken(ConnState::BrokenConnection, reactor, policy);
            }
        }
    }

    /// Enqueue a request; wakes the dispatcher only when `Ready`
    pub(crate) fn submit(&mut self, request: Request, reactor: &mut dyn Reactor) {
        self.pending.push(request);
        if self.state.is_ready() {
            self.set_interest(reactor, Interest::READABLE | Interest::WRITABLE);
        }
    }

    /// Explicit re-validation: `Ready → Resetting`
    ///
    /// Queued requests are retained and dispatched once the reset completes.
    pub(crate) fn start_reset(
        &mut self,
        reactor: &mut dyn Reactor,
        policy: ReconnectPolicy,
    ) -> Result<()> {
        if !self.state.is_ready() {
            return Err(Error::config(format!(
                "cannot reset a connection in state {}",
                self.state
            )));
        }
        if self.live.is_some() {
            return Err(Error::config(
                "cannot reset a connection with a request in flight",
            ));
        }
        let started = match self.session.as_mut() {
            Some(session) => session.start_reset(),
            None => false,
        };
        if started {
            self.state = ConnState::Resetting;
            debug!("conn {}: reset started", self.token.0);
            self.advance_handshake(reactor, policy);
        } else {
            warn!("conn {}: reset could not start", self.token.0);
            self.enter_broken(ConnState::BrokenReset, reactor, policy);
        }
        Ok(())
    }

    /// Route a readiness event according to the current state
    pub(crate) fn handle_io(
        &mut self,
        ready: Interest,
        reactor: &mut dyn Reactor,
        policy: ReconnectPolicy,
    ) {
        match self.state {
            ConnState::Connecting | ConnState::Resetting => {
                self.advance_handshake(reactor, policy)
            }
            ConnState::Ready => self.dispatch(ready, reactor, policy),
            ConnState::New | ConnState::BrokenConnection | ConnState::BrokenReset => {
                trace!(
                    "conn {}: readiness ignored in state {}",
                    self.token.0,
                    self.state
                );
            }
        }
    }

    /// The reconnect timer fired
    pub(crate) fn handle_timer(
        &mut self,
        driver: &dyn Driver,
        target: &str,
        reactor: &mut dyn Reactor,
        policy: ReconnectPolicy,
    ) {
        self.timer_armed = false;
        match self.state {
            ConnState::BrokenReset => {
                let started = match self.session.as_mut() {
                    Some(session) => session.start_reset(),
                    None => false,
                };
                if started {
                    self.state = ConnState::Resetting;
                    debug!("conn {}: reset retry started", self.token.0);
                    self.advance_handshake(reactor, policy);
                } else {
                    // Reset cannot start any more; fall back to a full reconnect.
                    warn!("conn {}: reset retry failed, reconnecting", self.token.0);
                    self.session = None;
                    self.start_connect(driver, target, reactor, policy);
                }
            }
            ConnState::BrokenConnection => {
                debug!("conn {}: reconnect attempt", self.token.0);
                self.session = None;
                self.start_connect(driver, target, reactor, policy);
            }
            other => {
                trace!("conn {}: stray timer in state {}", self.token.0, other);
            }
        }
    }

    /// Disarm the timer and drop the registration on pool teardown
    pub(crate) fn shutdown(&mut self, reactor: &mut dyn Reactor) {
        if self.timer_armed {
            reactor.disarm_timer(self.token);
            self.timer_armed = false;
        }
        if self.interest.take().is_some() {
            reactor.deregister(self.token);
        }
    }

    /// Advance the connect/reset handshake one step and re-register interest
    fn advance_handshake(&mut self, reactor: &mut dyn Reactor, policy: ReconnectPolicy) {
        let polled = match self.state {
            ConnState::Connecting => match self.session.as_mut() {
                Some(session) => session.poll_connect(),
                None => return,
            },
            ConnState::Resetting => match self.session.as_mut() {
                Some(session) => session.poll_reset(),
                None => return,
            },
            _ => return,
        };
        match polled {
            HandshakePoll::NeedRead => self.set_interest(reactor, Interest::READABLE),
            HandshakePoll::NeedWrite => self.set_interest(reactor, Interest::WRITABLE),
            HandshakePoll::Complete => {
                debug!("conn {}: {} complete, ready", self.token.0, self.state);
                self.state = ConnState::Ready;
                self.attempts = 0;
                // Read is always wanted once established; write only while
                // there is something to send.
                let mut mask = Interest::READABLE;
                if !self.pending.is_empty() {
                    mask = mask | Interest::WRITABLE;
                }
                self.set_interest(reactor, mask);
            }
            HandshakePoll::Failed => {
                let kind = if self.state == ConnState::Resetting {
                    ConnState::BrokenReset
                } else {
                    ConnState::BrokenConnection
                };
                let detail = self.session_error();
                warn!(
                    "conn {}: {} handshake failed{}",
                    self.token.0,
                    self.state,
                    detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
                );
                self.enter_broken(kind, reactor, policy);
            }
        }
    }

    /// Multiplexing dispatcher: one readiness event on a `Ready` connection
    fn dispatch(&mut self, ready: Interest, reactor: &mut dyn Reactor, policy: ReconnectPolicy) {
        let mut mask = self.interest.unwrap_or(Interest::NONE);

        if ready.is_writable() {
            let flushed = self.session_flush();
            match flushed {
                FlushPoll::Failed => {
                    return self.fail_protocol(reactor, policy, "flush rejected");
                }
                FlushPoll::Drained => {
                    mask = mask.without(Interest::WRITABLE);
                }
                FlushPoll::Pending => {}
            }

            // The wire is clear and nothing is in flight: issue the next
            // queued request.
            if flushed == FlushPoll::Drained && self.live.is_none() && !self.session_busy() {
                if let Some(request) = self.pending.pop() {
                    trace!("conn {}: sending {:?}", self.token.0, request.command());
                    let sent = match self.session.as_mut() {
                        Some(session) => session.send(request.command(), request.params()),
                        None => false,
                    };
                    if !sent {
                        let detail = self.session_error();
                        request.complete(Outcome::Failure(Error::protocol(format!(
                            "send rejected{}",
                            detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
                        ))));
                        return self.fail_protocol(reactor, policy, "send rejected");
                    }
                    self.live = Some(request);
                    if self.session_flush() == FlushPoll::Failed {
                        return self.fail_protocol(reactor, policy, "flush rejected");
                    }
                    // Just sent: keep write interest for the follow-up flush.
                    mask = mask.with(Interest::WRITABLE);
                }
            }
        }

        if ready.is_readable() {
            if !self.session_consume() {
                return self.fail_protocol(reactor, policy, "consume rejected");
            }
            if !self.session_busy() {
                if let Some(result) = self.session_take_result() {
                    match self.live.take() {
                        Some(request) => {
                            trace!(
                                "conn {}: completing {:?}",
                                self.token.0,
                                request.command()
                            );
                            request.complete(Outcome::Success(result));
                        }
                        None => {
                            debug!(
                                "conn {}: result with no live request, discarding",
                                self.token.0
                            );
                        }
                    }
                }
            }
            if !self.pending.is_empty() {
                mask = mask.with(Interest::WRITABLE);
            }
        }

        self.set_interest(reactor, mask);
    }

    /// Protocol failure on an established connection: fail this connection's
    /// requests and recycle it; siblings are unaffected.
    fn fail_protocol(
        &mut self,
        reactor: &mut dyn Reactor,
        policy: ReconnectPolicy,
        context: &str,
    ) {
        let detail = self.session_error();
        let message = match detail {
            Some(d) => format!("{context}: {d}"),
            None => context.to_string(),
        };
        warn!(
            "conn {}: protocol failure ({}), recycling connection",
            self.token.0, message
        );
        if let Some(request) = self.live.take() {
            request.complete(Outcome::Failure(Error::protocol(message.clone())));
        }
        self.pending.fail_all(|| Error::protocol(message.clone()));
        // The session is unusable; a fresh one is opened on the retry.
        self.session = None;
        self.enter_broken(ConnState::BrokenConnection, reactor, policy);
    }

    /// Enter a `Broken*` state and schedule (or give up on) the retry
    fn enter_broken(
        &mut self,
        kind: ConnState,
        reactor: &mut dyn Reactor,
        policy: ReconnectPolicy,
    ) {
        if self.interest.take().is_some() {
            reactor.deregister(self.token);
        }
        self.state = kind;
        self.attempts += 1;
        match policy.max_attempts {
            Some(max) if self.attempts > max => {
                warn!(
                    "conn {}: giving up after {} attempts, failing {} queued requests",
                    self.token.0,
                    self.attempts,
                    self.pending.len()
                );
                self.pending
                    .fail_all(|| Error::connect("connection retry limit reached"));
            }
            _ => {
                reactor.arm_timer(self.token, policy.delay);
                self.timer_armed = true;
                trace!(
                    "conn {}: retry in {:?} (attempt {})",
                    self.token.0,
                    policy.delay,
                    self.attempts
                );
            }
        }
    }

    /// Re-register interest only when the mask actually changed
    fn set_interest(&mut self, reactor: &mut dyn Reactor, mask: Interest) {
        if self.interest != Some(mask) {
            reactor.register(self.token, mask);
            self.interest = Some(mask);
        }
    }

    fn session_flush(&mut self) -> FlushPoll {
        match self.session.as_mut() {
            Some(session) => session.flush(),
            None => FlushPoll::Failed,
        }
    }

    fn session_busy(&self) -> bool {
        match self.session.as_ref() {
            Some(session) => session.is_busy(),
            None => true,
        }
    }

    fn session_consume(&mut self) -> bool {
        match self.session.as_mut() {
            Some(session) => session.consume_input(),
            None => false,
        }
    }

    fn session_take_result(&mut self) -> Option<ResultSet> {
        self.session.as_mut().and_then(|session| session.take_result())
    }

    fn session_error(&self) -> Option<String> {
        self.session.as_ref().and_then(|session| session.last_error())
    }
}

impl fmt::Debug for Conn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conn")
            .field("token", &self.token)
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .field("live", &self.live.is_some())
            .field("interest", &self.interest)
            .field("timer_armed", &self.timer_armed)
            .finish()
    }
}
