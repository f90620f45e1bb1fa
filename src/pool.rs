//! Connection pool: fixed ring, round-robin selection, pump-driven blocking
//!
//! The pool owns the reactor, the protocol driver, and a fixed ring of
//! connections built eagerly at creation. `acquire` advances a cursor one
//! slot per call and, when the slot is not ready, makes progress by running
//! a single reactor iteration before retrying — blocking from the caller's
//! perspective while staying single-threaded. Exhaustion (no connection can
//! become ready and the reactor has no work left) is an error, never a hang.
//!
//! # Example
//!
//! ```rust,ignore
//! use wirepool::prelude::*;
//!
//! let config = PoolConfig::new("db://app@db.internal/orders").with_size(4);
//! let mut pool = Pool::new(reactor, driver, config)?;
//!
//! let conn = pool.acquire()?;
//! pool.submit(conn, "SELECT 1", vec![], |outcome| {
//!     println!("{:?}", outcome.is_success());
//! })?;
//! pool.drain(conn)?;
//! ```

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

use crate::connection::{Conn, ConnState, ReconnectPolicy};
use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::queue::{Outcome, Request};
use crate::reactor::{Event, EventKind, Reactor, Token};
use crate::types::Value;

/// Reconnect delay used when none is configured
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1000);

/// Pool size used when none is configured
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Handle to one pooled connection slot
///
/// Returned by [`Pool::acquire`]; valid for the lifetime of the pool (the
/// ring is never resized).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnHandle(pub(crate) usize);

impl ConnHandle {
    /// Slot index in the ring
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Pool configuration
#[derive(Clone)]
pub struct PoolConfig {
    /// Connect target URI, passed through to the driver
    pub target: String,
    /// Number of connections in the ring (fixed at creation)
    pub size: usize,
    /// Delay before retrying a failed connect/reset handshake
    pub reconnect_delay: Duration,
    /// Consecutive handshake failures before giving up on a connection;
    /// `None` retries forever
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            size: DEFAULT_POOL_SIZE,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: None,
        }
    }
}

impl PoolConfig {
    /// Create a configuration with just a target
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    /// Set the ring size
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Set the reconnect delay
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Bound consecutive reconnect attempts; exceeding the bound fails the
    /// connection's queued requests and parks it
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Redact credentials from the target to prevent leaking passwords to logs.
        let redacted_target = match Url::parse(&self.target) {
            Ok(mut parsed) => {
                if parsed.password().is_some() {
                    let _ = parsed.set_password(Some("***"));
                }
                parsed.to_string()
            }
            Err(_) => "***".to_string(),
        };

        f.debug_struct("PoolConfig")
            .field("target", &redacted_target)
            .field("size", &self.size)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .finish()
    }
}

/// Pool counters, snapshotted by [`Pool::stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Successful acquisitions
    pub acquisitions: u64,
    /// Times acquire or drain ran the reactor dry
    pub exhaustions: u64,
    /// Requests submitted
    pub submissions: u64,
    /// Reactor iterations run on behalf of acquire/drain/pump
    pub pumps: u64,
}

/// The connection pool
pub struct Pool {
    reactor: Box<dyn Reactor>,
    driver: Box<dyn Driver>,
    config: PoolConfig,
    conns: Vec<Conn>,
    cursor: usize,
    /// Reused per pump to avoid a per-iteration allocation
    events: Vec<Event>,
    stats: PoolStats,
}

impl Pool {
    /// Create a pool and eagerly start connecting every slot
    ///
    /// Individual connect failures are not fatal: the slot proceeds in
    /// `BrokenConnection` and is retried on its backoff timer.
    pub fn new(
        reactor: impl Reactor + 'static,
        driver: impl Driver + 'static,
        config: PoolConfig,
    ) -> Result<Self> {
        if config.size == 0 {
            return Err(Error::config("pool size must be at least 1"));
        }
        if config.target.is_empty() {
            return Err(Error::config("connect target must not be empty"));
        }

        let mut pool = Self {
            reactor: Box::new(reactor),
            driver: Box::new(driver),
            conns: Vec::with_capacity(config.size),
            // First acquire advances to slot 0.
            cursor: config.size - 1,
            events: Vec::new(),
            stats: PoolStats::default(),
            config,
        };

        let policy = pool.policy();
        for i in 0..pool.config.size {
            let mut conn = Conn::new(Token(i));
            conn.start_connect(
                pool.driver.as_ref(),
                &pool.config.target,
                pool.reactor.as_mut(),
                policy,
            );
            pool.conns.push(conn);
        }

        info!("pool created: {:?}", pool.config);
        Ok(pool)
    }

    /// Acquire a ready connection, round-robin
    ///
    /// Advances the cursor by exactly one slot per call; when the slot is
    /// not ready, runs one reactor iteration and retries. Fails with
    /// [`Error::PoolExhausted`] once the reactor reports no further work.
    pub fn acquire(&mut self) -> Result<ConnHandle> {
        loop {
            self.cursor = (self.cursor + 1) % self.conns.len();
            if self.conns[self.cursor].state().is_ready() {
                self.stats.acquisitions += 1;
                return Ok(ConnHandle(self.cursor));
            }
            if !self.pump() {
                self.stats.exhaustions += 1;
                warn!("acquire failed: no connection can become ready");
                return Err(Error::exhausted(
                    "no connection became ready and the reactor has no work left",
                ));
            }
        }
    }

    /// Submit a request on a connection
    ///
    /// The request is queued in FIFO order and dispatched when the
    /// connection is ready and the wire is clear; the completion handler
    /// runs exactly once, from within a reactor pump.
    pub fn submit(
        &mut self,
        handle: ConnHandle,
        command: impl Into<String>,
        params: Vec<Value>,
        completion: impl FnOnce(Outcome) + 'static,
    ) -> Result<()> {
        let conn = self
            .conns
            .get_mut(handle.0)
            .ok_or_else(|| Error::config("unknown connection handle"))?;
        conn.submit(
            Request::new(command.into(), params, Box::new(completion)),
            self.reactor.as_mut(),
        );
        self.stats.submissions += 1;
        Ok(())
    }

    /// Block (by pumping the reactor) until the connection is idle
    ///
    /// Idle means no pending and no live request; requests failed through
    /// the error paths count as completed. Fails with
    /// [`Error::PoolExhausted`] if the reactor runs out of work first.
    pub fn drain(&mut self, handle: ConnHandle) -> Result<()> {
        loop {
            let conn = self
                .conns
                .get(handle.0)
                .ok_or_else(|| Error::config("unknown connection handle"))?;
            if conn.is_idle() {
                return Ok(());
            }
            if !self.pump() {
                self.stats.exhaustions += 1;
                return Err(Error::exhausted(
                    "requests outstanding but the reactor has no work left",
                ));
            }
        }
    }

    /// Re-validate a ready, idle connection (`Ready → Resetting`)
    ///
    /// Queued requests survive the reset and are dispatched when the
    /// connection returns to ready.
    pub fn reset(&mut self, handle: ConnHandle) -> Result<()> {
        let policy = self.policy();
        let conn = self
            .conns
            .get_mut(handle.0)
            .ok_or_else(|| Error::config("unknown connection handle"))?;
        conn.start_reset(self.reactor.as_mut(), policy)
    }

    /// Run a single reactor iteration, routing events to connections
    ///
    /// Returns whether further work is possible. Exposed for callers that
    /// drive the pool from their own loop instead of through
    /// `acquire`/`drain`.
    pub fn pump(&mut self) -> bool {
        let policy = self.policy();
        let mut events = std::mem::take(&mut self.events);
        events.clear();
        let more = self.reactor.run_once(&mut events);
        self.stats.pumps += 1;

        for event in events.drain(..) {
            let Some(conn) = self.conns.get_mut(event.token.0) else {
                debug!("event for unknown token {}", event.token.0);
                continue;
            };
            match event.kind {
                EventKind::Io(ready) => conn.handle_io(ready, self.reactor.as_mut(), policy),
                EventKind::Timer => conn.handle_timer(
                    self.driver.as_ref(),
                    &self.config.target,
                    self.reactor.as_mut(),
                    policy,
                ),
            }
        }

        self.events = events;
        more
    }

    /// Lifecycle state of a connection
    pub fn conn_state(&self, handle: ConnHandle) -> Option<ConnState> {
        self.conns.get(handle.0).map(|c| c.state())
    }

    /// Whether a connection has no pending and no live request
    pub fn is_idle(&self, handle: ConnHandle) -> bool {
        self.conns.get(handle.0).is_some_and(|c| c.is_idle())
    }

    /// Number of requests queued but not yet sent on a connection
    pub fn pending_len(&self, handle: ConnHandle) -> usize {
        self.conns.get(handle.0).map_or(0, |c| c.pending_len())
    }

    /// Whether a connection has a request in flight
    pub fn has_live(&self, handle: ConnHandle) -> bool {
        self.conns.get(handle.0).is_some_and(|c| c.has_live())
    }

    /// Ring size (fixed at creation)
    pub fn size(&self) -> usize {
        self.conns.len()
    }

    /// Snapshot the pool counters
    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// The pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            delay: self.config.reconnect_delay,
            max_attempts: self.config.max_reconnect_attempts,
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        // Disarm timers and drop registrations so the reactor outliving the
        // pool never fires into freed slots.
        for conn in &mut self.conns {
            conn.shutdown(self.reactor.as_mut());
        }
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.config)
            .field("cursor", &self.cursor)
            .field("conns", &self.conns)
            .field("stats", &self.stats)
            .finish()
    }
}

/// Create a pool from a target and size with default settings
pub fn create_pool(
    reactor: impl Reactor + 'static,
    driver: impl Driver + 'static,
    target: impl Into<String>,
    size: usize,
) -> Result<Pool> {
    Pool::new(reactor, driver, PoolConfig::new(target).with_size(size))
}
