//! Readiness-reactor contract
//!
//! The core never touches sockets or clocks itself. It registers interest in
//! readiness for token-identified connections, arms one-shot timers, and asks
//! the reactor to pump a single iteration at a time. A production
//! implementation wraps an OS readiness facility (epoll/kqueue via an event
//! loop library); the test suite ships a scripted one.

use std::fmt;
use std::ops::BitOr;
use std::time::Duration;

/// Identifies one connection slot to the reactor
///
/// Also used as the timer token: a connection has at most one armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(pub usize);

/// Readiness interest mask (read/write)
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Interest(u8);

impl Interest {
    /// No interest
    pub const NONE: Interest = Interest(0);
    /// Interest in read readiness
    pub const READABLE: Interest = Interest(0b01);
    /// Interest in write readiness
    pub const WRITABLE: Interest = Interest(0b10);

    /// Union with another mask
    #[inline]
    pub const fn with(self, other: Interest) -> Interest {
        Interest(self.0 | other.0)
    }

    /// Remove another mask
    #[inline]
    pub const fn without(self, other: Interest) -> Interest {
        Interest(self.0 & !other.0)
    }

    /// Whether every bit of `other` is set
    #[inline]
    pub const fn contains(self, other: Interest) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether read interest is set
    #[inline]
    pub const fn is_readable(self) -> bool {
        self.contains(Self::READABLE)
    }

    /// Whether write interest is set
    #[inline]
    pub const fn is_writable(self) -> bool {
        self.contains(Self::WRITABLE)
    }

    /// Whether no interest is set
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Interest {
    type Output = Interest;

    fn bitor(self, rhs: Interest) -> Interest {
        self.with(rhs)
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_readable(), self.is_writable()) {
            (true, true) => write!(f, "Interest(r|w)"),
            (true, false) => write!(f, "Interest(r)"),
            (false, true) => write!(f, "Interest(w)"),
            (false, false) => write!(f, "Interest(-)"),
        }
    }
}

/// What a delivered event reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// I/O readiness; the mask says which directions are ready
    Io(Interest),
    /// A one-shot timer armed for this token fired
    Timer,
}

/// A single readiness or timer event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// The connection slot the event belongs to
    pub token: Token,
    /// Readiness or timer
    pub kind: EventKind,
}

impl Event {
    /// Create an I/O readiness event
    pub fn io(token: Token, ready: Interest) -> Self {
        Self {
            token,
            kind: EventKind::Io(ready),
        }
    }

    /// Create a timer event
    pub fn timer(token: Token) -> Self {
        Self {
            token,
            kind: EventKind::Timer,
        }
    }
}

/// The readiness reactor the pool pumps
///
/// All methods are invoked from the single pool thread. `register` both
/// registers and re-registers: the caller only invokes it when the interest
/// mask actually changed. Registration failures are the implementation's
/// problem (an OS-level registration failure is not recoverable by the core).
pub trait Reactor {
    /// Register or update readiness interest for a token
    fn register(&mut self, token: Token, interest: Interest);

    /// Remove a token's registration entirely
    fn deregister(&mut self, token: Token);

    /// Arm a one-shot timer for a token
    ///
    /// Re-arming an already armed token replaces the previous deadline.
    fn arm_timer(&mut self, token: Token, delay: Duration);

    /// Disarm a previously armed timer, if still pending
    fn disarm_timer(&mut self, token: Token);

    /// Run a single reactor iteration
    ///
    /// Appends any delivered events to `events` and returns whether further
    /// work is possible. Returning `false` means no registration and no armed
    /// timer can ever produce another event; the pool treats that as
    /// exhaustion.
    fn run_once(&mut self, events: &mut Vec<Event>) -> bool;
}
