//! # wirepool
//!
//! Event-driven connection pool and query multiplexer for non-blocking
//! database clients.
//!
//! wirepool multiplexes many outstanding queries over a fixed ring of
//! non-blocking connections, driven entirely by I/O readiness events. The
//! wire protocol and the readiness reactor are trait contracts
//! ([`driver::Driver`]/[`driver::Session`] and [`reactor::Reactor`]); the
//! core is the connection lifecycle state machine, the per-connection
//! request multiplexer, and the pool's selection and backoff policy.
//!
//! ## Features
//!
//! - **Fixed ring, round-robin**: the pool never resizes; `acquire` rotates
//!   one slot per call and blocks by pumping the shared reactor
//! - **One live request per connection**: strict FIFO dispatch and
//!   completion order per connection
//! - **Self-healing**: failed connect/reset handshakes back off on a timer
//!   and retry without surfacing to callers
//! - **Failure isolation**: a protocol-level rejection fails only the
//!   affected connection's requests and recycles that connection
//! - **Single-threaded**: no locks, no `Send` bounds on completions;
//!   suspension happens by re-entering the reactor pump
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wirepool::prelude::*;
//!
//! let config = PoolConfig::new("db://app@db.internal/orders").with_size(4);
//! let mut pool = Pool::new(reactor, driver, config)?;
//!
//! let conn = pool.acquire()?;
//! pool.submit(conn, "SELECT name FROM users WHERE id = $1",
//!     vec![Value::Int64(7)],
//!     |outcome| match outcome {
//!         Outcome::Success(rows) => println!("{} rows", rows.len()),
//!         Outcome::Failure(err) => eprintln!("query failed: {err}"),
//!     })?;
//! pool.drain(conn)?;
//! ```
//!
//! Requests submitted to the same connection complete in submission order;
//! ordering across connections is unspecified — serialize at a higher layer
//! or use [`pool::Pool::drain`] when it matters.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod connection;
pub mod driver;
pub mod error;
pub mod pool;
pub mod queue;
pub mod reactor;
pub mod types;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::connection::ConnState;
    pub use crate::driver::{Driver, FlushPoll, HandshakePoll, Session};
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::pool::{
        create_pool, ConnHandle, Pool, PoolConfig, PoolStats, DEFAULT_POOL_SIZE,
        DEFAULT_RECONNECT_DELAY,
    };
    pub use crate::queue::{Completion, Outcome};
    pub use crate::reactor::{Event, EventKind, Interest, Reactor, Token};
    pub use crate::types::{ResultSet, Row, Value};
}

// Re-export commonly used items at crate root
pub use error::{Error, Result};
pub use pool::{ConnHandle, Pool, PoolConfig};
pub use queue::Outcome;
pub use types::{ResultSet, Value};
