//! Error types for wirepool
//!
//! Classifies failures by where they arise in the connection lifecycle:
//! - Connect: a handshake never reached ready (recovered via backoff)
//! - Protocol: the driver rejected an operation on an established connection
//! - PoolExhausted: no connection can become ready without further I/O

use std::fmt;
use thiserror::Error;

/// Result type for wirepool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connect/reset handshake failure (retriable via backoff)
    Connect,
    /// Protocol-level rejection on an established connection
    Protocol,
    /// Pool ran the reactor dry without a ready connection (retriable)
    PoolExhausted,
    /// Invalid configuration or usage
    Configuration,
}

impl ErrorCategory {
    /// Whether errors in this category are generally retriable
    #[inline]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Connect | Self::PoolExhausted)
    }
}

/// Main error type for wirepool
#[derive(Error, Debug)]
pub enum Error {
    /// Connect or reset handshake failed
    #[error("connect error: {message}")]
    Connect {
        /// Failure detail, including any driver-side diagnostic text
        message: String,
    },

    /// The driver rejected a send/flush/consume on an established connection
    #[error("protocol error: {message}")]
    Protocol {
        /// Failure detail, including any driver-side diagnostic text
        message: String,
    },

    /// No connection became ready and the reactor has no work left
    #[error("pool exhausted: {message}")]
    PoolExhausted {
        /// What the pool was waiting for when it ran out of work
        message: String,
    },

    /// Invalid configuration or usage
    #[error("configuration error: {message}")]
    Configuration {
        /// What was invalid
        message: String,
    },
}

impl Error {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Connect { .. } => ErrorCategory::Connect,
            Self::Protocol { .. } => ErrorCategory::Protocol,
            Self::PoolExhausted { .. } => ErrorCategory::PoolExhausted,
            Self::Configuration { .. } => ErrorCategory::Configuration,
        }
    }

    /// Whether this error is retriable
    #[inline]
    pub fn is_retriable(&self) -> bool {
        self.category().is_retriable()
    }

    /// Create a connect error
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a pool-exhausted error
    pub fn exhausted(message: impl Into<String>) -> Self {
        Self::PoolExhausted {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Protocol => write!(f, "protocol"),
            Self::PoolExhausted => write!(f, "pool_exhausted"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}
