//! # Driven Ports (Outbound SPI)
//!
//! Interfaces this crate requires the host application to implement. The
//! production adapters live in `adapters`; tests plug in scripted fakes.

use std::net::{SocketAddr, SocketAddrV4};
use std::time::Duration;

use thiserror::Error;

use crate::domain::Timestamp;

/// Errors from network operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// Operation timed out
    #[error("network operation timed out")]
    Timeout,

    /// Remote agent refused the connection
    #[error("connection refused by agent")]
    ConnectionRefused,

    /// Peer closed the connection
    #[error("connection closed by agent")]
    Closed,

    /// Local address could not be bound
    #[error("could not bind {0}")]
    Bind(String),

    /// Any other socket failure
    #[error("socket error: {0}")]
    Io(String),
}

/// Opens connections to agents.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so a client can be shared between
/// alerting threads behind a lock.
///
/// # Example Implementation
///
/// ```rust,ignore
/// struct TcpTransport;
///
/// impl Transport for TcpTransport {
///     fn connect(&self, local: SocketAddr, remote: SocketAddrV4, timeout: Duration)
///         -> Result<Box<dyn Connection>, NetworkError>
///     {
///         // bind to `local`, connect to `remote` within `timeout`
///         todo!()
///     }
/// }
/// ```
pub trait Transport: Send + Sync {
    /// Open a connection from `local` to `remote` within `timeout`.
    fn connect(
        &self,
        local: SocketAddr,
        remote: SocketAddrV4,
        timeout: Duration,
    ) -> Result<Box<dyn Connection>, NetworkError>;
}

/// One open connection. Closed when dropped.
pub trait Connection: Send {
    /// Write a whole frame.
    fn send(&mut self, frame: &[u8]) -> Result<(), NetworkError>;

    /// Read exactly `len` bytes, polling every `poll_interval` until
    /// `budget` is spent.
    ///
    /// Returns `NetworkError::Timeout` if the bytes did not arrive in time.
    fn receive(
        &mut self,
        len: usize,
        budget: Duration,
        poll_interval: Duration,
    ) -> Result<Vec<u8>, NetworkError>;
}

/// Abstract interface for time-related operations.
///
/// Enables deterministic testing by injecting controllable time sources.
pub trait TimeSource: Send + Sync {
    /// Get the current timestamp.
    fn now(&self) -> Timestamp;
}
