//! Exchange errors and how the dispatcher treats them.

use std::time::Duration;

use fwblock_crypto::CryptoError;
use thiserror::Error;

use crate::ports::NetworkError;

/// What the dispatcher does with an endpoint after a failed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Skip the endpoint this round
    Defer,
    /// Give up on the endpoint
    Evict,
    /// Renegotiate the session, evict on repeat
    Renegotiate,
}

/// Failure of one request/reply exchange with an agent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    /// Connection could not be established
    #[error("could not connect: {0}")]
    Connect(NetworkError),

    /// Request could not be written
    #[error("could not send: {0}")]
    Send(NetworkError),

    /// No complete reply within the budget
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// Connection failed while waiting for the reply
    #[error("could not receive: {0}")]
    Receive(NetworkError),

    /// Reply did not decrypt under either key
    #[error("password mismatch")]
    PasswordMismatch,

    /// Reply speaks another protocol version
    #[error("protocol version {0} not supported")]
    VersionMismatch(u8),

    /// Reply status makes no sense here
    #[error("unexpected status {0}")]
    UnexpectedStatus(u8),

    /// Agent answered ERROR
    #[error("agent rejected the request")]
    Rejected,

    /// HOLD was not followed by a reply in time
    #[error("no reply within hold period of {0:?}")]
    HoldExpired(Duration),

    /// Local cipher failure
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl ExchangeError {
    /// How the dispatcher reacts to this error.
    pub fn disposition(&self) -> Disposition {
        match self {
            ExchangeError::Connect(_)
            | ExchangeError::Send(_)
            | ExchangeError::Timeout(_)
            | ExchangeError::Receive(_)
            | ExchangeError::HoldExpired(_)
            | ExchangeError::Crypto(_) => Disposition::Defer,
            ExchangeError::PasswordMismatch
            | ExchangeError::VersionMismatch(_)
            | ExchangeError::UnexpectedStatus(_) => Disposition::Evict,
            ExchangeError::Rejected => Disposition::Renegotiate,
        }
    }
}
