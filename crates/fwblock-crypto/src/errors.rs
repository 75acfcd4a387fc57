//! Frame cipher errors.

use thiserror::Error;

/// Errors from sealing or opening a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// The frame did not open under this key: bad alignment, wrong magic
    /// or a length field pointing past the body
    #[error("frame rejected: {0}")]
    DecryptionFailed(String),

    /// The block cipher refused the expanded key
    #[error("cipher key must be {expected} bytes, got {actual}")]
    InvalidKeyLength {
        /// Required key size
        expected: usize,
        /// Size that was offered
        actual: usize,
    },

    /// The payload cannot be framed
    #[error("cannot seal payload: {0}")]
    InvalidInput(String),
}
