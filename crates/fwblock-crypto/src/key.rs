//! # Session Keys
//!
//! Keys are byte strings of at most [`KEY_LENGTH`] bytes. A key ends at its
//! first NUL byte, mirroring how agents store them. Before key scheduling the
//! key is padded to the full cipher key size with a well-known suffix that
//! every agent implementation shares.

use std::fmt;

use zeroize::{Zeroize, Zeroizing};

/// Cipher key size in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Padding source for short keys. Part of the wire protocol; do not change.
pub const DEFAULT_KEY_SUFFIX: &[u8; KEY_LENGTH] = b"SnortHas2FishEncryptionRoutines!";

/// A session key as agreed with one remote agent.
#[derive(Clone, PartialEq, Eq, Zeroize)]
#[zeroize(drop)]
pub struct SessionKey {
    bytes: [u8; KEY_LENGTH],
    len: usize,
}

impl SessionKey {
    /// Create from raw bytes.
    ///
    /// Input stops at the first NUL byte and is truncated to [`KEY_LENGTH`].
    pub fn new(raw: &[u8]) -> Self {
        let len = raw
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(raw.len())
            .min(KEY_LENGTH);

        let mut bytes = [0u8; KEY_LENGTH];
        bytes[..len].copy_from_slice(&raw[..len]);
        Self { bytes, len }
    }

    /// Create from an operator-supplied passphrase.
    pub fn from_passphrase(passphrase: &str) -> Self {
        Self::new(passphrase.as_bytes())
    }

    /// Get the significant key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Number of significant key bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for the empty key (agent configured without a password).
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The full cipher key: key bytes followed by the default suffix.
    pub fn expanded(&self) -> Zeroizing<[u8; KEY_LENGTH]> {
        let mut out = Zeroizing::new([0u8; KEY_LENGTH]);
        out[..self.len].copy_from_slice(self.as_bytes());
        out[self.len..].copy_from_slice(&DEFAULT_KEY_SUFFIX[..KEY_LENGTH - self.len]);
        out
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_stops_at_nul() {
        let key = SessionKey::new(b"abc\0def");
        assert_eq!(key.as_bytes(), b"abc");
        assert_eq!(key.len(), 3);
    }

    #[test]
    fn test_key_truncated_to_key_length() {
        let key = SessionKey::new(&[b'x'; 40]);
        assert_eq!(key.len(), KEY_LENGTH);
    }

    #[test]
    fn test_empty_key_expands_to_suffix() {
        let key = SessionKey::new(b"");
        assert!(key.is_empty());
        assert_eq!(&*key.expanded(), DEFAULT_KEY_SUFFIX);
    }

    #[test]
    fn test_short_key_is_padded_with_suffix_prefix() {
        let key = SessionKey::from_passphrase("wanfw");
        let expanded = key.expanded();
        assert_eq!(&expanded[..5], b"wanfw");
        assert_eq!(&expanded[5..], &DEFAULT_KEY_SUFFIX[..KEY_LENGTH - 5]);
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let key = SessionKey::from_passphrase("idspassword");
        assert!(!format!("{:?}", key).contains("idspassword"));
    }
}
