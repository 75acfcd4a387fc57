//! # Cipher Session
//!
//! Each endpoint keeps two keys: the one configured by the operator
//! (`original`) and the one currently in force (`current`). Agents may
//! ask for a new key at any acknowledgement:
//!
//! - `NEWKEY`: derive from the current key
//! - `RESYNC`: reset to the original key, then derive from it
//!
//! ## Derivation
//!
//! ```text
//! byte  0..2   sensor seq  (LE, from the reply)
//! byte  2..4   agent seq   (LE, from the reply)
//! byte  4..6   nonce       (LE, reply protocol field)
//! byte  6..32  previous key, up to 26 bytes
//! then  0..4  ^= sensor key modifier
//!       4..8  ^= agent key modifier
//!       any zero in 0..8 becomes 1
//! ```
//!
//! The new key runs up to its first NUL, which can only fall after byte 8.

use fwblock_crypto::{CryptoError, FrameCipher, SessionKey, KEY_LENGTH};
use thiserror::Error;

use super::wire::{ProtocolPacket, WireError, PACKET_LEN};

/// Inputs to one key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRotation {
    /// Sensor sequence number echoed in the reply
    pub local_seq: u16,
    /// Agent sequence number in the reply
    pub remote_seq: u16,
    /// Nonce from the reply's protocol field
    pub nonce: u16,
    /// Key modifier this sensor announced at check-in
    pub local_modifier: [u8; 4],
    /// Key modifier the agent announced
    pub remote_modifier: [u8; 4],
}

/// Which kind of rotation the agent asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationKind {
    /// Roll forward from the current key
    NewKey,
    /// Start over from the original key
    Resync,
}

/// Why a received frame could not be opened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpenError {
    /// Frame did not decrypt under the key
    #[error(transparent)]
    Cipher(#[from] CryptoError),

    /// Decrypted bytes are not a packet
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// A successfully opened frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opened {
    /// The decoded packet
    pub packet: ProtocolPacket,
    /// True if the current key failed and the original key was used
    pub used_original: bool,
}

/// Key pair and cipher for one endpoint.
#[derive(Debug)]
pub struct CipherSession {
    original: SessionKey,
    current: SessionKey,
    cipher: FrameCipher,
}

impl CipherSession {
    /// Start a session on the configured key.
    pub fn new(original: SessionKey) -> Result<Self, CryptoError> {
        let cipher = FrameCipher::new(&original)?;
        Ok(Self {
            current: original.clone(),
            original,
            cipher,
        })
    }

    /// The configured key.
    pub fn original_key(&self) -> &SessionKey {
        &self.original
    }

    /// The key in force.
    pub fn current_key(&self) -> &SessionKey {
        &self.current
    }

    /// True once the current key has diverged from the original.
    pub fn is_rotated(&self) -> bool {
        self.current != self.original
    }

    /// Encrypt a packet under the current key.
    pub fn seal(&self, packet: &ProtocolPacket) -> Result<Vec<u8>, CryptoError> {
        self.cipher.seal(&packet.encode())
    }

    /// Decrypt a frame under the current key.
    pub fn open(&self, frame: &[u8]) -> Result<ProtocolPacket, OpenError> {
        Self::open_with(&self.cipher, frame)
    }

    fn open_with(cipher: &FrameCipher, frame: &[u8]) -> Result<ProtocolPacket, OpenError> {
        let plain = cipher.open(frame)?;
        if plain.len() != PACKET_LEN {
            return Err(WireError::Length(plain.len()).into());
        }
        Ok(ProtocolPacket::decode(&plain)?)
    }

    /// Decrypt under the current key, falling back to the original key.
    ///
    /// A successful fallback makes the original key current again. If the
    /// key was never rotated there is nothing to fall back to.
    pub fn open_with_fallback(&mut self, frame: &[u8]) -> Result<Opened, OpenError> {
        let err = match self.open(frame) {
            Ok(packet) => {
                return Ok(Opened {
                    packet,
                    used_original: false,
                })
            }
            Err(err) => err,
        };
        if !self.is_rotated() {
            return Err(err);
        }

        let fallback = FrameCipher::new(&self.original)?;
        let packet = Self::open_with(&fallback, frame)?;
        self.current = self.original.clone();
        self.cipher = fallback;
        Ok(Opened {
            packet,
            used_original: true,
        })
    }

    /// Apply an agent-requested rotation.
    pub fn rotate(&mut self, kind: RotationKind, rotation: &KeyRotation) -> Result<(), CryptoError> {
        let base = match kind {
            RotationKind::NewKey => &self.current,
            RotationKind::Resync => &self.original,
        };
        let next = Self::derive_key(rotation, base);
        self.install(next)
    }

    fn install(&mut self, key: SessionKey) -> Result<(), CryptoError> {
        self.cipher = FrameCipher::new(&key)?;
        self.current = key;
        Ok(())
    }

    /// Derive the next key from `previous`. Both peers run this with the
    /// same inputs and must arrive at the same key.
    pub fn derive_key(rotation: &KeyRotation, previous: &SessionKey) -> SessionKey {
        let mut raw = zeroize::Zeroizing::new([0u8; KEY_LENGTH]);
        raw[0..2].copy_from_slice(&rotation.local_seq.to_le_bytes());
        raw[2..4].copy_from_slice(&rotation.remote_seq.to_le_bytes());
        raw[4..6].copy_from_slice(&rotation.nonce.to_le_bytes());

        let prev = previous.as_bytes();
        let carried = prev.len().min(KEY_LENGTH - 6);
        raw[6..6 + carried].copy_from_slice(&prev[..carried]);

        for i in 0..4 {
            raw[i] ^= rotation.local_modifier[i];
            raw[i + 4] ^= rotation.remote_modifier[i];
        }
        for byte in raw[..8].iter_mut() {
            if *byte == 0 {
                *byte = 1;
            }
        }

        SessionKey::new(&raw[..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::wire::Status;
    use proptest::prelude::*;

    fn rotation() -> KeyRotation {
        KeyRotation {
            local_seq: 0x0102,
            remote_seq: 0x0304,
            nonce: 0x0506,
            local_modifier: [0x10, 0x20, 0x30, 0x40],
            remote_modifier: [0x50, 0x60, 0x70, 0x80],
        }
    }

    #[test]
    fn test_derive_key_layout() {
        let key = CipherSession::derive_key(&rotation(), &SessionKey::from_passphrase("abc"));
        let b = key.as_bytes();
        assert_eq!(b.len(), 9);
        assert_eq!(b[0], 0x02 ^ 0x10);
        assert_eq!(b[1], 0x01 ^ 0x20);
        assert_eq!(b[2], 0x04 ^ 0x30);
        assert_eq!(b[3], 0x03 ^ 0x40);
        assert_eq!(b[4], 0x06 ^ 0x50);
        assert_eq!(b[5], 0x05 ^ 0x60);
        assert_eq!(b[6], b'a' ^ 0x70);
        assert_eq!(b[7], b'b' ^ 0x80);
        assert_eq!(b[8], b'c');
    }

    #[test]
    fn test_derive_key_replaces_zero_bytes() {
        let zero = KeyRotation {
            local_seq: 0,
            remote_seq: 0,
            nonce: 0,
            local_modifier: [0; 4],
            remote_modifier: [0; 4],
        };
        let key = CipherSession::derive_key(&zero, &SessionKey::new(b""));
        assert_eq!(key.as_bytes(), &[1u8; 8]);
    }

    #[test]
    fn test_derive_key_truncates_previous() {
        let long = SessionKey::new(&[b'k'; KEY_LENGTH]);
        let key = CipherSession::derive_key(&rotation(), &long);
        assert_eq!(key.len(), KEY_LENGTH);
    }

    #[test]
    fn test_seal_open() {
        let session = CipherSession::new(SessionKey::from_passphrase("secret")).unwrap();
        let packet = ProtocolPacket::new(Status::Ok);
        let frame = session.seal(&packet).unwrap();
        assert_eq!(session.open(&frame).unwrap(), packet);
    }

    #[test]
    fn test_rotation_changes_key() {
        let mut session = CipherSession::new(SessionKey::from_passphrase("secret")).unwrap();
        session.rotate(RotationKind::NewKey, &rotation()).unwrap();
        assert!(session.is_rotated());

        let frame = session.seal(&ProtocolPacket::new(Status::Ok)).unwrap();
        let stale = CipherSession::new(SessionKey::from_passphrase("secret")).unwrap();
        assert!(stale.open(&frame).is_err());
    }

    #[test]
    fn test_resync_derives_from_original() {
        let original = SessionKey::from_passphrase("secret");
        let mut session = CipherSession::new(original.clone()).unwrap();
        session.rotate(RotationKind::NewKey, &rotation()).unwrap();
        session.rotate(RotationKind::NewKey, &rotation()).unwrap();
        session.rotate(RotationKind::Resync, &rotation()).unwrap();

        let expected = CipherSession::derive_key(&rotation(), &original);
        assert_eq!(session.current_key(), &expected);
    }

    #[test]
    fn test_fallback_to_original() {
        let original = SessionKey::from_passphrase("secret");
        let agent = CipherSession::new(original.clone()).unwrap();
        let mut sensor = CipherSession::new(original).unwrap();
        sensor.rotate(RotationKind::NewKey, &rotation()).unwrap();

        let frame = agent.seal(&ProtocolPacket::new(Status::Ok)).unwrap();
        let opened = sensor.open_with_fallback(&frame).unwrap();
        assert!(opened.used_original);
        assert!(!sensor.is_rotated());
    }

    #[test]
    fn test_fallback_not_attempted_without_rotation() {
        let mut sensor = CipherSession::new(SessionKey::from_passphrase("secret")).unwrap();
        let other = CipherSession::new(SessionKey::from_passphrase("other")).unwrap();
        let frame = other.seal(&ProtocolPacket::new(Status::Ok)).unwrap();
        assert!(matches!(
            sensor.open_with_fallback(&frame),
            Err(OpenError::Cipher(_))
        ));
    }

    #[test]
    fn test_failed_fallback_keeps_current() {
        let mut sensor = CipherSession::new(SessionKey::from_passphrase("secret")).unwrap();
        sensor.rotate(RotationKind::NewKey, &rotation()).unwrap();
        let rotated = sensor.current_key().clone();

        let other = CipherSession::new(SessionKey::from_passphrase("other")).unwrap();
        let frame = other.seal(&ProtocolPacket::new(Status::Ok)).unwrap();
        assert!(sensor.open_with_fallback(&frame).is_err());
        assert_eq!(sensor.current_key(), &rotated);
    }

    proptest! {
        #[test]
        fn prop_derive_key_deterministic_and_nonzero(
            local_seq in any::<u16>(),
            remote_seq in any::<u16>(),
            nonce in any::<u16>(),
            local_modifier in any::<[u8; 4]>(),
            remote_modifier in any::<[u8; 4]>(),
            prev in proptest::collection::vec(any::<u8>(), 0..40),
        ) {
            let rotation = KeyRotation { local_seq, remote_seq, nonce, local_modifier, remote_modifier };
            let previous = SessionKey::new(&prev);
            let a = CipherSession::derive_key(&rotation, &previous);
            let b = CipherSession::derive_key(&rotation, &previous);
            prop_assert_eq!(&a, &b);
            prop_assert!(a.len() >= 8);
            prop_assert!(a.as_bytes()[..8].iter().all(|&x| x != 0));
        }
    }
}
