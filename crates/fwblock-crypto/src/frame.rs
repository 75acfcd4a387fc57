//! # Framed Encryption
//!
//! Twofish-256 in CBC mode with a zero IV. Each frame starts with a header
//! block carrying a random salt, the payload length and a fixed magic, so
//! that [`FrameCipher::open`] can reject frames sealed under another key
//! instead of returning garbage.

use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, InnerIvInit, KeyInit};
use twofish::Twofish;
use zeroize::Zeroizing;

use crate::key::{SessionKey, KEY_LENGTH};
use crate::CryptoError;

/// Cipher block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Size of the frame header (exactly one block).
pub const HEADER_LEN: usize = BLOCK_SIZE;

/// Marker identifying a successful decryption.
pub const FRAME_MAGIC: &[u8; 8] = b"TwoFish\0";

const SALT_RANGE: std::ops::Range<usize> = 0..4;
const LEN_RANGE: std::ops::Range<usize> = 4..8;
const MAGIC_RANGE: std::ops::Range<usize> = 8..16;

/// Size of a sealed frame for a payload of `plain_len` bytes.
pub const fn sealed_len(plain_len: usize) -> usize {
    HEADER_LEN + plain_len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

/// A keyed frame cipher bound to one session key.
pub struct FrameCipher {
    key: Zeroizing<[u8; KEY_LENGTH]>,
}

impl FrameCipher {
    /// Schedule a cipher for `key`.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyLength` if the block cipher rejects
    /// the expanded key.
    pub fn new(key: &SessionKey) -> Result<Self, CryptoError> {
        let cipher = Self {
            key: key.expanded(),
        };
        cipher.block_cipher()?;
        Ok(cipher)
    }

    fn block_cipher(&self) -> Result<Twofish, CryptoError> {
        Twofish::new_from_slice(self.key.as_ref()).map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_LENGTH,
            actual: self.key.len(),
        })
    }

    /// Seal `plaintext` under a fresh random salt.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidInput` if the payload does not fit the
    /// 32-bit length field.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.seal_with_salt(plaintext, rand::random())
    }

    /// Seal `plaintext` with an explicit salt.
    ///
    /// Deterministic for a given salt; used by tests and by [`Self::seal`].
    pub fn seal_with_salt(&self, plaintext: &[u8], salt: u32) -> Result<Vec<u8>, CryptoError> {
        let declared = u32::try_from(plaintext.len())
            .map_err(|_| CryptoError::InvalidInput("payload exceeds u32 length".into()))?;

        let mut frame = vec![0u8; sealed_len(plaintext.len())];
        frame[SALT_RANGE].copy_from_slice(&salt.to_le_bytes());
        frame[LEN_RANGE].copy_from_slice(&declared.to_le_bytes());
        frame[MAGIC_RANGE].copy_from_slice(FRAME_MAGIC);
        frame[HEADER_LEN..HEADER_LEN + plaintext.len()].copy_from_slice(plaintext);

        let mut mode = cbc::Encryptor::<Twofish>::inner_iv_init(self.block_cipher()?, &Default::default());
        for block in frame.chunks_exact_mut(BLOCK_SIZE) {
            mode.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }

        Ok(frame)
    }

    /// Open a sealed frame and return its payload.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::DecryptionFailed` if the frame is misaligned,
    /// the magic does not match (wrong key), or the declared length is
    /// larger than the frame body.
    pub fn open(&self, frame: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if frame.len() < HEADER_LEN || frame.len() % BLOCK_SIZE != 0 {
            return Err(CryptoError::DecryptionFailed(format!(
                "frame of {} bytes is not block aligned",
                frame.len()
            )));
        }

        let mut buf = Zeroizing::new(frame.to_vec());
        let mut mode = cbc::Decryptor::<Twofish>::inner_iv_init(self.block_cipher()?, &Default::default());
        for block in buf.chunks_exact_mut(BLOCK_SIZE) {
            mode.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }

        if &buf[MAGIC_RANGE] != FRAME_MAGIC {
            return Err(CryptoError::DecryptionFailed("magic mismatch".into()));
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&buf[LEN_RANGE]);
        let declared = u32::from_le_bytes(len_bytes) as usize;
        if declared > buf.len() - HEADER_LEN {
            return Err(CryptoError::DecryptionFailed(format!(
                "declared length {} exceeds frame body",
                declared
            )));
        }

        Ok(buf[HEADER_LEN..HEADER_LEN + declared].to_vec())
    }
}

impl std::fmt::Debug for FrameCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCipher").finish_non_exhaustive()
    }
}
