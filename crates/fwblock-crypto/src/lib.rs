//! # FWBlock Crypto - Agent Link Cipher
//!
//! The block agent protocol encrypts every packet with a keyed block cipher
//! in CBC mode, wrapped in a one-block header that lets the receiver tell a
//! successful decryption apart from garbage.
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `key` | 256-bit key, default suffix padding | Per-endpoint session keys |
//! | `frame` | Twofish-256, CBC, zero IV | Sealing/opening protocol frames |
//!
//! ## Frame Layout
//!
//! ```text
//! +------------+-----------+------------------+------------------------+
//! | salt (u32) | len (u32) | magic "TwoFish\0"| payload (block padded) |
//! +------------+-----------+------------------+------------------------+
//!  \_____________ header block (16) _________/
//! ```
//!
//! The header is encrypted together with the payload, so the random salt
//! perturbs every following ciphertext block through the CBC chain.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod errors;
pub mod frame;
pub mod key;

// Re-exports
pub use errors::CryptoError;
pub use frame::{sealed_len, FrameCipher, BLOCK_SIZE, FRAME_MAGIC, HEADER_LEN};
pub use key::{SessionKey, DEFAULT_KEY_SUFFIX, KEY_LENGTH};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
