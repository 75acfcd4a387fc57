//! # Adapters
//!
//! Production implementations of the driven ports.
//!
//! - `SystemTimeSource` - wall clock
//! - `TcpTransport` - TCP connections with bind-before-connect (requires "network" feature)
//! - `TomlConfigLoader` - config file loading (requires "config" feature)

/// Time source adapters
pub mod time;

/// TCP transport
#[cfg(feature = "network")]
pub mod tcp;

/// TOML configuration
#[cfg(feature = "config")]
pub mod config;

pub use time::SystemTimeSource;

#[cfg(feature = "network")]
pub use tcp::TcpTransport;

#[cfg(feature = "config")]
pub use config::{ConfigError, TomlConfigLoader};
