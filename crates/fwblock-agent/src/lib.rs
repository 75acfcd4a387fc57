//! # Firewall Block Agent Client
//!
//! Client side of the firewall block agent protocol. When the detection
//! engine raises an alert whose rule carries a block policy, this crate
//! asks every configured firewall agent to block the offending address.
//!
//! ## Protocol in Brief
//!
//! - One short TCP connection per request, no keep-alive.
//! - Every packet is a fixed 32-byte record, encrypted with a per-agent
//!   session key (see `fwblock-crypto`).
//! - A check-in establishes sequence numbers; any acknowledgement may ask
//!   for a key rotation derived from both sides' sequence numbers and key
//!   modifiers.
//! - Agents that fail to authenticate are dropped; agents that are merely
//!   unreachable are retried on the next alert.
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture with:
//! - **Domain Layer:** wire codec, policies, dedup ring, endpoints, key rotation
//! - **Ports Layer:** `Transport`, `Connection` and `TimeSource` traits
//! - **Service Layer:** handshake, dispatcher and the `AgentClient` facade
//! - **Adapters Layer:** TCP transport, system clock, TOML config (feature-gated)
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fwblock_agent::{
//!     adapters::{SystemTimeSource, TcpTransport, TomlConfigLoader},
//!     service::{AgentClient, AgentLink},
//!     Alert,
//! };
//!
//! let config = TomlConfigLoader::load("/etc/fwblock/agents.toml").unwrap();
//! let link = AgentLink::new(Arc::new(TcpTransport::new()), Arc::new(SystemTimeSource), config.timing);
//! let mut client = AgentClient::new(link, &config.client);
//! let agents = client.attach_all(&config.endpoints);
//!
//! let alert = Alert::new("10.0.0.66".parse().unwrap(), "10.0.0.1".parse().unwrap(), 6, 2001)
//!     .with_ports(40000, 22);
//! let policy = config.policy_for(alert.sig_id);
//! let report = client.on_alert(&alert, Some(&policy), &agents);
//! println!("delivered to {} agents", report.delivered());
//!
//! client.shutdown();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod domain;
pub mod ports;
pub mod service;

/// Adapters for external integrations (TCP and TOML are feature-gated).
pub mod adapters;

// =============================================================================
// TEST SUPPORT
// =============================================================================

/// Test utilities (scripted agents, manual clock).
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export main types
pub use domain::{
    parse_duration, AgentConfig, Alert, BlockPolicy, BlockRequest, ClientConfig, EndpointSpec,
    How, LogLevel, PolicyTable, Timing, Who,
};
pub use ports::{Connection, NetworkError, TimeSource, Transport};
pub use service::{AgentClient, AgentLink, DispatchOutcome, DispatchReport, EndpointOutcome};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
