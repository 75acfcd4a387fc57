//! Domain Layer - protocol logic with no I/O
//!
//! - Wire codec for the fixed 32-byte packet
//! - Block policies, duration parsing and the per-signature table
//! - Repeat suppression ring
//! - Endpoints, their cipher sessions and the shared registry

pub mod cipher_session;
pub mod config;
pub mod dedup;
pub mod endpoint;
pub mod policy;
pub mod policy_table;
pub mod registry;
pub mod request;
/// Core value types
pub mod types;
pub mod wire;

pub use cipher_session::*;
pub use config::*;
pub use dedup::*;
pub use endpoint::*;
pub use policy::*;
pub use policy_table::*;
pub use registry::*;
pub use request::*;
pub use types::*;
pub use wire::*;
