//! Ports Layer - interfaces the host provides
//!
//! - `outbound`: transport and clock (driven ports)

pub mod outbound;

pub use outbound::*;
