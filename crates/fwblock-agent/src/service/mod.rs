//! # Service Layer
//!
//! Wires the domain to the ports:
//!
//! - `handshake`: check-in and check-out exchanges
//! - `dispatcher`: block requests fanned out to every live endpoint
//! - `client`: the facade a detection engine talks to

pub mod client;
pub mod dispatcher;
pub mod errors;
mod exchange;
pub mod handshake;


pub use client::AgentClient;
pub use dispatcher::{BlockDispatcher, DispatchOutcome, DispatchReport, EndpointOutcome};
pub use errors::{Disposition, ExchangeError};
pub use handshake::HandshakeProtocol;

use std::sync::Arc;

use crate::domain::Timing;
use crate::ports::{TimeSource, Transport};

/// Everything an exchange needs from the outside world.
#[derive(Clone)]
pub struct AgentLink {
    /// Connection factory
    pub transport: Arc<dyn Transport>,
    /// Clock for last-contact and dedup timestamps
    pub clock: Arc<dyn TimeSource>,
    /// Network budgets
    pub timing: Timing,
}

impl AgentLink {
    /// Bundle a transport, a clock and timing tunables.
    pub fn new(transport: Arc<dyn Transport>, clock: Arc<dyn TimeSource>, timing: Timing) -> Self {
        Self {
            transport,
            clock,
            timing,
        }
    }
}

impl std::fmt::Debug for AgentLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentLink")
            .field("timing", &self.timing)
            .finish_non_exhaustive()
    }
}
