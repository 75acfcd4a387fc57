//! # Handshake
//!
//! Check-in announces this sensor to an agent and learns the agent's
//! sequence number; the agent may rotate the key in its reply. Check-out
//! is the same exchange on the way out and never fails the caller.
//!
//! ```text
//! Idle -> Connecting -> AwaitingResponse -> Established
//!            |                 |
//!            +-----------------+----------> Failed
//! ```

use tracing::{debug, error, info, trace, warn};

use crate::domain::{Endpoint, ProtocolPacket, RotationKind, Status};

use super::exchange;
use super::{AgentLink, ExchangeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeState {
    Idle,
    Connecting,
    AwaitingResponse,
    Established,
    Failed,
}

fn enter(state: &mut HandshakeState, next: HandshakeState, endpoint: &Endpoint) {
    trace!(endpoint = %endpoint.id(), from = ?*state, to = ?next, "handshake transition");
    *state = next;
}

/// Check-in / check-out driver.
#[derive(Debug, Clone, Copy)]
pub struct HandshakeProtocol<'a> {
    link: &'a AgentLink,
}

impl<'a> HandshakeProtocol<'a> {
    /// Create a driver over `link`.
    pub fn new(link: &'a AgentLink) -> Self {
        Self { link }
    }

    /// Check in to `endpoint`.
    ///
    /// On success the endpoint has the agent's sequence number and, if the
    /// agent asked for it, a rotated key.
    ///
    /// # Errors
    ///
    /// Connect, send and timeout failures are returned as-is. A reply that
    /// does not decrypt, has another version or a status other than OK,
    /// NEWKEY or RESYNC fails the check-in.
    pub fn check_in(&self, endpoint: &mut Endpoint) -> Result<(), ExchangeError> {
        let mut state = HandshakeState::Idle;
        let result = self.run_check_in(endpoint, &mut state);
        match &result {
            Ok(()) => enter(&mut state, HandshakeState::Established, endpoint),
            Err(err) => {
                enter(&mut state, HandshakeState::Failed, endpoint);
                match err {
                    ExchangeError::Connect(_) => {
                        warn!(endpoint = %endpoint.id(), error = %err, "could not connect, will try later")
                    }
                    ExchangeError::Send(_) | ExchangeError::Timeout(_) | ExchangeError::Receive(_) => {
                        warn!(endpoint = %endpoint.id(), error = %err, "check-in incomplete, will try later")
                    }
                    ExchangeError::PasswordMismatch => {
                        error!(endpoint = %endpoint.id(), "password mismatch, ignoring host")
                    }
                    ExchangeError::VersionMismatch(v) => {
                        error!(endpoint = %endpoint.id(), version = v, "protocol version error, ignoring host")
                    }
                    _ => error!(endpoint = %endpoint.id(), error = %err, "funky handshake error, ignoring host"),
                }
            }
        }
        result
    }

    fn run_check_in(&self, endpoint: &mut Endpoint, state: &mut HandshakeState) -> Result<(), ExchangeError> {
        enter(state, HandshakeState::Connecting, endpoint);
        let mut conn = exchange::connect(self.link, endpoint)?;
        info!(endpoint = %endpoint.id(), "connected to agent");

        let packet = ProtocolPacket {
            local_seq: endpoint.local_seq(),
            remote_seq: endpoint.remote_seq(),
            ..ProtocolPacket::new(Status::CheckIn)
        }
        .with_key_modifier(endpoint.local_key_modifier());
        exchange::send(conn.as_mut(), endpoint, &packet)?;

        enter(state, HandshakeState::AwaitingResponse, endpoint);
        let timing = self.link.timing;
        let reply = exchange::receive(conn.as_mut(), endpoint, timing.response_timeout, timing.poll_interval)?;
        exchange::check_version(&reply)?;

        match reply.status {
            Status::Ok | Status::NewKey | Status::Resync => {
                endpoint.record_contact(&reply, self.link.clock.now());
                let rotation = match reply.status {
                    Status::NewKey => Some(RotationKind::NewKey),
                    Status::Resync => Some(RotationKind::Resync),
                    _ => None,
                };
                if let Some(kind) = rotation {
                    endpoint.rotate_key(kind, &reply)?;
                    debug!(endpoint = %endpoint.id(), ?kind, "generated new encryption key");
                }
                Ok(())
            }
            Status::Error => Err(ExchangeError::Rejected),
            other => Err(ExchangeError::UnexpectedStatus(other.into())),
        }
    }

    /// Check out from `endpoint`. Best effort: problems are logged only.
    ///
    /// Returns true if the agent acknowledged.
    pub fn check_out(&self, endpoint: &mut Endpoint) -> bool {
        match self.run_check_out(endpoint) {
            Ok(()) => true,
            Err(err) => {
                warn!(endpoint = %endpoint.id(), error = %err, "check-out incomplete, quitting anyway");
                false
            }
        }
    }

    fn run_check_out(&self, endpoint: &mut Endpoint) -> Result<(), ExchangeError> {
        let mut conn = exchange::connect(self.link, endpoint)?;
        info!(endpoint = %endpoint.id(), "disconnecting from agent");

        let local_seq = endpoint.advance_local_seq();
        let packet = ProtocolPacket {
            local_seq,
            remote_seq: endpoint.remote_seq(),
            ..ProtocolPacket::new(Status::CheckOut)
        };
        exchange::send(conn.as_mut(), endpoint, &packet)?;

        let timing = self.link.timing;
        let reply = exchange::receive(conn.as_mut(), endpoint, timing.response_timeout, timing.poll_interval)?;
        exchange::check_version(&reply)
    }
}
