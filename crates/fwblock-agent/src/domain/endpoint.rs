//! Remote agent endpoint and its per-connection protocol state.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use fwblock_crypto::{CryptoError, SessionKey};
use rand::Rng;

use super::cipher_session::{CipherSession, KeyRotation, RotationKind};
use super::types::Timestamp;
use super::wire::ProtocolPacket;

/// Inclusive range for the initial sensor sequence number.
pub const INITIAL_SEQ_RANGE: std::ops::RangeInclusive<u16> = 20..=65500;

/// Consecutive `ERROR` replies after which an endpoint is given up.
pub const MAX_ERROR_STREAK: u8 = 2;

/// Endpoints are identified by address and port.
pub type EndpointId = SocketAddrV4;

/// One firewall agent this sensor talks to.
#[derive(Debug)]
pub struct Endpoint {
    id: EndpointId,
    local_bind: SocketAddr,
    session: CipherSession,
    local_seq: u16,
    remote_seq: u16,
    local_key_modifier: [u8; 4],
    remote_key_modifier: [u8; 4],
    last_contact: Option<Timestamp>,
    alive: bool,
    error_streak: u8,
}

impl Endpoint {
    /// Create an endpoint with a random initial sequence number and key
    /// modifier.
    pub fn new<R: Rng + ?Sized>(id: EndpointId, key: SessionKey, rng: &mut R) -> Result<Self, CryptoError> {
        let local_seq = rng.gen_range(INITIAL_SEQ_RANGE);
        let modifier: [u8; 4] = rng.gen();
        Self::with_state(id, key, local_seq, modifier)
    }

    /// Create an endpoint with explicit initial state.
    pub fn with_state(
        id: EndpointId,
        key: SessionKey,
        local_seq: u16,
        local_key_modifier: [u8; 4],
    ) -> Result<Self, CryptoError> {
        Ok(Self {
            id,
            local_bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            session: CipherSession::new(key)?,
            local_seq,
            remote_seq: 0,
            local_key_modifier,
            remote_key_modifier: [0; 4],
            last_contact: None,
            alive: true,
            error_streak: 0,
        })
    }

    /// Builder: local address to bind outgoing connections to.
    pub fn with_local_bind(mut self, local_bind: SocketAddr) -> Self {
        self.local_bind = local_bind;
        self
    }

    /// Agent address and port.
    pub fn id(&self) -> EndpointId {
        self.id
    }

    /// Local bind address.
    pub fn local_bind(&self) -> SocketAddr {
        self.local_bind
    }

    /// Sensor sequence number as last sent.
    pub fn local_seq(&self) -> u16 {
        self.local_seq
    }

    /// Agent sequence number as last received.
    pub fn remote_seq(&self) -> u16 {
        self.remote_seq
    }

    /// Key modifier announced to the agent at check-in.
    pub fn local_key_modifier(&self) -> [u8; 4] {
        self.local_key_modifier
    }

    /// Key modifier last announced by the agent.
    pub fn remote_key_modifier(&self) -> [u8; 4] {
        self.remote_key_modifier
    }

    /// When the agent last answered.
    pub fn last_contact(&self) -> Option<Timestamp> {
        self.last_contact
    }

    /// False once the endpoint has been given up.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Consecutive `ERROR` replies since the last good block.
    pub fn error_streak(&self) -> u8 {
        self.error_streak
    }

    /// Cipher state.
    pub fn session(&self) -> &CipherSession {
        &self.session
    }

    /// Mutable cipher state.
    pub fn session_mut(&mut self) -> &mut CipherSession {
        &mut self.session
    }

    /// Step the sensor sequence before a block or check-out. Check-ins
    /// reuse the current value.
    pub fn advance_local_seq(&mut self) -> u16 {
        self.local_seq = self.local_seq.wrapping_add(self.remote_seq);
        self.local_seq
    }

    /// Record a decoded reply from the agent.
    pub fn record_contact(&mut self, reply: &ProtocolPacket, now: Timestamp) {
        self.remote_seq = reply.remote_seq;
        self.last_contact = Some(now);
    }

    /// Apply the key rotation requested by `reply`.
    pub fn rotate_key(&mut self, kind: RotationKind, reply: &ProtocolPacket) -> Result<(), CryptoError> {
        self.remote_key_modifier = reply.key_modifier();
        let rotation = KeyRotation {
            local_seq: reply.local_seq,
            remote_seq: reply.remote_seq,
            nonce: reply.protocol,
            local_modifier: self.local_key_modifier,
            remote_modifier: self.remote_key_modifier,
        };
        self.session.rotate(kind, &rotation)
    }

    /// Count an `ERROR` reply and return the new streak.
    pub fn note_error(&mut self) -> u8 {
        self.error_streak = self.error_streak.saturating_add(1);
        self.error_streak
    }

    /// Reset the error streak after a successful block.
    pub fn clear_errors(&mut self) {
        self.error_streak = 0;
    }

    /// Give up on this endpoint.
    pub fn evict(&mut self) {
        self.alive = false;
    }
}
