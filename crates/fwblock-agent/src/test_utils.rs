//! Test utilities for the block client.
//!
//! In-process fakes for the driven ports. Enable with the `test-utils`
//! feature flag.
//!
//! - [`ManualClock`]: a time source that only moves when told to
//! - [`FakeNetwork`] / [`FakeAgent`]: scripted agents behind the
//!   [`Transport`] port that speak the real cipher and mirror key
//!   rotation
//!
//! # Example
//!
//! ```rust,ignore
//! use fwblock_agent::test_utils::{FakeAgent, FakeNetwork, Reply};
//!
//! let agent = FakeAgent::new("secret", 100);
//! agent.script([Reply::Ok, Reply::NewKey { nonce: 7, key_modifier: [1, 2, 3, 4] }]);
//! let network = FakeNetwork::new().with_agent("192.0.2.1:898".parse().unwrap(), agent.clone());
//! assert_eq!(network.agent_count(), 1);
//! ```

use std::collections::{HashMap, VecDeque};
use std::net::{SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fwblock_crypto::{FrameCipher, SessionKey};
use parking_lot::Mutex;

use crate::domain::{
    CipherSession, KeyRotation, ProtocolPacket, Status, Timestamp, PACKET_LEN,
};
use crate::ports::{Connection, NetworkError, TimeSource, Transport};

// ============================================================================
// ManualClock
// ============================================================================

/// A time source that only advances when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    secs: Arc<AtomicU64>,
}

impl ManualClock {
    /// Start the clock at `secs`.
    pub fn new(secs: u64) -> Self {
        Self {
            secs: Arc::new(AtomicU64::new(secs)),
        }
    }

    /// Move forward by `secs`.
    pub fn advance(&self, secs: u64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }

    /// Jump to `secs`.
    pub fn set(&self, secs: u64) {
        self.secs.store(secs, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.secs.load(Ordering::SeqCst))
    }
}

// ============================================================================
// FakeAgent
// ============================================================================

/// How the fake agent answers one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Refuse the connection
    Refuse,
    /// Accept, then never answer
    Silent,
    /// Answer OK
    Ok,
    /// Answer ERROR
    Error,
    /// Answer NEWKEY and rotate from the current key
    NewKey {
        /// Nonce sent in the protocol field
        nonce: u16,
        /// Agent key modifier
        key_modifier: [u8; 4],
    },
    /// Answer RESYNC and rotate from the original key
    Resync {
        /// Nonce sent in the protocol field
        nonce: u16,
        /// Agent key modifier
        key_modifier: [u8; 4],
    },
    /// Answer HOLD, then the inner reply on the same connection
    Hold(Box<Reply>),
    /// Answer a frame sealed with an unrelated key
    Garbage,
    /// Answer OK with another protocol version
    Version(u8),
    /// Answer with an arbitrary status code
    Status(u8),
    /// Answer OK sealed under the original key
    OkUnderOriginalKey,
}

#[derive(Debug)]
struct AgentState {
    original: SessionKey,
    current: SessionKey,
    agent_seq: u16,
    sensor_modifier: [u8; 4],
    script: VecDeque<Reply>,
    received: Vec<ProtocolPacket>,
    connects: usize,
    undecryptable: usize,
}

/// A scripted agent. Clones share state.
#[derive(Debug, Clone)]
pub struct FakeAgent {
    state: Arc<Mutex<AgentState>>,
}

impl FakeAgent {
    /// Agent with key `key` that reports sequence number `agent_seq`.
    pub fn new(key: &str, agent_seq: u16) -> Self {
        let original = SessionKey::from_passphrase(key);
        Self {
            state: Arc::new(Mutex::new(AgentState {
                current: original.clone(),
                original,
                agent_seq,
                sensor_modifier: [0; 4],
                script: VecDeque::new(),
                received: Vec::new(),
                connects: 0,
                undecryptable: 0,
            })),
        }
    }

    /// Queue replies, one per future connection. An empty script answers OK.
    pub fn script<I: IntoIterator<Item = Reply>>(&self, replies: I) {
        self.state.lock().script.extend(replies);
    }

    /// Packets received so far, in order.
    pub fn received(&self) -> Vec<ProtocolPacket> {
        self.state.lock().received.clone()
    }

    /// Statuses received so far, in order.
    pub fn received_statuses(&self) -> Vec<Status> {
        self.state.lock().received.iter().map(|p| p.status).collect()
    }

    /// Number of connection attempts, refused ones included.
    pub fn connect_count(&self) -> usize {
        self.state.lock().connects
    }

    /// Frames the agent could not decrypt.
    pub fn undecryptable_count(&self) -> usize {
        self.state.lock().undecryptable
    }

    /// The agent's current key.
    pub fn current_key(&self) -> SessionKey {
        self.state.lock().current.clone()
    }

    /// Forget any rotation, as after an agent restart.
    pub fn reset_key(&self) {
        let mut state = self.state.lock();
        state.current = state.original.clone();
    }

    fn next_reply(&self) -> Reply {
        let mut state = self.state.lock();
        state.connects += 1;
        state.script.pop_front().unwrap_or(Reply::Ok)
    }
}

impl AgentState {
    fn open(&mut self, frame: &[u8]) -> Option<ProtocolPacket> {
        let attempt = |key: &SessionKey| {
            let plain = FrameCipher::new(key).ok()?.open(frame).ok()?;
            (plain.len() == PACKET_LEN)
                .then(|| ProtocolPacket::decode(&plain).ok())
                .flatten()
        };
        let packet = attempt(&self.current).or_else(|| attempt(&self.original));
        if packet.is_none() {
            self.undecryptable += 1;
        }
        packet
    }

    fn seal(key: &SessionKey, packet: &ProtocolPacket) -> Vec<u8> {
        match FrameCipher::new(key).and_then(|c| c.seal(&packet.encode())) {
            Ok(frame) => frame,
            Err(_) => Vec::new(),
        }
    }

    fn respond(&mut self, request: &ProtocolPacket, reply: &Reply, out: &mut VecDeque<Vec<u8>>) {
        self.agent_seq = self.agent_seq.wrapping_add(1);
        let mut packet = ProtocolPacket {
            local_seq: request.local_seq,
            remote_seq: self.agent_seq,
            ..ProtocolPacket::new(Status::Ok)
        };

        match reply {
            Reply::Refuse | Reply::Silent => {}
            Reply::Ok => out.push_back(Self::seal(&self.current, &packet)),
            Reply::Error => {
                packet.status = Status::Error;
                out.push_back(Self::seal(&self.current, &packet));
            }
            Reply::NewKey { nonce, key_modifier } | Reply::Resync { nonce, key_modifier } => {
                let resync = matches!(reply, Reply::Resync { .. });
                packet.status = if resync { Status::Resync } else { Status::NewKey };
                packet.protocol = *nonce;
                let packet = packet.with_key_modifier(*key_modifier);
                out.push_back(Self::seal(&self.current, &packet));

                let rotation = KeyRotation {
                    local_seq: packet.local_seq,
                    remote_seq: packet.remote_seq,
                    nonce: *nonce,
                    local_modifier: self.sensor_modifier,
                    remote_modifier: *key_modifier,
                };
                let base = if resync { &self.original } else { &self.current };
                self.current = CipherSession::derive_key(&rotation, base);
            }
            Reply::Hold(next) => {
                packet.status = Status::Hold;
                out.push_back(Self::seal(&self.current, &packet));
                self.respond(request, next, out);
            }
            Reply::Garbage => {
                out.push_back(Self::seal(&SessionKey::from_passphrase("garbage"), &packet));
            }
            Reply::Version(version) => {
                packet.version = *version;
                out.push_back(Self::seal(&self.current, &packet));
            }
            Reply::Status(code) => {
                packet.status = Status::from(*code);
                out.push_back(Self::seal(&self.current, &packet));
            }
            Reply::OkUnderOriginalKey => out.push_back(Self::seal(&self.original, &packet)),
        }
    }
}

struct FakeConnection {
    agent: FakeAgent,
    reply: Reply,
    outbox: VecDeque<Vec<u8>>,
}

impl Connection for FakeConnection {
    fn send(&mut self, frame: &[u8]) -> Result<(), NetworkError> {
        let mut state = self.agent.state.lock();
        let Some(request) = state.open(frame) else {
            return Ok(());
        };
        state.received.push(request);
        if request.status == Status::CheckIn {
            state.sensor_modifier = request.key_modifier();
        }
        let reply = self.reply.clone();
        state.respond(&request, &reply, &mut self.outbox);
        Ok(())
    }

    fn receive(&mut self, len: usize, _budget: Duration, _poll: Duration) -> Result<Vec<u8>, NetworkError> {
        match self.outbox.pop_front() {
            Some(frame) if frame.len() == len => Ok(frame),
            Some(_) => Err(NetworkError::Io("short frame".into())),
            None => Err(NetworkError::Timeout),
        }
    }
}

// ============================================================================
// FakeNetwork
// ============================================================================

/// A [`Transport`] routing connections to fake agents by address.
#[derive(Debug, Clone, Default)]
pub struct FakeNetwork {
    agents: HashMap<SocketAddrV4, FakeAgent>,
}

impl FakeNetwork {
    /// Network with no agents; every connect is refused.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add an agent at `addr`.
    pub fn with_agent(mut self, addr: SocketAddrV4, agent: FakeAgent) -> Self {
        self.agents.insert(addr, agent);
        self
    }

    /// Number of agents.
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }
}

impl Transport for FakeNetwork {
    fn connect(
        &self,
        _local: SocketAddr,
        remote: SocketAddrV4,
        _timeout: Duration,
    ) -> Result<Box<dyn Connection>, NetworkError> {
        let agent = self.agents.get(&remote).ok_or(NetworkError::ConnectionRefused)?;
        let reply = agent.next_reply();
        if reply == Reply::Refuse {
            return Err(NetworkError::ConnectionRefused);
        }
        Ok(Box::new(FakeConnection {
            agent: agent.clone(),
            reply,
            outbox: VecDeque::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(1000);
        assert_eq!(clock.now().as_secs(), 1000);
        clock.advance(25);
        assert_eq!(clock.now().as_secs(), 1025);
        clock.set(5);
        assert_eq!(clock.now().as_secs(), 5);
    }

    #[test]
    fn test_unknown_address_refused() {
        let network = FakeNetwork::new();
        let result = network.connect(
            "0.0.0.0:0".parse().unwrap(),
            "192.0.2.9:898".parse().unwrap(),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(NetworkError::ConnectionRefused)));
    }

    #[test]
    fn test_agent_answers_ok_by_default() {
        let agent = FakeAgent::new("secret", 50);
        let addr: SocketAddrV4 = "192.0.2.1:898".parse().unwrap();
        let network = FakeNetwork::new().with_agent(addr, agent.clone());

        let mut conn = network
            .connect("0.0.0.0:0".parse().unwrap(), addr, Duration::from_secs(1))
            .unwrap();
        let session = CipherSession::new(SessionKey::from_passphrase("secret")).unwrap();
        let request = ProtocolPacket::new(Status::CheckIn);
        conn.send(&session.seal(&request).unwrap()).unwrap();

        let frame = conn
            .receive(48, Duration::from_secs(1), Duration::from_millis(1))
            .unwrap();
        let reply = session.open(&frame).unwrap();
        assert_eq!(reply.status, Status::Ok);
        assert_eq!(reply.remote_seq, 51);
        assert_eq!(agent.received_statuses(), vec![Status::CheckIn]);
    }
}
