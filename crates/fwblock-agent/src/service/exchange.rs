//! Request/reply plumbing shared by the handshake and the dispatcher.

use std::time::Duration;

use tracing::{debug, info};

use crate::domain::{Endpoint, ProtocolPacket, FRAME_LEN, PROTOCOL_VERSION};
use crate::ports::{Connection, NetworkError};

use super::{AgentLink, ExchangeError};

/// Open a connection to `endpoint` from its local bind address.
pub(crate) fn connect(link: &AgentLink, endpoint: &Endpoint) -> Result<Box<dyn Connection>, ExchangeError> {
    link.transport
        .connect(endpoint.local_bind(), endpoint.id(), link.timing.connect_timeout)
        .map_err(ExchangeError::Connect)
}

/// Seal `packet` under the endpoint's current key and send it.
pub(crate) fn send(
    conn: &mut dyn Connection,
    endpoint: &Endpoint,
    packet: &ProtocolPacket,
) -> Result<(), ExchangeError> {
    debug!(
        endpoint = %endpoint.id(),
        status = ?packet.status,
        local_seq = packet.local_seq,
        remote_seq = packet.remote_seq,
        "sending packet"
    );
    let frame = endpoint.session().seal(packet)?;
    conn.send(&frame).map_err(ExchangeError::Send)
}

/// Wait for one reply frame and open it, falling back to the original key.
///
/// `budget` timeouts come back as `ExchangeError::Timeout`.
pub(crate) fn receive(
    conn: &mut dyn Connection,
    endpoint: &mut Endpoint,
    budget: Duration,
    poll_interval: Duration,
) -> Result<ProtocolPacket, ExchangeError> {
    let frame = conn
        .receive(FRAME_LEN, budget, poll_interval)
        .map_err(|e| match e {
            NetworkError::Timeout => ExchangeError::Timeout(budget),
            other => ExchangeError::Receive(other),
        })?;

    let opened = endpoint
        .session_mut()
        .open_with_fallback(&frame)
        .map_err(|_| ExchangeError::PasswordMismatch)?;
    if opened.used_original {
        info!(endpoint = %endpoint.id(), "had to use initial key");
    }

    let reply = opened.packet;
    debug!(
        endpoint = %endpoint.id(),
        status = ?reply.status,
        local_seq = reply.local_seq,
        remote_seq = reply.remote_seq,
        version = reply.version,
        "received packet"
    );
    Ok(reply)
}

/// Reject replies of another protocol version.
pub(crate) fn check_version(reply: &ProtocolPacket) -> Result<(), ExchangeError> {
    if reply.version == PROTOCOL_VERSION {
        Ok(())
    } else {
        Err(ExchangeError::VersionMismatch(reply.version))
    }
}
