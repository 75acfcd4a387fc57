//! # Block Dispatcher
//!
//! Turns one alert into a BLOCK request for every live endpoint of the
//! alert's list, one endpoint at a time, one fresh connection each.
//!
//! Nothing escapes to the caller: each endpoint's result is logged and
//! recorded in the [`DispatchReport`]. Failures are handled per the
//! error's [`Disposition`]:
//!
//! | Failure | Result |
//! |---------|--------|
//! | connect / send / timeout / hold expiry | skipped this round |
//! | password, version or status mismatch | evicted |
//! | `ERROR` (first) | re-handshake, then the block is re-sent |
//! | `ERROR` (second in a row) or failed re-handshake | evicted |

use tracing::{debug, error, warn};

use crate::domain::{
    Alert, BlockPolicy, BlockRequest, DedupCache, Endpoint, EndpointId, EndpointRegistry,
    ProtocolPacket, RotationKind, Status, MAX_ERROR_STREAK,
};
use crate::ports::Connection;

use super::exchange;
use super::handshake::HandshakeProtocol;
use super::{AgentLink, Disposition, ExchangeError};

/// Result of one endpoint's exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointOutcome {
    /// Agent acknowledged the block
    Delivered,
    /// Endpoint skipped this round; still live
    Deferred(ExchangeError),
    /// Endpoint given up
    Evicted(ExchangeError),
}

/// What happened to the alert as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No policy for the alert's rule
    NoPolicy,
    /// Repeat of a recent request; nothing sent
    Suppressed,
    /// Sent to the endpoints listed in the report
    Dispatched,
}

/// Per-alert report for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Overall outcome
    pub outcome: DispatchOutcome,
    /// Per-endpoint results, in list order
    pub endpoints: Vec<(EndpointId, EndpointOutcome)>,
}

impl DispatchReport {
    fn empty(outcome: DispatchOutcome) -> Self {
        Self {
            outcome,
            endpoints: Vec::new(),
        }
    }

    /// Number of endpoints that acknowledged.
    pub fn delivered(&self) -> usize {
        self.endpoints
            .iter()
            .filter(|(_, o)| matches!(o, EndpointOutcome::Delivered))
            .count()
    }

    /// Endpoints evicted by this alert.
    pub fn evicted(&self) -> impl Iterator<Item = EndpointId> + '_ {
        self.endpoints
            .iter()
            .filter(|(_, o)| matches!(o, EndpointOutcome::Evicted(_)))
            .map(|(id, _)| *id)
    }

    /// Result for one endpoint, if it was contacted.
    pub fn outcome_for(&self, id: EndpointId) -> Option<&EndpointOutcome> {
        self.endpoints.iter().find(|(e, _)| *e == id).map(|(_, o)| o)
    }
}

/// Sends block requests and applies the failure policy.
#[derive(Debug)]
pub struct BlockDispatcher {
    link: AgentLink,
    dedup: DedupCache,
}

impl BlockDispatcher {
    /// Create a dispatcher with a suppression window of at most
    /// `dedup_window_secs`.
    pub fn new(link: AgentLink, dedup_window_secs: u64) -> Self {
        Self {
            link,
            dedup: DedupCache::new(dedup_window_secs),
        }
    }

    /// The repeat suppression ring.
    pub fn dedup(&self) -> &DedupCache {
        &self.dedup
    }

    /// Handle one alert whose rule resolved to `policy`.
    pub fn on_alert(
        &mut self,
        alert: &Alert,
        policy: Option<&BlockPolicy>,
        endpoints: &EndpointRegistry,
    ) -> DispatchReport {
        let Some(policy) = policy else {
            debug!(sid = alert.sig_id, "no block policy for rule");
            return DispatchReport::empty(DispatchOutcome::NoPolicy);
        };
        let request = BlockRequest::new(alert, *policy, self.link.clock.now());
        self.dispatch(&request, endpoints)
    }

    /// Send `request` to every live endpoint in `endpoints`.
    pub fn dispatch(&mut self, request: &BlockRequest, endpoints: &EndpointRegistry) -> DispatchReport {
        if self.dedup.admit(request).is_suppressed() {
            debug!(
                sid = request.sig_id,
                src = %request.src,
                dst = %request.dst,
                "skipping repetitive block"
            );
            return DispatchReport::empty(DispatchOutcome::Suppressed);
        }

        let mut report = DispatchReport::empty(DispatchOutcome::Dispatched);
        for handle in endpoints.all() {
            let mut endpoint = handle.lock();
            if !endpoint.is_alive() {
                continue;
            }
            let outcome = self.deliver(&mut endpoint, request);
            report.endpoints.push((endpoint.id(), outcome));
        }
        report
    }

    fn deliver(&self, endpoint: &mut Endpoint, request: &BlockRequest) -> EndpointOutcome {
        loop {
            let err = match self.send_block(endpoint, request) {
                Ok(()) => {
                    endpoint.clear_errors();
                    return EndpointOutcome::Delivered;
                }
                Err(err) => err,
            };

            match err.disposition() {
                Disposition::Defer => {
                    warn!(endpoint = %endpoint.id(), error = %err, "could not send block, will try later");
                    return EndpointOutcome::Deferred(err);
                }
                Disposition::Evict => {
                    error!(endpoint = %endpoint.id(), error = %err, "ignoring host");
                    endpoint.evict();
                    return EndpointOutcome::Evicted(err);
                }
                Disposition::Renegotiate => {
                    if endpoint.note_error() >= MAX_ERROR_STREAK {
                        error!(endpoint = %endpoint.id(), "could not renegotiate key, ignoring host");
                        endpoint.evict();
                        return EndpointOutcome::Evicted(err);
                    }
                    debug!(endpoint = %endpoint.id(), "agent reported an error, checking in again");
                    if let Err(handshake_err) = HandshakeProtocol::new(&self.link).check_in(endpoint) {
                        // Unreachable agents keep their streak and are retried on a later alert.
                        if handshake_err.disposition() == Disposition::Defer {
                            warn!(endpoint = %endpoint.id(), error = %handshake_err, "re-handshake incomplete, will try later");
                            return EndpointOutcome::Deferred(handshake_err);
                        }
                        error!(endpoint = %endpoint.id(), error = %handshake_err, "re-handshake failed, ignoring host");
                        endpoint.evict();
                        return EndpointOutcome::Evicted(handshake_err);
                    }
                }
            }
        }
    }

    fn send_block(&self, endpoint: &mut Endpoint, request: &BlockRequest) -> Result<(), ExchangeError> {
        let mut conn = exchange::connect(&self.link, endpoint)?;
        debug!(endpoint = %endpoint.id(), "connected to agent");

        let local_seq = endpoint.advance_local_seq();
        let packet = request.to_packet(local_seq, endpoint.remote_seq());
        debug!(
            endpoint = %endpoint.id(),
            sid = request.sig_id,
            src = %request.src,
            dst = %request.dst,
            src_port = request.src_port,
            dst_port = request.dst_port,
            protocol = request.protocol,
            duration = request.policy.duration_secs,
            mode = packet.mode,
            "sending block"
        );
        exchange::send(conn.as_mut(), endpoint, &packet)?;

        let timing = self.link.timing;
        let reply = exchange::receive(conn.as_mut(), endpoint, timing.response_timeout, timing.poll_interval)?;
        self.settle(conn.as_mut(), endpoint, reply)
    }

    fn settle(
        &self,
        conn: &mut dyn Connection,
        endpoint: &mut Endpoint,
        reply: ProtocolPacket,
    ) -> Result<(), ExchangeError> {
        exchange::check_version(&reply)?;
        match reply.status {
            Status::Ok | Status::NewKey | Status::Resync => {
                endpoint.record_contact(&reply, self.link.clock.now());
                Self::rotate_if_asked(endpoint, &reply)
            }
            Status::Hold => {
                endpoint.record_contact(&reply, self.link.clock.now());
                debug!(endpoint = %endpoint.id(), "agent asked us to hold");

                let timing = self.link.timing;
                let delayed = exchange::receive(conn, endpoint, timing.hold_timeout, timing.poll_interval)
                    .map_err(|e| match e {
                        ExchangeError::Timeout(budget) => ExchangeError::HoldExpired(budget),
                        other => other,
                    })?;
                exchange::check_version(&delayed)?;
                match delayed.status {
                    status if status.is_acknowledgement() => {
                        endpoint.record_contact(&delayed, self.link.clock.now());
                        Self::rotate_if_asked(endpoint, &delayed)
                    }
                    Status::Error => Err(ExchangeError::Rejected),
                    other => Err(ExchangeError::UnexpectedStatus(other.into())),
                }
            }
            Status::Error => Err(ExchangeError::Rejected),
            other => Err(ExchangeError::UnexpectedStatus(other.into())),
        }
    }

    fn rotate_if_asked(endpoint: &mut Endpoint, reply: &ProtocolPacket) -> Result<(), ExchangeError> {
        let kind = match reply.status {
            Status::NewKey => RotationKind::NewKey,
            Status::Resync => RotationKind::Resync,
            _ => return Ok(()),
        };
        endpoint.rotate_key(kind, reply)?;
        debug!(endpoint = %endpoint.id(), ?kind, "generated new encryption key");
        Ok(())
    }
}
