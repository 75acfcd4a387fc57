//! # Agent Client
//!
//! Facade for the detection engine. Owns the process-wide endpoint list
//! and the dispatcher; each configuration consumer gets its own list of
//! handles from [`AgentClient::attach_all`].
//!
//! ```rust,ignore
//! let mut client = AgentClient::new(link, &config.client);
//! let agents = client.attach_all(&config.endpoints);
//! let report = client.on_alert(&alert, Some(&config.policy_for(alert.sig_id)), &agents);
//! client.shutdown();
//! ```

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs};
use std::sync::Arc;

use fwblock_crypto::SessionKey;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::domain::{
    Alert, BlockPolicy, BlockRequest, ClientConfig, Endpoint, EndpointHandle, EndpointRegistry,
    EndpointSpec,
};

use super::dispatcher::{BlockDispatcher, DispatchReport};
use super::handshake::HandshakeProtocol;
use super::AgentLink;

/// Resolve a configured host to its first IPv4 address.
///
/// Dotted quads are taken as-is; names go through the system resolver.
/// The unspecified address is rejected.
pub fn resolve_endpoint(spec: &EndpointSpec) -> Option<SocketAddrV4> {
    let ip = match spec.host.parse::<Ipv4Addr>() {
        Ok(ip) => Some(ip),
        Err(_) => (spec.host.as_str(), spec.port)
            .to_socket_addrs()
            .ok()?
            .find_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(*v4.ip()),
                SocketAddr::V6(_) => None,
            }),
    }?;
    (!ip.is_unspecified()).then(|| SocketAddrV4::new(ip, spec.port))
}

/// Client side of the block protocol.
#[derive(Debug)]
pub struct AgentClient {
    link: AgentLink,
    local_bind: SocketAddr,
    registry: EndpointRegistry,
    dispatcher: BlockDispatcher,
    shut_down: bool,
}

impl AgentClient {
    /// Create a client with no endpoints.
    pub fn new(link: AgentLink, client: &ClientConfig) -> Self {
        Self {
            dispatcher: BlockDispatcher::new(link.clone(), client.dedup_window_secs),
            link,
            local_bind: client.local_bind,
            registry: EndpointRegistry::new(),
            shut_down: false,
        }
    }

    /// The process-wide endpoint list.
    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// The dispatcher.
    pub fn dispatcher(&self) -> &BlockDispatcher {
        &self.dispatcher
    }

    /// Resolve `spec` and attach to it.
    ///
    /// Returns `None` if the host does not resolve or the check-in fails;
    /// such an endpoint is not retried.
    pub fn attach(&mut self, spec: &EndpointSpec) -> Option<EndpointHandle> {
        let Some(id) = resolve_endpoint(spec) else {
            warn!(host = %spec.host, "invalid host address, skipping");
            return None;
        };
        let candidate = match Endpoint::new(id, SessionKey::from_passphrase(&spec.key), &mut rand::thread_rng()) {
            Ok(endpoint) => endpoint.with_local_bind(self.local_bind),
            Err(err) => {
                error!(endpoint = %id, error = %err, "could not set up cipher, skipping");
                return None;
            }
        };
        self.attach_endpoint(candidate)
    }

    /// Attach a prepared endpoint. An endpoint with the same id that is
    /// already registered is reused without a new check-in.
    pub fn attach_endpoint(&mut self, mut candidate: Endpoint) -> Option<EndpointHandle> {
        if let Some(existing) = self.registry.find(candidate.id()) {
            debug!(endpoint = %candidate.id(), "already in global list, skipping check-in");
            return Some(existing);
        }
        match HandshakeProtocol::new(&self.link).check_in(&mut candidate) {
            Ok(()) => Some(self.registry.register(Arc::new(Mutex::new(candidate)))),
            Err(_) => None,
        }
    }

    /// Attach every spec and return the consumer's list of handles.
    pub fn attach_all<'s, I>(&mut self, specs: I) -> EndpointRegistry
    where
        I: IntoIterator<Item = &'s EndpointSpec>,
    {
        let mut consumer = EndpointRegistry::new();
        for spec in specs {
            if let Some(handle) = self.attach(spec) {
                let id = handle.lock().id();
                if consumer.find(id).is_some() {
                    debug!(endpoint = %id, "already in local list, skipping");
                    continue;
                }
                consumer.register(handle);
            }
        }
        info!(endpoints = consumer.len(), "attached to agents");
        consumer
    }

    /// Handle one alert. Never fails; see [`DispatchReport`].
    pub fn on_alert(
        &mut self,
        alert: &Alert,
        policy: Option<&BlockPolicy>,
        endpoints: &EndpointRegistry,
    ) -> DispatchReport {
        self.dispatcher.on_alert(alert, policy, endpoints)
    }

    /// Send a prepared request.
    pub fn dispatch(&mut self, request: &BlockRequest, endpoints: &EndpointRegistry) -> DispatchReport {
        self.dispatcher.dispatch(request, endpoints)
    }

    /// Check out from every live endpoint. Only the first call does
    /// anything; returns the number of acknowledged check-outs.
    pub fn shutdown(&mut self) -> usize {
        if self.shut_down {
            return 0;
        }
        self.shut_down = true;

        let handshake = HandshakeProtocol::new(&self.link);
        self.registry
            .live()
            .filter(|handle| handshake.check_out(&mut handle.lock()))
            .count()
    }

    /// True after [`Self::shutdown`].
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}
