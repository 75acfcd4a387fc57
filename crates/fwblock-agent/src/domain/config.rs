//! Configuration values: timing tunables, client settings, endpoints and
//! policies. Loading from files lives in the adapters.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use super::policy::BlockPolicy;
use super::policy_table::PolicyTable;
use super::dedup::DEDUP_MAX_WINDOW_SECS;

/// TCP port agents listen on by default.
pub const DEFAULT_AGENT_PORT: u16 = 898;

/// Network timing tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Budget for establishing a connection
    pub connect_timeout: Duration,
    /// Budget for the reply to a request
    pub response_timeout: Duration,
    /// Budget for the delayed reply after HOLD
    pub hold_timeout: Duration,
    /// Interval between receive polls
    pub poll_interval: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(3000),
            response_timeout: Duration::from_millis(3000),
            hold_timeout: Duration::from_millis(60_000),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl Timing {
    /// Short budgets for tests against local agents.
    pub fn for_testing() -> Self {
        Self {
            connect_timeout: Duration::from_millis(500),
            response_timeout: Duration::from_millis(500),
            hold_timeout: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(1),
        }
    }
}

/// Settings of the sensor side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Local address outgoing connections are bound to
    pub local_bind: SocketAddr,
    /// Upper bound on the repeat suppression window, seconds
    pub dedup_window_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            local_bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            dedup_window_secs: DEDUP_MAX_WINDOW_SECS,
        }
    }
}

/// One configured agent, before name resolution.
#[derive(Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    /// Host name or dotted quad
    pub host: String,
    /// Agent port
    pub port: u16,
    /// Shared key
    pub key: String,
}

impl EndpointSpec {
    /// Spec on the default port.
    pub fn new(host: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_AGENT_PORT,
            key: key.into(),
        }
    }

    /// Builder: set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

impl std::fmt::Debug for EndpointSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointSpec")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

/// Complete client configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentConfig {
    /// Timing tunables
    pub timing: Timing,
    /// Client settings
    pub client: ClientConfig,
    /// Policy for rules without a table entry
    pub default_policy: BlockPolicy,
    /// Agents, in configuration order
    pub endpoints: Vec<EndpointSpec>,
    /// Per-signature overrides
    pub policies: PolicyTable,
}

impl AgentConfig {
    /// Builder: set timing.
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Builder: set client settings.
    pub fn with_client(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }

    /// Builder: set the default policy.
    pub fn with_default_policy(mut self, policy: BlockPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Builder: add an endpoint.
    pub fn with_endpoint(mut self, spec: EndpointSpec) -> Self {
        self.endpoints.push(spec);
        self
    }

    /// Builder: set the policy table.
    pub fn with_policies(mut self, policies: PolicyTable) -> Self {
        self.policies = policies;
        self
    }

    /// Policy for `sig_id`: table entry or the default policy.
    pub fn policy_for(&self, sig_id: u32) -> BlockPolicy {
        self.policies.get(sig_id).copied().unwrap_or(self.default_policy)
    }
}
