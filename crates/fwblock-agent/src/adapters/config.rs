//! # TOML Configuration
//!
//! Loads an [`AgentConfig`] from a TOML file. Every field is optional and
//! falls back to the built-in defaults.
//!
//! ```toml
//! [timing]
//! connect_timeout_ms = 3000
//! response_timeout_ms = 3000
//! hold_timeout_ms = 60000
//! poll_interval_ms = 10
//!
//! [client]
//! local_bind = "0.0.0.0:0"
//! dedup_window_secs = 20
//!
//! [default_policy]
//! who = "src"
//! how = "both"
//! duration = "5min"
//! log = "long-alert"
//!
//! [[endpoints]]
//! host = "fw1.example.org"
//! port = 898
//! key = "borderfw"
//!
//! [[policies]]
//! sid = 2001
//! who = "dst"
//! how = "in"
//! duration = "2 days 4 hours"
//! ```

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::{
    parse_duration, AgentConfig, BlockPolicy, ClientConfig, EndpointSpec, PolicyError, PolicyTable,
    Timing, DEFAULT_AGENT_PORT,
};

/// Errors that can occur during config loading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config file {path}: {error}")]
    Io {
        /// Path of the file that failed to load
        path: String,
        /// Error message from the I/O operation
        error: String,
    },

    /// File is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A policy field has an invalid value
    #[error("invalid policy in {section}: {source}")]
    Policy {
        /// Where the policy was found
        section: String,
        /// What was wrong with it
        source: PolicyError,
    },

    /// Local bind address does not parse
    #[error("invalid local bind address '{0}'")]
    InvalidBindAddress(String),
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    timing: TimingFile,
    #[serde(default)]
    client: ClientFile,
    default_policy: Option<PolicyFile>,
    #[serde(default)]
    endpoints: Vec<EndpointFile>,
    #[serde(default)]
    policies: Vec<SidPolicyFile>,
}

#[derive(Debug, Deserialize, Default)]
struct TimingFile {
    connect_timeout_ms: Option<u64>,
    response_timeout_ms: Option<u64>,
    hold_timeout_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ClientFile {
    local_bind: Option<String>,
    dedup_window_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct PolicyFile {
    who: Option<String>,
    how: Option<String>,
    duration: Option<DurationValue>,
    log: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DurationValue {
    Seconds(u32),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct EndpointFile {
    host: String,
    port: Option<u16>,
    #[serde(default)]
    key: String,
}

#[derive(Debug, Deserialize)]
struct SidPolicyFile {
    sid: u32,
    #[serde(flatten)]
    policy: PolicyFile,
}

impl PolicyFile {
    fn build(&self, base: BlockPolicy, section: &str) -> Result<BlockPolicy, ConfigError> {
        let wrap = |source| ConfigError::Policy {
            section: section.to_string(),
            source,
        };
        let mut policy = base;
        if let Some(who) = &self.who {
            policy.who = who.parse().map_err(wrap)?;
        }
        if let Some(how) = &self.how {
            policy.how = how.parse().map_err(wrap)?;
        }
        if let Some(log) = &self.log {
            policy.log_level = log.parse().map_err(wrap)?;
        }
        match &self.duration {
            Some(DurationValue::Seconds(secs)) => policy.duration_secs = *secs,
            Some(DurationValue::Text(text)) => policy.duration_secs = parse_duration(text).map_err(wrap)?,
            None => {}
        }
        Ok(policy)
    }
}

/// TOML-based configuration loader.
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlConfigLoader;

impl TomlConfigLoader {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<AgentConfig, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<AgentConfig, ConfigError> {
        let file: ConfigFile = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let defaults = Timing::default();
        let ms = |value: Option<u64>, fallback: Duration| value.map(Duration::from_millis).unwrap_or(fallback);
        let timing = Timing {
            connect_timeout: ms(file.timing.connect_timeout_ms, defaults.connect_timeout),
            response_timeout: ms(file.timing.response_timeout_ms, defaults.response_timeout),
            hold_timeout: ms(file.timing.hold_timeout_ms, defaults.hold_timeout),
            poll_interval: ms(file.timing.poll_interval_ms, defaults.poll_interval),
        };

        let client_defaults = ClientConfig::default();
        let local_bind = match &file.client.local_bind {
            Some(text) => text
                .parse::<SocketAddr>()
                .map_err(|_| ConfigError::InvalidBindAddress(text.clone()))?,
            None => client_defaults.local_bind,
        };
        let client = ClientConfig {
            local_bind,
            dedup_window_secs: file.client.dedup_window_secs.unwrap_or(client_defaults.dedup_window_secs),
        };

        let default_policy = match &file.default_policy {
            Some(policy) => policy.build(BlockPolicy::default(), "default_policy")?,
            None => BlockPolicy::default(),
        };

        let endpoints = file
            .endpoints
            .into_iter()
            .map(|e| EndpointSpec {
                host: e.host,
                port: e.port.unwrap_or(DEFAULT_AGENT_PORT),
                key: e.key,
            })
            .collect();

        let policies = file
            .policies
            .iter()
            .map(|entry| {
                let section = format!("policies (sid {})", entry.sid);
                entry
                    .policy
                    .build(default_policy, &section)
                    .map(|policy| (entry.sid, policy))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AgentConfig {
            timing,
            client,
            default_policy,
            endpoints,
            policies: PolicyTable::from_entries(policies),
        })
    }
}
