//! # Block Policy
//!
//! What a rule asks the firewall to do: which side of the alert to block,
//! in which direction, for how long, and how loudly the agent should log
//! it. The three mode components pack into the single mode byte carried by
//! every block request.
//!
//! Textual forms accepted by the parsers:
//!
//! | Field | Accepted |
//! |-------|----------|
//! | who | `src`, `source` / `dst`, `dest`, `destination` |
//! | how | `in`, `src`, `source` / `out`, `dst`, `dest`, `destination` / `both`, `either` / `this`, `conn`, `connection` |
//! | log | `none`, `short-log`, `short-alert`, `long-log`, `long-alert` |

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors from parsing policy text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// Unrecognized `who` value
    #[error("unknown block target '{0}'")]
    UnknownWho(String),

    /// Unrecognized `how` value
    #[error("unknown block direction '{0}'")]
    UnknownHow(String),

    /// Unrecognized log level
    #[error("unknown log level '{0}'")]
    UnknownLogLevel(String),

    /// Malformed duration text
    #[error("invalid duration '{0}'")]
    InvalidDuration(String),

    /// Duration does not fit in 32 bits of seconds
    #[error("duration '{0}' is too long")]
    DurationOverflow(String),
}

/// Which address of the alert is blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Who {
    /// Block the alert's source address
    #[default]
    Source,
    /// Block the alert's destination address
    Destination,
}

impl Who {
    /// Mode bits for this target.
    pub const fn bits(self) -> u8 {
        match self {
            Who::Destination => 0x08,
            Who::Source => 0x10,
        }
    }
}

impl FromStr for Who {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "src" | "source" => Ok(Who::Source),
            "dst" | "dest" | "destination" => Ok(Who::Destination),
            _ => Err(PolicyError::UnknownWho(s.to_string())),
        }
    }
}

/// Which traffic direction is blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum How {
    /// Traffic coming from the blocked host
    Inbound,
    /// Traffic going to the blocked host
    Outbound,
    /// Both directions
    #[default]
    Both,
    /// Only the alerting connection (addresses, protocol and service port)
    ThisConnection,
}

impl How {
    /// Mode bits for this direction.
    pub const fn bits(self) -> u8 {
        match self {
            How::Inbound => 0x20,
            How::Outbound => 0x40,
            How::Both => 0x60,
            How::ThisConnection => 0x80,
        }
    }
}

impl FromStr for How {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in" | "src" | "source" => Ok(How::Inbound),
            "out" | "dst" | "dest" | "destination" => Ok(How::Outbound),
            "both" | "either" => Ok(How::Both),
            "this" | "conn" | "connection" => Ok(How::ThisConnection),
            _ => Err(PolicyError::UnknownHow(s.to_string())),
        }
    }
}

/// Agent-side logging requested for the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum LogLevel {
    /// No logging
    None,
    /// One-line log entry
    ShortLog,
    /// One-line log entry plus alert notification
    ShortAlert,
    /// Full log entry
    LongLog,
    /// Full log entry plus alert notification
    #[default]
    LongAlert,
}

impl LogLevel {
    /// Mode bits for this level.
    pub const fn bits(self) -> u8 {
        match self {
            LogLevel::None => 0,
            LogLevel::ShortLog => 1,
            LogLevel::ShortAlert => 2,
            LogLevel::LongLog => 3,
            LogLevel::LongAlert => 4,
        }
    }
}

impl FromStr for LogLevel {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "none" => Ok(LogLevel::None),
            "short-log" | "shortlog" => Ok(LogLevel::ShortLog),
            "short-alert" | "shortalert" => Ok(LogLevel::ShortAlert),
            "long-log" | "longlog" => Ok(LogLevel::LongLog),
            "long-alert" | "longalert" => Ok(LogLevel::LongAlert),
            _ => Err(PolicyError::UnknownLogLevel(s.to_string())),
        }
    }
}

/// Complete block policy for one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockPolicy {
    /// Blocked side
    pub who: Who,
    /// Blocked direction
    pub how: How,
    /// Block duration in seconds; 0 means permanent
    pub duration_secs: u32,
    /// Agent logging
    pub log_level: LogLevel,
}

impl Default for BlockPolicy {
    fn default() -> Self {
        Self {
            who: Who::Source,
            how: How::Both,
            duration_secs: 300,
            log_level: LogLevel::LongAlert,
        }
    }
}

impl BlockPolicy {
    /// Create a policy with default log level.
    pub fn new(who: Who, how: How, duration_secs: u32) -> Self {
        Self {
            who,
            how,
            duration_secs,
            log_level: LogLevel::default(),
        }
    }

    /// Builder: set log level.
    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    /// The packed mode byte.
    pub const fn mode_bits(&self) -> u8 {
        self.who.bits() | self.how.bits() | self.log_level.bits()
    }

    /// True for blocks that never expire.
    pub const fn is_permanent(&self) -> bool {
        self.duration_secs == 0
    }
}

impl fmt::Display for BlockPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}/{:?} for {}s ({:?})",
            self.who, self.how, self.duration_secs, self.log_level
        )
    }
}

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;
const MONTH: u64 = 30 * DAY;
const YEAR: u64 = 365 * DAY;

const PERMANENT_WORDS: [&str; 4] = ["perm", "inf", "always", "forever"];

fn unit_seconds(unit: &str) -> Option<u64> {
    if unit.is_empty() {
        return Some(1);
    }
    if unit.starts_with("mo") {
        return Some(MONTH);
    }
    match unit.as_bytes()[0] {
        b's' => Some(1),
        b'm' => Some(MINUTE),
        b'h' => Some(HOUR),
        b'd' => Some(DAY),
        b'w' => Some(WEEK),
        b'y' => Some(YEAR),
        _ => None,
    }
}

/// Parse a human duration into seconds.
///
/// Accepts a sequence of `<number><unit>` terms with optional whitespace,
/// such as `15min`, `1h`, `2 days 4 hours` or a bare `300`. Units are
/// matched by their first letter (`mo` for months). A unit-less number is
/// seconds. `perm`, `inf`, `always` and `forever` mean permanent (0).
///
/// # Errors
///
/// Returns `PolicyError::InvalidDuration` for empty or malformed input and
/// `PolicyError::DurationOverflow` when the total exceeds `u32::MAX`.
pub fn parse_duration(input: &str) -> Result<u32, PolicyError> {
    let text = input.trim().to_ascii_lowercase();
    let invalid = || PolicyError::InvalidDuration(input.to_string());
    let overflow = || PolicyError::DurationOverflow(input.to_string());

    if text.is_empty() {
        return Err(invalid());
    }
    if PERMANENT_WORDS.iter().any(|word| text.starts_with(word)) {
        return Ok(0);
    }

    let bytes = text.as_bytes();
    let mut i = 0;
    let mut total: u64 = 0;

    while i < bytes.len() {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i == bytes.len() {
            break;
        }

        let digits_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if digits_start == i {
            return Err(invalid());
        }
        let value: u64 = text[digits_start..i].parse().map_err(|_| overflow())?;

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let unit_start = i;
        while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
            i += 1;
        }
        let multiplier = unit_seconds(&text[unit_start..i]).ok_or_else(invalid)?;

        total = value
            .checked_mul(multiplier)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(overflow)?;
    }

    u32::try_from(total).map_err(|_| overflow())
}
