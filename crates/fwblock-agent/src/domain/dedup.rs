//! # Repeat Suppression
//!
//! A small ring of recently dispatched blocks. Bursts of alerts for the
//! same attacker would otherwise turn into bursts of identical requests to
//! every agent.
//!
//! A request is suppressed when an entry in the ring matches it and was
//! issued less than `min(duration, max_window)` seconds ago. A request
//! that is not suppressed overwrites the oldest slot.
//!
//! Matching depends on the requested direction:
//!
//! - `ThisConnection`: source, destination, protocol and destination port
//!   must all match. The source port is not compared, since agents key a
//!   connection block on the service port.
//! - otherwise only the blocked side's address (per `who`) is compared.
//!
//! In both cases duration and the full mode byte must also be equal.

use std::net::Ipv4Addr;

use super::policy::How;
use super::policy::Who;
use super::request::BlockRequest;
use super::types::Timestamp;

/// Number of remembered blocks.
pub const DEDUP_CAPACITY: usize = 10;

/// Upper bound on the suppression window, in seconds.
pub const DEDUP_MAX_WINDOW_SECS: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DedupEntry {
    src: Ipv4Addr,
    dst: Ipv4Addr,
    dst_port: u16,
    protocol: u8,
    duration_secs: u32,
    mode: u8,
    issued: Timestamp,
}

impl DedupEntry {
    fn from_request(request: &BlockRequest) -> Self {
        Self {
            src: request.src,
            dst: request.dst,
            dst_port: request.dst_port,
            protocol: request.protocol,
            duration_secs: request.policy.duration_secs,
            mode: request.policy.mode_bits(),
            issued: request.created,
        }
    }

    fn matches(&self, request: &BlockRequest) -> bool {
        let same_target = match (request.policy.how, request.policy.who) {
            (How::ThisConnection, _) => {
                self.src == request.src
                    && self.dst == request.dst
                    && self.protocol == request.protocol
                    && self.dst_port == request.dst_port
            }
            (_, Who::Source) => self.src == request.src,
            (_, Who::Destination) => self.dst == request.dst,
        };

        same_target
            && self.duration_secs == request.policy.duration_secs
            && self.mode == request.policy.mode_bits()
    }
}

/// Outcome of offering a request to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupVerdict {
    /// New request; recorded in the given slot
    Fresh {
        /// Ring slot now holding the request
        slot: usize,
    },
    /// Repeat of the request in the given slot
    Suppressed {
        /// Ring slot holding the earlier request
        slot: usize,
    },
}

impl DedupVerdict {
    /// True if the request must not be sent.
    pub fn is_suppressed(&self) -> bool {
        matches!(self, DedupVerdict::Suppressed { .. })
    }
}

/// Ring of the last [`DEDUP_CAPACITY`] dispatched blocks.
#[derive(Debug, Clone)]
pub struct DedupCache {
    slots: [Option<DedupEntry>; DEDUP_CAPACITY],
    cursor: usize,
    max_window_secs: u64,
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEDUP_MAX_WINDOW_SECS)
    }
}

impl DedupCache {
    /// Create an empty cache. `max_window_secs` is clamped to
    /// [`DEDUP_MAX_WINDOW_SECS`].
    pub fn new(max_window_secs: u64) -> Self {
        Self {
            slots: [None; DEDUP_CAPACITY],
            cursor: DEDUP_CAPACITY - 1,
            max_window_secs: max_window_secs.min(DEDUP_MAX_WINDOW_SECS),
        }
    }

    /// Effective suppression window for `request`, in seconds.
    ///
    /// Permanent blocks (duration 0) get a zero window and are never
    /// suppressed.
    pub fn window_for(&self, request: &BlockRequest) -> u64 {
        u64::from(request.policy.duration_secs).min(self.max_window_secs)
    }

    /// Check `request` against the ring, recording it if fresh.
    pub fn admit(&mut self, request: &BlockRequest) -> DedupVerdict {
        let window = self.window_for(request);

        let hit = self.slots.iter().enumerate().find_map(|(slot, entry)| {
            entry
                .filter(|e| e.matches(request) && request.created.secs_since(e.issued) < window)
                .map(|_| slot)
        });
        if let Some(slot) = hit {
            return DedupVerdict::Suppressed { slot };
        }

        self.cursor = (self.cursor + 1) % DEDUP_CAPACITY;
        self.slots[self.cursor] = Some(DedupEntry::from_request(request));
        DedupVerdict::Fresh { slot: self.cursor }
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// True if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
