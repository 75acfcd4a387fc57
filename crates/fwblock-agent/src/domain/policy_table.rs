//! Per-signature policy overrides.
//!
//! Sorted by signature id and searched by bisection. When the same id is
//! configured twice the later entry wins.

use super::policy::BlockPolicy;

/// Sorted map from signature id to block policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyTable {
    entries: Vec<(u32, BlockPolicy)>,
}

impl PolicyTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(sig_id, policy)` pairs in configuration order.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (u32, BlockPolicy)>,
    {
        let mut entries: Vec<_> = entries.into_iter().collect();
        // Stable sort keeps configuration order within one id, so after
        // reversing the first of each run is the last one configured.
        entries.sort_by_key(|(sid, _)| *sid);
        entries.reverse();
        entries.dedup_by_key(|(sid, _)| *sid);
        entries.reverse();
        Self { entries }
    }

    /// Policy configured for `sig_id`, if any.
    pub fn get(&self, sig_id: u32) -> Option<&BlockPolicy> {
        self.entries
            .binary_search_by_key(&sig_id, |(sid, _)| *sid)
            .ok()
            .map(|idx| &self.entries[idx].1)
    }

    /// Number of distinct signature ids.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no overrides are configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
