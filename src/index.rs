//
// Dedup index: a map from digest to the most recent block number that
// produced it, plus the two format-specific eviction policies.
//
// Eviction differs by format on purpose: format 1's back-references are
// unbounded in memory (a reader can hold everything), so its eviction only
// bounds *encoder* memory and can afford to be amortized and approximate.
// Format 2's distance bound is a hard correctness requirement of the wire
// format itself, so its eviction is exact and its emission path additionally
// checks the distance bound before treating a digest as known.
//

use crate::pool::Digest;
use std::collections::HashMap;

pub(crate) struct DedupIndex {
    map: HashMap<Digest, u64>,
}

impl DedupIndex {
    pub(crate) fn new() -> Self {
        DedupIndex {
            map: HashMap::new(),
        }
    }

    pub(crate) fn get(&self, digest: &Digest) -> Option<u64> {
        self.map.get(digest).copied()
    }

    pub(crate) fn insert(&mut self, digest: Digest, n: u64) {
        self.map.insert(digest, n);
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    /// Split-stream format: when the index overflows `max_blocks`, find
    /// the value at the 25th-percentile rank (ascending) and drop every
    /// entry strictly older than that pivot.
    pub(crate) fn evict_amortized(&mut self, max_blocks: u64) {
        if max_blocks == 0 || self.map.len() as u64 <= max_blocks {
            return;
        }
        let mut ns: Vec<u64> = self.map.values().copied().collect();
        ns.sort_unstable();
        let rank = ((max_blocks / 4) as usize).min(ns.len() - 1);
        let pivot = ns[rank];
        let before = self.map.len();
        self.map.retain(|_, n| *n >= pivot);
        log::debug!(
            "dedup index amortized eviction: {before} -> {} entries (pivot n={pivot})",
            self.map.len()
        );
    }

    /// Single-stream format: drop every entry whose block number is
    /// farther than `max_blocks` behind `current_n`. Callers trigger this
    /// every 65,536 blocks (`current_n & 0xFFFF == 0xFFFF`).
    pub(crate) fn evict_by_distance(&mut self, current_n: u64, max_blocks: u64) {
        let before = self.map.len();
        self.map.retain(|_, n| current_n.saturating_sub(*n) <= max_blocks);
        log::debug!(
            "dedup index distance eviction at n={current_n}: {before} -> {} entries",
            self.map.len()
        );
    }
}
