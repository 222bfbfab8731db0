// Epidemic messaging node - decentralized delay-tolerant message propagation over TCP.
// Copyright (C) 2021  rumblefrog
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::collections::HashSet;

use crate::identity::{Aem, DirectoryIndex};

/// Peers currently engaged in a session, used to suppress duplicate
/// concurrent contacts. Membership strictly brackets the pairwise
/// protocol.
#[derive(Default)]
pub struct ActiveContactSet {
    peers: HashSet<Aem>,
}

impl ActiveContactSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, peer: Aem) -> bool {
        self.peers.contains(&peer)
    }

    /// Inserts `peer`. Returns `false` if it was already present (the
    /// caller should treat that as "skip", never as "entered twice").
    pub fn insert(&mut self, peer: Aem) -> bool {
        self.peers.insert(peer)
    }

    pub fn remove(&mut self, peer: Aem) {
        self.peers.remove(&peer);
    }
}

/// Per-peer history of completed-session `(start, end)` microsecond
/// timestamps, bounded per peer at `MAX_CONNECTIONS_PER_PEER`.
pub struct ContactStats {
    per_peer: Vec<Vec<(i64, i64)>>,
    cap: usize,
}

impl ContactStats {
    pub fn new(dir_len: usize, cap: usize) -> Self {
        Self {
            per_peer: vec![Vec::new(); dir_len],
            cap,
        }
    }

    pub fn count(&self, index: DirectoryIndex) -> usize {
        self.per_peer.get(index).map(Vec::len).unwrap_or(0)
    }

    pub fn at_cap(&self, index: DirectoryIndex) -> bool {
        self.count(index) >= self.cap
    }

    /// Appends a completed session's `(start, end)` pair, in microseconds
    /// since the epoch. No-ops past capacity (the caller is expected to
    /// have already checked [`ContactStats::at_cap`] before admitting the
    /// session).
    pub fn record(&mut self, index: DirectoryIndex, start_us: i64, end_us: i64) {
        if let Some(entries) = self.per_peer.get_mut(index) {
            if entries.len() < self.cap {
                entries.push((start_us, end_us));
            }
        }
    }

    pub fn history(&self, index: DirectoryIndex) -> &[(i64, i64)] {
        self.per_peer
            .get(index)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_set_rejects_double_insert() {
        let mut set = ActiveContactSet::new();

        assert!(set.insert(Aem(1)));
        assert!(!set.insert(Aem(1)));

        set.remove(Aem(1));
        assert!(!set.contains(Aem(1)));
    }

    #[test]
    fn contact_stats_respects_cap() {
        let mut stats = ContactStats::new(2, 2);

        stats.record(0, 0, 10);
        stats.record(0, 20, 30);
        assert!(stats.at_cap(0));

        stats.record(0, 40, 50);
        assert_eq!(stats.count(0), 2);
    }
}
