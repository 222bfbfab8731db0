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

use crate::identity::DirectoryIndex;
use crate::message::{InboxMessage, Message};

/// Fixed-capacity ring of outgoing/in-flight messages. A slot is occupied
/// iff its `created_at` is non-zero; on overflow the oldest slot is
/// overwritten, never freed explicitly.
pub struct MessageStore {
    slots: Vec<Option<Message>>,
    head: usize,
}

impl MessageStore {
    pub fn new(cap: usize) -> Self {
        Self {
            slots: (0..cap).map(|_| None).collect(),
            head: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Scans from slot 0, halting at the first unoccupied slot, looking for
    /// a content-equal entry. Mirrors the source's early-`goto` dedup rule.
    pub fn contains_duplicate(&self, candidate: &Message) -> bool {
        for slot in &self.slots {
            match slot {
                Some(existing) => {
                    if existing.content_eq(candidate) {
                        return true;
                    }
                }
                None => break,
            }
        }

        false
    }

    /// Inserts at the ring's current head, overwriting the oldest entry on
    /// wraparound. Returns the slot index the message landed in.
    pub fn push(&mut self, message: Message) -> usize {
        let index = self.head;

        self.slots[index] = Some(message);
        self.head = (self.head + 1) % self.slots.len();

        index
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Message> {
        self.slots.iter_mut().filter_map(|s| s.as_mut())
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Message> {
        self.slots.get_mut(index).and_then(|s| s.as_mut())
    }
}

/// Fixed-capacity ring of messages addressed to this node.
pub struct InboxStore {
    slots: Vec<Option<InboxMessage>>,
    head: usize,
}

impl InboxStore {
    pub fn new(cap: usize) -> Self {
        Self {
            slots: (0..cap).map(|_| None).collect(),
            head: 0,
        }
    }

    pub fn push(&mut self, message: InboxMessage) -> usize {
        let index = self.head;

        self.slots[index] = Some(message);
        self.head = (self.head + 1) % self.slots.len();

        index
    }

    pub fn iter(&self) -> impl Iterator<Item = &InboxMessage> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }
}

/// Candidates for the Transmitter sub-protocol: slots eligible to send to
/// `peer_index`, i.e. not yet marked transmitted to that peer and not
/// already delivered end-to-end.
pub fn eligible_for_transmit<'a>(
    store: &'a MessageStore,
    peer_index: DirectoryIndex,
) -> impl Iterator<Item = &'a Message> {
    store
        .iter()
        .filter(move |m| !m.has_transmitted_to(peer_index) && !m.transmitted_to_recipient)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Aem;

    fn msg(sender: u32, recipient: u32, created_at: u64, body: &str) -> Message {
        Message::new(Aem(sender), Aem(recipient), created_at, body.into(), 4)
    }

    #[test]
    fn dedup_scan_halts_at_first_empty_slot() {
        let mut store = MessageStore::new(4);

        store.push(msg(1, 2, 10, "a"));
        store.push(msg(1, 2, 20, "b"));

        // A content-equal entry further "ahead" in a sparse ring would be
        // invisible to the halting scan; here it simply doesn't exist yet.
        assert!(store.contains_duplicate(&msg(1, 2, 10, "a")));
        assert!(!store.contains_duplicate(&msg(1, 2, 30, "c")));
    }

    #[test]
    fn overflow_overwrites_oldest() {
        let mut store = MessageStore::new(2);

        store.push(msg(1, 2, 10, "a"));
        store.push(msg(1, 2, 20, "b"));
        store.push(msg(1, 2, 30, "c"));

        let bodies: Vec<&str> = store.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["c", "b"]);
    }

    #[test]
    fn eligible_for_transmit_skips_delivered_and_seen() {
        let mut store = MessageStore::new(4);

        let mut already_seen = msg(1, 2, 10, "a");
        already_seen.mark_transmitted_to(0);

        let mut delivered = msg(1, 2, 20, "b");
        delivered.transmitted_to_recipient = true;

        let pending = msg(1, 2, 30, "c");

        store.push(already_seen);
        store.push(delivered);
        store.push(pending);

        let eligible: Vec<&str> = eligible_for_transmit(&store, 0)
            .map(|m| m.body.as_str())
            .collect();

        assert_eq!(eligible, vec!["c"]);
    }
}
