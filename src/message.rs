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

use crate::identity::{Aem, DirectoryIndex};

/// An in-flight or outgoing message, as stored in the Message Store.
#[derive(Debug, Clone)]
pub struct Message {
    pub sender: Aem,
    pub recipient: Aem,

    /// Wall-clock seconds at creation.
    pub created_at: u64,

    /// Fixed-width ASCII, right-padded to the directory's configured
    /// `body_len`.
    pub body: String,

    /// True once this node has sent the message to any peer at least once.
    pub transmitted: bool,

    /// Per-peer delivery bitmap, indexed by directory index. True iff the
    /// message was either received from that peer or successfully sent to
    /// it.
    pub transmitted_devices: Vec<bool>,

    /// True once sent on a session whose remote peer equals `recipient`.
    pub transmitted_to_recipient: bool,
}

impl Message {
    pub fn new(sender: Aem, recipient: Aem, created_at: u64, body: String, dir_len: usize) -> Self {
        Self {
            sender,
            recipient,
            created_at,
            body,
            transmitted: false,
            transmitted_devices: vec![false; dir_len],
            transmitted_to_recipient: false,
        }
    }

    /// The store's deduplication predicate: same sender, creation time, and
    /// body. Deliberately ignores delivery bookkeeping fields.
    pub fn content_eq(&self, other: &Message) -> bool {
        self.sender == other.sender
            && self.created_at == other.created_at
            && self.body == other.body
    }

    pub fn mark_transmitted_to(&mut self, index: DirectoryIndex) {
        if index < self.transmitted_devices.len() {
            self.transmitted_devices[index] = true;
        }
    }

    pub fn has_transmitted_to(&self, index: DirectoryIndex) -> bool {
        self.transmitted_devices.get(index).copied().unwrap_or(false)
    }
}

/// A message addressed to this node, stored in the Inbox.
#[derive(Debug, Clone)]
pub struct InboxMessage {
    pub sender: Aem,
    pub created_at: u64,
    pub saved_at: u64,
    pub body: String,

    /// The peer from which this node first received the message.
    pub first_sender: Aem,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_eq_ignores_delivery_bits() {
        let mut a = Message::new(Aem(1), Aem(2), 100, "hi".into(), 3);
        let mut b = Message::new(Aem(1), Aem(2), 100, "hi".into(), 3);

        a.mark_transmitted_to(0);
        b.transmitted = true;

        assert!(a.content_eq(&b));
    }

    #[test]
    fn content_eq_distinguishes_body() {
        let a = Message::new(Aem(1), Aem(2), 100, "hi".into(), 3);
        let b = Message::new(Aem(1), Aem(2), 100, "bye".into(), 3);

        assert!(!a.content_eq(&b));
    }

    #[test]
    fn originator_is_considered_to_have_it() {
        let mut m = Message::new(Aem(1), Aem(2), 100, "hi".into(), 3);
        // The originator's own directory index is marked true by the
        // producer at construction time, per the Message Store invariant.
        m.mark_transmitted_to(0);

        assert!(m.has_transmitted_to(0));
        assert!(!m.has_transmitted_to(1));
    }
}
