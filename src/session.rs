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

//! The pairwise session protocol: receiver and transmitter sub-protocols,
//! run in an order determined by [`Role`] so both sides agree on who
//! transmits first without an explicit turn token.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Bytes, BytesMut};
use futures::sink::SinkExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_stream::StreamExt;
use tokio_util::codec::{BytesCodec, Decoder, Framed};

use crate::error::{NodeError, NodeResult};
use crate::identity::{Aem, DirectoryIndex};
use crate::message::{InboxMessage, Message};
use crate::node::Node;
use crate::sessionlog::SessionLog;
use crate::store::eligible_for_transmit;
use crate::wire;

/// Determines whether the local side transmits first or receives first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// This node dialed out; receives first, then transmits.
    ClientInitiator,
    /// This node accepted the connection; transmits first, then receives.
    ServerResponder,
}

/// Runs a session, taking a pool slot if one is free and running inline
/// otherwise. Shared by the Polling and Listener workers - both discover
/// a live TCP connection and then hand it off the same way.
///
/// An [`NodeError::Invariant`] surfacing from a session is a programming
/// error, not a network condition: it is logged and the process is
/// terminated, matching the design's fatal-invariant policy. Every other
/// error is transient and only logged.
pub async fn dispatch(node: &Arc<Node>, peer: Aem, stream: TcpStream, role: Role) {
    match node.pool.try_reserve() {
        Some(slot) => {
            let node = node.clone();
            tokio::spawn(async move {
                handle_outcome(&node, peer, run_session(&node, peer, stream, role).await);
                drop(slot);
            });
        }
        None => {
            let outcome = run_session(node, peer, stream, role).await;
            handle_outcome(node, peer, outcome);
        }
    }
}

fn handle_outcome(node: &Arc<Node>, peer: Aem, outcome: NodeResult<()>) {
    match outcome {
        Ok(()) => {}
        Err(NodeError::Invariant(msg)) => {
            error!("fatal invariant violated during session with {}: {}", peer, msg);
            node.request_shutdown();
            std::process::exit(1);
        }
        Err(e) => {
            warn!("session with {} ended with an error: {}", peer, e);
        }
    }
}

fn now_us() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Runs one full pairwise session against `peer_aem` over `stream`. Returns
/// `Ok(())` for any outcome that isn't an invariant violation, including a
/// guarded skip (already active, or contact-count exhausted) and any
/// transient network error encountered mid-exchange.
pub async fn run_session(
    node: &Arc<Node>,
    peer_aem: Aem,
    stream: TcpStream,
    role: Role,
) -> NodeResult<()> {
    let peer_index = match node.directory.index_of(peer_aem) {
        Some(index) => index,
        None => {
            warn!("session: unknown peer {}, refusing to participate", peer_aem);
            return Ok(());
        }
    };

    let (server_aem, client_aem) = match role {
        Role::ServerResponder => (node.self_aem, peer_aem),
        Role::ClientInitiator => (peer_aem, node.self_aem),
    };

    // The log lock is held for the entire session, per the design's lock
    // ordering (log is acquired first and released last).
    let mut log = node.log.lock().await;

    log.event_start("connection", server_aem, client_aem);

    let admitted = {
        let mut contacts = node.contacts.lock().await;
        let contact_stats = node.contact_stats.lock().await;

        if contacts.contains(peer_aem) {
            false
        } else if contact_stats.at_cap(peer_index) {
            false
        } else {
            contacts.insert(peer_aem);
            true
        }
    };

    if !admitted {
        warn!("session: skipping contact with {} (already active or at cap)", peer_aem);
        log.event_stop();
        return Ok(());
    }

    let start_us = now_us();

    let mut framed = BytesCodec::new().framed(stream);

    let result = exchange(node, peer_aem, peer_index, &mut framed, role, &mut log).await;

    let end_us = now_us();

    {
        let mut contacts = node.contacts.lock().await;
        let mut contact_stats = node.contact_stats.lock().await;

        contact_stats.record(peer_index, start_us, end_us);
        contacts.remove(peer_aem);
    }

    log.event_stop();

    result
}

async fn exchange(
    node: &Arc<Node>,
    peer_aem: Aem,
    peer_index: DirectoryIndex,
    framed: &mut Framed<TcpStream, BytesCodec>,
    role: Role,
    log: &mut SessionLog,
) -> NodeResult<()> {
    match role {
        Role::ServerResponder => {
            transmit_all(node, peer_aem, peer_index, framed, log).await?;
            let _ = framed.get_mut().shutdown().await;

            receive_all(node, peer_aem, peer_index, framed, log).await?;
        }
        Role::ClientInitiator => {
            receive_all(node, peer_aem, peer_index, framed, log).await?;

            transmit_all(node, peer_aem, peer_index, framed, log).await?;
            let _ = framed.get_mut().shutdown().await;
        }
    }

    Ok(())
}

/// Reads wire records until the peer half-closes or sends a short record.
/// `BytesCodec` hands back whatever arrived on the wire in whatever
/// chunking the kernel happened to deliver, so incoming bytes accumulate
/// in `pending` until a full record is available.
async fn receive_all(
    node: &Arc<Node>,
    peer_aem: Aem,
    peer_index: DirectoryIndex,
    framed: &mut Framed<TcpStream, BytesCodec>,
    log: &mut SessionLog,
) -> NodeResult<()> {
    let ser_len = wire::ser_len(node.body_len(), node.dir_len());
    let mut pending = BytesMut::new();

    loop {
        let record = match next_record(framed, &mut pending, ser_len).await? {
            Some(record) => record,
            None => return Ok(()),
        };

        let mut message = match wire::parse(&record, node.body_len(), node.dir_len()) {
            Ok((_, message)) => message,
            Err(_) => {
                warn!("session: malformed record from {}, ending direction", peer_aem);
                return Ok(());
            }
        };

        let is_duplicate = {
            let stores = node.stores.lock().await;
            stores.messages.contains_duplicate(&message)
        };

        if is_duplicate {
            continue;
        }

        message.mark_transmitted_to(peer_index);

        let for_me = message.recipient == node.self_aem;

        if for_me {
            let inbox_message = InboxMessage {
                sender: message.sender,
                created_at: message.created_at,
                saved_at: now_secs(),
                body: message.body.clone(),
                first_sender: peer_aem,
            };

            let mut stores = node.stores.lock().await;
            stores.inbox.push(inbox_message);
        } else {
            let mut stores = node.stores.lock().await;
            stores.messages.push(message.clone());
        }

        {
            let mut stats = node.stats.lock().await;
            stats.received += 1;
            if for_me {
                stats.received_for_me += 1;
            }
        }

        log.message("received", &message);
    }
}

/// Pulls exactly `len` bytes out of `framed`, buffering any surplus in
/// `pending` for the next call. Returns `None` on a clean or short EOF
/// (the direction simply ends).
async fn next_record(
    framed: &mut Framed<TcpStream, BytesCodec>,
    pending: &mut BytesMut,
    len: usize,
) -> NodeResult<Option<Vec<u8>>> {
    while pending.len() < len {
        match framed.next().await {
            Some(Ok(chunk)) => pending.extend_from_slice(&chunk),
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(None),
        }
    }

    Ok(Some(pending.split_to(len).to_vec()))
}

/// Walks the Message Store, sending every slot not yet known to `peer_aem`
/// and not already delivered end-to-end.
async fn transmit_all(
    node: &Arc<Node>,
    peer_aem: Aem,
    peer_index: DirectoryIndex,
    framed: &mut Framed<TcpStream, BytesCodec>,
    log: &mut SessionLog,
) -> NodeResult<()> {
    let body_len = node.body_len();
    let dir_len = node.dir_len();

    loop {
        // Always take the first eligible slot: sending a message marks it
        // ineligible (`transmitted_devices[peer_index] = true`), so the
        // eligible set shrinks by exactly the slot just sent and `nth(0)`
        // keeps landing on the next one still owed to this peer.
        let candidate = {
            let stores = node.stores.lock().await;
            eligible_for_transmit(&stores.messages, peer_index)
                .next()
                .cloned()
        };

        let message = match candidate {
            Some(m) => m,
            None => break,
        };

        if message.recipient == node.self_aem {
            return Err(NodeError::Invariant(
                "transmitter attempted to send a message addressed to self".into(),
            ));
        }

        let encoded = wire::serialize(&message, body_len, dir_len);
        framed.send(Bytes::from(encoded)).await?;

        let sent = {
            let mut stores = node.stores.lock().await;
            let slot = stores
                .messages
                .iter_mut()
                .find(|m| m.content_eq(&message));

            if let Some(slot) = slot {
                slot.transmitted = true;
                slot.mark_transmitted_to(peer_index);

                if peer_aem == slot.recipient {
                    slot.transmitted_to_recipient = true;
                }

                slot.clone()
            } else {
                message
            }
        };

        {
            let mut stats = node.stats.lock().await;
            stats.transmitted += 1;
            if peer_aem == sent.recipient {
                stats.transmitted_to_recipient += 1;
            }
        }

        log.message("transmitted", &sent);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, General, Limits, Log, Peers, TimeSync as TimeSyncCfg};
    use crate::node::Node;
    use tokio::net::TcpListener;

    fn test_config(list: Vec<u32>) -> Config {
        Config {
            general: General {
                self_aem: Some(9990),
                bind_address: "127.0.0.1:0".into(),
                subnet_hi: 127,
                subnet_lo: 0,
                data_port: 0,
                body_len: 8,
                requested_duration: 5,
            },
            peers: Peers {
                source: "list".into(),
                list,
                range_min: None,
                range_len: None,
            },
            limits: Limits {
                msg_cap: 8,
                inbox_cap: 8,
                max_workers: 2,
                max_connections_per_peer: 3,
                producer_delay_min: 1,
                producer_delay_max: 2,
            },
            time_sync: TimeSyncCfg {
                ref_time_aem: 1,
                timezone: "UTC".into(),
            },
            log: Log {
                path: "/tmp/epidemic-node-test-session.json".into(),
                also_log_to_stdout: false,
            },
        }
    }

    #[tokio::test]
    async fn single_hop_delivery_lands_in_inbox() {
        // A (9990) produces a message for B (9991); B runs receiver and
        // sees it delivered to its own inbox with first_sender = A.
        let config_b = test_config(vec![9990, 9991]);
        let node_b = Node::new(config_b, Aem(9991));
        let node_b = Arc::new(node_b);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let node_b_clone = node_b.clone();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            run_session(&node_b_clone, Aem(9990), stream, Role::ServerResponder).await
        });

        let client_stream = TcpStream::connect(addr).await.unwrap();

        let config_a = test_config(vec![9990, 9991]);
        let node_a = Arc::new(Node::new(config_a, Aem(9990)));

        {
            let mut stores = node_a.stores.lock().await;
            let message = Message::new(Aem(9990), Aem(9991), 1_700_000_000, "hi".into(), node_a.dir_len());
            stores.messages.push(message);
        }

        run_session(&node_a, Aem(9991), client_stream, Role::ClientInitiator)
            .await
            .unwrap();

        server.await.unwrap().unwrap();

        let stores_b = node_b.stores.lock().await;
        let inbox: Vec<_> = stores_b.inbox.iter().collect();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].sender, Aem(9990));
        assert_eq!(inbox[0].first_sender, Aem(9990));

        let stores_a = node_a.stores.lock().await;
        let sent = stores_a.messages.iter().next().unwrap();
        assert!(sent.transmitted_to_recipient);
    }

    #[tokio::test]
    async fn all_pending_messages_to_a_peer_are_transmitted() {
        // Regression test: a peer with several eligible messages must see
        // every one of them, not every other one. A's store holds four
        // messages for B; all four must reach B's inbox/downstream store.
        let config_b = test_config(vec![9990, 9991]);
        let node_b = Arc::new(Node::new(config_b, Aem(9991)));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let node_b_clone = node_b.clone();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            run_session(&node_b_clone, Aem(9990), stream, Role::ServerResponder).await
        });

        let client_stream = TcpStream::connect(addr).await.unwrap();

        let config_a = test_config(vec![9990, 9991]);
        let node_a = Arc::new(Node::new(config_a, Aem(9990)));

        {
            let mut stores = node_a.stores.lock().await;
            for (i, body) in ["a", "b", "c", "d"].iter().enumerate() {
                let message = Message::new(
                    Aem(9990),
                    Aem(9991),
                    1_700_000_000 + i as u64,
                    (*body).into(),
                    node_a.dir_len(),
                );
                stores.messages.push(message);
            }
        }

        run_session(&node_a, Aem(9991), client_stream, Role::ClientInitiator)
            .await
            .unwrap();

        server.await.unwrap().unwrap();

        let stores_b = node_b.stores.lock().await;
        let mut bodies: Vec<String> = stores_b.inbox.iter().map(|m| m.body.clone()).collect();
        bodies.sort();
        assert_eq!(bodies, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn self_addressed_message_never_reaches_transmitter() {
        let config = test_config(vec![9990, 9991]);
        let node = Arc::new(Node::new(config, Aem(9990)));

        // A message addressed to self must never be pushed to the
        // Message Store in the first place (it belongs in the Inbox).
        // This test documents that guarantee at the store level: nothing
        // here ever calls `stores.messages.push` with recipient == self.
        let stores = node.stores.lock().await;
        assert_eq!(stores.messages.iter().count(), 0);
    }
}
