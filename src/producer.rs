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

//! Producer Worker: periodically originates a new message addressed to a
//! randomly chosen peer, sleeping a random interval between productions.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::body;
use crate::identity::Aem;
use crate::message::Message;
use crate::node::Node;

pub async fn run(node: Arc<Node>) {
    let mut shutdown = node.shutdown_signal();

    if node.dir_len() <= 1 {
        warn!("producer: directory has no other peer, nothing to originate");
        return;
    }

    loop {
        if *shutdown.borrow() {
            return;
        }

        produce_one(&node).await;

        let delay = {
            let mut rng = rand::thread_rng();
            rng.gen_range(
                node.config.limits.producer_delay_min..=node.config.limits.producer_delay_max,
            )
        };

        {
            let mut stats = node.stats.lock().await;
            stats.produced_delay_avg += delay as f64;
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(delay)) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

async fn produce_one(node: &Arc<Node>) {
    let (self_index, recipient) = {
        let mut rng = rand::thread_rng();

        let self_index = node
            .directory
            .index_of(node.self_aem)
            .expect("self_aem is always present in its own directory");

        let mut peer_index = rng.gen_range(0..node.dir_len());
        while peer_index == self_index {
            peer_index = rng.gen_range(0..node.dir_len());
        }

        let recipient = node
            .directory
            .aem_at(peer_index)
            .expect("index was sampled from the directory's own length");

        (self_index, recipient)
    };

    let created_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let body = {
        let mut rng = rand::thread_rng();
        body::random_ascii(&mut rng, node.body_len())
    };

    let mut message = Message::new(node.self_aem, recipient, created_at, body, node.dir_len());

    // The originator is considered to already have delivered to itself,
    // so the Transmitter never re-sends a message back to its own slot.
    message.mark_transmitted_to(self_index);

    // Lock order: log, then stores, then stats, per the design's ordering.
    let mut log = node.log.lock().await;
    log.event_start("production", Aem(0), Aem(0));
    log.message("produced", &message);
    log.event_stop();

    {
        let mut stores = node.stores.lock().await;
        stores.messages.push(message);
    }

    let mut stats = node.stats.lock().await;
    stats.produced += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, General, Limits, Log, Peers, TimeSync};
    use crate::identity::Aem;

    fn config() -> Config {
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
                list: vec![9990, 9991, 9992],
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
            time_sync: TimeSync {
                ref_time_aem: 1,
                timezone: "UTC".into(),
            },
            log: Log {
                path: "/tmp/epidemic-node-test-producer.json".into(),
                also_log_to_stdout: false,
            },
        }
    }

    #[tokio::test]
    async fn produced_message_never_targets_self() {
        let node = Arc::new(Node::new(config(), Aem(9990)));

        for _ in 0..20 {
            produce_one(&node).await;
        }

        let stores = node.stores.lock().await;
        for message in stores.messages.iter() {
            assert_ne!(message.recipient, Aem(9990));
            assert_eq!(message.sender, Aem(9990));
        }

        let stats = node.stats.lock().await;
        assert_eq!(stats.produced, 20);
    }

    #[tokio::test]
    async fn produce_one_logs_a_production_event() {
        let node = Arc::new(Node::new(config(), Aem(9990)));

        produce_one(&node).await;
        produce_one(&node).await;

        let log = node.log.lock().await;
        assert_eq!(log.events_of_kind("production"), 2);
    }
}
