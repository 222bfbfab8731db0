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

//! The node context. Every worker (polling, listener, producer, time-sync)
//! borrows a single `Arc<Node>` instead of reaching for hidden globals.
//! Locks are acquired in a fixed order to avoid deadlock: log, then
//! contacts, then contact_stats, then stores, then stats.

use std::net::SocketAddr;

use tokio::sync::{watch, Mutex};

use crate::config::Config;
use crate::contacts::{ActiveContactSet, ContactStats};
use crate::error::{NodeError, NodeResult};
use crate::identity::{aem2ip, ip2aem, Aem, Directory, Subnet};
use crate::pool::WorkerPool;
use crate::sessionlog::SessionLog;
use crate::stats::Stats;
use crate::store::{InboxStore, MessageStore};

/// The two ring buffers behind one lock, since the Receiver sub-protocol
/// routes each incoming record to exactly one of them.
pub struct Stores {
    pub messages: MessageStore,
    pub inbox: InboxStore,
}

pub struct Node {
    pub config: Config,
    pub directory: Directory,
    pub self_aem: Aem,

    pub stores: Mutex<Stores>,
    pub contacts: Mutex<ActiveContactSet>,
    pub contact_stats: Mutex<ContactStats>,
    pub stats: Mutex<Stats>,
    pub log: Mutex<SessionLog>,

    pub pool: WorkerPool,

    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Node {
    pub fn new(config: Config, self_aem: Aem) -> Self {
        let directory = Directory::from_source(&config.peers.source());
        let dir_len = directory.len();

        let stores = Stores {
            messages: MessageStore::new(config.limits.msg_cap),
            inbox: InboxStore::new(config.limits.inbox_cap),
        };

        let log = SessionLog::new(
            config.log.path.clone(),
            config.log.also_log_to_stdout,
            self_aem,
            config.general.requested_duration,
        );

        let pool = WorkerPool::new(config.limits.max_workers);
        let contact_stats = ContactStats::new(dir_len, config.limits.max_connections_per_peer);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            config,
            directory,
            self_aem,
            stores: Mutex::new(stores),
            contacts: Mutex::new(ActiveContactSet::new()),
            contact_stats: Mutex::new(contact_stats),
            stats: Mutex::new(Stats::default()),
            log: Mutex::new(log),
            pool,
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn body_len(&self) -> usize {
        self.config.general.body_len
    }

    pub fn dir_len(&self) -> usize {
        self.directory.len()
    }

    pub fn subnet(&self) -> Subnet {
        self.config.general.subnet()
    }

    pub fn data_port(&self) -> u16 {
        self.config.general.data_port
    }

    pub fn time_sync_port(&self) -> u16 {
        self.config.general.data_port + 1
    }

    pub fn peer_data_addr(&self, aem: Aem) -> SocketAddr {
        SocketAddr::new(aem2ip(self.subnet(), aem).into(), self.data_port())
    }

    pub fn peer_time_sync_addr(&self, aem: Aem) -> SocketAddr {
        SocketAddr::new(aem2ip(self.subnet(), aem).into(), self.time_sync_port())
    }

    /// Reverse-maps a remote connection's IP address to the peer's AEM,
    /// used by the Listener Worker. Returns `None` for an address outside
    /// the configured subnet, which the caller treats as an unknown peer.
    pub fn aem_for_ip(&self, ip: std::net::Ipv4Addr) -> Option<Aem> {
        ip2aem(self.subnet(), ip)
    }

    /// Resolves this node's own identity from `bind_address`, for the case
    /// where `self_aem` is absent from configuration. A bind address that
    /// doesn't map onto the configured subnet is a fatal startup error.
    pub fn resolve_self_aem(config: &Config) -> NodeResult<Aem> {
        if let Some(value) = config.general.self_aem {
            return Ok(Aem(value));
        }

        let addr: SocketAddr = config.general.bind_address.parse()?;

        let ip = match addr.ip() {
            std::net::IpAddr::V4(v4) => v4,
            std::net::IpAddr::V6(_) => {
                return Err(NodeError::UnresolvedSelfAem(config.general.bind_address.clone()))
            }
        };

        ip2aem(config.general.subnet(), ip)
            .ok_or_else(|| NodeError::UnresolvedSelfAem(config.general.bind_address.clone()))
    }

    /// Signals every worker to stop at its next safe suspension point.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{General, Limits, Log, Peers, TimeSync};

    fn config() -> Config {
        Config {
            general: General {
                self_aem: None,
                bind_address: "10.20.39.6:2020".into(),
                subnet_hi: 10,
                subnet_lo: 20,
                data_port: 2020,
                body_len: 8,
                requested_duration: 60,
            },
            peers: Peers {
                source: "list".into(),
                list: vec![9990, 9991],
                range_min: None,
                range_len: None,
            },
            limits: Limits {
                msg_cap: 4,
                inbox_cap: 4,
                max_workers: 2,
                max_connections_per_peer: 2,
                producer_delay_min: 1,
                producer_delay_max: 2,
            },
            time_sync: TimeSync {
                ref_time_aem: 1,
                timezone: "UTC".into(),
            },
            log: Log {
                path: "/tmp/epidemic-node-test-node.json".into(),
                also_log_to_stdout: false,
            },
        }
    }

    #[test]
    fn resolves_self_aem_from_bind_address_when_absent() {
        let config = config();
        let aem = Node::resolve_self_aem(&config).unwrap();

        // 10.20.39.6 under subnet (10, 20) encodes AEM = (39 << 8) | 6.
        assert_eq!(aem, Aem((39u32 << 8) | 6));
    }

    #[test]
    fn rejects_bind_address_outside_subnet() {
        let mut config = config();
        config.general.bind_address = "192.168.0.1:2020".into();

        assert!(Node::resolve_self_aem(&config).is_err());
    }

    #[test]
    fn peer_addr_uses_configured_data_port() {
        let node = Node::new(config(), Aem(9990));

        let addr = node.peer_data_addr(Aem(9991));
        assert_eq!(addr.port(), 2020);

        let ts_addr = node.peer_time_sync_addr(Aem(9991));
        assert_eq!(ts_addr.port(), 2021);
    }
}
