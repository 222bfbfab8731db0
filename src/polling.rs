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

//! Polling Worker: walks the directory on a fixed interval, dialing every
//! peer it doesn't already have an active session with.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;

use crate::node::Node;
use crate::session::{self, Role};

/// Interval between successive sweeps of the directory.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub async fn run(node: Arc<Node>) {
    let mut shutdown = node.shutdown_signal();

    loop {
        if *shutdown.borrow() {
            return;
        }

        for (_, peer) in node.directory.iter() {
            if peer == node.self_aem {
                continue;
            }

            if *shutdown.borrow() {
                return;
            }

            let addr = node.peer_data_addr(peer);

            // Connecting is the only "uncancellable" span here: once a
            // TCP connection exists, the session must run to completion
            // (or be handed to the pool) rather than being abandoned
            // mid-dial on a shutdown signal.
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    session::dispatch(&node, peer, stream, Role::ClientInitiator).await;
                }
                Err(e) => {
                    debug!("polling: could not reach {} at {}: {}", peer, addr, e);
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}
