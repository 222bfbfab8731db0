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

//! Listener Worker: accepts inbound sessions and reverse-maps the remote
//! address to a directory identity before admitting it.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::node::Node;
use crate::session::{self, Role};

pub async fn run(node: Arc<Node>) -> crate::error::NodeResult<()> {
    let bind_addr: SocketAddr = format!(
        "0.0.0.0:{}",
        node.data_port()
    )
    .parse()?;

    let listener = TcpListener::bind(bind_addr).await?;

    info!("listener: accepting connections on {}", bind_addr);

    let mut shutdown = node.shutdown_signal();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, remote) = accepted?;

                let peer = match remote.ip() {
                    std::net::IpAddr::V4(v4) => node.aem_for_ip(v4),
                    std::net::IpAddr::V6(_) => None,
                };

                match peer {
                    Some(peer) => {
                        session::dispatch(&node, peer, stream, Role::ServerResponder).await;
                    }
                    None => {
                        warn!("listener: rejecting connection from unmapped address {}", remote);
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return Ok(());
                }
            }
        }
    }
}
