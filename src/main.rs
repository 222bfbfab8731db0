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

#[macro_use]
extern crate log;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::Parser;

use epidemic_node::config::Config;
use epidemic_node::error::NodeResult;
use epidemic_node::identity::Aem;
use epidemic_node::node::Node;
use epidemic_node::sessionlog::{BufferMessageRecord, ConnectionRecord, DeviceHistory, InboxMessageRecord};
use epidemic_node::{listener, polling, producer, timesync};

/// Decentralized delay-tolerant messaging node.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Overrides `General.self_aem` from the configuration file.
    #[arg(long)]
    self_aem: Option<u32>,

    /// Overrides `General.requested_duration`, in seconds.
    #[arg(long)]
    duration: Option<u64>,

    /// Overrides `Log.also_log_to_stdout`.
    #[arg(long)]
    log_stdout: bool,
}

#[tokio::main]
async fn main() -> NodeResult<()> {
    env_logger::init();

    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;

    if let Some(self_aem) = cli.self_aem {
        config.general.self_aem = Some(self_aem);
    }

    if let Some(duration) = cli.duration {
        config.general.requested_duration = duration;
    }

    if cli.log_stdout {
        config.log.also_log_to_stdout = true;
    }

    let self_aem = Node::resolve_self_aem(&config)?;

    info!(
        "starting node {} (requested duration {}s)",
        self_aem, config.general.requested_duration
    );

    let requested_duration = config.general.requested_duration;
    let ref_time_aem = Aem(config.time_sync.ref_time_aem);

    let node = Arc::new(Node::new(config, self_aem));

    let time_sync_bind = format!("0.0.0.0:{}", node.time_sync_port()).parse().unwrap();

    let time_sync_server = tokio::spawn(timesync::serve(time_sync_bind));

    if self_aem != ref_time_aem {
        let ref_addr = node.peer_time_sync_addr(ref_time_aem);
        let timezone = node.config.time_sync.timezone.clone();

        let mut log = node.log.lock().await;
        timesync::sync_once(ref_addr, &timezone, &mut log, ref_time_aem, self_aem).await;
    }

    let listener_task = tokio::spawn(listener::run(node.clone()));
    let polling_task = tokio::spawn(polling::run(node.clone()));
    let producer_task = tokio::spawn(producer::run(node.clone()));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
        }
        _ = tokio::time::sleep(Duration::from_secs(requested_duration)) => {
            info!("requested duration elapsed");
        }
    }

    node.request_shutdown();
    time_sync_server.abort();

    let _ = listener_task.await;
    let _ = polling_task.await;
    let _ = producer_task.await;

    finish(node).await;

    Ok(())
}

fn load_config(path: &str) -> NodeResult<Config> {
    let raw = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&raw)?;
    Ok(config)
}

fn format_us(us: i64) -> String {
    let secs = us.div_euclid(1_000_000);
    let nanos = (us.rem_euclid(1_000_000) * 1_000) as u32;

    DateTime::<Utc>::from_timestamp(secs, nanos)
        .map(|d| d.to_rfc3339())
        .unwrap_or_default()
}

/// Drains the node into the final session document and writes it out.
/// Requires every worker to have already been joined: the session log is
/// finalized from an owned `SessionLog`, and `Arc::try_unwrap` only
/// succeeds with no other references outstanding.
async fn finish(node: Arc<Node>) {
    let devices: Vec<DeviceHistory> = {
        let contact_stats = node.contact_stats.lock().await;

        node.directory
            .iter()
            .map(|(index, aem)| {
                let history = contact_stats.history(index);

                let connections: Vec<ConnectionRecord> = history
                    .iter()
                    .map(|&(start, end)| ConnectionRecord {
                        start: format_us(start),
                        end: format_us(end),
                        duration_ms: (end - start) as f64 / 1000.0,
                    })
                    .collect();

                let average_duration_ms = if connections.is_empty() {
                    0.0
                } else {
                    connections.iter().map(|c| c.duration_ms).sum::<f64>() / connections.len() as f64
                };

                DeviceHistory {
                    aem: aem.to_string(),
                    connections,
                    average_duration_ms,
                }
            })
            .collect()
    };

    let (buffer_messages, inbox_messages) = {
        let stores = node.stores.lock().await;

        let buffer_messages: Vec<BufferMessageRecord> = stores
            .messages
            .iter()
            .map(|m| BufferMessageRecord {
                sender: m.sender.0,
                recipient: m.recipient.0,
                created_at: m.created_at,
                body: m.body.clone(),
            })
            .collect();

        let inbox_messages: Vec<InboxMessageRecord> = stores
            .inbox
            .iter()
            .map(|m| InboxMessageRecord {
                sender: m.sender.0,
                created_at: m.created_at,
                saved_at: m.saved_at,
                body: m.body.clone(),
                first_sender: m.first_sender.0,
            })
            .collect();

        (buffer_messages, inbox_messages)
    };

    let stats = *node.stats.lock().await;

    match Arc::try_unwrap(node) {
        Ok(node) => {
            let log = node.log.into_inner();
            log.finish(stats, devices, buffer_messages, inbox_messages);
        }
        Err(_) => {
            error!("could not finalize session log: node still has outstanding references");
        }
    }
}
