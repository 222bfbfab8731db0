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

use serde::Deserialize;

use crate::identity::Subnet;

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(rename(deserialize = "General"))]
    pub general: General,

    #[serde(rename(deserialize = "Peers"))]
    pub peers: Peers,

    #[serde(rename(deserialize = "Limits"))]
    pub limits: Limits,

    #[serde(rename(deserialize = "TimeSync"))]
    pub time_sync: TimeSync,

    #[serde(rename(deserialize = "Log"))]
    pub log: Log,
}

#[derive(Deserialize, Debug, Clone)]
pub struct General {
    /// This node's own identity. If absent, resolved at startup from
    /// `bind_address` by reverse-mapping it through the directory's subnet.
    pub self_aem: Option<u32>,

    pub bind_address: String,

    /// High two octets of the subnet every peer's IP lives under.
    pub subnet_hi: u8,
    pub subnet_lo: u8,

    /// Pairwise session data port. Time-sync listens on `data_port + 1`.
    pub data_port: u16,

    /// ASCII body width, in bytes.
    pub body_len: usize,

    /// Requested process lifetime, in seconds.
    pub requested_duration: u64,
}

#[derive(Debug, Clone)]
pub enum PeerSource {
    List(Vec<u32>),
    Range { min: u32, len: u32 },
}

#[derive(Deserialize, Debug, Clone)]
pub struct Peers {
    /// `"list"` or `"range"`.
    pub source: String,

    #[serde(default)]
    pub list: Vec<u32>,

    pub range_min: Option<u32>,
    pub range_len: Option<u32>,
}

impl Peers {
    pub fn source(&self) -> PeerSource {
        match self.source.as_str() {
            "range" => PeerSource::Range {
                min: self.range_min.expect("range_min required for range source"),
                len: self.range_len.expect("range_len required for range source"),
            },
            _ => PeerSource::List(self.list.clone()),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Limits {
    /// Message Store capacity.
    pub msg_cap: usize,

    /// Inbox capacity.
    pub inbox_cap: usize,

    /// Session-worker concurrency ceiling.
    pub max_workers: usize,

    /// Hard ceiling on sessions per peer; also the contact-stat array
    /// capacity.
    pub max_connections_per_peer: usize,

    pub producer_delay_min: u64,
    pub producer_delay_max: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TimeSync {
    /// Identity of the time-sync reference peer.
    pub ref_time_aem: u32,

    /// IANA timezone name installed after a successful sync.
    pub timezone: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Log {
    /// Where the structured session JSON document is written.
    pub path: String,

    pub also_log_to_stdout: bool,
}

impl General {
    pub fn subnet(&self) -> Subnet {
        Subnet(self.subnet_hi, self.subnet_lo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_source() {
        let toml = r#"
            [General]
            bind_address = "10.20.0.1:2020"
            subnet_hi = 10
            subnet_lo = 20
            data_port = 2020
            body_len = 256
            requested_duration = 60

            [Peers]
            source = "list"
            list = [9990, 9991]


            [Limits]
            msg_cap = 64
            inbox_cap = 64
            max_workers = 4
            max_connections_per_peer = 8
            producer_delay_min = 1
            producer_delay_max = 5

            [TimeSync]
            ref_time_aem = 1
            timezone = "Europe/Athens"

            [Log]
            path = "session.json"
            also_log_to_stdout = false
        "#;

        let config: Config = toml::from_str(toml).unwrap();

        match config.peers.source() {
            PeerSource::List(list) => assert_eq!(list, vec![9990, 9991]),
            _ => panic!("expected list source"),
        }

        assert_eq!(config.limits.msg_cap, 64);
        assert_eq!(config.general.subnet(), Subnet(10, 20));
    }
}
