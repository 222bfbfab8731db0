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

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("IO error {0}")]
    IoError(#[from] std::io::Error),

    #[error("config error {0}")]
    ConfigError(#[from] toml::de::Error),

    #[error("malformed wire record")]
    MalformedRecord,

    #[error("invalid net address {0}")]
    InvalidAddress(#[from] std::net::AddrParseError),

    #[error("unable to parse int {0}")]
    InvalidInt(#[from] std::num::ParseIntError),

    /// An invariant owned by this code, not the network, was violated.
    /// Per the design, only these errors terminate the process.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Local network interface could not be resolved to a configured AEM.
    #[error("self AEM could not be resolved from bind address {0}")]
    UnresolvedSelfAem(String),
}

pub type NodeResult<T> = std::result::Result<T, NodeError>;
