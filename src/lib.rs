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

pub mod body;
pub mod config;
pub mod contacts;
pub mod error;
pub mod identity;
pub mod listener;
pub mod message;
pub mod node;
pub mod pool;
pub mod polling;
pub mod producer;
pub mod session;
pub mod sessionlog;
pub mod stats;
pub mod store;
pub mod timesync;
pub mod wire;
