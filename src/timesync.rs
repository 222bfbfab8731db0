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

//! Time-synchronization handshake. Server side answers with its wall clock;
//! client side (run once at startup) copies it. Wire format is two
//! consecutive native-endian `u64`s (seconds, microseconds since epoch) -
//! homogeneous-LAN only, per the design's Open Question.

use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::NodeResult;
use crate::sessionlog::SessionLog;

pub const RECORD_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSample {
    pub sec: u64,
    pub usec: u64,
}

impl ClockSample {
    pub fn now() -> Self {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();

        Self {
            sec: now.as_secs(),
            usec: now.subsec_micros() as u64,
        }
    }

    fn to_bytes(self) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];

        buf[..8].copy_from_slice(&self.sec.to_ne_bytes());
        buf[8..].copy_from_slice(&self.usec.to_ne_bytes());

        buf
    }

    fn from_bytes(buf: &[u8; RECORD_LEN]) -> Self {
        let sec = u64::from_ne_bytes(buf[..8].try_into().unwrap());
        let usec = u64::from_ne_bytes(buf[8..].try_into().unwrap());

        Self { sec, usec }
    }
}

/// Time-sync server loop: binds `(self_ip, data_port + 1)` and answers every
/// connection with the current wall clock, once, then closes.
pub async fn serve(bind_addr: SocketAddr) -> NodeResult<()> {
    let listener = TcpListener::bind(bind_addr).await?;

    info!("time-sync server listening on {}", bind_addr);

    loop {
        let (mut stream, addr) = listener.accept().await?;

        let sample = ClockSample::now();

        // The server never reads from this connection; it responds
        // immediately with its clock sample, then half-closes the write
        // side below once that's sent.
        if let Err(e) = stream.write_all(&sample.to_bytes()).await {
            warn!("time-sync: failed to send clock sample to {}: {}", addr, e);
            continue;
        }

        let _ = stream.shutdown().await;

        debug!("time-sync: sent {:?} to {}", sample, addr);
    }
}

/// Runs once at startup: connects to the reference peer's time-sync port
/// and retries the whole connection cycle until a full 16-byte record is
/// read.
pub async fn sync_once(
    ref_addr: SocketAddr,
    timezone: &str,
    log: &mut SessionLog,
    ref_aem: crate::identity::Aem,
    self_aem: crate::identity::Aem,
) -> ClockSample {
    loop {
        match try_sync(ref_addr).await {
            Some(sample) => {
                let previous_now = ClockSample::now().sec;

                std::env::set_var("TZ", timezone);
                install_clock(sample);

                let new_now = ClockSample::now().sec;

                log.event_start("datetime", ref_aem, self_aem);
                log.message_datetime(previous_now, new_now);
                log.event_stop();

                info!(
                    "time-sync: installed clock from {} (previous_now={}, new_now={})",
                    ref_addr, previous_now, new_now
                );

                return sample;
            }
            None => {
                warn!("time-sync: short read from {}, retrying", ref_addr);
            }
        }
    }
}

async fn try_sync(ref_addr: SocketAddr) -> Option<ClockSample> {
    let mut stream = TcpStream::connect(ref_addr).await.ok()?;

    let _ = stream.shutdown().await;

    let mut buf = [0u8; RECORD_LEN];
    stream.read_exact(&mut buf).await.ok()?;

    Some(ClockSample::from_bytes(&buf))
}

/// Installs `sample` as the system wall clock. Requires elevated
/// privileges on most systems; failures are logged, not fatal - a node
/// that can't adjust its clock still participates in the mesh, just with
/// creation timestamps drifted from the reference peer.
#[cfg(unix)]
fn install_clock(sample: ClockSample) {
    let tv = libc::timeval {
        tv_sec: sample.sec as libc::time_t,
        tv_usec: sample.usec as libc::suseconds_t,
    };

    let status = unsafe { libc::settimeofday(&tv, std::ptr::null()) };

    if status != 0 {
        warn!(
            "time-sync: settimeofday failed (errno = {}); continuing with unsynced clock",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn install_clock(_sample: ClockSample) {
    warn!("time-sync: clock installation is only implemented on unix targets");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_sample_round_trips_through_wire_bytes() {
        let sample = ClockSample {
            sec: 1_700_000_000,
            usec: 123_456,
        };

        let bytes = sample.to_bytes();
        let parsed = ClockSample::from_bytes(&bytes);

        assert_eq!(sample, parsed);
    }

    #[tokio::test]
    async fn server_answers_with_current_clock() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let sample = ClockSample::now();
            let _ = stream.shutdown().await;
            stream.write_all(&sample.to_bytes()).await.unwrap();
            let _ = stream.shutdown().await;
        });

        let sample = try_sync(addr).await;
        assert!(sample.is_some());
    }
}
