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

//! Append-only structured session log. External collaborator per the
//! design: its contract is "append-only event record", not protocol logic.
//!
//! Unlike the source system (which appends to an open file handle event by
//! event, using seek+peek to drop the trailing comma), this implementation
//! accumulates events in memory and serializes the whole document once at
//! teardown with `serde_json`. Both satisfy the same contract; this
//! avoids partial/malformed JSON ever being observable on disk mid-session.

use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

use crate::identity::Aem;
use crate::message::Message;
use crate::stats::Stats;

#[derive(Serialize, Clone)]
#[serde(untagged)]
pub enum EventMessage {
    Message(MessageEvent),
    Datetime(DatetimeEvent),
}

#[derive(Serialize, Clone)]
pub struct MessageEvent {
    pub saved_at: String,
    pub action: String,
    pub sender: u32,
    pub recipient: u32,
    pub created_at: u64,
    pub body: String,
    pub transmitted: bool,
    pub transmitted_devices: String,
    pub transmitted_to_recipient: bool,
}

#[derive(Serialize, Clone)]
pub struct DatetimeEvent {
    pub saved_at: String,
    pub action: String,
    pub previous_now: u64,
    pub new_now: u64,
}

#[derive(Serialize)]
pub struct Event {
    pub occured_at: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub server: u32,
    pub client: u32,
    pub messages: Vec<EventMessage>,
    pub duration: f64,
}

#[derive(Serialize)]
pub struct ConnectionRecord {
    pub start: String,
    pub end: String,
    pub duration_ms: f64,
}

#[derive(Serialize)]
pub struct DeviceHistory {
    pub aem: String,
    pub connections: Vec<ConnectionRecord>,
    pub average_duration_ms: f64,
}

#[derive(Serialize)]
pub struct BufferMessageRecord {
    pub sender: u32,
    pub recipient: u32,
    pub created_at: u64,
    pub body: String,
}

#[derive(Serialize)]
pub struct InboxMessageRecord {
    pub sender: u32,
    pub created_at: u64,
    pub saved_at: u64,
    pub body: String,
    pub first_sender: u32,
}

#[derive(Serialize)]
pub struct SessionDocument {
    pub start: String,
    pub client_aem: u32,
    pub requested_duration: u64,
    pub events: Vec<Event>,
    pub duration: f64,
    pub end: String,
    pub stats: Stats,
    pub devices: Vec<DeviceHistory>,
    pub buffer_messages: Vec<BufferMessageRecord>,
    pub inbox_messages: Vec<InboxMessageRecord>,
}

struct EventBuilder {
    occured_at: String,
    kind: String,
    server: u32,
    client: u32,
    messages: Vec<EventMessage>,
    started: Instant,
}

pub struct SessionLog {
    path: String,
    also_stdout: bool,
    client_aem: Aem,
    requested_duration: u64,
    start_wall: String,
    start_instant: Instant,
    events: Vec<Event>,
    current: Option<EventBuilder>,
}

fn now_hms() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

impl SessionLog {
    pub fn new(path: String, also_stdout: bool, client_aem: Aem, requested_duration: u64) -> Self {
        if also_stdout {
            println!(
                "/*\n| start: NEW SESSION\n| client = {}\n| file   = {}\n*/",
                client_aem, path
            );
        }

        Self {
            path,
            also_stdout,
            client_aem,
            requested_duration,
            start_wall: now_rfc3339(),
            start_instant: Instant::now(),
            events: Vec::new(),
            current: None,
        }
    }

    /// Begins a new event. Must be paired with [`SessionLog::event_stop`].
    /// Events are atomic with respect to each other: the caller is expected
    /// to hold the log lock for the full start..stop span.
    pub fn event_start(&mut self, kind: &str, server: Aem, client: Aem) {
        self.current = Some(EventBuilder {
            occured_at: now_hms(),
            kind: kind.to_string(),
            server: server.0,
            client: client.0,
            messages: Vec::new(),
            started: Instant::now(),
        });
    }

    pub fn message(&mut self, action: &str, message: &Message) {
        let devices: String = message
            .transmitted_devices
            .iter()
            .map(|&b| if b { '1' } else { '0' })
            .collect();

        let record = MessageEvent {
            saved_at: now_rfc3339(),
            action: action.to_string(),
            sender: message.sender.0,
            recipient: message.recipient.0,
            created_at: message.created_at,
            body: message.body.clone(),
            transmitted: message.transmitted,
            transmitted_devices: devices,
            transmitted_to_recipient: message.transmitted_to_recipient,
        };

        if let Some(builder) = &mut self.current {
            builder.messages.push(EventMessage::Message(record));
        }
    }

    pub fn message_datetime(&mut self, previous_now: u64, new_now: u64) {
        let record = DatetimeEvent {
            saved_at: now_rfc3339(),
            action: "datetime".to_string(),
            previous_now,
            new_now,
        };

        if let Some(builder) = &mut self.current {
            builder.messages.push(EventMessage::Datetime(record));
        }
    }

    pub fn event_stop(&mut self) {
        if let Some(builder) = self.current.take() {
            let duration = builder.started.elapsed().as_secs_f64() * 1000.0;

            self.events.push(Event {
                occured_at: builder.occured_at,
                kind: builder.kind,
                server: builder.server,
                client: builder.client,
                messages: builder.messages,
                duration,
            });
        }
    }

    #[cfg(test)]
    pub fn events_of_kind(&self, kind: &str) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    /// Finalizes the document and writes it to [`SessionLog::path`].
    /// Best-effort: write failures are logged to stderr and never
    /// propagated, matching the design's "log write never interrupts the
    /// session" policy.
    pub fn finish(
        self,
        stats: Stats,
        devices: Vec<DeviceHistory>,
        buffer_messages: Vec<BufferMessageRecord>,
        inbox_messages: Vec<InboxMessageRecord>,
    ) {
        let actual_duration = self.start_instant.elapsed().as_secs_f64();

        if self.also_stdout {
            println!(
                "/*\n| end: NEW SESSION\n| duration actual    = {:.3}s\n| duration requested = {}s\n| produced           = {}\n| received           = {} (for me: {})\n| transmitted        = {} (to recipient: {})\n*/",
                actual_duration,
                self.requested_duration,
                stats.produced,
                stats.received,
                stats.received_for_me,
                stats.transmitted,
                stats.transmitted_to_recipient,
            );
        }

        let document = SessionDocument {
            start: self.start_wall,
            client_aem: self.client_aem.0,
            requested_duration: self.requested_duration,
            events: self.events,
            duration: actual_duration,
            end: now_rfc3339(),
            stats,
            devices,
            buffer_messages,
            inbox_messages,
        };

        match serde_json::to_vec_pretty(&document) {
            Ok(bytes) => {
                if let Err(e) = std::fs::write(&self.path, bytes) {
                    error!("unable to write session log {}: {}", self.path, e);
                }
            }
            Err(e) => error!("unable to serialize session log: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Aem as AemT;

    #[test]
    fn records_events_and_messages() {
        let mut log = SessionLog::new("/tmp/does-not-matter.json".into(), false, AemT(9990), 60);

        log.event_start("connection", AemT(9990), AemT(9991));
        log.message(
            "received",
            &Message::new(AemT(1), AemT(2), 100, "hi".into(), 2),
        );
        log.event_stop();

        assert_eq!(log.events.len(), 1);
        assert_eq!(log.events[0].messages.len(), 1);
    }
}
