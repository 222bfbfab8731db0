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

use serde::Serialize;

/// In-memory counters of produced / received / received-for-me /
/// transmitted / transmitted-to-recipient messages.
#[derive(Debug, Default, Serialize, Clone, Copy)]
pub struct Stats {
    pub produced: u32,
    pub received: u32,
    pub received_for_me: u32,
    pub transmitted: u32,
    pub transmitted_to_recipient: u32,

    /// Running sum (not an average, despite the name) of producer sleep
    /// durations in seconds. Display logic divides by `produced` when
    /// reporting. Preserved verbatim from the source system.
    #[serde(rename = "producedDelayAvg")]
    pub produced_delay_avg: f64,
}

impl Stats {
    pub fn produced_delay_avg_seconds(&self) -> f64 {
        if self.produced == 0 {
            0.0
        } else {
            self.produced_delay_avg / self.produced as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avg_divides_running_sum_by_produced_count() {
        let mut stats = Stats::default();

        stats.produced = 2;
        stats.produced_delay_avg = 10.0;

        assert_eq!(stats.produced_delay_avg_seconds(), 5.0);
    }

    #[test]
    fn avg_is_zero_with_no_productions() {
        assert_eq!(Stats::default().produced_delay_avg_seconds(), 0.0);
    }
}
