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

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Fixed-size slot table of `MAX_WORKERS`. Reservation never blocks: a
/// contact that finds the pool full runs inline on the caller instead of
/// queuing, which is the system's intentional backpressure mechanism.
#[derive(Clone)]
pub struct WorkerPool {
    slots: Arc<Semaphore>,
}

/// A reserved pool slot. Dropping it releases the slot back to the pool.
pub type PoolSlot = OwnedSemaphorePermit;

impl WorkerPool {
    pub fn new(max_workers: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_workers)),
        }
    }

    /// Attempts to reserve a slot without blocking. `None` means the pool
    /// is full; the caller should run the session inline instead.
    pub fn try_reserve(&self) -> Option<PoolSlot> {
        self.slots.clone().try_acquire_owned().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn overflow_yields_none() {
        let pool = WorkerPool::new(1);

        let first = pool.try_reserve();
        assert!(first.is_some());

        let second = pool.try_reserve();
        assert!(second.is_none());

        drop(first);

        let third = pool.try_reserve();
        assert!(third.is_some());
    }
}
