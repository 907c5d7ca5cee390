//! Collapsing of concurrent loads for the same cache key.

use crate::cache::CacheKey;
use crate::membership::StoreResult;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};

type SharedLoad<T> = Shared<BoxFuture<'static, StoreResult<T>>>;

struct Flight<T: Clone> {
    id: u64,
    epoch: u64,
    load: SharedLoad<T>,
}

/// Table of store reads currently in progress, one per key.
///
/// A caller joins an existing read if it was started under the caller's
/// invalidation epoch or a newer one. Reads started before an eviction may
/// return the pre-mutation state, so callers that observed the eviction
/// start a fresh one instead.
pub(crate) struct InFlight<T: Clone> {
    flights: DashMap<CacheKey, Flight<T>>,
    next_id: AtomicU64,
}

impl<T> InFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            flights: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Await the read for `key`, starting it with `start` if none under
    /// `epoch` or later is running. Every participant receives the same
    /// result.
    pub(crate) async fn run<F>(&self, key: &CacheKey, epoch: u64, start: F) -> StoreResult<T>
    where
        F: FnOnce() -> BoxFuture<'static, StoreResult<T>>,
    {
        let (id, load) = match self.flights.entry(key.clone()) {
            Entry::Occupied(entry) if entry.get().epoch >= epoch => {
                let flight = entry.get();
                (flight.id, flight.load.clone())
            }
            entry => {
                let flight = Flight {
                    id: self.next_id.fetch_add(1, Ordering::Relaxed),
                    epoch,
                    load: start().shared(),
                };
                let joined = (flight.id, flight.load.clone());
                match entry {
                    Entry::Occupied(mut occupied) => {
                        occupied.insert(flight);
                    }
                    Entry::Vacant(vacant) => {
                        vacant.insert(flight);
                    }
                }
                joined
            }
        };

        // Whoever finishes or is dropped first clears the slot, unless a
        // newer flight already replaced it.
        let _slot = Slot {
            flights: &self.flights,
            key,
            id,
        };
        load.await
    }

    /// Number of reads in progress.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.flights.len()
    }
}

struct Slot<'a, T: Clone> {
    flights: &'a DashMap<CacheKey, Flight<T>>,
    key: &'a CacheKey,
    id: u64,
}

impl<T: Clone> Drop for Slot<'_, T> {
    fn drop(&mut self) {
        self.flights.remove_if(self.key, |_, flight| flight.id == self.id);
    }
}
