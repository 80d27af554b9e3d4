//! In-flight download accounting, per hoster and in aggregate.
//!
//! The ledger is the only mutable state shared across workers. All mutation
//! goes through `try_acquire`/`release`/`reconcile`; the counters are guarded
//! by a single mutex so both ceilings are checked and updated atomically.
//! Persisted `downloading` rows are the ground truth; `reconcile` rebuilds the
//! counters from them on process start.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Counters {
    per_hoster: HashMap<String, usize>,
    total: usize,
}

/// Tracks current in-flight downloads against a global ceiling and per-hoster
/// ceilings supplied by the caller.
#[derive(Debug)]
pub struct ConcurrencyLedger {
    global_max: usize,
    inner: Mutex<Counters>,
}

impl ConcurrencyLedger {
    /// Create a ledger with the given global ceiling (clamped to at least 1).
    pub fn new(global_max: usize) -> Self {
        Self {
            global_max: global_max.max(1),
            inner: Mutex::new(Counters::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Slots left under the global ceiling.
    pub fn global_slots_left(&self) -> usize {
        let counters = self.lock();
        self.global_max.saturating_sub(counters.total)
    }

    /// Slots left for one hoster under its own ceiling.
    pub fn hoster_slots_left(&self, hoster_id: &str, hoster_max: usize) -> usize {
        let counters = self.lock();
        let in_flight = counters.per_hoster.get(hoster_id).copied().unwrap_or(0);
        hoster_max.saturating_sub(in_flight)
    }

    /// Current in-flight count for one hoster.
    pub fn in_flight(&self, hoster_id: &str) -> usize {
        self.lock().per_hoster.get(hoster_id).copied().unwrap_or(0)
    }

    /// Total in-flight count across all hosters.
    pub fn total_in_flight(&self) -> usize {
        self.lock().total
    }

    /// Atomically claim a slot for `hoster_id` if both the global ceiling and
    /// the hoster's ceiling have room. Returns false (and changes nothing)
    /// otherwise.
    pub fn try_acquire(&self, hoster_id: &str, hoster_max: usize) -> bool {
        let mut counters = self.lock();
        if counters.total >= self.global_max {
            return false;
        }
        let in_flight = counters.per_hoster.entry(hoster_id.to_string()).or_insert(0);
        if *in_flight >= hoster_max {
            return false;
        }
        *in_flight += 1;
        counters.total += 1;
        true
    }

    /// Return a slot claimed via `try_acquire`. A release without a matching
    /// acquire is an accounting bug: it is flagged and otherwise ignored so the
    /// counters never go negative.
    pub fn release(&self, hoster_id: &str) {
        let mut counters = self.lock();
        match counters.per_hoster.get_mut(hoster_id) {
            Some(in_flight) if *in_flight > 0 => {
                *in_flight -= 1;
                counters.total = counters.total.saturating_sub(1);
            }
            _ => {
                tracing::warn!(hoster_id, "release without matching acquire");
            }
        }
    }

    /// Replace all counters with ground truth from the state store, called on
    /// startup before any worker accepts jobs.
    pub fn reconcile(&self, in_flight_by_hoster: HashMap<String, usize>) {
        let total = in_flight_by_hoster.values().sum();
        let mut counters = self.lock();
        counters.per_hoster = in_flight_by_hoster;
        counters.total = total;
        if total > self.global_max {
            tracing::warn!(
                total,
                global_max = self.global_max,
                "persisted in-flight downloads exceed the global ceiling"
            );
        } else {
            tracing::info!(total, "concurrency ledger reconciled from store");
        }
    }

    /// Acquired-slot guard: releases the slot on drop. Call only after a
    /// successful `try_acquire` for the same hoster.
    pub fn guard<'a>(&'a self, hoster_id: &'a str) -> SlotGuard<'a> {
        SlotGuard {
            ledger: self,
            hoster_id,
        }
    }

    /// Copy of the per-hoster counters, for status views and tests.
    pub fn snapshot(&self) -> HashMap<String, usize> {
        self.lock().per_hoster.clone()
    }
}

/// Releases a claimed slot when dropped.
pub struct SlotGuard<'a> {
    ledger: &'a ConcurrencyLedger,
    hoster_id: &'a str,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.ledger.release(self.hoster_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_respects_hoster_ceiling() {
        let ledger = ConcurrencyLedger::new(10);
        assert!(ledger.try_acquire("h1", 2));
        assert!(ledger.try_acquire("h1", 2));
        assert!(!ledger.try_acquire("h1", 2));
        assert_eq!(ledger.in_flight("h1"), 2);

        // Another hoster still has room.
        assert!(ledger.try_acquire("h2", 2));
        assert_eq!(ledger.total_in_flight(), 3);
    }

    #[test]
    fn acquire_respects_global_ceiling() {
        let ledger = ConcurrencyLedger::new(2);
        assert!(ledger.try_acquire("h1", 5));
        assert!(ledger.try_acquire("h2", 5));
        // Each hoster has room of its own, the global ceiling says no.
        assert!(!ledger.try_acquire("h3", 5));
        assert_eq!(ledger.global_slots_left(), 0);
    }

    #[test]
    fn failed_acquire_changes_nothing() {
        let ledger = ConcurrencyLedger::new(1);
        assert!(ledger.try_acquire("h1", 1));
        assert!(!ledger.try_acquire("h2", 1));
        assert_eq!(ledger.in_flight("h2"), 0);
        assert_eq!(ledger.total_in_flight(), 1);
    }

    #[test]
    fn release_frees_both_counters() {
        let ledger = ConcurrencyLedger::new(2);
        assert!(ledger.try_acquire("h1", 2));
        assert!(ledger.try_acquire("h1", 2));
        ledger.release("h1");
        assert_eq!(ledger.in_flight("h1"), 1);
        assert_eq!(ledger.global_slots_left(), 1);
        assert!(ledger.try_acquire("h2", 1));
    }

    #[test]
    fn release_without_acquire_never_goes_negative() {
        let ledger = ConcurrencyLedger::new(2);
        ledger.release("h1");
        ledger.release("unknown");
        assert_eq!(ledger.in_flight("h1"), 0);
        assert_eq!(ledger.total_in_flight(), 0);
        assert_eq!(ledger.global_slots_left(), 2);
    }

    #[test]
    fn global_cap_dominates_individual_room() {
        // globalMax=5, two hosters each max 3 with 2 in flight: one slot left.
        let ledger = ConcurrencyLedger::new(5);
        ledger.reconcile(HashMap::from([
            ("a".to_string(), 2),
            ("b".to_string(), 2),
        ]));
        assert_eq!(ledger.global_slots_left(), 1);
        assert_eq!(ledger.hoster_slots_left("a", 3), 1);
        assert_eq!(ledger.hoster_slots_left("b", 3), 1);

        assert!(ledger.try_acquire("a", 3));
        assert!(!ledger.try_acquire("b", 3));
    }

    #[test]
    fn reconcile_replaces_previous_state() {
        let ledger = ConcurrencyLedger::new(10);
        assert!(ledger.try_acquire("stale", 5));

        ledger.reconcile(HashMap::from([
            ("a".to_string(), 2),
            ("b".to_string(), 0),
        ]));
        assert_eq!(ledger.in_flight("a"), 2);
        assert_eq!(ledger.in_flight("b"), 0);
        assert_eq!(ledger.in_flight("stale"), 0);
        assert_eq!(ledger.total_in_flight(), 2);
    }

    #[test]
    fn guard_releases_on_drop() {
        let ledger = ConcurrencyLedger::new(2);
        assert!(ledger.try_acquire("h1", 2));
        {
            let _slot = ledger.guard("h1");
            assert_eq!(ledger.in_flight("h1"), 1);
        }
        assert_eq!(ledger.in_flight("h1"), 0);
    }
}
