//! Coordinator counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters updated by the dispatch loop and the ingestion path
#[derive(Debug, Default)]
pub struct SpaceCounters {
    pub batches_dispatched: AtomicU64,
    pub tasks_dispatched: AtomicU64,
    pub evictions: AtomicU64,
    /// Tasks returned to the ready queue by evictions
    pub tasks_recovered: AtomicU64,
    pub results_ingested: AtomicU64,
    /// Child outcomes delivered to closures, pruned ones included
    pub closure_puts: AtomicU64,
    pub joins_completed: AtomicU64,
    pub broadcasts_accepted: AtomicU64,
    pub broadcasts_rejected: AtomicU64,
    pub submissions_completed: AtomicU64,
}

impl SpaceCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_dispatch(&self, tasks: usize) {
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
        self.tasks_dispatched
            .fetch_add(tasks as u64, Ordering::Relaxed);
    }

    pub fn record_eviction(&self, recovered: usize) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        self.tasks_recovered
            .fetch_add(recovered as u64, Ordering::Relaxed);
    }

    pub fn record_result(&self) {
        self.results_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_closure_put(&self, completed_join: bool) {
        self.closure_puts.fetch_add(1, Ordering::Relaxed);
        if completed_join {
            self.joins_completed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_broadcast(&self, accepted: bool) {
        if accepted {
            self.broadcasts_accepted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.broadcasts_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_submission_completed(&self) {
        self.submissions_completed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time view of the space
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceStats {
    pub ready: usize,
    pub waiting: usize,
    pub computers: usize,
    pub pending_submissions: usize,
    pub batches_dispatched: u64,
    pub tasks_dispatched: u64,
    pub evictions: u64,
    pub tasks_recovered: u64,
    pub results_ingested: u64,
    pub closure_puts: u64,
    pub joins_completed: u64,
    pub broadcasts_accepted: u64,
    pub broadcasts_rejected: u64,
    pub submissions_completed: u64,
}

impl SpaceStats {
    pub(crate) fn from_counters(counters: &SpaceCounters) -> Self {
        Self {
            batches_dispatched: counters.batches_dispatched.load(Ordering::Relaxed),
            tasks_dispatched: counters.tasks_dispatched.load(Ordering::Relaxed),
            evictions: counters.evictions.load(Ordering::Relaxed),
            tasks_recovered: counters.tasks_recovered.load(Ordering::Relaxed),
            results_ingested: counters.results_ingested.load(Ordering::Relaxed),
            closure_puts: counters.closure_puts.load(Ordering::Relaxed),
            joins_completed: counters.joins_completed.load(Ordering::Relaxed),
            broadcasts_accepted: counters.broadcasts_accepted.load(Ordering::Relaxed),
            broadcasts_rejected: counters.broadcasts_rejected.load(Ordering::Relaxed),
            submissions_completed: counters.submissions_completed.load(Ordering::Relaxed),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_snapshot() {
        let counters = SpaceCounters::new();
        counters.record_dispatch(4);
        counters.record_dispatch(2);
        counters.record_eviction(3);
        counters.record_closure_put(false);
        counters.record_closure_put(true);
        counters.record_broadcast(true);
        counters.record_broadcast(false);
        counters.record_broadcast(false);

        let stats = SpaceStats::from_counters(&counters);
        assert_eq!(stats.batches_dispatched, 2);
        assert_eq!(stats.tasks_dispatched, 6);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.tasks_recovered, 3);
        assert_eq!(stats.closure_puts, 2);
        assert_eq!(stats.joins_completed, 1);
        assert_eq!(stats.broadcasts_accepted, 1);
        assert_eq!(stats.broadcasts_rejected, 2);
        assert_eq!(stats.ready, 0);
    }

    #[test]
    fn test_stats_serialize() {
        let stats = SpaceStats {
            computers: 2,
            ..Default::default()
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"computers\":2"));
    }
}
