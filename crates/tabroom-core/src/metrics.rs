//! Global atomic counters for Tabroom.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event, e.g. when a CLI command finishes.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    draws_generated: AtomicU64,
    judges_assigned: AtomicU64,
    reservations_granted: AtomicU64,
    reservation_conflicts: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            draws_generated: AtomicU64::new(0),
            judges_assigned: AtomicU64::new(0),
            reservations_granted: AtomicU64::new(0),
            reservation_conflicts: AtomicU64::new(0),
        }
    }

    pub fn inc_draws(&self) {
        self.draws_generated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "draws_generated", "counter incremented");
    }

    pub fn add_judges_assigned(&self, n: u64) {
        self.judges_assigned.fetch_add(n, Ordering::Relaxed);
        tracing::trace!(metric = "judges_assigned", n, "counter incremented");
    }

    pub fn inc_reservations(&self) {
        self.reservations_granted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "reservations_granted", "counter incremented");
    }

    /// Lost races: taken roles and serialization failures.
    pub fn inc_conflicts(&self) {
        self.reservation_conflicts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "reservation_conflicts", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            draws_generated = self.draws_generated(),
            judges_assigned = self.judges_assigned(),
            reservations_granted = self.reservations_granted(),
            reservation_conflicts = self.reservation_conflicts(),
        );
    }

    pub fn draws_generated(&self) -> u64 {
        self.draws_generated.load(Ordering::Relaxed)
    }

    pub fn judges_assigned(&self) -> u64 {
        self.judges_assigned.load(Ordering::Relaxed)
    }

    pub fn reservations_granted(&self) -> u64 {
        self.reservations_granted.load(Ordering::Relaxed)
    }

    pub fn reservation_conflicts(&self) -> u64 {
        self.reservation_conflicts.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.draws_generated.store(0, Ordering::Relaxed);
        self.judges_assigned.store(0, Ordering::Relaxed);
        self.reservations_granted.store(0, Ordering::Relaxed);
        self.reservation_conflicts.store(0, Ordering::Relaxed);
    }
}
