//! Global atomic counters for loop observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single `tracing::info!`
//! event (at the end of a run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters; no allocations, no locking.
pub struct Metrics {
    simulations: AtomicU64,
    verifications: AtomicU64,
    patches: AtomicU64,
    revisions: AtomicU64,
    cycles: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            simulations: AtomicU64::new(0),
            verifications: AtomicU64::new(0),
            patches: AtomicU64::new(0),
            revisions: AtomicU64::new(0),
            cycles: AtomicU64::new(0),
        }
    }

    pub fn inc_simulations(&self) {
        self.simulations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "simulations", "counter incremented");
    }

    pub fn inc_verifications(&self) {
        self.verifications.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "verifications", "counter incremented");
    }

    pub fn inc_patches(&self) {
        self.patches.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "patches", "counter incremented");
    }

    pub fn inc_revisions(&self) {
        self.revisions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "revisions", "counter incremented");
    }

    pub fn inc_cycles(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cycles", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            simulations = self.simulations(),
            verifications = self.verifications(),
            patches = self.patches(),
            revisions = self.revisions(),
            cycles = self.cycles(),
        );
    }

    pub fn simulations(&self) -> u64 {
        self.simulations.load(Ordering::Relaxed)
    }

    pub fn verifications(&self) -> u64 {
        self.verifications.load(Ordering::Relaxed)
    }

    pub fn patches(&self) -> u64 {
        self.patches.load(Ordering::Relaxed)
    }

    pub fn revisions(&self) -> u64 {
        self.revisions.load(Ordering::Relaxed)
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.simulations.store(0, Ordering::Relaxed);
        self.verifications.store(0, Ordering::Relaxed);
        self.patches.store(0, Ordering::Relaxed);
        self.revisions.store(0, Ordering::Relaxed);
        self.cycles.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_simulations();
        m.inc_simulations();
        assert_eq!(m.simulations(), 2);

        m.inc_patches();
        assert_eq!(m.patches(), 1);

        m.inc_revisions();
        m.inc_cycles();
        m.inc_cycles();
        assert_eq!(m.revisions(), 1);
        assert_eq!(m.cycles(), 2);
        assert_eq!(m.verifications(), 0);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_simulations();
        m.inc_verifications();
        m.inc_patches();
        m.inc_revisions();
        m.inc_cycles();
        m.reset();
        assert_eq!(m.simulations(), 0);
        assert_eq!(m.verifications(), 0);
        assert_eq!(m.patches(), 0);
        assert_eq!(m.revisions(), 0);
        assert_eq!(m.cycles(), 0);
    }
}
