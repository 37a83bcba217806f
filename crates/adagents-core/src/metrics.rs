//! Global atomic counters for crawl observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] at a natural boundary (end of a crawl, daemon
//! tick) to emit current values as one `tracing::info!` event.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters — no allocations, no locking.
pub struct Metrics {
    publishers_crawled: AtomicU64,
    publishers_unchanged: AtomicU64,
    documents_invalid: AtomicU64,
    fetch_failures: AtomicU64,
    agents_discovered: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            publishers_crawled: AtomicU64::new(0),
            publishers_unchanged: AtomicU64::new(0),
            documents_invalid: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
            agents_discovered: AtomicU64::new(0),
        }
    }

    /// One publisher domain fetched and ingested (any outcome).
    pub fn inc_publishers_crawled(&self) {
        self.publishers_crawled.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "publishers_crawled", "counter incremented");
    }

    /// One publisher whose document digest matched the stored one.
    pub fn inc_publishers_unchanged(&self) {
        self.publishers_unchanged.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "publishers_unchanged", "counter incremented");
    }

    /// One document rejected by validation.
    pub fn inc_documents_invalid(&self) {
        self.documents_invalid.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "documents_invalid", "counter incremented");
    }

    /// One fetch that never produced a document (timeout, connect, 5xx).
    pub fn inc_fetch_failures(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "fetch_failures", "counter incremented");
    }

    /// Agents first seen in a publisher document, by `count`.
    pub fn add_agents_discovered(&self, count: u64) {
        if count > 0 {
            self.agents_discovered.fetch_add(count, Ordering::Relaxed);
            tracing::trace!(metric = "agents_discovered", count, "counter incremented");
        }
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            publishers_crawled = self.publishers_crawled(),
            publishers_unchanged = self.publishers_unchanged(),
            documents_invalid = self.documents_invalid(),
            fetch_failures = self.fetch_failures(),
            agents_discovered = self.agents_discovered(),
        );
    }

    pub fn publishers_crawled(&self) -> u64 {
        self.publishers_crawled.load(Ordering::Relaxed)
    }

    pub fn publishers_unchanged(&self) -> u64 {
        self.publishers_unchanged.load(Ordering::Relaxed)
    }

    pub fn documents_invalid(&self) -> u64 {
        self.documents_invalid.load(Ordering::Relaxed)
    }

    pub fn fetch_failures(&self) -> u64 {
        self.fetch_failures.load(Ordering::Relaxed)
    }

    pub fn agents_discovered(&self) -> u64 {
        self.agents_discovered.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.publishers_crawled.store(0, Ordering::Relaxed);
        self.publishers_unchanged.store(0, Ordering::Relaxed);
        self.documents_invalid.store(0, Ordering::Relaxed);
        self.fetch_failures.store(0, Ordering::Relaxed);
        self.agents_discovered.store(0, Ordering::Relaxed);
    }
}
