//! Call and latency observation for the mutation boundary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::debug;

/// Which mutation is being observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// A needle write.
    Write,
    /// A needle delete.
    Delete,
}

impl MutationKind {
    /// Short label for logs and metric names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Delete => "delete",
        }
    }
}

/// Sink for per-request call counts and latencies.
pub trait Observer: Send + Sync {
    /// A mutation request arrived.
    fn record_call(&self, kind: MutationKind);

    /// A mutation request finished after `elapsed`, successfully or not.
    fn record_latency(&self, kind: MutationKind, elapsed: Duration);
}

/// Observer that emits a `debug!` event per request.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn record_call(&self, kind: MutationKind) {
        debug!(kind = kind.as_str(), "mutation request");
    }

    fn record_latency(&self, kind: MutationKind, elapsed: Duration) {
        debug!(
            kind = kind.as_str(),
            elapsed_us = elapsed.as_micros() as u64,
            "mutation finished"
        );
    }
}

/// In-process counters, one instance per node.
#[derive(Debug, Default)]
pub struct MutationStats {
    writes: AtomicU64,
    deletes: AtomicU64,
    write_nanos: AtomicU64,
    delete_nanos: AtomicU64,
}

impl MutationStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded calls of `kind`.
    pub fn calls(&self, kind: MutationKind) -> u64 {
        self.counter(kind).load(Ordering::Relaxed)
    }

    /// Sum of recorded latencies of `kind`.
    pub fn total_latency(&self, kind: MutationKind) -> Duration {
        Duration::from_nanos(self.nanos(kind).load(Ordering::Relaxed))
    }

    fn counter(&self, kind: MutationKind) -> &AtomicU64 {
        match kind {
            MutationKind::Write => &self.writes,
            MutationKind::Delete => &self.deletes,
        }
    }

    fn nanos(&self, kind: MutationKind) -> &AtomicU64 {
        match kind {
            MutationKind::Write => &self.write_nanos,
            MutationKind::Delete => &self.delete_nanos,
        }
    }
}

impl Observer for MutationStats {
    fn record_call(&self, kind: MutationKind) {
        self.counter(kind).fetch_add(1, Ordering::Relaxed);
    }

    fn record_latency(&self, kind: MutationKind, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.nanos(kind).fetch_add(nanos, Ordering::Relaxed);
    }
}
