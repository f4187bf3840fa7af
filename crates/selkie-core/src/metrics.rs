//! Runtime metrics
//!
//! Process-wide atomic counters, cheap enough to record unconditionally.
//! A snapshot captures all counters at approximately the same instant.

use std::sync::atomic::{AtomicU64, Ordering};

static MESSAGES_ROUTED: AtomicU64 = AtomicU64::new(0);
static MESSAGES_DROPPED: AtomicU64 = AtomicU64::new(0);
static WORKER_WAKEUPS: AtomicU64 = AtomicU64::new(0);
static BATCHES_COMPLETED: AtomicU64 = AtomicU64::new(0);
static TIMERS_FIRED: AtomicU64 = AtomicU64::new(0);
static CONN_NOTIFIES: AtomicU64 = AtomicU64::new(0);

/// Record a message entering the routing step
pub fn record_message_routed() {
    MESSAGES_ROUTED.fetch_add(1, Ordering::Relaxed);
}

/// Record a message dropped (unknown or unsupported destination)
pub fn record_message_dropped() {
    MESSAGES_DROPPED.fetch_add(1, Ordering::Relaxed);
}

/// Record an ownership handover to a worker
pub fn record_worker_wakeup() {
    WORKER_WAKEUPS.fetch_add(1, Ordering::Relaxed);
}

/// Record a completed worker batch
pub fn record_batch_completed() {
    BATCHES_COMPLETED.fetch_add(1, Ordering::Relaxed);
}

/// Record a timer expiry
pub fn record_timer_fired() {
    TIMERS_FIRED.fetch_add(1, Ordering::Relaxed);
}

/// Record a connection-event notification
pub fn record_conn_notify() {
    CONN_NOTIFIES.fetch_add(1, Ordering::Relaxed);
}

/// Consolidated metrics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Messages that entered the routing step
    pub messages_routed: u64,
    /// Messages dropped at the routing step
    pub messages_dropped: u64,
    /// Ownership handovers to workers
    pub worker_wakeups: u64,
    /// Completed worker batches
    pub batches_completed: u64,
    /// Timer expiries
    pub timers_fired: u64,
    /// Connection-event notifications
    pub conn_notifies: u64,
}

/// Capture all counters
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        messages_routed: MESSAGES_ROUTED.load(Ordering::Relaxed),
        messages_dropped: MESSAGES_DROPPED.load(Ordering::Relaxed),
        worker_wakeups: WORKER_WAKEUPS.load(Ordering::Relaxed),
        batches_completed: BATCHES_COMPLETED.load(Ordering::Relaxed),
        timers_fired: TIMERS_FIRED.load(Ordering::Relaxed),
        conn_notifies: CONN_NOTIFIES.load(Ordering::Relaxed),
    }
}

/// Reset all counters to zero
pub fn reset() {
    MESSAGES_ROUTED.store(0, Ordering::Relaxed);
    MESSAGES_DROPPED.store(0, Ordering::Relaxed);
    WORKER_WAKEUPS.store(0, Ordering::Relaxed);
    BATCHES_COMPLETED.store(0, Ordering::Relaxed);
    TIMERS_FIRED.store(0, Ordering::Relaxed);
    CONN_NOTIFIES.store(0, Ordering::Relaxed);
}
