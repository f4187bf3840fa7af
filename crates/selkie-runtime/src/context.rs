//! Worker context
//!
//! Binds one OS worker thread to its mailbox, its cache queue, its command
//! channel, and the ownership flag that says which side - dispatcher or
//! worker - may currently mutate its queues. The flag is flipped only by the
//! dispatcher, under the context manager's lock; the worker obeys the command
//! protocol and touches its queues only between `RunWithMsg` and its next
//! `Idle`.

use crate::cmd::CmdChannel;
use crate::mailbox::Mailbox;
use crate::registry::Handle;
use selkie_core::{Address, Msg};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, OnceLock};

// =============================================================================
// WorkerKind
// =============================================================================

/// What a worker context is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    /// Pooled worker with no bound actor; serves dispatcher backlog
    Common,
    /// Dedicated worker hosting one user actor
    UserActor,
    /// The timer worker; emits messages, never receives them
    Timer,
}

impl WorkerKind {
    /// Short name for log lines
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerKind::Common => "common",
            WorkerKind::UserActor => "user_actor",
            WorkerKind::Timer => "timer",
        }
    }

    /// Whether contexts of this kind accept externally-routed messages
    pub fn accepts_routed_msgs(&self) -> bool {
        matches!(self, WorkerKind::UserActor)
    }

    /// Whether contexts of this kind count toward the live-worker total
    /// (the dispatcher's termination condition)
    pub fn counts_as_live(&self) -> bool {
        matches!(self, WorkerKind::Common | WorkerKind::UserActor)
    }
}

// =============================================================================
// Ownership
// =============================================================================

/// Which side may currently mutate the context's queues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The dispatcher thread
    Dispatcher,
    /// The worker thread
    Worker,
}

const OWNERSHIP_DISPATCHER: u8 = 0;
const OWNERSHIP_WORKER: u8 = 1;

// =============================================================================
// WorkerContext
// =============================================================================

/// Per-worker-thread scheduling state
pub struct WorkerContext {
    handle: OnceLock<Handle>,
    addr: Address,
    kind: WorkerKind,
    mailbox: Mailbox,
    /// Holding area for routed messages while the worker owns its mailbox
    cache: Mutex<VecDeque<Msg>>,
    ownership: AtomicU8,
    /// Pending-wakeup list membership flag (kept here so enqueueing is
    /// idempotent without scanning the list)
    in_wait_queue: AtomicBool,
    cmd: CmdChannel,
}

impl WorkerContext {
    /// Create a context for the worker at `addr`.
    ///
    /// A fresh context is worker-owned: the dispatcher takes ownership only
    /// after the worker's first `Idle` notification, so a wakeup can never
    /// race the worker's startup.
    pub fn new(addr: Address, kind: WorkerKind) -> Self {
        Self {
            handle: OnceLock::new(),
            mailbox: Mailbox::new(addr.clone()),
            addr,
            kind,
            cache: Mutex::new(VecDeque::new()),
            ownership: AtomicU8::new(OWNERSHIP_WORKER),
            in_wait_queue: AtomicBool::new(false),
            cmd: CmdChannel::new(),
        }
    }

    /// The registry handle, once registered
    pub fn handle(&self) -> Option<Handle> {
        self.handle.get().copied()
    }

    /// Record the registry handle (set once, at registration)
    pub fn set_handle(&self, handle: Handle) {
        let _ = self.handle.set(handle);
    }

    /// The context's address
    pub fn addr(&self) -> &Address {
        &self.addr
    }

    /// The context's kind
    pub fn kind(&self) -> WorkerKind {
        self.kind
    }

    /// The context's mailbox
    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// The context's command channel
    pub fn cmd(&self) -> &CmdChannel {
        &self.cmd
    }

    // =========================================================================
    // Ownership flag
    // =========================================================================

    /// Current queue owner
    pub fn ownership(&self) -> Ownership {
        match self.ownership.load(Ordering::Acquire) {
            OWNERSHIP_DISPATCHER => Ownership::Dispatcher,
            _ => Ownership::Worker,
        }
    }

    /// Flip the queue owner (dispatcher only, under the manager lock)
    pub fn set_ownership(&self, owner: Ownership) {
        let raw = match owner {
            Ownership::Dispatcher => OWNERSHIP_DISPATCHER,
            Ownership::Worker => OWNERSHIP_WORKER,
        };
        self.ownership.store(raw, Ordering::Release);
    }

    // =========================================================================
    // Pending-wakeup membership
    // =========================================================================

    /// Mark the context as enqueued for wakeup.
    ///
    /// Returns `false` if it was already enqueued (idempotent enqueue).
    pub fn enter_wait_queue(&self) -> bool {
        !self.in_wait_queue.swap(true, Ordering::AcqRel)
    }

    /// Clear the wakeup membership flag
    pub fn leave_wait_queue(&self) {
        self.in_wait_queue.store(false, Ordering::Release);
    }

    /// Whether the context is enqueued for wakeup
    pub fn in_wait_queue(&self) -> bool {
        self.in_wait_queue.load(Ordering::Acquire)
    }

    // =========================================================================
    // Cache queue
    // =========================================================================

    /// Append a routed message to the cache queue
    pub fn cache_push(&self, msg: Msg) {
        self.cache.lock().unwrap().push_back(msg);
    }

    /// Number of cached messages
    pub fn cache_len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    /// Take the whole cache, preserving order
    pub fn take_cache(&self) -> VecDeque<Msg> {
        std::mem::take(&mut *self.cache.lock().unwrap())
    }
}

impl fmt::Display for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {}]", self.kind.as_str(), self.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> WorkerContext {
        WorkerContext::new(Address::new("actor.test.1").unwrap(), WorkerKind::UserActor)
    }

    #[test]
    fn test_new_context_is_worker_owned() {
        assert_eq!(ctx().ownership(), Ownership::Worker);
    }

    #[test]
    fn test_ownership_flip() {
        let c = ctx();
        c.set_ownership(Ownership::Dispatcher);
        assert_eq!(c.ownership(), Ownership::Dispatcher);
        c.set_ownership(Ownership::Worker);
        assert_eq!(c.ownership(), Ownership::Worker);
    }

    #[test]
    fn test_wait_queue_membership_is_idempotent() {
        let c = ctx();
        assert!(!c.in_wait_queue());
        assert!(c.enter_wait_queue());
        assert!(!c.enter_wait_queue());
        c.leave_wait_queue();
        assert!(c.enter_wait_queue());
    }

    #[test]
    fn test_cache_order_preserved() {
        let c = ctx();
        c.cache_push(Msg::text("a"));
        c.cache_push(Msg::text("b"));
        c.cache_push(Msg::text("c"));
        assert_eq!(c.cache_len(), 3);

        let cache = c.take_cache();
        let payloads: Vec<_> = cache.iter().filter_map(|m| m.payload_str()).collect();
        assert_eq!(payloads, vec!["a", "b", "c"]);
        assert_eq!(c.cache_len(), 0);
    }

    #[test]
    fn test_kind_policies() {
        assert!(WorkerKind::UserActor.accepts_routed_msgs());
        assert!(!WorkerKind::Common.accepts_routed_msgs());
        assert!(!WorkerKind::Timer.accepts_routed_msgs());

        assert!(WorkerKind::Common.counts_as_live());
        assert!(WorkerKind::UserActor.counts_as_live());
        assert!(!WorkerKind::Timer.counts_as_live());
    }

    #[test]
    fn test_handle_set_once() {
        let c = ctx();
        assert!(c.handle().is_none());
        c.set_handle(Handle::from_parts(3, 0));
        c.set_handle(Handle::from_parts(9, 1));
        assert_eq!(c.handle(), Some(Handle::from_parts(3, 0)));
    }
}
