//! Worker context manager - registration, routing, ownership handover
//!
//! All manager-wide metadata (the handle registry, the idle FIFO, the
//! pending-wakeup list) lives under one reader/writer lock: lookups take the
//! shared mode, structural mutations the exclusive mode. Message payloads are
//! never locked here - the single-owner discipline on each context's queues
//! makes per-message locking unnecessary, at the cost of making the ownership
//! flip below the one synchronization point that must be race-free.

use crate::cmd::Cmd;
use crate::context::{Ownership, WorkerContext, WorkerKind};
use crate::event_conn::EventConn;
use crate::registry::{EventRef, Handle, HandleRegistry};
use selkie_core::{metrics, Msg};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};
use tracing::{debug, error, warn};

struct Inner {
    registry: HandleRegistry,
    /// Common workers with no assigned work, in arrival order
    idle: VecDeque<Weak<WorkerContext>>,
    /// Contexts with cached messages awaiting ownership handover
    wakeup: VecDeque<Weak<WorkerContext>>,
}

/// Registry of all worker contexts and connection events, idle tracking, and
/// the message-routing algorithm.
pub struct WorkerContextManager {
    inner: RwLock<Inner>,
    /// Live Common/UserActor workers - the dispatcher's termination condition
    live_workers: AtomicUsize,
    /// Cache depth past which a backpressure warning is logged
    cache_pending_warn: usize,
}

impl WorkerContextManager {
    /// Create an empty manager
    pub fn new(cache_pending_warn: usize) -> Self {
        debug_assert!(cache_pending_warn > 0, "warn threshold must be nonzero");
        Self {
            inner: RwLock::new(Inner {
                registry: HandleRegistry::new(),
                idle: VecDeque::new(),
                wakeup: VecDeque::new(),
            }),
            live_workers: AtomicUsize::new(0),
            cache_pending_warn,
        }
    }

    /// Number of live Common/UserActor workers
    pub fn live_worker_count(&self) -> usize {
        self.live_workers.load(Ordering::Acquire)
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register a worker context.
    ///
    /// Rejects a context that is already registered. Common and UserActor
    /// kinds count toward the live-worker total.
    pub fn add(&self, ctx: Arc<WorkerContext>) -> selkie_core::Result<Handle> {
        if let Some(handle) = ctx.handle() {
            error!(ctx = %ctx, %handle, "context already registered");
            return Err(selkie_core::Error::DuplicateRegistration {
                address: ctx.addr().as_str().to_string(),
            });
        }

        let handle = {
            let mut inner = self.inner.write().unwrap();
            inner.registry.register(EventRef::Worker(ctx.clone()))?
        };
        ctx.set_handle(handle);
        if ctx.kind().counts_as_live() {
            self.live_workers.fetch_add(1, Ordering::AcqRel);
        }
        Ok(handle)
    }

    /// Register a connection event
    pub fn add_conn(&self, conn: Arc<EventConn>) -> selkie_core::Result<Handle> {
        let handle = {
            let mut inner = self.inner.write().unwrap();
            inner.registry.register(EventRef::Conn(conn.clone()))?
        };
        conn.set_handle(handle);
        Ok(handle)
    }

    /// Unregister a handle, returning its entry. The handle is never reused.
    pub fn remove(&self, handle: Handle) -> Option<EventRef> {
        let entry = {
            let mut inner = self.inner.write().unwrap();
            inner.registry.unregister(handle)
        }?;
        if let EventRef::Worker(ctx) = &entry {
            if ctx.kind().counts_as_live() {
                self.live_workers.fetch_sub(1, Ordering::AcqRel);
            }
        }
        Some(entry)
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Look up an endpoint by handle
    pub fn get(&self, handle: Handle) -> Option<EventRef> {
        self.inner.read().unwrap().registry.lookup(handle)
    }

    /// Look up a worker context by handle
    pub fn get_worker(&self, handle: Handle) -> Option<Arc<WorkerContext>> {
        match self.get(handle) {
            Some(EventRef::Worker(ctx)) => Some(ctx),
            _ => None,
        }
    }

    /// Look up an endpoint by address
    pub fn get_by_name(&self, name: &str) -> Option<EventRef> {
        self.inner
            .read()
            .unwrap()
            .registry
            .lookup_name(name)
            .map(|(_, entry)| entry)
    }

    /// Snapshot of every registered worker context
    pub fn workers(&self) -> Vec<Arc<WorkerContext>> {
        let mut inner = self.inner.write().unwrap();
        let mut out = Vec::with_capacity(inner.registry.len());
        for _ in 0..inner.registry.len() {
            if let Some((_, EventRef::Worker(ctx))) = inner.registry.next_round_robin() {
                if !out.iter().any(|c: &Arc<WorkerContext>| Arc::ptr_eq(c, &ctx)) {
                    out.push(ctx);
                }
            }
        }
        out
    }

    // =========================================================================
    // Idle FIFO
    // =========================================================================

    /// Append a Common worker to the idle FIFO.
    ///
    /// Inserting a worker that is already idle-listed is a logged no-op.
    pub fn push_back_idle(&self, ctx: &Arc<WorkerContext>) {
        debug_assert_eq!(ctx.kind(), WorkerKind::Common, "only pool workers idle");
        let mut inner = self.inner.write().unwrap();
        let weak = Arc::downgrade(ctx);
        if inner.idle.iter().any(|w| w.ptr_eq(&weak)) {
            warn!(ctx = %ctx, "worker already on idle list");
            return;
        }
        inner.idle.push_back(weak);
    }

    /// Peek the front idle worker, skipping workers that shut down
    pub fn front_idle(&self) -> Option<Arc<WorkerContext>> {
        let mut inner = self.inner.write().unwrap();
        while let Some(weak) = inner.idle.front() {
            match weak.upgrade() {
                Some(ctx) => return Some(ctx),
                None => {
                    inner.idle.pop_front();
                }
            }
        }
        None
    }

    /// Pop the front idle worker
    pub fn pop_front_idle(&self) -> Option<Arc<WorkerContext>> {
        let mut inner = self.inner.write().unwrap();
        while let Some(weak) = inner.idle.pop_front() {
            if let Some(ctx) = weak.upgrade() {
                return Some(ctx);
            }
        }
        None
    }

    /// Number of idle-listed workers (including entries whose worker died)
    pub fn idle_len(&self) -> usize {
        self.inner.read().unwrap().idle.len()
    }

    // =========================================================================
    // Ownership handover
    // =========================================================================

    /// Flip a context back to dispatcher ownership.
    ///
    /// Called when the worker reports idle: from here until the next
    /// `RunWithMsg`, only the dispatcher may touch the context's queues.
    pub fn mark_dispatcher_owned(&self, ctx: &WorkerContext) {
        ctx.set_ownership(Ownership::Dispatcher);
    }

    /// Route one message to its destination context.
    ///
    /// Unknown and unsupported destinations are logged and dropped - the
    /// sender is never notified (fire-and-forget). Messages for a context
    /// whose worker currently owns it are parked in the cache queue and the
    /// context joins the pending-wakeup list exactly once.
    pub fn dispatch_worker_msg(&self, msg: Msg) {
        let entry = self.get_by_name(msg.destination().as_str());
        let Some(entry) = entry else {
            error!(
                destination = %msg.destination(),
                source = %msg.source(),
                "unknown destination, dropping message"
            );
            metrics::record_message_dropped();
            return;
        };

        let ctx = match entry {
            EventRef::Conn(conn) => {
                conn.deliver_reply(msg);
                return;
            }
            EventRef::Worker(ctx) => ctx,
        };

        if !ctx.kind().accepts_routed_msgs() {
            warn!(
                destination = %msg.destination(),
                kind = ctx.kind().as_str(),
                "destination does not accept routed messages, dropping"
            );
            metrics::record_message_dropped();
            return;
        }

        ctx.cache_push(msg);
        let cached = ctx.cache_len();
        if cached > self.cache_pending_warn {
            warn!(ctx = %ctx, pending = cached, "messages piling up unprocessed");
        }

        if ctx.enter_wait_queue() {
            let mut inner = self.inner.write().unwrap();
            inner.wakeup.push_back(Arc::downgrade(&ctx));
        } else {
            debug!(ctx = %ctx, "already pending wakeup");
        }
    }

    /// Hand cached message batches to every dispatcher-owned pending context.
    ///
    /// For each pending entry: a context still owned by its worker is left for
    /// the next pass; otherwise the cache moves into the inbound mailbox, the
    /// ownership flag flips to the worker, the membership flag clears, and the
    /// worker is signalled `RunWithMsg`. This is the single point where a
    /// batch crosses from dispatcher-owned to worker-owned state.
    pub fn wakeup_workers(&self) {
        let mut inner = self.inner.write().unwrap();
        let pending = std::mem::take(&mut inner.wakeup);

        for weak in pending {
            let Some(ctx) = weak.upgrade() else {
                // Worker shut down with messages still cached; drop with it.
                continue;
            };

            if ctx.ownership() == Ownership::Worker {
                inner.wakeup.push_back(weak);
                continue;
            }

            let cache = ctx.take_cache();
            ctx.mailbox().push_inbound_batch(cache);
            ctx.set_ownership(Ownership::Worker);
            ctx.leave_wait_queue();
            metrics::record_worker_wakeup();
            debug!(ctx = %ctx, "notify worker to process messages");
            if ctx.cmd().send_to_owner(Cmd::RunWithMsg).is_err() {
                error!(ctx = %ctx, "worker command channel closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use selkie_core::Address;
    use std::time::Duration;

    fn manager() -> WorkerContextManager {
        WorkerContextManager::new(1000)
    }

    fn user_ctx(name: &str) -> Arc<WorkerContext> {
        Arc::new(WorkerContext::new(
            Address::new(name).unwrap(),
            WorkerKind::UserActor,
        ))
    }

    fn pool_ctx(n: usize) -> Arc<WorkerContext> {
        Arc::new(WorkerContext::new(
            Address::pool_worker(n),
            WorkerKind::Common,
        ))
    }

    fn msg_to(name: &str, payload: &str) -> Msg {
        let mut msg = Msg::text(payload);
        msg.set_source(Address::new("actor.src.1").unwrap());
        msg.set_destination(Address::new(name).unwrap());
        msg
    }

    #[test]
    fn test_add_counts_live_workers() {
        let mgr = manager();
        assert_eq!(mgr.live_worker_count(), 0);

        let user = user_ctx("actor.a.1");
        let pool = pool_ctx(0);
        let timer = Arc::new(WorkerContext::new(Address::timer(), WorkerKind::Timer));

        mgr.add(user).unwrap();
        mgr.add(pool).unwrap();
        let timer_handle = mgr.add(timer).unwrap();

        // Timer workers do not count toward the termination condition.
        assert_eq!(mgr.live_worker_count(), 2);

        mgr.remove(timer_handle);
        assert_eq!(mgr.live_worker_count(), 2);
    }

    #[test]
    fn test_add_twice_rejected() {
        let mgr = manager();
        let ctx = user_ctx("actor.a.1");
        mgr.add(ctx.clone()).unwrap();
        assert!(mgr.add(ctx).is_err());
        assert_eq!(mgr.live_worker_count(), 1);
    }

    #[test]
    fn test_dispatch_unknown_destination_drops() {
        let mgr = manager();
        mgr.add(user_ctx("actor.a.1")).unwrap();

        mgr.dispatch_worker_msg(msg_to("ghost.actor", "hello"));

        // Nothing cached anywhere, live count unaffected.
        assert_eq!(mgr.live_worker_count(), 1);
        let EventRef::Worker(ctx) = mgr.get_by_name("actor.a.1").unwrap() else {
            panic!("expected worker");
        };
        assert_eq!(ctx.cache_len(), 0);
    }

    #[test]
    fn test_dispatch_to_pool_worker_rejected() {
        let mgr = manager();
        let pool = pool_ctx(0);
        mgr.add(pool.clone()).unwrap();

        mgr.dispatch_worker_msg(msg_to("worker.pool.0", "hello"));
        assert_eq!(pool.cache_len(), 0);
        assert!(!pool.in_wait_queue());
    }

    #[test]
    fn test_dispatch_is_idempotent_on_wakeup_membership() {
        let mgr = manager();
        let ctx = user_ctx("actor.a.1");
        mgr.add(ctx.clone()).unwrap();
        mgr.mark_dispatcher_owned(&ctx);

        mgr.dispatch_worker_msg(msg_to("actor.a.1", "m1"));
        mgr.dispatch_worker_msg(msg_to("actor.a.1", "m2"));
        mgr.dispatch_worker_msg(msg_to("actor.a.1", "m3"));

        mgr.wakeup_workers();

        // Exactly one wakeup command despite three dispatches.
        assert_eq!(ctx.cmd().owner_recv().unwrap(), Cmd::RunWithMsg);
        assert!(ctx.cmd().owner_recv_timeout(Duration::from_millis(20)).is_none());

        // All three messages arrived in original order; membership cleared.
        assert_eq!(ctx.mailbox().inbound_len(), 3);
        assert_eq!(ctx.mailbox().pop_inbound().unwrap().payload_str(), Some("m1"));
        assert_eq!(ctx.mailbox().pop_inbound().unwrap().payload_str(), Some("m2"));
        assert_eq!(ctx.mailbox().pop_inbound().unwrap().payload_str(), Some("m3"));
        assert!(!ctx.in_wait_queue());
        assert_eq!(ctx.cache_len(), 0);
    }

    #[test]
    fn test_wakeup_skips_worker_owned_context() {
        let mgr = manager();
        let ctx = user_ctx("actor.a.1");
        mgr.add(ctx.clone()).unwrap();
        // Fresh contexts are worker-owned until the first idle notification.
        assert_eq!(ctx.ownership(), Ownership::Worker);

        mgr.dispatch_worker_msg(msg_to("actor.a.1", "m1"));
        mgr.wakeup_workers();

        // Handover deferred: no command, message still cached.
        assert!(ctx.cmd().owner_recv_timeout(Duration::from_millis(20)).is_none());
        assert_eq!(ctx.cache_len(), 1);
        assert!(ctx.in_wait_queue());

        // After the worker goes idle, the next pass delivers.
        mgr.mark_dispatcher_owned(&ctx);
        mgr.wakeup_workers();
        assert_eq!(ctx.cmd().owner_recv().unwrap(), Cmd::RunWithMsg);
        assert_eq!(ctx.mailbox().inbound_len(), 1);
        assert_eq!(ctx.ownership(), Ownership::Worker);
    }

    #[test]
    fn test_idle_fifo_order_and_duplicate_noop() {
        let mgr = manager();
        let w0 = pool_ctx(0);
        let w1 = pool_ctx(1);
        mgr.add(w0.clone()).unwrap();
        mgr.add(w1.clone()).unwrap();

        mgr.push_back_idle(&w0);
        mgr.push_back_idle(&w1);
        mgr.push_back_idle(&w0); // duplicate: logged no-op
        assert_eq!(mgr.idle_len(), 2);

        assert!(Arc::ptr_eq(&mgr.front_idle().unwrap(), &w0));
        assert!(Arc::ptr_eq(&mgr.pop_front_idle().unwrap(), &w0));
        assert!(Arc::ptr_eq(&mgr.pop_front_idle().unwrap(), &w1));
        assert!(mgr.pop_front_idle().is_none());
    }

    #[test]
    fn test_dead_worker_skipped_in_idle_list() {
        let mgr = manager();
        let w0 = pool_ctx(0);
        mgr.add(w0.clone()).unwrap();
        mgr.push_back_idle(&w0);

        let handle = w0.handle().unwrap();
        mgr.remove(handle);
        drop(w0);

        assert!(mgr.pop_front_idle().is_none());
    }

    /// Full ownership-handover protocol against a real worker thread:
    /// randomized batch sizes, no message lost, none duplicated, FIFO order.
    #[test]
    fn test_no_lost_or_duplicated_messages_under_concurrency() {
        use std::sync::Mutex;
        use std::thread;

        let mgr = Arc::new(manager());
        let ctx = user_ctx("actor.sink.1");
        mgr.add(ctx.clone()).unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let worker = {
            let ctx = ctx.clone();
            let received = received.clone();
            thread::spawn(move || loop {
                ctx.cmd().send_to_main(Cmd::Idle).unwrap();
                match ctx.cmd().owner_recv() {
                    Ok(Cmd::RunWithMsg) => {
                        while let Some(msg) = ctx.mailbox().pop_inbound() {
                            received
                                .lock()
                                .unwrap()
                                .push(msg.payload_str().unwrap().to_string());
                        }
                    }
                    _ => break,
                }
            })
        };

        const TOTAL: usize = 500;
        let mut sent = 0usize;
        let mut spins = 0usize;
        while received.lock().unwrap().len() < TOTAL {
            // Dispatcher duties: consume idle notifications, flip ownership.
            while let Some(cmd) = ctx.cmd().main_try_recv() {
                if cmd == Cmd::Idle {
                    mgr.mark_dispatcher_owned(&ctx);
                }
            }
            // Route a burst whose size varies with progress.
            let burst = 1 + (sent * 7 + spins) % 5;
            for _ in 0..burst {
                if sent == TOTAL {
                    break;
                }
                mgr.dispatch_worker_msg(msg_to("actor.sink.1", &format!("m{}", sent)));
                sent += 1;
            }
            mgr.wakeup_workers();
            spins += 1;
            assert!(spins < 1_000_000, "protocol stalled");
            thread::yield_now();
        }

        ctx.cmd().send_to_owner(Cmd::Quit).unwrap();
        worker.join().unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received.len(), TOTAL);
        for (i, payload) in received.iter().enumerate() {
            assert_eq!(payload, &format!("m{}", i));
        }
    }
}
