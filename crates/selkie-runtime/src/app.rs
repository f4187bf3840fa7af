//! The dispatcher
//!
//! One explicit object constructed at process start (no ambient global) that
//! owns the poller, the context manager, the connection-event pool, the timer
//! worker, and the module registry. `exec` runs the dispatch loop: assign
//! backlog to idle pool workers, wait on the reactor, drain ready sources,
//! hand message batches over to their workers. The loop exits when the last
//! live worker unregisters.

use crate::cmd::Cmd;
use crate::context::{Ownership, WorkerContext, WorkerKind};
use crate::event_conn::{EventConn, EventConnManager};
use crate::manager::WorkerContextManager;
use crate::poller::Poller;
use crate::registry::{EventRef, Handle};
use crate::timer::{spawn_timer, TimerHandle};
use crate::worker::{spawn_pool_worker, spawn_user_actor, WorkerOps};
use selkie_core::{
    metrics, ActorContext, ActorModule, Address, Error, ModuleRegistry, Msg, Result,
    RuntimeConfig, SpawnRequest, StopRequest, SYS_OP_SHUTDOWN, SYS_OP_SPAWN, SYS_OP_STOP,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

// =============================================================================
// AppBuilder
// =============================================================================

/// Builder for [`App`]
pub struct AppBuilder {
    config: RuntimeConfig,
    modules: Arc<ModuleRegistry>,
}

impl AppBuilder {
    /// Start from the default configuration
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            modules: Arc::new(ModuleRegistry::new()),
        }
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the pooled worker count
    pub fn worker_pool_size(mut self, size: usize) -> Self {
        self.config.worker_pool_size = size;
        self
    }

    /// Register an actor module
    pub fn register_module(self, name: impl Into<String>, module: Arc<dyn ActorModule>) -> Self {
        self.modules.register(name, module);
        self
    }

    /// Register an actor module from a constructor closure
    pub fn register_module_fn<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&str) -> Box<dyn selkie_core::Actor> + Send + Sync + 'static,
    {
        self.modules.register_fn(name, f);
        self
    }

    /// Validate the configuration and start the runtime scaffolding: the
    /// reactor, the timer worker, the connection pool, and the worker pool.
    pub fn build(self) -> Result<App> {
        self.config.validate()?;

        let manager = Arc::new(WorkerContextManager::new(self.config.cache_pending_warn));
        let poller = Arc::new(Poller::new());

        // Timer worker: registered and polled, but outside the live count.
        let timer_ctx = Arc::new(WorkerContext::new(Address::timer(), WorkerKind::Timer));
        let timer_handle_id = manager.add(timer_ctx.clone())?;
        poller.add(timer_handle_id, timer_ctx.cmd().main_receiver());
        let (timer, timer_join) = spawn_timer(
            timer_ctx.clone(),
            Duration::from_millis(self.config.timer_tick_ms),
        )?;

        let conn_mgr = Arc::new(EventConnManager::new(manager.clone(), poller.clone()));
        conn_mgr.init(self.config.event_conn_pool_size);

        let app = App {
            manager,
            poller,
            conn_mgr,
            timer,
            timer_ctx,
            timer_join: Mutex::new(Some(timer_join)),
            modules: self.modules,
            backlog: Mutex::new(VecDeque::new()),
            joins: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            poll_timeout: Duration::from_millis(self.config.poll_timeout_ms),
            config: self.config,
        };

        for index in 0..app.config.worker_pool_size {
            let ctx = Arc::new(WorkerContext::new(
                Address::pool_worker(index),
                WorkerKind::Common,
            ));
            let handle = app.manager.add(ctx.clone())?;
            app.poller.add(handle, ctx.cmd().main_receiver());
            let join = spawn_pool_worker(ctx)?;
            app.joins.lock().unwrap().push((handle, join));
        }

        info!(
            pool_workers = app.config.worker_pool_size,
            conn_pool = app.config.event_conn_pool_size,
            "runtime built"
        );
        Ok(app)
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// App
// =============================================================================

/// The dispatcher and its owned runtime services
pub struct App {
    config: RuntimeConfig,
    manager: Arc<WorkerContextManager>,
    poller: Arc<Poller>,
    conn_mgr: Arc<EventConnManager>,
    timer: TimerHandle,
    timer_ctx: Arc<WorkerContext>,
    timer_join: Mutex<Option<JoinHandle<()>>>,
    modules: Arc<ModuleRegistry>,
    /// System-destined jobs awaiting an idle pool worker
    backlog: Mutex<VecDeque<Msg>>,
    joins: Mutex<Vec<(Handle, JoinHandle<()>)>>,
    running: AtomicBool,
    poll_timeout: Duration,
}

impl App {
    /// Start building an app
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    /// The runtime configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The module registry
    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    /// Spawn an actor from a registered module.
    ///
    /// Runs `Actor::init` on the calling thread; a failure aborts the spawn
    /// and unregisters the context. Messages sent during init are flushed as
    /// soon as the new worker reports idle.
    pub fn spawn(&self, module: &str, instance: &str, param: &str) -> Result<Address> {
        let mut actor = self.modules.create(module, instance)?;
        let addr = Address::actor(module, instance)?;

        let ctx = Arc::new(WorkerContext::new(addr.clone(), WorkerKind::UserActor));
        let handle = self.manager.add(ctx.clone())?;

        let actor_ctx = ActorContext::new(Arc::new(WorkerOps {
            ctx: ctx.clone(),
            timer: self.timer.clone(),
        }));

        if let Err(e) = actor.init(&actor_ctx, param) {
            self.manager.remove(handle);
            return Err(Error::ActorInitFailed {
                address: addr.as_str().to_string(),
                reason: e.to_string(),
            });
        }

        self.poller.add(handle, ctx.cmd().main_receiver());
        match spawn_user_actor(ctx, actor, actor_ctx) {
            Ok(join) => {
                self.joins.lock().unwrap().push((handle, join));
                info!(actor = %addr, %handle, "actor spawned");
                Ok(addr)
            }
            Err(e) => {
                self.poller.del(handle);
                self.manager.remove(handle);
                Err(e)
            }
        }
    }

    /// Run the dispatch loop until the last live worker unregisters
    pub fn exec(&self) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyStarted);
        }

        info!(
            live_workers = self.manager.live_worker_count(),
            "dispatcher running"
        );

        while self.manager.live_worker_count() > 0 {
            self.assign_backlog();
            let ready = self.poller.wait(self.poll_timeout);
            for handle in ready {
                self.process_event(handle);
            }
            self.manager.wakeup_workers();
        }

        self.shutdown();
        info!("dispatcher stopped");
        Ok(())
    }

    /// Ask every live worker to stop; `exec` returns once they have.
    pub fn quit(&self) {
        info!("stopping all workers");
        for ctx in self.manager.workers() {
            if ctx.kind() == WorkerKind::Timer {
                continue;
            }
            let _ = ctx.cmd().send_to_owner(Cmd::Quit);
        }
    }

    /// Allocate a connection event for request/response calls from outside
    /// the actor graph
    pub fn connection(&self) -> Result<Arc<EventConn>> {
        self.conn_mgr.alloc()
    }

    /// Return a connection event to the pool
    pub fn release_connection(&self, conn: Arc<EventConn>) {
        self.conn_mgr.release(conn);
    }

    /// Addresses and kinds of every registered worker context
    pub fn stats(&self) -> Vec<(Address, WorkerKind)> {
        self.manager
            .workers()
            .iter()
            .map(|ctx| (ctx.addr().clone(), ctx.kind()))
            .collect()
    }

    // =========================================================================
    // Dispatch loop internals
    // =========================================================================

    /// Step (a): hand the system backlog to the front idle pool worker
    fn assign_backlog(&self) {
        while !self.backlog.lock().unwrap().is_empty() {
            let Some(ctx) = self.manager.front_idle() else {
                return;
            };
            self.manager.pop_front_idle();
            self.assign_batch(&ctx);
        }
    }

    /// Move the whole backlog into `ctx`'s mailbox and hand ownership over
    fn assign_batch(&self, ctx: &Arc<WorkerContext>) {
        let batch: Vec<Msg> = self.backlog.lock().unwrap().drain(..).collect();
        if batch.is_empty() {
            self.manager.push_back_idle(ctx);
            return;
        }
        debug!(ctx = %ctx, jobs = batch.len(), "assigning backlog");
        ctx.mailbox().push_inbound_batch(batch);
        ctx.set_ownership(Ownership::Worker);
        metrics::record_worker_wakeup();
        if ctx.cmd().send_to_owner(Cmd::RunWithMsg).is_err() {
            error!(ctx = %ctx, "worker command channel closed");
        }
    }

    /// Step (c): drain one ready source
    fn process_event(&self, handle: Handle) {
        match self.manager.get(handle) {
            None => {
                // The source unregistered between the wait and this drain.
                debug!(%handle, "readiness for unregistered source");
            }
            Some(EventRef::Worker(ctx)) => {
                while let Some(cmd) = ctx.cmd().main_try_recv() {
                    match cmd {
                        Cmd::Idle => self.on_worker_idle(&ctx),
                        Cmd::Quit => {
                            self.on_worker_quit(&ctx);
                            break;
                        }
                        Cmd::RunWithMsg => {
                            warn!(ctx = %ctx, "unexpected command from worker");
                        }
                    }
                }
            }
            Some(EventRef::Conn(conn)) => {
                while conn.cmd().main_try_recv().is_some() {}
                for msg in conn.mailbox().drain_outbound() {
                    self.route(msg);
                }
            }
        }
    }

    /// A worker finished a batch: route what it produced, take ownership
    /// back, and re-idle or reassign it.
    fn on_worker_idle(&self, ctx: &Arc<WorkerContext>) {
        for msg in ctx.mailbox().drain_outbound() {
            self.route(msg);
        }
        match ctx.kind() {
            // The timer only ever signals to flush its outbound queue.
            WorkerKind::Timer => {}
            WorkerKind::UserActor => {
                self.manager.mark_dispatcher_owned(ctx);
            }
            WorkerKind::Common => {
                self.manager.mark_dispatcher_owned(ctx);
                if self.backlog.lock().unwrap().is_empty() {
                    self.manager.push_back_idle(ctx);
                } else {
                    self.assign_batch(ctx);
                }
            }
        }
    }

    /// A worker acknowledged `Quit`: deliver its last sends and unregister.
    fn on_worker_quit(&self, ctx: &Arc<WorkerContext>) {
        for msg in ctx.mailbox().drain_outbound() {
            self.route(msg);
        }
        let Some(handle) = ctx.handle() else {
            return;
        };
        self.poller.del(handle);
        self.manager.remove(handle);
        let join = {
            let mut joins = self.joins.lock().unwrap();
            joins
                .iter()
                .position(|(h, _)| *h == handle)
                .map(|i| joins.remove(i).1)
        };
        if let Some(join) = join {
            let _ = join.join();
        }
        info!(ctx = %ctx, "worker unregistered");
    }

    /// Route one message: system destination to the dispatcher, everything
    /// else through the context manager.
    fn route(&self, msg: Msg) {
        metrics::record_message_routed();
        if msg.destination().is_system() {
            self.handle_system_msg(msg);
        } else {
            self.manager.dispatch_worker_msg(msg);
        }
    }

    /// Control operations execute synchronously on the dispatcher thread;
    /// other system-destined messages join the pool backlog.
    fn handle_system_msg(&self, msg: Msg) {
        match msg.desc() {
            SYS_OP_SPAWN => match msg.payload().value::<SpawnRequest>() {
                Some(req) => {
                    if let Err(e) = self.spawn(&req.module, &req.instance, &req.param) {
                        error!(
                            module = %req.module,
                            instance = %req.instance,
                            error = %e,
                            "spawn request failed"
                        );
                    }
                }
                None => warn!(source = %msg.source(), "malformed spawn request"),
            },
            SYS_OP_STOP => match msg.payload().value::<StopRequest>() {
                Some(req) => self.stop_worker(&req.address),
                None => warn!(source = %msg.source(), "malformed stop request"),
            },
            SYS_OP_SHUTDOWN => {
                info!(source = %msg.source(), "shutdown requested");
                self.quit();
            }
            _ => {
                debug!(desc = msg.desc(), "queueing system job for worker pool");
                self.backlog.lock().unwrap().push_back(msg);
            }
        }
    }

    /// Send `Quit` to the worker at `address`
    fn stop_worker(&self, address: &Address) {
        match self.manager.get_by_name(address.as_str()) {
            Some(EventRef::Worker(ctx)) => {
                info!(ctx = %ctx, "stopping worker");
                if ctx.cmd().send_to_owner(Cmd::Quit).is_err() {
                    error!(ctx = %ctx, "worker command channel closed");
                }
            }
            _ => warn!(%address, "stop requested for unknown worker"),
        }
    }

    /// Release dispatch resources once the loop has exited
    fn shutdown(&self) {
        let _ = self.timer_ctx.cmd().send_to_owner(Cmd::Quit);
        if let Some(join) = self.timer_join.lock().unwrap().take() {
            let _ = join.join();
        }
        if let Some(handle) = self.timer_ctx.handle() {
            self.poller.del(handle);
            self.manager.remove(handle);
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.quit();
        let _ = self.timer_ctx.cmd().send_to_owner(Cmd::Quit);
        for (_, join) in self.joins.lock().unwrap().drain(..) {
            let _ = join.join();
        }
        if let Some(join) = self.timer_join.lock().unwrap().take() {
            let _ = join.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use selkie_core::Actor;

    struct NullActor;

    impl Actor for NullActor {
        fn proc(&mut self, _ctx: &ActorContext, _msg: Msg) {}
    }

    struct FailingInit;

    impl Actor for FailingInit {
        fn init(&mut self, _ctx: &ActorContext, _param: &str) -> Result<()> {
            Err(Error::Internal {
                message: "nope".into(),
            })
        }

        fn proc(&mut self, _ctx: &ActorContext, _msg: Msg) {}
    }

    fn builder() -> AppBuilder {
        App::builder()
            .worker_pool_size(1)
            .register_module_fn("null", |_| Box::new(NullActor))
            .register_module_fn("failing", |_| Box::new(FailingInit))
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = App::builder().worker_pool_size(0).build();
        assert!(matches!(
            result.err(),
            Some(Error::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_spawn_unknown_module_fails() {
        let app = builder().build().unwrap();
        let err = app.spawn("ghost", "1", "").unwrap_err();
        assert!(matches!(err, Error::ModuleNotFound { .. }));
        app.quit();
    }

    #[test]
    fn test_spawn_duplicate_instance_fails() {
        let app = builder().build().unwrap();
        app.spawn("null", "1", "").unwrap();
        let err = app.spawn("null", "1", "").unwrap_err();
        assert!(matches!(err, Error::DuplicateRegistration { .. }));
        app.quit();
    }

    #[test]
    fn test_failed_init_unregisters_context() {
        let app = builder().build().unwrap();
        let before = app.manager.live_worker_count();
        let err = app.spawn("failing", "1", "").unwrap_err();
        assert!(matches!(err, Error::ActorInitFailed { .. }));
        assert_eq!(app.manager.live_worker_count(), before);
        assert!(app.manager.get_by_name("actor.failing.1").is_none());
        app.quit();
    }

    #[test]
    fn test_stats_lists_pool_and_timer() {
        let app = builder().build().unwrap();
        let stats = app.stats();
        assert!(stats
            .iter()
            .any(|(addr, kind)| *kind == WorkerKind::Common && addr.as_str() == "worker.pool.0"));
        assert!(stats
            .iter()
            .any(|(addr, kind)| *kind == WorkerKind::Timer && *addr == Address::timer()));
        app.quit();
    }

    #[test]
    fn test_exec_twice_rejected() {
        let app = Arc::new(builder().build().unwrap());
        app.running.store(true, Ordering::Release);
        assert!(matches!(app.exec(), Err(Error::AlreadyStarted)));
        app.quit();
    }
}
