//! Worker thread loops
//!
//! Every context kind shares the same command protocol: signal `Idle`, block
//! on the command channel, process the inbound batch on `RunWithMsg`, repeat;
//! acknowledge `Quit` on the way out. A worker touches its queues only
//! between receiving `RunWithMsg` and sending the following `Idle` - the
//! dispatcher owns them the rest of the time.

use crate::cmd::Cmd;
use crate::context::WorkerContext;
use crate::timer::TimerHandle;
use selkie_core::{metrics, Actor, ActorContext, Address, ContextOps, Error, Msg, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};

// =============================================================================
// Context operations backing ActorContext
// =============================================================================

/// Runtime operations bound to one worker context
pub(crate) struct WorkerOps {
    pub(crate) ctx: Arc<WorkerContext>,
    pub(crate) timer: TimerHandle,
}

impl ContextOps for WorkerOps {
    fn address(&self) -> &Address {
        self.ctx.addr()
    }

    fn post(&self, msg: Msg) {
        self.ctx.mailbox().push_outbound(msg);
    }

    fn set_timeout(&self, timer_name: &str, delay: Duration) -> Result<()> {
        self.timer
            .set_timeout(self.ctx.addr().clone(), timer_name, delay)
    }
}

// =============================================================================
// Shared loop shell
// =============================================================================

fn run_loop(ctx: &Arc<WorkerContext>, mut handle_msg: impl FnMut(Msg)) {
    loop {
        if ctx.cmd().send_to_main(Cmd::Idle).is_err() {
            break;
        }
        match ctx.cmd().owner_recv() {
            Ok(Cmd::RunWithMsg) => {
                while let Some(msg) = ctx.mailbox().pop_inbound() {
                    handle_msg(msg);
                }
                metrics::record_batch_completed();
            }
            Ok(Cmd::Quit) | Err(_) => break,
            Ok(Cmd::Idle) => {
                warn!(ctx = %ctx, "unexpected idle command on owner side");
            }
        }
    }
    let _ = ctx.cmd().send_to_main(Cmd::Quit);
}

// =============================================================================
// User actor worker
// =============================================================================

/// Spawn the dedicated thread hosting one user actor.
///
/// `Actor::init` has already run on the spawning thread; messages it sent sit
/// on the outbound queue and are flushed when the first `Idle` is processed.
pub(crate) fn spawn_user_actor(
    ctx: Arc<WorkerContext>,
    actor: Box<dyn Actor>,
    actor_ctx: ActorContext,
) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(ctx.addr().as_str().to_string())
        .spawn(move || {
            info!(ctx = %ctx, "worker init");
            let mut actor = actor;
            let loop_ctx = ctx.clone();
            run_loop(&loop_ctx, |msg| {
                let outcome = catch_unwind(AssertUnwindSafe(|| actor.proc(&actor_ctx, msg)));
                if outcome.is_err() {
                    error!(ctx = %ctx, "actor panicked while processing a message");
                }
            });
            info!(ctx = %ctx, "worker exit");
        })
        .map_err(|e| Error::Internal {
            message: format!("failed to spawn worker thread: {}", e),
        })
}

// =============================================================================
// Pooled worker
// =============================================================================

/// Spawn a pooled worker thread.
///
/// Pool workers have no bound actor; the dispatcher feeds them batches of
/// system-destined backlog. `ping` jobs are answered with a `pong` text
/// message to the requester; anything else is logged and dropped.
pub(crate) fn spawn_pool_worker(ctx: Arc<WorkerContext>) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(ctx.addr().as_str().to_string())
        .spawn(move || {
            info!(ctx = %ctx, "worker init");
            let loop_ctx = ctx.clone();
            run_loop(&loop_ctx, |msg| process_system_job(&ctx, msg));
            info!(ctx = %ctx, "worker exit");
        })
        .map_err(|e| Error::Internal {
            message: format!("failed to spawn worker thread: {}", e),
        })
}

fn process_system_job(ctx: &WorkerContext, msg: Msg) {
    if msg.desc() == selkie_core::SYS_OP_PING {
        let mut reply = Msg::text("pong").with_desc("pong");
        reply.set_source(ctx.addr().clone());
        reply.set_destination(msg.source().clone());
        ctx.mailbox().push_outbound(reply);
        return;
    }
    warn!(ctx = %ctx, %msg, desc = msg.desc(), "unknown system job, dropping");
    metrics::record_message_dropped();
}
