//! Timer worker
//!
//! A dedicated `Timer`-kind context whose thread keeps a deadline heap. On
//! expiry it synthesizes a `Timer`-kind message addressed to the requesting
//! actor, carrying the timer's name in the descriptor, pushes it on its own
//! outbound mailbox, and signals the dispatcher - delivery then follows the
//! ordinary outbound routing path. Timer contexts never accept routed
//! messages and do not count toward the live-worker total.

use crate::cmd::Cmd;
use crate::context::WorkerContext;
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use selkie_core::{metrics, Address, Error, Msg, Result};
use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::info;

/// A pending timer registration
#[derive(Debug)]
struct TimerRequest {
    actor: Address,
    timer_name: String,
    deadline: Instant,
}

#[derive(Debug)]
struct TimerEntry {
    deadline: Instant,
    /// Registration order, so simultaneous deadlines fire in request order
    seq: u64,
    actor: Address,
    timer_name: String,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.seq.cmp(&other.seq))
    }
}

/// Cloneable handle for registering timers from any thread
#[derive(Clone)]
pub struct TimerHandle {
    tx: Sender<TimerRequest>,
}

impl TimerHandle {
    /// Register a timer: after `delay`, `actor` receives a `Timer`-kind
    /// message whose descriptor is `timer_name`.
    pub fn set_timeout(
        &self,
        actor: Address,
        timer_name: impl Into<String>,
        delay: Duration,
    ) -> Result<()> {
        self.tx
            .send(TimerRequest {
                actor,
                timer_name: timer_name.into(),
                deadline: Instant::now() + delay,
            })
            .map_err(|_| Error::ChannelClosed {
                address: selkie_core::TIMER_ADDRESS.to_string(),
            })
    }
}

/// Start the timer thread for the given `Timer`-kind context.
///
/// Returns the registration handle and the thread's join handle. The thread
/// exits on `Quit` (or when every registration handle is dropped).
pub fn spawn_timer(ctx: Arc<WorkerContext>, tick: Duration) -> Result<(TimerHandle, JoinHandle<()>)> {
    debug_assert_eq!(ctx.kind(), crate::context::WorkerKind::Timer);
    let (tx, rx) = unbounded();
    let join = std::thread::Builder::new()
        .name(ctx.addr().as_str().to_string())
        .spawn(move || timer_loop(&ctx, &rx, tick))
        .map_err(|e| Error::Internal {
            message: format!("failed to spawn timer thread: {}", e),
        })?;
    Ok((TimerHandle { tx }, join))
}

fn timer_loop(ctx: &Arc<WorkerContext>, requests: &Receiver<TimerRequest>, tick: Duration) {
    info!(ctx = %ctx, "timer worker init");
    let quit = ctx.cmd().owner_receiver();
    let mut heap: BinaryHeap<Reverse<TimerEntry>> = BinaryHeap::new();
    let mut seq: u64 = 0;

    loop {
        let now = Instant::now();
        let timeout = heap
            .peek()
            .map(|Reverse(e)| e.deadline.saturating_duration_since(now))
            .unwrap_or(tick)
            .min(tick);

        select! {
            recv(requests) -> req => match req {
                Ok(req) => {
                    heap.push(Reverse(TimerEntry {
                        deadline: req.deadline,
                        seq,
                        actor: req.actor,
                        timer_name: req.timer_name,
                    }));
                    seq += 1;
                }
                Err(_) => break,
            },
            recv(quit) -> cmd => match cmd {
                Ok(Cmd::Quit) | Err(_) => break,
                Ok(_) => {}
            },
            default(timeout) => {}
        }

        let now = Instant::now();
        let mut fired = false;
        while heap
            .peek()
            .map(|Reverse(e)| e.deadline <= now)
            .unwrap_or(false)
        {
            let Reverse(entry) = heap.pop().unwrap();
            let mut msg = Msg::timer(entry.timer_name);
            msg.set_source(ctx.addr().clone());
            msg.set_destination(entry.actor);
            ctx.mailbox().push_outbound(msg);
            metrics::record_timer_fired();
            fired = true;
        }
        if fired && ctx.cmd().send_to_main(Cmd::Idle).is_err() {
            break;
        }
    }
    info!(ctx = %ctx, "timer worker exit");
}
