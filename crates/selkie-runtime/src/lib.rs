//! Selkie Runtime
//!
//! Scheduler and dispatcher core for the Selkie actor runtime.
//!
//! # Overview
//!
//! One dispatcher thread multiplexes N worker OS threads over a reactor:
//!
//! - [`Mailbox`] - per-context inbound/outbound FIFO queues
//! - [`CmdChannel`] - the cross-thread wake primitive between dispatcher and
//!   workers (`RunWithMsg` / `Idle` / `Quit`)
//! - [`Poller`] - level-triggered readiness multiplexer over command channels
//! - [`HandleRegistry`] - generation-checked arena mapping handles and names
//!   to contexts
//! - [`WorkerContextManager`] - registration, message routing, idle tracking,
//!   and the ownership-handover protocol
//! - [`EventConnManager`] - pooled request/response bridge for callers outside
//!   the actor graph
//! - [`App`] - the dispatcher loop tying it all together
//!
//! # Ownership discipline
//!
//! A context's queues are mutated by exactly one side at a time: the worker
//! between `RunWithMsg` and its next `Idle`, the dispatcher the rest of the
//! time. Routed messages for a worker-owned context park in its cache queue
//! until the ownership flag flips back - that flip, under the manager lock,
//! is the single synchronization point of the whole scheduler.

pub mod app;
pub mod cmd;
pub mod context;
pub mod event_conn;
pub mod mailbox;
pub mod manager;
pub mod poller;
pub mod registry;
pub mod timer;
pub(crate) mod worker;

pub use app::{App, AppBuilder};
pub use cmd::{Cmd, CmdChannel};
pub use context::{Ownership, WorkerContext, WorkerKind};
pub use event_conn::{ConnType, EventConn, EventConnManager};
pub use mailbox::Mailbox;
pub use manager::WorkerContextManager;
pub use poller::Poller;
pub use registry::{EventRef, Handle, HandleRegistry};
pub use timer::{spawn_timer, TimerHandle};
