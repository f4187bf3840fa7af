//! Actor abstractions
//!
//! TigerStyle: Single-threaded execution guarantee per actor, explicit
//! lifecycle, message passing as the only communication channel.

use crate::address::Address;
use crate::constants::{SYS_OP_SHUTDOWN, SYS_OP_SPAWN, SYS_OP_STOP};
use crate::error::Result;
use crate::message::{Msg, Payload};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Actor Trait
// =============================================================================

/// Actor trait - implement to create actors
///
/// An actor is bound to exactly one worker context at a time and its callbacks
/// are never invoked concurrently. `proc` is called once per inbound message,
/// in delivery order.
pub trait Actor: Send {
    /// Called once after the actor is bound, before any message is delivered.
    ///
    /// Messages sent here are flushed as soon as the hosting worker reports
    /// idle for the first time. A failure aborts the spawn.
    fn init(&mut self, _ctx: &ActorContext, _param: &str) -> Result<()> {
        Ok(())
    }

    /// Handle one inbound message
    fn proc(&mut self, ctx: &ActorContext, msg: Msg);
}

impl std::fmt::Debug for dyn Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Actor")
    }
}

// =============================================================================
// Context Operations
// =============================================================================

/// Runtime operations available to an actor, implemented by the hosting
/// worker context.
pub trait ContextOps: Send + Sync {
    /// The address of the hosting context
    fn address(&self) -> &Address;

    /// Enqueue an already-stamped message on the outbound queue
    fn post(&self, msg: Msg);

    /// Register a named timer firing after `delay`
    fn set_timeout(&self, timer_name: &str, delay: Duration) -> Result<()>;
}

// =============================================================================
// ActorContext
// =============================================================================

/// Handle through which an actor talks to the runtime
///
/// All operations are reentrant: they only enqueue outbound messages or timer
/// registrations, never block, and never deliver inline.
#[derive(Clone)]
pub struct ActorContext {
    ops: Arc<dyn ContextOps>,
}

impl ActorContext {
    /// Create a context backed by the given operations
    pub fn new(ops: Arc<dyn ContextOps>) -> Self {
        Self { ops }
    }

    /// The actor's own address
    pub fn name(&self) -> &Address {
        self.ops.address()
    }

    /// Send a text payload to `dst`
    pub fn send(&self, dst: Address, payload: impl Into<Payload>) -> Result<()> {
        self.send_msg(dst, Msg::text(payload))
    }

    /// Send an arbitrary message to `dst`, stamping source and destination
    pub fn send_msg(&self, dst: Address, mut msg: Msg) -> Result<()> {
        msg.set_source(self.ops.address().clone());
        msg.set_destination(dst);
        self.ops.post(msg);
        Ok(())
    }

    /// Register a named timer; expiry is delivered as a `Timer`-kind message
    /// whose descriptor is `timer_name`.
    pub fn set_timeout(&self, timer_name: &str, delay: Duration) -> Result<()> {
        self.ops.set_timeout(timer_name, delay)
    }

    /// Ask the dispatcher to spawn another actor
    pub fn request_spawn(
        &self,
        module: impl Into<String>,
        instance: impl Into<String>,
        param: impl Into<String>,
    ) -> Result<()> {
        let req = SpawnRequest {
            module: module.into(),
            instance: instance.into(),
            param: param.into(),
        };
        self.send_msg(
            Address::system(),
            Msg::value(req).with_desc(SYS_OP_SPAWN),
        )
    }

    /// Ask the dispatcher to stop the actor at `address`
    pub fn request_stop(&self, address: Address) -> Result<()> {
        self.send_msg(
            Address::system(),
            Msg::value(StopRequest { address }).with_desc(SYS_OP_STOP),
        )
    }

    /// Ask the dispatcher to shut the whole runtime down
    pub fn request_shutdown(&self) -> Result<()> {
        self.send_msg(Address::system(), Msg::text("").with_desc(SYS_OP_SHUTDOWN))
    }
}

// =============================================================================
// Control Requests
// =============================================================================

/// Payload of a `sys.spawn` control message
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    /// Module to instantiate
    pub module: String,
    /// Instance name
    pub instance: String,
    /// Init parameter
    pub param: String,
}

/// Payload of a `sys.stop` control message
#[derive(Debug, Clone)]
pub struct StopRequest {
    /// Address of the context to stop
    pub address: Address,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingOps {
        addr: Address,
        posted: Mutex<Vec<Msg>>,
        timers: Mutex<Vec<(String, Duration)>>,
    }

    impl ContextOps for RecordingOps {
        fn address(&self) -> &Address {
            &self.addr
        }

        fn post(&self, msg: Msg) {
            self.posted.lock().unwrap().push(msg);
        }

        fn set_timeout(&self, timer_name: &str, delay: Duration) -> Result<()> {
            self.timers
                .lock()
                .unwrap()
                .push((timer_name.to_string(), delay));
            Ok(())
        }
    }

    fn recording_ctx() -> (ActorContext, Arc<RecordingOps>) {
        let ops = Arc::new(RecordingOps {
            addr: Address::new("actor.test.1").unwrap(),
            posted: Mutex::new(Vec::new()),
            timers: Mutex::new(Vec::new()),
        });
        (ActorContext::new(ops.clone()), ops)
    }

    #[test]
    fn test_send_stamps_source_and_destination() {
        let (ctx, ops) = recording_ctx();
        ctx.send(Address::new("actor.other.1").unwrap(), "hi")
            .unwrap();

        let posted = ops.posted.lock().unwrap();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].source(), &"actor.test.1");
        assert_eq!(posted[0].destination(), &"actor.other.1");
    }

    #[test]
    fn test_request_spawn_targets_system() {
        let (ctx, ops) = recording_ctx();
        ctx.request_spawn("example", "2", "").unwrap();

        let posted = ops.posted.lock().unwrap();
        assert!(posted[0].destination().is_system());
        assert_eq!(posted[0].desc(), SYS_OP_SPAWN);
        let req = posted[0].payload().value::<SpawnRequest>().unwrap();
        assert_eq!(req.module, "example");
        assert_eq!(req.instance, "2");
    }

    #[test]
    fn test_set_timeout_registers_timer() {
        let (ctx, ops) = recording_ctx();
        ctx.set_timeout("tick", Duration::from_millis(50)).unwrap();
        let timers = ops.timers.lock().unwrap();
        assert_eq!(timers[0], ("tick".to_string(), Duration::from_millis(50)));
    }
}
