//! Connection events - request/response bridge into the mailbox system
//!
//! A connection event lets code outside the actor graph (typically a thread
//! blocked in a synchronous call) send messages and await replies. It mirrors
//! the worker wakeup protocol, scoped to one externally-facing object: the
//! caller signals the dispatcher through the command channel's main side, and
//! replies come back through `notify` plus an owner-side wake.

use crate::cmd::Cmd;
use crate::mailbox::Mailbox;
use crate::manager::WorkerContextManager;
use crate::poller::Poller;
use crate::registry::{EventRef, Handle};
use selkie_core::{metrics, Address, Error, Msg, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

// =============================================================================
// EventConn
// =============================================================================

/// What the connection is being used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnType {
    /// Fire-and-forget send; no reply expected
    Send,
    /// Request awaiting a reply
    SendRequest,
}

/// Pooled request/response bridge
pub struct EventConn {
    addr: Address,
    handle: Mutex<Option<Handle>>,
    conn_type: Mutex<ConnType>,
    mailbox: Mailbox,
    cmd: crate::cmd::CmdChannel,
}

impl EventConn {
    fn new(index: usize) -> Self {
        let addr = Address::event_conn(index);
        Self {
            mailbox: Mailbox::new(addr.clone()),
            addr,
            handle: Mutex::new(None),
            conn_type: Mutex::new(ConnType::SendRequest),
            cmd: crate::cmd::CmdChannel::new(),
        }
    }

    /// The connection's address
    pub fn addr(&self) -> &Address {
        &self.addr
    }

    /// The registry handle for the current allocation cycle
    pub fn handle(&self) -> Option<Handle> {
        *self.handle.lock().unwrap()
    }

    /// Record the handle for this allocation cycle
    pub fn set_handle(&self, handle: Handle) {
        *self.handle.lock().unwrap() = Some(handle);
    }

    fn clear_handle(&self) {
        *self.handle.lock().unwrap() = None;
    }

    /// Current usage mode
    pub fn conn_type(&self) -> ConnType {
        *self.conn_type.lock().unwrap()
    }

    /// The connection's mailbox
    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// The connection's command channel
    pub fn cmd(&self) -> &crate::cmd::CmdChannel {
        &self.cmd
    }

    /// Send a fire-and-forget message to `dst`
    pub fn send(&self, dst: Address, mut msg: Msg) -> Result<()> {
        if self.handle().is_none() {
            return Err(Error::Internal {
                message: format!("{} is not allocated", self.addr),
            });
        }
        *self.conn_type.lock().unwrap() = ConnType::Send;
        msg.set_source(self.addr.clone());
        msg.set_destination(dst);
        self.mailbox.push_outbound(msg);
        self.cmd.send_to_main(Cmd::Idle)
    }

    /// Send a request to `dst` and block until the reply arrives
    pub fn send_request(&self, dst: Address, req: Msg) -> Result<Msg> {
        self.send_request_timeout(dst, req, None)
    }

    /// Send a request to `dst` and block up to `timeout` for the reply
    pub fn send_request_timeout(
        &self,
        dst: Address,
        mut req: Msg,
        timeout: Option<Duration>,
    ) -> Result<Msg> {
        if self.handle().is_none() {
            return Err(Error::Internal {
                message: format!("{} is not allocated", self.addr),
            });
        }
        *self.conn_type.lock().unwrap() = ConnType::SendRequest;
        req.set_source(self.addr.clone());
        req.set_destination(dst.clone());
        self.mailbox.push_outbound(req);
        self.cmd.send_to_main(Cmd::Idle)?;

        let woken = match timeout {
            Some(t) => self.cmd.owner_recv_timeout(t),
            None => self.cmd.owner_recv().ok(),
        };
        match woken {
            Some(Cmd::Idle) => self.mailbox.pop_inbound().ok_or_else(|| Error::RequestFailed {
                destination: dst.as_str().to_string(),
                reason: "woken without a reply".into(),
            }),
            Some(other) => Err(Error::RequestFailed {
                destination: dst.as_str().to_string(),
                reason: format!("unexpected command {:?}", other),
            }),
            None => Err(Error::RequestFailed {
                destination: dst.as_str().to_string(),
                reason: "timed out or channel closed".into(),
            }),
        }
    }

    /// Deliver a reply addressed to this connection (dispatcher side)
    pub fn deliver_reply(&self, msg: Msg) {
        if self.conn_type() == ConnType::Send {
            warn!(conn = %self.addr, "fire-and-forget connection, dropping reply");
            metrics::record_message_dropped();
            return;
        }
        self.mailbox.push_inbound(msg);
        metrics::record_conn_notify();
        if self.cmd.send_to_owner(Cmd::Idle).is_err() {
            error!(conn = %self.addr, "connection owner side closed");
        }
    }
}

// =============================================================================
// EventConnManager
// =============================================================================

/// Pool of reusable connection events
pub struct EventConnManager {
    manager: Arc<WorkerContextManager>,
    poller: Arc<Poller>,
    idle: Mutex<VecDeque<Arc<EventConn>>>,
    created: AtomicUsize,
}

impl EventConnManager {
    /// Create a manager backed by the given registry and poller
    pub fn new(manager: Arc<WorkerContextManager>, poller: Arc<Poller>) -> Self {
        info!("event connection manager created");
        Self {
            manager,
            poller,
            idle: Mutex::new(VecDeque::new()),
            created: AtomicUsize::new(0),
        }
    }

    /// Pre-create `pool_size` idle connections
    pub fn init(&self, pool_size: usize) {
        let mut idle = self.idle.lock().unwrap();
        for _ in 0..pool_size {
            let index = self.created.fetch_add(1, Ordering::AcqRel);
            idle.push_back(Arc::new(EventConn::new(index)));
        }
    }

    /// Take a connection from the pool (lazily creating one), register it,
    /// and attach it to the reactor.
    pub fn alloc(&self) -> Result<Arc<EventConn>> {
        let conn = {
            let mut idle = self.idle.lock().unwrap();
            match idle.pop_front() {
                Some(conn) => conn,
                None => {
                    let index = self.created.fetch_add(1, Ordering::AcqRel);
                    Arc::new(EventConn::new(index))
                }
            }
        };

        let handle = self.manager.add_conn(conn.clone())?;
        self.poller.add(handle, conn.cmd().main_receiver());
        debug!(conn = %conn.addr(), %handle, "connection allocated");
        Ok(conn)
    }

    /// Detach a connection from the reactor and return it to the pool
    pub fn release(&self, conn: Arc<EventConn>) {
        if let Some(handle) = conn.handle() {
            self.poller.del(handle);
            self.manager.remove(handle);
        }
        conn.clear_handle();
        // Leftover state must not leak into the next allocation cycle.
        while conn.mailbox().pop_inbound().is_some() {}
        conn.mailbox().drain_outbound();
        while conn.cmd().main_try_recv().is_some() {}
        let owner_rx = conn.cmd().owner_receiver();
        while owner_rx.try_recv().is_ok() {}
        self.idle.lock().unwrap().push_back(conn);
    }

    /// Push a reply into the connection identified by `handle` and wake its
    /// owner.
    pub fn notify(&self, handle: Handle, msg: Msg) {
        match self.manager.get(handle) {
            Some(EventRef::Conn(conn)) => conn.deliver_reply(msg),
            _ => error!(%handle, "no connection for handle, dropping reply"),
        }
    }

    /// Number of idle pooled connections
    pub fn idle_len(&self) -> usize {
        self.idle.lock().unwrap().len()
    }
}
