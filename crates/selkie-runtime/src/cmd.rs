//! Command channel between the dispatcher and a worker or connection event
//!
//! A single-byte control protocol over two crossbeam channels: one direction
//! carries commands from the dispatcher to the owner (the worker thread or an
//! external caller), the other carries notifications back. The blocking
//! `owner_recv` is the only suspension point of a worker thread; the
//! dispatcher-side receiver is what the poller watches for readiness.
//!
//! Both endpoints live on the owning context so neither side can observe a
//! spurious disconnect while the context is registered.

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use selkie_core::{Error, Result};
use std::time::Duration;

/// Control command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmd {
    /// Dispatcher -> owner: messages were moved into the inbound mailbox, run
    RunWithMsg,
    /// Owner -> dispatcher: batch finished (or, for a connection event,
    /// outbound messages are pending / a reply arrived)
    Idle,
    /// Either direction: terminate / acknowledge termination
    Quit,
}

/// Two-direction command channel
pub struct CmdChannel {
    to_owner_tx: Sender<Cmd>,
    to_owner_rx: Receiver<Cmd>,
    to_main_tx: Sender<Cmd>,
    to_main_rx: Receiver<Cmd>,
}

impl CmdChannel {
    /// Create a fresh channel pair
    pub fn new() -> Self {
        let (to_owner_tx, to_owner_rx) = unbounded();
        let (to_main_tx, to_main_rx) = unbounded();
        Self {
            to_owner_tx,
            to_owner_rx,
            to_main_tx,
            to_main_rx,
        }
    }

    // =========================================================================
    // Dispatcher side
    // =========================================================================

    /// Send a command to the owner (worker thread or external caller)
    pub fn send_to_owner(&self, cmd: Cmd) -> Result<()> {
        self.to_owner_tx.send(cmd).map_err(|_| Error::Internal {
            message: "owner side of command channel closed".into(),
        })
    }

    /// Non-blocking read of the next owner notification
    pub fn main_try_recv(&self) -> Option<Cmd> {
        match self.to_main_rx.try_recv() {
            Ok(cmd) => Some(cmd),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// A clone of the dispatcher-side receiver, for poller registration
    pub fn main_receiver(&self) -> Receiver<Cmd> {
        self.to_main_rx.clone()
    }

    // =========================================================================
    // Owner side
    // =========================================================================

    /// Notify the dispatcher
    pub fn send_to_main(&self, cmd: Cmd) -> Result<()> {
        self.to_main_tx.send(cmd).map_err(|_| Error::Internal {
            message: "dispatcher side of command channel closed".into(),
        })
    }

    /// Block until the dispatcher sends a command
    pub fn owner_recv(&self) -> Result<Cmd> {
        self.to_owner_rx.recv().map_err(|_| Error::Internal {
            message: "dispatcher side of command channel closed".into(),
        })
    }

    /// Block until the dispatcher sends a command, with a timeout
    pub fn owner_recv_timeout(&self, timeout: Duration) -> Option<Cmd> {
        self.to_owner_rx.recv_timeout(timeout).ok()
    }

    /// A clone of the owner-side receiver, for select loops
    pub fn owner_receiver(&self) -> Receiver<Cmd> {
        self.to_owner_rx.clone()
    }
}

impl Default for CmdChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_dispatcher_to_owner() {
        let ch = CmdChannel::new();
        ch.send_to_owner(Cmd::RunWithMsg).unwrap();
        assert_eq!(ch.owner_recv().unwrap(), Cmd::RunWithMsg);
    }

    #[test]
    fn test_owner_to_dispatcher() {
        let ch = CmdChannel::new();
        assert!(ch.main_try_recv().is_none());
        ch.send_to_main(Cmd::Idle).unwrap();
        assert_eq!(ch.main_try_recv(), Some(Cmd::Idle));
        assert!(ch.main_try_recv().is_none());
    }

    #[test]
    fn test_cross_thread_wake() {
        let ch = std::sync::Arc::new(CmdChannel::new());
        let worker = {
            let ch = ch.clone();
            thread::spawn(move || {
                // Blocks until the dispatcher wakes us.
                ch.owner_recv().unwrap()
            })
        };
        ch.send_to_owner(Cmd::Quit).unwrap();
        assert_eq!(worker.join().unwrap(), Cmd::Quit);
    }

    #[test]
    fn test_owner_recv_timeout() {
        let ch = CmdChannel::new();
        assert!(ch.owner_recv_timeout(Duration::from_millis(10)).is_none());
    }
}
