//! Readiness multiplexer over command-channel sources
//!
//! The poller watches the dispatcher-side receiver of every registered
//! command channel (worker contexts and connection events alike). Readiness is
//! level-triggered: a source stays ready while its command queue is
//! non-empty. The readiness signal never carries payload - payload always
//! travels through mailboxes; readiness only means "re-check this source".
//!
//! Membership may change from other threads while the dispatcher is waiting
//! (connection events are allocated and released concurrently); an internal
//! control channel interrupts the wait so the next pass sees the new set.

use crate::cmd::Cmd;
use crate::registry::Handle;
use crossbeam_channel::{unbounded, Receiver, Select, Sender};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Readiness multiplexer
pub struct Poller {
    sources: Mutex<Vec<(Handle, Receiver<Cmd>)>>,
    control_tx: Sender<()>,
    control_rx: Receiver<()>,
}

impl Poller {
    /// Create an empty poller
    pub fn new() -> Self {
        let (control_tx, control_rx) = unbounded();
        Self {
            sources: Mutex::new(Vec::new()),
            control_tx,
            control_rx,
        }
    }

    /// Register a source, or update its receiver if the handle is already
    /// registered (idempotent re-add).
    pub fn add(&self, handle: Handle, receiver: Receiver<Cmd>) {
        let mut sources = self.sources.lock().unwrap();
        if let Some(entry) = sources.iter_mut().find(|(h, _)| *h == handle) {
            debug!(handle = %handle, "poller source re-added, interest updated");
            entry.1 = receiver;
        } else {
            sources.push((handle, receiver));
        }
        drop(sources);
        // Interrupt an in-flight wait so it picks up the new source.
        let _ = self.control_tx.send(());
    }

    /// Deregister a source. Returns whether it was registered.
    pub fn del(&self, handle: Handle) -> bool {
        let mut sources = self.sources.lock().unwrap();
        let before = sources.len();
        sources.retain(|(h, _)| *h != handle);
        let removed = sources.len() != before;
        drop(sources);
        if removed {
            let _ = self.control_tx.send(());
        }
        removed
    }

    /// Number of registered sources
    pub fn len(&self) -> usize {
        self.sources.lock().unwrap().len()
    }

    /// Whether no sources are registered
    pub fn is_empty(&self) -> bool {
        self.sources.lock().unwrap().is_empty()
    }

    /// Wait up to `timeout` for readiness and return every ready source.
    ///
    /// Returns an empty set on timeout (not an error) and on control-channel
    /// interruptions (membership changed mid-wait).
    pub fn wait(&self, timeout: Duration) -> Vec<Handle> {
        // Stale control pings would cause a spurious early return.
        while self.control_rx.try_recv().is_ok() {}

        let snapshot: Vec<(Handle, Receiver<Cmd>)> = self.sources.lock().unwrap().clone();

        let mut select = Select::new();
        for (_, rx) in &snapshot {
            select.recv(rx);
        }
        select.recv(&self.control_rx);

        if select.ready_timeout(timeout).is_err() {
            return Vec::new();
        }

        // Level-triggered sweep: collect every source with pending commands,
        // consuming nothing.
        snapshot
            .iter()
            .filter(|(_, rx)| !rx.is_empty())
            .map(|(h, _)| *h)
            .collect()
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::CmdChannel;
    use std::sync::Arc;
    use std::thread;

    fn handle(n: u32) -> Handle {
        Handle::from_parts(n, 0)
    }

    #[test]
    fn test_wait_timeout_returns_empty() {
        let poller = Poller::new();
        let ch = CmdChannel::new();
        poller.add(handle(1), ch.main_receiver());

        let ready = poller.wait(Duration::from_millis(10));
        assert!(ready.is_empty());
    }

    #[test]
    fn test_ready_source_reported() {
        let poller = Poller::new();
        let ch = CmdChannel::new();
        poller.add(handle(1), ch.main_receiver());

        ch.send_to_main(Cmd::Idle).unwrap();
        let ready = poller.wait(Duration::from_millis(100));
        assert_eq!(ready, vec![handle(1)]);

        // Level-triggered: still ready until the command is consumed.
        let ready = poller.wait(Duration::from_millis(100));
        assert_eq!(ready, vec![handle(1)]);

        ch.main_try_recv().unwrap();
        let ready = poller.wait(Duration::from_millis(10));
        assert!(ready.is_empty());
    }

    #[test]
    fn test_multiple_ready_sources() {
        let poller = Poller::new();
        let ch1 = CmdChannel::new();
        let ch2 = CmdChannel::new();
        poller.add(handle(1), ch1.main_receiver());
        poller.add(handle(2), ch2.main_receiver());

        ch1.send_to_main(Cmd::Idle).unwrap();
        ch2.send_to_main(Cmd::Idle).unwrap();

        let mut ready = poller.wait(Duration::from_millis(100));
        ready.sort_by_key(|h| h.index());
        assert_eq!(ready, vec![handle(1), handle(2)]);
    }

    #[test]
    fn test_add_is_idempotent() {
        let poller = Poller::new();
        let ch = CmdChannel::new();
        poller.add(handle(1), ch.main_receiver());
        poller.add(handle(1), ch.main_receiver());
        assert_eq!(poller.len(), 1);
    }

    #[test]
    fn test_del() {
        let poller = Poller::new();
        let ch = CmdChannel::new();
        poller.add(handle(1), ch.main_receiver());
        assert!(poller.del(handle(1)));
        assert!(!poller.del(handle(1)));
        assert!(poller.is_empty());
    }

    #[test]
    fn test_concurrent_add_interrupts_wait() {
        let poller = Arc::new(Poller::new());
        let ch = CmdChannel::new();
        ch.send_to_main(Cmd::Idle).unwrap();
        let rx = ch.main_receiver();

        let adder = {
            let poller = poller.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                poller.add(handle(7), rx);
            })
        };

        // First wait may return empty (interrupted); the source must be
        // visible no later than the following pass.
        let mut ready = poller.wait(Duration::from_secs(2));
        if ready.is_empty() {
            ready = poller.wait(Duration::from_secs(2));
        }
        assert_eq!(ready, vec![handle(7)]);
        adder.join().unwrap();
    }
}
