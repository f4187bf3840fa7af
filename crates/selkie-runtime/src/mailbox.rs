//! Per-context mailbox
//!
//! Two directional FIFO queues: inbound (messages for the bound actor) and
//! outbound (messages the actor wants routed elsewhere). Pushes are safe from
//! any thread; pops and drains must only be issued by whichever side currently
//! owns the context. The mailbox does not arbitrate ownership - the context
//! manager does, through the ownership flag.

use selkie_core::{Address, Msg};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Inbound/outbound message queues of one context
#[derive(Debug)]
pub struct Mailbox {
    addr: Address,
    inbound: Mutex<VecDeque<Msg>>,
    outbound: Mutex<VecDeque<Msg>>,
    /// Total messages enqueued inbound (for observability)
    enqueued_count: AtomicU64,
    /// Total messages popped inbound (for observability)
    processed_count: AtomicU64,
}

impl Mailbox {
    /// Create a mailbox owned by the context at `addr`
    pub fn new(addr: Address) -> Self {
        Self {
            addr,
            inbound: Mutex::new(VecDeque::new()),
            outbound: Mutex::new(VecDeque::new()),
            enqueued_count: AtomicU64::new(0),
            processed_count: AtomicU64::new(0),
        }
    }

    /// The owning context's address
    pub fn addr(&self) -> &Address {
        &self.addr
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Append one message to the inbound queue
    pub fn push_inbound(&self, msg: Msg) {
        self.inbound.lock().unwrap().push_back(msg);
        self.enqueued_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Append a batch to the inbound queue, preserving order
    pub fn push_inbound_batch(&self, msgs: impl IntoIterator<Item = Msg>) {
        let mut inbound = self.inbound.lock().unwrap();
        for msg in msgs {
            inbound.push_back(msg);
            self.enqueued_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Pop the next inbound message (owner side only)
    pub fn pop_inbound(&self) -> Option<Msg> {
        let msg = self.inbound.lock().unwrap().pop_front();
        if msg.is_some() {
            self.processed_count.fetch_add(1, Ordering::Relaxed);
        }
        msg
    }

    /// Whether the inbound queue is empty
    pub fn inbound_empty(&self) -> bool {
        self.inbound.lock().unwrap().is_empty()
    }

    /// Number of pending inbound messages
    pub fn inbound_len(&self) -> usize {
        self.inbound.lock().unwrap().len()
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    /// Append one message to the outbound queue
    pub fn push_outbound(&self, msg: Msg) {
        self.outbound.lock().unwrap().push_back(msg);
    }

    /// Take every outbound message, preserving order (owner side only)
    pub fn drain_outbound(&self) -> Vec<Msg> {
        self.outbound.lock().unwrap().drain(..).collect()
    }

    /// Number of pending outbound messages
    pub fn outbound_len(&self) -> usize {
        self.outbound.lock().unwrap().len()
    }

    // =========================================================================
    // Counters
    // =========================================================================

    /// Total messages enqueued inbound
    pub fn enqueued_count(&self) -> u64 {
        self.enqueued_count.load(Ordering::Relaxed)
    }

    /// Total messages popped inbound
    pub fn processed_count(&self) -> u64 {
        self.processed_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mailbox() -> Mailbox {
        Mailbox::new(Address::new("actor.test.1").unwrap())
    }

    #[test]
    fn test_inbound_fifo_order() {
        let mb = mailbox();
        for i in 0..10 {
            mb.push_inbound(Msg::text(format!("m{}", i)));
        }
        for i in 0..10 {
            let msg = mb.pop_inbound().unwrap();
            assert_eq!(msg.payload_str(), Some(format!("m{}", i).as_str()));
        }
        assert!(mb.inbound_empty());
        assert!(mb.pop_inbound().is_none());
    }

    #[test]
    fn test_batch_append_preserves_order() {
        let mb = mailbox();
        mb.push_inbound(Msg::text("a"));
        mb.push_inbound_batch(vec![Msg::text("b"), Msg::text("c")]);

        assert_eq!(mb.inbound_len(), 3);
        assert_eq!(mb.pop_inbound().unwrap().payload_str(), Some("a"));
        assert_eq!(mb.pop_inbound().unwrap().payload_str(), Some("b"));
        assert_eq!(mb.pop_inbound().unwrap().payload_str(), Some("c"));
    }

    #[test]
    fn test_outbound_drain() {
        let mb = mailbox();
        mb.push_outbound(Msg::text("x"));
        mb.push_outbound(Msg::text("y"));

        let drained = mb.drain_outbound();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].payload_str(), Some("x"));
        assert_eq!(mb.outbound_len(), 0);
    }

    #[test]
    fn test_counters() {
        let mb = mailbox();
        mb.push_inbound(Msg::text("a"));
        mb.push_inbound(Msg::text("b"));
        assert_eq!(mb.enqueued_count(), 2);
        assert_eq!(mb.processed_count(), 0);
        mb.pop_inbound();
        assert_eq!(mb.processed_count(), 1);
    }

    #[test]
    fn test_concurrent_producers() {
        use std::sync::Arc;
        use std::thread;

        let mb = Arc::new(mailbox());
        let mut handles = Vec::new();
        for t in 0..4 {
            let mb = mb.clone();
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    mb.push_inbound(Msg::text(format!("{}:{}", t, i)));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(mb.inbound_len(), 400);
    }
}
