//! Handle registry
//!
//! An arena of entries indexed by a generation-checked key: a handle packs a
//! slot index and the slot's generation at registration time. Freed slots are
//! reusable, but their generation is bumped, so a stale handle can never
//! resolve to a new occupant - lookups with an outdated generation fail. An
//! auxiliary name map supports lookup by address.

use crate::context::WorkerContext;
use crate::event_conn::EventConn;
use selkie_core::{Address, Error, Result, HANDLE_INDEX_MAX};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Handle
// =============================================================================

/// Generation-checked registry key
///
/// The reserved [`Handle::MAIN`] denotes the dispatcher itself (the system
/// destination); its index is never allocated to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    /// The reserved dispatcher sentinel
    pub const MAIN: Handle = Handle(HANDLE_INDEX_MAX as u64);

    /// Build a handle from a slot index and generation
    pub fn from_parts(index: u32, generation: u32) -> Self {
        debug_assert!(index <= HANDLE_INDEX_MAX, "index exceeds handle space");
        Self(((generation as u64) << 32) | index as u64)
    }

    /// The slot index
    pub fn index(&self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    /// The generation at registration time
    pub fn generation(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// The raw packed value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.index(), self.generation())
    }
}

// =============================================================================
// EventRef
// =============================================================================

/// A registered endpoint: a worker context or a connection event
#[derive(Clone)]
pub enum EventRef {
    /// Worker context (pool worker, user actor, or timer)
    Worker(Arc<WorkerContext>),
    /// Pooled connection event
    Conn(Arc<EventConn>),
}

impl EventRef {
    /// The endpoint's address
    pub fn address(&self) -> &Address {
        match self {
            EventRef::Worker(ctx) => ctx.addr(),
            EventRef::Conn(conn) => conn.addr(),
        }
    }

    /// Short kind name for log lines
    pub fn kind_str(&self) -> &'static str {
        match self {
            EventRef::Worker(ctx) => ctx.kind().as_str(),
            EventRef::Conn(_) => "event_conn",
        }
    }
}

// =============================================================================
// HandleRegistry
// =============================================================================

struct Slot {
    generation: u32,
    entry: Option<EventRef>,
}

/// Arena of registered endpoints, keyed by generation-checked handles
pub struct HandleRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    names: HashMap<String, Handle>,
    /// Round-robin cursor over slot indices
    cursor: usize,
}

impl HandleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            names: HashMap::new(),
            cursor: 0,
        }
    }

    /// Register an endpoint and return its handle. O(1) amortized.
    ///
    /// # Errors
    /// - [`Error::DuplicateRegistration`] if the address is already taken
    /// - [`Error::HandleSpaceExhausted`] once the slot space is full
    ///   (unrecoverable capacity error)
    pub fn register(&mut self, entry: EventRef) -> Result<Handle> {
        let name = entry.address().as_str().to_string();
        if self.names.contains_key(&name) {
            return Err(Error::DuplicateRegistration { address: name });
        }

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                if self.slots.len() >= HANDLE_INDEX_MAX as usize {
                    return Err(Error::HandleSpaceExhausted {
                        capacity: self.slots.len(),
                    });
                }
                self.slots.push(Slot {
                    generation: 0,
                    entry: None,
                });
                (self.slots.len() - 1) as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.entry.is_none(), "free slot must be vacant");
        slot.entry = Some(entry);

        let handle = Handle::from_parts(index, slot.generation);
        self.names.insert(name, handle);
        Ok(handle)
    }

    /// Look up an endpoint by handle; stale generations fail.
    pub fn lookup(&self, handle: Handle) -> Option<EventRef> {
        let slot = self.slots.get(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.entry.clone()
    }

    /// Look up an endpoint by address
    pub fn lookup_name(&self, name: &str) -> Option<(Handle, EventRef)> {
        let handle = *self.names.get(name)?;
        self.lookup(handle).map(|entry| (handle, entry))
    }

    /// Unregister a handle, returning its entry.
    ///
    /// Bumps the slot generation so the handle (and any copies of it held
    /// elsewhere) can never resolve again.
    pub fn unregister(&mut self, handle: Handle) -> Option<EventRef> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index());
        self.names.remove(entry.address().as_str());
        Some(entry)
    }

    /// Number of registered endpoints
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Return the next registered endpoint in cyclic slot order.
    ///
    /// Fairness helper: repeated calls visit every occupied slot before
    /// revisiting one. An endpoint registered mid-cycle may or may not be
    /// visited in the current pass, but is never skipped forever.
    pub fn next_round_robin(&mut self) -> Option<(Handle, EventRef)> {
        if self.names.is_empty() {
            return None;
        }
        let len = self.slots.len();
        for _ in 0..len {
            let index = self.cursor % len;
            self.cursor = (self.cursor + 1) % len;
            let slot = &self.slots[index];
            if let Some(entry) = &slot.entry {
                let handle = Handle::from_parts(index as u32, slot.generation);
                return Some((handle, entry.clone()));
            }
        }
        None
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::WorkerKind;

    fn worker(name: &str) -> EventRef {
        EventRef::Worker(Arc::new(WorkerContext::new(
            Address::new(name).unwrap(),
            WorkerKind::UserActor,
        )))
    }

    #[test]
    fn test_register_lookup() {
        let mut reg = HandleRegistry::new();
        let h = reg.register(worker("actor.a.1")).unwrap();
        let entry = reg.lookup(h).unwrap();
        assert_eq!(entry.address(), &"actor.a.1");

        let (by_name_handle, _) = reg.lookup_name("actor.a.1").unwrap();
        assert_eq!(by_name_handle, h);
    }

    #[test]
    fn test_distinct_handles_distinct_contexts() {
        let mut reg = HandleRegistry::new();
        let h1 = reg.register(worker("actor.a.1")).unwrap();
        let h2 = reg.register(worker("actor.b.1")).unwrap();
        assert_ne!(h1, h2);

        let e1 = reg.lookup(h1).unwrap();
        let e2 = reg.lookup(h2).unwrap();
        assert_ne!(e1.address(), e2.address());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut reg = HandleRegistry::new();
        reg.register(worker("actor.a.1")).unwrap();
        let err = reg.register(worker("actor.a.1")).unwrap_err();
        assert!(matches!(err, Error::DuplicateRegistration { .. }));
    }

    #[test]
    fn test_stale_handle_never_resolves() {
        let mut reg = HandleRegistry::new();
        let h1 = reg.register(worker("actor.a.1")).unwrap();
        reg.unregister(h1).unwrap();

        // The slot is reused, but the stale handle must fail, and the fresh
        // registration must not reissue a previously-issued handle.
        let h2 = reg.register(worker("actor.b.1")).unwrap();
        assert_eq!(h1.index(), h2.index());
        assert_ne!(h1, h2);
        assert!(reg.lookup(h1).is_none());
        assert!(reg.lookup_name("actor.a.1").is_none());
        assert_eq!(reg.lookup(h2).unwrap().address(), &"actor.b.1");
    }

    #[test]
    fn test_unregister_twice_is_noop() {
        let mut reg = HandleRegistry::new();
        let h = reg.register(worker("actor.a.1")).unwrap();
        assert!(reg.unregister(h).is_some());
        assert!(reg.unregister(h).is_none());
    }

    #[test]
    fn test_round_robin_visits_all() {
        let mut reg = HandleRegistry::new();
        reg.register(worker("actor.a.1")).unwrap();
        reg.register(worker("actor.b.1")).unwrap();
        reg.register(worker("actor.c.1")).unwrap();

        let mut seen = Vec::new();
        for _ in 0..3 {
            let (_, entry) = reg.next_round_robin().unwrap();
            seen.push(entry.address().as_str().to_string());
        }
        seen.sort();
        assert_eq!(seen, vec!["actor.a.1", "actor.b.1", "actor.c.1"]);
    }

    #[test]
    fn test_round_robin_skips_unregistered() {
        let mut reg = HandleRegistry::new();
        let ha = reg.register(worker("actor.a.1")).unwrap();
        reg.register(worker("actor.b.1")).unwrap();
        reg.unregister(ha).unwrap();

        for _ in 0..4 {
            let (_, entry) = reg.next_round_robin().unwrap();
            assert_eq!(entry.address(), &"actor.b.1");
        }
    }

    #[test]
    fn test_main_handle_reserved() {
        assert_eq!(Handle::MAIN.index(), HANDLE_INDEX_MAX);
        assert_eq!(Handle::MAIN.generation(), 0);
    }
}
