//! Addresses for actors, workers, and connection events
//!
//! TigerStyle: Explicit validation on construction, immutable after creation.
//!
//! Every routable endpoint carries a dotted address. The conventions are:
//! `actor.<module>.<instance>` for actor contexts, `worker.pool.<n>` for
//! pooled workers, `worker.timer` for the timer worker, `event.conn.<n>` for
//! connection events, and the reserved `sys.main` for the dispatcher itself.

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Validated address of a routable endpoint
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    /// Create a new address with validation
    ///
    /// # Errors
    /// Returns an error if the address is empty, exceeds the length limit,
    /// or contains characters outside `[A-Za-z0-9._-]`.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();

        if addr.is_empty() {
            return Err(Error::InvalidAddress {
                address: addr,
                reason: "address must not be empty".into(),
            });
        }

        if addr.len() > ADDRESS_LENGTH_BYTES_MAX {
            return Err(Error::InvalidAddress {
                address: addr.clone(),
                reason: format!(
                    "length {} exceeds limit {}",
                    addr.len(),
                    ADDRESS_LENGTH_BYTES_MAX
                ),
            });
        }

        let valid = addr
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '_' || c == '-');
        if !valid {
            return Err(Error::InvalidAddress {
                address: addr,
                reason: "contains invalid characters".into(),
            });
        }

        Ok(Self(addr))
    }

    /// The reserved address of the dispatcher itself
    pub fn system() -> Self {
        Self(SYSTEM_ADDRESS.to_string())
    }

    /// The address of the timer worker
    pub fn timer() -> Self {
        Self(TIMER_ADDRESS.to_string())
    }

    /// Build an actor address: `actor.<module>.<instance>`
    pub fn actor(module: &str, instance: &str) -> Result<Self> {
        Self::new(format!("{}{}.{}", ACTOR_ADDRESS_PREFIX, module, instance))
    }

    /// Build a pooled-worker address: `worker.pool.<n>`
    pub fn pool_worker(index: usize) -> Self {
        Self(format!("{}{}", WORKER_POOL_ADDRESS_PREFIX, index))
    }

    /// Build a connection-event address: `event.conn.<n>`
    pub fn event_conn(index: usize) -> Self {
        Self(format!("{}{}", EVENT_CONN_ADDRESS_PREFIX, index))
    }

    /// Whether this is the reserved system destination
    pub fn is_system(&self) -> bool {
        self.0 == SYSTEM_ADDRESS
    }

    /// Whether this addresses a connection event
    pub fn is_event_conn(&self) -> bool {
        self.0.starts_with(EVENT_CONN_ADDRESS_PREFIX)
    }

    /// The address as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<&str> for Address {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_valid() {
        let addr = Address::new("actor.example.helloworld").unwrap();
        assert_eq!(addr.as_str(), "actor.example.helloworld");
        assert!(!addr.is_system());
    }

    #[test]
    fn test_address_empty_rejected() {
        assert!(Address::new("").is_err());
    }

    #[test]
    fn test_address_invalid_chars_rejected() {
        assert!(Address::new("actor example").is_err());
        assert!(Address::new("actor/example").is_err());
    }

    #[test]
    fn test_address_too_long_rejected() {
        let long = "a".repeat(ADDRESS_LENGTH_BYTES_MAX + 1);
        assert!(Address::new(long).is_err());
    }

    #[test]
    fn test_address_builders() {
        assert_eq!(
            Address::actor("example", "1").unwrap(),
            "actor.example.1"
        );
        assert_eq!(Address::pool_worker(3), "worker.pool.3");
        assert_eq!(Address::event_conn(0), "event.conn.0");
        assert!(Address::system().is_system());
        assert!(Address::event_conn(0).is_event_conn());
    }
}
