//! Error types for Selkie
//!
//! TigerStyle: Explicit error types with context, using thiserror.

use thiserror::Error;

/// Result type alias for Selkie operations
pub type Result<T> = std::result::Result<T, Error>;

/// Selkie error types
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Routing Errors
    // =========================================================================
    #[error("Unknown destination: {destination}, from: {origin}")]
    UnknownDestination { destination: String, origin: String },

    #[error("Destination does not accept routed messages: {destination} ({kind})")]
    UnsupportedDestination { destination: String, kind: String },

    // =========================================================================
    // Registry Errors
    // =========================================================================
    #[error("Duplicate registration: {address}")]
    DuplicateRegistration { address: String },

    #[error("Handle space exhausted: {capacity} slots in use")]
    HandleSpaceExhausted { capacity: usize },

    #[error("Stale handle: {handle}")]
    StaleHandle { handle: u64 },

    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Invalid address: {address}, reason: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Invalid configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    #[error("Module not found: {module}")]
    ModuleNotFound { module: String },

    #[error("Actor instance creation failed: {module}.{instance}, reason: {reason}")]
    InstanceCreateFailed {
        module: String,
        instance: String,
        reason: String,
    },

    #[error("Actor init failed: {address}, reason: {reason}")]
    ActorInitFailed { address: String, reason: String },

    #[error("Runtime already started")]
    AlreadyStarted,

    #[error("Runtime is shutting down")]
    ShuttingDown,

    // =========================================================================
    // Channel Errors
    // =========================================================================
    #[error("Command channel closed: {address}")]
    ChannelClosed { address: String },

    #[error("Request failed: {destination}, reason: {reason}")]
    RequestFailed {
        destination: String,
        reason: String,
    },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {message}")]
    Internal { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnknownDestination {
            destination: "actor.ghost.1".into(),
            origin: "actor.example.1".into(),
        };
        assert!(err.to_string().contains("actor.ghost.1"));
        assert!(err.to_string().contains("actor.example.1"));
    }

    #[test]
    fn test_stale_handle_display() {
        let err = Error::StaleHandle { handle: 42 };
        assert_eq!(err.to_string(), "Stale handle: 42");
    }
}
