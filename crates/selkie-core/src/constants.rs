//! TigerStyle constants for Selkie
//!
//! All limits are explicit, use big-endian naming (most significant first),
//! and include units in the name.

// =============================================================================
// Worker Limits
// =============================================================================

/// Default number of pooled worker threads
pub const WORKER_POOL_SIZE_DEFAULT: usize = 4;

/// Maximum number of pooled worker threads
pub const WORKER_POOL_SIZE_MAX: usize = 256;

// =============================================================================
// Handle Space
// =============================================================================

/// Maximum allocatable handle slot index.
///
/// The value itself is reserved as the dispatcher sentinel; slot indices run
/// strictly below it.
pub const HANDLE_INDEX_MAX: u32 = 0x00FF_FFFF;

// =============================================================================
// Dispatch Limits
// =============================================================================

/// Cache depth at which a pending-message warning is emitted.
///
/// This is observability, not admission control: the cache is unbounded and
/// the sender is never blocked or dropped.
pub const CACHE_PENDING_COUNT_WARN_DEFAULT: usize = 1000;

/// Default reactor wait timeout in milliseconds
pub const POLL_TIMEOUT_MS_DEFAULT: u64 = 100;

// =============================================================================
// Connection Events
// =============================================================================

/// Default number of pre-allocated connection events
pub const EVENT_CONN_POOL_SIZE_DEFAULT: usize = 2;

// =============================================================================
// Timer
// =============================================================================

/// Timer thread tick interval in milliseconds
pub const TIMER_TICK_MS_DEFAULT: u64 = 10;

// =============================================================================
// Address Limits
// =============================================================================

/// Maximum length of an address in bytes
pub const ADDRESS_LENGTH_BYTES_MAX: usize = 256;

/// Reserved address of the dispatcher itself (system destination)
pub const SYSTEM_ADDRESS: &str = "sys.main";

/// Address of the timer worker
pub const TIMER_ADDRESS: &str = "worker.timer";

/// Address prefix for actor contexts
pub const ACTOR_ADDRESS_PREFIX: &str = "actor.";

/// Address prefix for pooled workers
pub const WORKER_POOL_ADDRESS_PREFIX: &str = "worker.pool.";

/// Address prefix for connection events
pub const EVENT_CONN_ADDRESS_PREFIX: &str = "event.conn.";

// =============================================================================
// System Operations
// =============================================================================

/// System message descriptor requesting an actor spawn
pub const SYS_OP_SPAWN: &str = "sys.spawn";

/// System message descriptor requesting an actor stop
pub const SYS_OP_STOP: &str = "sys.stop";

/// System message descriptor requesting runtime shutdown
pub const SYS_OP_SHUTDOWN: &str = "sys.shutdown";

/// System job answered by pooled workers
pub const SYS_OP_PING: &str = "ping";
