//! Selkie Core
//!
//! Core types, errors, and constants for the Selkie in-process actor runtime.
//!
//! # Overview
//!
//! Selkie is an in-process actor runtime: independent actors communicate
//! exclusively by asynchronous messages routed through named mailboxes,
//! executed by worker OS threads multiplexed over a reactor by a single
//! dispatcher thread.
//!
//! This crate holds the leaf types shared by the runtime and by actor
//! implementations: addresses, messages, the [`Actor`] trait and its context,
//! the module (factory) registry, errors, constants, configuration, and
//! telemetry bootstrap.
//!
//! # TigerStyle
//!
//! This crate follows [TigerStyle](https://github.com/tigerbeetle/tigerbeetle/blob/main/docs/TIGER_STYLE.md)
//! engineering principles:
//! - Safety > Performance > Developer Experience
//! - Explicit limits with big-endian naming (e.g., `ADDRESS_LENGTH_BYTES_MAX`)
//! - Assertions on function preconditions

pub mod actor;
pub mod address;
pub mod config;
pub mod constants;
pub mod error;
pub mod message;
pub mod metrics;
pub mod module;
pub mod telemetry;

pub use actor::{Actor, ActorContext, ContextOps, SpawnRequest, StopRequest};
pub use address::Address;
pub use config::RuntimeConfig;
pub use constants::*;
pub use error::{Error, Result};
pub use message::{Msg, MsgKind, Payload};
pub use module::{ActorModule, FnModule, ModuleRegistry};
pub use telemetry::{init_telemetry, TelemetryConfig};
