//! Core domain logic for a grid-storage coordination daemon: namespace
//! and replica persistence, process-wide caching, admission control,
//! work queues, task execution, placement, outbound HTTP, and
//! permission checks.
//!
//! This crate is transport-agnostic. `dome-server` is the only crate
//! that knows about HTTP; everything here speaks in domain types and
//! `DomeError`.

pub mod error;
pub mod mdc;
pub mod model;
pub mod outbound;
pub mod perm;
pub mod placement;
pub mod queue;
pub mod ra;
pub mod status;
pub mod task;

pub use error::{DomeError, Result};
