//! The HTTP-facing half of the dome daemon: request dispatch,
//! authorization, and the background ticker subsystem. `dome-core`
//! carries the transport-agnostic domain logic this crate serves over
//! the wire.

pub mod body;
pub mod errors;
pub mod handlers;
pub mod router;
pub mod security;
pub mod state;
pub mod ticker;

pub use router::build_router;
pub use state::AppState;
