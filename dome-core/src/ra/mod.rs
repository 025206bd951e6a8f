//! Relational adapter (RA): typed CRUD over the namespace, replicas,
//! pools, filesystems, quota tokens, users, and groups. Every
//! multi-statement mutating primitive wraps its own statements in a
//! single transaction; see `connection.rs` for why there is no
//! separate nesting wrapper.

mod catalog;
mod connection;
mod dirsize;
mod namespace;
mod replica;

pub use connection::{RelationalAdapter, MIGRATOR};
pub use dirsize::DEFAULT_DIRSPACEREPORTDEPTH;
