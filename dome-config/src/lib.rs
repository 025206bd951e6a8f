//! Typed configuration for the dome daemon: a TOML file plus
//! environment-variable overrides resolve to a fully-defaulted
//! [`Config`].

pub mod constants;
pub mod loader;
pub mod models;
pub mod util;

pub use loader::{defaults_for_role, error::ConfigLoadError, ConfigLoader};
pub use models::{
    AuthConfig, Config, ConfigMetadata, DbConfig, DiskConfig, DiskFilepullerConfig, FcgiConfig,
    GlbConfig, HeadConfig, HeadFilepullerConfig, HeadnodeConfig, MdcacheConfig, NodeRole,
    PutConfig, QueueConfig, RestclientConfig, TaskConfig,
};
