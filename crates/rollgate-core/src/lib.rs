//! rollgate-core: fleet identity, probe policy and `rollgate.toml` parsing.

pub mod config;
pub mod types;

pub use config::GateConfig;
pub use types::*;
