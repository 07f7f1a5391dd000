//! podchaos-core — shared configuration and error types.
//!
//! Every other podchaos crate depends on this one for the
//! [`ChaosError`] taxonomy and the [`ChaosConfig`] loaded at startup.

pub mod config;
pub mod error;

pub use config::{ChaosConfig, MemoryConfig, ProbeConfig, ServerConfig, StressConfig, parse_duration};
pub use error::{ChaosError, ChaosResult};
