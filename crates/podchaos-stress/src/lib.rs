//! podchaos-stress — put the host under CPU, I/O, VM and disk load.
//!
//! Wraps the `stress` tool. Every start without an intervening stop
//! raises the intensity by one, and each intensity step adds ten workers
//! per dimension:
//!
//! ```text
//! start → stress --cpu 20 --io 20 --vm 20 --hdd 20 [--timeout S]
//! start → stress --cpu 30 --io 30 --vm 30 --hdd 30 [--timeout S]
//! stop  → kill children, kill parent, sweep strays, intensity back to 1
//! ```
//!
//! # Architecture
//!
//! ```text
//! StressController (one async mutex around intensity + session)
//!   ├── LoadGenerator    spawn(LoadSpec) → pid      (StressCommand in production)
//!   └── ProcessRegistry  scan / children / kill     (SysinfoRegistry in production)
//! ```
//!
//! Status always comes from a process-table scan, so it stays truthful
//! when a session times out on its own or survived a restart.

pub mod controller;
pub mod generator;
pub mod registry;

pub use controller::{StartReport, StopReport, StressController, StressSession, StressStatus};
pub use generator::{LoadGenerator, LoadSpec, StressCommand};
pub use registry::{ProcessEntry, ProcessRegistry, SysinfoRegistry};
