//! podchaos-memory — drive the process memory footprint toward a target.
//!
//! An operator sets a target utilization in percent. A background task
//! samples how much of the allowed memory the process uses and grows or
//! drops an owned arena of fixed-size blocks until the observed value
//! sits inside a ±2 point band around the target.
//!
//! # Loop
//!
//! ```text
//! observed = used_bytes / limit_bytes * 100
//!
//! target - 2 <= observed <= target + 2  → hold     (sleep 100ms)
//! observed > target + 2                 → release  (drop arena, trim, sleep 10ms)
//! observed < target - 2                 → grow     (push one block, yield)
//! ```
//!
//! Growth never sleeps, release is paced so the allocator has time to hand
//! pages back before the next sample.

mod arena;
pub mod controller;
pub mod stats;

pub use controller::{MemoryPressureController, MemoryStatus, PressureLoop, TickAction};
pub use stats::{MemorySample, MemoryStats, SysinfoStats};
