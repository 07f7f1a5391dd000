//! podchaos-probe — liveness and readiness state machines.
//!
//! Both probes start active and are flipped by operator requests. The
//! orchestrator's probe checks then observe the inactive state:
//!
//! ```text
//! Liveness   alive ──toggle──▶ dying #1, #2, #3, …  ──toggle──▶ alive
//! Readiness  ready ──toggle(N)──▶ unready 1/N … N/N ──next check──▶ ready
//! ```
//!
//! Readiness heals itself after `N` unready checks (default 3); liveness
//! stays dying until toggled back, counting how often it was asked.
//!
//! Each probe keeps its flag and counter under one mutex, so a concurrent
//! check never sees a flipped flag with a stale counter.

pub mod liveness;
pub mod readiness;

use std::fmt;

pub use liveness::{LivenessCheck, LivenessProbe, LivenessState};
pub use readiness::{DEFAULT_HEALING_THRESHOLD, ReadinessCheck, ReadinessProbe, ReadinessState};

/// Outcome of a request to move a probe into a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition<S> {
    /// The probe flipped into `S`.
    Switched(S),
    /// The probe was already in `S`; nothing changed.
    Already(S),
}

impl<S: Copy> Transition<S> {
    /// The state the probe is in afterwards.
    pub fn state(&self) -> S {
        match *self {
            Transition::Switched(s) | Transition::Already(s) => s,
        }
    }

    pub fn switched(&self) -> bool {
        matches!(self, Transition::Switched(_))
    }
}

impl<S: fmt::Display> fmt::Display for Transition<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Switched(s) => write!(f, "switched to {s}"),
            Transition::Already(s) => write!(f, "already {s}"),
        }
    }
}
