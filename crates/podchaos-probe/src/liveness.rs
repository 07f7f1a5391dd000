//! Liveness probe.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::info;

use crate::Transition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessState {
    Alive,
    Dying,
}

impl fmt::Display for LivenessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LivenessState::Alive => f.write_str("alive"),
            LivenessState::Dying => f.write_str("dying"),
        }
    }
}

/// Result of a liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessCheck {
    Alive,
    /// `count`-th check since the probe started dying, starting at 1.
    Dying { count: u32 },
}

impl LivenessCheck {
    pub fn is_alive(&self) -> bool {
        matches!(self, LivenessCheck::Alive)
    }
}

impl fmt::Display for LivenessCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LivenessCheck::Alive => f.write_str("alive"),
            LivenessCheck::Dying { count } => write!(f, "dying #{count}"),
        }
    }
}

#[derive(Debug)]
struct LivenessInner {
    alive: bool,
    /// Number reported by the next dying check.
    next_count: u32,
}

/// Switchable liveness state machine.
#[derive(Debug)]
pub struct LivenessProbe {
    inner: Mutex<LivenessInner>,
}

impl Default for LivenessProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessProbe {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LivenessInner {
                alive: true,
                next_count: 1,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LivenessInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer a probe request.
    pub fn check(&self) -> LivenessCheck {
        let mut inner = self.lock();
        if inner.alive {
            return LivenessCheck::Alive;
        }
        let count = inner.next_count;
        inner.next_count = inner.next_count.saturating_add(1);
        LivenessCheck::Dying { count }
    }

    /// Flip between alive and dying.
    pub fn toggle(&self) -> LivenessState {
        let mut inner = self.lock();
        Self::flip(&mut inner)
    }

    /// Become alive unless already alive.
    pub fn become_alive(&self) -> Transition<LivenessState> {
        let mut inner = self.lock();
        if inner.alive {
            return Transition::Already(LivenessState::Alive);
        }
        Transition::Switched(Self::flip(&mut inner))
    }

    /// Start dying unless already dying.
    pub fn become_dying(&self) -> Transition<LivenessState> {
        let mut inner = self.lock();
        if !inner.alive {
            return Transition::Already(LivenessState::Dying);
        }
        Transition::Switched(Self::flip(&mut inner))
    }

    pub fn state(&self) -> LivenessState {
        if self.lock().alive {
            LivenessState::Alive
        } else {
            LivenessState::Dying
        }
    }

    pub fn is_alive(&self) -> bool {
        self.lock().alive
    }

    fn flip(inner: &mut LivenessInner) -> LivenessState {
        inner.alive = !inner.alive;
        let state = if inner.alive {
            inner.next_count = 1;
            LivenessState::Alive
        } else {
            LivenessState::Dying
        };
        info!(%state, "liveness switched");
        state
    }
}
