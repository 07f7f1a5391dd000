//! Readiness probe with auto-healing.
//!
//! Going unready arms a healing threshold `N`. The first `N` checks report
//! unready with their progress; the check after that flips the probe back
//! to ready on its own. The threshold is only read when becoming unready,
//! so changing it mid-sequence takes effect on the next unready period.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::Transition;

/// Healing threshold used when none (or garbage) is supplied.
pub const DEFAULT_HEALING_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    Ready,
    Unready,
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessState::Ready => f.write_str("ready"),
            ReadinessState::Unready => f.write_str("unready"),
        }
    }
}

/// Result of a readiness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessCheck {
    Ready,
    /// Still unready after `count` of `threshold` checks.
    Unready { count: u32, threshold: u32 },
    /// This check reached the threshold and switched the probe back.
    Healed,
}

impl ReadinessCheck {
    pub fn is_ready(&self) -> bool {
        !matches!(self, ReadinessCheck::Unready { .. })
    }
}

impl fmt::Display for ReadinessCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessCheck::Ready => f.write_str("ready"),
            ReadinessCheck::Healed => f.write_str("switched to ready"),
            ReadinessCheck::Unready { count, threshold } => write!(
                f,
                "unready since {count} requests - {} requests until switch back to ready",
                threshold.saturating_sub(*count)
            ),
        }
    }
}

#[derive(Debug)]
struct ReadinessInner {
    ready: bool,
    /// Unready checks answered in the current unready period.
    count: u32,
    threshold: u32,
}

/// Readiness state machine that heals itself after a number of checks.
#[derive(Debug)]
pub struct ReadinessProbe {
    inner: Mutex<ReadinessInner>,
    default_threshold: u32,
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessProbe {
    pub fn new() -> Self {
        Self::with_default_threshold(DEFAULT_HEALING_THRESHOLD)
    }

    /// Probe whose fallback threshold is `default_threshold`.
    pub fn with_default_threshold(default_threshold: u32) -> Self {
        Self {
            inner: Mutex::new(ReadinessInner {
                ready: true,
                count: 0,
                threshold: default_threshold,
            }),
            default_threshold,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReadinessInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer a probe request, healing once the threshold is reached.
    pub fn check(&self) -> ReadinessCheck {
        let mut inner = self.lock();
        if inner.ready {
            return ReadinessCheck::Ready;
        }
        if inner.count == inner.threshold {
            inner.count = 0;
            self.flip(&mut inner, None);
            info!("readiness healed itself");
            return ReadinessCheck::Healed;
        }
        if inner.count < inner.threshold {
            inner.count += 1;
        }
        ReadinessCheck::Unready {
            count: inner.count,
            threshold: inner.threshold,
        }
    }

    /// Flip between ready and unready.
    ///
    /// `threshold` is only consulted when becoming unready; anything that
    /// does not parse as a non-negative integer selects the default.
    pub fn toggle(&self, threshold: Option<&str>) -> ReadinessState {
        let mut inner = self.lock();
        self.flip(&mut inner, threshold)
    }

    /// Become ready unless already ready.
    pub fn become_ready(&self) -> Transition<ReadinessState> {
        let mut inner = self.lock();
        if inner.ready {
            return Transition::Already(ReadinessState::Ready);
        }
        Transition::Switched(self.flip(&mut inner, None))
    }

    /// Become unready unless already unready.
    ///
    /// A repeated call keeps the running count and threshold.
    pub fn become_unready(&self, threshold: Option<&str>) -> Transition<ReadinessState> {
        let mut inner = self.lock();
        if !inner.ready {
            return Transition::Already(ReadinessState::Unready);
        }
        Transition::Switched(self.flip(&mut inner, threshold))
    }

    pub fn state(&self) -> ReadinessState {
        if self.lock().ready {
            ReadinessState::Ready
        } else {
            ReadinessState::Unready
        }
    }

    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    /// Threshold of the current (or most recent) unready period.
    pub fn healing_threshold(&self) -> u32 {
        self.lock().threshold
    }

    fn flip(&self, inner: &mut ReadinessInner, threshold: Option<&str>) -> ReadinessState {
        inner.ready = !inner.ready;
        if inner.ready {
            inner.count = 0;
            info!("readiness switched to ready");
            ReadinessState::Ready
        } else {
            inner.threshold = self.parse_threshold(threshold);
            info!(threshold = inner.threshold, "readiness switched to unready");
            ReadinessState::Unready
        }
    }

    fn parse_threshold(&self, raw: Option<&str>) -> u32 {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            debug!(default = self.default_threshold, "no healing threshold given");
            return self.default_threshold;
        };
        match raw.parse::<u32>() {
            Ok(threshold) => threshold,
            Err(e) => {
                warn!(
                    input = raw,
                    error = %e,
                    default = self.default_threshold,
                    "invalid healing threshold, using default"
                );
                self.default_threshold
            }
        }
    }
}
