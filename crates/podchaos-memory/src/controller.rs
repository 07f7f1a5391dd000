//! Memory pressure controller and its convergence loop.
//!
//! [`MemoryPressureController`] is the handle shared with request handlers.
//! [`PressureLoop`] owns the arena and runs on its own task until the
//! controller signals shutdown.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use podchaos_core::{ChaosError, ChaosResult, MemoryConfig};

use crate::arena::MemoryArena;
use crate::stats::MemoryStats;

/// Target and last observation, shared between handlers and the loop.
#[derive(Debug)]
struct PressureGauge {
    target: AtomicU32,
    observed: AtomicU32,
}

/// What one loop iteration decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Observed usage is inside the band.
    Hold,
    /// Observed usage is above the band; the arena was dropped.
    Release,
    /// Observed usage is below the band; one block was added.
    Grow,
}

/// Snapshot rendered by `/memory`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStatus {
    pub observed_percent: u32,
    pub target_percent: u32,
}

impl fmt::Display for MemoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}'% of maximal '{}'%",
            self.observed_percent, self.target_percent
        )
    }
}

/// The hysteresis loop. Owns the arena exclusively.
pub struct PressureLoop<S> {
    stats: S,
    arena: MemoryArena,
    gauge: Arc<PressureGauge>,
    tolerance: u32,
    hold_interval: Duration,
    release_interval: Duration,
}

impl<S: MemoryStats> PressureLoop<S> {
    fn new(stats: S, gauge: Arc<PressureGauge>, config: &MemoryConfig) -> Self {
        Self {
            stats,
            arena: MemoryArena::new(config.block_bytes),
            gauge,
            tolerance: u32::from(config.tolerance_percent),
            hold_interval: config.hold_interval(),
            release_interval: config.release_interval(),
        }
    }

    /// Run one iteration: sample, compare against the band, act.
    ///
    /// Sleeping is left to [`run`](Self::run) so ticks can be driven
    /// directly.
    pub fn tick(&mut self) -> TickAction {
        let sample = self.stats.sample();
        let Some(observed) = sample.percent() else {
            warn!(used_bytes = sample.used_bytes, "memory allowance unknown, holding");
            return TickAction::Hold;
        };
        self.gauge.observed.store(observed, Ordering::Relaxed);
        let target = self.gauge.target.load(Ordering::Relaxed);

        if observed > target.saturating_add(self.tolerance) {
            debug!(
                observed,
                target,
                blocks = self.arena.len(),
                "memory above band, releasing arena"
            );
            self.arena.release();
            TickAction::Release
        } else if observed.saturating_add(self.tolerance) < target {
            self.arena.grow();
            trace!(observed, target, bytes = self.arena.bytes(), "memory below band, growing");
            TickAction::Grow
        } else {
            TickAction::Hold
        }
    }

    /// Number of blocks currently held.
    pub fn blocks(&self) -> usize {
        self.arena.len()
    }

    /// Loop until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        debug!("memory pressure loop starting");

        loop {
            let pause = match self.tick() {
                TickAction::Hold => Some(self.hold_interval),
                TickAction::Release => Some(self.release_interval),
                TickAction::Grow => None,
            };

            match pause {
                Some(interval) => {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {}
                        _ = shutdown.changed() => break,
                    }
                }
                None => {
                    if *shutdown.borrow() || shutdown.has_changed().is_err() {
                        break;
                    }
                    tokio::task::yield_now().await;
                }
            }
        }

        self.arena.release();
        debug!("memory pressure loop stopped");
    }
}

/// Handle to the memory pressure loop.
pub struct MemoryPressureController {
    gauge: Arc<PressureGauge>,
    idle_percent: u32,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryPressureController {
    /// Start the convergence loop on the current tokio runtime.
    pub fn spawn<S: MemoryStats>(config: &MemoryConfig, stats: S) -> ChaosResult<Self> {
        let initial = validate_percent(i64::from(config.initial_percent))?;
        let idle_percent = validate_percent(i64::from(config.idle_percent))?;

        let gauge = Arc::new(PressureGauge {
            target: AtomicU32::new(initial),
            observed: AtomicU32::new(0),
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let pressure_loop = PressureLoop::new(stats, gauge.clone(), config);
        let handle = tokio::spawn(pressure_loop.run(shutdown_rx));

        info!(
            target_percent = initial,
            tolerance = config.tolerance_percent,
            block_bytes = config.block_bytes,
            "memory pressure controller started"
        );

        Ok(Self {
            gauge,
            idle_percent,
            shutdown_tx,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Set the target utilization in percent.
    ///
    /// Values outside `[0, 100]` are rejected and leave the target unchanged.
    pub fn set_target(&self, percent: i64) -> ChaosResult<()> {
        let percent = validate_percent(percent)?;
        self.gauge.target.store(percent, Ordering::Relaxed);
        info!(target_percent = percent, "memory target updated");
        Ok(())
    }

    /// Return the target to the idle level.
    pub fn release(&self) {
        self.gauge.target.store(self.idle_percent, Ordering::Relaxed);
        info!(target_percent = self.idle_percent, "memory target reset to idle");
    }

    pub fn target_percent(&self) -> u32 {
        self.gauge.target.load(Ordering::Relaxed)
    }

    pub fn observed_percent(&self) -> u32 {
        self.gauge.observed.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> MemoryStatus {
        MemoryStatus {
            observed_percent: self.observed_percent(),
            target_percent: self.target_percent(),
        }
    }

    /// Stop the loop and wait for it to drop its arena.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.lock().await.take() {
            let _ = handle.await;
            info!("memory pressure controller stopped");
        }
    }
}

fn validate_percent(percent: i64) -> ChaosResult<u32> {
    if !(0..=100).contains(&percent) {
        return Err(ChaosError::InvalidArgument(format!(
            "{percent} is not a percentage within [0, 100]"
        )));
    }
    Ok(percent as u32)
}
