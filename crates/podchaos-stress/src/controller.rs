//! Stress controller — escalating load sessions.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

use podchaos_core::{ChaosResult, StressConfig};

use crate::generator::{LoadGenerator, LoadSpec};
use crate::registry::ProcessRegistry;

/// Intensity after a stop; the next start runs one step above it.
const BASELINE_INTENSITY: u32 = 1;

/// One running load generator started by [`StressController::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StressSession {
    pub intensity: u32,
    pub pid: u32,
    pub duration: Option<Duration>,
    /// Rendered command line, for reports.
    pub command: String,
}

#[derive(Debug)]
struct StressState {
    intensity: u32,
    session: Option<StressSession>,
}

/// Result of a successful start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartReport {
    pub session: StressSession,
    /// Stray load generators killed before starting.
    pub strays_killed: usize,
}

impl fmt::Display for StartReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "started '{}' with pid {} at intensity {}",
            self.session.command, self.session.pid, self.session.intensity
        )?;
        match self.session.duration {
            Some(d) => write!(f, " for {}s", d.as_secs()),
            None => write!(f, " until stopped"),
        }
    }
}

/// Result of a stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    /// The tracked session, if one was running.
    pub stopped: Option<StressSession>,
    /// Untracked load generators killed by the sweep.
    pub strays_killed: usize,
}

impl fmt::Display for StopReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.stopped {
            Some(session) => write!(
                f,
                "stopped '{}' with pid {}",
                session.command, session.pid
            )?,
            None => write!(f, "nothing to stop")?,
        }
        if self.strays_killed > 0 {
            write!(f, ", killed {} stray processes", self.strays_killed)?;
        }
        Ok(())
    }
}

/// Ground truth from the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StressStatus {
    pub program: String,
    /// Live processes running the load generator.
    pub running: usize,
    /// Intensity of the most recent start, or the baseline.
    pub intensity: u32,
}

impl fmt::Display for StressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.running {
            0 => write!(f, "no '{}' command started", self.program),
            n => write!(f, "{n} '{}' commands started", self.program),
        }
    }
}

/// Starts, escalates and stops load generator sessions.
///
/// `start` and `stop` run under one mutex so concurrent requests can never
/// leave two tracked sessions alive.
pub struct StressController {
    state: Mutex<StressState>,
    generator: Arc<dyn LoadGenerator>,
    registry: Arc<dyn ProcessRegistry>,
    units_per_intensity: u32,
}

impl StressController {
    pub fn new(
        config: &StressConfig,
        generator: Arc<dyn LoadGenerator>,
        registry: Arc<dyn ProcessRegistry>,
    ) -> Self {
        Self {
            state: Mutex::new(StressState {
                intensity: BASELINE_INTENSITY,
                session: None,
            }),
            generator,
            registry,
            units_per_intensity: config.units_per_intensity,
        }
    }

    /// Replace any running session with one a step more intense.
    ///
    /// On spawn failure the intensity is left unchanged.
    pub async fn start(&self, duration: Option<Duration>) -> ChaosResult<StartReport> {
        let mut state = self.state.lock().await;

        if let Some(previous) = state.session.take() {
            info!(pid = previous.pid, intensity = previous.intensity, "replacing stress session");
            self.terminate_tree(previous.pid);
        }
        let strays_killed = self.sweep_strays();

        let spec = LoadSpec {
            intensity: state.intensity + 1,
            units_per_intensity: self.units_per_intensity,
            duration,
        };
        let pid = self.generator.spawn(&spec)?;

        let command = self.generator.command_line(&spec);
        let session = StressSession {
            intensity: spec.intensity,
            pid,
            duration,
            command,
        };

        state.intensity = spec.intensity;
        state.session = Some(session.clone());

        info!(
            pid,
            intensity = spec.intensity,
            workers = spec.workers(),
            duration_secs = duration.map(|d| d.as_secs()),
            "stress session started"
        );

        Ok(StartReport {
            session,
            strays_killed,
        })
    }

    /// Stop the tracked session and sweep strays. Never fails.
    pub async fn stop(&self) -> StopReport {
        let mut state = self.state.lock().await;

        let stopped = state.session.take();
        if let Some(session) = &stopped {
            self.terminate_tree(session.pid);
            state.intensity = BASELINE_INTENSITY;
            info!(pid = session.pid, command = %session.command, "stress session stopped");
        }
        let strays_killed = self.sweep_strays();

        StopReport {
            stopped,
            strays_killed,
        }
    }

    /// Count live load generators in the process table.
    pub async fn status(&self) -> StressStatus {
        let intensity = self.state.lock().await.intensity;
        let program = self.generator.signature().to_string();
        let running = self.registry.find_by_signature(&program).len();
        StressStatus {
            program,
            running,
            intensity,
        }
    }

    /// Kill the children of `pid`, then `pid` itself.
    fn terminate_tree(&self, pid: u32) {
        for child in self.registry.children_of(pid) {
            self.terminate_logged(child.pid);
        }
        self.terminate_logged(pid);
    }

    /// Kill every remaining load generator. Returns how many were killed.
    fn sweep_strays(&self) -> usize {
        self.registry
            .find_by_signature(self.generator.signature())
            .into_iter()
            .filter(|entry| self.terminate_logged(entry.pid))
            .count()
    }

    fn terminate_logged(&self, pid: u32) -> bool {
        match self.registry.terminate(pid) {
            Ok(()) => true,
            Err(e) => {
                warn!(pid, error = %e, "failed to kill process");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

    use podchaos_core::ChaosError;

    use super::*;
    use crate::registry::ProcessEntry;

    /// In-memory process table.
    #[derive(Default)]
    struct FakeRegistry {
        processes: StdMutex<Vec<ProcessEntry>>,
        terminated: StdMutex<Vec<u32>>,
        unkillable: StdMutex<HashSet<u32>>,
        scans: AtomicUsize,
    }

    impl FakeRegistry {
        fn insert(&self, pid: u32, parent: Option<u32>, name: &str) {
            self.processes.lock().unwrap().push(ProcessEntry {
                pid,
                parent,
                name: name.to_string(),
            });
        }

        fn terminated(&self) -> Vec<u32> {
            self.terminated.lock().unwrap().clone()
        }
    }

    impl ProcessRegistry for FakeRegistry {
        fn find_by_signature(&self, signature: &str) -> Vec<ProcessEntry> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            self.processes
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.name == signature)
                .cloned()
                .collect()
        }

        fn children_of(&self, pid: u32) -> Vec<ProcessEntry> {
            self.processes
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.parent == Some(pid))
                .cloned()
                .collect()
        }

        fn terminate(&self, pid: u32) -> ChaosResult<()> {
            self.terminated.lock().unwrap().push(pid);
            if self.unkillable.lock().unwrap().contains(&pid) {
                return Err(ChaosError::SystemError(format!("EPERM for {pid}")));
            }
            self.processes.lock().unwrap().retain(|p| p.pid != pid);
            Ok(())
        }
    }

    /// Pretends to spawn `stress` with two forked workers.
    struct FakeGenerator {
        registry: Arc<FakeRegistry>,
        program: String,
        next_pid: AtomicU32,
        fail: AtomicBool,
        spawned: StdMutex<Vec<LoadSpec>>,
    }

    impl FakeGenerator {
        fn new(registry: Arc<FakeRegistry>) -> Self {
            Self::with_program(registry, "stress")
        }

        fn with_program(registry: Arc<FakeRegistry>, program: &str) -> Self {
            Self {
                registry,
                program: program.to_string(),
                next_pid: AtomicU32::new(100),
                fail: AtomicBool::new(false),
                spawned: StdMutex::new(Vec::new()),
            }
        }
    }

    impl LoadGenerator for FakeGenerator {
        fn spawn(&self, spec: &LoadSpec) -> ChaosResult<u32> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ChaosError::SystemError("stress: not found".into()));
            }
            let pid = self.next_pid.fetch_add(10, Ordering::SeqCst);
            self.registry.insert(pid, Some(1), "stress");
            self.registry.insert(pid + 1, Some(pid), "stress");
            self.registry.insert(pid + 2, Some(pid), "stress");
            self.spawned.lock().unwrap().push(spec.clone());
            Ok(pid)
        }

        fn program(&self) -> &str {
            &self.program
        }
    }

    fn setup() -> (StressController, Arc<FakeRegistry>, Arc<FakeGenerator>) {
        let registry = Arc::new(FakeRegistry::default());
        let generator = Arc::new(FakeGenerator::new(registry.clone()));
        let controller =
            StressController::new(&StressConfig::default(), generator.clone(), registry.clone());
        (controller, registry, generator)
    }

    #[tokio::test]
    async fn repeated_starts_escalate() {
        let (controller, _registry, generator) = setup();

        let mut intensities = Vec::new();
        for _ in 0..3 {
            intensities.push(controller.start(None).await.unwrap().session.intensity);
        }
        assert_eq!(intensities, vec![2, 3, 4]);

        let workers: Vec<u32> = generator
            .spawned
            .lock()
            .unwrap()
            .iter()
            .map(LoadSpec::workers)
            .collect();
        assert_eq!(workers, vec![20, 30, 40]);
    }

    #[tokio::test]
    async fn stop_resets_escalation() {
        let (controller, _registry, _generator) = setup();
        controller.start(None).await.unwrap();
        controller.start(None).await.unwrap();
        controller.stop().await;

        let report = controller.start(None).await.unwrap();
        assert_eq!(report.session.intensity, 2);
    }

    #[tokio::test]
    async fn start_replaces_previous_session() {
        let (controller, registry, _generator) = setup();
        let first = controller.start(None).await.unwrap().session;
        let second = controller.start(None).await.unwrap().session;

        let terminated = registry.terminated();
        // Workers before the parent.
        assert_eq!(terminated[..3], [first.pid + 1, first.pid + 2, first.pid]);
        assert!(!terminated.contains(&second.pid));
        assert_eq!(controller.status().await.running, 3);
    }

    #[tokio::test]
    async fn stop_kills_children_before_parent() {
        let (controller, registry, _generator) = setup();
        let session = controller.start(Some(Duration::from_secs(30))).await.unwrap().session;

        let report = controller.stop().await;
        assert_eq!(report.stopped, Some(session.clone()));
        assert_eq!(report.strays_killed, 0);
        assert_eq!(
            registry.terminated(),
            vec![session.pid + 1, session.pid + 2, session.pid]
        );
        assert_eq!(controller.status().await.running, 0);
    }

    #[tokio::test]
    async fn stop_without_session_only_sweeps() {
        let (controller, registry, _generator) = setup();

        let report = controller.stop().await;
        assert_eq!(report.stopped, None);
        assert_eq!(report.to_string(), "nothing to stop");
        assert!(registry.terminated().is_empty());
        assert!(registry.scans.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn command_path_matches_by_file_name() {
        let registry = Arc::new(FakeRegistry::default());
        let generator = Arc::new(FakeGenerator::with_program(
            registry.clone(),
            "/usr/local/bin/stress",
        ));
        let config = StressConfig {
            command: "/usr/local/bin/stress".to_string(),
            ..StressConfig::default()
        };
        let controller = StressController::new(&config, generator, registry.clone());
        registry.insert(7, Some(1), "stress");

        let status = controller.status().await;
        assert_eq!(status.running, 1);
        assert_eq!(status.to_string(), "1 'stress' commands started");

        let report = controller.stop().await;
        assert_eq!(report.strays_killed, 1);
        assert_eq!(registry.terminated(), vec![7]);
    }

    #[tokio::test]
    async fn stop_sweeps_strays_from_earlier_runs() {
        let (controller, registry, _generator) = setup();
        registry.insert(7, Some(1), "stress");
        registry.insert(8, Some(7), "stress");
        registry.insert(9, Some(1), "postgres");

        let report = controller.stop().await;
        assert_eq!(report.strays_killed, 2);
        assert_eq!(report.to_string(), "nothing to stop, killed 2 stray processes");
        assert_eq!(registry.terminated(), vec![7, 8]);
    }

    #[tokio::test]
    async fn kill_failures_do_not_abort_cleanup() {
        let (controller, registry, _generator) = setup();
        registry.insert(7, Some(1), "stress");
        registry.insert(8, Some(1), "stress");
        registry.unkillable.lock().unwrap().insert(7);

        let report = controller.stop().await;
        assert_eq!(report.strays_killed, 1);
        assert_eq!(registry.terminated(), vec![7, 8]);
        assert_eq!(controller.status().await.running, 1);
    }

    #[tokio::test]
    async fn spawn_failure_leaves_intensity_unchanged() {
        let (controller, _registry, generator) = setup();
        controller.start(None).await.unwrap();

        generator.fail.store(true, Ordering::SeqCst);
        let err = controller.start(None).await.unwrap_err();
        assert!(matches!(err, ChaosError::SystemError(_)));
        assert_eq!(controller.status().await.intensity, 2);

        generator.fail.store(false, Ordering::SeqCst);
        assert_eq!(controller.start(None).await.unwrap().session.intensity, 3);
    }

    #[tokio::test]
    async fn status_reflects_process_table_not_bookkeeping() {
        let (controller, registry, _generator) = setup();
        let session = controller.start(None).await.unwrap().session;
        assert_eq!(controller.status().await.to_string(), "3 'stress' commands started");

        // The session timed out on its own.
        registry.processes.lock().unwrap().clear();
        let status = controller.status().await;
        assert_eq!(status.running, 0);
        assert_eq!(status.to_string(), "no 'stress' command started");

        // Bookkeeping still knows the session, so stop reports it.
        assert_eq!(controller.stop().await.stopped.map(|s| s.pid), Some(session.pid));
    }

    #[tokio::test]
    async fn concurrent_starts_track_one_session() {
        let (controller, _registry, _generator) = setup();
        let controller = Arc::new(controller);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let c = controller.clone();
            handles.push(tokio::spawn(async move { c.start(None).await.unwrap() }));
        }
        let mut intensities = Vec::new();
        for h in handles {
            intensities.push(h.await.unwrap().session.intensity);
        }
        intensities.sort_unstable();
        assert_eq!(intensities, (2..=9).collect::<Vec<_>>());

        // Only the last session's parent and workers survive.
        assert_eq!(controller.status().await.running, 3);
    }

    #[test]
    fn report_rendering() {
        let session = StressSession {
            intensity: 2,
            pid: 42,
            duration: Some(Duration::from_secs(60)),
            command: "stress --cpu 20 --io 20 --vm 20 --hdd 20 --timeout 60s".to_string(),
        };
        let start = StartReport {
            session: session.clone(),
            strays_killed: 0,
        };
        assert_eq!(
            start.to_string(),
            "started 'stress --cpu 20 --io 20 --vm 20 --hdd 20 --timeout 60s' with pid 42 at intensity 2 for 60s"
        );
        let stop = StopReport {
            stopped: Some(session),
            strays_killed: 0,
        };
        assert_eq!(
            stop.to_string(),
            "stopped 'stress --cpu 20 --io 20 --vm 20 --hdd 20 --timeout 60s' with pid 42"
        );
    }
}
