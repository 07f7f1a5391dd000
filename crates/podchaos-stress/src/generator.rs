//! Load generator command construction and spawning.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tracing::debug;

use podchaos_core::{ChaosError, ChaosResult};

/// Resource dimensions the load generator is asked to exercise.
const DIMENSIONS: [&str; 4] = ["--cpu", "--io", "--vm", "--hdd"];

/// Parameters for one load generator invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSpec {
    /// Escalation step, starting at 2 for the first session.
    pub intensity: u32,
    /// Workers per dimension for each intensity step.
    pub units_per_intensity: u32,
    /// Self-termination after this long; runs until stopped when unset.
    pub duration: Option<Duration>,
}

impl LoadSpec {
    /// Workers started for each dimension.
    pub fn workers(&self) -> u32 {
        self.intensity.saturating_mul(self.units_per_intensity)
    }

    /// Command-line arguments, without the program name.
    pub fn args(&self) -> Vec<String> {
        let workers = self.workers().to_string();
        let mut args = Vec::with_capacity(DIMENSIONS.len() * 2 + 2);
        for flag in DIMENSIONS {
            args.push(flag.to_string());
            args.push(workers.clone());
        }
        if let Some(duration) = self.duration {
            args.push("--timeout".to_string());
            args.push(format!("{}s", duration.as_secs()));
        }
        args
    }
}

/// Capability to start a load generator process.
pub trait LoadGenerator: Send + Sync {
    /// Start a process for `spec` and return its pid.
    fn spawn(&self, spec: &LoadSpec) -> ChaosResult<u32>;

    /// Executable as configured, possibly a path.
    fn program(&self) -> &str;

    /// Name running instances carry in the process table: the file name of
    /// [`program`](Self::program).
    fn signature(&self) -> &str {
        let program = self.program();
        Path::new(program)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(program)
    }

    /// Full command line, for logs and responses.
    fn command_line(&self, spec: &LoadSpec) -> String {
        let mut parts = vec![self.program().to_string()];
        parts.extend(spec.args());
        parts.join(" ")
    }
}

/// Spawns the real `stress` binary (or whatever `program` names).
#[derive(Debug, Clone)]
pub struct StressCommand {
    program: String,
}

impl StressCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl LoadGenerator for StressCommand {
    /// Must be called from within a tokio runtime; the runtime reaps the
    /// child once it exits, nothing waits on it here.
    fn spawn(&self, spec: &LoadSpec) -> ChaosResult<u32> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(spec.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);

        debug!(command = %self.command_line(spec), "spawning load generator");

        let child = cmd.spawn().map_err(|e| {
            ChaosError::SystemError(format!("failed to start '{}': {e}", self.program))
        })?;

        child.id().ok_or_else(|| {
            ChaosError::SystemError(format!("'{}' exited before reporting a pid", self.program))
        })
    }

    fn program(&self) -> &str {
        &self.program
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(intensity: u32, duration: Option<Duration>) -> LoadSpec {
        LoadSpec {
            intensity,
            units_per_intensity: 10,
            duration,
        }
    }

    #[test]
    fn args_scale_every_dimension() {
        assert_eq!(
            spec(2, None).args(),
            vec!["--cpu", "20", "--io", "20", "--vm", "20", "--hdd", "20"]
        );
    }

    #[test]
    fn args_append_timeout_when_bounded() {
        let args = spec(3, Some(Duration::from_secs(45))).args();
        assert_eq!(&args[..2], &["--cpu", "30"]);
        assert_eq!(&args[8..], &["--timeout", "45s"]);
    }

    #[test]
    fn zero_duration_still_passes_timeout() {
        let args = spec(2, Some(Duration::ZERO)).args();
        assert_eq!(&args[8..], &["--timeout", "0s"]);
    }

    #[test]
    fn command_line_joins_program_and_args() {
        let cmd = StressCommand::new("stress");
        assert_eq!(
            cmd.command_line(&spec(2, Some(Duration::from_secs(5)))),
            "stress --cpu 20 --io 20 --vm 20 --hdd 20 --timeout 5s"
        );
    }

    #[test]
    fn signature_strips_directories() {
        assert_eq!(StressCommand::new("stress").signature(), "stress");
        assert_eq!(StressCommand::new("/usr/bin/stress").signature(), "stress");
        assert_eq!(StressCommand::new("./bin/stress-ng").signature(), "stress-ng");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawn_returns_the_child_pid() {
        // `sleep` rejects the load flags and exits at once; only the pid matters.
        let cmd = StressCommand::new("sleep");
        let pid = cmd.spawn(&spec(2, None)).unwrap();
        assert!(pid > 0);
        assert_ne!(pid, std::process::id());
    }

    #[tokio::test]
    async fn missing_binary_is_a_system_error() {
        let cmd = StressCommand::new("podchaos-no-such-load-generator");
        let err = cmd.spawn(&spec(2, None)).unwrap_err();
        assert!(matches!(err, ChaosError::SystemError(_)));
        assert!(err.to_string().contains("podchaos-no-such-load-generator"));
    }
}
