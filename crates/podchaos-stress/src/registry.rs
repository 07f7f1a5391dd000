//! Process table access for the stress controller.
//!
//! [`SysinfoRegistry`] scans the live process table and force-kills with
//! `SIGKILL`. Tests substitute an in-memory registry.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};
use tracing::debug;

use podchaos_core::{ChaosError, ChaosResult};

/// A live process as seen in the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub parent: Option<u32>,
    pub name: String,
}

/// Capability to inspect and terminate OS processes.
pub trait ProcessRegistry: Send + Sync {
    /// Live processes whose executable is named `signature`.
    fn find_by_signature(&self, signature: &str) -> Vec<ProcessEntry>;

    /// Live direct children of `pid`.
    fn children_of(&self, pid: u32) -> Vec<ProcessEntry>;

    /// Force-terminate `pid`. A process that is already gone is not an error.
    fn terminate(&self, pid: u32) -> ChaosResult<()>;
}

/// Process registry backed by `sysinfo` and `nix`.
pub struct SysinfoRegistry {
    system: Mutex<System>,
}

impl std::fmt::Debug for SysinfoRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysinfoRegistry").finish_non_exhaustive()
    }
}

impl Default for SysinfoRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoRegistry {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    /// Refresh the process table and collect entries matching `filter`.
    fn scan(&self, filter: impl Fn(&Process) -> bool) -> Vec<ProcessEntry> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_exe(UpdateKind::OnlyIfNotSet),
        );

        let mut entries: Vec<ProcessEntry> = system
            .processes()
            .values()
            // Killed workers linger as zombies until reaped; they hold no load.
            .filter(|p| p.status() != ProcessStatus::Zombie)
            .filter(|p| filter(*p))
            .map(|p| ProcessEntry {
                pid: p.pid().as_u32(),
                parent: p.parent().map(Pid::as_u32),
                name: p.name().to_string_lossy().into_owned(),
            })
            .collect();
        entries.sort_by_key(|e| e.pid);
        entries
    }
}

/// Whether `process` runs the executable `signature`.
///
/// Falls back to the process name when the executable path is unreadable
/// (processes of other users).
fn matches_signature(exe: Option<&Path>, name: &OsStr, signature: &str) -> bool {
    match exe {
        Some(path) if !path.as_os_str().is_empty() => path.file_name() == Some(OsStr::new(signature)),
        _ => name == OsStr::new(signature),
    }
}

impl ProcessRegistry for SysinfoRegistry {
    fn find_by_signature(&self, signature: &str) -> Vec<ProcessEntry> {
        self.scan(|p| matches_signature(p.exe(), p.name(), signature))
    }

    fn children_of(&self, pid: u32) -> Vec<ProcessEntry> {
        self.scan(|p| p.parent().map(Pid::as_u32) == Some(pid))
    }

    #[cfg(unix)]
    fn terminate(&self, pid: u32) -> ChaosResult<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, kill};

        let raw = i32::try_from(pid)
            .map_err(|_| ChaosError::InvalidArgument(format!("pid {pid} out of range")))?;
        match kill(nix::unistd::Pid::from_raw(raw), Signal::SIGKILL) {
            Ok(()) => {
                debug!(pid, "sent SIGKILL");
                Ok(())
            }
            Err(Errno::ESRCH) => {
                debug!(pid, "process already exited");
                Ok(())
            }
            Err(e) => Err(ChaosError::SystemError(format!("failed to kill pid {pid}: {e}"))),
        }
    }

    #[cfg(not(unix))]
    fn terminate(&self, pid: u32) -> ChaosResult<()> {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        let sys_pid = Pid::from_u32(pid);
        system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);
        match system.process(sys_pid) {
            Some(process) if !process.kill() => {
                Err(ChaosError::SystemError(format!("failed to kill pid {pid}")))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_executable_file_name() {
        let name = OsStr::new("whatever");
        assert!(matches_signature(Some(Path::new("/usr/bin/stress")), name, "stress"));
        assert!(!matches_signature(Some(Path::new("/usr/bin/stress-ng")), name, "stress"));
        assert!(!matches_signature(Some(Path::new("/opt/stress/bin/other")), name, "stress"));
    }

    #[test]
    fn signature_falls_back_to_name() {
        assert!(matches_signature(None, OsStr::new("stress"), "stress"));
        assert!(matches_signature(Some(Path::new("")), OsStr::new("stress"), "stress"));
        assert!(!matches_signature(None, OsStr::new("bash"), "stress"));
    }

    #[test]
    fn scan_finds_no_unknown_program() {
        let registry = SysinfoRegistry::new();
        assert!(registry
            .find_by_signature("podchaos-no-such-load-generator")
            .is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn terminate_kills_a_live_process() {
        use std::os::unix::process::ExitStatusExt;

        let registry = SysinfoRegistry::new();
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();
        assert_eq!(registry.scan(|p| p.pid().as_u32() == pid).len(), 1);

        registry.terminate(pid).unwrap();
        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(9));
        assert!(registry.scan(|p| p.pid().as_u32() == pid).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn children_of_finds_forked_worker() {
        let registry = SysinfoRegistry::new();
        let mut parent = std::process::Command::new("sh")
            .args(["-c", "sleep 30 & wait"])
            .spawn()
            .unwrap();
        let pid = parent.id();

        let mut children = Vec::new();
        for _ in 0..100 {
            children = registry.children_of(pid);
            if !children.is_empty() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert_eq!(children.len(), 1, "no child under {pid}");
        assert_eq!(children[0].parent, Some(pid));

        for child in &children {
            registry.terminate(child.pid).unwrap();
        }
        registry.terminate(pid).unwrap();
        parent.wait().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn terminating_a_vanished_pid_is_ok() {
        let registry = SysinfoRegistry::new();
        // Above the default pid_max, so nothing can be running there.
        assert!(registry.terminate(4_194_303 + 1).is_ok());
    }
}
