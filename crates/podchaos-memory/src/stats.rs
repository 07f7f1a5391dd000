//! Memory statistics sources.
//!
//! The pressure loop only needs "how much is used" and "how much is
//! allowed". [`SysinfoStats`] answers from the OS; tests substitute a
//! scripted source.

use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::debug;

/// One reading of the process memory budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySample {
    /// Resident bytes attributed to this process.
    pub used_bytes: u64,
    /// Bytes the process is allowed to use.
    pub limit_bytes: u64,
}

impl MemorySample {
    /// Used fraction of the allowance, truncated to whole percent and
    /// saturating at `u32::MAX`.
    ///
    /// `None` when the allowance is unknown (zero).
    pub fn percent(&self) -> Option<u32> {
        if self.limit_bytes == 0 {
            return None;
        }
        let percent = self.used_bytes.saturating_mul(100) / self.limit_bytes;
        Some(u32::try_from(percent).unwrap_or(u32::MAX))
    }
}

/// Source of memory samples for the pressure loop.
pub trait MemoryStats: Send + 'static {
    fn sample(&mut self) -> MemorySample;
}

/// Reads process RSS and the effective memory allowance via `sysinfo`.
///
/// The allowance is, in order: the configured override, the cgroup memory
/// limit when the container has one, total system memory.
pub struct SysinfoStats {
    system: System,
    pid: Option<Pid>,
    limit_override: Option<u64>,
}

impl std::fmt::Debug for SysinfoStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysinfoStats")
            .field("pid", &self.pid)
            .field("limit_override", &self.limit_override)
            .finish_non_exhaustive()
    }
}

impl SysinfoStats {
    pub fn new(limit_override: Option<u64>) -> Self {
        let mut system = System::new();
        system.refresh_memory();
        let pid = sysinfo::get_current_pid().ok();
        let stats = Self {
            system,
            pid,
            limit_override,
        };
        debug!(limit_bytes = stats.limit_bytes(), ?pid, "memory statistics source ready");
        stats
    }

    fn limit_bytes(&self) -> u64 {
        if let Some(limit) = self.limit_override {
            return limit;
        }
        let total = self.system.total_memory();
        match self.system.cgroup_limits() {
            Some(cgroup) if cgroup.total_memory > 0 => cgroup.total_memory.min(total),
            _ => total,
        }
    }

    fn used_bytes(&mut self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system.process(pid).map(sysinfo::Process::memory).unwrap_or(0)
    }
}

impl MemoryStats for SysinfoStats {
    fn sample(&mut self) -> MemorySample {
        self.system.refresh_memory();
        MemorySample {
            used_bytes: self.used_bytes(),
            limit_bytes: self.limit_bytes(),
        }
    }
}
