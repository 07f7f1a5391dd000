//! podchaos.toml configuration parser.
//!
//! Every section and field is optional; missing values fall back to the
//! defaults the service has always shipped with.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaosConfig {
    pub server: ServerConfig,
    pub memory: MemoryConfig,
    pub stress: StressConfig,
    pub probes: ProbeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Target applied when the controller is created.
    pub initial_percent: u8,
    /// Target applied by `/memory/stop`.
    pub idle_percent: u8,
    /// Half-width of the dead band around the target.
    pub tolerance_percent: u8,
    /// Size of one arena block.
    pub block_bytes: usize,
    /// Pause while inside the band.
    pub hold_interval: String,
    /// Pause after releasing the arena.
    pub release_interval: String,
    /// Explicit memory allowance; detected from cgroup/system when unset.
    pub limit_bytes: Option<u64>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            initial_percent: 5,
            idle_percent: 5,
            tolerance_percent: 2,
            block_bytes: 104_857,
            hold_interval: "100ms".to_string(),
            release_interval: "10ms".to_string(),
            limit_bytes: None,
        }
    }
}

impl MemoryConfig {
    pub fn hold_interval(&self) -> Duration {
        parse_duration(&self.hold_interval).unwrap_or(Duration::from_millis(100))
    }

    pub fn release_interval(&self) -> Duration {
        parse_duration(&self.release_interval).unwrap_or(Duration::from_millis(10))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    /// Load generator executable, also used as the process-table signature.
    pub command: String,
    /// Workers per dimension for each intensity step.
    pub units_per_intensity: u32,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            command: "stress".to_string(),
            units_per_intensity: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Unready checks before readiness heals itself.
    pub healing_threshold: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            healing_threshold: 3,
        }
    }
}

impl ChaosConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        Ok(config)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let config: ChaosConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("memory.initial_percent", self.memory.initial_percent),
            ("memory.idle_percent", self.memory.idle_percent),
        ] {
            anyhow::ensure!(value <= 100, "{name} must be within [0, 100], got {value}");
        }
        anyhow::ensure!(self.memory.block_bytes > 0, "memory.block_bytes must be positive");
        anyhow::ensure!(
            self.memory.limit_bytes != Some(0),
            "memory.limit_bytes must be positive when set"
        );
        anyhow::ensure!(!self.stress.command.trim().is_empty(), "stress.command must not be empty");
        Ok(())
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
