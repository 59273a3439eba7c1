use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::memory::LoadPolicy;
use crate::sequencer::Phase;
use crate::{Error, Result};

const MAX_PHASE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    /// Shared instruction/data memory on one bus.
    #[default]
    Unified,
    /// Separate instruction and data memories.
    Split,
}

impl Architecture {
    /// The split layout fetches and touches data over separate paths, so its
    /// phases are shorter.
    pub fn default_timings(self) -> PhaseTimings {
        match self {
            Architecture::Unified => PhaseTimings {
                fetch_ms: 900,
                decode_ms: 700,
                execute_ms: 900,
                writeback_ms: 250,
            },
            Architecture::Split => PhaseTimings {
                fetch_ms: 600,
                decode_ms: 450,
                execute_ms: 600,
                writeback_ms: 150,
            },
        }
    }

    pub fn default_load_policy(self) -> LoadPolicy {
        match self {
            Architecture::Unified => LoadPolicy::Append,
            Architecture::Split => LoadPolicy::Overwrite,
        }
    }
}

/// Minimum time spent in each phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTimings {
    pub fetch_ms: u64,
    pub decode_ms: u64,
    pub execute_ms: u64,
    /// Covers the PC update and the gap before the next fetch.
    pub writeback_ms: u64,
}

impl PhaseTimings {
    pub fn duration(&self, phase: Phase) -> Duration {
        Duration::from_millis(match phase {
            Phase::Fetch => self.fetch_ms,
            Phase::Decode => self.decode_ms,
            Phase::Execute => self.execute_ms,
            Phase::Writeback => self.writeback_ms,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MachineConfig {
    #[serde(default)]
    pub architecture: Architecture,
    #[serde(default)]
    pub timings: Option<PhaseTimings>,
    #[serde(default)]
    pub load_policy: Option<LoadPolicy>,
}

impl MachineConfig {
    pub fn new(architecture: Architecture) -> Self {
        Self { architecture, ..Default::default() }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let config: MachineConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(t) = &self.timings {
            for phase in Phase::ALL {
                if t.duration(phase) > MAX_PHASE {
                    return Err(Error::Config(format!(
                        "{} phase longer than {}s",
                        phase,
                        MAX_PHASE.as_secs()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn timings(&self) -> PhaseTimings {
        self.timings.unwrap_or_else(|| self.architecture.default_timings())
    }

    pub fn load_policy(&self) -> LoadPolicy {
        self.load_policy.unwrap_or_else(|| self.architecture.default_load_policy())
    }
}
