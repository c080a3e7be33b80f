// ==============================================================================
// config.rs - Engine Configuration
// ==============================================================================
// Description: Scheduler, scoring and upload settings loaded from JSON
// Author: Matt Barham
// Created: 2026-10-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Every section is optional in the file; missing keys take their defaults.
// Example:
//   {
//     "scheduler": { "policy": "round_robin", "starvation_limit": 4,
//                    "accelerator": { "batch_size": 4096, "concurrency": 1,
//                                     "enabled": false } },
//     "scoring": { "reference_magnitude": 4.0 },
//     "max_upload_bytes": 104857600,
//     "probe": "occupancy"
//   }
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::scheduler::{OccupancyProbe, SchedulerConfig, SystemLoadProbe, UtilizationProbe};
use crate::scoring::ScoringPolicy;
use crate::validator::DEFAULT_MAX_UPLOAD_BYTES;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Utilization source used by the adaptive policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// Queue occupancy only
    Occupancy,
    /// Queue occupancy scaled by sampled processor load
    #[default]
    System,
}

impl ProbeKind {
    pub fn build(&self) -> Box<dyn UtilizationProbe> {
        match self {
            ProbeKind::Occupancy => Box::new(OccupancyProbe),
            ProbeKind::System => Box::new(SystemLoadProbe::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub scoring: ScoringPolicy,
    pub max_upload_bytes: usize,
    pub probe: ProbeKind,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            scoring: ScoringPolicy::default(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            probe: ProbeKind::default(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a JSON config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let location = path.display().to_string();

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: location.clone(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: location.clone(),
            source,
        })?;
        config.validate()?;

        info!("Loaded engine config from {}", location);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for bounds in self.scoring.bounds() {
            if bounds.floor > bounds.ceiling || bounds.ceiling > 100 {
                return Err(ConfigError::Invalid(format!(
                    "metric bounds [{}, {}] must satisfy floor <= ceiling <= 100",
                    bounds.floor, bounds.ceiling
                )));
            }
        }
        if self.scheduler.scalar_workers == 0 {
            return Err(ConfigError::Invalid("scalar_workers must be at least 1".to_string()));
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid("max_upload_bytes must be positive".to_string()));
        }
        Ok(())
    }
}
