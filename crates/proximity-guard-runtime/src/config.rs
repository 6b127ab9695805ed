//! JSON session configuration.

use crate::sim::ScenarioError;
use proximity_guard_core::{EstimatorParams, EstimatorParamsError};
use proximity_guard_safety::{SafetyParams, SafetyParamsError};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

#[derive(thiserror::Error, Debug)]
pub enum ConfigIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
}

/// A configuration section that would make the session unsafe or meaningless.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid safety parameters: {0}")]
    Safety(#[from] SafetyParamsError),
    #[error("invalid estimator parameters: {0}")]
    Estimator(#[from] EstimatorParamsError),
}

fn default_detector_timeout_ms() -> u64 {
    100
}

fn default_depth_timeout_ms() -> u64 {
    20
}

fn default_depth_staleness_tolerance_ms() -> u64 {
    50
}

fn default_command_ack_timeout_ms() -> u64 {
    500
}

/// Per-source timeouts and the depth staleness tolerance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingParams {
    /// Longest wait for a detector frame before the tick proceeds without one.
    #[serde(default = "default_detector_timeout_ms")]
    pub detector_timeout_ms: u64,
    /// Longest wait for a single depth sample.
    #[serde(default = "default_depth_timeout_ms")]
    pub depth_timeout_ms: u64,
    /// Depth samples older than this relative to the color frame count as invalid.
    #[serde(default = "default_depth_staleness_tolerance_ms")]
    pub depth_staleness_tolerance_ms: u64,
    /// Longest wait for the arm to acknowledge a command.
    #[serde(default = "default_command_ack_timeout_ms")]
    pub command_ack_timeout_ms: u64,
}

impl Default for TimingParams {
    fn default() -> Self {
        Self {
            detector_timeout_ms: default_detector_timeout_ms(),
            depth_timeout_ms: default_depth_timeout_ms(),
            depth_staleness_tolerance_ms: default_depth_staleness_tolerance_ms(),
            command_ack_timeout_ms: default_command_ack_timeout_ms(),
        }
    }
}

impl TimingParams {
    #[inline]
    pub fn detector_timeout(&self) -> Duration {
        Duration::from_millis(self.detector_timeout_ms)
    }

    #[inline]
    pub fn depth_timeout(&self) -> Duration {
        Duration::from_millis(self.depth_timeout_ms)
    }

    #[inline]
    pub fn command_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.command_ack_timeout_ms)
    }
}

/// Process-wide settings, loaded once before a session starts.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub safety: SafetyParams,
    #[serde(default)]
    pub estimator: EstimatorParams,
    #[serde(default)]
    pub timing: TimingParams,
}

impl SessionConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Check every section; the first failure is reported.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.safety.validate()?;
        self.estimator.validate()?;
        Ok(())
    }
}
