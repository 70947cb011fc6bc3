//! # Configuration
//!
//! Layered settings: built-in defaults, then an optional JSON file, then
//! environment variables.

use crate::error::ConfigError;
use crate::models::{GatewayConfig, StageModels};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default location of the optional JSON config file
pub const DEFAULT_CONFIG_PATH: &str = ".triad/config.json";

/// Default SQLite database path
pub const DEFAULT_DB_PATH: &str = ".triad/triad.db";

/// Knobs that shape a single pipeline run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Convergence loop iteration cap
    pub max_iterations: u32,
    /// Clarity score an agent must reach to stop being re-simplified
    pub score_threshold: u8,
    /// Persona temperatures, in persona-table order
    pub temperatures: [f32; 3],
    /// Model per stage
    pub models: StageModels,
    /// Deadline for each gateway call
    pub call_timeout_secs: u64,
    /// Maximum per-agent calls in flight within one stage (1 = sequential)
    pub agent_concurrency: usize,
    /// Pause before each convergence loop iteration
    pub loop_delay_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            score_threshold: 8,
            temperatures: [0.0, 0.7, 2.0],
            models: StageModels::default(),
            call_timeout_secs: 120,
            agent_concurrency: 1,
            loop_delay_ms: 500,
        }
    }
}

impl PipelineConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn loop_delay(&self) -> Duration {
        Duration::from_millis(self.loop_delay_ms)
    }

    /// Concurrency clamped to the number of agents
    pub fn effective_concurrency(&self) -> usize {
        self.agent_concurrency.clamp(1, 3)
    }

    /// Reject values a run cannot work with, whichever layer set them
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(key: &'static str, value: impl ToString, reason: &str) -> ConfigError {
            ConfigError::Invalid {
                key,
                value: value.to_string(),
                reason: reason.to_string(),
            }
        }

        if self.max_iterations == 0 {
            return Err(invalid(
                "max_iterations",
                self.max_iterations,
                "at least one iteration is required",
            ));
        }
        if !(1..=10).contains(&self.score_threshold) {
            return Err(invalid(
                "score_threshold",
                self.score_threshold,
                "must be between 1 and 10",
            ));
        }
        if self.temperatures.iter().any(|t| !(0.0..=2.0).contains(t)) {
            return Err(invalid(
                "temperatures",
                format!("{:?}", self.temperatures),
                "temperatures must be within 0.0..=2.0",
            ));
        }
        if self.call_timeout_secs == 0 {
            return Err(invalid(
                "call_timeout_secs",
                self.call_timeout_secs,
                "must be at least one second",
            ));
        }
        Ok(())
    }
}

/// Full application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TriadConfig {
    pub gateway: GatewayConfig,
    pub db_path: PathBuf,
    pub port: u16,
    pub pipeline: PipelineConfig,
}

impl Default for TriadConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            port: 8000,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl TriadConfig {
    /// Load defaults, overlay the JSON file if it exists, then the process environment
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.pipeline.validate()?;
        Ok(config)
    }

    /// Read the JSON file, falling back to defaults when it is absent
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Overlay environment values
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("BASE_URL") {
            self.gateway.base_url = url;
        }
        if let Some(key) = lookup("API_KEY") {
            self.gateway.api_key = key;
        }
        if let Some(path) = lookup("TRIAD_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(port) = parse_var(&lookup, "TRIAD_PORT")? {
            self.port = port;
        }

        let pipeline = &mut self.pipeline;
        if let Some(cap) = parse_var(&lookup, "TRIAD_MAX_ITERATIONS")? {
            pipeline.max_iterations = cap;
        }
        if let Some(threshold) = parse_var(&lookup, "TRIAD_SCORE_THRESHOLD")? {
            pipeline.score_threshold = threshold;
        }
        if let Some(model) = lookup("TRIAD_PLANNER_MODEL") {
            pipeline.models.planner.model = model;
        }
        if let Some(model) = lookup("TRIAD_TASK_MODEL") {
            pipeline.models.task.model = model;
        }
        if let Some(model) = lookup("TRIAD_SYNTHESIS_MODEL") {
            pipeline.models.synthesis.model = model;
        }
        if let Some(secs) = parse_var(&lookup, "TRIAD_CALL_TIMEOUT_SECS")? {
            pipeline.call_timeout_secs = secs;
        }
        if let Some(n) = parse_var(&lookup, "TRIAD_AGENT_CONCURRENCY")? {
            pipeline.agent_concurrency = n;
        }
        if let Some(raw) = lookup("TRIAD_TEMPERATURES") {
            pipeline.temperatures = parse_temperatures(&raw)?;
        }
        Ok(())
    }

    /// Fail fast when a live run is requested without gateway credentials
    pub fn require_gateway(&self) -> Result<&GatewayConfig, ConfigError> {
        if self.gateway.base_url.trim().is_empty() {
            return Err(ConfigError::Missing("BASE_URL"));
        }
        if self.gateway.api_key.trim().is_empty() {
            return Err(ConfigError::Missing("API_KEY"));
        }
        Ok(&self.gateway)
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                key,
                value: raw,
                reason: e.to_string(),
            }),
    }
}

fn parse_temperatures(raw: &str) -> Result<[f32; 3], ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        key: "TRIAD_TEMPERATURES",
        value: raw.to_string(),
        reason,
    };

    let values = raw
        .split(',')
        .map(|part| part.trim().parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| invalid(e.to_string()))?;

    values
        .try_into()
        .map_err(|v: Vec<f32>| invalid(format!("expected 3 values, got {}", v.len())))
}
