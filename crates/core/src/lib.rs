//! # Triad Core
//!
//! The pipeline engine: stage skills, run orchestration, the completion
//! gateway and conversation storage.
//!
//! ## Architecture
//!
//! - `gateway/` - OpenAI-compatible completion client behind a trait
//! - `skills/` - One skill per stage (Planner, Dispatch, Simplifier, Validator, Synthesizer)
//! - `state/` - Pipeline state, SQLite database and conversation store
//! - `swarm/` - Orchestrator, phase machine and event stream
//!
//! ## Usage
//!
//! ```rust,ignore
//! use triad_core::swarm::{Orchestrator, RunRequest};
//!
//! let orchestrator = Orchestrator::new(gateway, store, config.pipeline);
//! let outcome = orchestrator.run(RunRequest::new("How can a city reduce traffic?")).await?;
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod skills;
pub mod state;
pub mod swarm;

pub use config::{PipelineConfig, TriadConfig};
pub use error::{ConfigError, ParseError, PersistenceError, ProviderError, RunError};
