//! # Pipeline Orchestration
//!
//! Coordinates the stage skills for one run.
//!
//! ## Pipeline Flow
//!
//! ```text
//! Prompt → Planner → Task Agents → Simplifier ⟷ Validator → Synthesizer → Store
//! ```

pub mod coordinator;
pub mod events;
pub mod pipeline;

pub use coordinator::{AcceptedRun, Orchestrator, RunOutcome, RunRequest};
pub use events::{EventEmitter, PipelineEvent, Stage};
pub use pipeline::{should_continue, Pipeline, PipelinePhase};
