//! # Pipeline Phases
//!
//! The run state machine and the convergence loop decision.
//!
//! ```text
//! Init → Planning ─┬─▶ Aborted
//!                  └─▶ Dispatching → Simplifying ⇄ Validating → Synthesizing → Persisting → Done
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::RunError;

/// Phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    Init,
    Planning,
    /// Planner produced no tasks; terminal, nothing persisted
    Aborted,
    Dispatching,
    Simplifying,
    Validating,
    Synthesizing,
    Persisting,
    Done,
}

impl PipelinePhase {
    /// Whether `self → next` is an edge of the state machine
    pub fn can_transition_to(self, next: PipelinePhase) -> bool {
        use PipelinePhase::*;
        matches!(
            (self, next),
            (Init, Planning)
                | (Planning, Aborted)
                | (Planning, Dispatching)
                | (Dispatching, Simplifying)
                | (Simplifying, Validating)
                | (Validating, Simplifying)
                | (Validating, Synthesizing)
                | (Synthesizing, Persisting)
                | (Persisting, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelinePhase::Aborted | PipelinePhase::Done)
    }
}

/// Phase tracker for one run
#[derive(Debug, Clone)]
pub struct Pipeline {
    phase: PipelinePhase,
    history: Vec<PipelinePhase>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            phase: PipelinePhase::Init,
            history: vec![PipelinePhase::Init],
        }
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> PipelinePhase {
        self.phase
    }

    /// Every phase entered so far, starting with `Init`
    pub fn history(&self) -> &[PipelinePhase] {
        &self.history
    }

    /// Move to `next`, rejecting edges the state machine does not have
    pub fn advance(&mut self, next: PipelinePhase) -> Result<(), RunError> {
        if !self.phase.can_transition_to(next) {
            return Err(RunError::IllegalTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::debug!(from = ?self.phase, to = ?next, "Phase transition");
        self.phase = next;
        self.history.push(next);
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }
}

/// Loop again iff the cap is not reached and some agent scored below the threshold
pub fn should_continue(
    scores: &HashMap<String, u8>,
    iteration_count: u32,
    max_iterations: u32,
    threshold: u8,
) -> bool {
    iteration_count < max_iterations && scores.values().any(|score| *score < threshold)
}
