//! # Pipeline State
//!
//! The per-run record threaded through every stage. Stages never mutate it;
//! they return a [`StateDelta`] that [`PipelineState::apply`] folds in.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One delegated sub-task, bound to a persona by position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentTask {
    pub agent_name: String,
    pub task: String,
}

impl AgentTask {
    pub fn new(agent_name: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            task: task.into(),
        }
    }
}

/// State of a single run
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PipelineState {
    pub user_prompt: String,
    pub thread_id: String,
    /// Planner rationale, or a diagnostic when planning failed
    pub plan: String,
    pub tasks: Vec<AgentTask>,
    pub raw_outputs: HashMap<String, String>,
    pub simplified_outputs: HashMap<String, String>,
    pub scores: HashMap<String, u8>,
    pub iteration_count: u32,
    pub final_answer: String,
}

/// What a stage produced
#[derive(Debug, Clone, PartialEq)]
pub enum StateDelta {
    /// Plan stage result; `tasks` is empty on failure
    Planned { plan: String, tasks: Vec<AgentTask> },
    /// Raw agent outputs, set once
    Dispatched { raw_outputs: HashMap<String, String> },
    /// Only the agents re-simplified this iteration
    Simplified { updates: HashMap<String, String> },
    /// Full score table for this iteration; completes the iteration
    Validated { scores: HashMap<String, u8> },
    Synthesized { final_answer: String },
}

impl PipelineState {
    pub fn new(user_prompt: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            user_prompt: user_prompt.into(),
            thread_id: thread_id.into(),
            ..Self::default()
        }
    }

    /// Fold a stage result into the state
    pub fn apply(mut self, delta: StateDelta) -> Self {
        match delta {
            StateDelta::Planned { plan, tasks } => {
                self.plan = plan;
                self.tasks = tasks;
            }
            StateDelta::Dispatched { raw_outputs } => {
                if self.raw_outputs.is_empty() {
                    self.raw_outputs = raw_outputs;
                } else {
                    tracing::warn!("Ignoring second dispatch result; raw outputs are set once");
                }
            }
            StateDelta::Simplified { updates } => {
                let known = self.agent_names();
                for (agent, text) in updates {
                    if known.contains(&agent) {
                        self.simplified_outputs.insert(agent, text);
                    }
                }
            }
            StateDelta::Validated { scores } => {
                let known = self.agent_names();
                self.scores = scores
                    .into_iter()
                    .filter(|(agent, _)| known.contains(agent))
                    .collect();
                self.iteration_count += 1;
            }
            StateDelta::Synthesized { final_answer } => {
                self.final_answer = final_answer;
            }
        }
        self
    }

    /// Agent names in task order
    pub fn agent_names(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.agent_name.clone()).collect()
    }

    pub fn has_tasks(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Whether any current score falls below `threshold`
    pub fn any_below(&self, threshold: u8) -> bool {
        self.scores.values().any(|score| *score < threshold)
    }
}
