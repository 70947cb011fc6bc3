//! # Planner Skill
//!
//! Eleanor reads the user prompt, writes her reasoning, and delegates exactly
//! three tasks. This is the only stage whose failure aborts the run.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_extract::extract_first_object;
use super::llm_helpers::StageContext;
use crate::error::ParseError;
use crate::gateway::CompletionRequest;
use crate::state::pipeline_state::{PipelineState, StateDelta};
use crate::swarm::events::{EventEmitter, PipelineEvent, Stage};

/// Agent label used in events
pub const AGENT: &str = "Eleanor";

pub const TEMPERATURE: f32 = 0.1;

/// Plan diagnostic when the response could not be used
pub const FORMAT_ERROR: &str = "Error in agent's output format or empty response.";

/// One delegated task as the model writes it
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlannedTask {
    /// Advisory only; tasks are bound to personas by position
    #[serde(default)]
    pub agent_name: Option<String>,
    /// The instruction for the agent
    pub task: String,
}

/// Output from the planner
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlanOutput {
    /// Eleanor's reasoning about the problem
    pub thought: String,
    /// Exactly three tasks: factual, practical, exploratory
    pub tasks: Vec<PlannedTask>,
}

impl PlanOutput {
    /// Enforce three tasks with non-empty text
    pub fn into_parts(self) -> Result<(String, [String; 3]), ParseError> {
        if let Some(i) = self.tasks.iter().position(|t| t.task.trim().is_empty()) {
            return Err(ParseError::Schema(format!("task {} is empty", i + 1)));
        }
        let count = self.tasks.len();
        let tasks: [PlannedTask; 3] = self
            .tasks
            .try_into()
            .map_err(|_| ParseError::Schema(format!("expected 3 tasks, got {}", count)))?;
        Ok((self.thought, tasks.map(|t| t.task)))
    }
}

/// Extract, parse and validate a planner response
pub fn parse_plan(raw: &str) -> Result<(String, [String; 3]), ParseError> {
    let object = extract_first_object(raw).ok_or(ParseError::NoJsonObject)?;
    let value: serde_json::Value =
        serde_json::from_str(object).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    let plan: PlanOutput =
        serde_json::from_value(value).map_err(|e| ParseError::Schema(e.to_string()))?;
    plan.into_parts()
}

/// Planner instructions with the output schema appended
pub fn system_prompt(base: &str) -> String {
    let schema = schemars::schema_for!(PlanOutput);
    let schema = serde_json::to_string_pretty(&schema).unwrap_or_default();
    format!(
        "{}\n\nThe JSON object must match this schema:\n{}",
        base.trim_end(),
        schema
    )
}

pub struct PlannerSkill;

impl PlannerSkill {
    #[tracing::instrument(skip_all, fields(thread_id = %state.thread_id))]
    pub async fn run(
        ctx: &StageContext<'_>,
        state: &PipelineState,
        events: &mut EventEmitter,
    ) -> StateDelta {
        events
            .emit(PipelineEvent::agent_start(
                AGENT,
                "Starting reasoning and task delegation...",
            ))
            .await;

        let request = CompletionRequest::new(
            "plan",
            &ctx.config.models.planner,
            system_prompt(&ctx.prompts.planner),
            state.user_prompt.clone(),
            TEMPERATURE,
        );

        let delta = match ctx.complete(request).await {
            Ok(raw) => {
                events
                    .emit(PipelineEvent::ModelOutputRaw {
                        agent: AGENT.to_string(),
                        content: raw.clone(),
                    })
                    .await;

                match parse_plan(&raw) {
                    Ok((thought, tasks)) => {
                        let tasks = ctx.personas.bind(tasks);
                        tracing::info!("Plan produced {} tasks", tasks.len());
                        events
                            .emit(PipelineEvent::ThoughtsAndTasks {
                                content: thought.clone(),
                                tasks: tasks.clone(),
                            })
                            .await;
                        StateDelta::Planned {
                            plan: thought,
                            tasks,
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Unusable plan: {}", e);
                        events
                            .emit(PipelineEvent::stage_error(
                                Stage::Plan,
                                AGENT,
                                format!("Could not use planner response: {}", e),
                            ))
                            .await;
                        StateDelta::Planned {
                            plan: FORMAT_ERROR.to_string(),
                            tasks: Vec::new(),
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Planner call failed: {}", e);
                let message = format!("An unexpected error occurred: {}", e);
                events
                    .emit(PipelineEvent::stage_error(Stage::Plan, AGENT, message.clone()))
                    .await;
                StateDelta::Planned {
                    plan: message,
                    tasks: Vec::new(),
                }
            }
        };

        events
            .emit(PipelineEvent::agent_end(AGENT, "Task delegation complete."))
            .await;
        delta
    }
}
