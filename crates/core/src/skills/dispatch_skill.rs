//! # Dispatch Skill
//!
//! Runs each persona on its delegated task. Agents are fault-isolated: a
//! failed call becomes a sentinel output and the others proceed.

use futures::StreamExt;
use std::collections::HashMap;

use super::llm_helpers::{ordered_join, StageContext};
use crate::gateway::CompletionRequest;
use crate::state::pipeline_state::{PipelineState, StateDelta};
use crate::swarm::events::{EventEmitter, PipelineEvent, Stage};

/// Agent label used in events
pub const AGENT: &str = "Task Agents";

/// Raw output recorded for an agent whose call failed
pub const EXECUTION_SENTINEL: &str = "Error in execution.";

/// Temperature for a task whose agent is missing from the persona table
const FALLBACK_TEMPERATURE: f32 = 0.5;

/// User message shared by all personas
pub fn user_prompt(state: &PipelineState) -> String {
    format!(
        "Based on the user prompt: '{}', and the initial thoughts: '{}', provide your response.",
        state.user_prompt, state.plan
    )
}

pub struct DispatchSkill;

impl DispatchSkill {
    #[tracing::instrument(skip_all, fields(thread_id = %state.thread_id))]
    pub async fn run(
        ctx: &StageContext<'_>,
        state: &PipelineState,
        events: &mut EventEmitter,
    ) -> StateDelta {
        events
            .emit(PipelineEvent::agent_start(
                AGENT,
                "Isaac, Layla and Nova are working on this",
            ))
            .await;

        let user = user_prompt(state);
        let calls: Vec<_> = state
            .tasks
            .iter()
            .map(|task| {
                let (system, temperature) = match ctx.personas.get(&task.agent_name) {
                    Some(persona) => (persona.system_prompt(&task.task), persona.temperature),
                    None => (
                        format!("Your task is: {}", task.task),
                        FALLBACK_TEMPERATURE,
                    ),
                };
                let request = CompletionRequest::new(
                    format!("dispatch:{}", task.agent_name),
                    &ctx.config.models.task,
                    system,
                    user.clone(),
                    temperature,
                );
                async move { (task.agent_name.clone(), ctx.complete(request).await) }
            })
            .collect();

        let mut raw_outputs = HashMap::new();
        let mut results = std::pin::pin!(ordered_join(calls, ctx.config.effective_concurrency()));
        while let Some((agent, result)) = results.next().await {
            match result {
                Ok(text) => {
                    events
                        .emit(PipelineEvent::AgentOutput {
                            agent_name: agent.clone(),
                            content: text.clone(),
                        })
                        .await;
                    raw_outputs.insert(agent, text);
                }
                Err(e) => {
                    tracing::warn!(agent = %agent, "Task agent failed: {}", e);
                    events
                        .emit(PipelineEvent::agent_error(
                            Stage::Dispatch,
                            &agent,
                            format!("Error running agent: {}", e),
                        ))
                        .await;
                    raw_outputs.insert(agent, EXECUTION_SENTINEL.to_string());
                }
            }
        }

        events
            .emit(PipelineEvent::agent_end(
                AGENT,
                "All task agents have completed.",
            ))
            .await;
        StateDelta::Dispatched { raw_outputs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::gateway::scripted::ScriptedGateway;
    use crate::skills::llm_helpers::testing::{planned_state, Fixture};

    #[tokio::test]
    async fn test_each_persona_gets_its_prompt_and_temperature() {
        let fixture = Fixture::new();
        let gateway = ScriptedGateway::new().on("dispatch", Ok("answer"));
        let mut events = EventEmitter::new();
        let state = planned_state();

        let delta = DispatchSkill::run(&fixture.ctx(&gateway), &state, &mut events).await;

        let state = state.apply(delta);

        assert_eq!(state.raw_outputs.len(), 3);
        let calls = gateway.calls();
        let temps: Vec<f32> = calls.iter().map(|c| c.temperature).collect();
        assert_eq!(temps, vec![0.0, 0.7, 2.0]);
        assert!(calls[0].system_prompt.contains("Isaac"));
        assert!(calls[0]
            .system_prompt
            .ends_with("Your task is: Gather congestion facts"));
        assert_eq!(
            calls[1].user_prompt,
            "Based on the user prompt: 'How can a city reduce traffic congestion?', \
             and the initial thoughts: 'I will look at data, policy and the far future.', \
             provide your response."
        );
    }

    #[tokio::test]
    async fn test_one_failure_is_isolated() {
        let fixture = Fixture::new();
        let gateway = ScriptedGateway::new()
            .on("dispatch", Ok("fine"))
            .on("dispatch:Layla", Err("rate limited"));
        let mut events = EventEmitter::new();
        let state = planned_state();

        let delta = DispatchSkill::run(&fixture.ctx(&gateway), &state, &mut events).await;

        let state = state.apply(delta);

        assert_eq!(state.raw_outputs["Isaac"], "fine");
        assert_eq!(state.raw_outputs["Layla"], EXECUTION_SENTINEL);
        assert_eq!(state.raw_outputs["Nova"], "fine");

        let names: Vec<_> = events.events().iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec!["agent_start", "agent_output", "error", "agent_output", "agent_end"]
        );
    }

    #[tokio::test]
    async fn test_concurrent_dispatch_keeps_task_order() {
        let fixture = Fixture::with_config(PipelineConfig {
            agent_concurrency: 3,
            ..PipelineConfig::default()
        });
        let gateway = ScriptedGateway::new()
            .on("dispatch:Isaac", Ok("i"))
            .on("dispatch:Layla", Ok("l"))
            .on("dispatch:Nova", Ok("n"));
        let mut events = EventEmitter::new();
        let state = planned_state();

        DispatchSkill::run(&fixture.ctx(&gateway), &state, &mut events).await;

        let outputs: Vec<_> = events
            .events()
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::AgentOutput { agent_name, .. } => Some(agent_name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(outputs, vec!["Isaac", "Layla", "Nova"]);
    }
}
