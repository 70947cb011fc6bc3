//! # Simplifier Skill
//!
//! Rewrites agent output for a lay reader. Iteration 0 rewrites every agent;
//! later iterations only the agents that scored below the threshold. The
//! input is always the agent's raw output.

use futures::StreamExt;
use std::collections::HashMap;

use super::llm_helpers::{ordered_join, StageContext};
use crate::gateway::CompletionRequest;
use crate::state::pipeline_state::{PipelineState, StateDelta};
use crate::swarm::events::{EventEmitter, PipelineEvent, Stage};

/// Agent label used in events
pub const AGENT: &str = "Simplifier Agent";

pub const TEMPERATURE: f32 = 0.3;

/// Simplified text recorded for an agent whose call failed
pub const SIMPLIFY_SENTINEL: &str = "Error simplifying text.";

/// A missing score counts as 0
pub fn should_simplify(state: &PipelineState, agent: &str, threshold: u8) -> bool {
    state.iteration_count == 0 || state.scores.get(agent).copied().unwrap_or(0) < threshold
}

/// Agents selected this iteration, in task order
pub fn selected_agents(state: &PipelineState, threshold: u8) -> Vec<String> {
    state
        .agent_names()
        .into_iter()
        .filter(|agent| should_simplify(state, agent, threshold))
        .collect()
}

pub struct SimplifierSkill;

impl SimplifierSkill {
    #[tracing::instrument(skip_all, fields(thread_id = %state.thread_id, iteration = state.iteration_count))]
    pub async fn run(
        ctx: &StageContext<'_>,
        state: &PipelineState,
        events: &mut EventEmitter,
    ) -> StateDelta {
        events
            .emit(PipelineEvent::agent_start(AGENT, "Simplifying outputs"))
            .await;

        let selected = selected_agents(state, ctx.config.score_threshold);
        tracing::debug!(?selected, "Agents selected for simplification");

        let calls: Vec<_> = selected
            .iter()
            .map(|agent| {
                let text = state.raw_outputs.get(agent).cloned().unwrap_or_default();
                let request = CompletionRequest::new(
                    format!("simplify:{}", agent),
                    &ctx.config.models.task,
                    ctx.prompts.simplifier.clone(),
                    format!("Simplify the following text:\n\n{}", text),
                    TEMPERATURE,
                );
                async move { (agent.clone(), ctx.complete(request).await) }
            })
            .collect();

        let mut updates = HashMap::new();
        let mut results = std::pin::pin!(ordered_join(calls, ctx.config.effective_concurrency()));
        while let Some((agent, result)) = results.next().await {
            match result {
                Ok(text) => {
                    events
                        .emit(PipelineEvent::SimplificationComplete {
                            agent_name: agent.clone(),
                            content: text.clone(),
                        })
                        .await;
                    updates.insert(agent, text);
                }
                Err(e) => {
                    tracing::warn!(agent = %agent, "Simplification failed: {}", e);
                    events
                        .emit(PipelineEvent::agent_error(
                            Stage::Simplify,
                            &agent,
                            format!("Error simplifying output: {}", e),
                        ))
                        .await;
                    updates.insert(agent, SIMPLIFY_SENTINEL.to_string());
                }
            }
        }

        events
            .emit(PipelineEvent::agent_end(AGENT, "Simplification pass complete."))
            .await;
        StateDelta::Simplified { updates }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::scripted::ScriptedGateway;
    use crate::skills::llm_helpers::testing::{dispatched_state, Fixture};

    fn scored(pairs: &[(&str, u8)]) -> PipelineState {
        dispatched_state().apply(StateDelta::Validated {
            scores: pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        })
    }

    #[test]
    fn test_first_iteration_selects_everyone() {
        assert_eq!(
            selected_agents(&dispatched_state(), 8),
            vec!["Isaac", "Layla", "Nova"]
        );
    }

    #[test]
    fn test_later_iterations_select_low_and_missing_scores() {
        let state = scored(&[("Isaac", 9), ("Layla", 6)]);
        assert_eq!(state.iteration_count, 1);
        assert_eq!(selected_agents(&state, 8), vec!["Layla", "Nova"]);
    }

    #[tokio::test]
    async fn test_only_low_scorers_are_called_and_raw_text_is_the_input() {
        let fixture = Fixture::new();
        let gateway = ScriptedGateway::new().on("simplify", Ok("simple"));
        let mut events = EventEmitter::new();
        let state = scored(&[("Isaac", 9), ("Layla", 6), ("Nova", 8)]);

        let delta = SimplifierSkill::run(&fixture.ctx(&gateway), &state, &mut events).await;

        let state = state.apply(delta);

        assert_eq!(gateway.labels(), vec!["simplify:Layla"]);
        assert_eq!(
            gateway.calls()[0].user_prompt,
            "Simplify the following text:\n\nraw-layla"
        );
        assert_eq!(gateway.calls()[0].temperature, TEMPERATURE);
        assert_eq!(state.simplified_outputs.len(), 1);
        assert_eq!(state.simplified_outputs["Layla"], "simple");
    }

    #[tokio::test]
    async fn test_failure_becomes_sentinel() {
        let fixture = Fixture::new();
        let gateway = ScriptedGateway::new()
            .on("simplify", Ok("simple"))
            .on("simplify:Nova", Err("timeout"));
        let mut events = EventEmitter::new();
        let state = dispatched_state();

        let delta = SimplifierSkill::run(&fixture.ctx(&gateway), &state, &mut events).await;

        let state = state.apply(delta);

        assert_eq!(state.simplified_outputs["Isaac"], "simple");
        assert_eq!(state.simplified_outputs["Nova"], SIMPLIFY_SENTINEL);
        assert!(events.events().iter().any(|e| matches!(
            e,
            PipelineEvent::Error { stage: Stage::Simplify, agent_name: Some(name), .. } if name == "Nova"
        )));
    }
}
