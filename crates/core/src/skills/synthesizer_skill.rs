//! # Synthesizer Skill
//!
//! Merges the prompt, the plan and the simplified answers into the final answer.

use super::llm_helpers::StageContext;
use super::personas::PersonaTable;
use crate::gateway::CompletionRequest;
use crate::state::pipeline_state::{PipelineState, StateDelta};
use crate::swarm::events::{EventEmitter, PipelineEvent, Stage};

/// Agent label used in events
pub const AGENT: &str = "Final Synthesizer";

pub const TEMPERATURE: f32 = 0.5;

/// Final answer recorded when the call fails
pub const SYNTHESIS_SENTINEL: &str = "Error generating final answer.";

/// User message listing every input; a missing simplified answer is empty
pub fn user_prompt(state: &PipelineState, personas: &PersonaTable) -> String {
    let answers = personas
        .iter()
        .enumerate()
        .map(|(i, persona)| {
            let text = state
                .simplified_outputs
                .get(&persona.name)
                .map(String::as_str)
                .unwrap_or("");
            format!("{}. {}: {}", i + 1, persona.name, text)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "User Prompt: {}\n\nEleanor's Initial Thoughts: {}\n\nSimplified Answers:\n{}",
        state.user_prompt, state.plan, answers
    )
}

pub struct SynthesizerSkill;

impl SynthesizerSkill {
    #[tracing::instrument(skip_all, fields(thread_id = %state.thread_id))]
    pub async fn run(
        ctx: &StageContext<'_>,
        state: &PipelineState,
        events: &mut EventEmitter,
    ) -> StateDelta {
        events
            .emit(PipelineEvent::agent_start(AGENT, "Aggregating all results"))
            .await;

        let request = CompletionRequest::new(
            "synthesize",
            &ctx.config.models.synthesis,
            ctx.prompts.synthesizer.clone(),
            user_prompt(state, ctx.personas),
            TEMPERATURE,
        );

        let final_answer = match ctx.complete(request).await {
            Ok(answer) => {
                events
                    .emit(PipelineEvent::FinalAnswer {
                        content: answer.clone(),
                    })
                    .await;
                answer
            }
            Err(e) => {
                tracing::warn!("Synthesis failed: {}", e);
                events
                    .emit(PipelineEvent::stage_error(
                        Stage::Synthesize,
                        AGENT,
                        format!("Error generating final answer: {}", e),
                    ))
                    .await;
                SYNTHESIS_SENTINEL.to_string()
            }
        };

        events
            .emit(PipelineEvent::agent_end(AGENT, "Final answer generated."))
            .await;
        StateDelta::Synthesized { final_answer }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::scripted::ScriptedGateway;
    use crate::models::DEFAULT_SYNTHESIS_MODEL;
    use crate::skills::llm_helpers::testing::{dispatched_state, Fixture};

    fn with_two_answers() -> PipelineState {
        dispatched_state().apply(StateDelta::Simplified {
            updates: [("Isaac", "facts"), ("Nova", "dreams")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }

    #[test]
    fn test_user_prompt_lists_answers_in_persona_order() {
        let prompt = user_prompt(&with_two_answers(), &PersonaTable::default());
        assert!(prompt.starts_with("User Prompt: How can a city reduce traffic congestion?"));
        assert!(prompt.contains("Eleanor's Initial Thoughts: I will look at data"));
        assert!(prompt.ends_with("1. Isaac: facts\n2. Layla: \n3. Nova: dreams"));
    }

    #[tokio::test]
    async fn test_answer_uses_synthesis_model() {
        let fixture = Fixture::new();
        let gateway = ScriptedGateway::new().on("synthesize", Ok("The answer."));
        let mut events = EventEmitter::new();
        let state = with_two_answers();

        let delta = SynthesizerSkill::run(&fixture.ctx(&gateway), &state, &mut events).await;

        let state = state.apply(delta);

        assert_eq!(state.final_answer, "The answer.");
        let call = &gateway.calls()[0];
        assert_eq!(call.model, DEFAULT_SYNTHESIS_MODEL);
        assert_eq!(call.temperature, TEMPERATURE);
    }

    #[tokio::test]
    async fn test_failure_becomes_sentinel() {
        let fixture = Fixture::new();
        let gateway = ScriptedGateway::new().on("synthesize", Err("boom"));
        let mut events = EventEmitter::new();
        let state = with_two_answers();

        let delta = SynthesizerSkill::run(&fixture.ctx(&gateway), &state, &mut events).await;

        let state = state.apply(delta);

        assert_eq!(state.final_answer, SYNTHESIS_SENTINEL);
        let names: Vec<_> = events.events().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["agent_start", "error", "agent_end"]);
    }
}
