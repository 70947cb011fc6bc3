//! # Validator Skill
//!
//! Rates each simplified output for clarity on a 1-10 scale. Anything that
//! does not yield a usable score counts as 1.

use futures::StreamExt;
use std::collections::HashMap;

use super::llm_helpers::{ordered_join, StageContext};
use crate::error::ParseError;
use crate::gateway::CompletionRequest;
use crate::state::pipeline_state::{PipelineState, StateDelta};
use crate::swarm::events::{EventEmitter, PipelineEvent, Stage};

/// Agent label used in events
pub const AGENT: &str = "Validator Agent";

pub const TEMPERATURE: f32 = 0.1;

/// Score recorded when validation fails
pub const DEFAULT_SCORE: u8 = 1;

/// Concatenate every digit in the response and read it as the score.
///
/// "Score: 8" gives 8; "7/10" gives 710, which is out of range.
pub fn parse_score(response: &str) -> Result<u8, ParseError> {
    let digits: String = response.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(ParseError::NoDigits(response.to_string()));
    }
    let value = digits
        .parse::<u64>()
        .map_err(|_| ParseError::OutOfRange(u64::MAX))?;
    match u8::try_from(value) {
        Ok(score) if (1..=10).contains(&score) => Ok(score),
        _ => Err(ParseError::OutOfRange(value)),
    }
}

pub struct ValidatorSkill;

impl ValidatorSkill {
    #[tracing::instrument(skip_all, fields(thread_id = %state.thread_id, iteration = state.iteration_count))]
    pub async fn run(
        ctx: &StageContext<'_>,
        state: &PipelineState,
        events: &mut EventEmitter,
    ) -> StateDelta {
        events
            .emit(PipelineEvent::agent_start(AGENT, "Rating simplified outputs"))
            .await;

        let calls: Vec<_> = state
            .agent_names()
            .into_iter()
            .filter_map(|agent| {
                let text = state.simplified_outputs.get(&agent)?;
                let request = CompletionRequest::new(
                    format!("validate:{}", agent),
                    &ctx.config.models.task,
                    ctx.prompts.validator.clone(),
                    format!("Rate the following text:\n\n{}", text),
                    TEMPERATURE,
                );
                Some(async move {
                    let result = ctx.complete(request).await;
                    (agent, result)
                })
            })
            .collect();

        let mut scores = HashMap::new();
        let mut results = std::pin::pin!(ordered_join(calls, ctx.config.effective_concurrency()));
        while let Some((agent, result)) = results.next().await {
            let score = match result.map(|raw| parse_score(&raw)) {
                Ok(Ok(score)) => {
                    events
                        .emit(PipelineEvent::ValidationScore {
                            agent_name: agent.clone(),
                            score,
                        })
                        .await;
                    score
                }
                Ok(Err(e)) => {
                    tracing::warn!(agent = %agent, "Unparseable score: {}", e);
                    events
                        .emit(PipelineEvent::agent_error(
                            Stage::Validate,
                            &agent,
                            format!("Could not parse score ({}). Defaulting to 1.", e),
                        ))
                        .await;
                    DEFAULT_SCORE
                }
                Err(e) => {
                    tracing::warn!(agent = %agent, "Validator call failed: {}", e);
                    events
                        .emit(PipelineEvent::agent_error(
                            Stage::Validate,
                            &agent,
                            format!("Error calling validator agent: {}", e),
                        ))
                        .await;
                    DEFAULT_SCORE
                }
            };
            scores.insert(agent, score);
        }

        events
            .emit(PipelineEvent::agent_end(AGENT, "Validation pass complete."))
            .await;
        StateDelta::Validated { scores }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::scripted::ScriptedGateway;
    use crate::skills::llm_helpers::testing::{dispatched_state, Fixture};

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score("8"), Ok(8));
        assert_eq!(parse_score(" Clarity: 10 "), Ok(10));
        assert_eq!(parse_score("1"), Ok(1));
    }

    #[test]
    fn test_parse_score_failures() {
        assert!(matches!(parse_score("very clear"), Err(ParseError::NoDigits(_))));
        assert_eq!(parse_score("7/10"), Err(ParseError::OutOfRange(710)));
        assert_eq!(parse_score("0"), Err(ParseError::OutOfRange(0)));
        assert_eq!(parse_score("11"), Err(ParseError::OutOfRange(11)));
        assert_eq!(
            parse_score("99999999999999999999999"),
            Err(ParseError::OutOfRange(u64::MAX))
        );
    }

    fn simplified() -> PipelineState {
        dispatched_state().apply(StateDelta::Simplified {
            updates: [("Isaac", "s-i"), ("Layla", "s-l"), ("Nova", "s-n")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }

    #[tokio::test]
    async fn test_scores_every_simplified_agent_in_task_order() {
        let fixture = Fixture::new();
        let gateway = ScriptedGateway::new()
            .on("validate:Isaac", Ok("9"))
            .on("validate:Layla", Ok("6"))
            .on("validate:Nova", Ok("8"));
        let mut events = EventEmitter::new();
        let state = simplified();

        let delta = ValidatorSkill::run(&fixture.ctx(&gateway), &state, &mut events).await;

        let state = state.apply(delta);

        assert_eq!(
            gateway.labels(),
            vec!["validate:Isaac", "validate:Layla", "validate:Nova"]
        );
        assert_eq!(gateway.calls()[1].user_prompt, "Rate the following text:\n\ns-l");
        assert_eq!(state.scores["Isaac"], 9);
        assert_eq!(state.scores["Layla"], 6);
        assert_eq!(state.scores["Nova"], 8);
        assert_eq!(state.iteration_count, 1);
    }

    #[tokio::test]
    async fn test_malformed_and_failed_calls_score_one() {
        let fixture = Fixture::new();
        let gateway = ScriptedGateway::new()
            .on("validate:Isaac", Ok("Pretty clear!"))
            .on("validate:Layla", Err("503"))
            .on("validate:Nova", Ok("7/10"));
        let mut events = EventEmitter::new();
        let state = simplified();

        let delta = ValidatorSkill::run(&fixture.ctx(&gateway), &state, &mut events).await;

        let state = state.apply(delta);

        assert!(state.scores.values().all(|s| *s == DEFAULT_SCORE));
        let errors = events
            .events()
            .iter()
            .filter(|e| e.name() == "error")
            .count();
        assert_eq!(errors, 3);
    }

    #[tokio::test]
    async fn test_agents_without_simplified_text_are_skipped() {
        let fixture = Fixture::new();
        let gateway = ScriptedGateway::new().on("validate", Ok("9"));
        let mut events = EventEmitter::new();
        let state = dispatched_state().apply(StateDelta::Simplified {
            updates: [("Nova".to_string(), "only nova".to_string())]
                .into_iter()
                .collect(),
        });

        let delta = ValidatorSkill::run(&fixture.ctx(&gateway), &state, &mut events).await;

        let state = state.apply(delta);

        assert_eq!(gateway.labels(), vec!["validate:Nova"]);
        assert_eq!(state.scores.len(), 1);
    }
}
