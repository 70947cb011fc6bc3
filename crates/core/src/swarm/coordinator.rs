//! # Orchestrator
//!
//! Drives one run from user prompt to stored conversation.
//!
//! ```text
//! plan ─▶ (no tasks? abort) ─▶ dispatch ─▶ [simplify ─▶ validate]{1..cap} ─▶ synthesize ─▶ persist
//! ```
//!
//! Events are recorded on the returned [`RunOutcome`] and, when a channel is
//! attached, streamed as they happen.

use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::events::{EventEmitter, PipelineEvent, Stage};
use super::pipeline::{should_continue, Pipeline, PipelinePhase};
use crate::config::PipelineConfig;
use crate::error::RunError;
use crate::gateway::CompletionGateway;
use crate::skills::{
    DispatchSkill, PersonaTable, PlannerSkill, PromptLibrary, Prompts, SimplifierSkill, StageContext,
    SynthesizerSkill, ValidatorSkill,
};
use crate::state::conversations::ConversationStore;
use crate::state::pipeline_state::PipelineState;

/// User id recorded when the client does not send one
pub const ANONYMOUS_USER: &str = "anonymous";

pub const ABORT_MESSAGE: &str = "Eleanor failed to generate tasks. Aborting.";
pub const END_MESSAGE: &str = "Conversation complete. History saved.";
pub const END_UNSAVED_MESSAGE: &str = "Conversation complete. History could not be saved.";
pub const LOOP_END_MESSAGE: &str = "Simplification loop complete.";

/// Capacity of the streaming channel
const EVENT_BUFFER: usize = 64;

fn default_user_id() -> String {
    ANONYMOUS_USER.to_string()
}

/// An explicit `null` user falls back to the anonymous user
fn user_or_anonymous<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_user_id))
}

/// Inbound request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default = "default_user_id", deserialize_with = "user_or_anonymous")]
    pub user_id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

impl RunRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            user_id: default_user_id(),
            thread_id: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Reject blank prompts and assign a thread id
    pub fn accept(self) -> Result<AcceptedRun, RunError> {
        if self.prompt.trim().is_empty() {
            return Err(RunError::EmptyPrompt);
        }
        let thread_id = self
            .thread_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let user_id = if self.user_id.trim().is_empty() {
            default_user_id()
        } else {
            self.user_id
        };
        Ok(AcceptedRun {
            prompt: self.prompt,
            user_id,
            thread_id,
        })
    }
}

/// A validated request, ready to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedRun {
    pub prompt: String,
    pub user_id: String,
    pub thread_id: String,
}

/// Result of one run
#[derive(Debug)]
pub struct RunOutcome {
    pub state: PipelineState,
    pub events: Vec<PipelineEvent>,
    /// `Done` or `Aborted`
    pub phase: PipelinePhase,
    pub persisted: bool,
}

/// The pipeline orchestrator
pub struct Orchestrator {
    gateway: Arc<dyn CompletionGateway>,
    store: Arc<dyn ConversationStore>,
    config: PipelineConfig,
    prompts: PromptLibrary,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<dyn CompletionGateway>,
        store: Arc<dyn ConversationStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            config,
            prompts: PromptLibrary::defaults(),
        }
    }

    /// Resolve prompts through the database instead of the bundled defaults
    pub fn with_prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run to completion, recording events only
    pub async fn run(&self, request: RunRequest) -> Result<RunOutcome, RunError> {
        let run = request.accept()?;
        let mut events = EventEmitter::new();
        self.execute(run, &mut events).await
    }

    /// Run to completion while streaming every event into `tx`
    pub async fn run_with_channel(
        &self,
        request: RunRequest,
        tx: mpsc::Sender<PipelineEvent>,
    ) -> Result<RunOutcome, RunError> {
        let run = request.accept()?;
        let mut events = EventEmitter::with_channel(tx);
        self.execute(run, &mut events).await
    }

    /// Start a run in the background and return its event stream.
    ///
    /// The request is validated before anything is spawned. The stream ends
    /// after `system_abort` or `system_end`.
    pub fn stream(
        self: Arc<Self>,
        request: RunRequest,
    ) -> Result<ReceiverStream<PipelineEvent>, RunError> {
        let run = request.accept()?;
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        tokio::spawn(async move {
            let mut events = EventEmitter::with_channel(tx);
            if let Err(e) = self.execute(run, &mut events).await {
                tracing::error!("Run failed: {}", e);
            }
        });

        Ok(ReceiverStream::new(rx))
    }

    #[tracing::instrument(skip_all, fields(thread_id = %run.thread_id, user_id = %run.user_id))]
    async fn execute(
        &self,
        run: AcceptedRun,
        events: &mut EventEmitter,
    ) -> Result<RunOutcome, RunError> {
        let prompts = self.resolve_prompts().await;
        let personas = PersonaTable::new(&prompts, self.config.temperatures);
        let ctx = StageContext::new(self.gateway.as_ref(), &self.config, &prompts, &personas);
        let max_iterations = self.config.max_iterations.max(1);
        let threshold = self.config.score_threshold;

        let mut pipeline = Pipeline::new();
        let mut state = PipelineState::new(run.prompt, run.thread_id.clone());
        tracing::info!("Run started");

        pipeline.advance(PipelinePhase::Planning)?;
        let delta = PlannerSkill::run(&ctx, &state, events).await;
        state = state.apply(delta);

        if !state.has_tasks() {
            pipeline.advance(PipelinePhase::Aborted)?;
            tracing::warn!("Planner produced no tasks; aborting run");
            events
                .emit(PipelineEvent::SystemAbort {
                    message: ABORT_MESSAGE.to_string(),
                })
                .await;
            return Ok(RunOutcome {
                state,
                events: events.events().to_vec(),
                phase: pipeline.phase(),
                persisted: false,
            });
        }

        pipeline.advance(PipelinePhase::Dispatching)?;
        let delta = DispatchSkill::run(&ctx, &state, events).await;
        state = state.apply(delta);

        loop {
            tokio::time::sleep(self.config.loop_delay()).await;

            pipeline.advance(PipelinePhase::Simplifying)?;
            let delta = SimplifierSkill::run(&ctx, &state, events).await;
            state = state.apply(delta);

            pipeline.advance(PipelinePhase::Validating)?;
            let delta = ValidatorSkill::run(&ctx, &state, events).await;
            state = state.apply(delta);

            if should_continue(&state.scores, state.iteration_count, max_iterations, threshold) {
                tracing::debug!(iteration = state.iteration_count, "Scores below threshold; looping");
                events
                    .emit(PipelineEvent::LoopRetry {
                        message: format!(
                            "Simplification loop: Score below {}, looping back. Loop count: {}",
                            threshold, state.iteration_count
                        ),
                        iteration: state.iteration_count,
                    })
                    .await;
            } else {
                tracing::debug!(iteration = state.iteration_count, "Convergence loop finished");
                events
                    .emit(PipelineEvent::LoopEnd {
                        message: LOOP_END_MESSAGE.to_string(),
                    })
                    .await;
                break;
            }
        }

        pipeline.advance(PipelinePhase::Synthesizing)?;
        let delta = SynthesizerSkill::run(&ctx, &state, events).await;
        state = state.apply(delta);

        pipeline.advance(PipelinePhase::Persisting)?;
        let persisted = self.persist(&run.user_id, &state, events).await;

        pipeline.advance(PipelinePhase::Done)?;
        let message = if persisted {
            END_MESSAGE
        } else {
            END_UNSAVED_MESSAGE
        };
        events
            .emit(PipelineEvent::SystemEnd {
                message: message.to_string(),
                thread_id: run.thread_id,
            })
            .await;
        tracing::info!(iterations = state.iteration_count, "Run complete");

        Ok(RunOutcome {
            state,
            events: events.events().to_vec(),
            phase: pipeline.phase(),
            persisted,
        })
    }

    /// Snapshot prompts on the blocking pool
    async fn resolve_prompts(&self) -> Prompts {
        let library = self.prompts.clone();
        match tokio::task::spawn_blocking(move || library.resolve()).await {
            Ok(prompts) => prompts,
            Err(e) => {
                tracing::warn!("Prompt lookup task failed, using bundled prompts: {}", e);
                Prompts::default()
            }
        }
    }

    /// Save the final state; a failure is reported as an event and the run goes on
    async fn persist(&self, user_id: &str, state: &PipelineState, events: &mut EventEmitter) -> bool {
        let store = Arc::clone(&self.store);
        let user_id = user_id.to_string();
        let snapshot = state.clone();
        let result = match tokio::task::spawn_blocking(move || store.save(&user_id, &snapshot)).await {
            Ok(saved) => saved.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match result {
            Ok(()) => true,
            Err(message) => {
                tracing::warn!("Failed to save conversation: {}", message);
                events
                    .emit(PipelineEvent::error(
                        Stage::Persist,
                        format!("Failed to save conversation history: {}", message),
                    ))
                    .await;
                false
            }
        }
    }
}
