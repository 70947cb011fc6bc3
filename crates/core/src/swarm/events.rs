//! # Pipeline Events
//!
//! The outbound event contract. Each event serializes to one JSON object
//! tagged by `event`, e.g. `{"event":"loop_end","message":"..."}`.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::state::pipeline_state::AgentTask;

/// Stage that raised an `error` event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Inbound request validation, before any stage runs
    Request,
    Plan,
    Dispatch,
    Simplify,
    Validate,
    Synthesize,
    Persist,
}

/// One progress event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    AgentStart {
        agent: String,
        status: String,
    },
    ModelOutputRaw {
        agent: String,
        content: String,
    },
    ThoughtsAndTasks {
        content: String,
        tasks: Vec<AgentTask>,
    },
    AgentOutput {
        agent_name: String,
        content: String,
    },
    SimplificationComplete {
        agent_name: String,
        content: String,
    },
    ValidationScore {
        agent_name: String,
        score: u8,
    },
    AgentEnd {
        agent: String,
        status: String,
    },
    LoopRetry {
        message: String,
        iteration: u32,
    },
    LoopEnd {
        message: String,
    },
    FinalAnswer {
        content: String,
    },
    SystemAbort {
        message: String,
    },
    SystemEnd {
        message: String,
        thread_id: String,
    },
    /// Advisory, except from the Plan stage where `system_abort` follows
    Error {
        stage: Stage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_name: Option<String>,
        message: String,
    },
}

impl PipelineEvent {
    pub fn agent_start(agent: &str, status: &str) -> Self {
        Self::AgentStart {
            agent: agent.to_string(),
            status: status.to_string(),
        }
    }

    pub fn agent_end(agent: &str, status: &str) -> Self {
        Self::AgentEnd {
            agent: agent.to_string(),
            status: status.to_string(),
        }
    }

    /// Error attributed to a stage-level agent ("Eleanor", "Final Synthesizer")
    pub fn stage_error(stage: Stage, agent: &str, message: impl Into<String>) -> Self {
        Self::Error {
            stage,
            agent: Some(agent.to_string()),
            agent_name: None,
            message: message.into(),
        }
    }

    /// Error attributed to one task agent
    pub fn agent_error(stage: Stage, agent_name: &str, message: impl Into<String>) -> Self {
        Self::Error {
            stage,
            agent: None,
            agent_name: Some(agent_name.to_string()),
            message: message.into(),
        }
    }

    /// Error with no agent attribution
    pub fn error(stage: Stage, message: impl Into<String>) -> Self {
        Self::Error {
            stage,
            agent: None,
            agent_name: None,
            message: message.into(),
        }
    }

    /// `system_abort` and `system_end` close the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SystemAbort { .. } | Self::SystemEnd { .. })
    }

    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            Self::AgentStart { .. } => "agent_start",
            Self::ModelOutputRaw { .. } => "model_output_raw",
            Self::ThoughtsAndTasks { .. } => "thoughts_and_tasks",
            Self::AgentOutput { .. } => "agent_output",
            Self::SimplificationComplete { .. } => "simplification_complete",
            Self::ValidationScore { .. } => "validation_score",
            Self::AgentEnd { .. } => "agent_end",
            Self::LoopRetry { .. } => "loop_retry",
            Self::LoopEnd { .. } => "loop_end",
            Self::FinalAnswer { .. } => "final_answer",
            Self::SystemAbort { .. } => "system_abort",
            Self::SystemEnd { .. } => "system_end",
            Self::Error { .. } => "error",
        }
    }
}

/// Records every event and forwards it to an optional channel.
///
/// A closed channel is logged once and otherwise ignored, so the run
/// still completes and persists when the client goes away.
#[derive(Debug, Default)]
pub struct EventEmitter {
    events: Vec<PipelineEvent>,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
    receiver_gone: bool,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(tx: mpsc::Sender<PipelineEvent>) -> Self {
        Self {
            event_tx: Some(tx),
            ..Self::default()
        }
    }

    pub async fn emit(&mut self, event: PipelineEvent) {
        self.events.push(event.clone());
        if self.receiver_gone {
            return;
        }
        if let Some(tx) = &self.event_tx {
            if tx.send(event).await.is_err() {
                tracing::warn!("Event receiver dropped; continuing run without streaming");
                self.receiver_gone = true;
            }
        }
    }

    pub fn events(&self) -> &[PipelineEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<PipelineEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let event = PipelineEvent::ValidationScore {
            agent_name: "Layla".to_string(),
            score: 6,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "validation_score", "agent_name": "Layla", "score": 6})
        );
        assert_eq!(event.name(), "validation_score");
    }

    #[test]
    fn test_error_omits_absent_attribution() {
        let event = PipelineEvent::error(Stage::Request, "No prompt received.");
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "error", "stage": "request", "message": "No prompt received."})
        );

        let event = PipelineEvent::agent_error(Stage::Dispatch, "Nova", "boom");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["agent_name"], "Nova");
        assert!(value.get("agent").is_none());
    }

    #[test]
    fn test_unknown_fields_are_ignored_on_read() {
        let event: PipelineEvent = serde_json::from_value(json!({
            "event": "loop_end",
            "message": "done",
            "extra": true
        }))
        .unwrap();
        assert_eq!(
            event,
            PipelineEvent::LoopEnd {
                message: "done".to_string()
            }
        );
    }

    #[test]
    fn test_terminal_events() {
        assert!(PipelineEvent::SystemAbort {
            message: String::new()
        }
        .is_terminal());
        assert!(!PipelineEvent::agent_start("Eleanor", "").is_terminal());
    }

    #[tokio::test]
    async fn test_emitter_records_and_forwards() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut emitter = EventEmitter::with_channel(tx);

        emitter.emit(PipelineEvent::agent_start("Eleanor", "go")).await;
        assert_eq!(rx.recv().await, Some(PipelineEvent::agent_start("Eleanor", "go")));
        assert_eq!(emitter.events().len(), 1);
    }

    #[tokio::test]
    async fn test_emitter_survives_dropped_receiver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut emitter = EventEmitter::with_channel(tx);

        emitter.emit(PipelineEvent::agent_start("a", "b")).await;
        emitter.emit(PipelineEvent::agent_end("a", "b")).await;
        assert_eq!(emitter.into_events().len(), 2);
    }
}
