//! `/ws` streaming endpoint
//!
//! The first text frame is a run request (`{"prompt", "user_id", "thread_id"}`).
//! Every pipeline event is pushed back as one JSON text frame, then the
//! socket closes.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, Stream, StreamExt};

use crate::SharedState;
use triad_core::error::RunError;
use triad_core::swarm::{PipelineEvent, RunRequest, Stage};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Decode the opening frame; anything without a usable prompt is refused
pub fn parse_request(text: &str) -> Result<RunRequest, RunError> {
    let request: RunRequest = serde_json::from_str(text).map_err(|e| {
        tracing::debug!("Malformed run request: {}", e);
        RunError::EmptyPrompt
    })?;
    if request.prompt.trim().is_empty() {
        return Err(RunError::EmptyPrompt);
    }
    Ok(request)
}

/// Wait for the opening request, skipping keep-alive frames.
///
/// `None` means the client closed (or the socket failed) before sending one.
pub async fn first_request<S>(frames: &mut S) -> Option<Result<RunRequest, RunError>>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(Message::Text(text)) => return Some(parse_request(&text)),
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => return None,
            Ok(Message::Binary(_)) => return Some(Err(RunError::EmptyPrompt)),
            Err(e) => {
                tracing::warn!("WebSocket receive failed: {}", e);
                return None;
            }
        }
    }
    None
}

fn frame(event: &PipelineEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json)),
        Err(e) => {
            tracing::error!("Failed to encode {} event: {}", event.name(), e);
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut sender, mut receiver) = socket.split();

    let Some(request) = first_request(&mut receiver).await else {
        return;
    };

    let events = request.and_then(|request| state.orchestrator.clone().stream(request));
    let mut events = match events {
        Ok(events) => events,
        Err(e) => {
            let refusal = PipelineEvent::error(Stage::Request, e.to_string());
            if let Some(message) = frame(&refusal) {
                let _ = sender.send(message).await;
            }
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    // The run keeps going if the client leaves; it still persists.
    while let Some(event) = events.next().await {
        let Some(message) = frame(&event) else {
            continue;
        };
        if sender.send(message).await.is_err() {
            tracing::info!("Client disconnected before the run finished");
            return;
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_request() {
        let request =
            parse_request(r#"{"prompt": "Why is the sky blue?", "user_id": "u1", "thread_id": "t9"}"#)
                .unwrap();
        assert_eq!(request.prompt, "Why is the sky blue?");
        assert_eq!(request.user_id, "u1");
        assert_eq!(request.thread_id.as_deref(), Some("t9"));
    }

    #[test]
    fn test_user_defaults_to_anonymous() {
        let request = parse_request(r#"{"prompt": "hi"}"#).unwrap();
        assert_eq!(request.user_id, "anonymous");
        assert!(request.thread_id.is_none());
    }

    #[test]
    fn test_null_user_is_anonymous() {
        let request = parse_request(
            r#"{"prompt": "How can a city reduce traffic congestion?", "user_id": null}"#,
        )
        .unwrap();
        assert_eq!(request.user_id, "anonymous");
    }

    #[test]
    fn test_unusable_requests_are_refused() {
        for text in [r#"{"user_id": "u1"}"#, r#"{"prompt": "   "}"#, "not json"] {
            assert_eq!(parse_request(text).unwrap_err(), RunError::EmptyPrompt);
        }
    }

    #[tokio::test]
    async fn test_keep_alive_frames_before_request_are_skipped() {
        let frames: Vec<Result<Message, axum::Error>> = vec![
            Ok(Message::Ping(vec![1])),
            Ok(Message::Pong(vec![])),
            Ok(Message::Text(r#"{"prompt": "hi"}"#.to_string())),
        ];
        let mut frames = futures::stream::iter(frames);
        let request = first_request(&mut frames).await.unwrap().unwrap();
        assert_eq!(request.prompt, "hi");
    }

    #[tokio::test]
    async fn test_close_before_request_ends_quietly() {
        let frames: Vec<Result<Message, axum::Error>> =
            vec![Ok(Message::Ping(vec![])), Ok(Message::Close(None))];
        let mut frames = futures::stream::iter(frames);
        assert!(first_request(&mut frames).await.is_none());

        let mut empty = futures::stream::iter(Vec::<Result<Message, axum::Error>>::new());
        assert!(first_request(&mut empty).await.is_none());
    }

    #[test]
    fn test_refusal_frame_shape() {
        let refusal = PipelineEvent::error(Stage::Request, RunError::EmptyPrompt.to_string());
        let Some(Message::Text(json)) = frame(&refusal) else {
            panic!("expected a text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["event"], "error");
        assert_eq!(value["stage"], "request");
        assert_eq!(value["message"], "No prompt received.");
    }
}
