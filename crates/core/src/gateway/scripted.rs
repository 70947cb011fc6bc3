//! Scripted gateway for tests: answers by call label and records every request.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::{CompletionGateway, CompletionRequest};
use crate::error::ProviderError;

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(String),
}

/// Replies are queued per label. The last queued reply for a label repeats.
/// A label like `simplify:Layla` falls back to the replies for `simplify`.
#[derive(Default)]
pub struct ScriptedGateway {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply: `Ok(text)` succeeds, `Err(msg)` fails with a transport error
    pub fn on(self, label: &str, reply: Result<&str, &str>) -> Self {
        let reply = match reply {
            Ok(text) => Reply::Text(text.to_string()),
            Err(msg) => Reply::Fail(msg.to_string()),
        };
        self.replies
            .lock()
            .unwrap()
            .entry(label.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.label).collect()
    }

    pub fn count(&self, label: &str) -> usize {
        self.labels().iter().filter(|l| l.as_str() == label).count()
    }

    fn next_reply(&self, label: &str) -> Option<Reply> {
        let mut replies = self.replies.lock().unwrap();
        let key = if replies.contains_key(label) {
            label.to_string()
        } else {
            label.split(':').next()?.to_string()
        };
        let queue = replies.get_mut(&key)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl CompletionGateway for ScriptedGateway {
    async fn generate(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let label = request.label.clone();
        self.calls.lock().unwrap().push(request);
        match self.next_reply(&label) {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail(msg)) => Err(ProviderError::Transport(msg)),
            None => Err(ProviderError::Transport(format!(
                "no scripted reply for {}",
                label
            ))),
        }
    }
}
