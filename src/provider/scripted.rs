use super::{GenerateRequest, ModelAction, Provider};
use crate::error::ProviderError;
use crate::session::Turn;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// What a scripted provider saw on one `generate` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub history: Vec<Turn>,
    pub tool_names: Vec<String>,
}

/// A provider that replays a queue of canned responses. Used to drive the execution
/// loop deterministically.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<ModelAction, ProviderError>>>,
    fallback: Option<ModelAction>,
    delay: Option<Duration>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Result<ModelAction, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: None,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers every call with the same action.
    pub fn repeating(action: ModelAction) -> Self {
        Self {
            fallback: Some(action),
            ..Self::new(Vec::new())
        }
    }

    /// Waits this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .map(|requests| requests.len())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerateRequest<'_>) -> Result<ModelAction, ProviderError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                history: request.history.turns().to_vec(),
                tool_names: request.tools.iter().map(|t| t.name.to_string()).collect(),
            });
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut responses| responses.pop_front());
        match (next, &self.fallback) {
            (Some(response), _) => response,
            (None, Some(action)) => Ok(action.clone()),
            (None, None) => Err(ProviderError::Transport(
                "scripted provider has no responses left".to_string(),
            )),
        }
    }
}
