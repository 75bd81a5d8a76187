//! OpenAI-compatible chat completions (OpenAI, OpenRouter, Groq, Ollama, LM Studio),
//! streamed through `openrouter_api`.

use super::retry::classify_error_text;
use super::{
    GenerateRequest, ModelAction, Provider, ProviderSettings, ToolCallRequest, parse_arguments,
    print_debug_payload,
};
use crate::error::ProviderError;
use crate::session::{History, Turn};
use crate::tools::ToolSpec;
use async_trait::async_trait;
use futures::StreamExt;
use openrouter_api::{
    OpenRouterClient, Ready,
    models::tool::{FunctionCall, FunctionDescription, Tool as ApiTool, ToolCall},
    types::chat::{ChatCompletionRequest, Message},
};
use serde_json::Value;
use std::time::Duration;

/// Sent to local servers that ignore authentication.
const PLACEHOLDER_API_KEY: &str =
    "sk-no-key-0000000000000000000000000000000000000000000000000000000000000000";

pub struct OpenAiCompatibleProvider {
    name: String,
    model: String,
    client: OpenRouterClient<Ready>,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        name: &str,
        settings: &ProviderSettings,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let api_key = settings
            .api_key_or_auth_error(name)?
            .unwrap_or_else(|| PLACEHOLDER_API_KEY.to_string());
        if settings.max_tokens.is_some() {
            tracing::debug!(provider = name, "max_tokens is not forwarded by chat completions requests");
        }
        let client = OpenRouterClient::new()
            .with_base_url(&settings.base_url)
            .map_err(|e| {
                ProviderError::Transport(format!("invalid base url '{}': {e}", settings.base_url))
            })?
            .with_timeout(timeout)
            .with_api_key(api_key)
            .map_err(|e| ProviderError::Auth(e.to_string()))?;
        Ok(Self {
            name: name.to_string(),
            model: settings.model.clone(),
            client,
        })
    }
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &GenerateRequest<'_>) -> Result<ModelAction, ProviderError> {
        let chat_request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: to_messages(request.instructions, request.history),
            tools: (!request.tools.is_empty()).then(|| to_api_tools(request.tools)),
            stream: Some(true),
            response_format: None,
            provider: None,
            models: None,
            transforms: None,
        };

        if request.debug {
            let payload = serde_json::to_value(&chat_request).unwrap_or(Value::Null);
            print_debug_payload(&self.name, &payload);
        }

        let mut stream = self
            .client
            .chat()
            .map_err(|e| classify_error_text(&e.to_string()))?
            .chat_completion_stream(chat_request);

        let mut content = String::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| classify_error_text(&e.to_string()))?;
            let choice = chunk.choices.first();

            if let Some(c) = choice.and_then(|c| c.delta.content.as_deref()) {
                content.push_str(c);
            }

            if let Some(tool_call_chunks) = choice.and_then(|c| c.delta.tool_calls.as_ref()) {
                merge_tool_call_chunks(&mut tool_calls, tool_call_chunks);
            }
        }

        tracing::debug!(
            provider = %self.name,
            chars = content.len(),
            tool_calls = tool_calls.len(),
            "response received"
        );

        let calls = tool_calls
            .into_iter()
            .enumerate()
            .map(|(i, call)| ToolCallRequest {
                call_id: if call.id.is_empty() {
                    format!("call_{}_{i}", request.history.len())
                } else {
                    call.id
                },
                name: call.function_call.name,
                arguments: parse_arguments(&call.function_call.arguments),
            })
            .collect();
        ModelAction::from_parts(content, calls)
    }
}

/// The stream can send one tool call in several chunks: only the first carries the id,
/// the rest extend its arguments.
fn merge_tool_call_chunks(tool_calls: &mut Vec<ToolCall>, chunks: &[ToolCall]) {
    for chunk in chunks {
        match tool_calls.last_mut() {
            Some(last) if chunk.id.is_empty() => {
                last.function_call.name.push_str(&chunk.function_call.name);
                last.function_call
                    .arguments
                    .push_str(&chunk.function_call.arguments);
            }
            _ => tool_calls.push(chunk.clone()),
        }
    }
}

fn message(role: &str, content: &str) -> Message {
    Message {
        role: role.to_string(),
        content: content.to_string(),
        name: None,
        tool_calls: None,
        tool_call_id: None,
    }
}

/// Renders the history as chat messages. Consecutive tool calls are grouped into the
/// assistant message that precedes them.
fn to_messages(instructions: &str, history: &History) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    if !instructions.is_empty() {
        messages.push(message("system", instructions));
    }

    for turn in history {
        match turn {
            Turn::UserMessage { text } => messages.push(message("user", text)),
            Turn::AssistantMessage { text } | Turn::FinalAnswer { text } => {
                messages.push(message("assistant", text))
            }
            Turn::ToolCall {
                call_id,
                name,
                arguments,
            } => {
                let call = ToolCall {
                    id: call_id.clone(),
                    kind: "function".to_string(),
                    function_call: FunctionCall {
                        name: name.clone(),
                        arguments: match arguments {
                            Value::String(raw) => raw.clone(),
                            other => other.to_string(),
                        },
                    },
                };
                match messages.last_mut() {
                    Some(last) if last.role == "assistant" => {
                        last.tool_calls.get_or_insert_with(Vec::new).push(call)
                    }
                    _ => {
                        let mut assistant = message("assistant", "");
                        assistant.tool_calls = Some(vec![call]);
                        messages.push(assistant);
                    }
                }
            }
            Turn::ToolResult {
                call_id,
                name,
                outcome,
            } => messages.push(Message {
                role: "tool".to_string(),
                content: outcome.to_payload().to_string(),
                name: Some(name.clone()),
                tool_call_id: Some(call_id.clone()),
                tool_calls: None,
            }),
        }
    }
    messages
}

fn to_api_tools(specs: &[ToolSpec]) -> Vec<ApiTool> {
    specs
        .iter()
        .map(|spec| ApiTool::Function {
            function: FunctionDescription {
                name: spec.name.to_string(),
                description: Some(spec.description.to_string()),
                strict: None,
                parameters: spec.json_schema(),
            },
        })
        .collect()
}
