//! Google Gemini `generateContent` over plain `reqwest`.

use super::retry::classify_status;
use super::{
    GenerateRequest, ModelAction, Provider, ProviderSettings, ToolCallRequest, print_debug_payload,
};
use crate::error::ProviderError;
use crate::session::{History, Turn};
use crate::tools::ToolSpec;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::time::Duration;

pub struct GeminiProvider {
    name: String,
    model: String,
    base_url: String,
    api_key: String,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Deserialize, Debug)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

impl GeminiProvider {
    pub fn new(
        name: &str,
        settings: &ProviderSettings,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let api_key = settings.api_key_or_auth_error(name)?.unwrap_or_default();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            name: name.to_string(),
            model: settings.model.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_tokens: settings.max_tokens,
            client,
        })
    }

    fn payload(&self, request: &GenerateRequest<'_>) -> Value {
        let mut payload = Map::new();
        if !request.instructions.is_empty() {
            payload.insert(
                "systemInstruction".to_string(),
                json!({ "parts": [{ "text": request.instructions }] }),
            );
        }
        payload.insert(
            "contents".to_string(),
            Value::Array(to_contents(request.history)),
        );
        if !request.tools.is_empty() {
            payload.insert(
                "tools".to_string(),
                json!([{ "functionDeclarations": to_declarations(request.tools) }]),
            );
            payload.insert(
                "toolConfig".to_string(),
                json!({ "functionCallingConfig": { "mode": "AUTO" } }),
            );
        }
        if let Some(max_tokens) = self.max_tokens {
            payload.insert(
                "generationConfig".to_string(),
                json!({ "maxOutputTokens": max_tokens }),
            );
        }
        Value::Object(payload)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &GenerateRequest<'_>) -> Result<ModelAction, ProviderError> {
        let url = format!("{}/{}:generateContent", self.base_url, self.model);
        let payload = self.payload(request);
        if request.debug {
            print_debug_payload(&self.name, &payload);
        }

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), &body, retry_after));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Transport(format!("invalid response body: {e}")))?;
        from_response(body, request.history)
    }
}

fn from_response(
    body: GenerateContentResponse,
    history: &History,
) -> Result<ModelAction, ProviderError> {
    let Some(candidate) = body.candidates.into_iter().next() else {
        return Err(ProviderError::Transport(
            "the response contained no candidates".to_string(),
        ));
    };
    if let Some(reason) = &candidate.finish_reason {
        tracing::debug!(finish_reason = %reason, "gemini candidate finished");
    }

    let mut text = String::new();
    let mut calls = Vec::new();
    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        if let Some(t) = part.text {
            text.push_str(&t);
        }
        if let Some(call) = part.function_call {
            calls.push(ToolCallRequest {
                // Gemini does not identify calls; derive ids unique within the session.
                call_id: format!("gemini_call_{}_{}", history.len(), calls.len()),
                name: call.name,
                arguments: match call.args {
                    Value::Null => Value::Object(Map::new()),
                    args => args,
                },
            });
        }
    }
    ModelAction::from_parts(text, calls)
}

/// Renders the history as Gemini contents. Function calls join the model turn before
/// them and consecutive function responses share one turn.
fn to_contents(history: &History) -> Vec<Value> {
    let mut contents: Vec<(String, Vec<Value>)> = Vec::new();
    for turn in history {
        let (role, part, merge) = match turn {
            Turn::UserMessage { text } => ("user", json!({ "text": text }), false),
            Turn::AssistantMessage { text } | Turn::FinalAnswer { text } => {
                ("model", json!({ "text": text }), false)
            }
            Turn::ToolCall {
                name, arguments, ..
            } => {
                let args = match arguments {
                    Value::Object(_) => arguments.clone(),
                    _ => json!({}),
                };
                (
                    "model",
                    json!({ "functionCall": { "name": name, "args": args } }),
                    true,
                )
            }
            Turn::ToolResult { name, outcome, .. } => (
                "user",
                json!({
                    "functionResponse": {
                        "name": name,
                        "response": outcome.to_payload(),
                    }
                }),
                true,
            ),
        };

        match contents.last_mut() {
            Some((last_role, parts)) if merge && last_role.as_str() == role => parts.push(part),
            _ => contents.push((role.to_string(), vec![part])),
        }
    }

    contents
        .into_iter()
        .map(|(role, parts)| json!({ "role": role, "parts": parts }))
        .collect()
}

/// Function declarations use an OpenAPI subset without `additionalProperties`.
fn to_declarations(specs: &[ToolSpec]) -> Vec<Value> {
    specs
        .iter()
        .map(|spec| {
            let mut parameters = spec.json_schema();
            if let Value::Object(map) = &mut parameters {
                map.remove("additionalProperties");
            }
            json!({
                "name": spec.name,
                "description": spec.description,
                "parameters": parameters,
            })
        })
        .collect()
}

/// Parse `Retry-After` header into a Duration (numeric seconds only).
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?;
    let secs: f64 = value.parse().ok()?;
    (secs > 0.0).then(|| Duration::from_secs_f64(secs))
}
