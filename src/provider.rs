//! # Provider Adapter
//!
//! One call shape for every LLM backend: [`Provider::generate`] takes the session history
//! and the tool specs and returns the model's next [`ModelAction`]. Each backend is one
//! implementation of the trait; the execution loop never sees a wire format.

use crate::error::ProviderError;
use crate::session::History;
use crate::tools::ToolSpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub mod gemini;
pub mod openai_compat;
pub mod retry;
pub mod scripted;

pub use self::gemini::GeminiProvider;
pub use self::openai_compat::OpenAiCompatibleProvider;
pub use self::retry::{RetryPolicy, Retrying};
pub use self::scripted::ScriptedProvider;

/// The wire protocol a configured provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// `/chat/completions` as offered by OpenAI, OpenRouter, Groq, Ollama and LM Studio.
    OpenaiCompatible,
    Gemini,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub base_url: String,
    pub model: String,
    /// Stored credential. Takes precedence over `api_key_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable holding the credential. Providers without one need no key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ProviderSettings {
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| {
                self.api_key_env
                    .as_deref()
                    .and_then(|var| std::env::var(var).ok())
                    .filter(|key| !key.trim().is_empty())
            })
    }

    pub fn requires_api_key(&self) -> bool {
        self.kind == ProviderKind::Gemini || self.api_key_env.is_some()
    }

    /// The credential with everything but its edges hidden, for display.
    pub fn masked_api_key(&self) -> String {
        match self.resolve_api_key() {
            Some(key) if key.chars().count() > 9 => {
                let chars: Vec<char> = key.chars().collect();
                let head: String = chars[..5].iter().collect();
                let tail: String = chars[chars.len() - 4..].iter().collect();
                format!("{head}...{tail}")
            }
            Some(_) => "(set)".to_string(),
            None => "Not Set".to_string(),
        }
    }

    fn api_key_or_auth_error(&self, provider: &str) -> Result<Option<String>, ProviderError> {
        match self.resolve_api_key() {
            Some(key) => Ok(Some(key)),
            None if self.requires_api_key() => Err(ProviderError::Auth(match &self.api_key_env {
                Some(var) => format!(
                    "no API key for provider '{provider}'. Set it with /api <key> or export {var}."
                ),
                None => format!("no API key for provider '{provider}'. Set it with /api <key>."),
            })),
            None => Ok(None),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub name: String,
    /// Parsed arguments. Unparseable argument text is kept as a JSON string.
    pub arguments: Value,
}

/// What the model wants to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelAction {
    ToolCalls {
        text: Option<String>,
        calls: Vec<ToolCallRequest>,
    },
    FinalAnswer(String),
}

impl ModelAction {
    /// Builds the action from a collected response. A response with neither tool calls
    /// nor text is a transport failure.
    pub fn from_parts(text: String, calls: Vec<ToolCallRequest>) -> Result<Self, ProviderError> {
        let text = Some(text).filter(|t| !t.trim().is_empty());
        match (calls.is_empty(), text) {
            (false, text) => Ok(ModelAction::ToolCalls { text, calls }),
            (true, Some(text)) => Ok(ModelAction::FinalAnswer(text)),
            (true, None) => Err(ProviderError::Transport(
                "the model returned neither text nor tool calls".to_string(),
            )),
        }
    }
}

/// Everything a provider needs to produce the next action.
pub struct GenerateRequest<'a> {
    pub instructions: &'a str,
    pub history: &'a History,
    pub tools: &'a [ToolSpec],
    /// Print the raw request payload before sending it.
    pub debug: bool,
}

#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerateRequest<'_>) -> Result<ModelAction, ProviderError>;
}

/// Builds the configured backend, wrapped in the retry and timeout policy.
pub fn build_provider(
    name: &str,
    settings: &ProviderSettings,
    policy: RetryPolicy,
    timeout: Duration,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let inner: Arc<dyn Provider> = match settings.kind {
        ProviderKind::OpenaiCompatible => {
            Arc::new(OpenAiCompatibleProvider::new(name, settings, timeout)?)
        }
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(name, settings, timeout)?),
    };
    Ok(Arc::new(Retrying::new(inner, policy, timeout)))
}

/// Parses streamed or returned argument text, keeping unparseable text as a string.
pub(crate) fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Prints a request payload for `/debug`.
pub(crate) fn print_debug_payload(provider: &str, payload: &Value) {
    println!();
    println!(
        "{}",
        console::style(format!("Request being sent to '{provider}':"))
            .yellow()
            .bold()
    );
    let pretty = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|e| format!("Failed to serialize request: {e}"));
    println!("{}", console::style(pretty).dim());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(kind: ProviderKind, api_key_env: Option<&str>) -> ProviderSettings {
        ProviderSettings {
            kind,
            base_url: "http://localhost".to_string(),
            model: "m".to_string(),
            api_key: None,
            api_key_env: api_key_env.map(str::to_string),
            max_tokens: None,
        }
    }

    #[test]
    fn test_from_parts() {
        assert_eq!(
            ModelAction::from_parts("done".into(), vec![]).unwrap(),
            ModelAction::FinalAnswer("done".into())
        );
        let call = ToolCallRequest {
            call_id: "c1".into(),
            name: "read_file".into(),
            arguments: json!({"path": "a"}),
        };
        assert_eq!(
            ModelAction::from_parts("  ".into(), vec![call.clone()]).unwrap(),
            ModelAction::ToolCalls {
                text: None,
                calls: vec![call]
            }
        );
        assert!(matches!(
            ModelAction::from_parts(String::new(), vec![]),
            Err(ProviderError::Transport(_))
        ));
    }

    #[test]
    fn test_parse_arguments_keeps_broken_json_as_text() {
        assert_eq!(parse_arguments(""), json!({}));
        assert_eq!(parse_arguments(r#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(parse_arguments("{oops"), json!("{oops"));
    }

    #[test]
    fn test_missing_key_is_auth_error_only_when_required() {
        let local = settings(ProviderKind::OpenaiCompatible, None);
        assert_eq!(local.api_key_or_auth_error("ollama").unwrap(), None);

        let remote = settings(
            ProviderKind::OpenaiCompatible,
            Some("AUTOEDIT_TEST_UNSET_API_KEY_VAR"),
        );
        assert!(matches!(
            remote.api_key_or_auth_error("openai"),
            Err(ProviderError::Auth(_))
        ));
    }

    #[test]
    fn test_masked_api_key() {
        let mut s = settings(ProviderKind::Gemini, None);
        assert_eq!(s.masked_api_key(), "Not Set");
        s.api_key = Some("sk-abcdefghijklmnop".to_string());
        assert_eq!(s.masked_api_key(), "sk-ab...mnop");
    }
}
