use super::{GenerateRequest, ModelAction, Provider};
use crate::error::ProviderError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

/// Maximum retry attempts after an initial request attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Base delay before the first retry.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Longest server-requested retry-after that is honoured as is.
pub const DEFAULT_MAX_RETRY_AFTER_SECONDS: u64 = 60;

static AUTH_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(401|403)\b|unauthori[sz]ed|forbidden|invalid.?api.?key|api.?key.?(not.?valid|invalid|missing)|authentication")
        .expect("auth regex must compile")
});

static RATE_LIMITED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b429\b|rate.?limit|too many requests|quota|resource.?exhausted")
        .expect("rate limit regex must compile")
});

/// Classifies an error whose only evidence is its message.
pub fn classify_error_text(text: &str) -> ProviderError {
    if AUTH_ERROR.is_match(text) {
        ProviderError::Auth(text.to_string())
    } else if RATE_LIMITED.is_match(text) {
        ProviderError::RateLimited {
            message: text.to_string(),
            retry_after: None,
        }
    } else {
        ProviderError::Transport(text.to_string())
    }
}

/// Classifies a non-success HTTP response.
pub fn classify_status(status: u16, body: &str, retry_after: Option<Duration>) -> ProviderError {
    let message = format!("HTTP {status}: {body}");
    match status {
        401 | 403 => ProviderError::Auth(message),
        429 => ProviderError::RateLimited {
            message,
            retry_after,
        },
        _ => match classify_error_text(body) {
            ProviderError::Transport(_) => ProviderError::Transport(message),
            ProviderError::RateLimited { .. } => ProviderError::RateLimited {
                message,
                retry_after,
            },
            ProviderError::Auth(_) => ProviderError::Auth(message),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_retry_after: Duration::from_secs(DEFAULT_MAX_RETRY_AFTER_SECONDS),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with up to 50% jitter. A server-provided retry-after wins, capped
    /// at `max_retry_after`.
    pub fn delay_for(&self, attempt: u32, error: &ProviderError) -> Duration {
        if let ProviderError::RateLimited {
            retry_after: Some(retry_after),
            ..
        } = error
        {
            if *retry_after > self.max_retry_after {
                tracing::warn!(
                    requested = ?retry_after,
                    capped = ?self.max_retry_after,
                    "capping server retry-after"
                );
            }
            return (*retry_after).min(self.max_retry_after);
        }
        let base_ms = self.base_delay.as_millis() as u64;
        let backoff = base_ms.saturating_mul(2u64.saturating_pow(attempt.min(30)));
        let jitter = rand::thread_rng().gen_range(0..=base_ms / 2);
        Duration::from_millis(backoff.saturating_add(jitter))
    }
}

/// Bounds every attempt by a timeout and retries retryable failures.
pub struct Retrying {
    inner: Arc<dyn Provider>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl Retrying {
    pub fn new(inner: Arc<dyn Provider>, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            inner,
            policy,
            timeout,
        }
    }
}

#[async_trait]
impl Provider for Retrying {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, request: &GenerateRequest<'_>) -> Result<ModelAction, ProviderError> {
        let mut attempt = 0;
        loop {
            let error = match tokio::time::timeout(self.timeout, self.inner.generate(request)).await
            {
                Ok(Ok(action)) => return Ok(action),
                Ok(Err(e)) => e,
                Err(_) => ProviderError::Transport(format!(
                    "no response within {} seconds",
                    self.timeout.as_secs()
                )),
            };

            if !error.is_retryable() || attempt >= self.policy.max_retries {
                tracing::warn!(provider = self.name(), attempt, "giving up: {error}");
                return Err(error);
            }
            let delay = self.policy.delay_for(attempt, &error);
            tracing::warn!(
                provider = self.name(),
                attempt = attempt + 1,
                max = self.policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                "retrying after {error}"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ScriptedProvider;
    use crate::session::History;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        }
    }

    fn request(history: &History) -> GenerateRequest<'_> {
        GenerateRequest {
            instructions: "",
            history,
            tools: &[],
            debug: false,
        }
    }

    #[test]
    fn test_classify_error_text() {
        assert!(matches!(
            classify_error_text("HTTP 401 Unauthorized"),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            classify_error_text("Rate limit exceeded"),
            ProviderError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_error_text("connection reset by peer"),
            ProviderError::Transport(_)
        ));
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(classify_status(403, "", None), ProviderError::Auth(_)));
        assert_eq!(
            classify_status(429, "slow", Some(Duration::from_secs(7))),
            ProviderError::RateLimited {
                message: "HTTP 429: slow".to_string(),
                retry_after: Some(Duration::from_secs(7))
            }
        );
        assert!(matches!(
            classify_status(400, "API key not valid. Please pass a valid API key.", None),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            classify_status(503, "overloaded", None),
            ProviderError::Transport(_)
        ));
    }

    #[test]
    fn test_delay_grows_exponentially_and_honours_retry_after() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_retry_after: Duration::from_secs(10),
        };
        let transport = ProviderError::Transport("x".into());
        let first = policy.delay_for(0, &transport);
        let third = policy.delay_for(2, &transport);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(150));
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(450));

        let limited = ProviderError::RateLimited {
            message: "x".into(),
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(policy.delay_for(0, &limited), Duration::from_secs(3));
    }

    #[test]
    fn test_long_retry_after_is_capped() {
        let policy = RetryPolicy {
            max_retry_after: Duration::from_secs(30),
            ..RetryPolicy::default()
        };
        let limited = ProviderError::RateLimited {
            message: "x".into(),
            retry_after: Some(Duration::from_secs(86_400)),
        };
        assert_eq!(policy.delay_for(0, &limited), Duration::from_secs(30));
        assert_eq!(
            RetryPolicy::default().delay_for(1, &limited),
            Duration::from_secs(DEFAULT_MAX_RETRY_AFTER_SECONDS)
        );
    }

    #[tokio::test]
    async fn test_transport_errors_are_retried() {
        let scripted = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::Transport("reset".into())),
            Ok(ModelAction::FinalAnswer("ok".into())),
        ]));
        let retrying = Retrying::new(scripted.clone(), policy(), Duration::from_secs(5));
        let history = History::new();

        let action = retrying.generate(&request(&history)).await.unwrap();
        assert_eq!(action, ModelAction::FinalAnswer("ok".into()));
        assert_eq!(scripted.request_count(), 2);
    }

    #[tokio::test]
    async fn test_auth_errors_are_not_retried() {
        let scripted = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::Auth("bad key".into())),
            Ok(ModelAction::FinalAnswer("unreachable".into())),
        ]));
        let retrying = Retrying::new(scripted.clone(), policy(), Duration::from_secs(5));
        let history = History::new();

        let err = retrying.generate(&request(&history)).await.unwrap_err();
        assert!(matches!(err, ProviderError::Auth(_)));
        assert_eq!(scripted.request_count(), 1);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let scripted = Arc::new(ScriptedProvider::new(
            (0..5)
                .map(|_| Err(ProviderError::Transport("down".into())))
                .collect(),
        ));
        let retrying = Retrying::new(scripted.clone(), policy(), Duration::from_secs(5));
        let history = History::new();

        assert!(retrying.generate(&request(&history)).await.is_err());
        assert_eq!(scripted.request_count(), 3);
    }

    #[tokio::test]
    async fn test_timeout_is_transport_error() {
        let scripted = Arc::new(
            ScriptedProvider::new(vec![Ok(ModelAction::FinalAnswer("late".into()))])
                .with_delay(Duration::from_secs(10)),
        );
        let retrying = Retrying::new(
            scripted,
            RetryPolicy {
                max_retries: 0,
                base_delay: Duration::from_millis(1),
                ..RetryPolicy::default()
            },
            Duration::from_millis(20),
        );
        let history = History::new();

        let err = retrying.generate(&request(&history)).await.unwrap_err();
        assert!(matches!(err, ProviderError::Transport(_)));
    }
}
