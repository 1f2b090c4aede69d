use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use prepwire_core::config::LlmConfig;

use crate::anthropic::AnthropicProvider;
use crate::health::LlmHealth;
use crate::provider::{ChatMessage, ChatRole, CompletionRequest, LlmProvider};
use crate::LlmError;

/// Retry behaviour for one logical chat call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Extra attempts after the first.
    pub retries: u32,
    pub backoff: Duration,
}

impl From<&LlmConfig> for RetryPolicy {
    fn from(cfg: &LlmConfig) -> Self {
        Self {
            timeout: Duration::from_secs(cfg.timeout_secs),
            retries: cfg.retries,
            backoff: Duration::from_millis(cfg.backoff_ms),
        }
    }
}

/// The single LLM contract the engine consumes: `chat` for plain text,
/// `chat_json` for structured output. Retries transient failures
/// internally and keeps the health beacon current on every attempt.
pub struct LlmClient {
    provider: Option<Box<dyn LlmProvider>>,
    model: String,
    max_tokens: u32,
    policy: RetryPolicy,
    health: Arc<LlmHealth>,
}

impl LlmClient {
    /// Build from config. A missing credential produces a client whose
    /// calls fail fast with `NotConfigured` and a beacon that reports
    /// `configured: false`.
    pub fn from_config(cfg: &LlmConfig) -> Self {
        let provider: Option<Box<dyn LlmProvider>> = cfg.api_key.as_ref().map(|key| {
            Box::new(AnthropicProvider::new(key.clone(), cfg.base_url.clone()))
                as Box<dyn LlmProvider>
        });
        let health = Arc::new(LlmHealth::new(provider.is_some(), cfg.model.clone()));
        Self {
            provider,
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            policy: RetryPolicy::from(cfg),
            health,
        }
    }

    /// Build around an explicit provider — the seam tests script.
    pub fn with_provider(
        provider: Box<dyn LlmProvider>,
        model: impl Into<String>,
        max_tokens: u32,
        policy: RetryPolicy,
    ) -> Self {
        let model = model.into();
        let health = Arc::new(LlmHealth::new(true, model.clone()));
        Self {
            provider: Some(provider),
            model,
            max_tokens,
            policy,
            health,
        }
    }

    pub fn health(&self) -> Arc<LlmHealth> {
        Arc::clone(&self.health)
    }

    /// Plain-text completion.
    pub async fn chat(
        &self,
        system: &str,
        user: &str,
        history: &[ChatMessage],
    ) -> Result<String, LlmError> {
        let resp = self.send_with_retries(system, user, history).await?;
        Ok(resp)
    }

    /// Structured completion: runs the extraction ladder over the raw
    /// response and returns the recovered JSON object.
    pub async fn chat_json(
        &self,
        system: &str,
        user: &str,
        history: &[ChatMessage],
    ) -> Result<serde_json::Map<String, Value>, LlmError> {
        let raw = self.send_with_retries(system, user, history).await?;
        match extract_json_object(&raw) {
            Some(obj) => Ok(obj),
            None => {
                warn!(raw_len = raw.len(), "model response yielded no JSON object");
                Err(LlmError::InvalidJson)
            }
        }
    }

    async fn send_with_retries(
        &self,
        system: &str,
        user: &str,
        history: &[ChatMessage],
    ) -> Result<String, LlmError> {
        let provider = match &self.provider {
            Some(p) => p,
            None => {
                self.health.record_error("no credential configured");
                return Err(LlmError::NotConfigured);
            }
        };

        let mut messages: Vec<ChatMessage> = history.to_vec();
        messages.push(ChatMessage {
            role: ChatRole::User,
            content: user.to_string(),
        });
        let req = CompletionRequest {
            model: self.model.clone(),
            system: system.to_string(),
            messages,
            max_tokens: self.max_tokens,
        };

        let attempts = self.policy.retries + 1;
        let mut last_err = LlmError::Http("no attempt made".into());

        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.policy.backoff).await;
            }

            let outcome = tokio::time::timeout(self.policy.timeout, provider.complete(&req)).await;
            match outcome {
                Ok(Ok(resp)) => {
                    self.health.record_ok();
                    debug!(
                        attempt,
                        tokens_in = resp.tokens_in,
                        tokens_out = resp.tokens_out,
                        "chat complete"
                    );
                    return Ok(resp.content);
                }
                Ok(Err(e)) => {
                    self.health.record_error(&e.to_string());
                    let transient = e.is_transient();
                    warn!(attempt, transient, error = %e, "provider attempt failed");
                    last_err = match e {
                        crate::provider::ProviderError::Api { status, message } => {
                            LlmError::Api { status, message }
                        }
                        other => LlmError::Http(other.to_string()),
                    };
                    if !transient {
                        return Err(last_err);
                    }
                }
                Err(_) => {
                    let secs = self.policy.timeout.as_secs();
                    self.health.record_error("request timed out");
                    warn!(attempt, secs, "provider attempt timed out");
                    last_err = LlmError::Timeout { secs };
                }
            }
        }

        Err(last_err)
    }
}

/// Recover a JSON object from a model response.
///
/// Ladder: (a) parse the full response; (b) strip a markdown fence and
/// parse again; (c) slice from the first `{` to the last `}`; (d) slice
/// from the first `[` to the last `]` and accept a single-object array.
/// Anything that does not resolve to an object is a miss.
pub fn extract_json_object(raw: &str) -> Option<serde_json::Map<String, Value>> {
    let trimmed = raw.trim();

    if let Some(obj) = parse_object(trimmed) {
        return Some(obj);
    }

    if let Some(inner) = strip_fence(trimmed) {
        if let Some(obj) = parse_object(inner) {
            return Some(obj);
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Some(obj) = parse_object(&trimmed[start..=end]) {
                return Some(obj);
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) {
        if start < end {
            if let Ok(Value::Array(items)) =
                serde_json::from_str::<Value>(&trimmed[start..=end])
            {
                if let [Value::Object(obj)] = items.as_slice() {
                    return Some(obj.clone());
                }
            }
        }
    }

    None
}

fn parse_object(s: &str) -> Option<serde_json::Map<String, Value>> {
    match serde_json::from_str::<Value>(s) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => None,
    }
}

/// Strip a ``` / ```json fence, returning the inner text.
fn strip_fence(s: &str) -> Option<&str> {
    let rest = s.strip_prefix("```")?;
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches(['\r', '\n']);
    let end = rest.rfind("```")?;
    Some(rest[..end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_object() {
        let obj = extract_json_object(r#"{"intent": "answering", "confidence": 0.9}"#).unwrap();
        assert_eq!(obj["intent"], "answering");
    }

    #[test]
    fn parses_fenced_object() {
        let raw = "```json\n{\"overall_score\": 74}\n```";
        let obj = extract_json_object(raw).unwrap();
        assert_eq!(obj["overall_score"], 74);
    }

    #[test]
    fn parses_object_embedded_in_prose() {
        let raw = "Here is the rubric you asked for:\n{\"communication\": 7, \"complexity\": 4}\nHope that helps!";
        let obj = extract_json_object(raw).unwrap();
        assert_eq!(obj["complexity"], 4);
    }

    #[test]
    fn accepts_single_object_array() {
        let obj = extract_json_object(r#"[{"communication": 6}]"#).unwrap();
        assert_eq!(obj["communication"], 6);
    }

    #[test]
    fn rejects_non_objects() {
        assert!(extract_json_object("just some prose").is_none());
        assert!(extract_json_object("[1, 2, 3]").is_none());
        assert!(extract_json_object("42").is_none());
        assert!(extract_json_object("\"a string\"").is_none());
    }

    #[test]
    fn fence_without_language_tag() {
        let raw = "```\n{\"ok\": true}\n```";
        assert_eq!(extract_json_object(raw).unwrap()["ok"], true);
    }
}
