//! The capability contract every backend satisfies.
//!
//! Protocols only ever talk to a backend through [`Client`]. Local and
//! remote are two instances of the trait, possibly of the same type.
//! Transport, authentication and transport-level retries belong to the
//! implementation.

mod command;

pub use command::CommandClient;

use crate::core::{Message, Usage};
use crate::error::{ClientError, Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Default completion token limit.
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Per-call configuration passed through to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum completion tokens.
    pub max_tokens: u32,
    /// Ask the backend for a JSON object response.
    #[serde(default)]
    pub json_response: bool,
    /// Provider-specific options, forwarded untouched.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            json_response: false,
            extra: serde_json::Map::new(),
        }
    }
}

impl ChatOptions {
    /// Sets the temperature.
    #[must_use]
    pub const fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the completion token limit.
    #[must_use]
    pub const fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Requests a JSON object response.
    #[must_use]
    pub const fn json_response(mut self, enabled: bool) -> Self {
        self.json_response = enabled;
        self
    }

    /// Adds a provider-specific option.
    #[must_use]
    pub fn extra(mut self, key: &str, value: serde_json::Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }
}

/// Result of one `chat` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResult {
    /// Candidate responses, at least one.
    pub responses: Vec<String>,
    /// Tokens consumed by the call.
    #[serde(default)]
    pub usage: Usage,
    /// Finish reason per response.
    #[serde(default)]
    pub finish_reasons: Vec<String>,
}

impl CallResult {
    /// Creates a single-response result finished with `"stop"`.
    #[must_use]
    pub fn single(response: impl Into<String>, usage: Usage) -> Self {
        Self {
            responses: vec![response.into()],
            usage,
            finish_reasons: vec!["stop".to_string()],
        }
    }

    /// The first response.
    #[must_use]
    pub fn first(&self) -> &str {
        self.responses.first().map_or("", String::as_str)
    }

    /// Checks the shape invariants.
    ///
    /// # Errors
    ///
    /// Returns a non-retryable [`ClientError`] carrying this result's usage
    /// when there are no responses or the finish reasons do not line up.
    pub fn validate(&self) -> std::result::Result<(), ClientError> {
        if self.responses.is_empty() {
            return Err(ClientError::fatal("malformed response: no responses").with_usage(self.usage));
        }
        if self.finish_reasons.len() != self.responses.len() {
            return Err(ClientError::fatal(format!(
                "malformed response: {} responses but {} finish reasons",
                self.responses.len(),
                self.finish_reasons.len()
            ))
            .with_usage(self.usage));
        }
        Ok(())
    }
}

/// Uniform call contract for a model-serving backend.
///
/// Implementations must be `Send + Sync`; the Minions protocol issues calls
/// on one client from several concurrent tasks.
#[async_trait]
pub trait Client: Send + Sync {
    /// Runs a chat completion over `messages`.
    ///
    /// The protocol treats this as a single blocking step that either
    /// returns a result or fails.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] whose `retryable` flag tells the protocol
    /// whether to issue the call again.
    async fn chat(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> std::result::Result<CallResult, ClientError>;

    /// Name of the model behind this client.
    fn model_name(&self) -> &str;

    /// Whether [`embed`](Self::embed) is available.
    fn supports_embeddings(&self) -> bool {
        false
    }

    /// Embeds each text into a vector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedOperation`] unless the client overrides it.
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::UnsupportedOperation {
            operation: format!("embed ({})", self.model_name()),
        })
    }
}

#[async_trait]
impl<T: Client + ?Sized> Client for std::sync::Arc<T> {
    async fn chat(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> std::result::Result<CallResult, ClientError> {
        (**self).chat(messages, options).await
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn supports_embeddings(&self) -> bool {
        (**self).supports_embeddings()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed(texts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullClient;

    #[async_trait]
    impl Client for NullClient {
        async fn chat(
            &self,
            _messages: &[Message],
            _options: &ChatOptions,
        ) -> std::result::Result<CallResult, ClientError> {
            Ok(CallResult::single("ok", Usage::new(1, 1)))
        }

        fn model_name(&self) -> &str {
            "null"
        }
    }

    #[test]
    fn test_chat_options_defaults() {
        let options = ChatOptions::default();
        assert!((options.temperature - DEFAULT_TEMPERATURE).abs() < f32::EPSILON);
        assert_eq!(options.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(!options.json_response);
    }

    #[test]
    fn test_chat_options_builder() {
        let options = ChatOptions::default()
            .temperature(0.0)
            .max_tokens(128)
            .json_response(true)
            .extra("num_ctx", serde_json::json!(8192));
        assert_eq!(options.max_tokens, 128);
        assert!(options.json_response);
        assert_eq!(options.extra["num_ctx"], 8192);
    }

    #[test]
    fn test_call_result_validate() {
        assert!(CallResult::single("a", Usage::zero()).validate().is_ok());

        let empty = CallResult {
            responses: vec![],
            usage: Usage::new(4, 0),
            finish_reasons: vec![],
        };
        let err = empty.validate().unwrap_err();
        assert!(!err.retryable);
        assert_eq!(err.usage, Usage::new(4, 0));

        let mismatched = CallResult {
            responses: vec!["a".to_string(), "b".to_string()],
            usage: Usage::zero(),
            finish_reasons: vec!["stop".to_string()],
        };
        assert!(mismatched.validate().is_err());
    }

    #[test]
    fn test_call_result_deserialize_defaults() {
        let result: CallResult = serde_json::from_str(r#"{"responses": ["hi"]}"#).unwrap();
        assert_eq!(result.first(), "hi");
        assert!(result.usage.is_zero());
        assert!(result.finish_reasons.is_empty());
    }

    #[tokio::test]
    async fn test_embed_unsupported_by_default() {
        let client = NullClient;
        assert!(!client.supports_embeddings());
        let result = client.embed(&["text".to_string()]).await;
        assert!(matches!(result, Err(Error::UnsupportedOperation { .. })));
    }

    #[tokio::test]
    async fn test_arc_client_delegates() {
        let client: std::sync::Arc<dyn Client> = std::sync::Arc::new(NullClient);
        assert_eq!(client.model_name(), "null");
        let result = client
            .chat(&[Message::user("hi")], &ChatOptions::default())
            .await
            .unwrap();
        assert_eq!(result.usage.total_tokens(), 2);
    }

    #[tokio::test]
    async fn test_null_client_chat() {
        let result = NullClient
            .chat(&[Message::user("hi")], &ChatOptions::default())
            .await
            .unwrap();
        assert_eq!(result.first(), "ok");
    }
}
