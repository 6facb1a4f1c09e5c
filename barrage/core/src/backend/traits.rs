//! AI Backend Traits
//!
//! The engine only consumes text. Backends turn a prompt (and optionally a
//! screenshot) into either one completed response or a stream of tokens.

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Token stream events from AI backends
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamingToken {
    /// A chunk of the response
    Token(String),
    /// Response completed successfully
    Complete {
        /// The complete message
        message: String,
    },
    /// Error occurred during streaming
    Error(String),
}

/// One request to an AI backend
#[derive(Clone, Debug, PartialEq)]
pub struct AiRequest {
    /// The prompt to send
    pub prompt: String,
    /// Model to use (backend-specific identifier)
    pub model: String,
    /// Base64-encoded screenshot for vision models
    pub image_base64: Option<String>,
    /// System prompt (optional, prepended to the prompt)
    pub system: Option<String>,
    /// Whether to stream the response
    pub stream: bool,
    /// Temperature (0.0-1.0, higher = more creative)
    pub temperature: f32,
}

/// Temperature sent when none is configured
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

impl Default for AiRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            model: String::new(),
            image_base64: None,
            system: None,
            stream: true,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl AiRequest {
    /// Create a new request with prompt and model
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Attach a base64-encoded screenshot
    #[must_use]
    pub fn with_image(mut self, image_base64: impl Into<String>) -> Self {
        self.image_base64 = Some(image_base64.into());
        self
    }

    /// Set system prompt
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set streaming mode
    #[must_use]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }
}

/// Response from a non-streaming request
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AiResponse {
    /// The response text
    pub content: String,
    /// Model that generated the response
    pub model: String,
    /// Response generation time in milliseconds
    pub duration_ms: Option<u64>,
}

/// AI backend
///
/// Implement this trait to feed barrages from a different provider.
#[async_trait]
pub trait AiBackend: Send + Sync {
    /// Get the backend name (e.g., "Ollama")
    fn name(&self) -> &str;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Send a request and get a streaming response
    ///
    /// The channel closes when the response is complete or an error occurs.
    async fn send_streaming(
        &self,
        request: &AiRequest,
    ) -> anyhow::Result<mpsc::Receiver<StreamingToken>>;

    /// Send a request and wait for the complete response
    async fn send(&self, request: &AiRequest) -> anyhow::Result<AiResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = AiRequest::new("How am I doing?", "llava")
            .with_image("aGVsbG8=")
            .with_system("Cheer the user on")
            .with_stream(false)
            .with_temperature(3.0);

        assert_eq!(request.image_base64.as_deref(), Some("aGVsbG8="));
        assert_eq!(request.system.as_deref(), Some("Cheer the user on"));
        assert!(!request.stream);
        assert!((request.temperature - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_request_defaults() {
        let request = AiRequest::default();
        assert!(request.stream);
        assert!(request.image_base64.is_none());
        assert!((request.temperature - DEFAULT_TEMPERATURE).abs() < f32::EPSILON);
    }
}
