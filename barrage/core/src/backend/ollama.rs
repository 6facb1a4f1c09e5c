//! Ollama Backend
//!
//! Talks to a local Ollama server through `/api/generate`. Streaming responses
//! arrive as newline-delimited JSON:
//!
//! ```text
//! {"response":"You ","done":false}
//! {"response":"got this!","done":false}
//! {"response":"","done":true}
//! ```
//!
//! Screenshots go in the `images` array for vision models.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use super::traits::{AiBackend, AiRequest, AiResponse, StreamingToken, DEFAULT_TEMPERATURE};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Ollama backend client
#[derive(Clone, Debug)]
pub struct OllamaBackend {
    host: String,
    port: u16,
    http_client: reqwest::Client,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(host: impl Into<String>, port: u16) -> anyhow::Result<Self> {
        Ok(Self {
            host: host.into(),
            port,
            http_client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()?,
        })
    }

    /// Create from `OLLAMA_HOST` / `OLLAMA_PORT`, defaulting to `localhost:11434`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_env() -> anyhow::Result<Self> {
        let host = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| "localhost".to_string());
        let port: u16 = std::env::var("OLLAMA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(11434);

        Self::new(host, port)
    }

    fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url())
    }

    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url())
    }

    /// JSON body for `/api/generate`
    fn build_body(request: &AiRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": stream,
        });

        if let Some(ref system) = request.system {
            body["system"] = serde_json::json!(system);
        }
        if let Some(ref image) = request.image_base64 {
            body["images"] = serde_json::json!([image]);
        }
        if (request.temperature - DEFAULT_TEMPERATURE).abs() > f32::EPSILON {
            body["options"] = serde_json::json!({ "temperature": request.temperature });
        }

        body
    }

    async fn post(&self, body: &serde_json::Value) -> anyhow::Result<reqwest::Response> {
        let response = self
            .http_client
            .post(self.generate_url())
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama returned {status}: {body}");
        }
        Ok(response)
    }
}

/// One decoded NDJSON line
#[derive(Clone, Debug, PartialEq, Eq)]
struct GenerateChunk {
    response: String,
    done: bool,
}

/// Decode one `/api/generate` line; blank or malformed lines yield `None`
fn parse_line(line: &str) -> Option<GenerateChunk> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let data: serde_json::Value = serde_json::from_str(line).ok()?;
    Some(GenerateChunk {
        response: data
            .get("response")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string(),
        done: data
            .get("done")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false),
    })
}

/// Accumulates raw bytes and yields complete lines
///
/// Bytes are only decoded once a whole line is in, so a multi-byte character
/// split across two network chunks survives intact.
#[derive(Debug, Default)]
struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..pos]).into_owned());
        }
        lines
    }

    fn take_rest(&mut self) -> String {
        let rest = std::mem::take(&mut self.buffer);
        String::from_utf8_lossy(&rest).into_owned()
    }
}

#[async_trait]
impl AiBackend for OllamaBackend {
    fn name(&self) -> &str {
        "Ollama"
    }

    async fn health_check(&self) -> bool {
        self.http_client
            .get(self.tags_url())
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }

    async fn send_streaming(
        &self,
        request: &AiRequest,
    ) -> anyhow::Result<mpsc::Receiver<StreamingToken>> {
        let (tx, rx) = mpsc::channel(100);
        let response = self.post(&Self::build_body(request, true)).await?;
        let mut stream = response.bytes_stream();

        tokio::spawn(async move {
            let mut lines = LineBuffer::default();
            let mut full_response = String::new();

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(StreamingToken::Error(e.to_string())).await;
                        return;
                    }
                };

                for line in lines.push(&bytes) {
                    let Some(chunk) = parse_line(&line) else {
                        continue;
                    };
                    if !chunk.response.is_empty() {
                        full_response.push_str(&chunk.response);
                        if tx.send(StreamingToken::Token(chunk.response)).await.is_err() {
                            // Receiver dropped, stop streaming
                            return;
                        }
                    }
                    if chunk.done {
                        let _ = tx
                            .send(StreamingToken::Complete {
                                message: full_response,
                            })
                            .await;
                        return;
                    }
                }
            }

            // Stream ended without a done line
            if let Some(chunk) = parse_line(&lines.take_rest()) {
                full_response.push_str(&chunk.response);
            }
            if !full_response.is_empty() {
                let _ = tx
                    .send(StreamingToken::Complete {
                        message: full_response,
                    })
                    .await;
            }
        });

        Ok(rx)
    }

    async fn send(&self, request: &AiRequest) -> anyhow::Result<AiResponse> {
        let start = Instant::now();
        let response = self.post(&Self::build_body(request, false)).await?;
        let data: serde_json::Value = response.json().await?;

        let content = data
            .get("response")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(AiResponse {
            content,
            model: request.model.clone(),
            duration_ms: u64::try_from(start.elapsed().as_millis()).ok(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_backend_urls() {
        let backend = OllamaBackend::new("localhost", 11434).unwrap();
        assert_eq!(backend.base_url(), "http://localhost:11434");
        assert_eq!(backend.generate_url(), "http://localhost:11434/api/generate");
        assert_eq!(backend.name(), "Ollama");
    }

    #[test]
    fn test_build_body() {
        let request = AiRequest::new("Hello", "llava")
            .with_system("Be upbeat")
            .with_image("aW1n");
        let body = OllamaBackend::build_body(&request, true);

        assert_eq!(body["model"], "llava");
        assert_eq!(body["prompt"], "Hello");
        assert_eq!(body["stream"], true);
        assert_eq!(body["system"], "Be upbeat");
        assert_eq!(body["images"][0], "aW1n");
        assert!(body.get("options").is_none());

        let body = OllamaBackend::build_body(&request.with_temperature(0.2), false);
        assert_eq!(body["stream"], false);
        assert!(body["options"]["temperature"].is_number());
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(
            parse_line(r#"{"response":"Hi","done":false}"#),
            Some(GenerateChunk {
                response: "Hi".to_string(),
                done: false
            })
        );
        assert_eq!(
            parse_line(r#"{"done":true}"#),
            Some(GenerateChunk {
                response: String::new(),
                done: true
            })
        );
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line("{truncated"), None);
    }

    #[test]
    fn test_line_buffer_splits_across_chunks() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(br#"{"response":"a""#).is_empty());
        let lines = buffer.push(b",\"done\":false}\n{\"response\":\"b\"}\n{\"resp");
        assert_eq!(lines.len(), 2);
        assert_eq!(parse_line(&lines[0]).map(|c| c.response), Some("a".to_string()));
        assert_eq!(buffer.take_rest(), "{\"resp");
    }

    #[test]
    fn test_line_buffer_keeps_split_characters() {
        let line = "{\"response\":\"加油。\",\"done\":false}\n".as_bytes();
        let cut = line.iter().position(|&b| b >= 0x80).unwrap() + 1;

        let mut buffer = LineBuffer::default();
        assert!(buffer.push(&line[..cut]).is_empty());
        let lines = buffer.push(&line[cut..]);

        assert_eq!(lines.len(), 1);
        assert_eq!(
            parse_line(&lines[0]).map(|c| c.response),
            Some("加油。".to_string())
        );
        assert!(buffer.take_rest().is_empty());
    }
}
