//! AI Backend Integration
//!
//! Backends produce the text that becomes barrages. The engine never calls
//! them directly: a host sends the request and hands the token stream to
//! [`pump_stream`], which forwards it into a running engine.
//!
//! # Usage
//!
//! ```ignore
//! use barrage_core::backend::{pump_stream, AiBackend, AiRequest, OllamaBackend, StreamMode};
//!
//! let backend = OllamaBackend::from_env()?;
//! let request = AiRequest::new("Cheer me on!", "llama3").with_image(screenshot);
//! let rx = backend.send_streaming(&request).await?;
//! let text = pump_stream(rx, &handle, StreamMode::PerChunk).await?;
//! ```

mod ollama;
mod stream;
mod traits;

pub use ollama::OllamaBackend;
pub use stream::{pump_stream, StreamMode};
pub use traits::{AiBackend, AiRequest, AiResponse, StreamingToken, DEFAULT_TEMPERATURE};
