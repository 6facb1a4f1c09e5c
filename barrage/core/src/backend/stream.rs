//! Stream pump
//!
//! Forwards backend tokens into a running engine as they arrive.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::traits::StreamingToken;
use crate::engine::BarrageRequest;
use crate::segmenter::StreamSegmenter;
use crate::service::BarrageHandle;

/// How streamed tokens become barrages
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// Segment every chunk on its own; a sentence split across chunks shows
    /// as several barrages
    #[default]
    PerChunk,
    /// Buffer the unterminated tail and emit whole sentences only
    CarryOver,
}

/// Pump `rx` into `handle` until the stream completes
///
/// Every barrage produced here is immediate, normal and silent. Returns the
/// complete response text.
///
/// # Errors
///
/// Returns an error if the backend reports a stream error or the engine task
/// is gone.
pub async fn pump_stream(
    mut rx: mpsc::Receiver<StreamingToken>,
    handle: &BarrageHandle,
    mode: StreamMode,
) -> anyhow::Result<String> {
    let mut segmenter = StreamSegmenter::new();
    let mut received = String::new();

    while let Some(token) = rx.recv().await {
        match token {
            StreamingToken::Token(chunk) => {
                received.push_str(&chunk);
                match mode {
                    StreamMode::PerChunk => handle.process_streaming_response(chunk)?,
                    StreamMode::CarryOver => {
                        for unit in segmenter.push(&chunk) {
                            handle.add_barrage(BarrageRequest::new(unit).immediate())?;
                        }
                    }
                }
            }
            StreamingToken::Complete { message } => {
                flush(&mut segmenter, handle)?;
                tracing::debug!(chars = message.chars().count(), "Stream complete");
                return Ok(message);
            }
            StreamingToken::Error(e) => {
                flush(&mut segmenter, handle)?;
                anyhow::bail!("Backend stream failed: {e}");
            }
        }
    }

    // Sender dropped without a completion marker
    flush(&mut segmenter, handle)?;
    Ok(received)
}

fn flush(segmenter: &mut StreamSegmenter, handle: &BarrageHandle) -> anyhow::Result<()> {
    if let Some(tail) = segmenter.finish() {
        handle.add_barrage(BarrageRequest::new(tail).immediate())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryStore;
    use crate::engine::{BarrageEngine, EngineEvent};
    use crate::item::ScreenSize;
    use crate::service::{BarrageService, SchedulerSettings};
    use std::sync::Arc;

    fn service() -> BarrageService {
        let engine = BarrageEngine::new(Arc::new(MemoryStore::new()), ScreenSize::default());
        BarrageService::spawn(engine, SchedulerSettings::default())
    }

    async fn feed(tokens: &[&str]) -> mpsc::Receiver<StreamingToken> {
        let (tx, rx) = mpsc::channel(16);
        for token in tokens {
            tx.send(StreamingToken::Token((*token).to_string())).await.unwrap();
        }
        tx.send(StreamingToken::Complete {
            message: tokens.concat(),
        })
        .await
        .unwrap();
        rx
    }

    async fn admitted_texts(service: BarrageService) -> Vec<String> {
        let engine = service.shutdown().await.unwrap();
        engine.live_items().iter().map(|i| i.text().to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_chunk_splits_sentences() {
        let service = service();
        let rx = feed(&["You are doi", "ng great. Keep", " going!"]).await;

        let message = pump_stream(rx, &service.handle(), StreamMode::PerChunk).await.unwrap();
        assert_eq!(message, "You are doing great. Keep going!");
        assert_eq!(
            admitted_texts(service).await,
            vec!["You are doi", "ng great.", "Keep", "going!"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_carry_over_keeps_sentences_whole() {
        let service = service();
        let rx = feed(&["You are doi", "ng great. Keep", " going"]).await;

        pump_stream(rx, &service.handle(), StreamMode::CarryOver).await.unwrap();
        assert_eq!(
            admitted_texts(service).await,
            vec!["You are doing great.", "Keep going"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_error_flushes_then_fails() {
        let service = service();
        let handle = service.handle();
        let mut events = handle.events();
        let (tx, rx) = mpsc::channel(4);
        tx.send(StreamingToken::Token("half a thought".to_string())).await.unwrap();
        tx.send(StreamingToken::Error("connection reset".to_string())).await.unwrap();

        let result = pump_stream(rx, &handle, StreamMode::CarryOver).await;
        assert!(result.unwrap_err().to_string().contains("connection reset"));

        match events.recv().await.unwrap() {
            EngineEvent::Admitted { text, .. } => assert_eq!(text, "half a thought"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_channel_returns_received_text() {
        let service = service();
        let (tx, rx) = mpsc::channel(4);
        tx.send(StreamingToken::Token("partial".to_string())).await.unwrap();
        drop(tx);

        let text = pump_stream(rx, &service.handle(), StreamMode::PerChunk).await.unwrap();
        assert_eq!(text, "partial");
    }
}
