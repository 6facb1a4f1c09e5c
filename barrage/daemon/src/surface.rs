//! Frame output
//!
//! The daemon has no window. Frames either go to stdout as JSON lines, for a
//! renderer on the other end of a pipe, or are summarized in the log.

use barrage_core::FrameSnapshot;
use clap::ValueEnum;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::info;

/// Where frames go
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One JSON snapshot per line on stdout
    Json,
    /// Log a line whenever the on-screen population changes
    #[default]
    Summary,
    /// Discard frames
    Quiet,
}

/// What the summary output tracks between frames
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Population {
    live: usize,
    pending: usize,
    paused: bool,
}

impl From<&FrameSnapshot> for Population {
    fn from(snapshot: &FrameSnapshot) -> Self {
        Self {
            live: snapshot.len(),
            pending: snapshot.pending,
            paused: snapshot.paused,
        }
    }
}

/// Render frames until the engine stops publishing
///
/// # Errors
///
/// Returns an error if a frame cannot be serialized or written.
pub async fn run_surface<W>(
    mut frames: watch::Receiver<FrameSnapshot>,
    format: OutputFormat,
    mut out: W,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut last = Population::default();

    while frames.changed().await.is_ok() {
        let snapshot = frames.borrow_and_update().clone();
        match format {
            OutputFormat::Json => {
                let mut line = serde_json::to_string(&snapshot)?;
                line.push('\n');
                out.write_all(line.as_bytes()).await?;
                out.flush().await?;
            }
            OutputFormat::Summary => {
                let now = Population::from(&snapshot);
                if now != last {
                    info!(
                        frame = snapshot.frame,
                        live = now.live,
                        pending = now.pending,
                        paused = now.paused,
                        "Barrage population changed"
                    );
                    last = now;
                }
            }
            OutputFormat::Quiet => {}
        }
    }

    Ok(())
}
