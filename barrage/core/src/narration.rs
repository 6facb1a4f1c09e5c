//! Narration Queue
//!
//! Reads barrages aloud one at a time, at a pace a human can follow.
//!
//! # Design
//!
//! A single worker task owns the FIFO and the in-flight utterance. Callers
//! talk to it through a cloneable [`NarrationHandle`]; sends never block.
//!
//! ```text
//!   enqueue ──► [ FIFO ] ──► worker ──► speak(text) ─┐
//!                              ▲        or fallback  │
//!                              │                     ▼
//!                              └──── cooldown ◄── finish (ticket resolved)
//! ```
//!
//! - When narration is enabled and the entry asks to be spoken, the worker
//!   awaits [`SpeechSynthesizer::speak`]. Otherwise it waits the fallback
//!   duration, so visual-only entries keep the same cadence.
//! - A speech error is logged and followed by the fallback wait.
//! - Every entry's [`NarrationTicket`] resolves exactly once. [`clear`]
//!   resolves the in-flight entry and everything queued as `Cancelled`.
//! - A synthesizer that never completes stalls the queue. There is no
//!   watchdog.
//!
//! [`clear`]: NarrationHandle::clear

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

// =============================================================================
// Speech Capability
// =============================================================================

/// Text-to-speech capability
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Speak `text`, resolving when the utterance ends
    async fn speak(&self, text: &str) -> anyhow::Result<()>;

    /// Stop any utterance in progress
    async fn stop(&self);
}

/// Synthesizer that only logs
#[derive(Clone, Copy, Debug, Default)]
pub struct SilentSynthesizer;

#[async_trait]
impl SpeechSynthesizer for SilentSynthesizer {
    fn name(&self) -> &str {
        "silent"
    }

    async fn speak(&self, text: &str) -> anyhow::Result<()> {
        tracing::debug!(text, "Narration (silent)");
        Ok(())
    }

    async fn stop(&self) {}
}

/// Synthesizer backed by a system TTS command (`say`, `espeak`...)
///
/// The text is passed as the last argument. The child process is killed when
/// the utterance is cancelled.
#[derive(Clone, Debug)]
pub struct CommandSynthesizer {
    program: String,
    args: Vec<String>,
}

impl CommandSynthesizer {
    /// Run `program <text>`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Extra arguments placed before the text
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// `say` on macOS, `espeak` elsewhere
    #[must_use]
    pub fn system_default() -> Self {
        if cfg!(target_os = "macos") {
            Self::new("say")
        } else {
            Self::new("espeak")
        }
    }

    /// Program name
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl SpeechSynthesizer for CommandSynthesizer {
    fn name(&self) -> &str {
        &self.program
    }

    async fn speak(&self, text: &str) -> anyhow::Result<()> {
        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let status = child.wait().await?;
        if !status.success() {
            anyhow::bail!("{} exited with {status}", self.program);
        }
        Ok(())
    }

    async fn stop(&self) {
        // The child lives inside the cancelled speak future and is killed on drop
        tracing::debug!(program = %self.program, "Speech stopped");
    }
}

// =============================================================================
// Settings, Outcomes and Errors
// =============================================================================

/// Narration pacing
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrationSettings {
    /// Speak entries that ask for it
    pub enabled: bool,
    /// Delay used instead of speech
    pub fallback: Duration,
    /// Pause after each entry
    pub cooldown: Duration,
}

impl Default for NarrationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            fallback: Duration::from_secs(2),
            cooldown: Duration::from_millis(500),
        }
    }
}

/// How a narration entry ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrationOutcome {
    /// The synthesizer finished speaking
    Spoken,
    /// Paced by the fallback delay without speech
    Skipped,
    /// Speech failed; paced by the fallback delay
    Failed,
    /// Dropped by `clear` or shutdown
    Cancelled,
}

/// Errors from the narration queue
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NarrationError {
    /// The worker task is gone
    #[error("Narration queue is closed")]
    Closed,
}

/// Worker status, published after every change
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NarrationStatus {
    /// Entries waiting behind the active one
    pub pending: usize,
    /// An entry is being spoken or paced
    pub active: bool,
    /// Narration enabled flag
    pub enabled: bool,
}

/// Completion handle for one narration entry
#[derive(Debug)]
pub struct NarrationTicket {
    rx: oneshot::Receiver<NarrationOutcome>,
}

impl NarrationTicket {
    /// Wait for the entry to finish
    ///
    /// Resolves to `Cancelled` if the queue went away first.
    pub async fn outcome(self) -> NarrationOutcome {
        self.rx.await.unwrap_or(NarrationOutcome::Cancelled)
    }

    /// Outcome if already resolved
    pub fn try_outcome(&mut self) -> Option<NarrationOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(NarrationOutcome::Cancelled),
        }
    }
}

// =============================================================================
// Handle
// =============================================================================

struct NarrationEntry {
    text: String,
    should_speak: bool,
    completion: oneshot::Sender<NarrationOutcome>,
}

impl NarrationEntry {
    fn finish(self, outcome: NarrationOutcome) {
        // The caller may have dropped its ticket
        let _ = self.completion.send(outcome);
    }
}

enum NarrationCommand {
    Enqueue(NarrationEntry),
    Clear,
    SetEnabled(bool),
    Shutdown,
}

/// Cloneable sender side of the narration queue
#[derive(Clone)]
pub struct NarrationHandle {
    tx: mpsc::UnboundedSender<NarrationCommand>,
    status: watch::Receiver<NarrationStatus>,
}

impl std::fmt::Debug for NarrationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NarrationHandle")
            .field("closed", &self.tx.is_closed())
            .finish_non_exhaustive()
    }
}

impl NarrationHandle {
    /// Queue `text`; the ticket resolves `Cancelled` if the queue is closed
    pub fn enqueue(&self, text: impl Into<String>, should_speak: bool) -> NarrationTicket {
        let (completion, rx) = oneshot::channel();
        let entry = NarrationEntry {
            text: text.into(),
            should_speak,
            completion,
        };
        if let Err(mpsc::error::SendError(NarrationCommand::Enqueue(entry))) =
            self.tx.send(NarrationCommand::Enqueue(entry))
        {
            entry.finish(NarrationOutcome::Cancelled);
        }
        NarrationTicket { rx }
    }

    /// Drop everything queued and cancel the active utterance
    ///
    /// # Errors
    ///
    /// Returns [`NarrationError::Closed`] if the worker is gone.
    pub fn clear(&self) -> Result<(), NarrationError> {
        self.tx
            .send(NarrationCommand::Clear)
            .map_err(|_| NarrationError::Closed)
    }

    /// Toggle speech; pacing continues either way
    ///
    /// # Errors
    ///
    /// Returns [`NarrationError::Closed`] if the worker is gone.
    pub fn set_enabled(&self, enabled: bool) -> Result<(), NarrationError> {
        self.tx
            .send(NarrationCommand::SetEnabled(enabled))
            .map_err(|_| NarrationError::Closed)
    }

    /// Latest worker status
    #[must_use]
    pub fn status(&self) -> NarrationStatus {
        *self.status.borrow()
    }

    /// Watch worker status changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<NarrationStatus> {
        self.status.clone()
    }

    /// Check if the worker is gone
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// =============================================================================
// Queue
// =============================================================================

/// Owner of the narration worker task
///
/// Dropping the queue aborts the worker; outstanding tickets then resolve
/// `Cancelled`.
pub struct NarrationQueue {
    handle: NarrationHandle,
    task: Option<JoinHandle<()>>,
}

impl NarrationQueue {
    /// Start the worker on the current tokio runtime
    pub fn spawn(synth: Arc<dyn SpeechSynthesizer>, settings: NarrationSettings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(NarrationStatus {
            enabled: settings.enabled,
            ..NarrationStatus::default()
        });

        tracing::info!(
            synth = synth.name(),
            enabled = settings.enabled,
            fallback_ms = settings.fallback.as_millis() as u64,
            cooldown_ms = settings.cooldown.as_millis() as u64,
            "Narration queue started"
        );

        let worker = Worker {
            synth,
            settings,
            queue: VecDeque::new(),
            rx,
            closed: false,
            active: false,
            status: status_tx,
        };
        let task = tokio::spawn(worker.run());

        Self {
            handle: NarrationHandle {
                tx,
                status: status_rx,
            },
            task: Some(task),
        }
    }

    /// A handle for producers
    #[must_use]
    pub fn handle(&self) -> NarrationHandle {
        self.handle.clone()
    }

    /// Cancel everything and wait for the worker to exit
    pub async fn shutdown(mut self) {
        let _ = self.handle.tx.send(NarrationCommand::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Narration worker ended abnormally");
            }
        }
    }
}

impl Drop for NarrationQueue {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// =============================================================================
// Worker
// =============================================================================

/// What a command means for the entry in progress
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Interrupt {
    None,
    Cancel,
    Shutdown,
}

/// Result of waiting out a pacing delay
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Wait {
    Elapsed,
    Interrupted(Interrupt),
}

struct Worker {
    synth: Arc<dyn SpeechSynthesizer>,
    settings: NarrationSettings,
    queue: VecDeque<NarrationEntry>,
    rx: mpsc::UnboundedReceiver<NarrationCommand>,
    closed: bool,
    active: bool,
    status: watch::Sender<NarrationStatus>,
}

impl Worker {
    async fn run(mut self) {
        loop {
            let Some(entry) = self.queue.pop_front() else {
                if self.closed {
                    break;
                }
                let command = self.rx.recv().await;
                if self.apply(command) == Interrupt::Shutdown {
                    break;
                }
                continue;
            };

            self.active = true;
            self.publish();
            let interrupt = self.play(entry).await;
            self.active = false;
            self.publish();

            match interrupt {
                Interrupt::Shutdown => break,
                Interrupt::Cancel => continue,
                Interrupt::None => {}
            }

            let deadline = Instant::now() + self.settings.cooldown;
            if self.wait_until(deadline).await == Wait::Interrupted(Interrupt::Shutdown) {
                break;
            }
        }

        self.cancel_queued();
        tracing::debug!("Narration worker stopped");
    }

    /// Speak or pace one entry and resolve its ticket
    async fn play(&mut self, entry: NarrationEntry) -> Interrupt {
        let speak = self.settings.enabled && entry.should_speak;

        if speak {
            let synth = Arc::clone(&self.synth);
            let text = entry.text.clone();
            let mut utterance = Box::pin(async move { synth.speak(&text).await });

            let result = loop {
                tokio::select! {
                    result = &mut utterance => break Ok(result),
                    command = self.rx.recv(), if !self.closed => {
                        let interrupt = self.apply(command);
                        if interrupt != Interrupt::None {
                            break Err(interrupt);
                        }
                    }
                }
            };

            return match result {
                Ok(Ok(())) => {
                    entry.finish(NarrationOutcome::Spoken);
                    Interrupt::None
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        synth = self.synth.name(),
                        error = %e,
                        "Speech failed, falling back to timed pacing"
                    );
                    self.pace(entry, NarrationOutcome::Failed).await
                }
                Err(interrupt) => {
                    // Dropping the utterance cancels it; out-of-process
                    // synthesizers also get an explicit stop.
                    drop(utterance);
                    self.synth.stop().await;
                    entry.finish(NarrationOutcome::Cancelled);
                    interrupt
                }
            };
        }

        self.pace(entry, NarrationOutcome::Skipped).await
    }

    /// Hold `entry` for the fallback duration, then resolve it with `outcome`
    async fn pace(&mut self, entry: NarrationEntry, outcome: NarrationOutcome) -> Interrupt {
        let deadline = Instant::now() + self.settings.fallback;
        match self.wait_until(deadline).await {
            Wait::Elapsed => {
                entry.finish(outcome);
                Interrupt::None
            }
            Wait::Interrupted(interrupt) => {
                entry.finish(NarrationOutcome::Cancelled);
                interrupt
            }
        }
    }

    /// Wait for `deadline` while still serving commands
    async fn wait_until(&mut self, deadline: Instant) -> Wait {
        let timer = tokio::time::sleep_until(deadline);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                () = &mut timer => return Wait::Elapsed,
                command = self.rx.recv(), if !self.closed => {
                    let interrupt = self.apply(command);
                    if interrupt != Interrupt::None {
                        return Wait::Interrupted(interrupt);
                    }
                }
            }
        }
    }

    fn apply(&mut self, command: Option<NarrationCommand>) -> Interrupt {
        let interrupt = match command {
            None => {
                self.closed = true;
                Interrupt::None
            }
            Some(NarrationCommand::Enqueue(entry)) => {
                tracing::trace!(text = %entry.text, "Narration queued");
                self.queue.push_back(entry);
                Interrupt::None
            }
            Some(NarrationCommand::SetEnabled(enabled)) => {
                tracing::info!(enabled, "Narration toggled");
                self.settings.enabled = enabled;
                Interrupt::None
            }
            Some(NarrationCommand::Clear) => {
                let dropped = self.cancel_queued();
                tracing::debug!(dropped, "Narration cleared");
                Interrupt::Cancel
            }
            Some(NarrationCommand::Shutdown) => {
                self.cancel_queued();
                self.closed = true;
                self.rx.close();
                Interrupt::Shutdown
            }
        };
        self.publish();
        interrupt
    }

    fn cancel_queued(&mut self) -> usize {
        let dropped = self.queue.len();
        for entry in self.queue.drain(..) {
            entry.finish(NarrationOutcome::Cancelled);
        }
        dropped
    }

    fn publish(&self) {
        self.status.send_replace(NarrationStatus {
            pending: self.queue.len(),
            active: self.active,
            enabled: self.settings.enabled,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records every utterance and tracks overlap
    #[derive(Default)]
    struct RecordingSynth {
        spoken: Mutex<Vec<(String, Instant)>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        stops: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl SpeechSynthesizer for RecordingSynth {
        fn name(&self) -> &str {
            "recording"
        }

        async fn speak(&self, text: &str) -> anyhow::Result<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.spoken.lock().push((text.to_string(), Instant::now()));
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("no audio device");
            }
            Ok(())
        }

        async fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Never finishes speaking
    #[derive(Default)]
    struct StuckSynth {
        stops: AtomicUsize,
    }

    #[async_trait]
    impl SpeechSynthesizer for StuckSynth {
        fn name(&self) -> &str {
            "stuck"
        }

        async fn speak(&self, _text: &str) -> anyhow::Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }

        async fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn wait_for_active(handle: &NarrationHandle) {
        let mut status = handle.subscribe();
        while !status.borrow_and_update().active {
            if status.changed().await.is_err() {
                return;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_entries_complete_sequentially() {
        let synth = Arc::new(RecordingSynth::default());
        let queue = NarrationQueue::spawn(synth.clone(), NarrationSettings::default());
        let handle = queue.handle();

        let tickets: Vec<_> = ["one", "two", "three"]
            .into_iter()
            .map(|text| handle.enqueue(text, true))
            .collect();

        let mut finished_at = Vec::new();
        for ticket in tickets {
            assert_eq!(ticket.outcome().await, NarrationOutcome::Spoken);
            finished_at.push(Instant::now());
        }

        let spoken = synth.spoken.lock().clone();
        let texts: Vec<&str> = spoken.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert_eq!(synth.max_in_flight.load(Ordering::SeqCst), 1);

        // Each utterance starts only after the previous one finished and
        // the cooldown passed
        for pair in spoken.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_millis(500));
        }
        assert!(finished_at.windows(2).all(|w| w[0] <= w[1]));

        queue.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unspoken_entry_waits_fallback() {
        let synth = Arc::new(RecordingSynth::default());
        let queue = NarrationQueue::spawn(synth.clone(), NarrationSettings::default());

        let start = Instant::now();
        let outcome = queue.handle().enqueue("visual only", false).outcome().await;

        assert_eq!(outcome, NarrationOutcome::Skipped);
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(synth.spoken.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_narration_keeps_pacing() {
        let synth = Arc::new(RecordingSynth::default());
        let queue = NarrationQueue::spawn(synth.clone(), NarrationSettings::default());
        let handle = queue.handle();
        handle.set_enabled(false).unwrap();

        let start = Instant::now();
        let first = handle.enqueue("a", true);
        let second = handle.enqueue("b", true);
        assert_eq!(first.outcome().await, NarrationOutcome::Skipped);
        assert_eq!(second.outcome().await, NarrationOutcome::Skipped);

        // fallback + cooldown + fallback
        assert!(start.elapsed() >= Duration::from_millis(4500));
        assert!(synth.spoken.lock().is_empty());
        assert!(!handle.status().enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_speech_error_is_swallowed() {
        let synth = Arc::new(RecordingSynth {
            fail: true,
            ..RecordingSynth::default()
        });
        let queue = NarrationQueue::spawn(synth.clone(), NarrationSettings::default());
        let handle = queue.handle();

        let start = Instant::now();
        assert_eq!(handle.enqueue("x", true).outcome().await, NarrationOutcome::Failed);
        assert!(start.elapsed() >= Duration::from_secs(2));

        // The queue keeps working after a failure
        assert_eq!(handle.enqueue("y", true).outcome().await, NarrationOutcome::Failed);
        assert_eq!(synth.spoken.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_active_and_queued() {
        let synth = Arc::new(StuckSynth::default());
        let queue = NarrationQueue::spawn(synth.clone(), NarrationSettings::default());
        let handle = queue.handle();

        let first = handle.enqueue("stuck", true);
        let second = handle.enqueue("waiting", true);
        wait_for_active(&handle).await;

        handle.clear().unwrap();
        assert_eq!(first.outcome().await, NarrationOutcome::Cancelled);
        assert_eq!(second.outcome().await, NarrationOutcome::Cancelled);
        assert_eq!(synth.stops.load(Ordering::SeqCst), 1);

        // Clearing an idle queue is harmless
        handle.clear().unwrap();
        handle.clear().unwrap();
        assert_eq!(synth.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_during_fallback() {
        let queue = NarrationQueue::spawn(Arc::new(SilentSynthesizer), NarrationSettings::default());
        let handle = queue.handle();

        let mut ticket = handle.enqueue("paced", false);
        wait_for_active(&handle).await;
        assert_eq!(ticket.try_outcome(), None);

        handle.clear().unwrap();
        assert_eq!(ticket.outcome().await, NarrationOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tickets_cancelled_after_shutdown() {
        let queue = NarrationQueue::spawn(Arc::new(StuckSynth::default()), NarrationSettings::default());
        let handle = queue.handle();
        let active = handle.enqueue("a", true);
        let queued = handle.enqueue("b", true);
        wait_for_active(&handle).await;

        queue.shutdown().await;
        assert_eq!(active.outcome().await, NarrationOutcome::Cancelled);
        assert_eq!(queued.outcome().await, NarrationOutcome::Cancelled);

        assert!(handle.is_closed());
        assert_eq!(handle.enqueue("late", true).outcome().await, NarrationOutcome::Cancelled);
        assert_eq!(handle.clear(), Err(NarrationError::Closed));
    }

    #[tokio::test]
    async fn test_silent_synth_speaks_instantly() {
        let synth = SilentSynthesizer;
        tokio_test::assert_ok!(synth.speak("hello").await);
        assert_eq!(synth.name(), "silent");
    }
}
