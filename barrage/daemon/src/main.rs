//! Barrage Daemon - Headless Barrage Host
//!
//! Runs a barrage engine and narration queue without a window. Lines read
//! from stdin become barrages (or prompts for an Ollama model); frames are
//! written to stdout as JSON lines or summarized in the log.
//!
//! # Usage
//!
//! ```bash
//! # Plain text in, log summaries out
//! echo "Nice work! Keep it up." | barrage-daemon
//!
//! # Stream model replies and pipe frames to a renderer
//! barrage-daemon --model llama3 --output json | my-overlay
//!
//! # Speak through espeak
//! barrage-daemon --tts "espeak -s 160"
//!
//! # Verbose logging
//! RUST_LOG=debug barrage-daemon
//! ```
//!
//! Control lines such as `/pause` or `/style neon` are described in
//! [`command`].
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown
//!
//! When stdin closes the daemon keeps running until the screen and the
//! pending queue are empty.

mod command;
mod surface;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, Result};
use barrage_core::config::default_settings_path;
use barrage_core::{
    load_settings_from_path, pump_stream, AiBackend, AiRequest, BarrageEngine, BarrageHandle,
    BarrageKind, BarrageRequest, BarrageService, CommandSynthesizer, JsonFileStore,
    NarrationHandle, NarrationQueue, ScreenSize, ServiceError, SettingsOverrides,
    SilentSynthesizer, SpeechSynthesizer, StreamMode,
};
use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use command::{parse_line, Command};
use surface::{run_surface, OutputFormat};

/// Barrage Daemon - animated text barrages without a window
#[derive(Parser, Debug)]
#[command(name = "barrage-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Engine settings file (TOML)
    #[arg(short = 'c', long, env = "BARRAGE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Where the barrage config is persisted (JSON)
    #[arg(long, value_name = "PATH")]
    store: Option<PathBuf>,

    /// Screen size, e.g. 1920x1080
    #[arg(long, value_name = "WxH")]
    screen: Option<String>,

    /// Animation ticks per second
    #[arg(long, value_name = "HZ")]
    tick_hz: Option<u32>,

    /// Disable speech; narration still paces spoken barrages
    #[arg(long)]
    no_narration: bool,

    /// Speech command, or "system" for the platform default
    #[arg(long, env = "BARRAGE_TTS", value_name = "COMMAND")]
    tts: Option<String>,

    /// Ollama model; plain stdin lines become prompts when set
    #[arg(short = 'm', long, env = "BARRAGE_MODEL", value_name = "MODEL")]
    model: Option<String>,

    /// System prompt for the model
    #[arg(long, value_name = "TEXT")]
    system_prompt: Option<String>,

    /// How streamed replies are cut into barrages
    #[arg(long, value_enum, default_value_t = StreamModeArg::PerChunk)]
    stream_mode: StreamModeArg,

    /// Frame output
    #[arg(short = 'o', long, value_enum, default_value_t = OutputFormat::Summary)]
    output: OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "BARRAGE_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

/// Command-line spelling of [`StreamMode`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum StreamModeArg {
    PerChunk,
    CarryOver,
}

impl From<StreamModeArg> for StreamMode {
    fn from(arg: StreamModeArg) -> Self {
        match arg {
            StreamModeArg::PerChunk => StreamMode::PerChunk,
            StreamModeArg::CarryOver => StreamMode::CarryOver,
        }
    }
}

impl Args {
    /// Command-line settings that win over file and environment
    fn overrides(&self) -> Result<SettingsOverrides> {
        let mut overrides = SettingsOverrides::new();
        if let Some(hz) = self.tick_hz {
            overrides = overrides.with_tick_rate_hz(hz);
        }
        if self.no_narration {
            overrides = overrides.with_narration_enabled(false);
        }
        if let Some(ref path) = self.store {
            overrides = overrides.with_store_path(path.clone());
        }
        if let Some(ref screen) = self.screen {
            let size = ScreenSize::parse(screen)
                .with_context(|| format!("Invalid screen size: {screen}"))?;
            overrides = overrides.with_screen(size);
        }
        Ok(overrides)
    }

    fn synthesizer(&self) -> Arc<dyn SpeechSynthesizer> {
        let Some(ref spec) = self.tts else {
            return Arc::new(SilentSynthesizer);
        };
        if spec == "system" {
            return Arc::new(CommandSynthesizer::system_default());
        }
        let mut words = spec.split_whitespace();
        match words.next() {
            Some(program) => Arc::new(CommandSynthesizer::new(program).with_args(words)),
            None => Arc::new(SilentSynthesizer),
        }
    }
}

/// Initialize logging with the specified level
///
/// Logs go to stderr so stdout stays free for frames.
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("barrage_daemon={level},barrage_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

type ShutdownSignal = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Resolves on the first SIGTERM or SIGINT
fn shutdown_signal() -> Result<ShutdownSignal> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    Ok(Box::pin(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
            _ = sigint.recv() => info!("Received SIGINT, initiating shutdown"),
        }
    }))
}

/// Routes stdin lines to the engine, the narration queue and the model
struct Input {
    barrages: BarrageHandle,
    narration: NarrationHandle,
    backend: Option<(Box<dyn AiBackend>, String)>,
    system_prompt: Option<String>,
    stream_mode: StreamMode,
}

impl Input {
    async fn handle_line(&self, line: &str) -> Result<()> {
        let Some(command) = parse_line(line)? else {
            return Ok(());
        };

        match command {
            Command::Say { text, kind } => match self.backend {
                Some((ref backend, ref model)) if kind == BarrageKind::Normal => {
                    self.ask(backend.as_ref(), model, text).await?;
                }
                _ => {
                    let request = BarrageRequest::new(text).with_kind(kind).with_speech(true);
                    self.barrages.add_segmented(request)?;
                }
            },
            Command::Clear => {
                self.barrages.clear_all_barrages()?;
                self.narration.clear()?;
            }
            Command::Pause(paused) => self.barrages.set_paused(paused)?,
            Command::Screen(screen) => self.barrages.update_screen_size(screen)?,
            Command::Configure(change) => {
                let config = change.apply(&self.barrages.config().await?);
                match self.barrages.set_config(config).await {
                    Ok(()) => info!(?change, "Barrage config updated"),
                    Err(ServiceError::Config(e)) => {
                        warn!(error = %e, "Barrage config applied but not saved");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Command::Narration(enabled) => self.narration.set_enabled(enabled)?,
        }

        Ok(())
    }

    /// Stream a model reply into the engine, then narrate it whole
    async fn ask(&self, backend: &dyn AiBackend, model: &str, prompt: String) -> Result<()> {
        let mut request = AiRequest::new(prompt, model);
        if let Some(ref system) = self.system_prompt {
            request = request.with_system(system.clone());
        }

        let rx = backend
            .send_streaming(&request)
            .await
            .with_context(|| format!("{} request failed", backend.name()))?;
        let reply = pump_stream(rx, &self.barrages, self.stream_mode).await?;

        if !reply.trim().is_empty() {
            drop(self.narration.enqueue(reply, true));
        }
        Ok(())
    }
}

/// Wait until nothing is on screen or pending
async fn wait_until_idle(barrages: &BarrageHandle) {
    let mut frames = barrages.subscribe();
    loop {
        {
            let frame = frames.borrow_and_update();
            if frame.is_empty() && frame.pending == 0 {
                return;
            }
        }
        if frames.changed().await.is_err() {
            return;
        }
    }
}

/// Feed stdin into the engine until EOF and idle, or a signal
async fn run(input: &Input, mut shutdown: ShutdownSignal) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            () = &mut shutdown => return Ok(()),
            line = lines.next_line() => line.context("Failed to read stdin")?,
        };
        let Some(line) = line else {
            info!("Input closed, waiting for the screen to clear");
            break;
        };

        tokio::select! {
            () = &mut shutdown => return Ok(()),
            result = input.handle_line(&line) => {
                if let Err(e) = result {
                    warn!(error = %e, "Input line rejected");
                }
            }
        }
    }

    tokio::select! {
        () = &mut shutdown => {}
        () = wait_until_idle(&input.barrages) => info!("Screen idle"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging first
    init_logging(&args.log_level);

    info!("Barrage Daemon starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let settings_path = args.config.clone().or_else(default_settings_path);
    let mut settings =
        load_settings_from_path(settings_path).context("Failed to load engine settings")?;
    args.overrides()?.apply(&mut settings);
    settings.validate()?;

    info!(
        source = %settings.source(),
        tick_hz = settings.tick_rate_hz,
        screen = %settings.screen,
        narration = settings.narration_enabled,
        "Engine settings loaded"
    );

    let shutdown = shutdown_signal()?;

    // Narration runs on its own task, the engine only enqueues
    let narration = NarrationQueue::spawn(args.synthesizer(), settings.narration());

    let store_path = settings.resolved_store_path();
    info!(store_path = ?store_path, "Barrage config store");
    let engine = BarrageEngine::new(Arc::new(JsonFileStore::new(store_path)), settings.screen)
        .with_max_pending(settings.max_pending)
        .with_narration(narration.handle());
    let service = BarrageService::spawn(engine, settings.scheduler());
    let barrages = service.handle();

    let surface = tokio::spawn(run_surface(
        barrages.subscribe(),
        args.output,
        tokio::io::stdout(),
    ));

    let backend: Option<(Box<dyn AiBackend>, String)> = match args.model {
        Some(ref model) => {
            let ollama = barrage_core::OllamaBackend::from_env()?;
            if !ollama.health_check().await {
                warn!("Ollama is not reachable; prompts will fail until it is");
            }
            info!(model = %model, "Streaming replies from Ollama");
            Some((Box::new(ollama), model.clone()))
        }
        None => None,
    };

    let input = Input {
        barrages,
        narration: narration.handle(),
        backend,
        system_prompt: args.system_prompt.clone(),
        stream_mode: args.stream_mode.into(),
    };

    let result = run(&input, shutdown).await;

    // Cleanup
    info!("Shutting down...");
    drop(input);
    let engine = service.shutdown().await;
    narration.shutdown().await;
    if let Ok(ref engine) = engine {
        info!(frames = engine.frame(), "Barrage engine stopped");
    }
    drop(engine);

    match surface.await {
        Ok(Err(e)) => warn!(error = %e, "Frame output failed"),
        Err(e) => warn!(error = %e, "Frame output task failed"),
        Ok(Ok(())) => {}
    }

    match result {
        Ok(()) => {
            info!("Barrage daemon stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Daemon stopped with error");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_overrides() {
        let args = Args::parse_from([
            "barrage-daemon",
            "--screen",
            "800x600",
            "--tick-hz",
            "60",
            "--no-narration",
        ]);
        let overrides = args.overrides().unwrap();
        assert!(!overrides.is_empty());

        let mut settings = barrage_core::EngineSettings::default();
        overrides.apply(&mut settings);
        assert_eq!(settings.tick_rate_hz, 60);
        assert!(!settings.narration_enabled);
        assert_eq!(settings.screen, ScreenSize::new(800.0, 600.0));
    }

    #[test]
    fn test_bad_screen_is_rejected() {
        let args = Args::parse_from(["barrage-daemon", "--screen", "huge"]);
        assert!(args.overrides().is_err());
    }

    #[test]
    fn test_stream_mode_arg() {
        let args = Args::parse_from(["barrage-daemon", "--stream-mode", "carry-over"]);
        assert_eq!(StreamMode::from(args.stream_mode), StreamMode::CarryOver);
        assert_eq!(args.output, OutputFormat::Summary);
    }
}
