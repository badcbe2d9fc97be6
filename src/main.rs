//! smart-home-voice: voice pipeline daemon for an ambient smart-home display
//!
//! Runs alongside the display UI and provides:
//! - Always-on wake-phrase listening over a pluggable speech-to-text host
//! - Command capture, interpretation through a generative-language service,
//!   and spoken replies
//! - Reminder storage and recipe suggestions for the display
//! - IPC server for the display to query status and steer the pipeline

mod capture;
mod config;
mod events;
mod greeting;
mod interpreter;
mod ipc;
mod lifecycle;
mod recognizer;
mod reminders;
mod speech;
mod state;
mod wake;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, RecognizerBackend, ReminderBackend};
use crate::events::StateEvent;
use crate::interpreter::{ChefAdvisor, GeminiClient, ServiceInterpreter};
use crate::ipc::{Server, ServerContext};
use crate::lifecycle::ShutdownSignal;
use crate::recognizer::{ConsoleRecognizer, ConsoleTiming, SpeechRecognizer, UnavailableRecognizer};
use crate::reminders::{JsonFileStore, MemoryStore, ReminderStore};
use crate::speech::{CommandSynthesizer, LogSynthesizer, SpeechSynthesizer};
use crate::state::{Collaborators, Controller};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "smart-home-voice starting");

    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, language = %config.language, "configuration loaded");

    let mut shutdown = ShutdownSignal::new()?;

    // Recognizer, timers, interpreter and IPC -> controller
    let (pipeline_tx, pipeline_rx) = mpsc::channel(64);
    // Controller -> IPC server and subscribers
    let (event_tx, _event_rx) = broadcast::channel::<StateEvent>(64);

    let recognizer: Arc<dyn SpeechRecognizer> = match config.recognizer {
        RecognizerBackend::Console => {
            info!("reading transcripts from stdin");
            Arc::new(ConsoleRecognizer::stdin(pipeline_tx.clone(), ConsoleTiming::default()))
        }
        RecognizerBackend::None => Arc::new(UnavailableRecognizer),
    };

    let synthesizer: Arc<dyn SpeechSynthesizer> = match &config.tts_command {
        Some(program) => Arc::new(CommandSynthesizer::new(program.clone(), config.voice_settings())),
        None => Arc::new(LogSynthesizer::new(config.voice_settings())),
    };

    let reminders: Arc<dyn ReminderStore> = match config.reminder_backend {
        ReminderBackend::File => {
            let store = JsonFileStore::new(&config.reminders_path);
            info!(path = ?store.path(), "reminders stored on disk");
            Arc::new(store)
        }
        ReminderBackend::Memory => {
            warn!("reminders kept in memory only (demo mode)");
            Arc::new(MemoryStore::default())
        }
    };

    let gemini = GeminiClient::new(config.service_settings())?;
    if !gemini.has_api_key() {
        warn!("no API key configured, commands will be answered with an apology");
    }
    let chef = ChefAdvisor::new(Arc::new(gemini.clone()));
    let interpreter = ServiceInterpreter::new(gemini, Arc::clone(&reminders));

    let mut controller = Controller::new(
        config.pipeline_settings(),
        Collaborators {
            recognizer,
            synthesizer,
            interpreter: Arc::new(interpreter),
        },
        pipeline_tx.clone(),
        event_tx.clone(),
    );

    let context = ServerContext {
        control: pipeline_tx,
        reminders,
        chef,
    };
    let server = Server::with_events(&config.socket_path, context, event_tx.clone())?;

    let mut status_rx = event_tx.subscribe();
    let server_for_events = &server;

    info!("daemon initialized, entering main loop");

    tokio::select! {
        _ = controller.run(pipeline_rx) => {
            info!("voice pipeline exited");
        }

        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Keep the status snapshot in step with the pipeline
        _ = async {
            loop {
                match status_rx.recv().await {
                    Ok(event) => server_for_events.apply_event(&event).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "state event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("state event handler exited");
        }

        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    info!(mode = %controller.current_mode(), "shutting down...");

    controller.shutdown();
    server.shutdown().await;

    info!("smart-home-voice stopped");

    Ok(())
}
