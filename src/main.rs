//! Jarvis - Voice-driven AI assistant
//!
//! Reads lines from stdin as transcribed speech. With the wake word enabled a
//! line must contain "Hey Jarvis" to be handled; with `--no-wake` every line
//! is a typed command.

use anyhow::Result;
use clap::Parser;
use jarvis::asr::{CaptureEngine, LineCapture};
use jarvis::config::Config;
use jarvis::conversation::Role;
use jarvis::VoiceController;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn, Level};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Conversation backend (ollama, openai)
    #[arg(long)]
    backend: Option<String>,

    /// Model name for the conversation backend
    #[arg(long)]
    model: Option<String>,

    /// TTS engine (system, speechd, none)
    #[arg(long)]
    tts: Option<String>,

    /// Start dormant; every line is sent as a typed command
    #[arg(long)]
    no_wake: bool,

    /// Start with voice responses disabled
    #[arg(long)]
    mute: bool,
}

fn init_logging(verbose: bool, config_level: &str) -> Result<()> {
    let level = if verbose {
        Level::DEBUG
    } else {
        config_level.parse().unwrap_or(Level::INFO)
    };
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if let Some(model) = args.model {
        config.backend_model = model;
    }
    if let Some(tts) = args.tts {
        config.tts_engine = tts;
    }

    init_logging(args.verbose, &config.log_level)?;
    info!("🤖 Jarvis v{} starting...", env!("CARGO_PKG_VERSION"));

    let (capture, feeder) = LineCapture::new();
    let capture: Arc<dyn CaptureEngine> = Arc::new(capture);
    let controller = VoiceController::from_config(&config, Some(capture)).await;
    let (handle, task) = controller.spawn();

    if args.mute {
        handle.send_manual_utterance("mute")?;
    }
    if args.no_wake {
        info!("⌨️ Type a command, or /help for controls");
    } else {
        handle.enable_wake_word()?;
        info!("✅ Jarvis ready - say 'Hey Jarvis'");
    }

    // Print transcript turns as they arrive
    let mut transcript = handle.transcript_updates();
    tokio::spawn(async move {
        // Turn ids only grow, so retried and post-clear turns are never skipped
        let mut last_id = 0;
        while transcript.changed().await.is_ok() {
            let turns = transcript.borrow_and_update().clone();
            for turn in turns.iter() {
                if turn.id <= last_id {
                    continue;
                }
                let speaker = match turn.role {
                    Role::User => "You",
                    Role::Assistant => "Jarvis",
                };
                let marker = if turn.is_error { " (error, /retry to try again)" } else { "" };
                println!("{}: {}{}", speaker, turn.content, marker);
                last_id = turn.id;
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Interrupted");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let line = line.trim();
                match line {
                    "" => {}
                    "/quit" | "/exit" => break,
                    "/retry" => handle.retry_last_message()?,
                    "/clear" => handle.clear()?,
                    "/sleep" => handle.disable_wake_word()?,
                    "/wake" => handle.enable_wake_word()?,
                    "/status" => {
                        let snapshot = handle.snapshot();
                        println!(
                            "state: {} | muted: {} | last intent: {} | last error: {}",
                            snapshot.state,
                            snapshot.muted,
                            snapshot.last_intent.as_ref().map(|i| i.name()).unwrap_or("-"),
                            snapshot.last_error.as_deref().unwrap_or("-"),
                        );
                    }
                    "/help" => println!("/retry /clear /sleep /wake /status /quit"),
                    text if text.starts_with('/') => warn!("Unknown command: {}", text),
                    text => {
                        if args.no_wake || !handle.snapshot().capture_available {
                            handle.send_manual_utterance(text)?;
                        } else {
                            feeder.feed(text);
                        }
                    }
                }
            }
        }
    }

    handle.shutdown()?;
    task.await?;
    Ok(())
}
