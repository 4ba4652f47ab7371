//! Speech output coordination
//!
//! Plays one utterance at a time. A new `speak` cancels the playing job
//! instead of queueing behind it, and a cancelled job never reports
//! completion.

use super::{select_voice, TtsEngine, VoiceSettings};
use crate::config::Config;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechState {
    Idle,
    Speaking,
}

/// How a `speak` call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechOutcome {
    Finished,
    /// Superseded by a newer job or explicitly cancelled
    Cancelled,
    Failed(String),
    /// Nothing was played: no engine, muted, or blank text
    Skipped,
}

/// Lifecycle notifications for observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    Started { job_id: u64, text: String },
    Finished { job_id: u64 },
    Failed { job_id: u64, error: String },
}

struct ActiveJob {
    id: u64,
    cancel: CancellationToken,
}

pub struct SpeechCoordinator {
    engine: Option<Arc<dyn TtsEngine>>,
    settings: Mutex<VoiceSettings>,
    muted: AtomicBool,
    next_job: AtomicU64,
    current: Mutex<Option<ActiveJob>>,
    state_tx: watch::Sender<SpeechState>,
    events_tx: broadcast::Sender<SpeechEvent>,
}

impl SpeechCoordinator {
    pub fn new(engine: Option<Arc<dyn TtsEngine>>, settings: VoiceSettings) -> Self {
        if engine.is_none() {
            warn!("⚠️ No speech synthesis available, responses will be text only");
        }
        let (state_tx, _) = watch::channel(SpeechState::Idle);
        let (events_tx, _) = broadcast::channel(32);
        Self {
            engine,
            settings: Mutex::new(settings),
            muted: AtomicBool::new(false),
            next_job: AtomicU64::new(1),
            current: Mutex::new(None),
            state_tx,
            events_tx,
        }
    }

    /// Whether a synthesis engine is present
    pub fn is_available(&self) -> bool {
        self.engine.is_some()
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
        info!("🔇 Voice responses {}", if muted { "disabled" } else { "enabled" });
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SpeechState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SpeechState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SpeechEvent> {
        self.events_tx.subscribe()
    }

    pub fn settings(&self) -> VoiceSettings {
        self.lock_settings().clone()
    }

    /// Choose the preferred voice from what the engine offers
    ///
    /// Leaves the engine default in place when nothing matches.
    pub async fn configure_voice(&self, config: &Config) {
        let Some(engine) = &self.engine else {
            return;
        };
        let voices = engine.list_voices().await;
        let chosen = select_voice(&voices, &config.voice_language, &config.voice_hints);
        match &chosen {
            Some(voice) => info!("🗣️ Using voice '{}' ({})", voice.name, voice.lang),
            None => debug!("No preferred voice among {} offered, using default", voices.len()),
        }
        self.lock_settings().voice = chosen;
    }

    /// Speak `text`, cancelling whatever is playing
    ///
    /// Resolves when this job finishes, fails, or is cancelled.
    pub async fn speak(&self, text: &str) -> SpeechOutcome {
        let id = self.next_job.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();

        let previous = {
            let mut current = self.lock_current();
            current.replace(ActiveJob {
                id,
                cancel: cancel.clone(),
            })
        };
        if let Some(previous) = previous {
            debug!("Superseding speech job {}", previous.id);
            previous.cancel.cancel();
            self.cancel_engine().await;
        }

        let engine = match &self.engine {
            Some(engine) if !self.is_muted() && !text.trim().is_empty() => Arc::clone(engine),
            _ => {
                self.release(id);
                return SpeechOutcome::Skipped;
            }
        };

        let settings = self.settings();
        self.state_tx.send_replace(SpeechState::Speaking);
        let _ = self.events_tx.send(SpeechEvent::Started {
            job_id: id,
            text: text.to_string(),
        });

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = engine.speak(text, &settings) => Some(result),
        };

        let Some(result) = result else {
            return SpeechOutcome::Cancelled;
        };
        if !self.release(id) {
            // Superseded after playback already ended
            return SpeechOutcome::Cancelled;
        }

        match result {
            Ok(()) => {
                let _ = self.events_tx.send(SpeechEvent::Finished { job_id: id });
                SpeechOutcome::Finished
            }
            Err(e) => {
                warn!("❌ Speech failed: {}", e);
                let error = e.to_string();
                let _ = self.events_tx.send(SpeechEvent::Failed {
                    job_id: id,
                    error: error.clone(),
                });
                SpeechOutcome::Failed(error)
            }
        }
    }

    /// Stop the playing job, if any
    pub async fn cancel(&self) -> bool {
        let active = self.lock_current().take();
        match active {
            Some(job) => {
                debug!("Cancelling speech job {}", job.id);
                job.cancel.cancel();
                self.cancel_engine().await;
                self.state_tx.send_replace(SpeechState::Idle);
                true
            }
            None => false,
        }
    }

    /// Clear the active job if it is still `id`; returns whether it was
    fn release(&self, id: u64) -> bool {
        let mut current = self.lock_current();
        if current.as_ref().is_some_and(|job| job.id == id) {
            *current = None;
            self.state_tx.send_replace(SpeechState::Idle);
            true
        } else {
            false
        }
    }

    async fn cancel_engine(&self) {
        if let Some(engine) = &self.engine {
            if let Err(e) = engine.cancel().await {
                warn!("⚠️ Failed to cancel speech: {}", e);
            }
        }
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<ActiveJob>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_settings(&self) -> std::sync::MutexGuard<'_, VoiceSettings> {
        self.settings.lock().unwrap_or_else(|e| e.into_inner())
    }
}
