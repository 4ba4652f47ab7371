//! TTS (Text-to-Speech) Module
//!
//! Provides a unified interface for multiple TTS backends and the
//! coordinator that plays one utterance at a time.

use crate::config::Config;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub mod coordinator;
pub mod speechd;
pub mod system;

pub use coordinator::{SpeechCoordinator, SpeechEvent, SpeechOutcome, SpeechState};

/// A synthetic voice offered by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceInfo {
    pub name: String,
    /// BCP 47 style language tag, e.g. "en-US"
    pub lang: String,
}

impl VoiceInfo {
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
        }
    }
}

/// Prosody and voice applied to one utterance
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSettings {
    /// 1.0 is the engine's normal speed
    pub rate: f32,
    pub pitch: f32,
    /// 0.0 to 1.0
    pub volume: f32,
    /// `None` uses the engine default voice
    pub voice: Option<VoiceInfo>,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            rate: 0.9,
            pitch: 1.0,
            volume: 0.8,
            voice: None,
        }
    }
}

impl VoiceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            rate: config.voice_rate,
            pitch: config.voice_pitch,
            volume: config.voice_volume.clamp(0.0, 1.0),
            voice: None,
        }
    }
}

/// Trait for TTS engines
#[async_trait]
pub trait TtsEngine: Send + Sync + std::fmt::Debug {
    /// Speak the given text, returning once playback has finished
    async fn speak(&self, text: &str, settings: &VoiceSettings) -> Result<()>;

    /// Stop any playback started by this engine
    async fn cancel(&self) -> Result<()> {
        Ok(())
    }

    /// Voices the engine can use
    async fn list_voices(&self) -> Vec<VoiceInfo> {
        Vec::new()
    }

    /// Get the engine name
    fn name(&self) -> &str;
}

/// Pick the preferred voice: exact language tag, then primary subtag, then name hints
pub fn select_voice(voices: &[VoiceInfo], lang: &str, hints: &[String]) -> Option<VoiceInfo> {
    let lang = lang.to_lowercase();
    let primary = lang.split(['-', '_']).next().unwrap_or_default();
    let normalized = |tag: &str| tag.to_lowercase().replace('_', "-");

    if !lang.is_empty() {
        if let Some(voice) = voices.iter().find(|v| normalized(&v.lang) == lang) {
            return Some(voice.clone());
        }
    }

    if !primary.is_empty() {
        if let Some(voice) = voices.iter().find(|v| {
            normalized(&v.lang)
                .split('-')
                .next()
                .is_some_and(|p| p == primary)
        }) {
            return Some(voice.clone());
        }
    }

    hints.iter().find_map(|hint| {
        let hint = hint.to_lowercase();
        voices
            .iter()
            .find(|v| v.name.to_lowercase().contains(&hint))
            .cloned()
    })
}

/// Factory to create the configured TTS engine
///
/// Returns `None` when speech output is disabled.
pub async fn create_engine(config: &Config) -> Option<Arc<dyn TtsEngine>> {
    info!("🛠️ Creating TTS engine: {}", config.tts_engine);
    let engine: Arc<dyn TtsEngine> = match config.tts_engine.as_str() {
        "none" | "off" => {
            info!("  - Speech output disabled, responses are text only");
            return None;
        }
        "speechd_ng" | "speechd" => {
            info!("  - Using Speechd TTS");
            match speechd::SpeechdEngine::connect().await {
                Ok(client) => Arc::new(client),
                Err(e) => {
                    warn!("  - Speechd unavailable ({}), falling back to System", e);
                    Arc::new(system::SystemEngine::new())
                }
            }
        }
        "system" => {
            info!("  - Using System TTS");
            Arc::new(system::SystemEngine::new())
        }
        _ => {
            warn!(
                "  - Unknown engine '{}', falling back to System",
                config.tts_engine
            );
            Arc::new(system::SystemEngine::new())
        }
    };
    info!("✅ TTS engine '{}' initialized", engine.name());
    Some(engine)
}
