use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::text_normalizer::DEFAULT_WAKE_PHRASES;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "JARVIS_CONFIG";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are JARVIS, an advanced AI assistant inspired by Tony Stark's AI. \
You are sophisticated, helpful, and have a slight wit. Respond concisely but informatively. \
Address the user as 'Sir' or 'Boss' occasionally. Keep responses mobile-friendly and conversational.";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Wake word / capture
    pub wake_phrases: Vec<String>,
    pub voice_corrections: HashMap<String, String>,
    pub command_timeout_secs: u64,
    pub silence_timeout_ms: u64,
    pub capture_restart_ms: u64,
    pub capture_end_restart_ms: u64,
    pub min_confidence: f32,

    // Speech
    pub tts_engine: String,
    pub voice_rate: f32,
    pub voice_pitch: f32,
    pub voice_volume: f32,
    pub voice_language: String,
    pub voice_hints: Vec<String>,

    // AI
    pub backend: String,
    pub backend_url: String,
    pub backend_model: String,
    pub backend_api_key: String,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    pub context_turns: usize,

    // Meta
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wake_phrases: DEFAULT_WAKE_PHRASES.iter().map(|p| p.to_string()).collect(),
            voice_corrections: HashMap::new(),
            command_timeout_secs: 10,
            silence_timeout_ms: 3000,
            capture_restart_ms: 1000,
            capture_end_restart_ms: 500,
            min_confidence: 0.0,

            tts_engine: "system".to_string(),
            voice_rate: 0.9,
            voice_pitch: 1.0,
            voice_volume: 0.8,
            voice_language: "en-US".to_string(),
            voice_hints: vec!["Google".to_string(), "Microsoft".to_string()],

            backend: "ollama".to_string(),
            backend_url: "http://localhost:11434".to_string(),
            backend_model: "llama3".to_string(),
            backend_api_key: String::new(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tokens: 500,
            temperature: 0.7,
            request_timeout_secs: 30,
            context_turns: 10,

            log_level: "INFO".to_string(),
        }
    }
}

impl Config {
    /// Load config from the default location, or create default
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load config from a specific file
    ///
    /// A missing file yields the defaults. A corrupt file is moved aside as
    /// `.json.corrupt` and the defaults are used.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!("⚠️ Config file corrupted or invalid, using defaults: {}", e);
                let backup_path = path.with_extension("json.corrupt");
                let _ = std::fs::rename(path, &backup_path);
                Ok(Self::default())
            }
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn silence_timeout(&self) -> Duration {
        Duration::from_millis(self.silence_timeout_ms)
    }

    pub fn capture_restart_delay(&self) -> Duration {
        Duration::from_millis(self.capture_restart_ms)
    }

    pub fn capture_end_restart_delay(&self) -> Duration {
        Duration::from_millis(self.capture_end_restart_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jarvis")
        .join("config.json")
}
