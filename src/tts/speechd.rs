//! Speechd-ng TTS backend using D-Bus

use super::{TtsEngine, VoiceSettings};
use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};
use zbus::{proxy, Connection};

/// D-Bus proxy for the speechd-ng service
#[proxy(
    interface = "org.speech.Service",
    default_service = "org.speech.Service",
    default_path = "/org/speech/Service"
)]
trait SpeechService {
    /// Speak text using default voice
    fn speak(&self, text: &str) -> zbus::Result<()>;

    /// Speak text using specific voice
    fn speak_voice(&self, text: &str, voice: &str) -> zbus::Result<()>;

    fn ping(&self) -> zbus::Result<String>;
}

pub struct SpeechdEngine {
    proxy: SpeechServiceProxy<'static>,
}

impl std::fmt::Debug for SpeechdEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechdEngine").finish()
    }
}

impl SpeechdEngine {
    /// Connect to the speechd-ng D-Bus service
    pub async fn connect() -> Result<Self> {
        let connection = Connection::session().await?;
        let proxy = SpeechServiceProxy::new(&connection).await?;

        match proxy.ping().await {
            Ok(response) => {
                info!("🔊 Connected to speechd-ng: {}", response);
            }
            Err(e) => {
                warn!("⚠️ speechd-ng not responding: {}", e);
                return Err(anyhow::anyhow!("speechd-ng not responding: {}", e));
            }
        }

        Ok(Self { proxy })
    }
}

#[async_trait]
impl TtsEngine for SpeechdEngine {
    async fn speak(&self, text: &str, settings: &VoiceSettings) -> Result<()> {
        match &settings.voice {
            Some(voice) => {
                debug!("Speaking with voice {}: {}", voice.name, text);
                self.proxy.speak_voice(text, &voice.name).await?;
            }
            None => {
                debug!("Speaking: {}", text);
                self.proxy.speak(text).await?;
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "speechd_ng"
    }
}
