//! Listening state machine
//!
//! A pure transition function: every [`Input`] moves the machine and yields
//! the [`Effect`]s the controller must carry out, in order. Timers and async
//! completions come back as inputs tagged with the epoch or id they were
//! issued for, and stale ones are ignored.

use crate::asr::{AsrResult, CaptureErrorKind, Utterance};
use crate::commands::{CommandClassifier, Intent};
use crate::core::text_normalizer::TextNormalizer;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

pub const ACKNOWLEDGEMENT: &str = "Yes, I'm listening.";
pub const SLEEP_RESPONSE: &str = "Going to sleep mode. Say 'Hey Jarvis' to wake me up.";
pub const MUTED_RESPONSE: &str = "Voice responses disabled.";
pub const UNMUTED_RESPONSE: &str = "Voice responses enabled.";
pub const CLEARED_RESPONSE: &str = "Conversation cleared.";

const SLEEP_PHRASES: &[&str] = &["stop listening", "sleep", "go to sleep"];
const MUTE_PHRASES: &[&str] = &["mute", "quiet", "be quiet"];
const UNMUTE_PHRASES: &[&str] = &["unmute"];
const CLEAR_PHRASES: &[&str] = &["clear chat", "clear conversation", "clear history"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ListeningState {
    /// Not listening; only typed input is handled
    Dormant,
    /// Capture running, waiting for a wake phrase
    AwaitingWake,
    /// Woken, waiting for the command
    AwakeCapturing,
    /// Command handed to the classifier or backend
    Dispatching,
    /// Reply being spoken, capture stopped
    Speaking,
}

impl fmt::Display for ListeningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ListeningState::Dormant => "dormant",
            ListeningState::AwaitingWake => "awaiting wake",
            ListeningState::AwakeCapturing => "awake",
            ListeningState::Dispatching => "dispatching",
            ListeningState::Speaking => "speaking",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// Recoverable capture error; long backoff
    Error,
    /// Capture session ended by itself; short backoff
    Ended,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    EnableWakeWord,
    DisableWakeWord,
    Fragment(AsrResult),
    CaptureError {
        kind: CaptureErrorKind,
        message: String,
    },
    CaptureEnded,
    /// The platform cannot capture speech at all
    CaptureUnavailable(String),
    CommandTimeout {
        epoch: u64,
    },
    SilenceTimeout {
        epoch: u64,
    },
    RestartCapture {
        epoch: u64,
    },
    /// Typed text, bypassing the wake gate
    ManualUtterance(String),
    Retry,
    ClearTranscript,
    /// Reply for dispatch `id`; `None` when nothing should be spoken
    ReplyReady {
        id: u64,
        reply: Option<String>,
    },
    SpeechFinished {
        id: u64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StartCapture,
    StopCapture,
    ArmCommandTimeout { epoch: u64 },
    ArmSilenceTimeout { epoch: u64 },
    ScheduleCaptureRestart { epoch: u64, reason: RestartReason },
    Speak { id: u64, text: String },
    CancelSpeech,
    Dispatch { id: u64, utterance: Utterance, intent: Intent },
    Retry { id: u64 },
    CancelRequest,
    SetMuted(bool),
    ClearTranscript,
    ReportError(String),
}

/// Voice commands handled by the state machine itself
enum Special {
    Sleep,
    Mute,
    Unmute,
    Clear,
}

impl Special {
    fn detect(normalized: &str) -> Option<Self> {
        if SLEEP_PHRASES.contains(&normalized) {
            Some(Special::Sleep)
        } else if MUTE_PHRASES.contains(&normalized) {
            Some(Special::Mute)
        } else if UNMUTE_PHRASES.contains(&normalized) {
            Some(Special::Unmute)
        } else if CLEAR_PHRASES.contains(&normalized) {
            Some(Special::Clear)
        } else {
            None
        }
    }
}

pub struct ListeningMachine {
    state: ListeningState,
    classifier: CommandClassifier,
    min_confidence: f32,
    wake_enabled: bool,
    capture_available: bool,
    capture_running: bool,
    sleep_requested: bool,
    next_id: u64,
    /// Speech job whose completion moves the machine
    speech_id: Option<u64>,
    /// Dispatch whose reply is awaited
    dispatch_id: Option<u64>,
    command_epoch: u64,
    silence_epoch: u64,
    restart_epoch: u64,
}

impl ListeningMachine {
    pub fn new(classifier: CommandClassifier, min_confidence: f32) -> Self {
        Self {
            state: ListeningState::Dormant,
            classifier,
            min_confidence,
            wake_enabled: false,
            capture_available: true,
            capture_running: false,
            sleep_requested: false,
            next_id: 0,
            speech_id: None,
            dispatch_id: None,
            command_epoch: 0,
            silence_epoch: 0,
            restart_epoch: 0,
        }
    }

    pub fn state(&self) -> ListeningState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        self.capture_running
    }

    pub fn capture_available(&self) -> bool {
        self.capture_available
    }

    pub fn wake_enabled(&self) -> bool {
        self.wake_enabled
    }

    fn normalizer(&self) -> &TextNormalizer {
        self.classifier.normalizer()
    }

    /// Apply one input and return the effects to run, in order
    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        let before = self.state;
        let effects = match input {
            Input::EnableWakeWord => self.enable(),
            Input::DisableWakeWord => self.disable(),
            Input::Fragment(fragment) => self.on_fragment(fragment),
            Input::CaptureError { kind, message } => self.on_capture_error(kind, message),
            Input::CaptureEnded => self.on_capture_ended(),
            Input::CaptureUnavailable(reason) => self.on_capture_unavailable(reason),
            Input::CommandTimeout { epoch } => self.on_command_timeout(epoch),
            Input::SilenceTimeout { epoch } => self.on_silence_timeout(epoch),
            Input::RestartCapture { epoch } => self.on_restart(epoch),
            Input::ManualUtterance(text) => self.on_manual(text),
            Input::Retry => self.on_retry(),
            Input::ClearTranscript => vec![Effect::ClearTranscript],
            Input::ReplyReady { id, reply } => self.on_reply(id, reply),
            Input::SpeechFinished { id } => self.on_speech_finished(id),
        };
        if before != self.state {
            debug!("🔀 {} → {}", before, self.state);
        }
        effects
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn is_listening(&self) -> bool {
        matches!(
            self.state,
            ListeningState::AwaitingWake | ListeningState::AwakeCapturing
        )
    }

    fn start_capture(&mut self, effects: &mut Vec<Effect>) {
        if !self.capture_running {
            self.capture_running = true;
            self.restart_epoch += 1;
            effects.push(Effect::StartCapture);
        }
        self.arm_silence(effects);
    }

    fn stop_capture(&mut self, effects: &mut Vec<Effect>) {
        self.silence_epoch += 1;
        self.restart_epoch += 1;
        if self.capture_running {
            self.capture_running = false;
            effects.push(Effect::StopCapture);
        }
    }

    fn arm_silence(&mut self, effects: &mut Vec<Effect>) {
        self.silence_epoch += 1;
        effects.push(Effect::ArmSilenceTimeout {
            epoch: self.silence_epoch,
        });
    }

    fn disarm_command_timeout(&mut self) {
        self.command_epoch += 1;
    }

    /// Stop capture and play `text`; its completion ends the current phase
    fn speak(&mut self, text: String, effects: &mut Vec<Effect>) {
        self.stop_capture(effects);
        let id = self.next_id();
        self.speech_id = Some(id);
        effects.push(Effect::Speak { id, text });
    }

    /// Leave the current interaction: back to wake listening, or to sleep
    fn go_home(&mut self, effects: &mut Vec<Effect>) {
        self.dispatch_id = None;
        self.speech_id = None;
        if self.sleep_requested {
            self.sleep_requested = false;
            self.wake_enabled = false;
            info!("😴 Sleep mode");
        }

        if self.wake_enabled && self.capture_available {
            self.state = ListeningState::AwaitingWake;
            self.start_capture(effects);
        } else {
            self.state = ListeningState::Dormant;
            self.stop_capture(effects);
        }
    }

    fn enable(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !self.capture_available {
            warn!("⚠️ Wake word requested but speech capture is unavailable");
            return effects;
        }
        self.wake_enabled = true;
        if self.state == ListeningState::Dormant {
            info!("👂 Listening for wake word");
            self.state = ListeningState::AwaitingWake;
            self.start_capture(&mut effects);
        }
        effects
    }

    fn disable(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.wake_enabled = false;
        self.sleep_requested = false;
        self.disarm_command_timeout();
        self.stop_capture(&mut effects);
        if self.speech_id.take().is_some() {
            effects.push(Effect::CancelSpeech);
        }
        if self.dispatch_id.take().is_some() {
            effects.push(Effect::CancelRequest);
        }
        self.state = ListeningState::Dormant;
        effects
    }

    fn on_fragment(&mut self, fragment: AsrResult) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !self.is_listening() || !self.capture_running {
            debug!("Ignoring fragment in {}: {}", self.state, fragment.text);
            return effects;
        }

        // Any recognizer activity counts as non-silence
        self.arm_silence(&mut effects);

        if !fragment.is_final {
            return effects;
        }
        if fragment.confidence < self.min_confidence {
            debug!(
                "Discarding low-confidence fragment ({:.2}): {}",
                fragment.confidence, fragment.text
            );
            return effects;
        }

        match self.state {
            ListeningState::AwaitingWake => {
                let Some(remainder) = self.normalizer().split_wake_phrase(&fragment.text) else {
                    debug!("No wake phrase in: {}", fragment.text);
                    return effects;
                };
                info!("🎤 Wake word detected");
                self.state = ListeningState::AwakeCapturing;
                self.speak(ACKNOWLEDGEMENT.to_string(), &mut effects);
                self.command_epoch += 1;
                effects.push(Effect::ArmCommandTimeout {
                    epoch: self.command_epoch,
                });

                if !remainder.is_empty() {
                    self.disarm_command_timeout();
                    let utterance = Utterance::new(&fragment.text, remainder, fragment.confidence);
                    self.dispatch(utterance, &mut effects);
                }
            }
            ListeningState::AwakeCapturing => {
                let normalized = self.normalizer().normalize(&fragment.text);
                if normalized.is_empty() {
                    return effects;
                }
                self.disarm_command_timeout();
                let utterance = Utterance::new(&fragment.text, normalized, fragment.confidence);
                self.dispatch(utterance, &mut effects);
            }
            _ => {}
        }
        effects
    }

    fn on_manual(&mut self, text: String) -> Vec<Effect> {
        let mut effects = Vec::new();
        let mut normalized = self.normalizer().normalize(&text);
        if normalized.is_empty() {
            normalized = self.normalizer().canonical(&text);
        }
        if normalized.is_empty() {
            return effects;
        }

        self.disarm_command_timeout();
        if self.speech_id.take().is_some() {
            effects.push(Effect::CancelSpeech);
        }
        self.stop_capture(&mut effects);
        self.dispatch(Utterance::new(text, normalized, 1.0), &mut effects);
        effects
    }

    /// Route a finalized command: built-in voice controls, or classification
    fn dispatch(&mut self, utterance: Utterance, effects: &mut Vec<Effect>) {
        self.stop_capture(effects);

        if let Some(special) = Special::detect(&utterance.normalized_text) {
            if self.dispatch_id.take().is_some() {
                effects.push(Effect::CancelRequest);
            }
            let text = match special {
                Special::Sleep => {
                    self.sleep_requested = true;
                    SLEEP_RESPONSE
                }
                Special::Mute => {
                    effects.push(Effect::SetMuted(true));
                    MUTED_RESPONSE
                }
                Special::Unmute => {
                    effects.push(Effect::SetMuted(false));
                    UNMUTED_RESPONSE
                }
                Special::Clear => {
                    effects.push(Effect::ClearTranscript);
                    CLEARED_RESPONSE
                }
            };
            self.state = ListeningState::Speaking;
            self.speak(text.to_string(), effects);
            return;
        }

        let intent = self.classifier.classify(&utterance.normalized_text);
        if intent == Intent::Shutdown {
            self.sleep_requested = true;
        }
        info!(
            "📝 Command: '{}' → {}",
            utterance.normalized_text,
            intent.name()
        );

        let id = self.next_id();
        self.dispatch_id = Some(id);
        self.state = ListeningState::Dispatching;
        effects.push(Effect::Dispatch {
            id,
            utterance,
            intent,
        });
    }

    fn on_retry(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.state == ListeningState::Dispatching {
            debug!("Retry ignored while a command is in flight");
            return effects;
        }
        self.disarm_command_timeout();
        if self.speech_id.take().is_some() {
            effects.push(Effect::CancelSpeech);
        }
        self.stop_capture(&mut effects);

        let id = self.next_id();
        self.dispatch_id = Some(id);
        self.state = ListeningState::Dispatching;
        effects.push(Effect::Retry { id });
        effects
    }

    fn on_reply(&mut self, id: u64, reply: Option<String>) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.state != ListeningState::Dispatching || self.dispatch_id != Some(id) {
            debug!("Ignoring stale reply {}", id);
            return effects;
        }
        self.dispatch_id = None;

        match reply {
            Some(text) if !text.trim().is_empty() => {
                self.state = ListeningState::Speaking;
                self.speak(text, &mut effects);
            }
            _ => {
                self.sleep_requested = false;
                self.go_home(&mut effects);
            }
        }
        effects
    }

    fn on_speech_finished(&mut self, id: u64) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.speech_id != Some(id) {
            return effects;
        }
        self.speech_id = None;

        match self.state {
            ListeningState::Speaking => self.go_home(&mut effects),
            // Acknowledgement done, listen for the command
            ListeningState::AwakeCapturing => self.start_capture(&mut effects),
            _ => {}
        }
        effects
    }

    fn on_command_timeout(&mut self, epoch: u64) -> Vec<Effect> {
        let mut effects = Vec::new();
        if epoch != self.command_epoch || self.state != ListeningState::AwakeCapturing {
            return effects;
        }
        info!("⏱️ No command heard, back to waiting for the wake word");
        if self.speech_id.take().is_some() {
            effects.push(Effect::CancelSpeech);
        }
        self.state = ListeningState::AwaitingWake;
        self.start_capture(&mut effects);
        effects
    }

    fn on_silence_timeout(&mut self, epoch: u64) -> Vec<Effect> {
        let mut effects = Vec::new();
        if epoch != self.silence_epoch || !self.is_listening() || !self.capture_running {
            return effects;
        }
        debug!("🔄 Silence timeout, restarting capture");
        self.stop_capture(&mut effects);
        self.start_capture(&mut effects);
        effects
    }

    fn on_capture_error(&mut self, kind: CaptureErrorKind, message: String) -> Vec<Effect> {
        let mut effects = Vec::new();
        match kind {
            CaptureErrorKind::Recoverable => {
                if !self.is_listening() || !self.capture_running {
                    return effects;
                }
                debug!("Recoverable capture error: {}", message);
                self.capture_running = false;
                self.silence_epoch += 1;
                self.restart_epoch += 1;
                effects.push(Effect::ScheduleCaptureRestart {
                    epoch: self.restart_epoch,
                    reason: RestartReason::Error,
                });
            }
            CaptureErrorKind::Unrecoverable => {
                if self.state == ListeningState::Dormant && !self.capture_running {
                    return effects;
                }
                warn!("❌ Capture failed: {}", message);
                effects = self.disable();
                effects.push(Effect::ReportError(message));
            }
        }
        effects
    }

    fn on_capture_ended(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !self.is_listening() || !self.capture_running {
            return effects;
        }
        debug!("Capture session ended, scheduling restart");
        self.capture_running = false;
        self.silence_epoch += 1;
        self.restart_epoch += 1;
        effects.push(Effect::ScheduleCaptureRestart {
            epoch: self.restart_epoch,
            reason: RestartReason::Ended,
        });
        effects
    }

    fn on_restart(&mut self, epoch: u64) -> Vec<Effect> {
        let mut effects = Vec::new();
        if epoch != self.restart_epoch || !self.is_listening() || self.capture_running {
            return effects;
        }
        // The acknowledgement is still playing
        if self.speech_id.is_some() {
            return effects;
        }
        self.start_capture(&mut effects);
        effects
    }

    fn on_capture_unavailable(&mut self, reason: String) -> Vec<Effect> {
        warn!(
            "⚠️ Speech capture unavailable ({}), continuing with typed input only",
            reason
        );
        self.capture_available = false;
        self.capture_running = false;
        self.disable()
    }
}
