//! Voice interaction controller
//!
//! Runs the listening state machine on a single task. Capture events, timer
//! expiries, speech completions and backend replies are all funnelled into one
//! queue and handled strictly in arrival order.

use crate::asr::{CaptureEngine, CaptureErrorKind, CaptureEvent};
use crate::commands::{CommandClassifier, Intent};
use crate::config::Config;
use crate::conversation::{
    ConversationError, ConversationManager, ConversationSettings, ConversationTurn,
};
use crate::core::backend::create_backend;
use crate::core::text_normalizer::TextNormalizer;
use crate::error::{JarvisError, JarvisResult};
use crate::listener::{Effect, Input, ListeningMachine, ListeningState, RestartReason};
use crate::tts::{self, SpeechCoordinator, SpeechState, VoiceSettings};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Observable controller state
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSnapshot {
    pub state: ListeningState,
    pub transcript: Vec<ConversationTurn>,
    pub last_intent: Option<Intent>,
    pub last_error: Option<String>,
    pub muted: bool,
    pub speaking: bool,
    pub capture_available: bool,
}

impl Default for ControllerSnapshot {
    fn default() -> Self {
        Self {
            state: ListeningState::Dormant,
            transcript: Vec::new(),
            last_intent: None,
            last_error: None,
            muted: false,
            speaking: false,
            capture_available: true,
        }
    }
}

/// Delays used by the controller's timers
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    pub command_timeout: Duration,
    pub silence_timeout: Duration,
    pub restart_after_error: Duration,
    pub restart_after_end: Duration,
}

impl Timings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            command_timeout: config.command_timeout(),
            silence_timeout: config.silence_timeout(),
            restart_after_error: config.capture_restart_delay(),
            restart_after_end: config.capture_end_restart_delay(),
        }
    }
}

#[derive(Debug)]
enum Command {
    EnableWakeWord,
    DisableWakeWord,
    Manual(String),
    Retry,
    Clear,
    Shutdown,
}

#[derive(Debug)]
enum Event {
    Command(Command),
    Capture { session: u64, event: CaptureEvent },
    Reply {
        id: u64,
        reply: Option<String>,
        error: Option<String>,
    },
    Input(Input),
}

#[derive(Default)]
struct Timers {
    command: Option<JoinHandle<()>>,
    silence: Option<JoinHandle<()>>,
    restart: Option<JoinHandle<()>>,
}

impl Timers {
    fn abort_all(&mut self) {
        for handle in [&mut self.command, &mut self.silence, &mut self.restart] {
            if let Some(handle) = handle.take() {
                handle.abort();
            }
        }
    }
}

/// Cloneable handle for driving a running [`VoiceController`]
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    events: mpsc::UnboundedSender<Event>,
    snapshot: watch::Receiver<ControllerSnapshot>,
    transcript: watch::Receiver<Vec<ConversationTurn>>,
}

impl ControllerHandle {
    fn send(&self, command: Command) -> JarvisResult<()> {
        self.events
            .send(Event::Command(command))
            .map_err(|_| JarvisError::ControllerStopped)
    }

    pub fn enable_wake_word(&self) -> JarvisResult<()> {
        self.send(Command::EnableWakeWord)
    }

    pub fn disable_wake_word(&self) -> JarvisResult<()> {
        self.send(Command::DisableWakeWord)
    }

    /// Handle typed text as a command, bypassing capture and the wake gate
    pub fn send_manual_utterance(&self, text: impl Into<String>) -> JarvisResult<()> {
        self.send(Command::Manual(text.into()))
    }

    pub fn retry_last_message(&self) -> JarvisResult<()> {
        self.send(Command::Retry)
    }

    pub fn clear(&self) -> JarvisResult<()> {
        self.send(Command::Clear)
    }

    pub fn shutdown(&self) -> JarvisResult<()> {
        self.send(Command::Shutdown)
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ControllerSnapshot> {
        self.snapshot.clone()
    }

    pub fn transcript_updates(&self) -> watch::Receiver<Vec<ConversationTurn>> {
        self.transcript.clone()
    }

    /// Wait until the published snapshot satisfies `predicate`
    pub async fn wait_until(
        &self,
        mut predicate: impl FnMut(&ControllerSnapshot) -> bool,
    ) -> JarvisResult<ControllerSnapshot> {
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| JarvisError::ControllerStopped)?;
        Ok(snapshot.clone())
    }
}

pub struct VoiceController {
    machine: ListeningMachine,
    capture: Option<Arc<dyn CaptureEngine>>,
    speech: Arc<SpeechCoordinator>,
    conversation: Arc<ConversationManager>,
    timings: Timings,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    snapshot_tx: watch::Sender<ControllerSnapshot>,
    capture_session: u64,
    timers: Timers,
    last_intent: Option<Intent>,
    last_error: Option<String>,
}

impl VoiceController {
    pub fn new(
        config: &Config,
        capture: Option<Arc<dyn CaptureEngine>>,
        speech: Arc<SpeechCoordinator>,
        conversation: Arc<ConversationManager>,
    ) -> Self {
        let machine = ListeningMachine::new(conversation.classifier().clone(), config.min_confidence);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, _) = watch::channel(ControllerSnapshot::default());
        Self {
            machine,
            capture,
            speech,
            conversation,
            timings: Timings::from_config(config),
            events_tx,
            events_rx,
            snapshot_tx,
            capture_session: 0,
            timers: Timers::default(),
            last_intent: None,
            last_error: None,
        }
    }

    /// Assemble the controller with the configured backend and TTS engine
    pub async fn from_config(config: &Config, capture: Option<Arc<dyn CaptureEngine>>) -> Self {
        let normalizer = TextNormalizer::new(&config.wake_phrases, config.voice_corrections.clone());
        let classifier = CommandClassifier::new(normalizer);
        let backend = create_backend(config);
        if backend.health_check().await {
            info!("✅ {} backend reachable at {}", backend.name(), config.backend_url);
        } else {
            warn!(
                "⚠️ {} backend not reachable at {}, AI answers will fail until it is",
                backend.name(),
                config.backend_url
            );
        }
        let conversation = Arc::new(ConversationManager::new(
            backend,
            classifier,
            ConversationSettings::from_config(config),
        ));

        let engine = tts::create_engine(config).await;
        let speech = Arc::new(SpeechCoordinator::new(engine, VoiceSettings::from_config(config)));
        if speech.is_available() {
            speech.configure_voice(config).await;
        } else {
            info!("🔇 No speech engine, replies are text only");
        }

        Self::new(config, capture, speech, conversation)
    }

    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            events: self.events_tx.clone(),
            snapshot: self.snapshot_tx.subscribe(),
            transcript: self.conversation.subscribe(),
        }
    }

    /// Run the controller on its own task
    pub fn spawn(self) -> (ControllerHandle, JoinHandle<()>) {
        let handle = self.handle();
        let task = tokio::spawn(self.run());
        (handle, task)
    }

    /// Process events until shutdown
    pub async fn run(mut self) {
        info!("🤖 Voice controller running");
        self.publish();
        let mut speech_state = self.speech.subscribe_state();

        loop {
            let event = tokio::select! {
                event = self.events_rx.recv() => event,
                Ok(()) = speech_state.changed() => {
                    self.publish();
                    continue;
                }
            };
            let Some(event) = event else {
                break;
            };
            let input = match event {
                Event::Command(Command::Shutdown) => break,
                Event::Command(command) => self.command_input(command),
                Event::Capture { session, event } => {
                    if session != self.capture_session {
                        debug!("Dropping event from stale capture session {}", session);
                        None
                    } else {
                        Some(match event {
                            CaptureEvent::Fragment(fragment) => Input::Fragment(fragment),
                            CaptureEvent::Error { kind, message } => {
                                Input::CaptureError { kind, message }
                            }
                            CaptureEvent::Ended => Input::CaptureEnded,
                        })
                    }
                }
                Event::Reply { id, reply, error } => {
                    if error.is_some() {
                        self.last_error = error;
                    } else if reply.is_some() {
                        self.last_error = None;
                    }
                    Some(Input::ReplyReady { id, reply })
                }
                Event::Input(input) => Some(input),
            };

            if let Some(input) = input {
                self.process(input).await;
            }
            self.publish();
        }

        self.process(Input::DisableWakeWord).await;
        self.timers.abort_all();
        self.publish();
        info!("👋 Voice controller stopped");
    }

    fn command_input(&mut self, command: Command) -> Option<Input> {
        match command {
            Command::EnableWakeWord => Some(Input::EnableWakeWord),
            Command::DisableWakeWord => Some(Input::DisableWakeWord),
            Command::Manual(text) => Some(Input::ManualUtterance(text)),
            Command::Retry => Some(Input::Retry),
            Command::Clear => {
                self.last_error = None;
                Some(Input::ClearTranscript)
            }
            Command::Shutdown => None,
        }
    }

    /// Feed one input through the machine, including any inputs its effects produce
    async fn process(&mut self, input: Input) {
        let mut queue = VecDeque::from([input]);
        while let Some(input) = queue.pop_front() {
            for effect in self.machine.handle(input) {
                if let Some(follow_up) = self.apply(effect).await {
                    queue.push_back(follow_up);
                }
            }
        }
    }

    async fn apply(&mut self, effect: Effect) -> Option<Input> {
        match effect {
            Effect::StartCapture => return self.start_capture().await,
            Effect::StopCapture => {
                self.capture_session += 1;
                if let Some(capture) = &self.capture {
                    capture.stop().await;
                }
            }
            Effect::ArmCommandTimeout { epoch } => {
                let timer = self.schedule(
                    self.timings.command_timeout,
                    Input::CommandTimeout { epoch },
                );
                replace_timer(&mut self.timers.command, timer);
            }
            Effect::ArmSilenceTimeout { epoch } => {
                let timer = self.schedule(
                    self.timings.silence_timeout,
                    Input::SilenceTimeout { epoch },
                );
                replace_timer(&mut self.timers.silence, timer);
            }
            Effect::ScheduleCaptureRestart { epoch, reason } => {
                let delay = match reason {
                    RestartReason::Error => self.timings.restart_after_error,
                    RestartReason::Ended => self.timings.restart_after_end,
                };
                let timer = self.schedule(delay, Input::RestartCapture { epoch });
                replace_timer(&mut self.timers.restart, timer);
            }
            Effect::Speak { id, text } => {
                info!("🗣️ {}", text);
                let speech = Arc::clone(&self.speech);
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    let outcome = speech.speak(&text).await;
                    debug!("Speech job {} ended: {:?}", id, outcome);
                    let _ = events.send(Event::Input(Input::SpeechFinished { id }));
                });
            }
            Effect::CancelSpeech => {
                self.speech.cancel().await;
            }
            Effect::Dispatch {
                id,
                utterance,
                intent,
            } => {
                self.last_intent = Some(intent.clone());
                let conversation = Arc::clone(&self.conversation);
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    let result = conversation
                        .respond(&utterance.normalized_text, &intent)
                        .await
                        .map(Some);
                    let _ = events.send(reply_event(id, result));
                });
            }
            Effect::Retry { id } => {
                let conversation = Arc::clone(&self.conversation);
                let events = self.events_tx.clone();
                tokio::spawn(async move {
                    let result = conversation.retry_last_message().await;
                    let _ = events.send(reply_event(id, result));
                });
            }
            Effect::CancelRequest => {
                self.conversation.cancel_in_flight();
            }
            Effect::SetMuted(muted) => self.speech.set_muted(muted),
            Effect::ClearTranscript => {
                self.conversation.clear();
                self.last_error = None;
            }
            Effect::ReportError(message) => {
                warn!("⚠️ {}", message);
                self.last_error = Some(message);
            }
        }
        None
    }

    async fn start_capture(&mut self) -> Option<Input> {
        self.capture_session += 1;
        let Some(capture) = self.capture.clone() else {
            return Some(Input::CaptureUnavailable("no capture engine configured".into()));
        };

        let session = self.capture_session;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if events.send(Event::Capture { session, event }).is_err() {
                    break;
                }
            }
        });

        match capture.start(tx).await {
            Ok(()) => {
                debug!("🎙️ Capture session {} started ({})", session, capture.name());
                None
            }
            Err(JarvisError::CaptureUnavailable(reason)) => Some(Input::CaptureUnavailable(reason)),
            Err(e) => Some(Input::CaptureError {
                kind: if e.is_recoverable() {
                    CaptureErrorKind::Recoverable
                } else {
                    CaptureErrorKind::Unrecoverable
                },
                message: e.to_string(),
            }),
        }
    }

    fn schedule(&self, delay: Duration, input: Input) -> JoinHandle<()> {
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(Event::Input(input));
        })
    }

    fn publish(&self) {
        let snapshot = ControllerSnapshot {
            state: self.machine.state(),
            transcript: self.conversation.transcript(),
            last_intent: self.last_intent.clone(),
            last_error: self.last_error.clone(),
            muted: self.speech.is_muted(),
            speaking: self.speech.state() == SpeechState::Speaking,
            capture_available: self.machine.capture_available(),
        };
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

fn replace_timer(slot: &mut Option<JoinHandle<()>>, timer: JoinHandle<()>) {
    if let Some(previous) = slot.replace(timer) {
        previous.abort();
    }
}

/// Turn a conversation result into the reply the machine should speak
fn reply_event(id: u64, result: Result<Option<ConversationTurn>, ConversationError>) -> Event {
    match result {
        Ok(turn) => Event::Reply {
            id,
            reply: turn.map(|t| t.content),
            error: None,
        },
        Err(ConversationError::Cancelled) | Err(ConversationError::EmptyInput) => Event::Reply {
            id,
            reply: None,
            error: None,
        },
        Err(e) => Event::Reply {
            id,
            reply: e.turn().map(|t| t.content.clone()),
            error: Some(e.to_string()),
        },
    }
}
