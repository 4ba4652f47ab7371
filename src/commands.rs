//! Command classification module
//!
//! Maps normalized utterances to typed intents with an ordered list of
//! pattern rules, and renders the local responses for deterministic intents.

use crate::core::calculator;
use crate::core::text_normalizer::TextNormalizer;
use chrono::Local;
use lazy_static::lazy_static;
use rand::Rng;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// On/off state extracted from toggle commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "on" => Some(Toggle::On),
            "off" => Some(Toggle::Off),
            _ => None,
        }
    }
}

impl fmt::Display for Toggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Toggle::On => write!(f, "on"),
            Toggle::Off => write!(f, "off"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeDirection {
    Up,
    Down,
}

impl VolumeDirection {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "up" | "increase" | "raise" => Some(VolumeDirection::Up),
            "down" | "decrease" | "lower" => Some(VolumeDirection::Down),
            _ => None,
        }
    }
}

impl fmt::Display for VolumeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolumeDirection::Up => write!(f, "up"),
            VolumeDirection::Down => write!(f, "down"),
        }
    }
}

/// Classified meaning of an utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    TimeQuery,
    WeatherQuery,
    BatteryQuery,
    LightsControl { state: Toggle },
    MusicControl,
    StopMedia,
    StatusReport,
    Help,
    Shutdown,
    VolumeControl { direction: VolumeDirection },
    WifiControl { state: Toggle },
    BluetoothControl { state: Toggle },
    Search { query: String },
    Reminder { text: String },
    Calculate { expression: String },
    Unknown,
}

impl Intent {
    /// Stable action name, as reported to observers and logs
    pub fn name(&self) -> &'static str {
        match self {
            Intent::Greeting => "greeting",
            Intent::TimeQuery => "time",
            Intent::WeatherQuery => "weather",
            Intent::BatteryQuery => "battery",
            Intent::LightsControl { .. } => "lights",
            Intent::MusicControl => "music",
            Intent::StopMedia => "stop",
            Intent::StatusReport => "status",
            Intent::Help => "help",
            Intent::Shutdown => "shutdown",
            Intent::VolumeControl { .. } => "volume",
            Intent::WifiControl { .. } => "wifi",
            Intent::BluetoothControl { .. } => "bluetooth",
            Intent::Search { .. } => "search",
            Intent::Reminder { .. } => "reminder",
            Intent::Calculate { .. } => "calculate",
            Intent::Unknown => "unknown",
        }
    }

    /// Whether the intent is answered locally, without the conversation backend
    pub fn is_local(&self) -> bool {
        !matches!(self, Intent::Unknown)
    }
}

pub const GREETING_RESPONSE: &str =
    "Hello! I am Jarvis, your personal AI assistant. How may I help you today?";
pub const WEATHER_RESPONSE: &str =
    "The weather is currently 72°F with partly cloudy skies. Perfect conditions, sir.";
pub const MUSIC_RESPONSE: &str = "Playing your favorite playlist. Enjoy the music!";
pub const STOP_RESPONSE: &str = "All media playback has been stopped.";
pub const STATUS_RESPONSE: &str = "All systems are operating at optimal capacity. \
Network connectivity is stable, power levels are good.";
pub const HELP_RESPONSE: &str = "I can help you with time, weather, system status, \
controlling lights and music, setting reminders, calculations, and much more. Just speak naturally!";
pub const SHUTDOWN_RESPONSE: &str = "Initiating sleep mode. I will be here when you need me.";
pub const CALCULATION_FAILED_RESPONSE: &str =
    "I couldn't calculate that expression. Please try a simpler mathematical operation.";

/// Render the local response for a deterministic intent
///
/// Returns `None` for [`Intent::Unknown`], which must go to the backend.
pub fn respond(intent: &Intent) -> Option<String> {
    let text = match intent {
        Intent::Greeting => GREETING_RESPONSE.to_string(),
        Intent::TimeQuery => format!(
            "The current time is {}",
            Local::now().format("%-I:%M:%S %p")
        ),
        Intent::WeatherQuery => WEATHER_RESPONSE.to_string(),
        Intent::BatteryQuery => {
            let level: u8 = rand::thread_rng().gen_range(70..=100);
            format!("Battery level is at {level}%. All systems operating normally.")
        }
        Intent::LightsControl { state } => format!("Lights have been turned {state}"),
        Intent::MusicControl => MUSIC_RESPONSE.to_string(),
        Intent::StopMedia => STOP_RESPONSE.to_string(),
        Intent::StatusReport => STATUS_RESPONSE.to_string(),
        Intent::Help => HELP_RESPONSE.to_string(),
        Intent::Shutdown => SHUTDOWN_RESPONSE.to_string(),
        Intent::VolumeControl { direction } => match direction {
            VolumeDirection::Up => "Volume increased".to_string(),
            VolumeDirection::Down => "Volume decreased".to_string(),
        },
        Intent::WifiControl { state } => format!("WiFi has been turned {state}"),
        Intent::BluetoothControl { state } => format!("Bluetooth has been turned {state}"),
        Intent::Search { query } => {
            format!("Searching for \"{query}\". I'll display the results for you.")
        }
        Intent::Reminder { text } => {
            format!("Reminder set: \"{text}\". I'll notify you at the appropriate time.")
        }
        Intent::Calculate { expression } => match calculator::evaluate(expression) {
            Ok(value) => format!("The result is {}", calculator::format_number(value)),
            Err(e) => {
                debug!("Calculation of '{}' failed: {}", expression, e);
                CALCULATION_FAILED_RESPONSE.to_string()
            }
        },
        Intent::Unknown => return None,
    };
    Some(text)
}

/// Extractor turning a regex match into an intent; `None` falls through to the next rule
type Extractor = fn(&Captures) -> Option<Intent>;

struct Rule {
    name: &'static str,
    pattern: Regex,
    extract: Extractor,
}

impl Rule {
    fn new(name: &'static str, pattern: &str, extract: Extractor) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("built-in command pattern must compile"),
            extract,
        }
    }
}

/// First non-empty capture among the given slots
fn first_slot<'t>(caps: &Captures<'t>, slots: &[usize]) -> Option<&'t str> {
    slots
        .iter()
        .find_map(|&i| caps.get(i))
        .map(|m| m.as_str())
}

fn toggle_from(caps: &Captures) -> Option<Toggle> {
    first_slot(caps, &[1, 2, 3]).and_then(Toggle::parse)
}

fn trailing_text(caps: &Captures) -> Option<String> {
    caps.get(1)
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

lazy_static! {
    /// Spoken arithmetic operators and their symbols
    static ref SPOKEN_OPERATORS: Vec<(Regex, &'static str)> = vec![
        (Regex::new(r"\bmultiplied by\b").unwrap(), "*"),
        (Regex::new(r"\bdivided by\b").unwrap(), "/"),
        (Regex::new(r"\b(?:times|x)\b").unwrap(), "*"),
        (Regex::new(r"\bover\b").unwrap(), "/"),
        (Regex::new(r"\bplus\b").unwrap(), "+"),
        (Regex::new(r"\bminus\b").unwrap(), "-"),
    ];

    static ref RULES: Vec<Rule> = vec![
        Rule::new("greeting", r"^(?:hello|hi|hey)(?: jarvis)?$", |_| Some(Intent::Greeting)),
        Rule::new(
            "time",
            r"^(?:what time is it|what time|what's the time|what is the time|current time|time now|tell me the time)$",
            |_| Some(Intent::TimeQuery),
        ),
        Rule::new(
            "weather",
            r"^(?:weather|temperature|forecast|(?:what's|what is|how's|how is) the (?:weather|temperature|forecast)(?: like)?(?: today)?)$",
            |_| Some(Intent::WeatherQuery),
        ),
        Rule::new(
            "battery",
            r"^(?:battery|battery (?:status|level)|power level)$",
            |_| Some(Intent::BatteryQuery),
        ),
        Rule::new(
            "lights",
            r"^(?:turn (on|off) (?:the )?lights?|(?:the )?lights? (on|off)|turn (?:the )?lights? (on|off))$",
            |caps| toggle_from(caps).map(|state| Intent::LightsControl { state }),
        ),
        Rule::new(
            "music",
            r"^(?:play music|play some music|start music|music on)$",
            |_| Some(Intent::MusicControl),
        ),
        Rule::new("stop", r"^(?:stop|pause|halt)$", |_| Some(Intent::StopMedia)),
        Rule::new(
            "status",
            r"^(?:system status|status report|status|how are you)$",
            |_| Some(Intent::StatusReport),
        ),
        Rule::new("help", r"^(?:help|commands|what can you do)$", |_| Some(Intent::Help)),
        Rule::new(
            "shutdown",
            r"^(?:shutdown|shut down|power off|sleep mode)$",
            |_| Some(Intent::Shutdown),
        ),
        Rule::new(
            "volume",
            r"^(?:volume (up|down)|(increase|raise|decrease|lower) (?:the )?volume|turn (?:the )?volume (up|down))$",
            |caps| {
                first_slot(caps, &[1, 2, 3])
                    .and_then(VolumeDirection::parse)
                    .map(|direction| Intent::VolumeControl { direction })
            },
        ),
        Rule::new(
            "wifi",
            r"^(?:wi-? ?fi (on|off)|turn (on|off) (?:the )?wi-? ?fi|turn (?:the )?wi-? ?fi (on|off))$",
            |caps| toggle_from(caps).map(|state| Intent::WifiControl { state }),
        ),
        Rule::new(
            "bluetooth",
            r"^(?:bluetooth (on|off)|turn (on|off) (?:the )?bluetooth|turn (?:the )?bluetooth (on|off))$",
            |caps| toggle_from(caps).map(|state| Intent::BluetoothControl { state }),
        ),
        Rule::new(
            "search",
            r"^(?:search for|search|find|look up) (.+)$",
            |caps| trailing_text(caps).map(|query| Intent::Search { query }),
        ),
        Rule::new(
            "reminder",
            r"^(?:remind me|set (?:a )?reminder) (.+)$",
            |caps| trailing_text(caps).map(|text| Intent::Reminder { text }),
        ),
        Rule::new(
            "calculate",
            r"^(?:calculate|compute|what is|what's) (.+)$",
            |caps| {
                caps.get(1)
                    .and_then(|m| arithmetic_expression(m.as_str()))
                    .map(|expression| Intent::Calculate { expression })
            },
        ),
    ];
}

/// Rewrite spoken operators and keep only arithmetic characters
///
/// Returns `None` when no digit survives, so "what is love" is not a calculation.
fn arithmetic_expression(spoken: &str) -> Option<String> {
    let mut expression = spoken.to_string();
    for (pattern, symbol) in SPOKEN_OPERATORS.iter() {
        expression = pattern.replace_all(&expression, *symbol).into_owned();
    }
    let sanitized = calculator::sanitize(&expression);
    sanitized
        .chars()
        .any(|c| c.is_ascii_digit())
        .then_some(sanitized)
}

/// Ordered, first-match-wins utterance classifier
#[derive(Debug, Clone, Default)]
pub struct CommandClassifier {
    normalizer: TextNormalizer,
}

impl CommandClassifier {
    pub fn new(normalizer: TextNormalizer) -> Self {
        Self { normalizer }
    }

    pub fn normalizer(&self) -> &TextNormalizer {
        &self.normalizer
    }

    /// Classify an utterance; unmatched input is [`Intent::Unknown`]
    ///
    /// The text is normalized first, so a leftover wake phrase does not change
    /// the outcome. An utterance that is only a wake phrase is matched as-is.
    pub fn classify(&self, text: &str) -> Intent {
        let mut normalized = self.normalizer.normalize(text);
        if normalized.is_empty() {
            normalized = self.normalizer.canonical(text);
        }

        for rule in RULES.iter() {
            if let Some(caps) = rule.pattern.captures(&normalized) {
                if let Some(intent) = (rule.extract)(&caps) {
                    debug!("🎯 Matched rule '{}' for '{}'", rule.name, normalized);
                    return intent;
                }
            }
        }
        Intent::Unknown
    }

    /// Rule names in evaluation order
    pub fn rule_names() -> Vec<&'static str> {
        RULES.iter().map(|r| r.name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> Intent {
        CommandClassifier::default().classify(text)
    }

    #[test]
    fn test_rule_order() {
        assert_eq!(
            CommandClassifier::rule_names(),
            vec![
                "greeting", "time", "weather", "battery", "lights", "music", "stop", "status",
                "help", "shutdown", "volume", "wifi", "bluetooth", "search", "reminder",
                "calculate"
            ]
        );
    }

    #[test]
    fn test_fixed_phrases() {
        assert_eq!(classify("hello"), Intent::Greeting);
        assert_eq!(classify("hey jarvis"), Intent::Greeting);
        assert_eq!(classify("what time is it"), Intent::TimeQuery);
        assert_eq!(classify("what's the time"), Intent::TimeQuery);
        assert_eq!(classify("current time"), Intent::TimeQuery);
        assert_eq!(classify("what's the weather like"), Intent::WeatherQuery);
        assert_eq!(classify("power level"), Intent::BatteryQuery);
        assert_eq!(classify("play music"), Intent::MusicControl);
        assert_eq!(classify("pause"), Intent::StopMedia);
        assert_eq!(classify("status report"), Intent::StatusReport);
        assert_eq!(classify("what can you do"), Intent::Help);
        assert_eq!(classify("power off"), Intent::Shutdown);
    }

    #[test]
    fn test_wake_prefix_does_not_change_intent() {
        for (text, expected) in [
            ("what time is it", Intent::TimeQuery),
            ("system status", Intent::StatusReport),
            ("help", Intent::Help),
        ] {
            assert_eq!(classify(text), expected);
            assert_eq!(classify(&format!("hey jarvis {text}")), expected);
            assert_eq!(classify(&format!("Jarvis, {text}?")), expected);
        }
    }

    #[test]
    fn test_toggle_slots() {
        let on = Intent::LightsControl { state: Toggle::On };
        assert_eq!(classify("turn on the lights"), on);
        assert_eq!(classify("lights on"), on);
        assert_eq!(classify("turn the light on"), on);
        assert_eq!(
            classify("turn off lights"),
            Intent::LightsControl { state: Toggle::Off }
        );
        assert_eq!(
            classify("wifi off"),
            Intent::WifiControl { state: Toggle::Off }
        );
        assert_eq!(
            classify("turn on wi-fi"),
            Intent::WifiControl { state: Toggle::On }
        );
        assert_eq!(
            classify("turn bluetooth off"),
            Intent::BluetoothControl { state: Toggle::Off }
        );
    }

    #[test]
    fn test_volume_directions() {
        let up = Intent::VolumeControl {
            direction: VolumeDirection::Up,
        };
        let down = Intent::VolumeControl {
            direction: VolumeDirection::Down,
        };
        assert_eq!(classify("volume up"), up);
        assert_eq!(classify("increase volume"), up);
        assert_eq!(classify("decrease the volume"), down);
        assert_eq!(classify("turn the volume down"), down);
    }

    #[test]
    fn test_trailing_parameters() {
        assert_eq!(
            classify("search for rust async book"),
            Intent::Search {
                query: "rust async book".into()
            }
        );
        assert_eq!(
            classify("look up the weather in paris"),
            Intent::Search {
                query: "the weather in paris".into()
            }
        );
        assert_eq!(
            classify("remind me to call mom"),
            Intent::Reminder {
                text: "to call mom".into()
            }
        );
    }

    #[test]
    fn test_calculate_is_sanitized() {
        assert_eq!(
            classify("calculate 2 + 2 * 3"),
            Intent::Calculate {
                expression: "2 + 2 * 3".into()
            }
        );
        assert_eq!(
            classify("what is 10 divided by 4"),
            Intent::Calculate {
                expression: "10 / 4".into()
            }
        );
        assert_eq!(
            classify("compute process.exit(1) + 2"),
            Intent::Calculate {
                expression: "(1) + 2".into()
            }
        );
    }

    #[test]
    fn test_earlier_rule_wins() {
        // Also a valid calculate trigger
        assert_eq!(classify("what is the weather"), Intent::WeatherQuery);
        assert_eq!(classify("what is the time"), Intent::TimeQuery);
        // Search precedes calculate
        assert_eq!(
            classify("find 2 + 2"),
            Intent::Search {
                query: "2 + 2".into()
            }
        );
    }

    #[test]
    fn test_unknown() {
        assert_eq!(classify("tell me a joke"), Intent::Unknown);
        assert_eq!(classify("what is love"), Intent::Unknown);
        assert_eq!(classify(""), Intent::Unknown);
        assert!(!Intent::Unknown.is_local());
        assert!(Intent::Help.is_local());
    }

    #[test]
    fn test_responses() {
        let calc = Intent::Calculate {
            expression: "2 + 2 * 3".into(),
        };
        assert_eq!(respond(&calc).as_deref(), Some("The result is 8"));

        let broken = Intent::Calculate {
            expression: "(1 +".into(),
        };
        assert_eq!(respond(&broken).as_deref(), Some(CALCULATION_FAILED_RESPONSE));

        let time = respond(&Intent::TimeQuery).unwrap();
        assert!(time.starts_with("The current time is "));
        assert!(time.contains(':'));

        assert_eq!(
            respond(&Intent::LightsControl { state: Toggle::Off }).as_deref(),
            Some("Lights have been turned off")
        );
        assert_eq!(
            respond(&Intent::VolumeControl {
                direction: VolumeDirection::Up
            })
            .as_deref(),
            Some("Volume increased")
        );
        assert_eq!(respond(&Intent::Unknown), None);
    }

    #[test]
    fn test_battery_level_in_range() {
        for _ in 0..20 {
            let text = respond(&Intent::BatteryQuery).unwrap();
            let level: u8 = text
                .trim_start_matches("Battery level is at ")
                .split('%')
                .next()
                .unwrap()
                .parse()
                .unwrap();
            assert!((70..=100).contains(&level));
        }
    }

    #[test]
    fn test_intent_serialization() {
        let json = serde_json::to_string(&Intent::WifiControl { state: Toggle::On }).unwrap();
        assert_eq!(json, r#"{"intent":"wifi_control","state":"on"}"#);
    }
}
