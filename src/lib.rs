//! Jarvis Library
//!
//! Core modules for the Jarvis voice assistant: wake-word listening,
//! command classification, conversation management and speech output.

pub mod asr;
pub mod commands;
pub mod config;
pub mod controller;
pub mod conversation;
pub mod core;
pub mod error;
pub mod listener;
pub mod tts;

pub use controller::{ControllerHandle, ControllerSnapshot, VoiceController};
pub use error::{JarvisError, JarvisResult};
