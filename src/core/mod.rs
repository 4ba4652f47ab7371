//! Core processing modules
//!
//! Contains text normalization, the safe arithmetic evaluator
//! and the conversational backends.

pub mod backend;
pub mod calculator;
pub mod ollama;
pub mod openai;
pub mod text_normalizer;
