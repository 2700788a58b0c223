//! # phrasebook-rs
//!
//! A Rust library for sequential two-language phrase playback: for each
//! phrase, speak the source-language rendering, pause, speak the
//! target-language rendering, pause, then repeat, advance, or stop.
//!
//! ## Features
//!
//! - **Playback orchestrator**: an explicit state machine with play/pause,
//!   previous/next navigation, and a repeat mode
//! - **Pluggable speech backends**: one trait over two heterogeneous speech
//!   mechanisms (local synthesis for the source language, streamed audio for
//!   the target language), plus a silent backend for audio-less environments
//! - **Injectable scheduling**: settle delays between speech segments go
//!   through a scheduler trait, so tests run without wall-clock waits
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! phrasebook-rs = { version = "0.1", features = ["native", "stream"] }
//! ```
//!
//! ```no_run
//! use std::sync::Arc;
//! use phrasebook_rs::{Phrase, Player, SilentBackend, ThreadScheduler};
//!
//! let phrases = vec![
//!     Phrase::new("good morning", "buongiorno"),
//!     Phrase::new("thank you", "grazie"),
//! ];
//!
//! let player = Player::new(phrases, SilentBackend, Arc::new(ThreadScheduler));
//! player.play();
//! ```

pub mod backends;
pub mod player;
pub mod scheduler;

pub use backends::silent::SilentBackend;
pub use player::{PlaybackState, Player, Stage};
pub use scheduler::{Scheduler, ThreadScheduler};

use std::path::Path;

use serde::Deserialize;

/// Completion callback for a speak operation.
///
/// Invoked exactly once, whether the underlying mechanism finished naturally
/// or errored; callers must not distinguish the two.
pub type Completion = Box<dyn FnOnce() + Send + 'static>;

/// One entry of the phrase list: a source-language text and its
/// target-language rendering. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Phrase {
    /// Text spoken first, in the source language.
    pub source: String,
    /// Text spoken second, in the target language.
    pub target: String,
}

impl Phrase {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PhraseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid phrase list: {0}")]
    Parse(String),
}

/// Parse a phrase list from a JSON array of `{"source": ..., "target": ...}`
/// records.
pub fn parse_phrases(json: &str) -> Result<Vec<Phrase>, PhraseError> {
    serde_json::from_str(json).map_err(|e| PhraseError::Parse(e.to_string()))
}

/// Load a phrase list from a JSON file.
///
/// The list is loaded once at startup and is read-only afterwards.
pub fn load_phrases(path: &Path) -> Result<Vec<Phrase>, PhraseError> {
    let content = std::fs::read_to_string(path)?;
    let phrases = parse_phrases(&content)?;
    log::info!("Loaded {} phrases from {}", phrases.len(), path.display());
    Ok(phrases)
}

/// Common interface over the two speech-producing mechanisms.
///
/// The orchestrator drives playback exclusively through this trait and stays
/// agnostic about *how* speech happens: the source language is typically a
/// local synthesis call, the target language a streamed audio fetch.
///
/// # Completion contract
///
/// Both speak operations invoke their [`Completion`] exactly once: on natural
/// finish or on error, never both, never neither. A speak call must first stop
/// any in-flight output of its own kind, which serializes access to each
/// underlying mechanism without an explicit lock.
pub trait SpeechBackend: Send {
    /// Begin audible output of `text` in the source language.
    fn speak_source(&mut self, text: &str, done: Completion);

    /// Begin audible output of `text` in the target language.
    ///
    /// Any in-flight target-language audio is stopped and its playback
    /// position reset before the new output starts.
    fn speak_target(&mut self, text: &str, done: Completion);

    /// Immediately stop both mechanisms and reset any playback position.
    ///
    /// Completions for interrupted output either never fire or fire inertly:
    /// the orchestrator guards every continuation with a cycle-generation
    /// check, so a late callback has no effect.
    fn cancel_all(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_phrase_list_from_json() {
        let json = r#"[
            {"source": "good morning", "target": "buongiorno"},
            {"source": "thank you", "target": "grazie"}
        ]"#;
        let phrases = parse_phrases(json).expect("valid phrase list");
        assert_eq!(
            phrases,
            vec![
                Phrase::new("good morning", "buongiorno"),
                Phrase::new("thank you", "grazie"),
            ]
        );
    }

    #[test]
    fn rejects_malformed_phrase_list() {
        let err = parse_phrases(r#"[{"source": "only half"}]"#).unwrap_err();
        assert!(matches!(err, PhraseError::Parse(_)));
    }

    #[test]
    fn empty_list_is_valid() {
        assert!(parse_phrases("[]").expect("empty list parses").is_empty());
    }
}
