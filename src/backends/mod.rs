//! Speech backends.
//!
//! This module contains implementations of the [`SpeechBackend`] contract
//! and the mechanism seams they are built from.
//!
//! # Available backends
//!
//! - [`dual::DualBackend`] - composes a local synthesis mechanism (source
//!   language) with a streamed-audio mechanism (target language)
//! - [`silent::SilentBackend`] - degenerate backend for environments without
//!   audio; completes immediately, never stalls the orchestrator
//!
//! # Mechanisms
//!
//! Enable concrete mechanisms via Cargo features:
//! - `native` - OS speech synthesis via the `tts` crate
//! - `stream` - streamed TTS audio via `reqwest` + `rodio`
//!
//! [`SpeechBackend`]: crate::SpeechBackend

pub mod dual;
pub mod silent;

#[cfg(feature = "native")]
pub mod native;
#[cfg(feature = "stream")]
pub mod stream;

use crate::Completion;

/// The single error class at this layer: a speech mechanism failed to
/// produce audio. Covers network failure, unsupported text, and mechanism
/// unavailability alike.
///
/// Never reaches the orchestrator as a distinct path: backends fold every
/// failure into the normal completion signal after logging it. Silence is
/// the visible failure mode.
#[derive(thiserror::Error, Debug)]
pub enum SpeechError {
    #[error("Synthesis failed: {0}")]
    Synthesis(String),
    #[error("Streamed audio failed: {0}")]
    Stream(String),
    #[error("No audio mechanism available")]
    Unavailable,
}

/// One synthesis voice as reported by a mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceInfo {
    /// Mechanism-specific identifier, stable across a voice-list query.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// BCP 47-style language tag, e.g. `"en-US"`.
    pub language: String,
}

/// Local speech synthesis, used for the source language.
///
/// Implementations fold their own failures: `speak` invokes `done` exactly
/// once whether output finished, errored, or could not start at all.
pub trait SynthesisMechanism: Send {
    /// Voices currently offered by the mechanism. May change at runtime;
    /// callers re-query on a voice-list-changed notification.
    fn voices(&self) -> Vec<VoiceInfo>;

    /// Speak `text`, interrupting any in-flight utterance first.
    ///
    /// `voice` of `None` uses the mechanism's default. `rate` is a multiplier
    /// on the mechanism's normal speaking rate.
    fn speak(&mut self, text: &str, voice: Option<&VoiceInfo>, rate: f32, done: Completion);

    /// Stop the current utterance, dropping its pending completion.
    fn stop(&mut self);
}

/// URL-driven streamed audio playback, used for the target language.
pub trait StreamedAudioMechanism: Send {
    /// Fetch and play the audio at `url`, stopping and resetting any
    /// in-flight playback first. Same completion contract as
    /// [`SynthesisMechanism::speak`].
    fn play(&mut self, url: &str, done: Completion);

    /// Stop playback and reset the position, dropping any pending completion.
    fn stop(&mut self);
}
