//! Backend composing the two heterogeneous speech mechanisms.
//!
//! The source language goes through a local [`SynthesisMechanism`] with an
//! explicitly selected voice and a slowed utterance rate; the target language
//! goes through a [`StreamedAudioMechanism`] fed a fresh TTS endpoint URL per
//! utterance. Unifying both behind [`SpeechBackend`] keeps the orchestrator
//! language-agnostic about how speech happens.

use derive_builder::Builder;

use super::{StreamedAudioMechanism, SynthesisMechanism, VoiceInfo};
use crate::{Completion, SpeechBackend};

/// Fixed utterance rate for the source language, as a multiplier on the
/// mechanism's normal speaking rate. Slightly slowed for learners.
pub const SOURCE_SPEECH_RATE: f32 = 0.85;

/// Configuration for a [`DualBackend`].
///
/// # Examples
///
/// ```
/// use phrasebook_rs::backends::dual::BackendConfigBuilder;
///
/// let config = BackendConfigBuilder::default()
///     .source_language("en-US")
///     .target_language("it")
///     .endpoint("https://tts.example.net/speak")
///     .build()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct BackendConfig {
    /// BCP 47 tag of the source language (e.g. `"en-US"`), used for voice
    /// selection.
    pub source_language: String,
    /// Language code embedded in the TTS endpoint URL for the target
    /// rendering (e.g. `"it"`).
    pub target_language: String,
    /// Base URL of the external TTS endpoint for target-language audio.
    pub endpoint: String,
}

/// Select a synthesis voice for `language` by priority: exact regional tag
/// match, then any tag starting with the bare language code, then the first
/// available voice. Returns `None` only when no voice is available at all;
/// playback then proceeds with the mechanism's default.
///
/// Tags are compared ASCII-case-insensitively and `_` is treated as `-`.
pub fn select_voice(voices: &[VoiceInfo], language: &str) -> Option<VoiceInfo> {
    let want = normalize_tag(language);
    let code = want.split('-').next().unwrap_or(want.as_str()).to_string();

    voices
        .iter()
        .find(|v| normalize_tag(&v.language) == want)
        .or_else(|| voices.iter().find(|v| normalize_tag(&v.language).starts_with(&code)))
        .or_else(|| voices.first())
        .cloned()
}

fn normalize_tag(tag: &str) -> String {
    tag.trim().replace('_', "-").to_ascii_lowercase()
}

/// [`SpeechBackend`] over one synthesis mechanism and one streamed-audio
/// mechanism.
///
/// Owns the session-scoped voice selection for the source language; the
/// selection is re-derived on [`voices_changed`](Self::voices_changed)
/// rather than mutated ambiently.
pub struct DualBackend<S, A> {
    synthesis: S,
    stream: A,
    config: BackendConfig,
    voice: Option<VoiceInfo>,
}

impl<S: SynthesisMechanism, A: StreamedAudioMechanism> DualBackend<S, A> {
    pub fn new(synthesis: S, stream: A, config: BackendConfig) -> Self {
        let voice = select_voice(&synthesis.voices(), &config.source_language);
        match &voice {
            Some(v) => log::info!(
                "Selected voice '{}' ({}) for {}",
                v.name,
                v.language,
                config.source_language
            ),
            None => log::warn!(
                "No synthesis voice available for {}, using mechanism default",
                config.source_language
            ),
        }
        Self {
            synthesis,
            stream,
            config,
            voice,
        }
    }

    /// Re-derive the voice selection. Hosts call this when the mechanism
    /// reports that its voice list changed.
    pub fn voices_changed(&mut self) {
        self.voice = select_voice(&self.synthesis.voices(), &self.config.source_language);
        log::debug!(
            "Voice list changed, now using {:?}",
            self.voice.as_ref().map(|v| v.id.as_str())
        );
    }

    pub fn selected_voice(&self) -> Option<&VoiceInfo> {
        self.voice.as_ref()
    }

    /// Build the streamed-audio URL for one target-language utterance.
    ///
    /// No caching: each call produces a URL for a fresh request.
    fn tts_url(&self, text: &str) -> String {
        format!(
            "{}?text={}&targetLang={}",
            self.config.endpoint,
            urlencoding::encode(text),
            self.config.target_language
        )
    }
}

impl<S: SynthesisMechanism, A: StreamedAudioMechanism> SpeechBackend for DualBackend<S, A> {
    fn speak_source(&mut self, text: &str, done: Completion) {
        self.synthesis
            .speak(text, self.voice.as_ref(), SOURCE_SPEECH_RATE, done);
    }

    fn speak_target(&mut self, text: &str, done: Completion) {
        let url = self.tts_url(text);
        self.stream.play(&url, done);
    }

    fn cancel_all(&mut self) {
        self.synthesis.stop();
        self.stream.stop();
    }
}
