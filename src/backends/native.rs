//! OS speech synthesis mechanism built on the `tts` crate.
//!
//! Platform coverage follows `tts` itself: Speech Dispatcher on Linux,
//! AVFoundation on macOS, WinRT on Windows. Where the platform reports
//! utterance-end events, completions fire when speech actually finishes;
//! where it does not, the mechanism completes immediately after dispatch so
//! the orchestrator never stalls.

use std::sync::Arc;

use parking_lot::Mutex;
use tts::{Tts, UtteranceId};

use super::{SpeechError, SynthesisMechanism, VoiceInfo};
use crate::Completion;

struct PendingUtterance {
    /// `None` until the platform hands back an id, or when the platform does
    /// not support utterance ids at all; the next end event then completes it.
    id: Option<UtteranceId>,
    done: Completion,
}

/// [`SynthesisMechanism`] speaking through the operating system's synthesizer.
///
/// At most one utterance is in flight: every speak interrupts the previous
/// one and silently drops its stale completion (the orchestrator's cycle
/// guard makes a fired stale completion equally inert, but dropping avoids
/// the call entirely).
pub struct NativeSynthesis {
    tts: Tts,
    pending: Arc<Mutex<Option<PendingUtterance>>>,
    callbacks_supported: bool,
}

impl NativeSynthesis {
    pub fn new() -> Result<Self, SpeechError> {
        let mut tts = Tts::default().map_err(|e| SpeechError::Synthesis(e.to_string()))?;
        let callbacks_supported = tts.supported_features().utterance_callbacks;
        let pending: Arc<Mutex<Option<PendingUtterance>>> = Arc::new(Mutex::new(None));

        if callbacks_supported {
            let slot = Arc::clone(&pending);
            tts.on_utterance_end(Some(Box::new(move |finished| {
                let done = {
                    let mut slot = slot.lock();
                    match slot.take() {
                        Some(p) if p.id.as_ref().map_or(true, |id| *id == finished) => {
                            Some(p.done)
                        }
                        other => {
                            // End event for an older, interrupted utterance.
                            *slot = other;
                            None
                        }
                    }
                };
                if let Some(done) = done {
                    done();
                }
            })))
            .map_err(|e| SpeechError::Synthesis(e.to_string()))?;
        } else {
            log::info!("Platform reports no utterance-end events, completing on dispatch");
        }

        Ok(Self {
            tts,
            pending,
            callbacks_supported,
        })
    }

    fn apply_voice(&mut self, info: &VoiceInfo) {
        match self.tts.voices() {
            Ok(voices) => {
                if let Some(v) = voices.iter().find(|v| v.id() == info.id) {
                    if let Err(e) = self.tts.set_voice(v) {
                        log::warn!("Failed to set voice '{}': {e}", info.id);
                    }
                }
            }
            Err(e) => log::warn!("Voice list unavailable: {e}"),
        }
    }
}

impl SynthesisMechanism for NativeSynthesis {
    fn voices(&self) -> Vec<VoiceInfo> {
        match self.tts.voices() {
            Ok(voices) => voices
                .iter()
                .map(|v| VoiceInfo {
                    id: v.id(),
                    name: v.name(),
                    language: v.language().to_string(),
                })
                .collect(),
            Err(e) => {
                log::warn!("Voice list unavailable: {e}");
                Vec::new()
            }
        }
    }

    fn speak(&mut self, text: &str, voice: Option<&VoiceInfo>, rate: f32, done: Completion) {
        // Drop the stale completion first; interrupt below stops the audio.
        self.pending.lock().take();

        if let Some(info) = voice {
            self.apply_voice(info);
        }
        let scaled = (self.tts.normal_rate() * rate)
            .clamp(self.tts.min_rate(), self.tts.max_rate());
        if let Err(e) = self.tts.set_rate(scaled) {
            log::warn!("Failed to set speech rate: {e}");
        }

        if !self.callbacks_supported {
            if let Err(e) = self.tts.speak(text, true) {
                log::warn!("Speech synthesis failed: {e}");
            }
            done();
            return;
        }

        // Stash the completion before dispatch: a very short utterance could
        // otherwise end before it is recorded.
        *self.pending.lock() = Some(PendingUtterance { id: None, done });
        match self.tts.speak(text, true) {
            Ok(id) => {
                if let Some(p) = self.pending.lock().as_mut() {
                    p.id = id;
                }
            }
            Err(e) => {
                log::warn!("Speech synthesis failed: {e}");
                if let Some(p) = self.pending.lock().take() {
                    (p.done)();
                }
            }
        }
    }

    fn stop(&mut self) {
        self.pending.lock().take();
        if let Err(e) = self.tts.stop() {
            log::warn!("Failed to stop synthesis: {e}");
        }
    }
}
