//! Degenerate backend for environments without audio capability.

use crate::{Completion, SpeechBackend};

/// Backend that produces no audio but still honors the completion contract.
///
/// Both speak operations invoke `done` immediately and `cancel_all` is a
/// no-op, so the orchestrator never stalls or panics when run in a
/// non-interactive context (tests, servers, CI).
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentBackend;

impl SpeechBackend for SilentBackend {
    fn speak_source(&mut self, _text: &str, done: Completion) {
        done();
    }

    fn speak_target(&mut self, _text: &str, done: Completion) {
        done();
    }

    fn cancel_all(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn completes_synchronously_for_both_languages() {
        let fired = Arc::new(Mutex::new(0));
        let mut backend = SilentBackend;

        let f = fired.clone();
        backend.speak_source("hello", Box::new(move || *f.lock() += 1));
        let f = fired.clone();
        backend.speak_target("ciao", Box::new(move || *f.lock() += 1));
        backend.cancel_all();

        assert_eq!(*fired.lock(), 2);
    }
}
