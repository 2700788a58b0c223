//! Playback orchestrator: drives one phrase at a time through its full
//! speak-source → settle → speak-target → settle → decide cycle.
//!
//! The machine has three named states ([`Stage`]) and a single decision
//! function that runs at the end of every cycle. Cancellation and superseded
//! cycles are handled with a generation counter: every delayed continuation
//! and completion callback re-checks that it still belongs to the active
//! cycle before acting, so late callbacks from a cancelled or replaced cycle
//! are inert.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::scheduler::Scheduler;
use crate::{Phrase, SpeechBackend};

/// Settle delay after the source-language segment, for listening comprehension.
pub const SOURCE_SETTLE_DELAY: Duration = Duration::from_millis(400);

/// Settle delay after the target-language segment, before the next decision.
pub const TARGET_SETTLE_DELAY: Duration = Duration::from_millis(700);

/// What the speech backend is currently doing.
///
/// `Stage::Idle` with `is_playing == true` means a settle delay or decision
/// is pending; the machine never speaks while paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    SpeakingSource,
    SpeakingTarget,
}

/// Read-only snapshot of the playback session, for rendering by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackState {
    pub current_index: usize,
    pub is_playing: bool,
    pub repeat: bool,
    pub stage: Stage,
}

struct Session {
    current_index: usize,
    is_playing: bool,
    repeat: bool,
    stage: Stage,
    /// Generation counter. Bumped whenever a new cycle starts or playback is
    /// paused; continuations carrying an older value do nothing.
    cycle: u64,
}

struct PlayerInner<B: SpeechBackend> {
    phrases: Vec<Phrase>,
    backend: Mutex<B>,
    scheduler: Arc<dyn Scheduler>,
    session: Mutex<Session>,
}

impl<B: SpeechBackend> PlayerInner<B> {
    fn cycle_active(&self, cycle: u64) -> bool {
        let s = self.session.lock();
        s.cycle == cycle && s.is_playing
    }
}

impl<B: SpeechBackend> Drop for PlayerInner<B> {
    fn drop(&mut self) {
        // Teardown: release both mechanisms so no audio outlives the session.
        self.backend.get_mut().cancel_all();
    }
}

/// Sequential two-language phrase player.
///
/// A cheap cloneable handle; clones share one playback session. The session
/// lives until the last handle is dropped, at which point all in-flight
/// speech is cancelled.
///
/// # Quick Start
///
/// ```no_run
/// use std::sync::Arc;
/// use phrasebook_rs::{Phrase, Player, SilentBackend, ThreadScheduler};
///
/// let phrases = vec![Phrase::new("water", "acqua")];
/// let player = Player::new(phrases, SilentBackend, Arc::new(ThreadScheduler));
///
/// player.play();
/// player.toggle_repeat();
/// player.pause();
/// ```
pub struct Player<B: SpeechBackend> {
    inner: Arc<PlayerInner<B>>,
}

impl<B: SpeechBackend> Clone for Player<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: SpeechBackend + 'static> Player<B> {
    /// Create a player over a fixed, ordered phrase list.
    ///
    /// The list is read-only for the player's lifetime. An empty list is
    /// valid: playback controls are safe to call and no speech starts.
    pub fn new(phrases: Vec<Phrase>, backend: B, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            inner: Arc::new(PlayerInner {
                phrases,
                backend: Mutex::new(backend),
                scheduler,
                session: Mutex::new(Session {
                    current_index: 0,
                    is_playing: false,
                    repeat: false,
                    stage: Stage::Idle,
                    cycle: 0,
                }),
            }),
        }
    }

    /// Start (or restart) playback at the current index.
    ///
    /// No-op when already playing: at most one phrase cycle may be in flight.
    pub fn play(&self) {
        let index = {
            let mut s = self.inner.session.lock();
            if s.is_playing {
                return;
            }
            s.is_playing = true;
            s.current_index
        };
        log::debug!("playback started at phrase {index}");
        Self::start_cycle(&self.inner, index);
    }

    /// Pause playback, synchronously cancelling all in-flight speech.
    ///
    /// The remainder of the current cycle is discarded; resuming with
    /// [`play`](Self::play) restarts the cycle from the beginning of the
    /// current phrase.
    pub fn pause(&self) {
        {
            let mut s = self.inner.session.lock();
            s.is_playing = false;
            s.stage = Stage::Idle;
            // Supersede pending settle timers and completion callbacks.
            s.cycle += 1;
        }
        self.inner.backend.lock().cancel_all();
        log::debug!("playback paused");
    }

    /// Advance to the next phrase, wrapping at the end of the list.
    ///
    /// Available regardless of play state. When playing, the cycle restarts
    /// at the new index and the old cycle is superseded.
    pub fn next(&self) {
        self.step(1);
    }

    /// Go back to the previous phrase, wrapping at the start of the list.
    pub fn previous(&self) {
        self.step(-1);
    }

    /// Flip repeat mode. Takes effect at the next decision point.
    pub fn toggle_repeat(&self) {
        let mut s = self.inner.session.lock();
        s.repeat = !s.repeat;
        log::debug!("repeat mode {}", if s.repeat { "on" } else { "off" });
    }

    /// Snapshot of the current session state.
    pub fn state(&self) -> PlaybackState {
        let s = self.inner.session.lock();
        PlaybackState {
            current_index: s.current_index,
            is_playing: s.is_playing,
            repeat: s.repeat,
            stage: s.stage,
        }
    }

    pub fn phrase_count(&self) -> usize {
        self.inner.phrases.len()
    }

    #[cfg(test)]
    fn cycle_generation(&self) -> u64 {
        self.inner.session.lock().cycle
    }

    pub fn current_phrase(&self) -> Option<&Phrase> {
        self.inner.phrases.get(self.state().current_index)
    }

    fn step(&self, delta: isize) {
        let count = self.inner.phrases.len();
        if count == 0 {
            return;
        }
        let restart = {
            let mut s = self.inner.session.lock();
            let cur = s.current_index as isize;
            s.current_index = (cur + delta).rem_euclid(count as isize) as usize;
            // Supersede the old cycle in the same critical section as the
            // index change: a continuation firing between this unlock and
            // the new cycle's start must already be stale, or it could
            // advance an index that is no longer current.
            s.cycle += 1;
            s.is_playing.then_some(s.current_index)
        };
        if let Some(index) = restart {
            Self::start_cycle(&self.inner, index);
        }
    }

    /// Begin a new phrase cycle at `index`, superseding any previous cycle.
    ///
    /// Skips silently when paused or when `index` has no phrase (empty list),
    /// leaving the stage unchanged.
    fn start_cycle(inner: &Arc<PlayerInner<B>>, index: usize) {
        let (text, cycle) = {
            let mut s = inner.session.lock();
            if !s.is_playing {
                return;
            }
            let Some(phrase) = inner.phrases.get(index) else {
                return;
            };
            s.cycle += 1;
            s.stage = Stage::SpeakingSource;
            (phrase.source.clone(), s.cycle)
        };
        log::debug!("cycle {cycle}: speaking source of phrase {index}");
        // Continuations hold only a weak reference: a pending completion or
        // settle timer must not keep the session alive after the host drops
        // its last handle.
        let weak = Arc::downgrade(inner);
        let done = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                Self::source_finished(inner, cycle, index);
            }
        });
        inner.backend.lock().speak_source(&text, done);
    }

    fn source_finished(inner: Arc<PlayerInner<B>>, cycle: u64, index: usize) {
        if !inner.cycle_active(cycle) {
            return;
        }
        let weak = Arc::downgrade(&inner);
        inner.scheduler.after(
            SOURCE_SETTLE_DELAY,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Self::begin_target(inner, cycle, index);
                }
            }),
        );
    }

    fn begin_target(inner: Arc<PlayerInner<B>>, cycle: u64, index: usize) {
        let text = {
            let mut s = inner.session.lock();
            if s.cycle != cycle || !s.is_playing {
                return;
            }
            let Some(phrase) = inner.phrases.get(index) else {
                return;
            };
            s.stage = Stage::SpeakingTarget;
            phrase.target.clone()
        };
        log::debug!("cycle {cycle}: speaking target of phrase {index}");
        let weak = Arc::downgrade(&inner);
        let done = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                Self::target_finished(inner, cycle, index);
            }
        });
        inner.backend.lock().speak_target(&text, done);
    }

    fn target_finished(inner: Arc<PlayerInner<B>>, cycle: u64, index: usize) {
        if !inner.cycle_active(cycle) {
            return;
        }
        let weak = Arc::downgrade(&inner);
        inner.scheduler.after(
            TARGET_SETTLE_DELAY,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Self::decide(inner, cycle, index);
                }
            }),
        );
    }

    /// Decision point, evaluated once per completed phrase cycle:
    /// repeat replays the same index, otherwise playback advances modulo the
    /// phrase count, otherwise the session stays idle.
    fn decide(inner: Arc<PlayerInner<B>>, cycle: u64, index: usize) {
        let next = {
            let mut s = inner.session.lock();
            if s.cycle != cycle {
                return;
            }
            s.stage = Stage::Idle;
            if s.repeat {
                Some(index)
            } else if s.is_playing {
                s.current_index = (s.current_index + 1) % inner.phrases.len();
                Some(s.current_index)
            } else {
                None
            }
        };
        if let Some(next) = next {
            Self::start_cycle(&inner, next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Completion;
    use std::collections::VecDeque;

    /// Scheduler backed by a manual task queue, so tests step through settle
    /// delays without waiting.
    #[derive(Default)]
    struct ManualScheduler {
        queue: Mutex<VecDeque<(Duration, crate::scheduler::Task)>>,
    }

    impl ManualScheduler {
        /// Run the oldest pending task, returning the delay it was scheduled
        /// with.
        fn run_next(&self) -> Option<Duration> {
            let entry = self.queue.lock().pop_front();
            entry.map(|(delay, task)| {
                task();
                delay
            })
        }

        fn run_all(&self) {
            while self.run_next().is_some() {}
        }

        fn pending(&self) -> usize {
            self.queue.lock().len()
        }
    }

    impl Scheduler for ManualScheduler {
        fn after(&self, delay: Duration, task: crate::scheduler::Task) {
            self.queue.lock().push_back((delay, task));
        }
    }

    /// Backend that records every call. In auto mode completions fire
    /// synchronously (also modelling a mechanism failure folded into the
    /// completion signal); in manual mode the test fires them itself.
    #[derive(Clone)]
    struct ScriptedBackend {
        calls: Arc<Mutex<Vec<String>>>,
        held: Arc<Mutex<Vec<Completion>>>,
        manual: bool,
    }

    impl ScriptedBackend {
        fn auto() -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                held: Arc::new(Mutex::new(Vec::new())),
                manual: false,
            }
        }

        fn manual() -> Self {
            Self {
                manual: true,
                ..Self::auto()
            }
        }
    }

    impl SpeechBackend for ScriptedBackend {
        fn speak_source(&mut self, text: &str, done: Completion) {
            self.calls.lock().push(format!("source:{text}"));
            if self.manual {
                self.held.lock().push(done);
            } else {
                done();
            }
        }

        fn speak_target(&mut self, text: &str, done: Completion) {
            self.calls.lock().push(format!("target:{text}"));
            if self.manual {
                self.held.lock().push(done);
            } else {
                done();
            }
        }

        fn cancel_all(&mut self) {
            self.calls.lock().push("cancel".to_string());
        }
    }

    fn phrases(n: usize) -> Vec<Phrase> {
        (0..n).map(|i| Phrase::new(format!("s{i}"), format!("t{i}"))).collect()
    }

    fn player_with(
        n: usize,
        backend: ScriptedBackend,
    ) -> (Player<ScriptedBackend>, Arc<ManualScheduler>) {
        let scheduler = Arc::new(ManualScheduler::default());
        let player = Player::new(phrases(n), backend, scheduler.clone());
        (player, scheduler)
    }

    #[test]
    fn navigation_is_closed_under_modulo() {
        let (player, _) = player_with(3, ScriptedBackend::auto());
        for _ in 0..4 {
            player.next();
        }
        assert_eq!(player.state().current_index, 1);
        for _ in 0..5 {
            player.previous();
        }
        assert_eq!(player.state().current_index, 2);
    }

    #[test]
    fn navigation_wraps_for_single_phrase() {
        let (player, _) = player_with(1, ScriptedBackend::auto());
        player.next();
        player.previous();
        assert_eq!(player.state().current_index, 0);
    }

    #[test]
    fn cycle_visits_source_then_target_with_settle_delays() {
        let backend = ScriptedBackend::auto();
        let calls = backend.calls.clone();
        let (player, scheduler) = player_with(3, backend);

        assert_eq!(player.state().stage, Stage::Idle);
        player.play();
        assert_eq!(player.state().stage, Stage::SpeakingSource);
        assert_eq!(calls.lock().as_slice(), ["source:s0"]);

        assert_eq!(scheduler.run_next(), Some(SOURCE_SETTLE_DELAY));
        assert_eq!(player.state().stage, Stage::SpeakingTarget);
        assert_eq!(calls.lock().as_slice(), ["source:s0", "target:t0"]);

        assert_eq!(scheduler.run_next(), Some(TARGET_SETTLE_DELAY));
        // Decision advanced the index and immediately started the next cycle.
        let state = player.state();
        assert_eq!(state.current_index, 1);
        assert_eq!(state.stage, Stage::SpeakingSource);
    }

    #[test]
    fn three_phrases_cycle_back_to_start() {
        let (player, scheduler) = player_with(3, ScriptedBackend::auto());
        player.play();
        for _ in 0..3 {
            scheduler.run_next();
            scheduler.run_next();
        }
        assert_eq!(player.state().current_index, 0);
        assert!(player.state().is_playing);
    }

    #[test]
    fn repeat_replays_same_index_across_cycles() {
        let backend = ScriptedBackend::auto();
        let calls = backend.calls.clone();
        let (player, scheduler) = player_with(2, backend);
        player.toggle_repeat();
        player.play();
        for _ in 0..3 {
            scheduler.run_next();
            scheduler.run_next();
            assert_eq!(player.state().current_index, 0);
        }
        let calls = calls.lock();
        assert!(calls.iter().all(|c| c.ends_with("0")));
    }

    #[test]
    fn repeat_toggle_takes_effect_at_next_decision() {
        let (player, scheduler) = player_with(3, ScriptedBackend::auto());
        player.play();
        scheduler.run_next();
        // Mid-cycle toggle: the current cycle still advances normally only
        // if repeat is off at the decision point, so this cycle repeats.
        player.toggle_repeat();
        scheduler.run_next();
        assert_eq!(player.state().current_index, 0);
        player.toggle_repeat();
        scheduler.run_next();
        scheduler.run_next();
        assert_eq!(player.state().current_index, 1);
    }

    #[test]
    fn pause_forces_idle_and_cancels_synchronously() {
        let backend = ScriptedBackend::auto();
        let calls = backend.calls.clone();
        let (player, scheduler) = player_with(3, backend);
        player.play();
        scheduler.run_next();
        assert_eq!(player.state().stage, Stage::SpeakingTarget);

        player.pause();
        let state = player.state();
        assert_eq!(state.stage, Stage::Idle);
        assert!(!state.is_playing);
        assert_eq!(calls.lock().last().map(String::as_str), Some("cancel"));

        // Stale settle timers must not start new speech.
        let before = calls.lock().len();
        scheduler.run_all();
        assert_eq!(calls.lock().len(), before);
        assert_eq!(player.state().stage, Stage::Idle);
    }

    #[test]
    fn play_after_pause_restarts_current_phrase() {
        let backend = ScriptedBackend::auto();
        let calls = backend.calls.clone();
        let (player, scheduler) = player_with(3, backend);
        player.play();
        scheduler.run_next();
        scheduler.run_next();
        assert_eq!(player.state().current_index, 1);
        player.pause();
        scheduler.run_all();

        player.play();
        assert_eq!(calls.lock().last().map(String::as_str), Some("source:s1"));
    }

    #[test]
    fn play_while_playing_is_a_no_op() {
        let backend = ScriptedBackend::auto();
        let calls = backend.calls.clone();
        let (player, _scheduler) = player_with(3, backend);
        player.play();
        player.play();
        assert_eq!(calls.lock().as_slice(), ["source:s0"]);
    }

    #[test]
    fn failing_target_mechanism_still_reaches_decision() {
        // A folded failure completes immediately, exactly like auto mode.
        let (player, scheduler) = player_with(3, ScriptedBackend::auto());
        player.play();
        scheduler.run_next();
        scheduler.run_next();
        assert_eq!(player.state().current_index, 1);
    }

    #[test]
    fn next_mid_cycle_supersedes_old_cycle() {
        let backend = ScriptedBackend::manual();
        let calls = backend.calls.clone();
        let held = backend.held.clone();
        let (player, scheduler) = player_with(3, backend);

        player.play();
        // Finish the source segment of phrase 0; the settle timer is queued.
        let done = held.lock().remove(0);
        done();
        assert_eq!(scheduler.pending(), 1);

        // Skip ahead while the old cycle is still pending.
        player.next();
        assert_eq!(player.state().current_index, 1);
        assert_eq!(calls.lock().as_slice(), ["source:s0", "source:s1"]);

        // The old cycle's settle timer fires, but is stale: no target speech
        // for phrase 0 may start.
        scheduler.run_next();
        assert_eq!(calls.lock().as_slice(), ["source:s0", "source:s1"]);

        // The new cycle proceeds normally.
        let done = held.lock().remove(0);
        done();
        scheduler.run_next();
        assert_eq!(
            calls.lock().as_slice(),
            ["source:s0", "source:s1", "target:t1"]
        );
    }

    #[test]
    fn navigation_supersedes_old_cycle_before_starting_the_new_one() {
        let (player, _scheduler) = player_with(3, ScriptedBackend::manual());
        player.play();
        let before = player.cycle_generation();

        player.next();
        // One bump for the index change itself, one for the new cycle. The
        // first guarantees that a continuation of the old cycle firing
        // between the index update and the new cycle's start is already
        // stale, so it cannot advance the superseded index.
        assert!(player.cycle_generation() >= before + 2);
    }

    #[test]
    fn stale_completion_after_skip_schedules_nothing() {
        let backend = ScriptedBackend::manual();
        let held = backend.held.clone();
        let (player, scheduler) = player_with(3, backend);

        player.play();
        player.next();
        assert_eq!(held.lock().len(), 2);

        // The superseded cycle's source completion arrives late.
        let stale = held.lock().remove(0);
        stale();
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn empty_phrase_list_skips_speech() {
        let backend = ScriptedBackend::auto();
        let calls = backend.calls.clone();
        let (player, scheduler) = player_with(0, backend);
        player.play();
        player.next();
        player.previous();
        assert_eq!(player.state().stage, Stage::Idle);
        assert_eq!(player.state().current_index, 0);
        assert!(calls.lock().is_empty());
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn speaking_implies_playing() {
        let (player, scheduler) = player_with(2, ScriptedBackend::auto());
        player.play();
        for _ in 0..5 {
            let state = player.state();
            if state.stage != Stage::Idle {
                assert!(state.is_playing);
            }
            scheduler.run_next();
        }
    }

    #[test]
    fn drop_cancels_in_flight_speech() {
        let backend = ScriptedBackend::auto();
        let calls = backend.calls.clone();
        let (player, _scheduler) = player_with(2, backend);
        player.play();
        drop(player);
        assert_eq!(calls.lock().last().map(String::as_str), Some("cancel"));
    }

    #[test]
    fn current_phrase_follows_navigation() {
        let (player, _) = player_with(3, ScriptedBackend::auto());
        assert_eq!(player.current_phrase().map(|p| p.source.as_str()), Some("s0"));
        player.next();
        assert_eq!(player.current_phrase().map(|p| p.target.as_str()), Some("t1"));
        assert_eq!(player.phrase_count(), 3);
    }
}
