//! Streamed-audio mechanism: fetches TTS audio over HTTP and plays it with
//! rodio.
//!
//! The audio output stream is not `Send`, so a dedicated playback thread owns
//! it for the mechanism's lifetime and receives requests over a channel. The
//! sink handle is shared back so `stop` can halt playback from the caller's
//! thread. A generation counter supersedes in-flight requests: a replaced or
//! stopped request never fires its completion.

use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};

use super::{SpeechError, StreamedAudioMechanism};
use crate::Completion;

struct Request {
    url: String,
    generation: u64,
    done: Completion,
}

type SharedSink = Arc<Mutex<Option<Arc<Sink>>>>;

/// [`StreamedAudioMechanism`] backed by `reqwest` (blocking fetch) and
/// `rodio` (decode and playback).
///
/// No caching: every play issues a fresh request for the given URL.
pub struct StreamedAudio {
    tx: Sender<Request>,
    sink: SharedSink,
    generation: Arc<AtomicU64>,
}

impl StreamedAudio {
    /// Spawn the playback thread and open the default audio output.
    ///
    /// Fails when no output device is available; callers in audio-less
    /// environments should fall back to [`SilentBackend`](crate::SilentBackend).
    pub fn new() -> Result<Self, SpeechError> {
        let (tx, rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let sink: SharedSink = Arc::new(Mutex::new(None));
        let generation = Arc::new(AtomicU64::new(0));

        let thread_sink = Arc::clone(&sink);
        let thread_generation = Arc::clone(&generation);
        thread::Builder::new()
            .name("streamed-audio".to_string())
            .spawn(move || playback_loop(rx, ready_tx, thread_sink, thread_generation))
            .map_err(|e| SpeechError::Stream(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                tx,
                sink,
                generation,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SpeechError::Unavailable),
        }
    }
}

impl StreamedAudioMechanism for StreamedAudio {
    fn play(&mut self, url: &str, done: Completion) {
        // Supersede whatever is in flight, then halt it audibly. The bump
        // and the slot take share the slot lock with the playback thread's
        // check-and-store, so an in-flight request is either stopped here or
        // sees the new generation and never starts.
        let generation = {
            let mut slot = self.sink.lock();
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(sink) = slot.take() {
                sink.stop();
            }
            generation
        };
        if let Err(mpsc::SendError(request)) = self.tx.send(Request {
            url: url.to_string(),
            generation,
            done,
        }) {
            log::warn!("Playback thread is gone, completing immediately");
            (request.done)();
        }
    }

    fn stop(&mut self) {
        let mut slot = self.sink.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);
        // Stopping the sink clears its queued source, which also resets the
        // playback position.
        if let Some(sink) = slot.take() {
            sink.stop();
        }
    }
}

fn playback_loop(
    rx: Receiver<Request>,
    ready: Sender<Result<(), SpeechError>>,
    sink_slot: SharedSink,
    generation: Arc<AtomicU64>,
) {
    let (_stream, handle) = match OutputStream::try_default() {
        Ok(pair) => {
            ready.send(Ok(())).ok();
            pair
        }
        Err(e) => {
            ready.send(Err(SpeechError::Stream(e.to_string()))).ok();
            return;
        }
    };

    while let Ok(request) = rx.recv() {
        if generation.load(Ordering::SeqCst) != request.generation {
            // Superseded while queued; its completion stays silent.
            continue;
        }
        if let Err(e) = fetch_and_play(
            &request.url,
            request.generation,
            &handle,
            &sink_slot,
            &generation,
        ) {
            log::warn!("Streamed audio failed: {e}");
        }
        if generation.load(Ordering::SeqCst) == request.generation {
            (request.done)();
        }
    }
}

/// Fetch the audio bytes, decode them, and block until playback ends or the
/// sink is stopped from another thread.
fn fetch_and_play(
    url: &str,
    request_generation: u64,
    handle: &OutputStreamHandle,
    sink_slot: &SharedSink,
    generation: &AtomicU64,
) -> Result<(), SpeechError> {
    let response = reqwest::blocking::get(url)
        .and_then(reqwest::blocking::Response::error_for_status)
        .map_err(|e| SpeechError::Stream(e.to_string()))?;
    let bytes = response
        .bytes()
        .map_err(|e| SpeechError::Stream(e.to_string()))?;

    let source = Decoder::new(Cursor::new(bytes.to_vec()))
        .map_err(|e| SpeechError::Stream(e.to_string()))?;
    let sink = Arc::new(
        Sink::try_new(handle).map_err(|e| SpeechError::Stream(e.to_string()))?,
    );

    // Check and store under one slot lock: a concurrent play or stop either
    // bumps the generation before this check (the request never starts) or
    // finds the stored sink and stops it. The fetch may have taken a while,
    // so a superseded request is the common case here.
    {
        let mut slot = sink_slot.lock();
        if generation.load(Ordering::SeqCst) != request_generation {
            return Ok(());
        }
        sink.append(source);
        *slot = Some(Arc::clone(&sink));
    }

    // Returns promptly when `stop` clears the sink from the caller's thread.
    sink.sleep_until_end();

    let mut slot = sink_slot.lock();
    if slot.as_ref().is_some_and(|s| Arc::ptr_eq(s, &sink)) {
        *slot = None;
    }
    Ok(())
}
