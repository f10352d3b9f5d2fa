//! Network streaming player
//!
//! `StreamingPlayer` is the production `MediaPlayer`. Each `load` starts a
//! loader thread that fetches the stream URL with a blocking reqwest client
//! and decodes it into a bounded ring buffer the audio callback drains:
//!
//! - Responses with a Content-Length are spilled to a temporary file by a
//!   download thread while the loader decodes from that file. The decoder
//!   can run ahead of the download only by waiting for it, seeks go through
//!   the container's own index, and memory stays bounded by the ring.
//! - Responses without a length are treated as live. They are decoded as
//!   they arrive, report a duration of 0 and ignore seeks.
//!
//! The cpal stream lives on its own thread for the lifetime of the player
//! and renders silence while nothing is playing.

use crate::audio::decoder::{StreamDecoder, OUTPUT_CHANNELS};
use crate::audio::output::AudioOutput;
use crate::audio::resampler::StreamResampler;
use crate::audio::spill::Spill;
use crate::error::{Error, Result};
use crate::playback::player::{MediaPlayer, PlayerSignal, SignalSender};
use navicar_common::PlayableTrack;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Seconds of decoded audio a live ring holds
const LIVE_BUFFER_SECS: usize = 4;

/// Seconds decoded ahead of the cursor for downloaded tracks
const DECODE_AHEAD_SECS: usize = 10;

/// Back-off while the ring is full or the decoder has nothing to do
const LOADER_BACKOFF: Duration = Duration::from_millis(20);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// `seek_to` value when no seek is pending
const NO_SEEK: u64 = u64::MAX;

/// The loaded track as seen by the audio callback
struct Deck {
    generation: u64,
    ring: HeapCons<f32>,
    /// Set when the loader has pushed the last sample
    finished: Arc<AtomicBool>,
    seekable: bool,
    ended: bool,
}

struct Shared {
    deck: Mutex<Option<Deck>>,
    /// Download backing the current deck, if any
    spill: Mutex<Option<Arc<Spill>>>,
    playing: AtomicBool,
    /// Track position of the next frame the callback renders
    frames_played: AtomicU64,
    /// Live decks: frames decoded so far
    frames_buffered: AtomicU64,
    /// Downloaded decks: track length
    total_frames: AtomicU64,
    /// Pending seek target in ms, or `NO_SEEK`
    seek_to: AtomicU64,
    sample_rate: AtomicU32,
}

impl Shared {
    fn new(sample_rate: u32) -> Self {
        Self {
            deck: Mutex::new(None),
            spill: Mutex::new(None),
            playing: AtomicBool::new(false),
            frames_played: AtomicU64::new(0),
            frames_buffered: AtomicU64::new(0),
            total_frames: AtomicU64::new(0),
            seek_to: AtomicU64::new(NO_SEEK),
            sample_rate: AtomicU32::new(sample_rate),
        }
    }

    fn deck(&self) -> MutexGuard<'_, Option<Deck>> {
        self.deck.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn spill(&self) -> MutexGuard<'_, Option<Arc<Spill>>> {
        self.spill.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn frames_to_ms(&self, frames: u64) -> u64 {
        frames * 1000 / u64::from(self.sample_rate.load(Ordering::Relaxed).max(1))
    }

    fn ms_to_frames(&self, ms: u64) -> u64 {
        ms * u64::from(self.sample_rate.load(Ordering::Relaxed)) / 1000
    }

    fn position_ms(&self) -> u64 {
        self.frames_to_ms(self.frames_played.load(Ordering::Acquire))
    }

    /// Downloaded decks: the share of the track already on disk
    fn buffered_ms(&self) -> u64 {
        if let Some(spill) = self.spill().as_ref() {
            let total_ms = self.frames_to_ms(self.total_frames.load(Ordering::Acquire));
            let ratio = u128::from(spill.downloaded()) * u128::from(total_ms)
                / u128::from(spill.length().max(1));
            return u64::try_from(ratio).unwrap_or(u64::MAX).min(total_ms);
        }
        self.frames_to_ms(self.frames_buffered.load(Ordering::Acquire))
    }

    fn is_seekable(&self) -> bool {
        self.deck().as_ref().is_some_and(|d| d.seekable)
    }

    /// Ask the loader to reposition; the cursor moves right away
    fn request_seek(&self, position_ms: u64) {
        let total = self.total_frames.load(Ordering::Acquire);
        let target = self.ms_to_frames(position_ms).min(total);
        self.frames_played.store(target, Ordering::Release);
        self.seek_to
            .store(self.frames_to_ms(target), Ordering::Release);
    }

    fn seek_pending(&self) -> bool {
        self.seek_to.load(Ordering::Acquire) != NO_SEEK
    }

    /// Audio callback body
    fn render(&self, out: &mut [f32], signals: &SignalSender) {
        out.fill(0.0);
        if !self.playing.load(Ordering::Acquire) {
            return;
        }

        let mut guard = match self.deck.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            // Loader is swapping decks or seeking; one buffer of silence
            Err(TryLockError::WouldBlock) => return,
        };
        let Some(deck) = guard.as_mut() else {
            return;
        };
        if deck.ended {
            return;
        }

        let whole = deck.ring.occupied_len().min(out.len()) / OUTPUT_CHANNELS * OUTPUT_CHANNELS;
        let count = deck.ring.pop_slice(&mut out[..whole]);
        self.frames_played
            .fetch_add((count / OUTPUT_CHANNELS) as u64, Ordering::AcqRel);

        if count == 0 && deck.finished.load(Ordering::Acquire) {
            deck.ended = true;
            self.playing.store(false, Ordering::Release);
            let _ = signals.send(PlayerSignal::Ended {
                generation: deck.generation,
            });
        }
    }
}

/// `MediaPlayer` streaming over HTTP to the default audio device
pub struct StreamingPlayer {
    shared: Arc<Shared>,
    signals: SignalSender,
    /// Cancel flag of the current loader
    loader_cancel: Option<Arc<AtomicBool>>,
    /// Dropping this stops the output thread
    output_shutdown: Option<std_mpsc::Sender<()>>,
}

impl StreamingPlayer {
    /// Open the audio device and start the (silent) output stream
    pub fn new(signals: SignalSender, device_name: Option<String>) -> Result<Self> {
        let shared = Arc::new(Shared::new(0));

        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<u32>>();
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();
        let callback_shared = Arc::clone(&shared);
        let callback_signals = signals.clone();

        thread::Builder::new()
            .name("navicar-output".to_string())
            .spawn(move || {
                let opened = AudioOutput::new(device_name.as_deref()).and_then(|mut output| {
                    output.start(move |out| callback_shared.render(out, &callback_signals))?;
                    Ok(output)
                });
                let output = match opened {
                    Ok(output) => {
                        let _ = ready_tx.send(Ok(output.sample_rate()));
                        output
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Blocks until the player is released or dropped
                let _ = shutdown_rx.recv();
                if output.has_error() {
                    warn!("Audio output reported errors during playback");
                }
                drop(output);
                debug!("Output thread exiting");
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn output thread: {}", e)))?;

        let sample_rate = ready_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Output thread exited during startup".to_string()))??;
        shared.sample_rate.store(sample_rate, Ordering::Relaxed);
        info!("Streaming player ready at {} Hz", sample_rate);

        Ok(Self {
            shared,
            signals,
            loader_cancel: None,
            output_shutdown: Some(shutdown_tx),
        })
    }

    /// Stop rendering, cancel the loader and drop the deck
    fn unload(&mut self) {
        self.shared.playing.store(false, Ordering::Release);
        if let Some(cancel) = self.loader_cancel.take() {
            cancel.store(true, Ordering::Release);
        }
        *self.shared.deck() = None;
        *self.shared.spill() = None;
        self.shared.frames_played.store(0, Ordering::Release);
        self.shared.frames_buffered.store(0, Ordering::Release);
        self.shared.total_frames.store(0, Ordering::Release);
        self.shared.seek_to.store(NO_SEEK, Ordering::Release);
    }
}

impl MediaPlayer for StreamingPlayer {
    fn load(&mut self, track: &PlayableTrack, generation: u64) {
        self.unload();

        let cancel = Arc::new(AtomicBool::new(false));
        self.loader_cancel = Some(Arc::clone(&cancel));

        let loader = Loader {
            url: track.stream_uri.clone(),
            generation,
            duration_hint_ms: track.duration_ms,
            cancel,
            shared: Arc::clone(&self.shared),
            signals: self.signals.clone(),
        };

        let spawned = thread::Builder::new()
            .name(format!("navicar-loader-{}", generation))
            .spawn(move || loader.run());
        if let Err(e) = spawned {
            error!("Failed to spawn loader thread: {}", e);
            let _ = self.signals.send(PlayerSignal::Failed {
                generation,
                message: format!("Failed to start loader: {}", e),
            });
        }
    }

    fn play(&mut self) {
        self.shared.playing.store(true, Ordering::Release);
    }

    fn pause(&mut self) {
        self.shared.playing.store(false, Ordering::Release);
    }

    fn stop(&mut self) {
        self.unload();
    }

    fn seek(&mut self, position_ms: u64) {
        if !self.shared.is_seekable() {
            warn!("Ignoring seek on a live stream");
            return;
        }
        self.shared.request_seek(position_ms);
    }

    fn position_ms(&self) -> u64 {
        self.shared.position_ms()
    }

    fn buffered_ms(&self) -> u64 {
        self.shared.buffered_ms()
    }

    fn release(&mut self) {
        self.unload();
        // Output thread drops the cpal stream once the channel closes
        self.output_shutdown.take();
    }
}

impl Drop for StreamingPlayer {
    fn drop(&mut self) {
        self.release();
    }
}

/// One fetch-and-decode job
struct Loader {
    url: String,
    generation: u64,
    /// Catalog length, used when the container does not declare one
    duration_hint_ms: u64,
    cancel: Arc<AtomicBool>,
    shared: Arc<Shared>,
    signals: SignalSender,
}

impl Loader {
    fn run(self) {
        if let Err(e) = self.fetch_and_decode() {
            if self.cancelled() {
                return;
            }
            warn!(generation = self.generation, "Stream failed: {}", e);
            let _ = self.signals.send(PlayerSignal::Failed {
                generation: self.generation,
                message: e.to_string(),
            });
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    fn fetch_and_decode(&self) -> Result<()> {
        // No overall timeout: live bodies never finish
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| Error::Http(format!("Failed to build HTTP client: {}", e)))?;

        debug!(generation = self.generation, "Fetching {}", self.url);
        let response = client
            .get(&self.url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Http(format!("Failed to fetch stream: {}", e)))?;

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

        match response.content_length() {
            Some(length) => {
                debug!(generation = self.generation, "Spilling {} bytes", length);
                let spill = Spill::new(length, Arc::clone(&self.cancel))?;
                self.spawn_download(Arc::clone(&spill), response)?;
                let decoder = StreamDecoder::from_source(Box::new(spill.reader()?), mime.as_deref())?;
                self.play_downloaded(decoder, spill)
            }
            None => {
                let decoder = StreamDecoder::from_reader(response, mime.as_deref())?;
                self.play_live(decoder)
            }
        }
    }

    fn spawn_download(&self, spill: Arc<Spill>, body: reqwest::blocking::Response) -> Result<()> {
        let generation = self.generation;
        thread::Builder::new()
            .name(format!("navicar-download-{}", generation))
            .spawn(move || match spill.fill(body) {
                Ok(()) => debug!(generation, "Download complete"),
                Err(e) => warn!(generation, "Download failed: {}", e),
            })
            .map(|_| ())
            .map_err(|e| Error::Playback(format!("Failed to start download: {}", e)))
    }

    fn play_downloaded(&self, decoder: StreamDecoder, spill: Arc<Spill>) -> Result<()> {
        let duration_ms = decoder
            .duration_ms()
            .filter(|ms| *ms > 0)
            .unwrap_or(self.duration_hint_ms);
        let seekable = duration_ms > 0;

        let (producer, finished) = match self.install(DECODE_AHEAD_SECS, seekable) {
            Some(parts) => parts,
            None => return Ok(()),
        };
        self.shared
            .total_frames
            .store(self.shared.ms_to_frames(duration_ms), Ordering::Release);
        *self.shared.spill() = Some(spill);

        info!(generation = self.generation, "Track ready ({} ms)", duration_ms);
        let _ = self.signals.send(PlayerSignal::Ready {
            generation: self.generation,
            duration_ms,
        });

        self.pump(decoder, producer, &finished, seekable)
    }

    fn play_live(&self, decoder: StreamDecoder) -> Result<()> {
        let (producer, finished) = match self.install(LIVE_BUFFER_SECS, false) {
            Some(parts) => parts,
            None => return Ok(()),
        };

        info!(generation = self.generation, "Live stream opened");
        let _ = self.signals.send(PlayerSignal::Ready {
            generation: self.generation,
            duration_ms: 0,
        });

        self.pump(decoder, producer, &finished, false)
    }

    /// Decode into the ring until cancelled
    ///
    /// Seekable decks keep the loader alive after the last sample so a seek
    /// back can restart decoding; live decks return at end of stream.
    fn pump(
        &self,
        mut decoder: StreamDecoder,
        mut producer: HeapProd<f32>,
        finished: &AtomicBool,
        seekable: bool,
    ) -> Result<()> {
        let device_rate = self.shared.sample_rate.load(Ordering::Relaxed);
        let mut resampler = StreamResampler::new(decoder.sample_rate(), device_rate)?;

        loop {
            if self.cancelled() {
                return Ok(());
            }

            let target = self.shared.seek_to.swap(NO_SEEK, Ordering::AcqRel);
            if target != NO_SEEK {
                match decoder.seek(target) {
                    Ok(reached) => {
                        resampler = StreamResampler::new(decoder.sample_rate(), device_rate)?;
                        self.restart_at(reached, finished, false);
                    }
                    Err(e) => {
                        warn!(generation = self.generation, "Seek failed, ending track: {}", e);
                        self.restart_at(target, finished, true);
                    }
                }
                continue;
            }

            if finished.load(Ordering::Acquire) {
                if !seekable {
                    return Ok(());
                }
                thread::sleep(LOADER_BACKOFF);
                continue;
            }

            match decoder.next_chunk()? {
                Some(chunk) => {
                    let samples = resampler.push(&chunk)?;
                    self.push(&mut producer, &samples);
                }
                None => {
                    let tail = resampler.flush()?;
                    self.push(&mut producer, &tail);
                    if !self.shared.seek_pending() {
                        info!(generation = self.generation, "Stream decoded to the end");
                        finished.store(true, Ordering::Release);
                    }
                }
            }
        }
    }

    /// Drop queued audio and move the cursor after a seek
    fn restart_at(&self, position_ms: u64, finished: &AtomicBool, at_end: bool) {
        let mut deck = self.shared.deck();
        if self.cancelled() {
            return;
        }
        if let Some(deck) = deck.as_mut() {
            deck.ring.clear();
            deck.ended = false;
        }
        finished.store(at_end, Ordering::Release);
        self.shared
            .frames_played
            .store(self.shared.ms_to_frames(position_ms), Ordering::Release);
    }

    /// Blocking push into the ring; gives up on cancel or a pending seek
    fn push(&self, producer: &mut HeapProd<f32>, samples: &[f32]) {
        let mut offset = 0;
        while offset < samples.len() {
            if self.cancelled() || self.shared.seek_pending() {
                return;
            }
            let pushed = producer.push_slice(&samples[offset..]);
            offset += pushed;
            if pushed == 0 {
                thread::sleep(LOADER_BACKOFF);
            }
        }
        let played = self.shared.frames_played.load(Ordering::Acquire);
        let queued = (producer.occupied_len() / OUTPUT_CHANNELS) as u64;
        self.shared
            .frames_buffered
            .store(played + queued, Ordering::Release);
    }

    /// Hand a fresh ring to the audio callback unless superseded
    fn install(&self, seconds: usize, seekable: bool) -> Option<(HeapProd<f32>, Arc<AtomicBool>)> {
        let rate = self.shared.sample_rate.load(Ordering::Relaxed).max(1) as usize;
        let (producer, consumer): (HeapProd<f32>, HeapCons<f32>) =
            HeapRb::<f32>::new(rate * OUTPUT_CHANNELS * seconds).split();
        let finished = Arc::new(AtomicBool::new(false));

        let mut deck = self.shared.deck();
        if self.cancelled() {
            return None;
        }
        *deck = Some(Deck {
            generation: self.generation,
            ring: consumer,
            finished: Arc::clone(&finished),
            seekable,
            ended: false,
        });
        self.shared.frames_played.store(0, Ordering::Release);
        self.shared.frames_buffered.store(0, Ordering::Release);
        Some((producer, finished))
    }
}
