//! Transport state machine and sample-accurate clock
//!
//! Position is kept in beats as f64 and advanced once per audio block by
//! `frames / sample_rate * bpm / 60`. The playing/position values the rest
//! of the engine observes are published through atomics after each block,
//! so nothing outside the callback ever touches the clock itself.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Playback state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
    Recording,
}

impl TransportState {
    pub fn is_rolling(self) -> bool {
        matches!(self, Self::Playing | Self::Recording)
    }
}

/// Clock owned by the audio callback
#[derive(Debug)]
pub struct TransportClock {
    sample_rate: f64,
    bpm: f64,
    state: TransportState,
    position_beats: f64,
    shared: Arc<SharedTransport>,
}

impl TransportClock {
    pub fn new(sample_rate: u32, bpm: u32, shared: Arc<SharedTransport>) -> Self {
        let clock = Self {
            sample_rate: f64::from(sample_rate),
            bpm: f64::from(bpm),
            state: TransportState::Stopped,
            position_beats: 0.0,
            shared,
        };
        clock.publish();
        clock
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn position_beats(&self) -> f64 {
        self.position_beats
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn set_bpm(&mut self, bpm: u32) {
        self.bpm = f64::from(bpm);
        self.publish();
    }

    /// Play retains position from Stopped or Paused; idempotent while rolling
    pub fn play(&mut self, recording: bool) {
        self.state = if recording {
            TransportState::Recording
        } else {
            TransportState::Playing
        };
        self.publish();
    }

    pub fn pause(&mut self) {
        if self.state.is_rolling() {
            self.state = TransportState::Paused;
            self.publish();
        }
    }

    /// Stop resets position to zero from any state
    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
        self.position_beats = 0.0;
        self.publish();
    }

    /// Seek clamps to >= 0, keeps the current state
    pub fn seek_beats(&mut self, beats: f64) {
        self.position_beats = beats.max(0.0);
        self.publish();
    }

    /// Beat span of a block at the current tempo
    pub fn block_beats(&self, frames: usize) -> f64 {
        frames as f64 / self.sample_rate * self.bpm / 60.0
    }

    /// Advance past a rendered block. Returns (block_start, block_end) in beats.
    pub fn advance(&mut self, frames: usize) -> (f64, f64) {
        let start = self.position_beats;
        if self.state.is_rolling() {
            self.position_beats = start + self.block_beats(frames);
        }
        self.publish();
        (start, self.position_beats)
    }

    fn publish(&self) {
        self.shared
            .position_beats
            .store(self.position_beats.to_bits(), Ordering::Release);
        self.shared
            .playing
            .store(self.state.is_rolling(), Ordering::Release);
        self.shared.recording.store(
            self.state == TransportState::Recording,
            Ordering::Release,
        );
        self.shared
            .bpm_bits
            .store(self.bpm.to_bits(), Ordering::Release);
    }
}

/// Lock-free view of the transport for non-audio threads
#[derive(Debug, Default)]
pub struct SharedTransport {
    position_beats: AtomicU64,
    bpm_bits: AtomicU64,
    playing: AtomicBool,
    recording: AtomicBool,
    /// Blocks rendered since engine start; the graph reclaimer's epoch
    pub blocks_rendered: AtomicU64,
}

impl SharedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            position_beats: AtomicU64::new(0.0f64.to_bits()),
            bpm_bits: AtomicU64::new(120.0f64.to_bits()),
            playing: AtomicBool::new(false),
            recording: AtomicBool::new(false),
            blocks_rendered: AtomicU64::new(0),
        })
    }

    pub fn position_beats(&self) -> f64 {
        f64::from_bits(self.position_beats.load(Ordering::Acquire))
    }

    pub fn bpm(&self) -> f64 {
        f64::from_bits(self.bpm_bits.load(Ordering::Acquire))
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    pub fn epoch(&self) -> u64 {
        self.blocks_rendered.load(Ordering::Acquire)
    }
}
