//! Immutable playback graph descriptions and their lock-free handoff
//!
//! The session side builds a [`GraphSpec`] off-thread, publishes it through
//! an [`arc_swap::ArcSwap`], and retires the previous description once the
//! audio thread has observably moved past the swap (epoch = blocks
//! rendered). The callback never frees a graph: it loads the current Arc at
//! the top of each block and drops only that temporary reference.
//!
//! Per-channel controls (volume, pan, mute, solo, chain enable, bypass) are
//! shared atomics living *outside* the description, so fader moves never
//! force a graph rebuild.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use portable_atomic::AtomicF32;

use crate::decode::DecodedAudio;
use crate::transport::SharedTransport;

/// Index into the audio-side processor pool
pub type SlotIndex = usize;

/// Maximum simultaneously installed processors
pub const MAX_SLOTS: usize = 256;

/// Drum lane voices understood by the built-in step synth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrumLane {
    Kick,
    Snare,
    Clap,
    HatClosed,
    HatOpen,
    Tom,
    Perc,
}

impl DrumLane {
    /// Map a pattern lane name to a voice
    pub fn from_lane(lane: &str) -> Self {
        let lower = lane.to_ascii_lowercase();
        if lower.contains("kick") || lower == "bd" {
            Self::Kick
        } else if lower.contains("snare") || lower == "sd" {
            Self::Snare
        } else if lower.contains("clap") {
            Self::Clap
        } else if lower == "oh" || lower.contains("open") {
            Self::HatOpen
        } else if lower == "hh" || lower == "ch" || lower.contains("hat") {
            Self::HatClosed
        } else if lower.contains("tom") {
            Self::Tom
        } else {
            Self::Perc
        }
    }

    /// MIDI-ish note number used when feeding an instrument plugin
    pub fn note(self) -> u8 {
        match self {
            Self::Kick => 36,
            Self::Snare => 38,
            Self::Clap => 39,
            Self::HatClosed => 42,
            Self::HatOpen => 46,
            Self::Tom => 45,
            Self::Perc => 48,
        }
    }
}

/// One scheduled step inside a pattern clip, offset relative to clip start
#[derive(Debug, Clone, Copy)]
pub struct StepEvent {
    /// Offset in beats from the clip start, swing already applied
    pub offset_beats: f64,
    pub lane: DrumLane,
    pub velocity: f32,
}

/// A pattern clip resolved to its step schedule
#[derive(Debug, Clone)]
pub struct PatternClipSpec {
    pub start_beats: f64,
    pub length_beats: f64,
    /// Steps of one pattern period, sorted by offset
    pub steps: Vec<StepEvent>,
    /// Period after which the step schedule repeats
    pub period_beats: f64,
}

/// An audio clip resolved to decoded samples
#[derive(Debug, Clone)]
pub struct AudioClipSpec {
    pub start_beats: f64,
    pub length_beats: f64,
    pub audio: Arc<DecodedAudio>,
}

/// Playable content on one track
#[derive(Debug, Clone)]
pub enum ClipSpec {
    Pattern(PatternClipSpec),
    Audio(AudioClipSpec),
}

impl ClipSpec {
    pub fn start_beats(&self) -> f64 {
        match self {
            Self::Pattern(p) => p.start_beats,
            Self::Audio(a) => a.start_beats,
        }
    }

    pub fn end_beats(&self) -> f64 {
        match self {
            Self::Pattern(p) => p.start_beats + p.length_beats,
            Self::Audio(a) => a.start_beats + a.length_beats,
        }
    }

    pub fn intersects(&self, from: f64, to: f64) -> bool {
        self.start_beats() < to && self.end_beats() > from
    }
}

/// Shared atomic controls for one mixer channel
///
/// Written by the session side on `track.set_*`, read by the callback.
#[derive(Debug)]
pub struct ChannelControls {
    pub volume: AtomicF32,
    pub pan: AtomicF32,
    pub mute: AtomicBool,
    pub solo: AtomicBool,
    pub chain_enabled: AtomicBool,
}

impl ChannelControls {
    pub fn new(volume: f32, pan: f32) -> Arc<Self> {
        Arc::new(Self {
            volume: AtomicF32::new(volume),
            pan: AtomicF32::new(pan),
            mute: AtomicBool::new(false),
            solo: AtomicBool::new(false),
            chain_enabled: AtomicBool::new(true),
        })
    }

    pub fn set_volume(&self, volume: f32) {
        self.volume.store(volume.clamp(0.0, 1.2), Ordering::Relaxed);
    }

    pub fn set_pan(&self, pan: f32) {
        self.pan.store(pan.clamp(-1.0, 1.0), Ordering::Relaxed);
    }
}

/// One chain slot: a processor in the pool plus its bypass flag
#[derive(Debug, Clone)]
pub struct ChainSlotSpec {
    pub slot: SlotIndex,
    pub bypassed: Arc<AtomicBool>,
    /// Instrument slots receive the pattern note events
    pub is_instrument: bool,
}

/// One track's playback description
#[derive(Debug, Clone)]
pub struct TrackSpec {
    pub track_id: u32,
    pub controls: Arc<ChannelControls>,
    pub clips: Vec<ClipSpec>,
    pub chain: Vec<ChainSlotSpec>,
    pub record_armed: bool,
}

/// Immutable per-block description of the whole playback graph
#[derive(Debug, Clone, Default)]
pub struct GraphSpec {
    pub tracks: Vec<TrackSpec>,
    /// Metronome accent pattern: beats per bar at the current signature
    pub beats_per_bar: f64,
    pub metronome_enabled: bool,
}

impl GraphSpec {
    pub fn empty() -> Self {
        Self {
            tracks: Vec::new(),
            beats_per_bar: 4.0,
            metronome_enabled: false,
        }
    }
}

/// Publisher/consumer pair for graph descriptions
///
/// `publish` swaps in a new description and queues the old one; `reclaim`
/// frees anything the audio thread can no longer be holding (it observed a
/// later epoch than the swap).
pub struct GraphHandoff {
    active: ArcSwap<GraphSpec>,
    shared: Arc<SharedTransport>,
    retired: Mutex<Vec<(u64, Arc<GraphSpec>)>>,
}

impl GraphHandoff {
    pub fn new(shared: Arc<SharedTransport>) -> Arc<Self> {
        Arc::new(Self {
            active: ArcSwap::from_pointee(GraphSpec::empty()),
            shared,
            retired: Mutex::new(Vec::new()),
        })
    }

    /// Called by the audio thread once per block
    pub fn load(&self) -> Arc<GraphSpec> {
        self.active.load_full()
    }

    /// Swap in a new description (non-audio threads only)
    pub fn publish(&self, spec: GraphSpec) {
        let epoch = self.shared.epoch();
        let old = self.active.swap(Arc::new(spec));
        self.retired.lock().unwrap().push((epoch, old));
        self.reclaim();
    }

    /// Drop retired descriptions the audio thread has moved past.
    ///
    /// The callback holds a graph reference only within a single block, so
    /// once two more blocks completed the old Arc has at most our count.
    pub fn reclaim(&self) {
        let epoch = self.shared.epoch();
        let mut retired = self.retired.lock().unwrap();
        retired.retain(|(swap_epoch, _)| epoch < swap_epoch + 2);
    }

    /// Retired descriptions still waiting on the audio thread
    pub fn pending_retired(&self) -> usize {
        self.retired.lock().unwrap().len()
    }
}

/// Build the step schedule of one pattern period.
///
/// Steps land on the 1/16 grid; swing delays every odd step by
/// `swing * step_length`. Returns (events, period_beats).
pub fn schedule_pattern_steps(
    length_steps: u32,
    swing: f64,
    steps: impl IntoIterator<Item = (String, u32, f64)>,
) -> (Vec<StepEvent>, f64) {
    const STEP_BEATS: f64 = 0.25; // 1/16 on the default grid

    let mut events: Vec<StepEvent> = steps
        .into_iter()
        .filter(|(_, index, velocity)| *index < length_steps && *velocity > 0.0)
        .map(|(lane, index, velocity)| {
            let swing_delay = if index % 2 == 1 {
                swing * STEP_BEATS
            } else {
                0.0
            };
            StepEvent {
                offset_beats: f64::from(index) * STEP_BEATS + swing_delay,
                lane: DrumLane::from_lane(&lane),
                velocity: velocity.clamp(0.0, 1.0) as f32,
            }
        })
        .collect();

    events.sort_by(|a, b| a.offset_beats.partial_cmp(&b.offset_beats).unwrap());
    (events, f64::from(length_steps) * STEP_BEATS)
}
