//! Realtime audio core for TheStuu
//!
//! Owns the device callback, the transport clock, the playback graph, and
//! the metering/spectrum taps. The callback is allocation-free and
//! lock-free: graph descriptions arrive through an atomic swap, commands
//! and retired allocations through SPSC rings.

pub mod buffers;
pub mod commands;
pub mod decode;
pub mod device;
pub mod engine;
pub mod graph;
pub mod meters;
pub mod metronome;
pub mod processor;
pub mod recording;
pub mod render;
pub mod spectrum;
pub mod step_synth;
pub mod transport;

pub use buffers::{AudioBlock, Smoothed};
pub use commands::{CommandSender, EngineCommand, Trash};
pub use decode::{decode_audio, decode_file, decode_wav, DecodedAudio};
pub use device::{DeviceError, OutputConfig, RunningOutput};
pub use engine::{AudioEngine, EngineConfig};
pub use graph::{
    schedule_pattern_steps, AudioClipSpec, ChainSlotSpec, ChannelControls, ClipSpec, DrumLane,
    GraphHandoff, GraphSpec, PatternClipSpec, SlotIndex, StepEvent, TrackSpec, MAX_SLOTS,
};
pub use meters::{MeterFrame, MeterLane, MeterReceiver, MAX_METER_TRACKS};
pub use processor::{NoteEvent, Processor};
pub use recording::{RecordedTake, RecordingManager, RecordTap};
pub use render::Renderer;
pub use spectrum::{SpectrumAnalyzer, SpectrumTap, BANDS, WINDOW};
pub use step_synth::StepSynth;
pub use transport::{SharedTransport, TransportClock, TransportState};
