//! Session orchestrator for TheStuu
//!
//! Mediates between clients and the realtime layer: the single writer of
//! the project document, the mutation FIFO, side-effect fan-out to the
//! audio engine and plugin host, snapshot broadcasting, media analysis,
//! and debounced persistence.

pub mod graph_build;
pub mod media;
pub mod mutations;
pub mod orchestrator;
pub mod pump;

pub use graph_build::{build_graph, GraphBindings};
pub use media::{analyze_file, midi_duration_seconds, MediaAnalysis, MediaStore, WAVEFORM_BUCKETS};
pub use orchestrator::{spawn, SessionCommand, SessionHandle, TempoInfo, VIEW_SAVE_DEBOUNCE};
pub use pump::{transport_event, METER_INTERVAL, TRANSPORT_INTERVAL};
