//! Wire protocol for the TheStuu control channel
//!
//! Typed request/event/ack shapes shared by the gateway and the session
//! orchestrator. JSON conversion happens at the socket edge; internal
//! layers pass these types around directly.

pub mod error;
pub mod event;
pub mod frame;
pub mod media;
pub mod request;

pub use error::{ErrorCode, WireError};
pub use event::{Ack, ServerEvent, TrackMeter, TransportEvent};
pub use frame::ClientFrame;
pub use media::{is_supported_extension, UploadResponse, AUDIO_EXTENSIONS, MIDI_EXTENSIONS};
pub use request::{default_grid_step, ClientRequest};
