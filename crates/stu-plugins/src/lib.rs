//! Plugin host for TheStuu
//!
//! Discovery, lifetime, and parameter model for built-in and external
//! plugins. Everything that touches a plugin object runs on one dedicated
//! host thread; the realtime halves ([`stu_audio::Processor`] boxes) are
//! handed to the audio engine for installation into its slot pool.

pub mod api;
pub mod builtin;
pub mod editor;
pub mod error;
pub mod host;
pub mod scan;

pub use api::{ParameterInfo, PluginDescriptor, PluginKind};
pub use builtin::{CHORUS_UID, EQ_UID, REVERB_UID, ULTRASOUND_UID};
pub use editor::{EditorSlider, EditorView};
pub use error::PluginHostError;
pub use host::{Instantiated, PluginHost, DISPATCH_TIMEOUT};
pub use scan::{default_external_dirs, scan_external, PluginRegistry};
