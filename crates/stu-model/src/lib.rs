//! Project document model for TheStuu
//!
//! The authoritative in-memory representation of a project: playlist tracks
//! with clips, reusable patterns, the mixer, and plugin nodes, plus the
//! `.stu` persistence layer. The session orchestrator is the only writer;
//! everything else reads cloned snapshots.

pub mod document;
pub mod normalize;
pub mod store;
pub mod time;
pub mod validate;

pub use document::{
    generate_id, limits, AudioSource, Clip, ClipContent, MidiSource, MixerChannel, NodeInstance,
    NodeType, ParameterSpec, Pattern, PatternType, Project, Step, Track,
};
pub use normalize::{normalize, upgrade_document, UpgradeReport};
pub use store::{load_project, save_project, LoadedProject, ProjectStore, StoreError};
pub use time::{Bars, Beats, Tempo, TimeSignature, STEPS_PER_BEAT};
pub use validate::{validate, Validation, ValidationIssue};
