//! Client request catalog
//!
//! One enum for every mutation a client may send on the control channel.
//! The wire form is adjacently tagged: the frame's `event` field selects
//! the variant, `payload` holds the parameters. Event names are part of
//! the protocol contract.

use serde::{Deserialize, Serialize};

/// Effective snap step in bars, derived client-side from snap mode and zoom.
///
/// Clip placement operations carry this so the engine snaps to exactly the
/// grid the client displayed.
pub fn default_grid_step() -> f64 {
    0.0625 // one 1/16 step of a 4/4 bar
}

/// All mutation requests, tagged by wire event name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum ClientRequest {
    // === Transport ===
    #[serde(rename = "transport.play")]
    TransportPlay {},
    #[serde(rename = "transport.pause")]
    TransportPause {},
    #[serde(rename = "transport.stop")]
    TransportStop {},
    #[serde(rename = "transport.seek")]
    TransportSeek { position_bars: f64 },
    #[serde(rename = "transport.set_bpm")]
    TransportSetBpm { bpm: i64 },

    // === Tracks ===
    #[serde(rename = "track.create")]
    TrackCreate {
        #[serde(default)]
        name: Option<String>,
    },
    #[serde(rename = "track.insert")]
    TrackInsert {
        index: u32,
        #[serde(default)]
        name: Option<String>,
    },
    #[serde(rename = "track.duplicate")]
    TrackDuplicate { track_id: u32 },
    #[serde(rename = "track.delete")]
    TrackDelete { track_id: u32 },
    #[serde(rename = "track.bulk_delete")]
    TrackBulkDelete { track_ids: Vec<u32> },
    #[serde(rename = "track.reorder")]
    TrackReorder { track_id: u32, to_index: u32 },
    #[serde(rename = "track.rename")]
    TrackRename { track_id: u32, name: String },
    #[serde(rename = "track.set_chain_enabled")]
    TrackSetChainEnabled { track_id: u32, enabled: bool },

    // === Mixer ===
    #[serde(rename = "track.set_volume")]
    TrackSetVolume { track_id: u32, volume: f64 },
    #[serde(rename = "track.set_pan")]
    TrackSetPan { track_id: u32, pan: f64 },
    #[serde(rename = "track.set_mute")]
    TrackSetMute { track_id: u32, mute: bool },
    #[serde(rename = "track.set_solo")]
    TrackSetSolo { track_id: u32, solo: bool },
    #[serde(rename = "track.set_record_arm")]
    TrackSetRecordArm { track_id: u32, armed: bool },

    // === Clips ===
    #[serde(rename = "clip.create")]
    ClipCreate {
        track_id: u32,
        pattern_id: String,
        start: f64,
        length: f64,
        #[serde(default = "default_grid_step")]
        grid_step: f64,
    },
    #[serde(rename = "clip.move")]
    ClipMove {
        clip_id: String,
        start: f64,
        /// Target track when dragging across lanes
        #[serde(default)]
        track_id: Option<u32>,
        #[serde(default = "default_grid_step")]
        grid_step: f64,
    },
    #[serde(rename = "clip.resize")]
    ClipResize {
        clip_id: String,
        length: f64,
        #[serde(default = "default_grid_step")]
        grid_step: f64,
    },
    #[serde(rename = "clip.delete")]
    ClipDelete { clip_id: String },
    #[serde(rename = "clip.import_file")]
    ClipImportFile {
        track_id: u32,
        /// Path previously returned by media.upload
        path: String,
        start: f64,
        #[serde(default = "default_grid_step")]
        grid_step: f64,
    },

    // === Patterns ===
    #[serde(rename = "pattern.create")]
    PatternCreate {
        #[serde(default)]
        id: Option<String>,
        length: u32,
        #[serde(default)]
        swing: f64,
    },
    #[serde(rename = "pattern.update")]
    PatternUpdate {
        pattern_id: String,
        #[serde(default)]
        length: Option<u32>,
        #[serde(default)]
        swing: Option<f64>,
    },
    #[serde(rename = "pattern.update_step")]
    PatternUpdateStep {
        pattern_id: String,
        lane: String,
        index: u32,
        /// Velocity 0 removes the step
        velocity: f64,
    },

    // === Plugins ===
    #[serde(rename = "vst.scan")]
    VstScan {},
    #[serde(rename = "vst.add")]
    VstAdd {
        track_id: u32,
        plugin_uid: String,
        #[serde(default)]
        insert_index: Option<u32>,
    },
    #[serde(rename = "vst.remove")]
    VstRemove { node_id: String },
    #[serde(rename = "vst.reorder")]
    VstReorder { track_id: u32, from: u32, to: u32 },
    #[serde(rename = "vst.param_set")]
    VstParamSet {
        node_id: String,
        param_id: String,
        value: f64,
    },
    #[serde(rename = "vst.bypass_set")]
    VstBypassSet { node_id: String, bypassed: bool },
    #[serde(rename = "vst.open_editor")]
    VstOpenEditor { node_id: String },

    // === Project ===
    #[serde(rename = "project.save")]
    ProjectSave {},
    #[serde(rename = "project.update_view")]
    ProjectUpdateView {
        #[serde(default)]
        view_bars: Option<u32>,
        #[serde(default)]
        bar_width: Option<f64>,
        #[serde(default)]
        show_track_nodes: Option<bool>,
        #[serde(default)]
        metronome_enabled: Option<bool>,
    },
}

impl ClientRequest {
    /// The wire event name of this request
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::TransportPlay {} => "transport.play",
            Self::TransportPause {} => "transport.pause",
            Self::TransportStop {} => "transport.stop",
            Self::TransportSeek { .. } => "transport.seek",
            Self::TransportSetBpm { .. } => "transport.set_bpm",
            Self::TrackCreate { .. } => "track.create",
            Self::TrackInsert { .. } => "track.insert",
            Self::TrackDuplicate { .. } => "track.duplicate",
            Self::TrackDelete { .. } => "track.delete",
            Self::TrackBulkDelete { .. } => "track.bulk_delete",
            Self::TrackReorder { .. } => "track.reorder",
            Self::TrackRename { .. } => "track.rename",
            Self::TrackSetChainEnabled { .. } => "track.set_chain_enabled",
            Self::TrackSetVolume { .. } => "track.set_volume",
            Self::TrackSetPan { .. } => "track.set_pan",
            Self::TrackSetMute { .. } => "track.set_mute",
            Self::TrackSetSolo { .. } => "track.set_solo",
            Self::TrackSetRecordArm { .. } => "track.set_record_arm",
            Self::ClipCreate { .. } => "clip.create",
            Self::ClipMove { .. } => "clip.move",
            Self::ClipResize { .. } => "clip.resize",
            Self::ClipDelete { .. } => "clip.delete",
            Self::ClipImportFile { .. } => "clip.import_file",
            Self::PatternCreate { .. } => "pattern.create",
            Self::PatternUpdate { .. } => "pattern.update",
            Self::PatternUpdateStep { .. } => "pattern.update_step",
            Self::VstScan {} => "vst.scan",
            Self::VstAdd { .. } => "vst.add",
            Self::VstRemove { .. } => "vst.remove",
            Self::VstReorder { .. } => "vst.reorder",
            Self::VstParamSet { .. } => "vst.param_set",
            Self::VstBypassSet { .. } => "vst.bypass_set",
            Self::VstOpenEditor { .. } => "vst.open_editor",
            Self::ProjectSave {} => "project.save",
            Self::ProjectUpdateView { .. } => "project.update_view",
        }
    }
}
