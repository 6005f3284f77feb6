//! The Project document and its entities
//!
//! The Project is the root of everything a `.stu` file stores: the playlist
//! of tracks with their clips, reusable patterns, the mixer, and plugin
//! nodes. Only the session orchestrator mutates a Project; every other
//! component works from cloned snapshots.
//!
//! Clips are a tagged variant (`type`: pattern | audio | midi) with shared
//! placement fields. Pattern clips back-reference a Pattern by id only;
//! resolution happens at the query boundary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::time::TimeSignature;

/// Hard limits on document fields
pub mod limits {
    pub const BPM_MIN: u32 = 20;
    pub const BPM_MAX: u32 = 300;
    pub const VIEW_BARS_MIN: u32 = 8;
    pub const VIEW_BARS_MAX: u32 = 4096;
    pub const TRACK_NAME_MAX: usize = 25;
    pub const VOLUME_MAX: f64 = 1.2;
    pub const VOLUME_DEFAULT: f64 = 0.85;
    pub const SWING_MAX: f64 = 0.75;
    pub const PATTERN_LENGTHS: [u32; 4] = [8, 16, 32, 64];
}

/// Root document for one project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub title: String,
    pub bpm: u32,
    #[serde(default)]
    pub metronome_enabled: bool,
    #[serde(default)]
    pub time_signature: TimeSignature,
    #[serde(default = "default_view_bars")]
    pub playlist_view_bars: u32,
    #[serde(default = "default_bar_width")]
    pub playlist_bar_width: f64,
    #[serde(default)]
    pub playlist_show_track_nodes: bool,
    #[serde(default)]
    pub playlist: Vec<Track>,
    #[serde(default)]
    pub patterns: Vec<Pattern>,
    #[serde(default)]
    pub mixer: Vec<MixerChannel>,
    #[serde(default)]
    pub nodes: Vec<NodeInstance>,
}

fn default_view_bars() -> u32 {
    64
}

fn default_bar_width() -> f64 {
    96.0
}

impl Project {
    /// A fresh project: four empty tracks, matching mixer channels.
    pub fn new(title: impl Into<String>) -> Self {
        let playlist: Vec<Track> = (1..=4)
            .map(|n| Track::new(n, format!("Track {}", n)))
            .collect();
        let mixer = playlist.iter().map(|t| MixerChannel::new(t.track_id)).collect();

        Self {
            title: title.into(),
            bpm: 120,
            metronome_enabled: false,
            time_signature: TimeSignature::default(),
            playlist_view_bars: default_view_bars(),
            playlist_bar_width: default_bar_width(),
            playlist_show_track_nodes: true,
            playlist,
            patterns: Vec::new(),
            mixer,
            nodes: Vec::new(),
        }
    }

    pub fn track(&self, track_id: u32) -> Option<&Track> {
        self.playlist.iter().find(|t| t.track_id == track_id)
    }

    pub fn track_mut(&mut self, track_id: u32) -> Option<&mut Track> {
        self.playlist.iter_mut().find(|t| t.track_id == track_id)
    }

    pub fn pattern(&self, id: &str) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.id == id)
    }

    pub fn pattern_mut(&mut self, id: &str) -> Option<&mut Pattern> {
        self.patterns.iter_mut().find(|p| p.id == id)
    }

    pub fn channel(&self, track_id: u32) -> Option<&MixerChannel> {
        self.mixer.iter().find(|c| c.track_id == track_id)
    }

    pub fn channel_mut(&mut self, track_id: u32) -> Option<&mut MixerChannel> {
        self.mixer.iter_mut().find(|c| c.track_id == track_id)
    }

    pub fn node(&self, node_id: &str) -> Option<&NodeInstance> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    pub fn node_mut(&mut self, node_id: &str) -> Option<&mut NodeInstance> {
        self.nodes.iter_mut().find(|n| n.id == node_id)
    }

    /// Nodes on one track ordered by plugin_index
    pub fn track_chain(&self, track_id: u32) -> Vec<&NodeInstance> {
        let mut chain: Vec<&NodeInstance> =
            self.nodes.iter().filter(|n| n.track_id == track_id).collect();
        chain.sort_by_key(|n| n.plugin_index);
        chain
    }

    /// Find a clip anywhere in the playlist
    pub fn clip(&self, clip_id: &str) -> Option<(&Track, &Clip)> {
        self.playlist.iter().find_map(|t| {
            t.clips.iter().find(|c| c.id == clip_id).map(|c| (t, c))
        })
    }

    pub fn any_record_armed(&self) -> bool {
        self.mixer.iter().any(|c| c.record_armed)
    }
}

/// A playlist lane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub track_id: u32,
    pub name: String,
    #[serde(default = "default_true")]
    pub chain_enabled: bool,
    #[serde(default)]
    pub chain_collapsed: bool,
    #[serde(default)]
    pub clips: Vec<Clip>,
}

fn default_true() -> bool {
    true
}

impl Track {
    pub fn new(track_id: u32, name: impl Into<String>) -> Self {
        Self {
            track_id,
            name: name.into(),
            chain_enabled: true,
            chain_collapsed: false,
            clips: Vec::new(),
        }
    }

    pub fn clip(&self, clip_id: &str) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id == clip_id)
    }

    pub fn clip_mut(&mut self, clip_id: &str) -> Option<&mut Clip> {
        self.clips.iter_mut().find(|c| c.id == clip_id)
    }
}

/// One mixer strip, keyed to a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixerChannel {
    pub track_id: u32,
    pub volume: f64,
    #[serde(default)]
    pub pan: f64,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default)]
    pub record_armed: bool,
}

impl MixerChannel {
    pub fn new(track_id: u32) -> Self {
        Self {
            track_id,
            volume: limits::VOLUME_DEFAULT,
            pan: 0.0,
            mute: false,
            solo: false,
            record_armed: false,
        }
    }
}

/// Pattern kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Drum,
}

/// A reusable step sequence referenced by pattern clips
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
    pub length: u32,
    #[serde(default)]
    pub swing: f64,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Pattern {
    pub fn new(id: impl Into<String>, length: u32) -> Self {
        Self {
            id: id.into(),
            pattern_type: PatternType::Drum,
            length,
            swing: 0.0,
            steps: Vec::new(),
        }
    }

    /// Stub synthesized for legacy clip references
    pub fn stub(id: impl Into<String>) -> Self {
        Self::new(id, 16)
    }

    pub fn step(&self, lane: &str, index: u32) -> Option<&Step> {
        self.steps.iter().find(|s| s.lane == lane && s.index == index)
    }

    /// Upsert a step; velocity 0 removes it
    pub fn set_step(&mut self, lane: &str, index: u32, velocity: f64) {
        if velocity <= 0.0 {
            self.steps.retain(|s| !(s.lane == lane && s.index == index));
            return;
        }
        if let Some(step) = self
            .steps
            .iter_mut()
            .find(|s| s.lane == lane && s.index == index)
        {
            step.velocity = velocity;
        } else {
            self.steps.push(Step {
                lane: lane.to_string(),
                index,
                velocity,
            });
        }
    }
}

/// One cell in a pattern grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub lane: String,
    pub index: u32,
    pub velocity: f64,
}

/// A time-positioned piece of content on a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: String,
    pub start: f64,
    pub length: f64,
    #[serde(default)]
    pub muted: bool,
    #[serde(flatten)]
    pub content: ClipContent,
}

impl Clip {
    pub fn pattern(id: impl Into<String>, start: f64, length: f64, pattern_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            start,
            length,
            muted: false,
            content: ClipContent::Pattern {
                pattern_id: pattern_id.into(),
            },
        }
    }

    pub fn audio(id: impl Into<String>, start: f64, length: f64, source: AudioSource) -> Self {
        Self {
            id: id.into(),
            start,
            length,
            muted: false,
            content: ClipContent::Audio { source },
        }
    }

    pub fn end(&self) -> f64 {
        self.start + self.length
    }

    /// Does [start, end) intersect [from, to)?
    pub fn intersects(&self, from: f64, to: f64) -> bool {
        self.start < to && self.end() > from
    }

    pub fn pattern_id(&self) -> Option<&str> {
        match &self.content {
            ClipContent::Pattern { pattern_id } => Some(pattern_id),
            _ => None,
        }
    }
}

/// Variant-specific clip payload, dispatched on the `type` tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClipContent {
    Pattern {
        pattern_id: String,
    },
    Audio {
        #[serde(flatten)]
        source: AudioSource,
    },
    Midi {
        #[serde(flatten)]
        source: MidiSource,
    },
}

/// Imported audio file metadata plus waveform overview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSource {
    pub source_name: String,
    pub source_format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_mime: Option<String>,
    pub source_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_duration_seconds: Option<f64>,
    #[serde(default)]
    pub waveform_peaks: Vec<f64>,
}

/// Imported MIDI file metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiSource {
    pub source_name: String,
    pub source_format: String,
    pub source_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_duration_seconds: Option<f64>,
}

/// Plugin node category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    VstInstrument,
    VstEffect,
}

/// An instance of a plugin placed in a track's chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInstance {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub plugin_uid: String,
    pub track_id: u32,
    pub plugin_index: u32,
    #[serde(default)]
    pub bypassed: bool,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
    #[serde(default)]
    pub parameter_schema: Vec<ParameterSpec>,
}

/// Parameter schema entry recorded at instantiation
///
/// `value` is normalized to [0,1] regardless of the plugin's native range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub id: String,
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub value: f64,
}

/// Generate an entity id with a short uuid suffix
pub fn generate_id(prefix: &str) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &uuid[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_project_has_dense_tracks_and_mixer() {
        let project = Project::new("Fresh");
        assert_eq!(project.playlist.len(), 4);
        for (i, track) in project.playlist.iter().enumerate() {
            assert_eq!(track.track_id, i as u32 + 1);
            let channel = project.channel(track.track_id).unwrap();
            assert_eq!(channel.volume, limits::VOLUME_DEFAULT);
        }
    }

    #[test]
    fn clip_intersection_is_half_open() {
        let clip = Clip::pattern("c1", 2.0, 1.0, "p1");
        assert!(clip.intersects(2.5, 3.5));
        assert!(clip.intersects(1.0, 2.5));
        assert!(!clip.intersects(3.0, 4.0)); // clip ends exactly at 3.0
        assert!(!clip.intersects(0.0, 2.0)); // clip starts exactly at 2.0
    }

    #[test]
    fn pattern_step_upsert_and_remove() {
        let mut pattern = Pattern::new("drums", 16);
        pattern.set_step("Kick", 0, 1.0);
        pattern.set_step("Kick", 0, 0.5);
        assert_eq!(pattern.steps.len(), 1);
        assert_eq!(pattern.step("Kick", 0).unwrap().velocity, 0.5);

        pattern.set_step("Kick", 0, 0.0);
        assert!(pattern.step("Kick", 0).is_none());
    }

    #[test]
    fn clip_serde_tags_variants() {
        let clip = Clip::pattern("clip_1", 0.0, 4.0, "drum_1");
        let json = serde_json::to_value(&clip).unwrap();
        assert_eq!(json["type"], "pattern");
        assert_eq!(json["pattern_id"], "drum_1");

        let parsed: Clip = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, clip);
    }

    #[test]
    fn audio_clip_serde_flattens_source() {
        let clip = Clip::audio(
            "clip_a",
            1.0,
            2.0,
            AudioSource {
                source_name: "kick.wav".to_string(),
                source_format: "wav".to_string(),
                source_mime: Some("audio/wav".to_string()),
                source_path: "media/kick.wav".to_string(),
                source_size_bytes: Some(44100),
                source_duration_seconds: Some(0.5),
                waveform_peaks: vec![0.1, 0.9, 0.4],
            },
        );
        let json = serde_json::to_value(&clip).unwrap();
        assert_eq!(json["type"], "audio");
        assert_eq!(json["source_name"], "kick.wav");

        let parsed: Clip = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, clip);
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = generate_id("clip");
        let b = generate_id("clip");
        assert_ne!(a, b);
        assert!(a.starts_with("clip_"));
    }
}
