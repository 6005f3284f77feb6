//! Project validation
//!
//! Walks the whole document and collects every violation instead of
//! stopping at the first, so clients can render all offending fields at
//! once. Validation never mutates; clamping and shape upgrades live in
//! [`crate::normalize`].

use std::collections::{BTreeMap, HashSet};

use crate::document::{limits, ClipContent, Project};
use crate::time::TimeSignature;

/// One violation, anchored to a document path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Dotted path to the offending entity/field, e.g. `playlist[2].clips[0].start`
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Outcome of validating a project
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub issues: Vec<ValidationIssue>,
}

impl Validation {
    pub fn is_ok(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.issues.iter().map(|i| i.to_string()).collect()
    }
}

/// Validate every invariant of the document
pub fn validate(project: &Project) -> Validation {
    let mut issues = Vec::new();

    validate_header(project, &mut issues);
    validate_tracks(project, &mut issues);
    validate_mixer(project, &mut issues);
    validate_patterns(project, &mut issues);
    validate_clips(project, &mut issues);
    validate_nodes(project, &mut issues);

    Validation { issues }
}

fn validate_header(project: &Project, issues: &mut Vec<ValidationIssue>) {
    if !(limits::BPM_MIN..=limits::BPM_MAX).contains(&project.bpm) {
        issues.push(ValidationIssue::new(
            "bpm",
            format!(
                "bpm {} outside [{}, {}]",
                project.bpm,
                limits::BPM_MIN,
                limits::BPM_MAX
            ),
        ));
    }

    if !project.time_signature.is_valid() {
        issues.push(ValidationIssue::new(
            "time_signature",
            format!(
                "numerator must be >= 1 and denominator one of {:?}, got {}/{}",
                TimeSignature::VALID_DENOMINATORS,
                project.time_signature.numerator,
                project.time_signature.denominator
            ),
        ));
    }

    if !(limits::VIEW_BARS_MIN..=limits::VIEW_BARS_MAX).contains(&project.playlist_view_bars) {
        issues.push(ValidationIssue::new(
            "playlist_view_bars",
            format!(
                "playlist_view_bars {} outside [{}, {}]",
                project.playlist_view_bars,
                limits::VIEW_BARS_MIN,
                limits::VIEW_BARS_MAX
            ),
        ));
    }
}

fn validate_tracks(project: &Project, issues: &mut Vec<ValidationIssue>) {
    for (idx, track) in project.playlist.iter().enumerate() {
        let path = format!("playlist[{}]", idx);

        // Dense numbering: position idx holds track_id idx+1
        let expected = idx as u32 + 1;
        if track.track_id != expected {
            issues.push(ValidationIssue::new(
                format!("{}.track_id", path),
                format!("track ids must be dense 1..N; expected {}, got {}", expected, track.track_id),
            ));
        }

        if track.name.len() > limits::TRACK_NAME_MAX {
            issues.push(ValidationIssue::new(
                format!("{}.name", path),
                format!("name longer than {} chars", limits::TRACK_NAME_MAX),
            ));
        }
        if track.name.trim() != track.name {
            issues.push(ValidationIssue::new(
                format!("{}.name", path),
                "name must be trimmed",
            ));
        }
    }
}

fn validate_mixer(project: &Project, issues: &mut Vec<ValidationIssue>) {
    let track_ids: HashSet<u32> = project.playlist.iter().map(|t| t.track_id).collect();
    let mut seen: HashSet<u32> = HashSet::new();

    for (idx, channel) in project.mixer.iter().enumerate() {
        let path = format!("mixer[{}]", idx);

        if !track_ids.contains(&channel.track_id) {
            issues.push(ValidationIssue::new(
                format!("{}.track_id", path),
                format!("mixer channel references missing track {}", channel.track_id),
            ));
        }
        if !seen.insert(channel.track_id) {
            issues.push(ValidationIssue::new(
                format!("{}.track_id", path),
                format!("duplicate mixer channel for track {}", channel.track_id),
            ));
        }
        if !(0.0..=limits::VOLUME_MAX).contains(&channel.volume) {
            issues.push(ValidationIssue::new(
                format!("{}.volume", path),
                format!("volume {} outside [0, {}]", channel.volume, limits::VOLUME_MAX),
            ));
        }
        if !(-1.0..=1.0).contains(&channel.pan) {
            issues.push(ValidationIssue::new(
                format!("{}.pan", path),
                format!("pan {} outside [-1, 1]", channel.pan),
            ));
        }
    }

    for track_id in &track_ids {
        if !seen.contains(track_id) {
            issues.push(ValidationIssue::new(
                "mixer",
                format!("track {} has no mixer channel", track_id),
            ));
        }
    }
}

fn validate_patterns(project: &Project, issues: &mut Vec<ValidationIssue>) {
    let mut ids: HashSet<&str> = HashSet::new();

    for (idx, pattern) in project.patterns.iter().enumerate() {
        let path = format!("patterns[{}]", idx);

        if !ids.insert(pattern.id.as_str()) {
            issues.push(ValidationIssue::new(
                format!("{}.id", path),
                format!("duplicate pattern id {:?}", pattern.id),
            ));
        }
        if !limits::PATTERN_LENGTHS.contains(&pattern.length) {
            issues.push(ValidationIssue::new(
                format!("{}.length", path),
                format!("length must be one of {:?}, got {}", limits::PATTERN_LENGTHS, pattern.length),
            ));
        }
        if !(0.0..=limits::SWING_MAX).contains(&pattern.swing) {
            issues.push(ValidationIssue::new(
                format!("{}.swing", path),
                format!("swing {} outside [0, {}]", pattern.swing, limits::SWING_MAX),
            ));
        }

        let mut cells: HashSet<(&str, u32)> = HashSet::new();
        for (step_idx, step) in pattern.steps.iter().enumerate() {
            if !(0.0..=1.0).contains(&step.velocity) || !step.velocity.is_finite() {
                issues.push(ValidationIssue::new(
                    format!("{}.steps[{}].velocity", path, step_idx),
                    format!("velocity {} outside [0, 1]", step.velocity),
                ));
            }
            if step.index >= pattern.length {
                issues.push(ValidationIssue::new(
                    format!("{}.steps[{}].index", path, step_idx),
                    format!("step index {} beyond pattern length {}", step.index, pattern.length),
                ));
            }
            if !cells.insert((step.lane.as_str(), step.index)) {
                issues.push(ValidationIssue::new(
                    format!("{}.steps[{}]", path, step_idx),
                    format!("duplicate step ({}, {})", step.lane, step.index),
                ));
            }
        }
    }
}

fn validate_clips(project: &Project, issues: &mut Vec<ValidationIssue>) {
    let pattern_ids: HashSet<&str> = project.patterns.iter().map(|p| p.id.as_str()).collect();
    let mut clip_ids: HashSet<&str> = HashSet::new();

    for (track_idx, track) in project.playlist.iter().enumerate() {
        for (clip_idx, clip) in track.clips.iter().enumerate() {
            let path = format!("playlist[{}].clips[{}]", track_idx, clip_idx);

            if !clip_ids.insert(clip.id.as_str()) {
                issues.push(ValidationIssue::new(
                    format!("{}.id", path),
                    format!("duplicate clip id {:?}", clip.id),
                ));
            }
            if !(clip.start >= 0.0 && clip.start.is_finite()) {
                issues.push(ValidationIssue::new(
                    format!("{}.start", path),
                    format!("start {} must be >= 0", clip.start),
                ));
            }
            if !(clip.length > 0.0 && clip.length.is_finite()) {
                issues.push(ValidationIssue::new(
                    format!("{}.length", path),
                    format!("length {} must be > 0", clip.length),
                ));
            }

            match &clip.content {
                ClipContent::Pattern { pattern_id } => {
                    if !pattern_ids.contains(pattern_id.as_str()) {
                        issues.push(ValidationIssue::new(
                            format!("{}.pattern_id", path),
                            format!("unknown pattern {:?}", pattern_id),
                        ));
                    }
                }
                ClipContent::Audio { source } => {
                    if let Some(duration) = source.source_duration_seconds {
                        if !(duration >= 0.0 && duration.is_finite()) {
                            issues.push(ValidationIssue::new(
                                format!("{}.source_duration_seconds", path),
                                format!("source_duration_seconds {} must be >= 0", duration),
                            ));
                        }
                    }
                    for (peak_idx, peak) in source.waveform_peaks.iter().enumerate() {
                        if !peak.is_finite() || !(0.0..=1.0).contains(peak) {
                            issues.push(ValidationIssue::new(
                                format!("{}.waveform_peaks[{}]", path, peak_idx),
                                format!("waveform_peaks value {} outside [0, 1]", peak),
                            ));
                        }
                    }
                }
                ClipContent::Midi { source } => {
                    if let Some(duration) = source.source_duration_seconds {
                        if !(duration >= 0.0 && duration.is_finite()) {
                            issues.push(ValidationIssue::new(
                                format!("{}.source_duration_seconds", path),
                                format!("source_duration_seconds {} must be >= 0", duration),
                            ));
                        }
                    }
                }
            }
        }
    }
}

fn validate_nodes(project: &Project, issues: &mut Vec<ValidationIssue>) {
    let track_ids: HashSet<u32> = project.playlist.iter().map(|t| t.track_id).collect();
    let mut slots: HashSet<(u32, u32)> = HashSet::new();
    let mut node_ids: HashSet<&str> = HashSet::new();
    let mut per_track: BTreeMap<u32, Vec<u32>> = BTreeMap::new();

    for (idx, node) in project.nodes.iter().enumerate() {
        let path = format!("nodes[{}]", idx);

        if !node_ids.insert(node.id.as_str()) {
            issues.push(ValidationIssue::new(
                format!("{}.id", path),
                format!("duplicate node id {:?}", node.id),
            ));
        }
        if !track_ids.contains(&node.track_id) {
            issues.push(ValidationIssue::new(
                format!("{}.track_id", path),
                format!("node references missing track {}", node.track_id),
            ));
        }
        if !slots.insert((node.track_id, node.plugin_index)) {
            issues.push(ValidationIssue::new(
                format!("{}.plugin_index", path),
                format!(
                    "duplicate plugin_index {} on track {}",
                    node.plugin_index, node.track_id
                ),
            ));
        }
        per_track.entry(node.track_id).or_default().push(node.plugin_index);

        for (param_id, value) in &node.params {
            if !value.is_finite() || !(0.0..=1.0).contains(value) {
                issues.push(ValidationIssue::new(
                    format!("{}.params.{}", path, param_id),
                    format!("normalized value {} outside [0, 1]", value),
                ));
            }
        }
    }

    // plugin_index dense 0..K per track
    for (track_id, mut indices) in per_track {
        indices.sort_unstable();
        for (expected, actual) in indices.iter().enumerate() {
            if *actual != expected as u32 {
                issues.push(ValidationIssue::new(
                    "nodes",
                    format!(
                        "plugin_index not dense on track {}: expected {}, found {}",
                        track_id, expected, actual
                    ),
                ));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{AudioSource, Clip, MixerChannel, Pattern, Track};

    #[test]
    fn fresh_project_validates() {
        let project = Project::new("Valid");
        assert!(validate(&project).is_ok());
    }

    #[test]
    fn unknown_pattern_reference_fails() {
        let mut project = Project::new("Bad ref");
        project.playlist[0]
            .clips
            .push(Clip::pattern("c1", 0.0, 4.0, "missing_pattern"));

        let result = validate(&project);
        assert!(!result.is_ok());
        assert!(result
            .messages()
            .iter()
            .any(|m| m.contains("unknown pattern") && m.contains("missing_pattern")));
    }

    #[test]
    fn bad_audio_analysis_reports_both_fields() {
        let mut project = Project::new("Bad audio");
        project.playlist[0].clips.push(Clip::audio(
            "c1",
            0.0,
            4.0,
            AudioSource {
                source_name: "x.wav".to_string(),
                source_format: "wav".to_string(),
                source_mime: None,
                source_path: "media/x.wav".to_string(),
                source_size_bytes: None,
                source_duration_seconds: Some(-1.0),
                waveform_peaks: vec![0.2, 1.4],
            },
        ));

        let result = validate(&project);
        assert!(!result.is_ok());
        let messages = result.messages();
        assert!(messages.iter().any(|m| m.contains("source_duration_seconds")));
        assert!(messages.iter().any(|m| m.contains("waveform_peaks")));
    }

    #[test]
    fn sparse_track_ids_fail() {
        let mut project = Project::new("Sparse");
        project.playlist = vec![Track::new(1, "A"), Track::new(3, "B")];
        project.mixer = vec![MixerChannel::new(1), MixerChannel::new(3)];

        assert!(!validate(&project).is_ok());
    }

    #[test]
    fn missing_mixer_channel_fails() {
        let mut project = Project::new("No mixer");
        project.mixer.remove(2);

        let result = validate(&project);
        assert!(result
            .messages()
            .iter()
            .any(|m| m.contains("no mixer channel")));
    }

    #[test]
    fn duplicate_pattern_step_fails() {
        let mut project = Project::new("Dup step");
        let mut pattern = Pattern::new("p1", 16);
        pattern.steps.push(crate::document::Step {
            lane: "Kick".to_string(),
            index: 0,
            velocity: 1.0,
        });
        pattern.steps.push(crate::document::Step {
            lane: "Kick".to_string(),
            index: 0,
            velocity: 0.5,
        });
        project.patterns.push(pattern);

        assert!(!validate(&project).is_ok());
    }

    #[test]
    fn non_dense_plugin_index_fails() {
        let mut project = Project::new("Gap chain");
        project.nodes.push(crate::document::NodeInstance {
            id: "n1".to_string(),
            node_type: crate::document::NodeType::VstEffect,
            plugin_uid: "internal:tracktion:reverb".to_string(),
            track_id: 1,
            plugin_index: 1, // gap: no index 0
            bypassed: false,
            params: Default::default(),
            parameter_schema: Vec::new(),
        });

        let result = validate(&project);
        assert!(result.messages().iter().any(|m| m.contains("not dense")));
    }

    #[test]
    fn zero_length_clip_fails() {
        let mut project = Project::new("Zero len");
        project.patterns.push(Pattern::new("p1", 16));
        project.playlist[0]
            .clips
            .push(Clip::pattern("c1", 0.0, 0.0, "p1"));

        assert!(!validate(&project).is_ok());
    }
}
