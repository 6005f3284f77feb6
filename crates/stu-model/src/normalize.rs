//! Document normalization and legacy upgrades
//!
//! Loading a `.stu` file runs three stages: a raw JSON upgrade for legacy
//! shapes (`project_name`, clip `pattern` strings), typed normalization
//! (clamping, trimming, dense renumbering, mixer synthesis), and finally
//! validation. Normalization is also applied before every save so persisted
//! documents are always in normalized form.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::document::{generate_id, limits, MixerChannel, Pattern, Project};
use crate::time::TimeSignature;

/// What the raw-JSON upgrade changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpgradeReport {
    /// Pattern ids referenced by legacy string clips; stubs are synthesized
    /// for any that no Pattern declares.
    pub legacy_pattern_refs: Vec<String>,
    /// Renamed keys, generated ids
    pub changes: Vec<String>,
}

impl UpgradeReport {
    pub fn is_empty(&self) -> bool {
        self.legacy_pattern_refs.is_empty() && self.changes.is_empty()
    }
}

/// Upgrade legacy key shapes in the raw document before typed parsing.
///
/// - `project_name` becomes `title`
/// - a clip `pattern` string becomes `type: "pattern"` + `pattern_id`
/// - clips without an `id` get a generated one
pub fn upgrade_document(root: &mut Value) -> UpgradeReport {
    let mut report = UpgradeReport::default();

    let Some(obj) = root.as_object_mut() else {
        return report;
    };

    if !obj.contains_key("title") {
        if let Some(name) = obj.remove("project_name") {
            obj.insert("title".to_string(), name);
            report.changes.push("project_name -> title".to_string());
        }
    }

    let Some(playlist) = obj.get_mut("playlist").and_then(Value::as_array_mut) else {
        return report;
    };

    for track in playlist.iter_mut() {
        let Some(clips) = track.get_mut("clips").and_then(Value::as_array_mut) else {
            continue;
        };
        for clip in clips.iter_mut() {
            let Some(clip_obj) = clip.as_object_mut() else {
                continue;
            };

            if let Some(Value::String(pattern_ref)) = clip_obj.remove("pattern") {
                clip_obj.insert("type".to_string(), Value::from("pattern"));
                clip_obj.insert("pattern_id".to_string(), Value::from(pattern_ref.clone()));
                report.legacy_pattern_refs.push(pattern_ref.clone());
                report
                    .changes
                    .push(format!("clip pattern {:?} -> pattern_id", pattern_ref));
            }

            if !clip_obj.contains_key("id") {
                let id = generate_id("clip");
                report.changes.push(format!("generated clip id {}", id));
                clip_obj.insert("id".to_string(), Value::from(id));
            }
        }
    }

    report
}

/// Clamp, trim, renumber, and synthesize derived entities in place.
pub fn normalize(project: &mut Project, upgrade: &UpgradeReport) {
    clamp_header(project);
    renumber_tracks(project);
    normalize_tracks(project);
    normalize_patterns(project);
    normalize_clips(project);
    synthesize_pattern_stubs(project, &upgrade.legacy_pattern_refs);
    synchronize_mixer(project);
}

fn clamp_header(project: &mut Project) {
    project.bpm = project.bpm.clamp(limits::BPM_MIN, limits::BPM_MAX);
    project.playlist_view_bars = project
        .playlist_view_bars
        .clamp(limits::VIEW_BARS_MIN, limits::VIEW_BARS_MAX);
    if !project.playlist_bar_width.is_finite() || project.playlist_bar_width <= 0.0 {
        project.playlist_bar_width = 96.0;
    }

    let sig = &mut project.time_signature;
    sig.numerator = sig.numerator.max(1);
    if !TimeSignature::VALID_DENOMINATORS.contains(&sig.denominator) {
        // Snap to the nearest valid denominator
        sig.denominator = *TimeSignature::VALID_DENOMINATORS
            .iter()
            .min_by_key(|d| d.abs_diff(sig.denominator))
            .unwrap_or(&4);
    }
}

/// Renumber tracks to dense 1..N, rewriting mixer and node back-references.
fn renumber_tracks(project: &mut Project) {
    let mut remap: HashMap<u32, u32> = HashMap::new();
    for (idx, track) in project.playlist.iter_mut().enumerate() {
        let new_id = idx as u32 + 1;
        remap.insert(track.track_id, new_id);
        track.track_id = new_id;
    }

    for channel in &mut project.mixer {
        if let Some(new_id) = remap.get(&channel.track_id) {
            channel.track_id = *new_id;
        }
    }
    for node in &mut project.nodes {
        if let Some(new_id) = remap.get(&node.track_id) {
            node.track_id = *new_id;
        }
    }
}

fn normalize_tracks(project: &mut Project) {
    for track in &mut project.playlist {
        let trimmed = track.name.trim();
        let truncated: String = trimmed.chars().take(limits::TRACK_NAME_MAX).collect();
        if truncated != track.name {
            track.name = truncated;
        }
    }
}

fn normalize_patterns(project: &mut Project) {
    for pattern in &mut project.patterns {
        if !limits::PATTERN_LENGTHS.contains(&pattern.length) {
            pattern.length = *limits::PATTERN_LENGTHS
                .iter()
                .min_by_key(|l| l.abs_diff(pattern.length))
                .unwrap_or(&16);
        }
        if !pattern.swing.is_finite() {
            pattern.swing = 0.0;
        }
        pattern.swing = pattern.swing.clamp(0.0, limits::SWING_MAX);

        // Clamp velocities, drop silent steps, dedupe (lane,index) keeping
        // the last occurrence.
        let mut seen: HashSet<(String, u32)> = HashSet::new();
        let mut kept = Vec::with_capacity(pattern.steps.len());
        for mut step in pattern.steps.drain(..).rev() {
            if !step.velocity.is_finite() {
                continue;
            }
            step.velocity = step.velocity.clamp(0.0, 1.0);
            if step.velocity <= 0.0 {
                continue;
            }
            if seen.insert((step.lane.clone(), step.index)) {
                kept.push(step);
            }
        }
        kept.reverse();
        pattern.steps = kept;
    }
}

fn normalize_clips(project: &mut Project) {
    for track in &mut project.playlist {
        for clip in &mut track.clips {
            if !clip.start.is_finite() || clip.start < 0.0 {
                clip.start = 0.0;
            }
            if !clip.length.is_finite() || clip.length <= 0.0 {
                clip.length = 0.25;
            }
            if let crate::document::ClipContent::Audio { source } = &mut clip.content {
                if let Some(duration) = &mut source.source_duration_seconds {
                    if !duration.is_finite() || *duration < 0.0 {
                        *duration = 0.0;
                    }
                }
                for peak in &mut source.waveform_peaks {
                    if !peak.is_finite() {
                        *peak = 0.0;
                    }
                    *peak = peak.clamp(0.0, 1.0);
                }
            }
        }
    }
}

/// Synthesize drum stubs for legacy pattern references that resolve to nothing.
fn synthesize_pattern_stubs(project: &mut Project, legacy_refs: &[String]) {
    let existing: HashSet<String> = project.patterns.iter().map(|p| p.id.clone()).collect();
    let mut added: HashSet<&str> = HashSet::new();

    for pattern_ref in legacy_refs {
        if existing.contains(pattern_ref.as_str()) || added.contains(pattern_ref.as_str()) {
            continue;
        }
        tracing::debug!(pattern.id = %pattern_ref, "synthesizing stub for legacy clip reference");
        added.insert(pattern_ref.as_str());
        project.patterns.push(Pattern::stub(pattern_ref.clone()));
    }
}

/// One mixer channel per track: synthesize missing ones, drop orphans,
/// clamp levels, order by track.
fn synchronize_mixer(project: &mut Project) {
    let track_ids: Vec<u32> = project.playlist.iter().map(|t| t.track_id).collect();
    let track_set: HashSet<u32> = track_ids.iter().copied().collect();

    project.mixer.retain(|c| track_set.contains(&c.track_id));

    // Keep the first channel per track if a legacy file duplicated them
    let mut seen: HashSet<u32> = HashSet::new();
    project.mixer.retain(|c| seen.insert(c.track_id));

    for track_id in &track_ids {
        if !project.mixer.iter().any(|c| c.track_id == *track_id) {
            project.mixer.push(MixerChannel::new(*track_id));
        }
    }

    for channel in &mut project.mixer {
        if !channel.volume.is_finite() {
            channel.volume = limits::VOLUME_DEFAULT;
        }
        channel.volume = channel.volume.clamp(0.0, limits::VOLUME_MAX);
        if !channel.pan.is_finite() {
            channel.pan = 0.0;
        }
        channel.pan = channel.pan.clamp(-1.0, 1.0);
    }

    project.mixer.sort_by_key(|c| c.track_id);
}
