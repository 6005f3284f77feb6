//! Project -> GraphSpec translation
//!
//! Builds the immutable playback description the audio callback consumes.
//! Everything expensive happens here, off the audio thread: bar->beat
//! conversion, pattern step scheduling, audio decoding (cached by source
//! path). Channel controls and bypass flags are shared atomics that
//! persist across rebuilds so fader moves survive a graph swap.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use stu_audio::{
    schedule_pattern_steps, AudioClipSpec, ChainSlotSpec, ChannelControls, ClipSpec, DecodedAudio,
    GraphSpec, PatternClipSpec, SlotIndex, TrackSpec,
};
use stu_model::{ClipContent, NodeType, Project};

/// Session-side state shared with the renderer across rebuilds
#[derive(Default)]
pub struct GraphBindings {
    /// track_id -> shared mixer controls
    pub controls: HashMap<u32, Arc<ChannelControls>>,
    /// node_id -> pool slot of the installed processor
    pub slots: HashMap<String, SlotIndex>,
    /// node_id -> shared bypass flag
    pub bypass: HashMap<String, Arc<AtomicBool>>,
    /// source_path -> decoded audio
    pub audio_cache: HashMap<String, Arc<DecodedAudio>>,
}

impl GraphBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Controls for a track, creating them from the mixer channel if new
    pub fn controls_for(&mut self, project: &Project, track_id: u32) -> Arc<ChannelControls> {
        if let Some(existing) = self.controls.get(&track_id) {
            return existing.clone();
        }
        let channel = project.channel(track_id);
        let controls = ChannelControls::new(
            channel.map_or(0.85, |c| c.volume as f32),
            channel.map_or(0.0, |c| c.pan as f32),
        );
        if let Some(channel) = channel {
            controls.mute.store(channel.mute, Ordering::Relaxed);
            controls.solo.store(channel.solo, Ordering::Relaxed);
        }
        self.controls.insert(track_id, controls.clone());
        controls
    }

    pub fn bypass_for(&mut self, node_id: &str, bypassed: bool) -> Arc<AtomicBool> {
        if let Some(flag) = self.bypass.get(node_id) {
            return flag.clone();
        }
        let flag = Arc::new(AtomicBool::new(bypassed));
        self.bypass.insert(node_id.to_string(), flag.clone());
        flag
    }

    /// Decode (or fetch cached) audio for a clip source
    pub fn audio_for(&mut self, source_path: &str) -> Option<Arc<DecodedAudio>> {
        if let Some(cached) = self.audio_cache.get(source_path) {
            return Some(cached.clone());
        }
        match stu_audio::decode_file(Path::new(source_path)) {
            Ok(decoded) => {
                self.audio_cache
                    .insert(source_path.to_string(), decoded.clone());
                Some(decoded)
            }
            Err(e) => {
                tracing::warn!(path = source_path, error = %e, "clip source failed to decode");
                None
            }
        }
    }

    /// Drop bindings for entities the project no longer has
    pub fn prune(&mut self, project: &Project) {
        let track_ids: std::collections::HashSet<u32> =
            project.playlist.iter().map(|t| t.track_id).collect();
        self.controls.retain(|track_id, _| track_ids.contains(track_id));

        let node_ids: std::collections::HashSet<&str> =
            project.nodes.iter().map(|n| n.id.as_str()).collect();
        self.bypass.retain(|node_id, _| node_ids.contains(node_id.as_str()));
        self.slots.retain(|node_id, _| node_ids.contains(node_id.as_str()));
    }
}

/// Build the playback description for the current document state
pub fn build_graph(project: &Project, bindings: &mut GraphBindings) -> GraphSpec {
    let beats_per_bar = project.time_signature.beats_per_bar();
    let mut tracks = Vec::with_capacity(project.playlist.len());

    for track in &project.playlist {
        let controls = bindings.controls_for(project, track.track_id);
        controls
            .chain_enabled
            .store(track.chain_enabled, Ordering::Relaxed);

        let mut clips = Vec::with_capacity(track.clips.len());
        for clip in &track.clips {
            if clip.muted {
                continue;
            }
            let start_beats = clip.start * beats_per_bar;
            let length_beats = clip.length * beats_per_bar;

            match &clip.content {
                ClipContent::Pattern { pattern_id } => {
                    let Some(pattern) = project.pattern(pattern_id) else {
                        continue;
                    };
                    let (steps, period_beats) = schedule_pattern_steps(
                        pattern.length,
                        pattern.swing,
                        pattern
                            .steps
                            .iter()
                            .map(|s| (s.lane.clone(), s.index, s.velocity)),
                    );
                    clips.push(ClipSpec::Pattern(PatternClipSpec {
                        start_beats,
                        length_beats,
                        steps,
                        period_beats,
                    }));
                }
                ClipContent::Audio { source } => {
                    if let Some(audio) = bindings.audio_for(&source.source_path) {
                        clips.push(ClipSpec::Audio(AudioClipSpec {
                            start_beats,
                            length_beats,
                            audio,
                        }));
                    }
                }
                // MIDI clip rendering beyond plugin hosting is out of scope
                ClipContent::Midi { .. } => {}
            }
        }

        let mut chain: Vec<ChainSlotSpec> = Vec::new();
        for node in project.track_chain(track.track_id) {
            let Some(&slot) = bindings.slots.get(&node.id) else {
                continue;
            };
            chain.push(ChainSlotSpec {
                slot,
                bypassed: bindings.bypass_for(&node.id, node.bypassed),
                is_instrument: node.node_type == NodeType::VstInstrument,
            });
        }

        let record_armed = project
            .channel(track.track_id)
            .is_some_and(|c| c.record_armed);

        tracks.push(TrackSpec {
            track_id: track.track_id,
            controls,
            clips,
            chain,
            record_armed,
        });
    }

    GraphSpec {
        tracks,
        beats_per_bar,
        metronome_enabled: project.metronome_enabled,
    }
}
