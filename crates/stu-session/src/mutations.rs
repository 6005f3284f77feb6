//! Document mutations
//!
//! The pure half of every operation: each function validates against the
//! current document, applies the change, and returns the ack payload.
//! Side effects (audio graph, plugin host, disk) belong to the
//! orchestrator, which calls these against a working copy and commits only
//! on success.
//!
//! Track ids stay dense 1..N across every structural change; clip starts
//! and lengths land on the caller-supplied grid step.

use serde_json::{json, Value};

use stu_model::{
    generate_id, limits, Clip, ClipContent, MixerChannel, NodeInstance, Pattern, Project, Track,
};
use stu_proto::WireError;

/// Fallback when a request carries a nonsensical grid step
const DEFAULT_GRID_STEP: f64 = 0.0625;

fn effective_step(grid_step: f64) -> f64 {
    if grid_step.is_finite() && grid_step > 0.0 {
        grid_step
    } else {
        DEFAULT_GRID_STEP
    }
}

fn snap(value: f64, step: f64) -> f64 {
    (value / step).round() * step
}

/// Renumber to dense 1..N in playlist order, rewriting back-references
pub fn renumber_tracks(project: &mut Project) {
    let mut remap = std::collections::HashMap::new();
    for (index, track) in project.playlist.iter_mut().enumerate() {
        let new_id = index as u32 + 1;
        remap.insert(track.track_id, new_id);
        track.track_id = new_id;
    }
    for channel in &mut project.mixer {
        if let Some(&new_id) = remap.get(&channel.track_id) {
            channel.track_id = new_id;
        }
    }
    for node in &mut project.nodes {
        if let Some(&new_id) = remap.get(&node.track_id) {
            node.track_id = new_id;
        }
    }
    project.mixer.sort_by_key(|c| c.track_id);
}

fn normalized_name(name: Option<String>, fallback: String) -> String {
    let name = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    let name = name.unwrap_or(fallback);
    name.chars().take(limits::TRACK_NAME_MAX).collect()
}

// === Tracks ===

pub fn create_track(project: &mut Project, name: Option<String>) -> Result<Value, WireError> {
    let track_id = project.playlist.len() as u32 + 1;
    let name = normalized_name(name, format!("Track {}", track_id));
    project.playlist.push(Track::new(track_id, name));
    project.mixer.push(MixerChannel::new(track_id));
    Ok(json!({ "track_id": track_id }))
}

pub fn insert_track(
    project: &mut Project,
    index: u32,
    name: Option<String>,
) -> Result<Value, WireError> {
    let index = (index as usize).min(project.playlist.len());
    let name = normalized_name(name, format!("Track {}", index + 1));
    // Placeholder id; the renumber remap carries it onto the new channel
    project.playlist.insert(index, Track::new(0, name));
    project.mixer.push(MixerChannel::new(0));
    renumber_tracks(project);
    let track_id = project.playlist[index].track_id;
    Ok(json!({ "track_id": track_id }))
}

/// Copy a track's clips and mixer settings. The plugin chain is cloned by
/// the orchestrator, which owns instantiation.
pub fn duplicate_track(project: &mut Project, track_id: u32) -> Result<Value, WireError> {
    let source = project
        .track(track_id)
        .ok_or_else(|| WireError::not_found("track", track_id))?
        .clone();
    let source_channel = project
        .channel(track_id)
        .cloned()
        .unwrap_or_else(|| MixerChannel::new(track_id));

    let new_id = project.playlist.len() as u32 + 1;
    let mut copy = Track::new(
        new_id,
        normalized_name(Some(format!("{} copy", source.name)), format!("Track {}", new_id)),
    );
    copy.chain_enabled = source.chain_enabled;
    copy.chain_collapsed = source.chain_collapsed;
    copy.clips = source
        .clips
        .iter()
        .map(|clip| {
            let mut cloned = clip.clone();
            cloned.id = generate_id("clip");
            cloned
        })
        .collect();

    let insert_at = project
        .playlist
        .iter()
        .position(|t| t.track_id == track_id)
        .map(|p| p + 1)
        .unwrap_or(project.playlist.len());
    project.playlist.insert(insert_at, copy);

    let mut channel = source_channel;
    channel.track_id = new_id;
    channel.record_armed = false;
    project.mixer.push(channel);

    renumber_tracks(project);
    let assigned = project.playlist[insert_at].track_id;
    Ok(json!({ "track_id": assigned, "source_track_id": track_id }))
}

/// Remove tracks; returns the node ids that died with them
pub fn delete_tracks(project: &mut Project, track_ids: &[u32]) -> Result<(Value, Vec<String>), WireError> {
    for &track_id in track_ids {
        if project.track(track_id).is_none() {
            return Err(WireError::not_found("track", track_id));
        }
    }
    if track_ids.len() >= project.playlist.len() {
        return Err(WireError::conflict("cannot delete every track"));
    }

    let doomed: std::collections::HashSet<u32> = track_ids.iter().copied().collect();
    let removed_nodes: Vec<String> = project
        .nodes
        .iter()
        .filter(|n| doomed.contains(&n.track_id))
        .map(|n| n.id.clone())
        .collect();

    project.playlist.retain(|t| !doomed.contains(&t.track_id));
    project.mixer.retain(|c| !doomed.contains(&c.track_id));
    project.nodes.retain(|n| !doomed.contains(&n.track_id));
    renumber_tracks(project);

    Ok((json!({ "deleted": track_ids }), removed_nodes))
}

pub fn reorder_track(project: &mut Project, track_id: u32, to_index: u32) -> Result<Value, WireError> {
    let from = project
        .playlist
        .iter()
        .position(|t| t.track_id == track_id)
        .ok_or_else(|| WireError::not_found("track", track_id))?;
    let to = (to_index as usize).min(project.playlist.len() - 1);

    let track = project.playlist.remove(from);
    project.playlist.insert(to, track);
    renumber_tracks(project);
    Ok(json!({ "track_id": project.playlist[to].track_id, "index": to }))
}

pub fn rename_track(project: &mut Project, track_id: u32, name: String) -> Result<Value, WireError> {
    let name = normalized_name(Some(name), String::new());
    if name.is_empty() {
        return Err(WireError::invalid_request("track name cannot be empty"));
    }
    let track = project
        .track_mut(track_id)
        .ok_or_else(|| WireError::not_found("track", track_id))?;
    track.name = name.clone();
    Ok(json!({ "track_id": track_id, "name": name }))
}

pub fn set_chain_enabled(
    project: &mut Project,
    track_id: u32,
    enabled: bool,
) -> Result<Value, WireError> {
    let track = project
        .track_mut(track_id)
        .ok_or_else(|| WireError::not_found("track", track_id))?;
    track.chain_enabled = enabled;
    Ok(json!({ "track_id": track_id, "chain_enabled": enabled }))
}

// === Mixer ===

fn channel_mut<'a>(project: &'a mut Project, track_id: u32) -> Result<&'a mut MixerChannel, WireError> {
    project
        .channel_mut(track_id)
        .ok_or_else(|| WireError::not_found("track", track_id))
}

pub fn set_volume(project: &mut Project, track_id: u32, volume: f64) -> Result<Value, WireError> {
    if !volume.is_finite() {
        return Err(WireError::out_of_range("volume must be finite"));
    }
    let clamped = volume.clamp(0.0, limits::VOLUME_MAX);
    channel_mut(project, track_id)?.volume = clamped;
    Ok(json!({ "track_id": track_id, "volume": clamped }))
}

pub fn set_pan(project: &mut Project, track_id: u32, pan: f64) -> Result<Value, WireError> {
    if !pan.is_finite() {
        return Err(WireError::out_of_range("pan must be finite"));
    }
    let clamped = pan.clamp(-1.0, 1.0);
    channel_mut(project, track_id)?.pan = clamped;
    Ok(json!({ "track_id": track_id, "pan": clamped }))
}

pub fn set_mute(project: &mut Project, track_id: u32, mute: bool) -> Result<Value, WireError> {
    channel_mut(project, track_id)?.mute = mute;
    Ok(json!({ "track_id": track_id, "mute": mute }))
}

pub fn set_solo(project: &mut Project, track_id: u32, solo: bool) -> Result<Value, WireError> {
    channel_mut(project, track_id)?.solo = solo;
    Ok(json!({ "track_id": track_id, "solo": solo }))
}

pub fn set_record_arm(project: &mut Project, track_id: u32, armed: bool) -> Result<Value, WireError> {
    channel_mut(project, track_id)?.record_armed = armed;
    Ok(json!({ "track_id": track_id, "record_armed": armed }))
}

// === Clips ===

pub fn create_clip(
    project: &mut Project,
    track_id: u32,
    pattern_id: &str,
    start: f64,
    length: f64,
    grid_step: f64,
) -> Result<Value, WireError> {
    if project.pattern(pattern_id).is_none() {
        return Err(WireError::not_found("pattern", pattern_id));
    }
    if !(length.is_finite() && length > 0.0) {
        return Err(WireError::out_of_range("clip length must be > 0"));
    }
    if !(start.is_finite() && start >= 0.0) {
        return Err(WireError::out_of_range("clip start must be >= 0"));
    }

    let step = effective_step(grid_step);
    let start = snap(start.max(0.0), step);
    let length = snap(length, step).max(step);

    let track = project
        .track_mut(track_id)
        .ok_or_else(|| WireError::not_found("track", track_id))?;
    let clip_id = generate_id("clip");
    track
        .clips
        .push(Clip::pattern(clip_id.clone(), start, length, pattern_id));

    Ok(json!({ "clip_id": clip_id, "start": start, "length": length }))
}

pub fn move_clip(
    project: &mut Project,
    clip_id: &str,
    start: f64,
    target_track: Option<u32>,
    grid_step: f64,
) -> Result<Value, WireError> {
    if !(start.is_finite() && start >= 0.0) {
        return Err(WireError::out_of_range("clip start must be >= 0"));
    }
    let step = effective_step(grid_step);
    let start = snap(start.max(0.0), step);

    let source_track_id = project
        .clip(clip_id)
        .map(|(track, _)| track.track_id)
        .ok_or_else(|| WireError::not_found("clip", clip_id))?;

    let destination = target_track.unwrap_or(source_track_id);
    if project.track(destination).is_none() {
        return Err(WireError::not_found("track", destination));
    }

    // Detach, update, reattach (possibly on another lane)
    let mut clip = {
        let track = project.track_mut(source_track_id).expect("source exists");
        let position = track
            .clips
            .iter()
            .position(|c| c.id == clip_id)
            .expect("clip located above");
        track.clips.remove(position)
    };
    clip.start = start;
    project
        .track_mut(destination)
        .expect("destination checked above")
        .clips
        .push(clip);

    Ok(json!({ "clip_id": clip_id, "start": start, "track_id": destination }))
}

pub fn resize_clip(
    project: &mut Project,
    clip_id: &str,
    length: f64,
    grid_step: f64,
) -> Result<Value, WireError> {
    if !length.is_finite() {
        return Err(WireError::out_of_range("clip length must be finite"));
    }
    let step = effective_step(grid_step);
    let length = snap(length, step).max(step);

    let track_id = project
        .clip(clip_id)
        .map(|(track, _)| track.track_id)
        .ok_or_else(|| WireError::not_found("clip", clip_id))?;
    let track = project.track_mut(track_id).expect("track exists");
    let clip = track.clip_mut(clip_id).expect("clip located above");
    clip.length = length;

    Ok(json!({ "clip_id": clip_id, "length": length }))
}

pub fn delete_clip(project: &mut Project, clip_id: &str) -> Result<Value, WireError> {
    for track in &mut project.playlist {
        if let Some(position) = track.clips.iter().position(|c| c.id == clip_id) {
            track.clips.remove(position);
            return Ok(json!({ "clip_id": clip_id }));
        }
    }
    Err(WireError::not_found("clip", clip_id))
}

/// Insert an already-built imported clip (audio or midi content)
pub fn insert_import_clip(
    project: &mut Project,
    track_id: u32,
    content: ClipContent,
    start: f64,
    length: f64,
    grid_step: f64,
) -> Result<Value, WireError> {
    let step = effective_step(grid_step);
    let start = snap(start.max(0.0), step);
    let length = snap(length.max(step), step).max(step);

    let track = project
        .track_mut(track_id)
        .ok_or_else(|| WireError::not_found("track", track_id))?;
    let clip_id = generate_id("clip");
    track.clips.push(Clip {
        id: clip_id.clone(),
        start,
        length,
        muted: false,
        content,
    });

    Ok(json!({ "clip_id": clip_id, "start": start, "length": length }))
}

// === Patterns ===

pub fn create_pattern(
    project: &mut Project,
    id: Option<String>,
    length: u32,
    swing: f64,
) -> Result<Value, WireError> {
    if !limits::PATTERN_LENGTHS.contains(&length) {
        return Err(WireError::out_of_range(format!(
            "pattern length must be one of {:?}",
            limits::PATTERN_LENGTHS
        )));
    }
    let id = id.unwrap_or_else(|| generate_id("pattern"));
    if project.pattern(&id).is_some() {
        return Err(WireError::conflict(format!("pattern {:?} already exists", id)));
    }

    let mut pattern = Pattern::new(id.clone(), length);
    pattern.swing = if swing.is_finite() {
        swing.clamp(0.0, limits::SWING_MAX)
    } else {
        0.0
    };
    project.patterns.push(pattern);
    Ok(json!({ "pattern_id": id }))
}

pub fn update_pattern(
    project: &mut Project,
    pattern_id: &str,
    length: Option<u32>,
    swing: Option<f64>,
) -> Result<Value, WireError> {
    if let Some(length) = length {
        if !limits::PATTERN_LENGTHS.contains(&length) {
            return Err(WireError::out_of_range(format!(
                "pattern length must be one of {:?}",
                limits::PATTERN_LENGTHS
            )));
        }
    }
    let pattern = project
        .pattern_mut(pattern_id)
        .ok_or_else(|| WireError::not_found("pattern", pattern_id))?;

    if let Some(length) = length {
        pattern.length = length;
        // Steps past the new end are dropped
        pattern.steps.retain(|s| s.index < length);
    }
    if let Some(swing) = swing {
        if !swing.is_finite() {
            return Err(WireError::out_of_range("swing must be finite"));
        }
        pattern.swing = swing.clamp(0.0, limits::SWING_MAX);
    }
    Ok(json!({ "pattern_id": pattern_id }))
}

pub fn update_step(
    project: &mut Project,
    pattern_id: &str,
    lane: &str,
    index: u32,
    velocity: f64,
) -> Result<Value, WireError> {
    let pattern = project
        .pattern_mut(pattern_id)
        .ok_or_else(|| WireError::not_found("pattern", pattern_id))?;
    if index >= pattern.length {
        return Err(WireError::out_of_range(format!(
            "step index {} beyond pattern length {}",
            index, pattern.length
        )));
    }
    if !velocity.is_finite() {
        return Err(WireError::out_of_range("velocity must be finite"));
    }

    let velocity = velocity.clamp(0.0, 1.0);
    pattern.set_step(lane, index, velocity);
    Ok(json!({
        "pattern_id": pattern_id,
        "lane": lane,
        "index": index,
        "velocity": velocity,
    }))
}

// === Plugin nodes (document side) ===

/// Shift indices and insert the node at `insert_index` (appended if out of
/// range). Returns the assigned plugin_index.
pub fn insert_node(
    project: &mut Project,
    mut node: NodeInstance,
    insert_index: Option<u32>,
) -> Result<u32, WireError> {
    if project.track(node.track_id).is_none() {
        return Err(WireError::not_found("track", node.track_id));
    }
    let chain_len = project.track_chain(node.track_id).len() as u32;
    let index = insert_index.unwrap_or(chain_len).min(chain_len);

    for existing in &mut project.nodes {
        if existing.track_id == node.track_id && existing.plugin_index >= index {
            existing.plugin_index += 1;
        }
    }
    node.plugin_index = index;
    project.nodes.push(node);
    Ok(index)
}

/// Remove a node, keeping indices dense on its track
pub fn remove_node(project: &mut Project, node_id: &str) -> Result<NodeInstance, WireError> {
    let position = project
        .nodes
        .iter()
        .position(|n| n.id == node_id)
        .ok_or_else(|| WireError::not_found("node", node_id))?;
    let removed = project.nodes.remove(position);

    for node in &mut project.nodes {
        if node.track_id == removed.track_id && node.plugin_index > removed.plugin_index {
            node.plugin_index -= 1;
        }
    }
    Ok(removed)
}

pub fn reorder_chain(
    project: &mut Project,
    track_id: u32,
    from: u32,
    to: u32,
) -> Result<Value, WireError> {
    let chain: Vec<String> = project
        .track_chain(track_id)
        .iter()
        .map(|n| n.id.clone())
        .collect();
    if chain.is_empty() {
        return Err(WireError::not_found("track", track_id));
    }
    let from = from as usize;
    if from >= chain.len() {
        return Err(WireError::out_of_range(format!(
            "chain index {} beyond length {}",
            from,
            chain.len()
        )));
    }
    let to = (to as usize).min(chain.len() - 1);

    let mut order = chain;
    let moved = order.remove(from);
    order.insert(to, moved);

    for (index, node_id) in order.iter().enumerate() {
        if let Some(node) = project.node_mut(node_id) {
            node.plugin_index = index as u32;
        }
    }
    Ok(json!({ "track_id": track_id, "from": from, "to": to }))
}

pub fn set_node_param(
    project: &mut Project,
    node_id: &str,
    param_id: &str,
    value: f64,
) -> Result<(Value, usize, f64), WireError> {
    if !value.is_finite() {
        return Err(WireError::out_of_range("parameter value must be finite"));
    }
    let clamped = value.clamp(0.0, 1.0);
    let node = project
        .node_mut(node_id)
        .ok_or_else(|| WireError::not_found("node", node_id))?;

    let param_index = node
        .parameter_schema
        .iter()
        .position(|p| p.id == param_id)
        .ok_or_else(|| WireError::not_found("parameter", param_id))?;

    node.params.insert(param_id.to_string(), clamped);
    node.parameter_schema[param_index].value = clamped;

    Ok((
        json!({ "node_id": node_id, "param_id": param_id, "value": clamped }),
        param_index,
        clamped,
    ))
}

pub fn set_node_bypass(
    project: &mut Project,
    node_id: &str,
    bypassed: bool,
) -> Result<Value, WireError> {
    let node = project
        .node_mut(node_id)
        .ok_or_else(|| WireError::not_found("node", node_id))?;
    node.bypassed = bypassed;
    Ok(json!({ "node_id": node_id, "bypassed": bypassed }))
}

// === Project view ===

pub fn update_view(
    project: &mut Project,
    view_bars: Option<u32>,
    bar_width: Option<f64>,
    show_track_nodes: Option<bool>,
    metronome_enabled: Option<bool>,
) -> Result<Value, WireError> {
    if let Some(bars) = view_bars {
        project.playlist_view_bars = bars.clamp(limits::VIEW_BARS_MIN, limits::VIEW_BARS_MAX);
    }
    if let Some(width) = bar_width {
        if width.is_finite() && width > 0.0 {
            project.playlist_bar_width = width;
        }
    }
    if let Some(show) = show_track_nodes {
        project.playlist_show_track_nodes = show;
    }
    if let Some(metronome) = metronome_enabled {
        project.metronome_enabled = metronome;
    }
    Ok(json!({
        "playlist_view_bars": project.playlist_view_bars,
        "playlist_bar_width": project.playlist_bar_width,
        "playlist_show_track_nodes": project.playlist_show_track_nodes,
        "metronome_enabled": project.metronome_enabled,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stu_model::validate;
    use stu_proto::ErrorCode;

    fn project_with_pattern() -> Project {
        let mut project = Project::new("Mutations");
        project.patterns.push(Pattern::new("p1", 16));
        project
    }

    #[test]
    fn create_and_delete_keep_ids_dense() {
        let mut project = Project::new("Dense");
        create_track(&mut project, Some("Bass".to_string())).unwrap();
        assert_eq!(project.playlist.len(), 5);

        let (_, removed) = delete_tracks(&mut project, &[2, 3]).unwrap();
        assert!(removed.is_empty());
        assert_eq!(project.playlist.len(), 3);
        for (index, track) in project.playlist.iter().enumerate() {
            assert_eq!(track.track_id, index as u32 + 1);
        }
        assert!(validate(&project).is_ok());
    }

    #[test]
    fn delete_all_tracks_is_a_conflict() {
        let mut project = Project::new("All");
        let err = delete_tracks(&mut project, &[1, 2, 3, 4]).unwrap_err();
        assert_eq!(err.code, ErrorCode::Conflict);
    }

    #[test]
    fn delete_missing_track_not_found() {
        let mut project = Project::new("Missing");
        let err = delete_tracks(&mut project, &[9]).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[test]
    fn track_id_zero_is_rejected() {
        let mut project = project_with_pattern();
        assert_eq!(
            set_volume(&mut project, 0, 0.5).unwrap_err().code,
            ErrorCode::NotFound
        );
        assert_eq!(
            create_clip(&mut project, 0, "p1", 0.0, 1.0, 0.25)
                .unwrap_err()
                .code,
            ErrorCode::NotFound
        );
    }

    #[test]
    fn reorder_rewrites_references() {
        let mut project = Project::new("Reorder");
        project.playlist[0]
            .clips
            .push(Clip::pattern("c1", 0.0, 1.0, "p"));
        project.patterns.push(Pattern::new("p", 16));

        reorder_track(&mut project, 1, 3).unwrap();
        // The old track 1 now sits at index 3 with id 4, clips intact
        assert_eq!(project.playlist[3].clips.len(), 1);
        assert!(validate(&project).is_ok());
    }

    #[test]
    fn duplicate_copies_clips_with_fresh_ids() {
        let mut project = project_with_pattern();
        project.playlist[0]
            .clips
            .push(Clip::pattern("c1", 1.0, 2.0, "p1"));

        let ack = duplicate_track(&mut project, 1).unwrap();
        let new_id = ack["track_id"].as_u64().unwrap() as u32;
        assert_eq!(new_id, 2); // inserted right after the source

        let copy = project.track(new_id).unwrap();
        assert_eq!(copy.clips.len(), 1);
        assert_ne!(copy.clips[0].id, "c1");
        assert_eq!(copy.clips[0].start, 1.0);
        assert!(copy.name.contains("copy"));
        assert!(validate(&project).is_ok());
    }

    #[test]
    fn rename_trims_and_truncates() {
        let mut project = Project::new("Names");
        rename_track(
            &mut project,
            1,
            "  an extremely long name for a track  ".to_string(),
        )
        .unwrap();
        let name = &project.playlist[0].name;
        assert!(name.len() <= limits::TRACK_NAME_MAX);
        assert!(!name.starts_with(' '));
    }

    #[test]
    fn volume_and_pan_clamp() {
        let mut project = Project::new("Clamp");
        let ack = set_volume(&mut project, 1, 5.0).unwrap();
        assert_eq!(ack["volume"], 1.2);
        let ack = set_pan(&mut project, 1, -9.0).unwrap();
        assert_eq!(ack["pan"], -1.0);
    }

    #[test]
    fn mute_solo_arm_are_idempotent() {
        let mut project = Project::new("Idempotent");
        for _ in 0..3 {
            set_mute(&mut project, 2, true).unwrap();
            set_solo(&mut project, 2, true).unwrap();
            set_record_arm(&mut project, 2, true).unwrap();
        }
        let channel = project.channel(2).unwrap();
        assert!(channel.mute && channel.solo && channel.record_armed);
        assert!(validate(&project).is_ok());
    }

    #[test]
    fn clip_create_snaps_to_grid() {
        let mut project = project_with_pattern();
        let ack = create_clip(&mut project, 1, "p1", 1.23, 0.8, 0.25).unwrap();
        assert_eq!(ack["start"], 1.25);
        assert_eq!(ack["length"], 0.75);
    }

    #[test]
    fn clip_zero_length_rejected() {
        let mut project = project_with_pattern();
        let err = create_clip(&mut project, 1, "p1", 0.0, 0.0, 0.25).unwrap_err();
        assert_eq!(err.code, ErrorCode::OutOfRange);
    }

    #[test]
    fn clip_requires_existing_pattern() {
        let mut project = Project::new("NoPattern");
        let err = create_clip(&mut project, 1, "ghost", 0.0, 1.0, 0.25).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[test]
    fn resize_enforces_minimum_of_one_step() {
        let mut project = project_with_pattern();
        let ack = create_clip(&mut project, 1, "p1", 0.0, 1.0, 0.25).unwrap();
        let clip_id = ack["clip_id"].as_str().unwrap().to_string();

        let ack = resize_clip(&mut project, &clip_id, 0.01, 0.25).unwrap();
        assert_eq!(ack["length"], 0.25);
    }

    #[test]
    fn move_across_tracks() {
        let mut project = project_with_pattern();
        let ack = create_clip(&mut project, 1, "p1", 0.0, 1.0, 0.25).unwrap();
        let clip_id = ack["clip_id"].as_str().unwrap().to_string();

        move_clip(&mut project, &clip_id, 4.1, Some(3), 0.25).unwrap();
        assert!(project.playlist[0].clips.is_empty());
        let moved = project.track(3).unwrap().clip(&clip_id).unwrap();
        assert_eq!(moved.start, 4.0);
    }

    #[test]
    fn move_to_missing_track_fails_without_change() {
        let mut project = project_with_pattern();
        let ack = create_clip(&mut project, 1, "p1", 2.0, 1.0, 0.25).unwrap();
        let clip_id = ack["clip_id"].as_str().unwrap().to_string();

        let err = move_clip(&mut project, &clip_id, 0.0, Some(99), 0.25).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(project.track(1).unwrap().clip(&clip_id).unwrap().start, 2.0);
    }

    #[test]
    fn pattern_create_validates_length() {
        let mut project = Project::new("Patterns");
        assert_eq!(
            create_pattern(&mut project, None, 12, 0.0).unwrap_err().code,
            ErrorCode::OutOfRange
        );
        let ack = create_pattern(&mut project, Some("drums".to_string()), 32, 0.9).unwrap();
        assert_eq!(ack["pattern_id"], "drums");
        // Swing clamped to the maximum
        assert_eq!(project.pattern("drums").unwrap().swing, limits::SWING_MAX);
    }

    #[test]
    fn pattern_duplicate_id_conflicts() {
        let mut project = project_with_pattern();
        let err = create_pattern(&mut project, Some("p1".to_string()), 16, 0.0).unwrap_err();
        assert_eq!(err.code, ErrorCode::Conflict);
    }

    #[test]
    fn shrinking_pattern_drops_tail_steps() {
        let mut project = Project::new("Shrink");
        create_pattern(&mut project, Some("p".to_string()), 32, 0.0).unwrap();
        update_step(&mut project, "p", "Kick", 0, 1.0).unwrap();
        update_step(&mut project, "p", "Kick", 30, 1.0).unwrap();

        update_pattern(&mut project, "p", Some(16), None).unwrap();
        let pattern = project.pattern("p").unwrap();
        assert_eq!(pattern.length, 16);
        assert_eq!(pattern.steps.len(), 1);
    }

    #[test]
    fn zero_velocity_removes_step() {
        let mut project = project_with_pattern();
        update_step(&mut project, "p1", "OH", 7, 0.6).unwrap();
        assert_eq!(project.pattern("p1").unwrap().steps.len(), 1);
        update_step(&mut project, "p1", "OH", 7, 0.0).unwrap();
        assert!(project.pattern("p1").unwrap().steps.is_empty());
    }

    #[test]
    fn step_index_beyond_length_rejected() {
        let mut project = project_with_pattern();
        let err = update_step(&mut project, "p1", "Kick", 16, 1.0).unwrap_err();
        assert_eq!(err.code, ErrorCode::OutOfRange);
    }

    fn test_node(id: &str, track_id: u32) -> NodeInstance {
        NodeInstance {
            id: id.to_string(),
            node_type: stu_model::NodeType::VstEffect,
            plugin_uid: "internal:tracktion:reverb".to_string(),
            track_id,
            plugin_index: 0,
            bypassed: false,
            params: Default::default(),
            parameter_schema: vec![stu_model::ParameterSpec {
                id: "wet".to_string(),
                name: "Wet".to_string(),
                min: 0.0,
                max: 1.0,
                value: 0.3,
            }],
        }
    }

    #[test]
    fn node_insert_shifts_indices() {
        let mut project = Project::new("Nodes");
        insert_node(&mut project, test_node("a", 1), None).unwrap();
        insert_node(&mut project, test_node("b", 1), None).unwrap();
        // Insert at the front
        let index = insert_node(&mut project, test_node("c", 1), Some(0)).unwrap();
        assert_eq!(index, 0);

        let chain: Vec<&str> = project
            .track_chain(1)
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(chain, vec!["c", "a", "b"]);
        assert!(validate(&project).is_ok());
    }

    #[test]
    fn node_remove_renumbers_densely() {
        let mut project = Project::new("Remove");
        insert_node(&mut project, test_node("a", 1), None).unwrap();
        insert_node(&mut project, test_node("b", 1), None).unwrap();
        insert_node(&mut project, test_node("c", 1), None).unwrap();

        remove_node(&mut project, "b").unwrap();
        let chain = project.track_chain(1);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].plugin_index, 0);
        assert_eq!(chain[1].plugin_index, 1);
        assert!(validate(&project).is_ok());
    }

    #[test]
    fn chain_reorder_moves_slot() {
        let mut project = Project::new("ChainReorder");
        insert_node(&mut project, test_node("a", 1), None).unwrap();
        insert_node(&mut project, test_node("b", 1), None).unwrap();
        insert_node(&mut project, test_node("c", 1), None).unwrap();

        reorder_chain(&mut project, 1, 2, 0).unwrap();
        let chain: Vec<&str> = project
            .track_chain(1)
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(chain, vec!["c", "a", "b"]);
    }

    #[test]
    fn param_set_clamps_and_updates_schema() {
        let mut project = Project::new("Params");
        insert_node(&mut project, test_node("a", 1), None).unwrap();

        let (ack, index, value) = set_node_param(&mut project, "a", "wet", 1.7).unwrap();
        assert_eq!(ack["value"], 1.0);
        assert_eq!(index, 0);
        assert_eq!(value, 1.0);
        let node = project.node("a").unwrap();
        assert_eq!(node.params["wet"], 1.0);
        assert_eq!(node.parameter_schema[0].value, 1.0);
    }

    #[test]
    fn unknown_param_not_found() {
        let mut project = Project::new("NoParam");
        insert_node(&mut project, test_node("a", 1), None).unwrap();
        let err = set_node_param(&mut project, "a", "space", 0.5).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[test]
    fn view_update_clamps_bars() {
        let mut project = Project::new("View");
        let ack = update_view(&mut project, Some(4), None, None, Some(true)).unwrap();
        assert_eq!(ack["playlist_view_bars"], 8);
        assert_eq!(ack["metronome_enabled"], true);

        let ack = update_view(&mut project, Some(10_000), None, None, None).unwrap();
        assert_eq!(ack["playlist_view_bars"], 4096);
    }
}
