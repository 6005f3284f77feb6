//! Serialization round-trip scenarios for the project document

use pretty_assertions::assert_eq;
use stu_model::{
    load_project, save_project, validate, AudioSource, Clip, ClipContent, NodeInstance, NodeType,
    ParameterSpec, Pattern, Project,
};

fn save_and_load(project: &Project, dir: &tempfile::TempDir) -> Project {
    let path = dir.path().join("roundtrip.stu");
    save_project(project, &path).unwrap();
    load_project(&path).unwrap().project
}

#[test]
fn custom_pattern_and_clip_survive_round_trip() {
    let dir = tempfile::tempdir().unwrap();

    let mut project = Project::new("Roundtrip Session");
    let mut pattern = Pattern::new("drum_custom", 16);
    pattern.swing = 0.2;
    pattern.set_step("Kick", 0, 1.0);
    pattern.set_step("OH", 7, 0.6);
    project.patterns.push(pattern.clone());
    let clip = Clip::pattern("clip_custom", 1.25, 0.75, "drum_custom");
    project.playlist[0].clips.push(clip.clone());

    let loaded = save_and_load(&project, &dir);

    assert_eq!(loaded.pattern("drum_custom"), Some(&pattern));
    assert_eq!(loaded.playlist[0].clips[0], clip);
}

#[test]
fn legacy_project_upgrades_pattern_reference() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.stu");

    let legacy = serde_json::json!({
        "project_name": "Legacy Session",
        "bpm": 120,
        "playlist": [
            {
                "track_id": 1,
                "name": "Track 1",
                "clips": [{"start": 0, "length": 4, "pattern": "midi_legacy_1"}]
            }
        ]
    });
    std::fs::write(&path, serde_json::to_string_pretty(&legacy).unwrap()).unwrap();

    let loaded = load_project(&path).unwrap().project;

    assert_eq!(loaded.title, "Legacy Session");
    assert!(loaded.patterns.iter().any(|p| p.id == "midi_legacy_1"));

    let clip = &loaded.playlist[0].clips[0];
    assert_eq!(clip.pattern_id(), Some("midi_legacy_1"));
    assert!(!clip.id.is_empty(), "upgraded clip gets a generated id");
}

#[test]
fn invalid_audio_analysis_fails_validation_with_both_fields() {
    let mut project = Project::new("Invalid Audio");
    project.playlist[0].clips.push(Clip::audio(
        "bad_audio",
        0.0,
        2.0,
        AudioSource {
            source_name: "broken.wav".to_string(),
            source_format: "wav".to_string(),
            source_mime: None,
            source_path: "media/broken.wav".to_string(),
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
fn unknown_pattern_reference_fails_validation() {
    let mut project = Project::new("Unknown Ref");
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
fn vst_node_round_trip_preserves_identity() {
    let dir = tempfile::tempdir().unwrap();

    let mut project = Project::new("VST Session");
    // Dense chain on track 3: slot 0 then the instrument under test at slot 1
    project.nodes.push(NodeInstance {
        id: "node_fx".to_string(),
        node_type: NodeType::VstEffect,
        plugin_uid: "internal:tracktion:reverb".to_string(),
        track_id: 3,
        plugin_index: 0,
        bypassed: false,
        params: Default::default(),
        parameter_schema: Vec::new(),
    });
    let mut params = std::collections::BTreeMap::new();
    params.insert("cutoff".to_string(), 0.42);
    params.insert("resonance".to_string(), 0.31);
    let node = NodeInstance {
        id: "node_synth".to_string(),
        node_type: NodeType::VstInstrument,
        plugin_uid: "internal:ultrasound".to_string(),
        track_id: 3,
        plugin_index: 1,
        bypassed: true,
        params,
        parameter_schema: vec![
            ParameterSpec {
                id: "cutoff".to_string(),
                name: "Cutoff".to_string(),
                min: 20.0,
                max: 20_000.0,
                value: 0.42,
            },
            ParameterSpec {
                id: "resonance".to_string(),
                name: "Resonance".to_string(),
                min: 0.0,
                max: 1.0,
                value: 0.31,
            },
        ],
    };
    project.nodes.push(node.clone());

    let loaded = save_and_load(&project, &dir);

    assert_eq!(loaded.node("node_synth"), Some(&node));
}

#[test]
fn serialized_form_uses_wire_field_names() {
    let mut project = Project::new("Wire Names");
    project.playlist[0]
        .clips
        .push(Clip::pattern("c1", 0.0, 1.0, "p1"));
    project.patterns.push(Pattern::new("p1", 16));
    project.nodes.push(NodeInstance {
        id: "n1".to_string(),
        node_type: NodeType::VstInstrument,
        plugin_uid: "internal:ultrasound".to_string(),
        track_id: 1,
        plugin_index: 0,
        bypassed: false,
        params: Default::default(),
        parameter_schema: Vec::new(),
    });

    let json = serde_json::to_value(&project).unwrap();
    assert!(json.get("title").is_some());
    assert!(json.get("playlist").is_some());
    assert_eq!(json["playlist"][0]["clips"][0]["type"], "pattern");
    assert_eq!(json["nodes"][0]["type"], "vst_instrument");
    assert_eq!(json["time_signature"]["numerator"], 4);
}

#[test]
fn clip_content_tags_match_catalog() {
    let pattern: ClipContent = serde_json::from_value(serde_json::json!({
        "type": "pattern", "pattern_id": "p"
    }))
    .unwrap();
    assert!(matches!(pattern, ClipContent::Pattern { .. }));

    let midi: ClipContent = serde_json::from_value(serde_json::json!({
        "type": "midi",
        "source_name": "riff.mid",
        "source_format": "mid",
        "source_path": "media/riff.mid"
    }))
    .unwrap();
    assert!(matches!(midi, ClipContent::Midi { .. }));
}
