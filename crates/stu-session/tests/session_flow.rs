//! End-to-end orchestrator flows against a headless engine

use std::sync::Arc;
use std::time::Duration;

use stu_audio::{AudioEngine, EngineConfig, OutputConfig};
use stu_config::DataPaths;
use stu_plugins::PluginHost;
use stu_proto::{ClientRequest, ErrorCode, ServerEvent};
use stu_session::SessionHandle;

struct Fixture {
    handle: SessionHandle,
    engine: Arc<AudioEngine>,
    _dir: tempfile::TempDir,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let paths = DataPaths::under(dir.path());
    paths.ensure().unwrap();

    let config = EngineConfig {
        output: OutputConfig {
            device_name: None,
            sample_rate: 48_000,
            block_size: 256,
        },
        initial_bpm: 120,
        spill_dir: dir.path().join("spill"),
        allow_null_device: true,
    };
    let (engine, renderer) = AudioEngine::build(config);
    // Headless: drive the renderer with the null output
    let output = stu_audio::device::start_null_output(
        &OutputConfig {
            device_name: None,
            sample_rate: 48_000,
            block_size: 256,
        },
        renderer,
    );
    std::mem::forget(output); // keep rendering until the process ends

    let (handle, _join) = stu_session::spawn(
        engine.clone(),
        PluginHost::spawn(),
        &paths,
        "Session Test",
    );

    Fixture {
        handle,
        engine,
        _dir: dir,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transport_advances_about_two_beats_per_second() {
    let fixture = fixture().await;

    fixture
        .handle
        .request(ClientRequest::TransportPlay {})
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1000)).await;

    let beats = fixture.engine.transport().position_beats();
    assert!(
        (1.95..=2.05).contains(&beats),
        "position {} should be near 2 beats after 1 s at 120 BPM",
        beats
    );
    let bars = beats / 4.0;
    assert!((bars - beats / 4.0).abs() < 1e-12);

    // Idempotent play while playing
    fixture
        .handle
        .request(ClientRequest::TransportPlay {})
        .await
        .unwrap();
    assert!(fixture.engine.transport().is_playing());

    fixture
        .handle
        .request(ClientRequest::TransportStop {})
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fixture.engine.transport().position_beats(), 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bpm_clamps_to_valid_range() {
    let fixture = fixture().await;

    let ack = fixture
        .handle
        .request(ClientRequest::TransportSetBpm { bpm: 19 })
        .await
        .unwrap();
    assert_eq!(ack["bpm"], 20);

    let ack = fixture
        .handle
        .request(ClientRequest::TransportSetBpm { bpm: 301 })
        .await
        .unwrap();
    assert_eq!(ack["bpm"], 300);

    let project = fixture.handle.snapshot().await.unwrap();
    assert_eq!(project.bpm, 300);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mutations_broadcast_consistent_snapshots() {
    let fixture = fixture().await;
    let mut events = fixture.handle.subscribe();

    let ack = fixture
        .handle
        .request(ClientRequest::TrackCreate {
            name: Some("Keys".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(ack["track_id"], 5);

    // The broadcast following the ack reflects the mutation
    let event = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Ok(ServerEvent::State { project }) = events.recv().await {
                return project;
            }
        }
    })
    .await
    .expect("state broadcast");
    assert_eq!(event.playlist.len(), 5);
    assert_eq!(event.playlist[4].name, "Keys");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_mutation_leaves_project_untouched() {
    let fixture = fixture().await;

    let before = fixture.handle.snapshot().await.unwrap();
    let err = fixture
        .handle
        .request(ClientRequest::ClipCreate {
            track_id: 1,
            pattern_id: "missing_pattern".to_string(),
            start: 0.0,
            length: 1.0,
            grid_step: 0.25,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);

    let after = fixture.handle.snapshot().await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pattern_clip_round_trip_through_operations() {
    let fixture = fixture().await;

    fixture
        .handle
        .request(ClientRequest::PatternCreate {
            id: Some("drum_custom".to_string()),
            length: 16,
            swing: 0.2,
        })
        .await
        .unwrap();
    fixture
        .handle
        .request(ClientRequest::PatternUpdateStep {
            pattern_id: "drum_custom".to_string(),
            lane: "Kick".to_string(),
            index: 0,
            velocity: 1.0,
        })
        .await
        .unwrap();

    let ack = fixture
        .handle
        .request(ClientRequest::ClipCreate {
            track_id: 1,
            pattern_id: "drum_custom".to_string(),
            start: 1.25,
            length: 0.75,
            grid_step: 0.25,
        })
        .await
        .unwrap();
    let clip_id = ack["clip_id"].as_str().unwrap().to_string();

    // Save then verify the document persisted in normalized form
    let ack = fixture
        .handle
        .request(ClientRequest::ProjectSave {})
        .await
        .unwrap();
    let path = std::path::PathBuf::from(ack["path"].as_str().unwrap());
    let loaded = stu_model::load_project(&path).unwrap().project;

    let (_, clip) = loaded.clip(&clip_id).expect("clip persisted");
    assert_eq!(clip.start, 1.25);
    assert_eq!(clip.length, 0.75);
    assert_eq!(clip.pattern_id(), Some("drum_custom"));
    assert_eq!(loaded.pattern("drum_custom").unwrap().swing, 0.2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn vst_add_remove_lifecycle() {
    let fixture = fixture().await;

    let ack = fixture
        .handle
        .request(ClientRequest::VstAdd {
            track_id: 3,
            plugin_uid: "internal:ultrasound".to_string(),
            insert_index: None,
        })
        .await
        .unwrap();
    let node_id = ack["node_id"].as_str().unwrap().to_string();
    assert_eq!(ack["plugin_index"], 0);
    assert!(!ack["parameters"].as_array().unwrap().is_empty());

    let ack = fixture
        .handle
        .request(ClientRequest::VstParamSet {
            node_id: node_id.clone(),
            param_id: "cutoff".to_string(),
            value: 0.42,
        })
        .await
        .unwrap();
    assert_eq!(ack["value"], 0.42);

    let project = fixture.handle.snapshot().await.unwrap();
    let node = project.node(&node_id).unwrap();
    assert_eq!(node.params["cutoff"], 0.42);
    assert_eq!(node.track_id, 3);

    fixture
        .handle
        .request(ClientRequest::VstRemove {
            node_id: node_id.clone(),
        })
        .await
        .unwrap();
    let project = fixture.handle.snapshot().await.unwrap();
    assert!(project.node(&node_id).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unknown_plugin_is_not_found() {
    let fixture = fixture().await;
    let err = fixture
        .handle
        .request(ClientRequest::VstAdd {
            track_id: 1,
            plugin_uid: "internal:does_not_exist".to_string(),
            insert_index: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn media_upload_and_import() {
    let fixture = fixture().await;

    // Build a 0.5 s wav in memory
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 48_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..24_000 {
            let t = i as f32 / 48_000.0;
            let s = ((t * 330.0 * std::f32::consts::TAU).sin() * 0.6 * i16::MAX as f32) as i16;
            writer.write_sample(s).unwrap();
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    let upload = fixture
        .handle
        .upload_media("groove.wav".to_string(), cursor.into_inner())
        .await
        .unwrap();
    assert!(upload.ok);
    assert!((upload.duration_sec.unwrap() - 0.5).abs() < 1e-6);

    let ack = fixture
        .handle
        .request(ClientRequest::ClipImportFile {
            track_id: 2,
            path: upload.path.clone(),
            start: 4.0,
            grid_step: 0.25,
        })
        .await
        .unwrap();
    let clip_id = ack["clip_id"].as_str().unwrap().to_string();

    let project = fixture.handle.snapshot().await.unwrap();
    let (track, clip) = project.clip(&clip_id).unwrap();
    assert_eq!(track.track_id, 2);
    match &clip.content {
        stu_model::ClipContent::Audio { source } => {
            assert_eq!(source.source_path, upload.path);
            assert!(!source.waveform_peaks.is_empty());
        }
        other => panic!("expected audio clip, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn import_outside_media_dir_is_rejected() {
    let fixture = fixture().await;
    let err = fixture
        .handle
        .request(ClientRequest::ClipImportFile {
            track_id: 1,
            path: "/etc/passwd".to_string(),
            start: 0.0,
            grid_step: 0.25,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidRequest);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn recording_creates_audio_clips_on_armed_tracks() {
    let fixture = fixture().await;

    // A pattern on track 1 so the recording captures something
    fixture
        .handle
        .request(ClientRequest::PatternCreate {
            id: Some("beat".to_string()),
            length: 16,
            swing: 0.0,
        })
        .await
        .unwrap();
    fixture
        .handle
        .request(ClientRequest::PatternUpdateStep {
            pattern_id: "beat".to_string(),
            lane: "Kick".to_string(),
            index: 0,
            velocity: 1.0,
        })
        .await
        .unwrap();
    fixture
        .handle
        .request(ClientRequest::ClipCreate {
            track_id: 1,
            pattern_id: "beat".to_string(),
            start: 0.0,
            length: 8.0,
            grid_step: 0.25,
        })
        .await
        .unwrap();
    fixture
        .handle
        .request(ClientRequest::TrackSetRecordArm {
            track_id: 1,
            armed: true,
        })
        .await
        .unwrap();

    fixture
        .handle
        .request(ClientRequest::TransportPlay {})
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(fixture.engine.transport().is_recording());

    let ack = fixture
        .handle
        .request(ClientRequest::TransportStop {})
        .await
        .unwrap();
    assert_eq!(ack["takes"], 1);

    let project = fixture.handle.snapshot().await.unwrap();
    let audio_clips: Vec<_> = project.playlist[0]
        .clips
        .iter()
        .filter(|c| matches!(c.content, stu_model::ClipContent::Audio { .. }))
        .collect();
    assert_eq!(audio_clips.len(), 1);
    assert!(audio_clips[0].length > 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dense_track_ids_after_every_mutation() {
    let fixture = fixture().await;

    fixture
        .handle
        .request(ClientRequest::TrackCreate { name: None })
        .await
        .unwrap();
    fixture
        .handle
        .request(ClientRequest::TrackDelete { track_id: 2 })
        .await
        .unwrap();
    fixture
        .handle
        .request(ClientRequest::TrackReorder {
            track_id: 1,
            to_index: 2,
        })
        .await
        .unwrap();

    let project = fixture.handle.snapshot().await.unwrap();
    for (index, track) in project.playlist.iter().enumerate() {
        assert_eq!(track.track_id, index as u32 + 1);
    }
    assert_eq!(project.mixer.len(), project.playlist.len());
    assert!(stu_model::validate(&project).is_ok());
}
