//! Gateway request handling against a live session

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use stu_audio::{AudioEngine, EngineConfig, OutputConfig};
use stu_config::DataPaths;
use stu_plugins::PluginHost;
use stu_session::SessionHandle;

struct Fixture {
    session: SessionHandle,
    _dir: tempfile::TempDir,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let paths = DataPaths::under(dir.path());
    paths.ensure().unwrap();

    let config = EngineConfig {
        output: OutputConfig::default(),
        initial_bpm: 120,
        spill_dir: dir.path().join("spill"),
        allow_null_device: true,
    };
    let (engine, renderer) = AudioEngine::build(config);
    let output = stu_audio::device::start_null_output(&OutputConfig::default(), renderer);
    std::mem::forget(output);

    let (session, _join) = stu_session::spawn(
        engine,
        PluginHost::spawn(),
        &paths,
        "Gateway Test",
    );

    Fixture {
        session,
        _dir: dir,
    }
}

fn wav_bytes() -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 48_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..4800 {
            let t = i as f32 / 48_000.0;
            writer
                .write_sample(((t * 440.0).sin() * 0.5 * i16::MAX as f32) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn upload_accepts_wav_and_reports_analysis() {
    let fixture = fixture().await;
    let app = stu_gateway::router(fixture.session.clone(), 3630);

    let response = app
        .oneshot(
            Request::post("/media/upload?filename=beat.wav")
                .header("content-type", "audio/wav")
                .body(Body::from(wav_bytes()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["ok"], true);
    assert!(body["path"].as_str().unwrap().contains("beat.wav"));
    assert!(body["duration_sec"].as_f64().unwrap() > 0.09);
    assert!(!body["waveform_peaks"].as_array().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn upload_rejects_unknown_extension() {
    let fixture = fixture().await;
    let app = stu_gateway::router(fixture.session.clone(), 3630);

    let response = app
        .oneshot(
            Request::post("/media/upload?filename=notes.txt")
                .body(Body::from("hello"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "unsupported_format");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn frames_are_acked_with_correlation_ids() {
    let fixture = fixture().await;
    let in_flight = Arc::new(Mutex::new(HashSet::new()));

    let ack = stu_gateway::handle_frame(
        &fixture.session,
        &in_flight,
        r#"{"event":"track.create","payload":{"name":"Lead"},"correlationId":"req-1"}"#,
    )
    .await;
    assert!(ack.ok);
    assert_eq!(ack.correlation_id.as_deref(), Some("req-1"));
    assert_eq!(ack.data["track_id"], 5);

    // Failing request carries code and message
    let ack = stu_gateway::handle_frame(
        &fixture.session,
        &in_flight,
        r#"{"event":"track.delete","payload":{"track_id":99},"correlationId":"req-2"}"#,
    )
    .await;
    assert!(!ack.ok);
    assert_eq!(ack.error.as_deref(), Some("not_found"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn malformed_and_unknown_frames_are_invalid_requests() {
    let fixture = fixture().await;
    let in_flight = Arc::new(Mutex::new(HashSet::new()));

    let ack = stu_gateway::handle_frame(&fixture.session, &in_flight, "{broken").await;
    assert!(!ack.ok);
    assert_eq!(ack.error.as_deref(), Some("invalid_request"));

    let ack = stu_gateway::handle_frame(
        &fixture.session,
        &in_flight,
        r#"{"event":"warp.core","payload":{}}"#,
    )
    .await;
    assert!(!ack.ok);
    assert_eq!(ack.error.as_deref(), Some("invalid_request"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_in_flight_correlation_id_is_rejected() {
    let fixture = fixture().await;
    let in_flight: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));

    // Simulate an already in-flight id
    in_flight.lock().unwrap().insert("busy".to_string());

    let ack = stu_gateway::handle_frame(
        &fixture.session,
        &in_flight,
        r#"{"event":"transport.play","payload":{},"correlationId":"busy"}"#,
    )
    .await;
    assert!(!ack.ok);
    assert_eq!(ack.error.as_deref(), Some("invalid_request"));
    assert!(ack.message.unwrap().contains("in flight"));

    // Once cleared, the id works again
    in_flight.lock().unwrap().remove("busy");
    let ack = stu_gateway::handle_frame(
        &fixture.session,
        &in_flight,
        r#"{"event":"transport.stop","payload":{},"correlationId":"busy"}"#,
    )
    .await;
    assert!(ack.ok);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn uploaded_media_can_be_imported_via_frame() {
    let fixture = fixture().await;
    let in_flight = Arc::new(Mutex::new(HashSet::new()));

    let upload = fixture
        .session
        .upload_media("clip.wav".to_string(), wav_bytes())
        .await
        .unwrap();

    let frame = serde_json::json!({
        "event": "clip.import_file",
        "payload": {
            "track_id": 1,
            "path": upload.path,
            "start": 0.0,
            "grid_step": 0.25,
        },
        "correlationId": "import-1",
    });
    let ack = stu_gateway::handle_frame(&fixture.session, &in_flight, &frame.to_string()).await;
    assert!(ack.ok, "import failed: {:?}", ack.message);
    assert!(ack.data["clip_id"].as_str().is_some());
}
