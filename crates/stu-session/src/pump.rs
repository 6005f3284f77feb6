//! Transport and meter event pump
//!
//! A periodic task bridging the engine's lock-free taps onto the broadcast
//! channel: meters at a target 30 Hz, transport ticks throttled to at
//! least 120 ms apart while playing. Also ticks the engine's reclamation
//! (retired graphs, trashed processors) so nothing leaks while idle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

use stu_audio::AudioEngine;
use stu_proto::{ServerEvent, TrackMeter, TransportEvent};

use crate::orchestrator::TempoInfo;

/// Meter cadence target (~30 Hz)
pub const METER_INTERVAL: Duration = Duration::from_millis(33);
/// Minimum spacing of transport events while playing
pub const TRANSPORT_INTERVAL: Duration = Duration::from_millis(120);

/// Spawn the pump; it exits when the event channel has no senders left
/// elsewhere, i.e. when aborted at shutdown.
pub fn spawn(
    engine: Arc<AudioEngine>,
    events: broadcast::Sender<ServerEvent>,
    tempo: watch::Receiver<TempoInfo>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(METER_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut last_transport = Instant::now() - TRANSPORT_INTERVAL;
        let mut was_playing = false;
        let mut tick_count: u64 = 0;

        loop {
            ticker.tick().await;
            tick_count += 1;

            engine.reclaim();

            // Meters: freshest frame only, dropped when nobody listens
            if let Some(frame) = engine.latest_meters() {
                if events.receiver_count() > 0 {
                    let meters: Vec<TrackMeter> = frame
                        .lanes()
                        .iter()
                        .map(|lane| TrackMeter {
                            track_id: lane.track_id,
                            peak: f64::from(lane.peak),
                            rms: f64::from(lane.rms),
                        })
                        .collect();
                    let _ = events.send(ServerEvent::Meter { meters });
                }
            }

            // Spectrum at ~half the meter rate; polling also drains the
            // analyzer ring while idle
            let magnitudes = engine.spectrum();
            if tick_count % 2 == 0
                && events.receiver_count() > 0
                && magnitudes.iter().any(|&m| m > 0.0)
            {
                let _ = events.send(ServerEvent::Spectrum {
                    magnitudes: magnitudes.to_vec(),
                });
            }

            // Transport: throttled while playing, immediate on edges
            let transport = engine.transport();
            let playing = transport.is_playing();
            let state_changed = playing != was_playing;
            was_playing = playing;

            let due = last_transport.elapsed() >= TRANSPORT_INTERVAL;
            if (playing && due) || state_changed {
                last_transport = Instant::now();
                let info = *tempo.borrow();
                let event = transport_event(
                    transport.position_beats(),
                    playing,
                    transport.is_recording(),
                    info,
                );
                let _ = events.send(ServerEvent::Transport(event));
            }
        }
    })
}

/// Derive the musical position fields from beats and tempo
pub fn transport_event(
    position_beats: f64,
    playing: bool,
    recording: bool,
    tempo: TempoInfo,
) -> TransportEvent {
    let beats_per_bar = tempo.beats_per_bar.max(f64::EPSILON);
    let position_bars = position_beats / beats_per_bar;

    let bar = position_bars.floor() as u32 + 1;
    let beat_in_bar = position_beats.rem_euclid(beats_per_bar);
    let beat = beat_in_bar.floor() as u32 + 1;
    let step = ((beat_in_bar.fract() * 4.0).floor() as u32).min(3) + 1;
    let step_index = (position_beats * 4.0).floor().max(0.0) as u64;

    TransportEvent {
        playing,
        recording,
        bar,
        beat,
        step,
        step_index,
        position_bars,
        position_beats,
        timestamp: chrono::Utc::now().timestamp_millis().max(0) as u64,
    }
}
