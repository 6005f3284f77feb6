//! Server -> client event catalog and acknowledgment envelope
//!
//! Events are pushed without correlation; acks answer exactly one client
//! frame and echo its correlation id. The project snapshot rides inside
//! `engine:state` as the full serialized document.

use serde::{Deserialize, Serialize};
use stu_model::Project;

use crate::error::WireError;

/// Events emitted on the control channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum ServerEvent {
    /// First frame after accept
    #[serde(rename = "engine:ready")]
    Ready {
        #[serde(rename = "enginePort")]
        engine_port: u16,
    },

    /// Full project snapshot; never dropped
    #[serde(rename = "engine:state")]
    State { project: Project },

    /// Transport tick, throttled to >= 120 ms while playing
    #[serde(rename = "engine:transport")]
    Transport(TransportEvent),

    /// Per-track meters, <= 30 Hz, dropped under backpressure
    #[serde(rename = "engine:meter")]
    Meter { meters: Vec<TrackMeter> },

    /// Master-bus analyzer magnitudes, log-spaced bands in [0, 1];
    /// lossy like meters
    #[serde(rename = "engine:spectrum")]
    Spectrum { magnitudes: Vec<f32> },

    /// Non-fatal condition worth showing the user (e.g. project fallback)
    #[serde(rename = "engine:warning")]
    Warning { message: String },
}

/// Transport position snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportEvent {
    pub playing: bool,
    pub recording: bool,
    /// 1-based bar number
    pub bar: u32,
    /// 1-based beat within the bar
    pub beat: u32,
    /// 1-based step within the beat (1/16 grid)
    pub step: u32,
    /// 0-based step since the start of the arrangement
    #[serde(rename = "stepIndex")]
    pub step_index: u64,
    #[serde(rename = "positionBars")]
    pub position_bars: f64,
    #[serde(rename = "positionBeats")]
    pub position_beats: f64,
    /// Milliseconds since the unix epoch at emit time
    pub timestamp: u64,
}

/// One track's meter sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMeter {
    #[serde(rename = "trackId")]
    pub track_id: u32,
    pub peak: f64,
    pub rms: f64,
}

/// Acknowledgment for one correlated request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(rename = "correlationId", skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Operation-specific result fields, flattened into the ack object
    #[serde(flatten, default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl Ack {
    pub fn ok(correlation_id: Option<String>) -> Self {
        Self {
            correlation_id,
            ok: true,
            error: None,
            message: None,
            data: serde_json::Map::new(),
        }
    }

    pub fn ok_with(correlation_id: Option<String>, data: serde_json::Value) -> Self {
        let data = match data {
            serde_json::Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("result".to_string(), other);
                map
            }
        };
        Self {
            correlation_id,
            ok: true,
            error: None,
            message: None,
            data,
        }
    }

    pub fn err(correlation_id: Option<String>, error: &WireError) -> Self {
        Self {
            correlation_id,
            ok: false,
            error: Some(error.code.as_str().to_string()),
            message: Some(error.message.clone()),
            data: serde_json::Map::new(),
        }
    }
}
