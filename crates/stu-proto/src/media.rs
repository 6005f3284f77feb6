//! Media upload response body

use serde::{Deserialize, Serialize};

/// Extensions the upload endpoint accepts
pub const AUDIO_EXTENSIONS: [&str; 6] = ["wav", "flac", "mp3", "ogg", "aac", "aiff"];
pub const MIDI_EXTENSIONS: [&str; 2] = ["mid", "midi"];

/// Is this file extension importable?
pub fn is_supported_extension(ext: &str) -> bool {
    let lower = ext.to_ascii_lowercase();
    AUDIO_EXTENSIONS.contains(&lower.as_str()) || MIDI_EXTENSIONS.contains(&lower.as_str())
}

/// Success body of `POST /media/upload`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub ok: bool,
    /// Engine-managed path for later `clip.import_file`
    pub path: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waveform_peaks: Option<Vec<f64>>,
}
