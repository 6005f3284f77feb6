//! Media uploads and import analysis
//!
//! Uploaded files land in the managed `media/` directory under a
//! collision-free name. Audio formats get duration plus a peak envelope at
//! upload time; MIDI files get duration from their tempo map. Analysis is
//! blocking work and must run on a blocking pool, never on the session
//! worker.

use std::path::{Path, PathBuf};

use stu_audio::decode::decode_file;
use stu_proto::{is_supported_extension, UploadResponse, WireError, MIDI_EXTENSIONS};

/// Peak envelope resolution for imported clips
pub const WAVEFORM_BUCKETS: usize = 512;

/// What import analysis learned about a file
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAnalysis {
    pub duration_sec: Option<f64>,
    pub waveform_peaks: Option<Vec<f64>>,
    pub is_midi: bool,
}

/// Handles the managed media directory; cheap to clone
#[derive(Debug, Clone)]
pub struct MediaStore {
    media_dir: PathBuf,
}

impl MediaStore {
    pub fn new(media_dir: impl Into<PathBuf>) -> Self {
        Self {
            media_dir: media_dir.into(),
        }
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    /// Store an upload and analyze it. Blocking; call via `spawn_blocking`.
    pub fn store_upload(&self, filename: &str, bytes: &[u8]) -> Result<UploadResponse, WireError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        if !is_supported_extension(&extension) {
            return Err(WireError::unsupported_format(format!(
                "unsupported media extension {:?}",
                extension
            )));
        }

        std::fs::create_dir_all(&self.media_dir).map_err(WireError::io)?;
        let path = self.unique_path(filename);
        std::fs::write(&path, bytes).map_err(WireError::io)?;

        let analysis = analyze_file(&path);
        tracing::info!(
            media.file = %path.display(),
            media.size = bytes.len(),
            media.duration = ?analysis.duration_sec,
            "media uploaded"
        );

        Ok(UploadResponse {
            ok: true,
            path: path.to_string_lossy().into_owned(),
            size: bytes.len() as u64,
            duration_sec: analysis.duration_sec,
            waveform_peaks: analysis.waveform_peaks,
        })
    }

    /// Is this path inside the managed media directory?
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.media_dir)
    }

    /// Copy a file (e.g. a recording spill) into the media directory
    pub fn adopt(&self, source: &Path) -> Result<PathBuf, WireError> {
        std::fs::create_dir_all(&self.media_dir).map_err(WireError::io)?;
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("take.wav");
        let target = self.unique_path(name);
        std::fs::copy(source, &target).map_err(WireError::io)?;
        Ok(target)
    }

    fn unique_path(&self, filename: &str) -> PathBuf {
        let candidate = self.media_dir.join(sanitize(filename));
        if !candidate.exists() {
            return candidate;
        }
        let stem = candidate
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("upload")
            .to_string();
        let ext = candidate
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_string();
        for n in 1.. {
            let next = self.media_dir.join(if ext.is_empty() {
                format!("{}_{}", stem, n)
            } else {
                format!("{}_{}.{}", stem, n, ext)
            });
            if !next.exists() {
                return next;
            }
        }
        unreachable!()
    }
}

fn sanitize(filename: &str) -> String {
    let name: String = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() {
        "upload".to_string()
    } else {
        name
    }
}

/// Analyze a media file on disk
pub fn analyze_file(path: &Path) -> MediaAnalysis {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    if MIDI_EXTENSIONS.contains(&extension.as_str()) {
        let duration = std::fs::read(path)
            .ok()
            .and_then(|bytes| midi_duration_seconds(&bytes));
        return MediaAnalysis {
            duration_sec: duration,
            waveform_peaks: None,
            is_midi: true,
        };
    }

    match decode_file(path) {
        Ok(decoded) => MediaAnalysis {
            duration_sec: Some(decoded.duration_seconds()),
            waveform_peaks: Some(decoded.peak_envelope(WAVEFORM_BUCKETS)),
            is_midi: false,
        },
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "media analysis failed");
            MediaAnalysis {
                duration_sec: None,
                waveform_peaks: None,
                is_midi: false,
            }
        }
    }
}

/// Duration of a standard MIDI file, honoring tempo changes
pub fn midi_duration_seconds(bytes: &[u8]) -> Option<f64> {
    let smf = midly::Smf::parse(bytes).ok()?;

    let ticks_per_beat = match smf.header.timing {
        midly::Timing::Metrical(tpb) => f64::from(tpb.as_int()),
        // SMPTE timing: fixed frames per second
        midly::Timing::Timecode(fps, subframes) => {
            let ticks_per_second = fps.as_f32() as f64 * f64::from(subframes);
            let max_ticks = smf
                .tracks
                .iter()
                .map(|track| {
                    track
                        .iter()
                        .map(|e| u64::from(e.delta.as_int()))
                        .sum::<u64>()
                })
                .max()
                .unwrap_or(0);
            return Some(max_ticks as f64 / ticks_per_second);
        }
    };

    // Merge tempo changes across tracks by absolute tick
    let mut tempo_changes: Vec<(u64, f64)> = Vec::new(); // (tick, us per beat)
    let mut max_ticks = 0u64;
    for track in &smf.tracks {
        let mut tick = 0u64;
        for event in track {
            tick += u64::from(event.delta.as_int());
            if let midly::TrackEventKind::Meta(midly::MetaMessage::Tempo(us)) = event.kind {
                tempo_changes.push((tick, f64::from(us.as_int())));
            }
        }
        max_ticks = max_ticks.max(tick);
    }
    tempo_changes.sort_by_key(|(tick, _)| *tick);

    let mut seconds = 0.0;
    let mut current_tick = 0u64;
    let mut current_tempo = 500_000.0; // default 120 BPM
    for (tick, tempo) in tempo_changes {
        let tick = tick.min(max_ticks);
        seconds += (tick - current_tick) as f64 / ticks_per_beat * current_tempo / 1_000_000.0;
        current_tick = tick;
        current_tempo = tempo;
    }
    seconds += (max_ticks - current_tick) as f64 / ticks_per_beat * current_tempo / 1_000_000.0;

    Some(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(frames: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                let t = i as f32 / 48_000.0;
                let s = (t * 220.0 * std::f32::consts::TAU).sin() * 0.8;
                writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn wav_upload_is_analyzed() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path().join("media"));

        let response = store.store_upload("loop one.wav", &wav_bytes(24_000)).unwrap();
        assert!(response.ok);
        assert!(response.path.contains("loop_one.wav"));
        assert!((response.duration_sec.unwrap() - 0.5).abs() < 1e-6);

        let peaks = response.waveform_peaks.unwrap();
        assert!(!peaks.is_empty());
        assert!(peaks.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn unsupported_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let err = store.store_upload("virus.exe", b"MZ").unwrap_err();
        assert_eq!(err.code, stu_proto::ErrorCode::UnsupportedFormat);
    }

    #[test]
    fn second_upload_with_same_name_is_renamed() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let first = store.store_upload("kick.wav", &wav_bytes(480)).unwrap();
        let second = store.store_upload("kick.wav", &wav_bytes(480)).unwrap();
        assert_ne!(first.path, second.path);
        assert!(Path::new(&second.path).exists());
    }

    #[test]
    fn midi_upload_gets_duration_only() {
        // Minimal SMF: one track, 480 tpb, one note spanning 960 ticks
        let mut smf = midly::Smf::new(midly::Header::new(
            midly::Format::SingleTrack,
            midly::Timing::Metrical(480.into()),
        ));
        let mut track = Vec::new();
        track.push(midly::TrackEvent {
            delta: 0.into(),
            kind: midly::TrackEventKind::Midi {
                channel: 0.into(),
                message: midly::MidiMessage::NoteOn {
                    key: 60.into(),
                    vel: 100.into(),
                },
            },
        });
        track.push(midly::TrackEvent {
            delta: 960.into(),
            kind: midly::TrackEventKind::Midi {
                channel: 0.into(),
                message: midly::MidiMessage::NoteOff {
                    key: 60.into(),
                    vel: 0.into(),
                },
            },
        });
        track.push(midly::TrackEvent {
            delta: 0.into(),
            kind: midly::TrackEventKind::Meta(midly::MetaMessage::EndOfTrack),
        });
        smf.tracks.push(track);
        let mut bytes = Vec::new();
        smf.write(&mut bytes).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let response = store.store_upload("riff.mid", &bytes).unwrap();

        // 960 ticks at 480 tpb = 2 beats at default 120 BPM = 1 s
        assert!((response.duration_sec.unwrap() - 1.0).abs() < 1e-9);
        assert!(response.waveform_peaks.is_none());
    }

    #[test]
    fn contains_guards_media_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path().join("media"));
        assert!(store.contains(&dir.path().join("media/kick.wav")));
        assert!(!store.contains(Path::new("/etc/passwd")));
    }
}
