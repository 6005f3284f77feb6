//! Recording spill path
//!
//! While recording, the callback copies each armed track's input region
//! into a per-track SPSC ring. A dedicated drain thread writes the rings to
//! WAV spill files; the callback never touches a file. On stop, the spill
//! files are finalized and the engine reports one take per armed track.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};

/// Ring capacity per armed track: ~2 s of stereo at 48 kHz
const TAP_CAPACITY: usize = 48_000 * 2 * 2;

/// Audio-thread half of one armed track's capture
pub struct RecordTap {
    pub track_id: u32,
    pub producer: rtrb::Producer<f32>,
}

impl RecordTap {
    /// Copy an interleaved region into the ring; overruns are dropped
    #[inline]
    pub fn capture(&mut self, samples: &[f32]) {
        for &sample in samples {
            if self.producer.push(sample).is_err() {
                return;
            }
        }
    }
}

struct ActiveSpill {
    track_id: u32,
    consumer: rtrb::Consumer<f32>,
    writer: Option<hound::WavWriter<std::io::BufWriter<std::fs::File>>>,
    path: PathBuf,
    frames_written: u64,
}

impl ActiveSpill {
    fn drain(&mut self) {
        let Some(writer) = &mut self.writer else {
            return;
        };
        while let Ok(sample) = self.consumer.pop() {
            if writer.write_sample(sample).is_ok() {
                self.frames_written += 1;
            }
        }
    }
}

/// One recorded take, reported on stop
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTake {
    pub track_id: u32,
    pub start_bars: f64,
    pub duration_seconds: f64,
    pub path: PathBuf,
}

/// Engine-side recording state: spill thread plus per-track rings
pub struct RecordingManager {
    sample_rate: u32,
    spill_dir: PathBuf,
    session: Option<SpillSession>,
}

struct SpillSession {
    start_beats: f64,
    stop_flag: Arc<AtomicBool>,
    handle: JoinHandle<Vec<(u32, PathBuf, u64)>>,
}

impl RecordingManager {
    pub fn new(sample_rate: u32, spill_dir: impl Into<PathBuf>) -> Self {
        Self {
            sample_rate,
            spill_dir: spill_dir.into(),
            session: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Create taps for the armed tracks and start the drain thread.
    ///
    /// The returned taps are moved to the callback via the command ring.
    pub fn start(&mut self, armed_tracks: &[u32], start_beats: f64) -> Result<Vec<RecordTap>> {
        anyhow::ensure!(self.session.is_none(), "recording already in progress");
        std::fs::create_dir_all(&self.spill_dir)
            .with_context(|| format!("failed to create {}", self.spill_dir.display()))?;

        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };

        let mut taps = Vec::with_capacity(armed_tracks.len());
        let mut spills = Vec::with_capacity(armed_tracks.len());

        for &track_id in armed_tracks {
            let (producer, consumer) = rtrb::RingBuffer::new(TAP_CAPACITY);
            let path = self
                .spill_dir
                .join(format!("take_track{}_{}.wav", track_id, std::process::id()));
            let writer = hound::WavWriter::create(&path, spec)
                .with_context(|| format!("failed to create spill file {}", path.display()))?;

            taps.push(RecordTap { track_id, producer });
            spills.push(ActiveSpill {
                track_id,
                consumer,
                writer: Some(writer),
                path,
                frames_written: 0,
            });
        }

        let stop_flag = Arc::new(AtomicBool::new(false));
        let thread_stop = stop_flag.clone();
        let handle = std::thread::Builder::new()
            .name("stu-record-spill".to_string())
            .spawn(move || spill_loop(spills, thread_stop))
            .context("failed to spawn spill thread")?;

        tracing::info!(
            tracks = armed_tracks.len(),
            start_beats,
            "recording started"
        );

        self.session = Some(SpillSession {
            start_beats,
            stop_flag,
            handle,
        });
        Ok(taps)
    }

    /// Stop, finalize spill files, and report the takes.
    ///
    /// `beats_per_bar` converts the start position into bars for clip
    /// placement.
    pub fn stop(&mut self, beats_per_bar: f64) -> Vec<RecordedTake> {
        let Some(session) = self.session.take() else {
            return Vec::new();
        };

        session.stop_flag.store(true, Ordering::Release);
        let results = session.handle.join().unwrap_or_default();

        let start_bars = if beats_per_bar > 0.0 {
            session.start_beats / beats_per_bar
        } else {
            0.0
        };

        let takes: Vec<RecordedTake> = results
            .into_iter()
            .map(|(track_id, path, frames)| RecordedTake {
                track_id,
                start_bars,
                // Interleaved stereo samples counted individually
                duration_seconds: frames as f64 / 2.0 / f64::from(self.sample_rate),
                path,
            })
            .collect();

        tracing::info!(takes = takes.len(), "recording stopped");
        takes
    }

    pub fn spill_dir(&self) -> &Path {
        &self.spill_dir
    }
}

fn spill_loop(
    mut spills: Vec<ActiveSpill>,
    stop_flag: Arc<AtomicBool>,
) -> Vec<(u32, PathBuf, u64)> {
    loop {
        for spill in &mut spills {
            spill.drain();
        }
        if stop_flag.load(Ordering::Acquire) {
            // Final drain after the callback dropped its producers
            for spill in &mut spills {
                spill.drain();
            }
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    spills
        .into_iter()
        .map(|mut spill| {
            if let Some(writer) = spill.writer.take() {
                if let Err(e) = writer.finalize() {
                    tracing::warn!(track.id = spill.track_id, error = %e, "spill finalize failed");
                }
            }
            (spill.track_id, spill.path, spill.frames_written)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_and_stop_produces_takes() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = RecordingManager::new(48_000, dir.path());

        let mut taps = manager.start(&[1, 2], 8.0).unwrap();
        assert!(manager.is_recording());

        // Pretend to be the callback: 0.1 s of audio on track 1
        let block = vec![0.25f32; 9600];
        taps[0].capture(&block);
        drop(taps);

        // Give the spill thread a moment to drain
        std::thread::sleep(Duration::from_millis(50));
        let takes = manager.stop(4.0);

        assert_eq!(takes.len(), 2);
        let track1 = takes.iter().find(|t| t.track_id == 1).unwrap();
        assert_eq!(track1.start_bars, 2.0);
        assert!((track1.duration_seconds - 0.1).abs() < 0.01);
        assert!(track1.path.exists());

        // The spill file decodes back
        let decoded = crate::decode::decode_file(&track1.path).unwrap();
        assert_eq!(decoded.channels, 2);
        assert!(decoded.frames() > 0);
    }

    #[test]
    fn double_start_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = RecordingManager::new(48_000, dir.path());
        let _taps = manager.start(&[1], 0.0).unwrap();
        assert!(manager.start(&[2], 0.0).is_err());
    }

    #[test]
    fn stop_without_start_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = RecordingManager::new(48_000, dir.path());
        assert!(manager.stop(4.0).is_empty());
    }
}
