//! Audio file decoding
//!
//! Decoding always happens off the audio thread: clips are pre-decoded when
//! the graph description is built, the callback only copies samples. WAV
//! goes through hound, everything else through symphonia.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

/// Decoded audio ready for playback
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved samples (L, R, L, R, ... or mono)
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u8,
}

impl DecodedAudio {
    /// Total frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// Sample one stereo frame, mono sources duplicated to both sides
    #[inline]
    pub fn frame(&self, index: usize) -> (f32, f32) {
        if index >= self.frames() {
            return (0.0, 0.0);
        }
        match self.channels {
            1 => {
                let s = self.samples[index];
                (s, s)
            }
            _ => {
                let base = index * self.channels as usize;
                (self.samples[base], self.samples[base + 1])
            }
        }
    }

    /// Peak envelope with `buckets` entries, values in [0, 1]
    pub fn peak_envelope(&self, buckets: usize) -> Vec<f64> {
        let frames = self.frames();
        if frames == 0 || buckets == 0 {
            return Vec::new();
        }
        let buckets = buckets.min(frames);
        let per_bucket = frames.div_ceil(buckets);
        let mut peaks = Vec::with_capacity(buckets);

        for bucket in 0..buckets {
            let start = bucket * per_bucket;
            let end = ((bucket + 1) * per_bucket).min(frames);
            let mut peak = 0.0f32;
            for frame in start..end {
                let (l, r) = self.frame(frame);
                peak = peak.max(l.abs()).max(r.abs());
            }
            peaks.push(f64::from(peak.clamp(0.0, 1.0)));
        }
        peaks
    }
}

/// Decode WAV audio using hound
pub fn decode_wav(data: &[u8]) -> Result<DecodedAudio> {
    let cursor = Cursor::new(data);
    let reader = hound::WavReader::new(cursor).context("failed to parse WAV header")?;

    let spec = reader.spec();
    let channels = spec.channels as u8;
    let sample_rate = spec.sample_rate;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read float samples")?,
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            let max_val = (1i64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()
                .context("failed to read int samples")?
        }
    };

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

/// Decode compressed formats (MP3, FLAC, OGG, AAC) using symphonia
pub fn decode_compressed(data: &[u8], extension: Option<&str>) -> Result<DecodedAudio> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let cursor = Cursor::new(data.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("failed to probe audio format")?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("no audio track found"))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("no sample rate"))?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u8)
        .unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("failed to create decoder")?;

    let track_id = track.id;
    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e).context("failed to read packet"),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder.decode(&packet).context("failed to decode packet")?;
        let spec = *decoded.spec();
        let duration = decoded.capacity();

        let mut sample_buf = SampleBuffer::<f32>::new(duration as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend(sample_buf.samples());
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

/// Decode any supported audio file from raw bytes
pub fn decode_audio(data: &[u8], extension: Option<&str>) -> Result<DecodedAudio> {
    if data.len() >= 4 && &data[0..4] == b"RIFF" {
        return decode_wav(data);
    }
    decode_compressed(data, extension)
}

/// Decode a file from disk
pub fn decode_file(path: &Path) -> Result<Arc<DecodedAudio>> {
    let data = std::fs::read(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let ext = path.extension().and_then(|e| e.to_str());
    let decoded = decode_audio(&data, ext)
        .with_context(|| format!("failed to decode {}", path.display()))?;
    tracing::debug!(
        path = %path.display(),
        frames = decoded.frames(),
        sample_rate = decoded.sample_rate,
        channels = decoded.channels,
        "audio decoded"
    );
    Ok(Arc::new(decoded))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_wav_bytes(frames: usize, sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                let t = i as f32 / sample_rate as f32;
                let sample = (t * 440.0 * std::f32::consts::TAU).sin() * 0.5;
                writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn wav_round_trip_preserves_shape() {
        let data = sine_wav_bytes(4800, 48_000);
        let decoded = decode_audio(&data, Some("wav")).unwrap();
        assert_eq!(decoded.sample_rate, 48_000);
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.frames(), 4800);
        assert!((decoded.duration_seconds() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn peak_envelope_is_bounded_and_sized() {
        let data = sine_wav_bytes(48_000, 48_000);
        let decoded = decode_wav(&data).unwrap();
        let peaks = decoded.peak_envelope(256);
        assert_eq!(peaks.len(), 256);
        for peak in &peaks {
            assert!((0.0..=1.0).contains(peak));
        }
        // A half-amplitude sine should peak near 0.5 in most buckets
        assert!(peaks.iter().filter(|p| **p > 0.4).count() > 200);
    }

    #[test]
    fn mono_frames_duplicate_to_stereo() {
        let decoded = DecodedAudio {
            samples: vec![0.25, -0.5],
            sample_rate: 48_000,
            channels: 1,
        };
        assert_eq!(decoded.frame(1), (-0.5, -0.5));
        assert_eq!(decoded.frame(7), (0.0, 0.0));
    }

    #[test]
    fn garbage_bytes_fail_cleanly() {
        assert!(decode_audio(&[0u8; 16], None).is_err());
    }
}
