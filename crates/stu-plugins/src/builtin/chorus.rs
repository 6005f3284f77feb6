//! Chorus effect
//!
//! A modulated delay line per channel with quadrature LFOs, linear
//! interpolation on the read head. The delay buffer covers the maximum
//! depth at the prepared sample rate.

use stu_audio::{AudioBlock, NoteEvent, Processor, Smoothed};

use crate::api::{ParameterInfo, PluginDescriptor, PluginKind};

const P_RATE: usize = 0;
const P_DEPTH: usize = 1;
const P_MIX: usize = 2;

/// Base delay plus maximum modulation, in seconds
const BASE_DELAY: f32 = 0.012;
const MAX_DEPTH: f32 = 0.008;

struct DelayLine {
    buffer: Vec<f32>,
    write: usize,
}

impl DelayLine {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(4)],
            write: 0,
        }
    }

    #[inline]
    fn push(&mut self, sample: f32) {
        self.buffer[self.write] = sample;
        self.write = (self.write + 1) % self.buffer.len();
    }

    /// Read `delay_samples` behind the write head with linear interpolation
    #[inline]
    fn read(&self, delay_samples: f32) -> f32 {
        let len = self.buffer.len() as f32;
        let position = (self.write as f32 - delay_samples + len) % len;
        let index = position as usize;
        let frac = position - index as f32;
        let a = self.buffer[index % self.buffer.len()];
        let b = self.buffer[(index + 1) % self.buffer.len()];
        a + (b - a) * frac
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
    }
}

/// Stereo chorus
pub struct Chorus {
    sample_rate: f32,
    lines: [DelayLine; 2],
    phase: f32,
    rate: f32,
    depth: f32,
    mix: Smoothed,
}

impl Chorus {
    pub fn new() -> Self {
        Self {
            sample_rate: 48_000.0,
            lines: [DelayLine::new(1), DelayLine::new(1)],
            phase: 0.0,
            rate: 0.3,
            depth: 0.5,
            mix: Smoothed::new(0.5),
        }
    }

    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor {
            uid: super::CHORUS_UID.to_string(),
            name: "Chorus".to_string(),
            kind: PluginKind::Effect,
            is_native: true,
            parameters: vec![
                ParameterInfo::new("rate", "Rate", 0.1, 5.0, 0.3, "Speed of the wobble"),
                ParameterInfo::new("depth", "Depth", 0.0, 1.0, 0.5, "How far the pitch drifts"),
                ParameterInfo::new("mix", "Mix", 0.0, 1.0, 0.5, "Blend of effect against the dry signal"),
            ],
        }
    }

    fn rate_hz(&self) -> f32 {
        0.1 * (50.0f32).powf(self.rate)
    }
}

impl Default for Chorus {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for Chorus {
    fn prepare(&mut self, sample_rate: f32, _max_block_frames: usize) {
        self.sample_rate = sample_rate;
        let len = ((BASE_DELAY + MAX_DEPTH) * sample_rate) as usize + 8;
        self.lines = [DelayLine::new(len), DelayLine::new(len)];
        self.phase = 0.0;
    }

    fn process(&mut self, block: &mut AudioBlock, _notes: &[NoteEvent]) {
        let frames = block.frames();
        let rate = self.rate_hz();
        let phase_inc = rate / self.sample_rate;
        let depth_samples = self.depth * MAX_DEPTH * self.sample_rate;
        let base_samples = BASE_DELAY * self.sample_rate;

        let samples = block.samples_mut();
        for frame in 0..frames {
            let lfo_l = (self.phase * std::f32::consts::TAU).sin();
            // Right channel in quadrature widens the image
            let lfo_r = ((self.phase + 0.25) * std::f32::consts::TAU).sin();
            self.phase = (self.phase + phase_inc).fract();

            let mix = self.mix.next();
            let dry_gain = 1.0 - mix * 0.5;

            for (channel, lfo) in [(0usize, lfo_l), (1usize, lfo_r)] {
                let dry = samples[frame * 2 + channel];
                self.lines[channel].push(dry);
                let delay = base_samples + (lfo * 0.5 + 0.5) * depth_samples;
                let wet = self.lines[channel].read(delay);
                samples[frame * 2 + channel] = dry * dry_gain + wet * mix;
            }
        }
    }

    fn set_param(&mut self, param_index: usize, normalized: f32) {
        let value = normalized.clamp(0.0, 1.0);
        match param_index {
            P_RATE => self.rate = value,
            P_DEPTH => self.depth = value,
            P_MIX => self.mix.set_target(value, 256),
            _ => {}
        }
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.clear();
        }
        self.phase = 0.0;
    }
}
