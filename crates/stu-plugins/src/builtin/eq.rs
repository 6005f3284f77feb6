//! Four-band equalizer
//!
//! Low shelf, two peaking bands, high shelf; RBJ biquad formulas with
//! coefficients recomputed on parameter change, never per sample.

use stu_audio::{AudioBlock, NoteEvent, Processor};

use crate::api::{ParameterInfo, PluginDescriptor, PluginKind};

const GAIN_RANGE_DB: f64 = 12.0;

// Parameter order: gain, freq per band
const P_LOW_GAIN: usize = 0;
const P_LOW_FREQ: usize = 1;
const P_MID1_GAIN: usize = 2;
const P_MID1_FREQ: usize = 3;
const P_MID2_GAIN: usize = 4;
const P_MID2_FREQ: usize = 5;
const P_HIGH_GAIN: usize = 6;
const P_HIGH_FREQ: usize = 7;

#[derive(Debug, Clone, Copy, Default)]
struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    // Per-channel state
    x1: [f32; 2],
    x2: [f32; 2],
    y1: [f32; 2],
    y2: [f32; 2],
}

impl Biquad {
    fn identity() -> Self {
        Self {
            b0: 1.0,
            ..Self::default()
        }
    }

    #[inline]
    fn tick(&mut self, channel: usize, x: f32) -> f32 {
        let y = self.b0 * x + self.b1 * self.x1[channel] + self.b2 * self.x2[channel]
            - self.a1 * self.y1[channel]
            - self.a2 * self.y2[channel];
        self.x2[channel] = self.x1[channel];
        self.x1[channel] = x;
        self.y2[channel] = self.y1[channel];
        self.y1[channel] = y;
        y
    }

    fn clear_state(&mut self) {
        self.x1 = [0.0; 2];
        self.x2 = [0.0; 2];
        self.y1 = [0.0; 2];
        self.y2 = [0.0; 2];
    }

    fn set_peaking(&mut self, sample_rate: f32, freq: f32, gain_db: f32, q: f32) {
        let a = 10.0f32.powf(gain_db / 40.0);
        let w0 = std::f32::consts::TAU * freq / sample_rate;
        let alpha = w0.sin() / (2.0 * q);
        let cos_w0 = w0.cos();
        let a0 = 1.0 + alpha / a;

        self.b0 = (1.0 + alpha * a) / a0;
        self.b1 = (-2.0 * cos_w0) / a0;
        self.b2 = (1.0 - alpha * a) / a0;
        self.a1 = (-2.0 * cos_w0) / a0;
        self.a2 = (1.0 - alpha / a) / a0;
    }

    fn set_low_shelf(&mut self, sample_rate: f32, freq: f32, gain_db: f32) {
        let a = 10.0f32.powf(gain_db / 40.0);
        let w0 = std::f32::consts::TAU * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / 2.0 * (2.0f32).sqrt();
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let a0 = (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha;
        self.b0 = a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha) / a0;
        self.b1 = 2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0) / a0;
        self.b2 = a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha) / a0;
        self.a1 = -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0) / a0;
        self.a2 = ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha) / a0;
    }

    fn set_high_shelf(&mut self, sample_rate: f32, freq: f32, gain_db: f32) {
        let a = 10.0f32.powf(gain_db / 40.0);
        let w0 = std::f32::consts::TAU * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / 2.0 * (2.0f32).sqrt();
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha;
        self.b0 = a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha) / a0;
        self.b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0) / a0;
        self.b2 = a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha) / a0;
        self.a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos_w0) / a0;
        self.a2 = ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha) / a0;
    }
}

/// Four fixed-topology bands in series
pub struct FourBandEq {
    sample_rate: f32,
    params: [f32; 8],
    bands: [Biquad; 4],
}

impl FourBandEq {
    pub fn new() -> Self {
        let mut eq = Self {
            sample_rate: 48_000.0,
            params: [0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5],
            bands: [Biquad::identity(); 4],
        };
        eq.update_coefficients();
        eq
    }

    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor {
            uid: super::EQ_UID.to_string(),
            name: "4-Band EQ".to_string(),
            kind: PluginKind::Effect,
            is_native: true,
            parameters: vec![
                ParameterInfo::new("low_gain", "Low Gain", -GAIN_RANGE_DB, GAIN_RANGE_DB, 0.5, "Boost or cut the bass shelf"),
                ParameterInfo::new("low_freq", "Low Freq", 40.0, 400.0, 0.5, "Where the bass shelf begins"),
                ParameterInfo::new("mid1_gain", "Mid 1 Gain", -GAIN_RANGE_DB, GAIN_RANGE_DB, 0.5, "Boost or cut the low mids"),
                ParameterInfo::new("mid1_freq", "Mid 1 Freq", 200.0, 2_000.0, 0.5, "Center of the low-mid band"),
                ParameterInfo::new("mid2_gain", "Mid 2 Gain", -GAIN_RANGE_DB, GAIN_RANGE_DB, 0.5, "Boost or cut the high mids"),
                ParameterInfo::new("mid2_freq", "Mid 2 Freq", 1_000.0, 8_000.0, 0.5, "Center of the high-mid band"),
                ParameterInfo::new("high_gain", "High Gain", -GAIN_RANGE_DB, GAIN_RANGE_DB, 0.5, "Boost or cut the treble shelf"),
                ParameterInfo::new("high_freq", "High Freq", 2_000.0, 16_000.0, 0.5, "Where the treble shelf begins"),
            ],
        }
    }

    fn gain_db(&self, index: usize) -> f32 {
        (f64::from(self.params[index]) * 2.0 - 1.0) as f32 * GAIN_RANGE_DB as f32
    }

    fn freq(&self, index: usize, min: f32, max: f32) -> f32 {
        min * (max / min).powf(self.params[index])
    }

    fn update_coefficients(&mut self) {
        let fs = self.sample_rate;
        let low_freq = self.freq(P_LOW_FREQ, 40.0, 400.0);
        let mid1_freq = self.freq(P_MID1_FREQ, 200.0, 2_000.0);
        let mid2_freq = self.freq(P_MID2_FREQ, 1_000.0, 8_000.0);
        let high_freq = self.freq(P_HIGH_FREQ, 2_000.0, 16_000.0);

        self.bands[0].set_low_shelf(fs, low_freq, self.gain_db(P_LOW_GAIN));
        self.bands[1].set_peaking(fs, mid1_freq, self.gain_db(P_MID1_GAIN), 0.9);
        self.bands[2].set_peaking(fs, mid2_freq, self.gain_db(P_MID2_GAIN), 0.9);
        self.bands[3].set_high_shelf(fs, high_freq, self.gain_db(P_HIGH_GAIN));
    }
}

impl Default for FourBandEq {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for FourBandEq {
    fn prepare(&mut self, sample_rate: f32, _max_block_frames: usize) {
        self.sample_rate = sample_rate;
        self.update_coefficients();
        self.reset();
    }

    fn process(&mut self, block: &mut AudioBlock, _notes: &[NoteEvent]) {
        let frames = block.frames();
        let samples = block.samples_mut();
        for frame in 0..frames {
            for channel in 0..2 {
                let mut sample = samples[frame * 2 + channel];
                for band in &mut self.bands {
                    sample = band.tick(channel, sample);
                }
                samples[frame * 2 + channel] = sample;
            }
        }
    }

    fn set_param(&mut self, param_index: usize, normalized: f32) {
        if param_index < self.params.len() {
            self.params[param_index] = normalized.clamp(0.0, 1.0);
            self.update_coefficients();
        }
    }

    fn reset(&mut self) {
        for band in &mut self.bands {
            band.clear_state();
        }
    }
}
