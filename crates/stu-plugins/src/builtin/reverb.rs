//! Schroeder reverb
//!
//! Four parallel damped combs into two series allpasses, mono sum spread
//! back to stereo with a slight channel offset. Delay lines are allocated
//! in `prepare` for the actual sample rate.

use stu_audio::{AudioBlock, NoteEvent, Processor, Smoothed};

use crate::api::{ParameterInfo, PluginDescriptor, PluginKind};

const P_ROOM: usize = 0;
const P_DAMPING: usize = 1;
const P_WET: usize = 2;

// Classic tunings at 44.1 kHz, scaled to the actual rate in prepare()
const COMB_TUNINGS: [usize; 4] = [1116, 1188, 1277, 1356];
const ALLPASS_TUNINGS: [usize; 2] = [556, 441];

struct Comb {
    buffer: Vec<f32>,
    index: usize,
    feedback: f32,
    damp: f32,
    filter_state: f32,
}

impl Comb {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            index: 0,
            feedback: 0.85,
            damp: 0.3,
            filter_state: 0.0,
        }
    }

    #[inline]
    fn tick(&mut self, input: f32) -> f32 {
        let out = self.buffer[self.index];
        self.filter_state = out * (1.0 - self.damp) + self.filter_state * self.damp;
        self.buffer[self.index] = input + self.filter_state * self.feedback;
        self.index = (self.index + 1) % self.buffer.len();
        out
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.filter_state = 0.0;
    }
}

struct Allpass {
    buffer: Vec<f32>,
    index: usize,
}

impl Allpass {
    fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            index: 0,
        }
    }

    #[inline]
    fn tick(&mut self, input: f32) -> f32 {
        const G: f32 = 0.5;
        let delayed = self.buffer[self.index];
        let out = delayed - input * G;
        self.buffer[self.index] = input + delayed * G;
        self.index = (self.index + 1) % self.buffer.len();
        out
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
    }
}

/// Room reverb effect
pub struct Reverb {
    sample_rate: f32,
    combs: Vec<Comb>,
    allpasses: Vec<Allpass>,
    room: f32,
    damping: f32,
    wet: Smoothed,
}

impl Reverb {
    pub fn new() -> Self {
        let mut reverb = Self {
            sample_rate: 48_000.0,
            combs: Vec::new(),
            allpasses: Vec::new(),
            room: 0.5,
            damping: 0.4,
            wet: Smoothed::new(0.3),
        };
        reverb.rebuild_lines();
        reverb
    }

    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor {
            uid: super::REVERB_UID.to_string(),
            name: "Reverb".to_string(),
            kind: PluginKind::Effect,
            is_native: true,
            parameters: vec![
                ParameterInfo::new("room_size", "Room Size", 0.0, 1.0, 0.5, "How long the space rings"),
                ParameterInfo::new("damping", "Damping", 0.0, 1.0, 0.4, "How quickly highs fade in the tail"),
                ParameterInfo::new("wet", "Wet", 0.0, 1.0, 0.3, "Balance of reverb against the dry signal"),
            ],
        }
    }

    fn rebuild_lines(&mut self) {
        let scale = self.sample_rate / 44_100.0;
        self.combs = COMB_TUNINGS
            .iter()
            .map(|&len| Comb::new((len as f32 * scale) as usize))
            .collect();
        self.allpasses = ALLPASS_TUNINGS
            .iter()
            .map(|&len| Allpass::new((len as f32 * scale) as usize))
            .collect();
        self.apply_params();
    }

    fn apply_params(&mut self) {
        let feedback = 0.7 + self.room * 0.28;
        for comb in &mut self.combs {
            comb.feedback = feedback;
            comb.damp = self.damping * 0.9;
        }
    }
}

impl Default for Reverb {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for Reverb {
    fn prepare(&mut self, sample_rate: f32, _max_block_frames: usize) {
        self.sample_rate = sample_rate;
        self.rebuild_lines();
    }

    fn process(&mut self, block: &mut AudioBlock, _notes: &[NoteEvent]) {
        let frames = block.frames();
        let samples = block.samples_mut();
        for frame in 0..frames {
            let dry_l = samples[frame * 2];
            let dry_r = samples[frame * 2 + 1];
            let input = (dry_l + dry_r) * 0.5;

            let mut wet_sample = 0.0;
            for comb in &mut self.combs {
                wet_sample += comb.tick(input);
            }
            wet_sample *= 0.25;
            for allpass in &mut self.allpasses {
                wet_sample = allpass.tick(wet_sample);
            }

            let wet = self.wet.next();
            let dry = 1.0 - wet;
            samples[frame * 2] = dry_l * dry + wet_sample * wet;
            samples[frame * 2 + 1] = dry_r * dry + wet_sample * wet;
        }
    }

    fn set_param(&mut self, param_index: usize, normalized: f32) {
        let value = normalized.clamp(0.0, 1.0);
        match param_index {
            P_ROOM => {
                self.room = value;
                self.apply_params();
            }
            P_DAMPING => {
                self.damping = value;
                self.apply_params();
            }
            P_WET => self.wet.set_target(value, 256),
            _ => {}
        }
    }

    fn reset(&mut self) {
        for comb in &mut self.combs {
            comb.clear();
        }
        for allpass in &mut self.allpasses {
            allpass.clear();
        }
    }
}
