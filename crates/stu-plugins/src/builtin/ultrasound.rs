//! Ultrasound: the built-in subtractive synth
//!
//! Sixteen voices of blended saw/square through a Chamberlin state-variable
//! lowpass with an AD envelope. Pattern clips drive it with note-on events;
//! there is no sustain stage, which suits percussive step sequencing.

use stu_audio::{AudioBlock, NoteEvent, Processor, Smoothed};

use crate::api::{ParameterInfo, PluginDescriptor, PluginKind};

const VOICES: usize = 16;

// Parameter indices, order matches the descriptor
const P_CUTOFF: usize = 0;
const P_RESONANCE: usize = 1;
const P_ATTACK: usize = 2;
const P_DECAY: usize = 3;
const P_SHAPE: usize = 4;
const P_LEVEL: usize = 5;

#[derive(Debug, Clone, Copy)]
struct Voice {
    active: bool,
    freq: f32,
    velocity: f32,
    phase: f32,
    age: usize,
    // SVF state
    low: f32,
    band: f32,
}

impl Voice {
    fn idle() -> Self {
        Self {
            active: false,
            freq: 0.0,
            velocity: 0.0,
            phase: 0.0,
            age: 0,
            low: 0.0,
            band: 0.0,
        }
    }
}

/// Polyphonic subtractive synth
pub struct Ultrasound {
    sample_rate: f32,
    voices: [Voice; VOICES],
    next_voice: usize,
    // Normalized parameter values
    cutoff: f32,
    resonance: f32,
    attack: f32,
    decay: f32,
    shape: f32,
    level: Smoothed,
}

impl Ultrasound {
    pub fn new() -> Self {
        Self {
            sample_rate: 48_000.0,
            voices: [Voice::idle(); VOICES],
            next_voice: 0,
            cutoff: 0.7,
            resonance: 0.2,
            attack: 0.05,
            decay: 0.4,
            shape: 0.0,
            level: Smoothed::new(0.8),
        }
    }

    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor {
            uid: super::ULTRASOUND_UID.to_string(),
            name: "Ultrasound".to_string(),
            kind: PluginKind::Instrument,
            is_native: true,
            parameters: vec![
                ParameterInfo::new(
                    "cutoff",
                    "Cutoff",
                    20.0,
                    18_000.0,
                    0.7,
                    "Filter brightness; lower values sound darker",
                ),
                ParameterInfo::new(
                    "resonance",
                    "Resonance",
                    0.0,
                    1.0,
                    0.2,
                    "Emphasis at the cutoff frequency",
                ),
                ParameterInfo::new(
                    "attack",
                    "Attack",
                    0.001,
                    1.0,
                    0.05,
                    "How quickly a note reaches full level",
                ),
                ParameterInfo::new(
                    "decay",
                    "Decay",
                    0.02,
                    3.0,
                    0.4,
                    "How long a note rings out",
                ),
                ParameterInfo::new(
                    "shape",
                    "Shape",
                    0.0,
                    1.0,
                    0.0,
                    "Oscillator blend from saw to square",
                ),
                ParameterInfo::new(
                    "level",
                    "Level",
                    0.0,
                    1.0,
                    0.8,
                    "Output loudness of the synth",
                ),
            ],
        }
    }

    fn attack_seconds(&self) -> f32 {
        // 1 ms .. 1 s, exponential feel
        0.001 * (1000.0f32).powf(self.attack)
    }

    fn decay_seconds(&self) -> f32 {
        0.02 * (150.0f32).powf(self.decay)
    }

    fn cutoff_hz(&self) -> f32 {
        20.0 * (900.0f32).powf(self.cutoff)
    }

    fn note_on(&mut self, note: u8, velocity: f32) {
        let voice = &mut self.voices[self.next_voice];
        voice.active = true;
        voice.freq = 440.0 * 2.0f32.powf((f32::from(note) - 69.0) / 12.0);
        voice.velocity = velocity;
        voice.phase = 0.0;
        voice.age = 0;
        voice.low = 0.0;
        voice.band = 0.0;
        self.next_voice = (self.next_voice + 1) % VOICES;
    }
}

impl Default for Ultrasound {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for Ultrasound {
    fn prepare(&mut self, sample_rate: f32, _max_block_frames: usize) {
        self.sample_rate = sample_rate;
        self.reset();
    }

    fn process(&mut self, block: &mut AudioBlock, notes: &[NoteEvent]) {
        let frames = block.frames();
        let attack_samples = (self.attack_seconds() * self.sample_rate).max(1.0);
        let decay_samples = (self.decay_seconds() * self.sample_rate).max(1.0);
        let total = attack_samples + decay_samples;

        let f = (std::f32::consts::PI * self.cutoff_hz() / self.sample_rate)
            .sin()
            .min(0.99)
            * 2.0;
        let q = 1.0 - self.resonance * 0.95;
        let shape = self.shape;

        let mut note_cursor = 0;
        let samples = block.samples_mut();
        for frame in 0..frames {
            while note_cursor < notes.len() && notes[note_cursor].frame <= frame {
                let note = notes[note_cursor];
                self.note_on(note.note, note.velocity);
                note_cursor += 1;
            }

            let mut mixed = 0.0f32;
            for voice in &mut self.voices {
                if !voice.active {
                    continue;
                }
                let age = voice.age as f32;
                let env = if age < attack_samples {
                    age / attack_samples
                } else {
                    1.0 - (age - attack_samples) / decay_samples
                };
                if age >= total || env <= 0.0 {
                    voice.active = false;
                    continue;
                }

                voice.phase = (voice.phase + voice.freq / self.sample_rate).fract();
                let saw = voice.phase * 2.0 - 1.0;
                let square = if voice.phase < 0.5 { 1.0 } else { -1.0 };
                let raw = saw * (1.0 - shape) + square * shape;

                // Chamberlin SVF, lowpass output
                voice.low += f * voice.band;
                let high = raw - voice.low - q * voice.band;
                voice.band += f * high;

                mixed += voice.low * env * voice.velocity;
                voice.age += 1;
            }

            let gain = self.level.next() * 0.4;
            let out = mixed * gain;
            samples[frame * 2] += out;
            samples[frame * 2 + 1] += out;
        }
    }

    fn set_param(&mut self, param_index: usize, normalized: f32) {
        let value = normalized.clamp(0.0, 1.0);
        match param_index {
            P_CUTOFF => self.cutoff = value,
            P_RESONANCE => self.resonance = value,
            P_ATTACK => self.attack = value,
            P_DECAY => self.decay = value,
            P_SHAPE => self.shape = value,
            P_LEVEL => self.level.set_target(value, 256),
            _ => {}
        }
    }

    fn reset(&mut self) {
        for voice in &mut self.voices {
            *voice = Voice::idle();
        }
    }
}
