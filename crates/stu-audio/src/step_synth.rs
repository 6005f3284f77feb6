//! Built-in drum voices for pattern clips
//!
//! Tracks without an instrument plugin still have to make sound: every
//! track renderer owns one of these. A fixed voice pool of simple
//! percussive generators, allocation-free after construction.

use crate::graph::DrumLane;

const VOICES: usize = 16;

/// Deterministic noise source (xorshift), good enough for hats and snares
#[derive(Debug, Clone, Copy)]
struct Noise(u32);

impl Noise {
    fn new(seed: u32) -> Self {
        Self(seed.max(1))
    }

    #[inline]
    fn next(&mut self) -> f32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        (x as f32 / u32::MAX as f32) * 2.0 - 1.0
    }
}

#[derive(Debug, Clone, Copy)]
struct Voice {
    lane: DrumLane,
    velocity: f32,
    /// Samples since trigger
    age: usize,
    /// Remaining samples until silent
    remaining: usize,
    phase: f32,
    noise: Noise,
    active: bool,
}

impl Voice {
    fn idle() -> Self {
        Self {
            lane: DrumLane::Kick,
            velocity: 0.0,
            age: 0,
            remaining: 0,
            phase: 0.0,
            noise: Noise::new(0x5eed),
            active: false,
        }
    }

    fn trigger(&mut self, lane: DrumLane, velocity: f32, sample_rate: f32) {
        self.lane = lane;
        self.velocity = velocity;
        self.age = 0;
        self.phase = 0.0;
        self.noise = Noise::new(0x5eed ^ lane.note() as u32);
        self.remaining = (decay_seconds(lane) * sample_rate) as usize;
        self.active = true;
    }

    #[inline]
    fn render(&mut self, sample_rate: f32) -> f32 {
        if !self.active {
            return 0.0;
        }
        let t = self.age as f32 / sample_rate;
        let decay = decay_seconds(self.lane);
        let env = (1.0 - t / decay).max(0.0);
        let env = env * env;

        let sample = match self.lane {
            DrumLane::Kick => {
                // Pitch sweep 120 -> 45 Hz
                let freq = 45.0 + 75.0 * (-t * 28.0).exp();
                self.phase = (self.phase + freq / sample_rate).fract();
                (self.phase * std::f32::consts::TAU).sin()
            }
            DrumLane::Tom => {
                let freq = 90.0 + 60.0 * (-t * 18.0).exp();
                self.phase = (self.phase + freq / sample_rate).fract();
                (self.phase * std::f32::consts::TAU).sin()
            }
            DrumLane::Snare => {
                let freq = 180.0;
                self.phase = (self.phase + freq / sample_rate).fract();
                let body = (self.phase * std::f32::consts::TAU).sin() * 0.4;
                body + self.noise.next() * 0.6
            }
            DrumLane::Clap => self.noise.next() * 0.9,
            DrumLane::HatClosed | DrumLane::HatOpen => {
                // Crude highpassed noise: difference of successive samples
                let a = self.noise.next();
                let b = self.noise.next();
                (a - b) * 0.7
            }
            DrumLane::Perc => {
                let freq = 660.0;
                self.phase = (self.phase + freq / sample_rate).fract();
                (self.phase * std::f32::consts::TAU).sin() * 0.5 + self.noise.next() * 0.2
            }
        };

        self.age += 1;
        if self.age >= self.remaining {
            self.active = false;
        }
        sample * env * self.velocity
    }
}

fn decay_seconds(lane: DrumLane) -> f32 {
    match lane {
        DrumLane::Kick => 0.35,
        DrumLane::Snare => 0.22,
        DrumLane::Clap => 0.18,
        DrumLane::HatClosed => 0.06,
        DrumLane::HatOpen => 0.4,
        DrumLane::Tom => 0.3,
        DrumLane::Perc => 0.15,
    }
}

/// Fixed-pool percussive synth, one per track renderer
#[derive(Debug, Clone)]
pub struct StepSynth {
    sample_rate: f32,
    voices: [Voice; VOICES],
    next_voice: usize,
}

impl StepSynth {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            voices: [Voice::idle(); VOICES],
            next_voice: 0,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    /// Steal the oldest voice round-robin
    pub fn trigger(&mut self, lane: DrumLane, velocity: f32) {
        // Closed hat chokes the open hat
        if lane == DrumLane::HatClosed {
            for voice in &mut self.voices {
                if voice.active && voice.lane == DrumLane::HatOpen {
                    voice.active = false;
                }
            }
        }
        self.voices[self.next_voice].trigger(lane, velocity, self.sample_rate);
        self.next_voice = (self.next_voice + 1) % VOICES;
    }

    /// One mono output sample summing all active voices
    #[inline]
    pub fn tick(&mut self) -> f32 {
        let mut mixed = 0.0;
        for voice in &mut self.voices {
            mixed += voice.render(self.sample_rate);
        }
        mixed
    }

    /// Add all active voices into an interleaved stereo region
    pub fn render_into(&mut self, samples: &mut [f32]) {
        let frames = samples.len() / 2;
        for frame in 0..frames {
            let mixed = self.tick();
            samples[frame * 2] += mixed;
            samples[frame * 2 + 1] += mixed;
        }
    }

    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.active).count()
    }

    pub fn reset(&mut self) {
        for voice in &mut self.voices {
            voice.active = false;
        }
    }
}
