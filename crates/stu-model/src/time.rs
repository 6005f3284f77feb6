//! Musical time units and conversions
//!
//! Positions on the playlist are measured in bars. One bar spans
//! `numerator * 4 / denominator` beats, one beat spans 4 steps on the
//! default 1/16 grid. Conversions to wall-clock seconds go through the
//! project BPM.

use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// Steps per beat on the default 1/16 grid
pub const STEPS_PER_BEAT: u32 = 4;

/// Position or duration in bars
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
pub struct Bars(pub f64);

impl Bars {
    pub fn zero() -> Self {
        Self(0.0)
    }

    /// Snap to the nearest multiple of `step` (itself in bars)
    pub fn snapped(self, step: f64) -> Self {
        if step <= 0.0 {
            return self;
        }
        Self((self.0 / step).round() * step)
    }
}

impl Add for Bars {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Bars(self.0 + rhs.0)
    }
}

impl Sub for Bars {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Bars((self.0 - rhs.0).max(0.0))
    }
}

/// Position or duration in beats (quarter notes)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
pub struct Beats(pub f64);

impl Beats {
    pub fn zero() -> Self {
        Self(0.0)
    }
}

impl Add for Beats {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Beats(self.0 + rhs.0)
    }
}

impl Sub for Beats {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Beats((self.0 - rhs.0).max(0.0))
    }
}

/// Time signature (numerator over denominator)
///
/// The denominator is restricted to {1, 2, 4, 8, 16}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }
}

impl TimeSignature {
    pub const VALID_DENOMINATORS: [u8; 5] = [1, 2, 4, 8, 16];

    /// Beats per bar for this signature
    pub fn beats_per_bar(&self) -> f64 {
        f64::from(self.numerator) * 4.0 / f64::from(self.denominator)
    }

    pub fn is_valid(&self) -> bool {
        self.numerator >= 1 && Self::VALID_DENOMINATORS.contains(&self.denominator)
    }
}

/// Conversion context: BPM plus time signature
///
/// `seconds = bars * beats_per_bar * 60 / bpm`, exact to double precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo {
    pub bpm: u32,
    pub time_signature: TimeSignature,
}

impl Tempo {
    pub fn new(bpm: u32, time_signature: TimeSignature) -> Self {
        Self {
            bpm,
            time_signature,
        }
    }

    pub fn bars_to_beats(&self, bars: Bars) -> Beats {
        Beats(bars.0 * self.time_signature.beats_per_bar())
    }

    pub fn beats_to_bars(&self, beats: Beats) -> Bars {
        Bars(beats.0 / self.time_signature.beats_per_bar())
    }

    pub fn bars_to_seconds(&self, bars: Bars) -> f64 {
        bars.0 * self.time_signature.beats_per_bar() * 60.0 / f64::from(self.bpm)
    }

    pub fn beats_to_seconds(&self, beats: Beats) -> f64 {
        beats.0 * 60.0 / f64::from(self.bpm)
    }

    pub fn seconds_to_beats(&self, seconds: f64) -> Beats {
        Beats(seconds * f64::from(self.bpm) / 60.0)
    }

    /// Step index within the current beat on the 1/16 grid
    pub fn step_of_beat(&self, beats: Beats) -> u32 {
        let frac = beats.0.fract();
        ((frac * f64::from(STEPS_PER_BEAT)) as u32).min(STEPS_PER_BEAT - 1)
    }
}
