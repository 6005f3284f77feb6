//! Metronome click synthesis
//!
//! Clicks are placed on beat boundaries derived from the transport clock,
//! so pause/resume never drifts the phase: whatever beat the clock says is
//! next gets the click. Bar starts (beat index divisible by beats-per-bar)
//! get the accented pitch.

const CLICK_SECONDS: f32 = 0.03;
const ACCENT_HZ: f32 = 1760.0;
const TICK_HZ: f32 = 880.0;
const CLICK_GAIN: f32 = 0.5;

#[derive(Debug, Clone, Copy)]
struct ActiveClick {
    freq: f32,
    age: usize,
    total: usize,
}

/// Stateful click generator, one per renderer
#[derive(Debug)]
pub struct Metronome {
    sample_rate: f32,
    click: Option<ActiveClick>,
}

impl Metronome {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            click: None,
        }
    }

    /// Add clicks for every beat boundary inside [start, end) beats.
    ///
    /// `samples` is the interleaved stereo master region for this block.
    pub fn render(
        &mut self,
        samples: &mut [f32],
        start_beats: f64,
        end_beats: f64,
        beats_per_bar: f64,
    ) {
        let frames = samples.len() / 2;
        if frames == 0 {
            return;
        }
        let block_beats = end_beats - start_beats;

        // Continue a click left over from the previous block
        if let Some(click) = &mut self.click {
            render_click(samples, 0, frames, click, self.sample_rate);
            if click.age >= click.total {
                self.click = None;
            }
        }

        if block_beats <= 0.0 {
            return;
        }

        // Beat boundaries are integers in beat space
        let first_beat = start_beats.ceil();
        let mut beat = if (start_beats - start_beats.round()).abs() < 1e-9 {
            start_beats.round()
        } else {
            first_beat
        };

        while beat < end_beats {
            let frame = (((beat - start_beats) / block_beats) * frames as f64) as usize;
            let beat_index = beat.round() as i64;
            let accented = beats_per_bar > 0.0
                && beat_index.rem_euclid(beats_per_bar.round() as i64) == 0;

            let mut click = ActiveClick {
                freq: if accented { ACCENT_HZ } else { TICK_HZ },
                age: 0,
                total: (CLICK_SECONDS * self.sample_rate) as usize,
            };
            render_click(samples, frame, frames, &mut click, self.sample_rate);
            if click.age < click.total {
                self.click = Some(click);
            }

            beat += 1.0;
        }
    }

    pub fn reset(&mut self) {
        self.click = None;
    }
}

/// Render a click from `from` up to `to` frames; returns frames written
fn render_click(
    samples: &mut [f32],
    from: usize,
    to: usize,
    click: &mut ActiveClick,
    sample_rate: f32,
) -> usize {
    let mut written = 0;
    for frame in from..to {
        if click.age >= click.total {
            break;
        }
        let t = click.age as f32 / sample_rate;
        let env = 1.0 - click.age as f32 / click.total as f32;
        let sample = (t * click.freq * std::f32::consts::TAU).sin() * env * env * CLICK_GAIN;
        samples[frame * 2] += sample;
        samples[frame * 2 + 1] += sample;
        click.age += 1;
        written += 1;
    }
    written
}
