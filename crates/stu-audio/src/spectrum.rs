//! Master-bus spectrum tap
//!
//! The callback copies mono master samples into a lock-free ring; a worker
//! drains them into a 2048-sample window and runs a Hann-windowed Goertzel
//! bank over 96 logarithmically spaced frequencies from 20 Hz up to
//! min(20 kHz, 0.92 * Nyquist). Keeping the math off the callback keeps the
//! realtime budget flat regardless of band count.

/// Analysis window length in samples
pub const WINDOW: usize = 2048;
/// Number of log-spaced bands
pub const BANDS: usize = 96;
/// Lowest analyzed frequency
pub const FREQ_MIN: f64 = 20.0;
/// Hard frequency ceiling
pub const FREQ_MAX: f64 = 20_000.0;

/// Goertzel bank over one fixed window
pub struct SpectrumAnalyzer {
    /// 2 * cos(2*pi*f/fs) per band
    coefficients: [f64; BANDS],
    frequencies: [f64; BANDS],
    window: [f64; WINDOW],
    /// Normalization: sum of the Hann window
    window_sum: f64,
}

impl SpectrumAnalyzer {
    pub fn new(sample_rate: u32) -> Self {
        let nyquist = f64::from(sample_rate) / 2.0;
        let f_max = FREQ_MAX.min(0.92 * nyquist);

        let mut frequencies = [0.0; BANDS];
        let ratio = f_max / FREQ_MIN;
        for (i, freq) in frequencies.iter_mut().enumerate() {
            let t = i as f64 / (BANDS - 1) as f64;
            *freq = FREQ_MIN * ratio.powf(t);
        }

        let mut coefficients = [0.0; BANDS];
        for (coeff, freq) in coefficients.iter_mut().zip(frequencies.iter()) {
            let omega = std::f64::consts::TAU * freq / f64::from(sample_rate);
            *coeff = 2.0 * omega.cos();
        }

        let mut window = [0.0; WINDOW];
        let mut window_sum = 0.0;
        for (n, w) in window.iter_mut().enumerate() {
            *w = 0.5
                * (1.0
                    - (std::f64::consts::TAU * n as f64 / (WINDOW - 1) as f64).cos());
            window_sum += *w;
        }

        Self {
            coefficients,
            frequencies,
            window,
            window_sum,
        }
    }

    pub fn frequencies(&self) -> &[f64; BANDS] {
        &self.frequencies
    }

    /// Magnitudes in [0, 1] for one window of mono samples
    pub fn analyze(&self, samples: &[f32; WINDOW]) -> [f32; BANDS] {
        let mut magnitudes = [0.0f32; BANDS];

        for (&coeff, magnitude) in self.coefficients.iter().zip(magnitudes.iter_mut()) {
            let mut s1 = 0.0f64;
            let mut s2 = 0.0f64;
            for (n, &sample) in samples.iter().enumerate() {
                let x = f64::from(sample) * self.window[n];
                let s0 = x + coeff * s1 - s2;
                s2 = s1;
                s1 = s0;
            }
            let power = (s1 * s1 + s2 * s2 - coeff * s1 * s2).max(0.0);
            // Scale so a full-amplitude sine at a band center reads ~1.0
            let scaled = 2.0 * power.sqrt() / self.window_sum;
            *magnitude = scaled.min(1.0) as f32;
        }

        magnitudes
    }
}

/// Worker-side accumulator fed from the callback's sample ring
pub struct SpectrumTap {
    analyzer: SpectrumAnalyzer,
    consumer: rtrb::Consumer<f32>,
    buffer: Box<[f32; WINDOW]>,
    filled: usize,
    latest: [f32; BANDS],
}

impl SpectrumTap {
    pub fn new(sample_rate: u32, consumer: rtrb::Consumer<f32>) -> Self {
        Self {
            analyzer: SpectrumAnalyzer::new(sample_rate),
            consumer,
            buffer: Box::new([0.0; WINDOW]),
            filled: 0,
            latest: [0.0; BANDS],
        }
    }

    /// Drain the ring; recompute whenever a full window accumulated.
    /// Returns true if `magnitudes()` changed.
    pub fn poll(&mut self) -> bool {
        let mut updated = false;
        while let Ok(sample) = self.consumer.pop() {
            self.buffer[self.filled] = sample;
            self.filled += 1;
            if self.filled == WINDOW {
                self.latest = self.analyzer.analyze(&self.buffer);
                self.filled = 0;
                updated = true;
            }
        }
        updated
    }

    pub fn magnitudes(&self) -> &[f32; BANDS] {
        &self.latest
    }
}

/// Ring from the callback to the tap; ~100 ms of headroom at 48 kHz
pub fn spectrum_ring(capacity: usize) -> (rtrb::Producer<f32>, rtrb::Consumer<f32>) {
    rtrb::RingBuffer::new(capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_window(freq: f64, sample_rate: u32) -> Box<[f32; WINDOW]> {
        let mut samples = Box::new([0.0f32; WINDOW]);
        for (n, s) in samples.iter_mut().enumerate() {
            *s = (std::f64::consts::TAU * freq * n as f64 / f64::from(sample_rate)).sin() as f32;
        }
        samples
    }

    #[test]
    fn band_spacing_is_logarithmic_and_bounded() {
        let analyzer = SpectrumAnalyzer::new(48_000);
        let freqs = analyzer.frequencies();

        assert!((freqs[0] - 20.0).abs() < 1e-9);
        assert!(freqs[BANDS - 1] <= 20_000.0);
        assert!(freqs[BANDS - 1] <= 0.92 * 24_000.0);

        // Constant ratio between adjacent bands
        let r0 = freqs[1] / freqs[0];
        let r_mid = freqs[50] / freqs[49];
        assert!((r0 - r_mid).abs() < 1e-9);
    }

    #[test]
    fn low_sample_rate_caps_below_nyquist() {
        let analyzer = SpectrumAnalyzer::new(22_050);
        let top = analyzer.frequencies()[BANDS - 1];
        assert!(top <= 0.92 * 11_025.0 + 1e-9);
    }

    #[test]
    fn sine_peaks_at_matching_band() {
        let analyzer = SpectrumAnalyzer::new(48_000);
        let target = analyzer.frequencies()[40];
        let magnitudes = analyzer.analyze(&sine_window(target, 48_000));

        let peak_band = magnitudes
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert!(
            (peak_band as i32 - 40).abs() <= 1,
            "peak at band {} expected near 40",
            peak_band
        );
        assert!(magnitudes[peak_band] > 0.5);
    }

    #[test]
    fn silence_yields_zero_magnitudes() {
        let analyzer = SpectrumAnalyzer::new(48_000);
        let magnitudes = analyzer.analyze(&[0.0; WINDOW]);
        assert!(magnitudes.iter().all(|&m| m < 1e-6));
    }

    #[test]
    fn tap_recomputes_per_full_window() {
        let (mut producer, consumer) = spectrum_ring(WINDOW * 2);
        let mut tap = SpectrumTap::new(48_000, consumer);

        for _ in 0..(WINDOW - 1) {
            producer.push(0.5).unwrap();
        }
        assert!(!tap.poll());

        producer.push(0.5).unwrap();
        assert!(tap.poll());
    }
}
