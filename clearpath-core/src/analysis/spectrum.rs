//! Per-channel magnitude spectra.
//!
//! ## Algorithm
//!
//! 1. Take the first `transform_size` samples (zero-pad when short).
//! 2. Apply a Blackman window and run a forward FFT.
//! 3. Keep the `transform_size / 2` positive-frequency bins, `|X[k]| / N`.
//! 4. Map each magnitude to decibels and then linearly onto `[0, FULL_SCALE]`
//!    between `min_decibels` and `max_decibels`.
//!
//! Temporal smoothing is *not* part of the analyzer; see [`SpectralSmoother`].

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::buffering::frame::AudioFrame;

/// Largest value a spectrum bin can hold.
pub const FULL_SCALE: f32 = 1.0;

/// Floor applied before `log10` so silent bins map to `-inf`-free decibels.
const MAGNITUDE_FLOOR: f32 = 1e-12;

/// Non-negative bin values for one channel, each in `[0, FULL_SCALE]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumBuffer {
    bins: Vec<f32>,
}

impl SpectrumBuffer {
    /// Wrap precomputed bin values. Values are clamped into
    /// `[0, FULL_SCALE]`; NaN becomes 0.
    pub fn from_bins(mut bins: Vec<f32>) -> Self {
        for b in bins.iter_mut() {
            *b = if b.is_nan() { 0.0 } else { b.clamp(0.0, FULL_SCALE) };
        }
        Self { bins }
    }

    pub fn silent(len: usize) -> Self {
        Self {
            bins: vec![0.0; len],
        }
    }

    /// Map linear FFT magnitudes onto the `[min_db, max_db]` display range.
    pub fn from_magnitudes(magnitudes: &[f32], min_db: f32, max_db: f32) -> Self {
        let range = max_db - min_db;
        let bins = magnitudes
            .iter()
            .map(|&m| {
                let db = 20.0 * m.max(MAGNITUDE_FLOOR).log10();
                (FULL_SCALE * (db - min_db) / range).clamp(0.0, FULL_SCALE)
            })
            .collect();
        Self { bins }
    }

    pub fn bins(&self) -> &[f32] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Sum of all bin values.
    pub fn total(&self) -> f32 {
        self.bins.iter().sum()
    }
}

/// Windowed FFT front end shared by both channels.
pub struct ChannelAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    transform_size: usize,
    min_db: f32,
    max_db: f32,
}

impl ChannelAnalyzer {
    pub fn new(transform_size: usize, min_db: f32, max_db: f32) -> Self {
        let fft = FftPlanner::<f32>::new().plan_fft_forward(transform_size);
        Self {
            fft,
            window: build_blackman_window(transform_size),
            transform_size,
            min_db,
            max_db,
        }
    }

    pub fn transform_size(&self) -> usize {
        self.transform_size
    }

    /// Number of positive-frequency bins produced per channel.
    pub fn bin_count(&self) -> usize {
        self.transform_size / 2
    }

    /// Linear magnitudes `|X[k]| / N` for one channel.
    pub fn magnitudes(&self, samples: &[f32]) -> Vec<f32> {
        let n = self.transform_size;
        let mut buf = vec![Complex::new(0.0f32, 0.0); n];
        for (i, (slot, &s)) in buf.iter_mut().zip(samples.iter()).enumerate() {
            *slot = Complex::new(s * self.window[i], 0.0);
        }
        self.fft.process(&mut buf);

        let scale = 1.0 / n as f32;
        buf[..self.bin_count()]
            .iter()
            .map(|c| c.norm() * scale)
            .collect()
    }

    pub fn to_spectrum(&self, magnitudes: &[f32]) -> SpectrumBuffer {
        SpectrumBuffer::from_magnitudes(magnitudes, self.min_db, self.max_db)
    }

    pub fn analyze(&self, samples: &[f32]) -> SpectrumBuffer {
        self.to_spectrum(&self.magnitudes(samples))
    }

    /// Analyse both channels of a frame.
    pub fn analyze_frame(&self, frame: &AudioFrame) -> (SpectrumBuffer, SpectrumBuffer) {
        (self.analyze(&frame.left), self.analyze(&frame.right))
    }
}

/// Exponential smoothing of linear magnitudes across frames:
/// `out = tau * previous + (1 - tau) * current`.
#[derive(Debug, Clone)]
pub struct SpectralSmoother {
    time_constant: f32,
    previous: Vec<f32>,
}

impl SpectralSmoother {
    pub fn new(time_constant: f32) -> Self {
        Self {
            time_constant,
            previous: Vec::new(),
        }
    }

    /// Smooth `magnitudes` in place against the previous call's output.
    pub fn apply(&mut self, magnitudes: &mut [f32]) {
        if self.previous.len() != magnitudes.len() {
            self.previous = vec![0.0; magnitudes.len()];
        }
        let tau = self.time_constant;
        for (m, prev) in magnitudes.iter_mut().zip(self.previous.iter_mut()) {
            let v = tau * *prev + (1.0 - tau) * *m;
            *m = if v.is_finite() { v } else { 0.0 };
            *prev = *m;
        }
    }

    pub fn reset(&mut self) {
        self.previous.clear();
    }
}

/// Blackman window with alpha = 0.16, as used by browser analyser nodes.
fn build_blackman_window(n: usize) -> Vec<f32> {
    use std::f32::consts::PI;
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * ALPHA;
    (0..n)
        .map(|i| {
            let x = i as f32 / n as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn analyzer() -> ChannelAnalyzer {
        ChannelAnalyzer::new(512, -90.0, -10.0)
    }

    fn sine(freq_hz: f32, sample_rate: f32, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq_hz * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn silence_maps_to_zero_bins() {
        let spectrum = analyzer().analyze(&vec![0.0; 512]);
        assert_eq!(spectrum.len(), 256);
        assert!(spectrum.bins().iter().all(|&b| b == 0.0));
    }

    #[test]
    fn short_input_is_zero_padded() {
        let a = analyzer();
        let short = sine(1_000.0, 44_100.0, 0.5, 300);
        let mut padded = short.clone();
        padded.resize(512, 0.0);
        assert_eq!(a.analyze(&short), a.analyze(&padded));
    }

    #[test]
    fn tone_peaks_in_expected_bin() {
        // 1 kHz at 44.1 kHz / 512 → bin ≈ 11.6
        let spectrum = analyzer().analyze(&sine(1_000.0, 44_100.0, 0.8, 512));
        let (peak, _) = spectrum
            .bins()
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
        assert!((11..=12).contains(&peak), "peak bin={peak}");
        assert!(spectrum.bins()[200] < 0.2);
    }

    #[test]
    fn window_is_blackman() {
        let w = build_blackman_window(512);
        assert_abs_diff_eq!(w[0], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(w[256], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(w[128], 0.34, epsilon = 1e-5);
    }

    #[test]
    fn bins_stay_within_full_scale() {
        let clipped: Vec<f32> = (0..512).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let spectrum = analyzer().analyze(&clipped);
        assert!(spectrum.bins().iter().all(|&b| (0.0..=FULL_SCALE).contains(&b)));
    }

    #[test]
    fn from_bins_clamps_and_scrubs_nan() {
        let spectrum = SpectrumBuffer::from_bins(vec![-0.5, 0.4, 3.0, f32::NAN]);
        assert_eq!(spectrum.bins(), &[0.0, 0.4, 1.0, 0.0]);
    }

    #[test]
    fn decibel_mapping_hits_range_edges() {
        // -10 dB → full scale, -90 dB → zero, -50 dB → midpoint
        let mags = [10f32.powf(-10.0 / 20.0), 10f32.powf(-90.0 / 20.0), 10f32.powf(-50.0 / 20.0)];
        let spectrum = SpectrumBuffer::from_magnitudes(&mags, -90.0, -10.0);
        assert_abs_diff_eq!(spectrum.bins()[0], 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(spectrum.bins()[1], 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(spectrum.bins()[2], 0.5, epsilon = 1e-4);
    }

    #[test]
    fn smoother_converges_toward_steady_input() {
        let mut smoother = SpectralSmoother::new(0.8);
        let mut last = 0.0;
        for _ in 0..30 {
            let mut mags = vec![1.0f32; 4];
            smoother.apply(&mut mags);
            assert!(mags[0] >= last);
            last = mags[0];
        }
        assert!(last > 0.99, "last={last}");

        smoother.reset();
        let mut mags = vec![1.0f32; 4];
        smoother.apply(&mut mags);
        assert_abs_diff_eq!(mags[0], 0.2, epsilon = 1e-6);
    }
}
