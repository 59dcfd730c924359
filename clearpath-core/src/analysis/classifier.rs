//! Sound character classification from band energy ratios.
//!
//! The `SoundClassifier` trait is the extensibility point: the default
//! [`BandEnergyClassifier`] buckets energy into low/mid/high bands, and any
//! future model can be swapped in without touching the frame processor.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::spectrum::SpectrumBuffer;

/// Upper edge of the low band (Hz). At 44.1 kHz / 512 this is bin 8.
pub const LOW_BAND_MAX_HZ: f32 = 689.0;
/// Upper edge of the mid band (Hz). At 44.1 kHz / 512 this is bin 24.
pub const MID_BAND_MAX_HZ: f32 = 2_067.0;
/// Upper edge of the high band (Hz). At 44.1 kHz / 512 this is bin 64.
pub const HIGH_BAND_MAX_HZ: f32 = 5_512.0;

/// Coarse character of the dominant sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundType {
    Speech,
    Mechanical,
    Environmental,
    General,
    Silence,
}

impl SoundType {
    pub fn as_str(self) -> &'static str {
        match self {
            SoundType::Speech => "speech",
            SoundType::Mechanical => "mechanical",
            SoundType::Environmental => "environmental",
            SoundType::General => "general",
            SoundType::Silence => "silence",
        }
    }

    /// Apply the band-share rules. First match wins.
    pub fn from_band_energies(low: f32, mid: f32, high: f32) -> Self {
        match BandShares::from_energies(low, mid, high) {
            None => SoundType::Silence,
            Some(s) if s.mid > 0.5 && s.high > 0.25 => SoundType::Speech,
            Some(s) if s.low > 0.6 => SoundType::Mechanical,
            Some(s) if s.high > 0.4 => SoundType::Environmental,
            Some(_) => SoundType::General,
        }
    }
}

impl fmt::Display for SoundType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fraction of total energy in each band; sums to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandShares {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

impl BandShares {
    /// `None` when the total energy is zero.
    pub fn from_energies(low: f32, mid: f32, high: f32) -> Option<Self> {
        let total = low + mid + high;
        if total <= 0.0 {
            return None;
        }
        Some(Self {
            low: low / total,
            mid: mid / total,
            high: high / total,
        })
    }
}

/// Bin ranges of the three classification bands for one transform setup.
///
/// Must be rebuilt whenever sample rate or transform size changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandLayout {
    pub low: Range<usize>,
    pub mid: Range<usize>,
    pub high: Range<usize>,
}

impl BandLayout {
    pub fn for_transform(sample_rate: u32, transform_size: usize) -> Self {
        let bins = transform_size / 2;
        let bin_hz = sample_rate as f32 / transform_size as f32;
        let edge = |hz: f32| ((hz / bin_hz).round() as usize).min(bins);

        let low_end = edge(LOW_BAND_MAX_HZ);
        let mid_end = edge(MID_BAND_MAX_HZ).max(low_end);
        let high_end = edge(HIGH_BAND_MAX_HZ).max(mid_end);

        Self {
            low: 0..low_end,
            mid: low_end..mid_end,
            high: mid_end..high_end,
        }
    }

    /// Band energies `(low, mid, high)` of an already-averaged bin slice.
    pub fn energies(&self, bins: &[f32]) -> (f32, f32, f32) {
        let sum = |r: &Range<usize>| -> f32 {
            let end = r.end.min(bins.len());
            let start = r.start.min(end);
            bins[start..end].iter().sum()
        };
        (sum(&self.low), sum(&self.mid), sum(&self.high))
    }
}

/// Trait for all sound classifiers.
///
/// Implementors may be stateful (e.g. temporal smoothing of decisions).
pub trait SoundClassifier: Send + 'static {
    /// Classify one frame from its left/right spectra.
    fn classify(&mut self, left: &SpectrumBuffer, right: &SpectrumBuffer) -> SoundType;

    /// Reset any internal state.
    fn reset(&mut self) {}
}

/// Rule-based classifier over the bin-wise mean of both channels.
#[derive(Debug, Clone)]
pub struct BandEnergyClassifier {
    layout: BandLayout,
}

impl BandEnergyClassifier {
    pub fn new(sample_rate: u32, transform_size: usize) -> Self {
        Self {
            layout: BandLayout::for_transform(sample_rate, transform_size),
        }
    }

    pub fn layout(&self) -> &BandLayout {
        &self.layout
    }
}

impl SoundClassifier for BandEnergyClassifier {
    fn classify(&mut self, left: &SpectrumBuffer, right: &SpectrumBuffer) -> SoundType {
        let averaged: Vec<f32> = left
            .bins()
            .iter()
            .zip(right.bins())
            .map(|(l, r)| (l + r) / 2.0)
            .collect();
        let (low, mid, high) = self.layout.energies(&averaged);
        SoundType::from_band_energies(low, mid, high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum_with_bands(layout: &BandLayout, len: usize, low: f32, mid: f32, high: f32) -> SpectrumBuffer {
        let mut bins = vec![0.0; len];
        for i in layout.low.clone() {
            bins[i] = low;
        }
        for i in layout.mid.clone() {
            bins[i] = mid;
        }
        for i in layout.high.clone() {
            bins[i] = high;
        }
        SpectrumBuffer::from_bins(bins)
    }

    #[test]
    fn default_layout_matches_reference_bins() {
        let layout = BandLayout::for_transform(44_100, 512);
        assert_eq!(layout.low, 0..8);
        assert_eq!(layout.mid, 8..24);
        assert_eq!(layout.high, 24..64);
    }

    #[test]
    fn layout_is_recomputed_for_other_setups() {
        let layout = BandLayout::for_transform(48_000, 1024);
        assert_eq!(layout.low, 0..15);
        assert_eq!(layout.mid, 15..44);
        assert_eq!(layout.high, 44..118);
    }

    #[test]
    fn layout_clamps_to_bin_count() {
        let layout = BandLayout::for_transform(8_000, 32);
        assert!(layout.high.end <= 16);
        assert!(layout.low.end <= layout.mid.end && layout.mid.end <= layout.high.end);
    }

    #[test]
    fn speech_shares_classify_as_speech() {
        assert_eq!(SoundType::from_band_energies(0.1, 0.6, 0.3), SoundType::Speech);
    }

    #[test]
    fn rule_order_is_respected() {
        assert_eq!(SoundType::from_band_energies(0.0, 0.0, 0.0), SoundType::Silence);
        assert_eq!(SoundType::from_band_energies(0.7, 0.2, 0.1), SoundType::Mechanical);
        assert_eq!(SoundType::from_band_energies(0.1, 0.45, 0.45), SoundType::Environmental);
        assert_eq!(SoundType::from_band_energies(0.4, 0.4, 0.2), SoundType::General);
        // mid > 0.5 but high too small for speech, low too small for mechanical
        assert_eq!(SoundType::from_band_energies(0.35, 0.55, 0.1), SoundType::General);
    }

    #[test]
    fn zero_spectrum_is_silence() {
        let mut classifier = BandEnergyClassifier::new(44_100, 512);
        let silent = SpectrumBuffer::silent(256);
        assert_eq!(classifier.classify(&silent, &silent), SoundType::Silence);
    }

    #[test]
    fn classification_is_deterministic() {
        let mut classifier = BandEnergyClassifier::new(44_100, 512);
        let layout = classifier.layout().clone();
        // low 8 bins, mid 16 bins, high 40 bins
        let left = spectrum_with_bands(&layout, 256, 0.1, 0.5, 0.1);
        let right = spectrum_with_bands(&layout, 256, 0.1, 0.4, 0.1);
        let first = classifier.classify(&left, &right);
        for _ in 0..5 {
            assert_eq!(classifier.classify(&left, &right), first);
        }
    }

    #[test]
    fn averaged_channels_drive_band_shares() {
        let mut classifier = BandEnergyClassifier::new(44_100, 512);
        let layout = classifier.layout().clone();
        // Energy only below 689 Hz on one channel → mechanical.
        let left = spectrum_with_bands(&layout, 256, 0.9, 0.0, 0.0);
        let right = SpectrumBuffer::silent(256);
        assert_eq!(classifier.classify(&left, &right), SoundType::Mechanical);
        // Energy only above 2 kHz → environmental.
        let left = spectrum_with_bands(&layout, 256, 0.0, 0.0, 0.5);
        assert_eq!(classifier.classify(&left, &left), SoundType::Environmental);
    }

    #[test]
    fn sound_type_serializes_lowercase() {
        let json = serde_json::to_string(&SoundType::Environmental).unwrap();
        assert_eq!(json, r#""environmental""#);
        assert_eq!(SoundType::Speech.to_string(), "speech");
    }
}
