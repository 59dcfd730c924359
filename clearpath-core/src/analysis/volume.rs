//! Spectrum → normalized loudness.

use super::spectrum::{SpectrumBuffer, FULL_SCALE};

/// `sum(bins) / (len × FULL_SCALE)`, clamped to `[0, 1]`. Empty → 0.
pub fn average_volume(spectrum: &SpectrumBuffer) -> f32 {
    if spectrum.is_empty() {
        return 0.0;
    }
    (spectrum.total() / (spectrum.len() as f32 * FULL_SCALE)).clamp(0.0, 1.0)
}

/// Loudness of both channels for the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelVolumes {
    pub left: f32,
    pub right: f32,
}

impl ChannelVolumes {
    pub fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    pub fn measure(left: &SpectrumBuffer, right: &SpectrumBuffer) -> Self {
        Self::new(average_volume(left), average_volume(right))
    }

    /// Mean of both channels.
    pub fn total(&self) -> f32 {
        (self.left + self.right) / 2.0
    }

    pub fn max(&self) -> f32 {
        self.left.max(self.right)
    }

    /// `right - left`; positive means the right channel is louder.
    pub fn difference(&self) -> f32 {
        self.right - self.left
    }
}
