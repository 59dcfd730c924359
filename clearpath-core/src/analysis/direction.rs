//! Two-channel azimuth estimation.
//!
//! ## Algorithm
//!
//! 1. **Lateral angle** from the loudness difference between channels,
//!    `atan2(right - left, max) × 2` in degrees, clamped to ±90°. Differences
//!    within `direction_threshold` collapse to 0°.
//! 2. **Front/back** from the share of energy in the top third of the
//!    spectrum, averaged over both channels. High-frequency content is
//!    attenuated behind the listener, so a share above 0.3 means "front".
//! 3. **Azimuth**: front → `90 + base`, rear → `270 - base`, wrapped to
//!    `[0, 360)`.
//! 4. **Confidence** `min(1, max / volume_threshold)`, **intensity**
//!    `min(1, max × 1.2)`.

use serde::{Deserialize, Serialize};

use super::{classifier::SoundType, spectrum::SpectrumBuffer, volume::ChannelVolumes};

/// High-band share above which a sound is placed in front.
pub const FRONT_BACK_SPLIT: f32 = 0.3;
/// Factor reported when either channel carries no energy at all.
pub const NEUTRAL_FRONT_BACK: f32 = 0.5;
/// Estimates must be strictly more confident than this to be acted on.
pub const CONFIDENCE_GATE: f32 = 0.6;

const INTENSITY_GAIN: f32 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hemisphere {
    Front,
    Rear,
}

impl Hemisphere {
    pub fn from_front_back_factor(factor: f32) -> Self {
        if factor > FRONT_BACK_SPLIT {
            Hemisphere::Front
        } else {
            Hemisphere::Rear
        }
    }
}

/// One frame's direction estimate. Never mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionEstimate {
    /// Azimuth in `[0, 360)`.
    pub azimuth_degrees: f32,
    pub confidence: f32,
    pub intensity: f32,
    pub sound_type: SoundType,
    pub hemisphere: Hemisphere,
    pub volumes: ChannelVolumes,
}

impl DirectionEstimate {
    pub fn is_actionable(&self) -> bool {
        self.confidence > CONFIDENCE_GATE
    }
}

/// Fraction of energy in the top third of each spectrum, averaged.
pub fn front_back_factor(left: &SpectrumBuffer, right: &SpectrumBuffer) -> f32 {
    match (high_band_share(left.bins()), high_band_share(right.bins())) {
        (Some(l), Some(r)) => (l + r) / 2.0,
        _ => NEUTRAL_FRONT_BACK,
    }
}

fn high_band_share(bins: &[f32]) -> Option<f32> {
    let third = bins.len() as f32 / 3.0;
    let mut total = 0.0f32;
    let mut high = 0.0f32;
    for (i, &b) in bins.iter().enumerate() {
        total += b;
        if i as f32 >= third * 2.0 {
            high += b;
        }
    }
    (total > 0.0).then(|| high / total)
}

/// Lateral angle in `[-90, 90]`; negative means left.
pub fn lateral_angle(volumes: ChannelVolumes, direction_threshold: f32) -> f32 {
    let difference = volumes.difference();
    if difference.abs() <= direction_threshold {
        return 0.0;
    }
    (difference.atan2(volumes.max()).to_degrees() * 2.0).clamp(-90.0, 90.0)
}

/// Place a lateral angle on the full circle.
pub fn synthesize_azimuth(base_angle: f32, hemisphere: Hemisphere) -> f32 {
    let raw = match hemisphere {
        Hemisphere::Front => 90.0 + base_angle,
        Hemisphere::Rear => 270.0 - base_angle,
    };
    let wrapped = raw.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Stateless estimator parameterised by the engine thresholds.
#[derive(Debug, Clone, Copy)]
pub struct DirectionEstimator {
    volume_threshold: f32,
    direction_threshold: f32,
}

impl DirectionEstimator {
    pub fn new(volume_threshold: f32, direction_threshold: f32) -> Self {
        Self {
            volume_threshold,
            direction_threshold,
        }
    }

    pub fn estimate(
        &self,
        volumes: ChannelVolumes,
        front_back: f32,
        sound_type: SoundType,
    ) -> DirectionEstimate {
        let base = lateral_angle(volumes, self.direction_threshold);
        let hemisphere = Hemisphere::from_front_back_factor(front_back);
        let max_volume = volumes.max();

        DirectionEstimate {
            azimuth_degrees: synthesize_azimuth(base, hemisphere),
            confidence: (max_volume / self.volume_threshold).min(1.0),
            intensity: (max_volume * INTENSITY_GAIN).min(1.0),
            sound_type,
            hemisphere,
            volumes,
        }
    }
}
