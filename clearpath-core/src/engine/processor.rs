//! Synchronous per-frame pipeline.
//!
//! ## Stages (per frame)
//!
//! ```text
//! 0. Close the cooldown window if it has elapsed
//! 1. FFT both channels (+ optional temporal smoothing)
//! 2. Channel volumes, total = mean
//! 3. Push total into history → environmental spike?   (ignores cooldown)
//! 4. total > volume_threshold and arbiter idle?
//!    a. classify band shares
//!    b. front/back factor + lateral angle → estimate
//!    c. arbiter: trigger if confidence > 0.6
//! ```
//!
//! `FrameProcessor` owns all mutable engine state. It has no clock of its
//! own: each frame carries its timestamp, so feeding recorded or synthetic
//! frames replays deterministically.

use tracing::{debug, trace};

use crate::{
    analysis::{
        direction::front_back_factor, BandEnergyClassifier, ChannelAnalyzer, ChannelVolumes,
        DirectionEstimator, SoundClassifier, SpectralSmoother, SpectrumBuffer, VolumeHistory,
    },
    buffering::frame::AudioFrame,
    engine::{
        arbiter::{EventArbiter, Verdict},
        EngineConfig,
    },
    error::Result,
    ipc::events::{DirectionalEvent, EngineEvent, EnvironmentalEvent},
};

/// Emit a level report roughly this often (in stream time).
const LEVEL_LOG_INTERVAL_MS: u64 = 1_000;

/// Events produced by a single frame. Both may fire on the same frame.
#[derive(Debug, Clone, Default)]
pub struct FrameEvents {
    pub environmental: Option<EnvironmentalEvent>,
    pub directional: Option<DirectionalEvent>,
    /// Arbiter decision, when direction estimation was attempted or skipped
    /// because of the cooldown.
    pub verdict: Option<Verdict>,
}

impl FrameEvents {
    pub fn is_empty(&self) -> bool {
        self.environmental.is_none() && self.directional.is_none()
    }

    /// Environmental first, then directional.
    pub fn into_events(self) -> impl Iterator<Item = EngineEvent> {
        self.environmental
            .map(EngineEvent::Environmental)
            .into_iter()
            .chain(self.directional.map(EngineEvent::Directional))
    }
}

/// Read-only view of the processor's engine state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessorState {
    pub current_direction: Option<f32>,
    pub last_trigger_ms: Option<u64>,
    pub history_length: usize,
}

pub struct FrameProcessor {
    config: EngineConfig,
    analyzer: ChannelAnalyzer,
    smoothers: Option<(SpectralSmoother, SpectralSmoother)>,
    classifier: Box<dyn SoundClassifier>,
    estimator: DirectionEstimator,
    history: VolumeHistory,
    arbiter: EventArbiter,
    seq: u64,
    last_level_log_ms: Option<u64>,
}

impl FrameProcessor {
    /// Build a processor with the default band-energy classifier.
    ///
    /// # Errors
    /// `ClearPathError::InvalidConfig` if `config` fails validation.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let classifier = Box::new(BandEnergyClassifier::new(
            config.sample_rate,
            config.transform_size,
        ));
        Self::with_classifier(config, classifier)
    }

    pub fn with_classifier(config: EngineConfig, classifier: Box<dyn SoundClassifier>) -> Result<Self> {
        config.validate()?;

        let smoothers = (config.smoothing_time_constant > 0.0).then(|| {
            (
                SpectralSmoother::new(config.smoothing_time_constant),
                SpectralSmoother::new(config.smoothing_time_constant),
            )
        });

        Ok(Self {
            analyzer: ChannelAnalyzer::new(
                config.transform_size,
                config.min_decibels,
                config.max_decibels,
            ),
            smoothers,
            classifier,
            estimator: DirectionEstimator::new(config.volume_threshold, config.direction_threshold),
            history: VolumeHistory::new(config.history_length),
            arbiter: EventArbiter::new(config.trigger_cooldown_ms),
            seq: 0,
            last_level_log_ms: None,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the full pipeline on one stereo frame.
    pub fn process_frame(&mut self, frame: &AudioFrame) -> FrameEvents {
        let (left, right) = match self.smoothers.as_mut() {
            Some((smooth_l, smooth_r)) => {
                let mut mags_l = self.analyzer.magnitudes(&frame.left);
                let mut mags_r = self.analyzer.magnitudes(&frame.right);
                smooth_l.apply(&mut mags_l);
                smooth_r.apply(&mut mags_r);
                (
                    self.analyzer.to_spectrum(&mags_l),
                    self.analyzer.to_spectrum(&mags_r),
                )
            }
            None => self.analyzer.analyze_frame(frame),
        };
        self.process_spectra(&left, &right, frame.timestamp_ms)
    }

    /// Run stages 0 and 2–4 on precomputed spectra.
    pub fn process_spectra(
        &mut self,
        left: &SpectrumBuffer,
        right: &SpectrumBuffer,
        now_ms: u64,
    ) -> FrameEvents {
        if self.arbiter.expire(now_ms) {
            trace!(now_ms, "cooldown elapsed, direction cleared");
        }

        let volumes = ChannelVolumes::measure(left, right);
        let total = volumes.total();
        self.log_levels(volumes, now_ms);

        let mut events = FrameEvents::default();

        self.history.push(total);
        if let Some(spike) = self.history.detect_spike(
            self.config.environmental_sound_threshold,
            self.config.volume_threshold,
        ) {
            events.environmental = Some(EnvironmentalEvent {
                seq: self.next_seq(),
                timestamp_ms: now_ms,
                volume: spike.volume,
                average: spike.average,
            });
        }

        if total <= self.config.volume_threshold {
            return events;
        }
        if !self.arbiter.is_idle() {
            events.verdict = Some(Verdict::CoolingDown);
            return events;
        }

        let sound_type = self.classifier.classify(left, right);
        let estimate = self
            .estimator
            .estimate(volumes, front_back_factor(left, right), sound_type);

        let verdict = self.arbiter.offer(&estimate, now_ms);
        events.verdict = Some(verdict);
        match verdict {
            Verdict::Triggered => {
                events.directional = Some(DirectionalEvent {
                    seq: self.next_seq(),
                    timestamp_ms: now_ms,
                    azimuth_degrees: estimate.azimuth_degrees,
                    confidence: estimate.confidence,
                    intensity: estimate.intensity,
                    sound_type: estimate.sound_type,
                    hemisphere: estimate.hemisphere,
                    left_volume: volumes.left,
                    right_volume: volumes.right,
                });
            }
            Verdict::LowConfidence => {
                debug!(
                    confidence = format_args!("{:.3}", estimate.confidence),
                    "direction below confidence gate"
                );
            }
            Verdict::CoolingDown => {}
        }

        events
    }

    pub fn state(&self) -> ProcessorState {
        ProcessorState {
            current_direction: self.arbiter.current_direction(),
            last_trigger_ms: self.arbiter.last_trigger_ms(),
            history_length: self.history.len(),
        }
    }

    /// Drop all rolling state (history, cooldown, smoothing).
    pub fn reset(&mut self) {
        self.history.clear();
        self.arbiter.reset();
        self.classifier.reset();
        if let Some((l, r)) = self.smoothers.as_mut() {
            l.reset();
            r.reset();
        }
        self.last_level_log_ms = None;
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }

    fn log_levels(&mut self, volumes: ChannelVolumes, now_ms: u64) {
        let due = self
            .last_level_log_ms
            .map(|t| now_ms.saturating_sub(t) >= LEVEL_LOG_INTERVAL_MS)
            .unwrap_or(true);
        if due {
            self.last_level_log_ms = Some(now_ms);
            debug!(
                left = format_args!("{:.3}", volumes.left),
                right = format_args!("{:.3}", volumes.right),
                total = format_args!("{:.3}", volumes.total()),
                "audio levels"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Hemisphere, SoundType};

    fn uniform(value: f32) -> SpectrumBuffer {
        SpectrumBuffer::from_bins(vec![value; 256])
    }

    fn processor() -> FrameProcessor {
        FrameProcessor::new(EngineConfig::default()).expect("default config is valid")
    }

    #[test]
    fn quiet_frames_emit_nothing() {
        let mut p = processor();
        for i in 0..30 {
            let events = p.process_spectra(&uniform(0.05), &uniform(0.05), i * 16);
            assert!(events.is_empty());
            assert!(events.verdict.is_none());
        }
        assert_eq!(p.state().history_length, 10);
    }

    #[test]
    fn loud_left_frame_triggers_directional_event() {
        let mut p = processor();
        let events = p.process_spectra(&uniform(0.8), &uniform(0.2), 0);
        let event = events.directional.expect("directional event");
        assert_eq!(events.verdict, Some(Verdict::Triggered));
        // Uniform spectra put a third of the energy in the top band → front.
        assert_eq!(event.hemisphere, Hemisphere::Front);
        assert!(event.azimuth_degrees < 90.0);
        approx::assert_abs_diff_eq!(event.left_volume, 0.8, epsilon = 1e-5);
        assert_eq!(p.state().current_direction, Some(event.azimuth_degrees));
        assert_eq!(p.state().last_trigger_ms, Some(0));
    }

    #[test]
    fn cooldown_blocks_then_releases() {
        let mut p = processor();
        assert!(p.process_spectra(&uniform(0.8), &uniform(0.2), 0).directional.is_some());
        let blocked = p.process_spectra(&uniform(0.8), &uniform(0.2), 500);
        assert!(blocked.directional.is_none());
        assert_eq!(blocked.verdict, Some(Verdict::CoolingDown));
        assert!(p.state().current_direction.is_some());

        let released = p.process_spectra(&uniform(0.8), &uniform(0.2), 1_000);
        assert!(released.directional.is_some());
    }

    #[test]
    fn direction_cleared_once_cooldown_elapses_even_when_quiet() {
        let mut p = processor();
        p.process_spectra(&uniform(0.8), &uniform(0.2), 0);
        p.process_spectra(&uniform(0.0), &uniform(0.0), 1_200);
        assert_eq!(p.state().current_direction, None);
        assert_eq!(p.state().last_trigger_ms, Some(0));
    }

    #[test]
    fn silent_spectra_never_estimate() {
        let mut p = processor();
        let events = p.process_spectra(&uniform(0.0), &uniform(0.0), 0);
        assert!(events.is_empty());
        assert!(events.verdict.is_none());
    }

    #[test]
    fn classification_flows_into_event() {
        let mut p = processor();
        // Mid band (bins 8..24) dominant with some high energy → speech.
        let mut bins = vec![0.0f32; 256];
        for b in bins.iter_mut().take(24).skip(8) {
            *b = 1.0;
        }
        for b in bins.iter_mut().take(64).skip(24) {
            *b = 0.3;
        }
        // total ≈ (16 + 12) / 256 ≈ 0.109 > 0.1
        let spectrum = SpectrumBuffer::from_bins(bins);
        let event = p
            .process_spectra(&spectrum, &spectrum, 0)
            .directional
            .expect("directional event");
        assert_eq!(event.sound_type, SoundType::Speech);
        // Nothing above bin 170 → rear hemisphere, balanced → 270°.
        assert_eq!(event.hemisphere, Hemisphere::Rear);
        assert!((event.azimuth_degrees - 270.0).abs() < 1e-4);
    }

    #[test]
    fn sequence_numbers_are_shared_across_event_kinds() {
        let mut p = processor();
        for i in 0..10 {
            p.process_spectra(&uniform(0.0), &uniform(0.0), i * 16);
        }
        let events = p.process_spectra(&uniform(0.9), &uniform(0.3), 160);
        let env = events.environmental.clone().expect("spike");
        let dir = events.directional.clone().expect("direction");
        assert_eq!(env.seq, 0);
        assert_eq!(dir.seq, 1);
        let kinds: Vec<u64> = events.into_events().map(|e| e.seq()).collect();
        assert_eq!(kinds, vec![0, 1]);
    }

    #[test]
    fn reset_clears_history_and_cooldown() {
        let mut p = processor();
        for i in 0..12 {
            p.process_spectra(&uniform(0.8), &uniform(0.2), i * 16);
        }
        p.reset();
        let state = p.state();
        assert_eq!(state.history_length, 0);
        assert_eq!(state.current_direction, None);
        assert_eq!(state.last_trigger_ms, None);
        assert!(p.process_spectra(&uniform(0.8), &uniform(0.2), 200).directional.is_some());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig {
            transform_size: 500,
            ..EngineConfig::default()
        };
        assert!(FrameProcessor::new(config).is_err());
    }

    #[test]
    fn raw_frames_go_through_the_analyzer() {
        let config = EngineConfig {
            smoothing_time_constant: 0.0,
            ..EngineConfig::default()
        };
        let mut p = FrameProcessor::new(config).unwrap();
        let silent = AudioFrame::new(vec![0.0; 512], vec![0.0; 300], 0);
        assert!(p.process_frame(&silent).is_empty());
        assert_eq!(p.state().history_length, 1);
    }
}
