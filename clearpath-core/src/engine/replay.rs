//! Offline replay of recorded stereo audio.
//!
//! Runs the same frame processor and dispatcher as the live pipeline, but
//! synchronously and on the sample clock, so a recording always produces
//! the same events.

use tracing::info;

use crate::{
    audio::resample::RateConverter,
    buffering::frame::AudioFrame,
    dispatch::Dispatcher,
    engine::{pipeline::stream_time_ms, processor::FrameProcessor},
    error::Result,
    ipc::events::EngineEvent,
};

/// Resampler block used for replay, in frames per channel.
const REPLAY_RESAMPLE_CHUNK: usize = 1_024;

#[derive(Debug, Clone, Default)]
pub struct ReplayReport {
    pub frames_analyzed: usize,
    pub events: Vec<EngineEvent>,
}

impl ReplayReport {
    pub fn directional_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, EngineEvent::Directional(_)))
            .count()
    }

    pub fn environmental_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, EngineEvent::Environmental(_)))
            .count()
    }
}

/// Feed interleaved stereo samples through `processor`, dispatching every
/// event. A trailing partial frame is dropped.
///
/// # Errors
/// `ClearPathError::AudioStream` if a resampler cannot be built for
/// `capture_rate`.
pub fn replay_interleaved(
    processor: &mut FrameProcessor,
    dispatcher: &mut Dispatcher,
    interleaved: &[f32],
    capture_rate: u32,
) -> Result<ReplayReport> {
    let sample_rate = processor.config().sample_rate;
    let transform_size = processor.config().transform_size;

    let mut left = Vec::with_capacity(interleaved.len() / 2);
    let mut right = Vec::with_capacity(interleaved.len() / 2);
    for pair in interleaved.chunks_exact(2) {
        left.push(pair[0]);
        right.push(pair[1]);
    }

    let (left, right) = if capture_rate == sample_rate {
        (left, right)
    } else {
        RateConverter::new(capture_rate, sample_rate, REPLAY_RESAMPLE_CHUNK)?.process(&left, &right)
    };

    let mut report = ReplayReport::default();
    for (index, (l, r)) in left
        .chunks_exact(transform_size)
        .zip(right.chunks_exact(transform_size))
        .enumerate()
    {
        let frame = AudioFrame::new(
            l.to_vec(),
            r.to_vec(),
            stream_time_ms(index as u64, transform_size, sample_rate),
        );
        for event in processor.process_frame(&frame).into_events() {
            dispatcher.dispatch(&event);
            report.events.push(event);
        }
        report.frames_analyzed += 1;
    }

    info!(
        frames = report.frames_analyzed,
        directional = report.directional_count(),
        environmental = report.environmental_count(),
        "replay finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;

    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn noise(frames: usize, left_amp: f32, right_amp: f32) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(3);
        (0..frames)
            .flat_map(|_| {
                let s: f32 = rng.gen_range(-1.0..1.0);
                [s * left_amp, s * right_amp]
            })
            .collect()
    }

    #[test]
    fn silence_replays_without_events() {
        let mut processor = FrameProcessor::new(EngineConfig::default()).unwrap();
        let mut dispatcher = Dispatcher::detached();
        let report =
            replay_interleaved(&mut processor, &mut dispatcher, &vec![0.0; 512 * 2 * 20], 44_100)
                .unwrap();
        assert_eq!(report.frames_analyzed, 20);
        assert!(report.events.is_empty());
    }

    #[test]
    fn partial_trailing_frame_is_dropped() {
        let mut processor = FrameProcessor::new(EngineConfig::default()).unwrap();
        let mut dispatcher = Dispatcher::detached();
        let report =
            replay_interleaved(&mut processor, &mut dispatcher, &vec![0.0; 700 * 2], 44_100).unwrap();
        assert_eq!(report.frames_analyzed, 1);
    }

    #[test]
    fn replay_is_deterministic() {
        let samples = noise(44_100, 0.8, 0.005);
        let run = || {
            let mut processor = FrameProcessor::new(EngineConfig::default()).unwrap();
            let mut dispatcher = Dispatcher::detached();
            replay_interleaved(&mut processor, &mut dispatcher, &samples, 44_100).unwrap()
        };
        let a = run();
        let b = run();
        assert_eq!(a.events, b.events);
        assert!(a.directional_count() >= 1);
    }
}
