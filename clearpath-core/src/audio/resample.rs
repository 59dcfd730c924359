//! Stereo sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! Devices capture at their native rate (commonly 48 kHz); analysis runs at
//! the configured rate so band edges and frame timing stay fixed.
//! `RateConverter` resamples both channels in lockstep on the pipeline
//! thread, where allocation is allowed.
//!
//! When capture rate == target rate no rubato session is created and input
//! is returned unchanged.
//!
//! ```ignore
//! let mut rc = RateConverter::new(48_000, 44_100, 1_024)?;
//! let (left, right) = rc.process(&raw_left, &raw_right);
//! ```

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::error;

use crate::error::{ClearPathError, Result};

/// Converts f32 stereo audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` when capture rate == target rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    /// Partial input held between calls, one buffer per channel.
    pending_left: Vec<f32>,
    pending_right: Vec<f32>,
    /// Input frames rubato expects per process call.
    chunk_size: usize,
    /// Pre-allocated output buffer: `[2][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// # Errors
    /// `ClearPathError::AudioStream` if rubato fails to initialise.
    pub fn new(capture_rate: u32, target_rate: u32, chunk_size: usize) -> Result<Self> {
        if capture_rate == target_rate {
            return Ok(Self {
                resampler: None,
                pending_left: Vec::new(),
                pending_right: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
            });
        }

        let ratio = target_rate as f64 / capture_rate as f64;
        let resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, chunk_size, 2)
            .map_err(|e| ClearPathError::AudioStream(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        tracing::info!(
            capture_rate,
            target_rate,
            chunk_size,
            max_out,
            "stereo resampling enabled"
        );

        Ok(Self {
            resampler: Some(resampler),
            pending_left: Vec::new(),
            pending_right: Vec::new(),
            chunk_size,
            output_buf: vec![vec![0f32; max_out]; 2],
        })
    }

    /// Feed one block per channel; returns whatever output is ready (may be
    /// empty). Channels must have equal length; the longer one is truncated.
    pub fn process(&mut self, left: &[f32], right: &[f32]) -> (Vec<f32>, Vec<f32>) {
        let frames = left.len().min(right.len());
        let Some(ref mut resampler) = self.resampler else {
            return (left[..frames].to_vec(), right[..frames].to_vec());
        };

        self.pending_left.extend_from_slice(&left[..frames]);
        self.pending_right.extend_from_slice(&right[..frames]);

        let mut out_left = Vec::new();
        let mut out_right = Vec::new();

        while self.pending_left.len() >= self.chunk_size {
            let input = [
                &self.pending_left[..self.chunk_size],
                &self.pending_right[..self.chunk_size],
            ];
            match resampler.process_into_buffer(&input, &mut self.output_buf, None) {
                Ok((_consumed, produced)) => {
                    out_left.extend_from_slice(&self.output_buf[0][..produced]);
                    out_right.extend_from_slice(&self.output_buf[1][..produced]);
                }
                Err(e) => error!("resampler process error: {e}"),
            }
            self.pending_left.drain(..self.chunk_size);
            self.pending_right.drain(..self.chunk_size);
        }

        (out_left, out_right)
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}
