//! Stereo WAV loading for offline replay.

use std::path::Path;

use crate::error::{ClearPathError, Result};

/// Decoded recording as interleaved `[L, R]` samples.
#[derive(Debug, Clone)]
pub struct StereoRecording {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Channel count in the file before folding to stereo.
    pub source_channels: u16,
}

impl StereoRecording {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn duration_ms(&self) -> u64 {
        self.frames() as u64 * 1_000 / u64::from(self.sample_rate.max(1))
    }
}

/// Read a WAV file, normalising samples to `[-1, 1]`. Mono files are
/// duplicated to both channels; extra channels are dropped.
///
/// # Errors
/// `ClearPathError::AudioStream` if the file cannot be decoded.
pub fn read_stereo_wav(path: &Path) -> Result<StereoRecording> {
    let wav_err = |e: hound::Error| ClearPathError::AudioStream(format!("{}: {e}", path.display()));

    let mut reader = hound::WavReader::open(path).map_err(wav_err)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(wav_err)?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(wav_err)?
        }
    };

    let mut samples = Vec::with_capacity(interleaved.len() / channels * 2);
    for frame in interleaved.chunks_exact(channels) {
        let left = frame[0];
        let right = frame.get(1).copied().unwrap_or(left);
        samples.push(left);
        samples.push(right);
    }

    Ok(StereoRecording {
        samples,
        sample_rate: spec.sample_rate,
        source_channels: spec.channels,
    })
}
