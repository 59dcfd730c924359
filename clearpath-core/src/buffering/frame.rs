//! Typed stereo frame passed from the ring buffer to the analysis stages.

/// One analysis window of synchronized left/right PCM samples.
///
/// Built on the pipeline thread and dropped after a single pass through
/// [`FrameProcessor`](crate::engine::processor::FrameProcessor).
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Left channel f32 samples in [-1.0, 1.0].
    pub left: Vec<f32>,
    /// Right channel f32 samples in [-1.0, 1.0].
    pub right: Vec<f32>,
    /// Position of the first sample on the stream's sample clock (ms).
    pub timestamp_ms: u64,
}

impl AudioFrame {
    pub fn new(left: Vec<f32>, right: Vec<f32>, timestamp_ms: u64) -> Self {
        Self {
            left,
            right,
            timestamp_ms,
        }
    }

    /// Split interleaved `[L, R, L, R, ..]` samples into a frame.
    ///
    /// A trailing unpaired sample is ignored.
    pub fn from_interleaved(samples: &[f32], timestamp_ms: u64) -> Self {
        let pairs = samples.len() / 2;
        let mut left = Vec::with_capacity(pairs);
        let mut right = Vec::with_capacity(pairs);
        for pair in samples.chunks_exact(2) {
            left.push(pair[0]);
            right.push(pair[1]);
        }
        Self::new(left, right, timestamp_ms)
    }

    /// Number of sample pairs (the shorter channel wins).
    pub fn len(&self) -> usize {
        self.left.len().min(self.right.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Duration of this frame in milliseconds at `sample_rate`.
    pub fn duration_ms(&self, sample_rate: u32) -> f64 {
        self.len() as f64 * 1000.0 / sample_rate as f64
    }
}
