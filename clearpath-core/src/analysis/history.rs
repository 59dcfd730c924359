//! Rolling window of total loudness used for environmental spike detection.
//!
//! ## Algorithm
//!
//! 1. Every frame appends `total_volume`; the oldest sample is evicted once
//!    the window holds `capacity` entries.
//! 2. Spike detection stays disarmed until the window is full.
//! 3. `recent_average` is the mean of every sample except the newest.
//! 4. A spike fires when the newest sample exceeds `recent_average` by more
//!    than the environmental margin *and* exceeds the volume floor.

use std::collections::VecDeque;

/// Default window length.
pub const DEFAULT_HISTORY_LENGTH: usize = 10;

/// Sudden loudness increase relative to the rolling average.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spike {
    pub volume: f32,
    pub average: f32,
}

/// Fixed-capacity FIFO of recent total volumes.
#[derive(Debug, Clone)]
pub struct VolumeHistory {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl VolumeHistory {
    /// `capacity` below 2 is raised to 2 (an average needs one prior sample).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, volume: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(volume);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }

    pub fn latest(&self) -> Option<f32> {
        self.samples.back().copied()
    }

    /// Mean of every sample except the most recent one.
    pub fn recent_average(&self) -> Option<f32> {
        let prior = self.samples.len().checked_sub(1).filter(|&n| n > 0)?;
        let sum: f32 = self.samples.iter().take(prior).sum();
        Some(sum / prior as f32)
    }

    /// Check the newest sample for a spike. Requires a full window.
    pub fn detect_spike(&self, environmental_threshold: f32, volume_threshold: f32) -> Option<Spike> {
        if !self.is_full() {
            return None;
        }
        let volume = self.latest()?;
        let average = self.recent_average()?;
        (volume > average + environmental_threshold && volume > volume_threshold)
            .then_some(Spike { volume, average })
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl Default for VolumeHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn length_never_exceeds_capacity() {
        let mut history = VolumeHistory::default();
        for i in 0..25 {
            history.push(i as f32 * 0.01);
            assert!(history.len() <= DEFAULT_HISTORY_LENGTH);
        }
        assert!(history.is_full());
    }

    #[test]
    fn eleventh_insert_evicts_exactly_the_oldest() {
        let mut history = VolumeHistory::default();
        for i in 0..10 {
            history.push(i as f32);
        }
        history.push(10.0);
        let values: Vec<f32> = history.iter().collect();
        assert_eq!(values, (1..=10).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn recent_average_excludes_newest() {
        let mut history = VolumeHistory::new(4);
        for v in [0.1, 0.2, 0.3, 0.9] {
            history.push(v);
        }
        assert_abs_diff_eq!(history.recent_average().unwrap(), 0.2, epsilon = 1e-6);
    }

    #[test]
    fn no_spike_until_window_is_full() {
        let mut history = VolumeHistory::default();
        for _ in 0..8 {
            history.push(0.0);
        }
        history.push(0.9);
        assert_eq!(history.len(), 9);
        assert!(history.detect_spike(0.15, 0.1).is_none());
    }

    #[test]
    fn spike_fires_on_sudden_jump() {
        let mut history = VolumeHistory::default();
        for _ in 0..9 {
            history.push(0.05);
        }
        history.push(0.5);
        let spike = history.detect_spike(0.15, 0.1).expect("spike");
        assert_abs_diff_eq!(spike.volume, 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(spike.average, 0.05, epsilon = 1e-6);
    }

    #[test]
    fn jump_below_volume_floor_is_ignored() {
        let mut history = VolumeHistory::default();
        for _ in 0..9 {
            history.push(0.0);
        }
        // Clears the 0.05 margin but not the 0.1 floor.
        history.push(0.09);
        assert!(history.detect_spike(0.05, 0.1).is_none());
    }

    #[test]
    fn steady_loud_signal_is_not_a_spike() {
        let mut history = VolumeHistory::default();
        for _ in 0..10 {
            history.push(0.6);
        }
        assert!(history.detect_spike(0.15, 0.1).is_none());
    }
}
