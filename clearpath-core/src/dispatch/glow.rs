//! Visual glow cues.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::analysis::SoundType;

/// Renderer-facing description of one directional glow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlowCue {
    pub angle_degrees: f32,
    pub intensity: f32,
    pub duration_ms: u64,
    pub sound_type: SoundType,
}

/// Receives glow requests for the AR/visual layer.
pub trait GlowSink: Send + 'static {
    fn notify(&mut self, angle_degrees: f32, intensity: f32, duration_ms: u64, sound_type: SoundType);
}

/// Publishes cues on a tokio broadcast channel; lagging renderers miss cues.
pub struct BroadcastGlowSink {
    tx: broadcast::Sender<GlowCue>,
}

impl BroadcastGlowSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GlowCue> {
        self.tx.subscribe()
    }
}

impl GlowSink for BroadcastGlowSink {
    fn notify(&mut self, angle_degrees: f32, intensity: f32, duration_ms: u64, sound_type: SoundType) {
        // No subscribers is fine.
        let _ = self.tx.send(GlowCue {
            angle_degrees,
            intensity,
            duration_ms,
            sound_type,
        });
    }
}

/// Sink that discards every cue.
#[derive(Debug, Default)]
pub struct NullGlowSink;

impl GlowSink for NullGlowSink {
    fn notify(&mut self, _: f32, _: f32, _: u64, _: SoundType) {}
}
