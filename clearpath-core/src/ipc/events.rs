//! Event types published by the engine.
//!
//! ## Channels
//!
//! | Event | Subscription |
//! |-------|--------------|
//! | `EngineEvent` (directional + environmental) | `ClearPathEngine::subscribe_events` |
//! | `EngineStatusEvent` | `ClearPathEngine::subscribe_status` |
//!
//! Consumers only ever receive these owned payloads, never engine state.

use serde::{Deserialize, Serialize};

use crate::analysis::{Hemisphere, SoundType};

// ---------------------------------------------------------------------------
// Sound events
// ---------------------------------------------------------------------------

/// A localized sound that passed confidence gating and the cooldown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectionalEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Stream time of the triggering frame (ms).
    pub timestamp_ms: u64,
    /// Azimuth in [0, 360).
    pub azimuth_degrees: f32,
    pub confidence: f32,
    pub intensity: f32,
    pub sound_type: SoundType,
    pub hemisphere: Hemisphere,
    pub left_volume: f32,
    pub right_volume: f32,
}

/// A sudden loudness spike relative to the rolling average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentalEvent {
    pub seq: u64,
    pub timestamp_ms: u64,
    /// Total volume of the spiking frame.
    pub volume: f32,
    /// Mean total volume of the preceding window.
    pub average: f32,
}

/// Everything the frame processor can emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EngineEvent {
    Directional(DirectionalEvent),
    Environmental(EnvironmentalEvent),
}

impl EngineEvent {
    pub fn seq(&self) -> u64 {
        match self {
            EngineEvent::Directional(e) => e.seq,
            EngineEvent::Environmental(e) => e.seq,
        }
    }

    pub fn timestamp_ms(&self) -> u64 {
        match self {
            EngineEvent::Directional(e) => e.timestamp_ms,
            EngineEvent::Environmental(e) => e.timestamp_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine status
// ---------------------------------------------------------------------------

/// Published when the engine state changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Lifecycle state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Created, `start()` not yet called.
    Idle,
    /// Capturing and analysing audio.
    Listening,
    /// Capture stopped (by request or because the source went away).
    Stopped,
    /// Audio source could not be acquired.
    Error,
}

/// Answer to a status query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub is_active: bool,
    /// Whether an audio source is currently open.
    pub has_source: bool,
    /// Azimuth of the last trigger while its cooldown window is open.
    pub current_direction: Option<f32>,
    pub last_trigger_ms: Option<u64>,
    pub history_length: usize,
}
