//! Routes arbitrated events to the glow renderer and the haptic relay.
//!
//! | Event | Glow | Haptic |
//! |-------|------|--------|
//! | Directional, azimuth in [270, 360) ∪ [0, 90) | yes | `leftSound` |
//! | Directional, azimuth in [90, 270) | yes | `rightSound` |
//! | Environmental | no | `environmental` |
//!
//! The azimuth ranges are kept exactly as the product defined them, even
//! though [270, 90) is the *front* half of the circle in the azimuth
//! convention. Do not swap them without product sign-off.
//!
//! Sinks are infallible from the engine's point of view; nothing raised by a
//! transport ever propagates back into the pipeline.

pub mod glow;
pub mod relay;

pub use glow::{BroadcastGlowSink, GlowCue, GlowSink, NullGlowSink};
pub use relay::{ChannelRelay, HapticEventKind, HapticRelay, NullRelay, RelayMessage};

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, info};

use crate::ipc::events::{DirectionalEvent, EngineEvent, EnvironmentalEvent};

/// Default on-screen lifetime of a directional glow.
pub const DEFAULT_GLOW_DURATION_MS: u64 = 1_500;

/// Haptic pattern family for a directional event.
pub fn haptic_kind_for_azimuth(azimuth_degrees: f32) -> HapticEventKind {
    if azimuth_degrees >= 270.0 || azimuth_degrees < 90.0 {
        HapticEventKind::LeftSound
    } else {
        HapticEventKind::RightSound
    }
}

pub struct Dispatcher {
    glow: Box<dyn GlowSink>,
    relay: Box<dyn HapticRelay>,
    glow_duration_ms: u64,
}

impl Dispatcher {
    pub fn new(glow: Box<dyn GlowSink>, relay: Box<dyn HapticRelay>, glow_duration_ms: u64) -> Self {
        Self {
            glow,
            relay,
            glow_duration_ms,
        }
    }

    /// Dispatcher with no-op sinks; events still flow to engine subscribers.
    pub fn detached() -> Self {
        Self::new(
            Box::new(NullGlowSink),
            Box::new(NullRelay),
            DEFAULT_GLOW_DURATION_MS,
        )
    }

    pub fn set_glow_duration_ms(&mut self, duration_ms: u64) {
        self.glow_duration_ms = duration_ms;
    }

    pub fn dispatch(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::Directional(e) => self.dispatch_directional(e),
            EngineEvent::Environmental(e) => self.dispatch_environmental(e),
        }
    }

    pub fn dispatch_directional(&mut self, event: &DirectionalEvent) {
        info!(
            azimuth = format_args!("{:.0}", event.azimuth_degrees),
            intensity = format_args!("{:.3}", event.intensity),
            sound_type = %event.sound_type,
            "{} sound from {:.0}°",
            event.sound_type,
            event.azimuth_degrees
        );

        self.glow.notify(
            event.azimuth_degrees,
            event.intensity,
            self.glow_duration_ms,
            event.sound_type,
        );

        let kind = haptic_kind_for_azimuth(event.azimuth_degrees);
        let delivered = self.relay.send(RelayMessage::new(
            kind,
            json!({
                "angle": event.azimuth_degrees,
                "intensity": event.intensity,
                "soundType": event.sound_type,
            }),
        ));
        debug!(kind = kind.as_str(), delivered, "directional haptic relayed");
    }

    pub fn dispatch_environmental(&mut self, event: &EnvironmentalEvent) {
        info!(
            volume = format_args!("{:.3}", event.volume),
            average = format_args!("{:.3}", event.average),
            "environmental sound detected"
        );
        let delivered = self.relay.send(RelayMessage::new(
            HapticEventKind::Environmental,
            json!({
                "volume": event.volume,
                "average": event.average,
            }),
        ));
        debug!(delivered, "environmental haptic relayed");
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("glow_duration_ms", &self.glow_duration_ms)
            .finish_non_exhaustive()
    }
}

/// Thread-safe reference-counted handle to a [`Dispatcher`].
///
/// The pipeline thread dispatches through it while the owner keeps a clone
/// to reconfigure sinks between runs.
#[derive(Clone)]
pub struct DispatcherHandle(pub Arc<Mutex<Dispatcher>>);

impl DispatcherHandle {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self(Arc::new(Mutex::new(dispatcher)))
    }

    pub fn dispatch(&self, event: &EngineEvent) {
        self.0.lock().dispatch(event);
    }
}

impl std::fmt::Debug for DispatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Hemisphere, SoundType};
    use crossbeam_channel::Receiver;

    #[derive(Clone, Default)]
    struct RecordingGlow {
        cues: Arc<Mutex<Vec<GlowCue>>>,
    }

    impl GlowSink for RecordingGlow {
        fn notify(&mut self, angle_degrees: f32, intensity: f32, duration_ms: u64, sound_type: SoundType) {
            self.cues.lock().push(GlowCue {
                angle_degrees,
                intensity,
                duration_ms,
                sound_type,
            });
        }
    }

    fn directional(azimuth: f32) -> DirectionalEvent {
        DirectionalEvent {
            seq: 0,
            timestamp_ms: 0,
            azimuth_degrees: azimuth,
            confidence: 1.0,
            intensity: 0.7,
            sound_type: SoundType::Speech,
            hemisphere: Hemisphere::Front,
            left_volume: 0.5,
            right_volume: 0.5,
        }
    }

    fn dispatcher() -> (Dispatcher, RecordingGlow, Receiver<RelayMessage>) {
        let glow = RecordingGlow::default();
        let (relay, rx) = ChannelRelay::bounded(16);
        let d = Dispatcher::new(Box::new(glow.clone()), Box::new(relay), 1_500);
        (d, glow, rx)
    }

    #[test]
    fn hemisphere_boundaries_are_literal() {
        assert_eq!(haptic_kind_for_azimuth(0.0), HapticEventKind::LeftSound);
        assert_eq!(haptic_kind_for_azimuth(89.99), HapticEventKind::LeftSound);
        assert_eq!(haptic_kind_for_azimuth(90.0), HapticEventKind::RightSound);
        assert_eq!(haptic_kind_for_azimuth(269.99), HapticEventKind::RightSound);
        assert_eq!(haptic_kind_for_azimuth(270.0), HapticEventKind::LeftSound);
        assert_eq!(haptic_kind_for_azimuth(359.9), HapticEventKind::LeftSound);
    }

    #[test]
    fn directional_event_reaches_glow_and_relay() {
        let (mut d, glow, rx) = dispatcher();
        d.dispatch(&EngineEvent::Directional(directional(6.7)));

        let cues = glow.cues.lock();
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].duration_ms, 1_500);
        assert_eq!(cues[0].sound_type, SoundType::Speech);

        let msg = rx.try_recv().expect("relay message");
        assert_eq!(msg.kind, HapticEventKind::LeftSound);
        assert_eq!(msg.data["soundType"], "speech");
        let angle = msg.data["angle"].as_f64().unwrap();
        assert!((angle - 6.7).abs() < 1e-4);
    }

    #[test]
    fn rear_half_maps_to_right_pattern() {
        let (mut d, _glow, rx) = dispatcher();
        d.dispatch(&EngineEvent::Directional(directional(180.0)));
        assert_eq!(rx.try_recv().unwrap().kind, HapticEventKind::RightSound);
    }

    #[test]
    fn environmental_event_skips_glow() {
        let (mut d, glow, rx) = dispatcher();
        d.dispatch(&EngineEvent::Environmental(EnvironmentalEvent {
            seq: 1,
            timestamp_ms: 200,
            volume: 0.5,
            average: 0.1,
        }));
        assert!(glow.cues.lock().is_empty());
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.kind, HapticEventKind::Environmental);
        assert!((msg.data["average"].as_f64().unwrap() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn detached_dispatcher_accepts_events() {
        let handle = DispatcherHandle::new(Dispatcher::detached());
        handle.dispatch(&EngineEvent::Directional(directional(300.0)));
    }
}
