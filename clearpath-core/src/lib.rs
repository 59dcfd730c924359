//! # clearpath-core
//!
//! Sound direction and classification engine for hearing-assistance
//! glasses.
//!
//! ## Architecture
//!
//! ```text
//! Stereo mic → AudioCapture → SPSC RingBuffer → Pipeline thread
//!                                                    │
//!                                       resample + frame (L, R)
//!                                                    │
//!                                   FrameProcessor: FFT → volumes → history
//!                                          │                     │
//!                                  classify + estimate     spike detection
//!                                          │                     │
//!                                     EventArbiter               │
//!                                          └──────────┬──────────┘
//!                                                Dispatcher
//!                                        glow sink │ haptic relay
//!                                                    │
//!                                   broadcast::Sender<EngineEvent>
//! ```
//!
//! The audio callback only copies samples. All heap work happens on the
//! pipeline thread.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod analysis;
pub mod audio;
pub mod buffering;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod ipc;

// Convenience re-exports for downstream crates
pub use analysis::{DirectionEstimate, Hemisphere, SoundType};
pub use dispatch::{Dispatcher, GlowSink, HapticEventKind, HapticRelay, RelayMessage};
pub use engine::{processor::FrameProcessor, ClearPathEngine, EngineConfig};
pub use error::ClearPathError;
pub use ipc::events::{
    DirectionalEvent, EngineEvent, EngineSnapshot, EngineStatus, EngineStatusEvent,
    EnvironmentalEvent,
};
