//! Per-frame signal analysis stages.
//!
//! ```text
//! AudioFrame ─► spectrum ─┬─► volume ─► history (spike)
//!                         ├─► classifier
//!                         └─► direction (volumes + front/back factor)
//! ```
//!
//! Every stage here is either pure or owns only its own rolling state;
//! sequencing and cooldown live in [`crate::engine`].

pub mod classifier;
pub mod direction;
pub mod history;
pub mod spectrum;
pub mod volume;

pub use classifier::{BandEnergyClassifier, SoundClassifier, SoundType};
pub use direction::{DirectionEstimate, DirectionEstimator, Hemisphere};
pub use history::{Spike, VolumeHistory};
pub use spectrum::{ChannelAnalyzer, SpectralSmoother, SpectrumBuffer};
pub use volume::ChannelVolumes;
