use thiserror::Error;

/// All errors produced by clearpath-core.
#[derive(Debug, Error)]
pub enum ClearPathError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("audio stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("invalid configuration for `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ClearPathError {
    pub(crate) fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    /// Whether this error means the audio source could not be acquired.
    pub fn is_acquisition_failure(&self) -> bool {
        matches!(
            self,
            Self::AudioDevice(_)
                | Self::AudioStream(_)
                | Self::NoDefaultInputDevice
                | Self::PermissionDenied(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ClearPathError>;
