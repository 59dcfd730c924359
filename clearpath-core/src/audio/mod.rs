//! Stereo audio capture via cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not** block on a mutex or perform I/O. Samples are written as
//! interleaved `[L, R]` pairs into a lock-free SPSC ring buffer producer.
//!
//! Mono devices are duplicated onto both channels (direction degenerates to
//! a balanced estimate); devices with more than two channels contribute
//! their first two.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on macOS).
//! `AudioCapture` therefore must be created and dropped on the same thread.
//! The engine opens it inside its dedicated pipeline thread.

pub mod device;
pub mod resample;
pub mod wav;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

#[cfg(feature = "audio-cpal")]
use crate::buffering::Producer;
use crate::{
    buffering::AudioProducer,
    error::{ClearPathError, Result},
};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

/// Handle to an active audio capture stream.
///
/// **Not `Send`** — `cpal::Stream` is bound to its creation thread on Windows/macOS.
/// Create and drop this type on the same OS thread.
pub struct AudioCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Actual capture sample rate reported by the device (Hz).
    pub sample_rate: u32,
    /// Samples the callback could not push because the ring was full.
    dropped_samples: Arc<AtomicU64>,
}

/// Stereo frames folded per pass over a callback buffer.
#[cfg(feature = "audio-cpal")]
const SCRATCH_FRAMES: usize = 1_024;

/// Map a backend error message onto the acquisition error taxonomy.
pub fn classify_device_error(message: String) -> ClearPathError {
    let lowered = message.to_ascii_lowercase();
    if ["permission", "denied", "not allowed", "unauthorized"]
        .iter()
        .any(|k| lowered.contains(k))
    {
        ClearPathError::PermissionDenied(message)
    } else {
        ClearPathError::AudioDevice(message)
    }
}

/// Fold interleaved device samples into `out` as interleaved stereo.
///
/// Writes at most `out.len() / 2` frames and never allocates. Returns the
/// number of stereo frames written.
#[cfg_attr(not(feature = "audio-cpal"), allow(dead_code))]
fn fold_to_stereo<T: Copy>(
    data: &[T],
    channels: usize,
    convert: impl Fn(T) -> f32,
    out: &mut [f32],
) -> usize {
    let channels = channels.max(1);
    let frames = (data.len() / channels).min(out.len() / 2);
    for (pair, src) in out
        .chunks_exact_mut(2)
        .zip(data.chunks_exact(channels))
        .take(frames)
    {
        let left = convert(src[0]);
        pair[0] = left;
        pair[1] = if channels >= 2 { convert(src[1]) } else { left };
    }
    frames
}

impl AudioCapture {
    /// Open an input device by preferred name, otherwise fall back to the
    /// default input device and then the first available device.
    ///
    /// `interrupted` is raised if the backend reports the device vanished
    /// after the stream started.
    ///
    /// # Errors
    /// `NoDefaultInputDevice`, `PermissionDenied`, `AudioDevice` or
    /// `AudioStream`, depending on where acquisition failed.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        mut producer: AudioProducer,
        running: Arc<AtomicBool>,
        interrupted: Arc<AtomicBool>,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();
        let mut selected_device = None;

        if let Some(preferred_name) = preferred_device_name {
            match host.input_devices() {
                Ok(mut devices) => {
                    selected_device = devices.find(|device| {
                        device
                            .name()
                            .map(|name| name == preferred_name)
                            .unwrap_or(false)
                    });
                    if selected_device.is_none() {
                        warn!(
                            "preferred input device '{}' not found, falling back",
                            preferred_name
                        );
                    }
                }
                Err(e) => {
                    warn!("failed to list input devices while resolving preference: {e}");
                }
            }
        }

        let device = if let Some(device) = selected_device {
            device
        } else if let Some(default) = host.default_input_device() {
            default
        } else {
            let mut devices = host
                .input_devices()
                .map_err(|e| classify_device_error(e.to_string()))?;
            let fallback = devices.next().ok_or(ClearPathError::NoDefaultInputDevice)?;
            warn!("no default input device, falling back to first available input");
            fallback
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| classify_device_error(e.to_string()))?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        if channels < 2 {
            warn!(channels, "mono input device, direction estimates will be centred");
        }
        info!(sample_rate, channels, "audio config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let ch = channels as usize;
        let running_cb = Arc::clone(&running);
        let dropped_samples = Arc::new(AtomicU64::new(0));
        let dropped_cb = Arc::clone(&dropped_samples);
        let mut scratch = vec![0.0f32; SCRATCH_FRAMES * 2];
        let mut deliver = move |data_len: usize, fold: &mut dyn FnMut(usize, &mut [f32]) -> usize| {
            let block = SCRATCH_FRAMES * ch;
            let mut offset = 0;
            while offset < data_len {
                let frames = fold(offset, &mut scratch);
                if frames == 0 {
                    break;
                }
                let written = producer.push_slice(&scratch[..frames * 2]);
                if written < frames * 2 {
                    dropped_cb.fetch_add((frames * 2 - written) as u64, Ordering::Relaxed);
                }
                offset += block;
            }
        };

        let on_error = {
            let interrupted = Arc::clone(&interrupted);
            move |err: cpal::StreamError| {
                if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                    interrupted.store(true, Ordering::SeqCst);
                    error!("audio device disconnected");
                } else {
                    error!("audio stream error: {err}");
                }
            }
        };

        let stream = match supported.sample_format() {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _info| {
                    if !running_cb.load(Ordering::Relaxed) {
                        return;
                    }
                    deliver(data.len(), &mut |offset, out| {
                        fold_to_stereo(&data[offset..], ch, |s| s, out)
                    });
                },
                on_error,
                None,
            ),
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _info| {
                    if !running_cb.load(Ordering::Relaxed) {
                        return;
                    }
                    deliver(data.len(), &mut |offset, out| {
                        fold_to_stereo(&data[offset..], ch, |s| s as f32 / 32768.0, out)
                    });
                },
                on_error,
                None,
            ),
            SampleFormat::U8 => device.build_input_stream(
                &config,
                move |data: &[u8], _info| {
                    if !running_cb.load(Ordering::Relaxed) {
                        return;
                    }
                    deliver(data.len(), &mut |offset, out| {
                        fold_to_stereo(&data[offset..], ch, |s| (s as f32 - 128.0) / 128.0, out)
                    });
                },
                on_error,
                None,
            ),
            fmt => {
                return Err(ClearPathError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => ClearPathError::NoDefaultInputDevice,
            other => classify_device_error(other.to_string()),
        })?;

        stream
            .play()
            .map_err(|e| ClearPathError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            sample_rate,
            dropped_samples,
        })
    }

    /// Samples lost to a full ring buffer since the stream opened.
    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples.load(Ordering::Relaxed)
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_with_preference(
        _producer: AudioProducer,
        _running: Arc<AtomicBool>,
        _interrupted: Arc<AtomicBool>,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(ClearPathError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}
