//! `ClearPathEngine` — top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! ClearPathEngine::new()
//!     └─► start()        → device open, pipeline thread spawned, status = Listening
//!         └─► stop()     → running=false, pipeline joined, device released, status = Stopped
//! ```
//!
//! `start()`/`stop()` return an error when called in the wrong state rather
//! than panicking. Configuration can be replaced with `configure()` only
//! while the engine is inactive.
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS (COM / CoreAudio thread affinity).
//! `AudioCapture` is therefore created *inside* the pipeline thread so it
//! never crosses a thread boundary. A sync oneshot channel propagates any
//! open-device errors back to the `start()` caller.

pub mod arbiter;
pub mod pipeline;
pub mod processor;
pub mod replay;

use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    audio::AudioCapture,
    buffering::create_audio_ring,
    dispatch::{Dispatcher, DispatcherHandle, DEFAULT_GLOW_DURATION_MS},
    error::{ClearPathError, Result},
    ipc::events::{EngineEvent, EngineSnapshot, EngineStatus, EngineStatusEvent},
};

use self::processor::{FrameProcessor, ProcessorState};

/// Broadcast channel capacity: 256 events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

/// Tunables for the analysis pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct EngineConfig {
    /// Analysis sample rate (Hz). Captured audio is resampled to this rate.
    /// Default: 44100.
    pub sample_rate: u32,
    /// FFT length per channel; a power of two. Default: 512.
    pub transform_size: usize,
    /// Minimum total volume for direction estimation; also the confidence
    /// reference and the spike floor. Default: 0.1.
    pub volume_threshold: f32,
    /// Minimum |right - left| before a lateral angle is assigned. Default: 0.3.
    pub direction_threshold: f32,
    /// Minimum time between directional events (ms). Default: 1000.
    pub trigger_cooldown_ms: u64,
    /// Margin above the rolling average that counts as a spike. Default: 0.15.
    pub environmental_sound_threshold: f32,
    /// Rolling window length for spike detection. Default: 10.
    pub history_length: usize,
    /// Lifetime of a directional glow (ms). Default: 1500.
    pub glow_duration_ms: u64,
    /// Spectrum floor (dB). Default: -90.
    pub min_decibels: f32,
    /// Spectrum ceiling (dB). Default: -10.
    pub max_decibels: f32,
    /// Temporal smoothing of magnitudes in [0, 1); 0 disables. Default: 0.8.
    pub smoothing_time_constant: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            transform_size: 512,
            volume_threshold: 0.1,
            direction_threshold: 0.3,
            trigger_cooldown_ms: 1_000,
            environmental_sound_threshold: 0.15,
            history_length: crate::analysis::history::DEFAULT_HISTORY_LENGTH,
            glow_duration_ms: DEFAULT_GLOW_DURATION_MS,
            min_decibels: -90.0,
            max_decibels: -10.0,
            smoothing_time_constant: 0.8,
        }
    }
}

impl EngineConfig {
    /// Check every field.
    ///
    /// # Errors
    /// `ClearPathError::InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(ClearPathError::invalid_config("sampleRate", "must be positive"));
        }
        if !self.transform_size.is_power_of_two() || !(32..=32_768).contains(&self.transform_size) {
            return Err(ClearPathError::invalid_config(
                "transformSize",
                format!("{} is not a power of two in [32, 32768]", self.transform_size),
            ));
        }
        check_finite("volumeThreshold", self.volume_threshold)?;
        if self.volume_threshold <= 0.0 || self.volume_threshold > 1.0 {
            return Err(ClearPathError::invalid_config("volumeThreshold", "must be in (0, 1]"));
        }
        check_finite("directionThreshold", self.direction_threshold)?;
        if !(0.0..=1.0).contains(&self.direction_threshold) {
            return Err(ClearPathError::invalid_config("directionThreshold", "must be in [0, 1]"));
        }
        check_finite("environmentalSoundThreshold", self.environmental_sound_threshold)?;
        if self.environmental_sound_threshold < 0.0 {
            return Err(ClearPathError::invalid_config(
                "environmentalSoundThreshold",
                "must not be negative",
            ));
        }
        if self.history_length < 2 {
            return Err(ClearPathError::invalid_config("historyLength", "must be at least 2"));
        }
        check_finite("minDecibels", self.min_decibels)?;
        check_finite("maxDecibels", self.max_decibels)?;
        if self.min_decibels >= self.max_decibels {
            return Err(ClearPathError::invalid_config(
                "minDecibels",
                "must be below maxDecibels",
            ));
        }
        check_finite("smoothingTimeConstant", self.smoothing_time_constant)?;
        if !(0.0..1.0).contains(&self.smoothing_time_constant) {
            return Err(ClearPathError::invalid_config(
                "smoothingTimeConstant",
                "must be in [0, 1)",
            ));
        }
        Ok(())
    }

    /// Parse camelCase JSON (missing fields take defaults) and validate.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| ClearPathError::invalid_config("config", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

fn check_finite(field: &'static str, value: f32) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ClearPathError::invalid_config(field, "must be finite"))
    }
}

/// The top-level engine handle.
///
/// `ClearPathEngine` is `Send + Sync`; all fields use interior mutability.
/// Wrap in `Arc<ClearPathEngine>` to share between a UI and event forwarders.
pub struct ClearPathEngine {
    config: Mutex<EngineConfig>,
    dispatcher: DispatcherHandle,
    /// `true` while capture + pipeline are active.
    running: Arc<AtomicBool>,
    /// `true` while an audio device is open.
    has_source: Arc<AtomicBool>,
    status: Arc<Mutex<EngineStatus>>,
    /// Latest processor state, published by the pipeline after each frame.
    processor_state: Arc<Mutex<Option<ProcessorState>>>,
    event_tx: broadcast::Sender<EngineEvent>,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    diagnostics: Arc<pipeline::PipelineDiagnostics>,
    pipeline: Mutex<Option<JoinHandle<()>>>,
}

impl ClearPathEngine {
    /// Create a new engine. Does not start capturing; call `start()`.
    ///
    /// # Errors
    /// `ClearPathError::InvalidConfig` if `config` fails validation.
    pub fn new(config: EngineConfig, dispatcher: Dispatcher) -> Result<Self> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);

        let mut dispatcher = dispatcher;
        dispatcher.set_glow_duration_ms(config.glow_duration_ms);

        Ok(Self {
            config: Mutex::new(config),
            dispatcher: DispatcherHandle::new(dispatcher),
            running: Arc::new(AtomicBool::new(false)),
            has_source: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(EngineStatus::Idle)),
            processor_state: Arc::new(Mutex::new(None)),
            event_tx,
            status_tx,
            diagnostics: Arc::new(pipeline::PipelineDiagnostics::default()),
            pipeline: Mutex::new(None),
        })
    }

    /// Replace the configuration.
    ///
    /// # Errors
    /// - `ClearPathError::AlreadyRunning` while active (config is frozen).
    /// - `ClearPathError::InvalidConfig`; the previous config is kept.
    pub fn configure(&self, config: EngineConfig) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(ClearPathError::AlreadyRunning);
        }
        config.validate()?;
        self.dispatcher
            .0
            .lock()
            .set_glow_duration_ms(config.glow_duration_ms);
        *self.config.lock() = config;
        Ok(())
    }

    pub fn config(&self) -> EngineConfig {
        self.config.lock().clone()
    }

    /// Start audio capture on the default input device.
    ///
    /// Blocks until the audio device is confirmed open (or fails).
    ///
    /// # Errors
    /// - `ClearPathError::AlreadyRunning` if already started.
    /// - Acquisition failures (`NoDefaultInputDevice`, `PermissionDenied`,
    ///   `AudioDevice`, `AudioStream`); the engine stays inactive.
    pub fn start(&self) -> Result<()> {
        self.start_with_device(None)
    }

    /// Start the engine using a preferred input device name.
    ///
    /// If `preferred_input_device` is `None`, default input selection is used.
    pub fn start_with_device(&self, preferred_input_device: Option<String>) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(ClearPathError::AlreadyRunning);
        }
        // Reap a pipeline that ended on its own (stream interrupted).
        self.join_pipeline();

        let config = self.config();
        let processor = FrameProcessor::new(config.clone())?;

        self.diagnostics.reset();
        *self.processor_state.lock() = None;
        self.running.store(true, Ordering::SeqCst);

        let (producer, consumer) = create_audio_ring();

        // Clone all Arc-wrapped state before moving into the closure.
        let running = Arc::clone(&self.running);
        let has_source = Arc::clone(&self.has_source);
        let status = Arc::clone(&self.status);
        let processor_state = Arc::clone(&self.processor_state);
        let diagnostics = Arc::clone(&self.diagnostics);
        let event_tx = self.event_tx.clone();
        let status_tx = self.status_tx.clone();
        let dispatcher = self.dispatcher.clone();

        // Sync oneshot: pipeline thread signals open success/failure to start().
        // Carries the actual capture sample rate on success.
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();

        let spawned = std::thread::Builder::new()
            .name("clearpath-pipeline".into())
            .spawn(move || {
                // ── Open audio device (must happen on THIS thread: cpal::Stream is !Send) ──
                let interrupted = Arc::new(AtomicBool::new(false));
                let capture = match AudioCapture::open_with_preference(
                    producer,
                    Arc::clone(&running),
                    Arc::clone(&interrupted),
                    preferred_input_device.as_deref(),
                ) {
                    Ok(c) => {
                        has_source.store(true, Ordering::SeqCst);
                        let _ = open_tx.send(Ok(c.sample_rate));
                        c
                    }
                    Err(e) => {
                        running.store(false, Ordering::SeqCst);
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };

                pipeline::run(pipeline::PipelineContext {
                    config,
                    processor,
                    dispatcher,
                    consumer,
                    running,
                    interrupted,
                    event_tx,
                    status_tx,
                    status,
                    processor_state: Arc::clone(&processor_state),
                    capture_sample_rate: capture.sample_rate,
                    diagnostics,
                });

                let dropped = capture.dropped_samples();
                if dropped > 0 {
                    warn!(dropped, "ring buffer overflowed during capture");
                }
                // Stream drops here, releasing the audio device on this thread.
                drop(capture);
                has_source.store(false, Ordering::SeqCst);
                *processor_state.lock() = None;
            });

        let handle = match spawned {
            Ok(h) => h,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                self.set_status(EngineStatus::Error, Some(e.to_string()));
                return Err(ClearPathError::Io(e));
            }
        };

        // Block start() until device open is confirmed.
        match open_rx.recv() {
            Ok(Ok(rate)) => {
                *self.pipeline.lock() = Some(handle);
                self.set_status(EngineStatus::Listening, None);
                info!(capture_rate = rate, "engine started, listening");
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                self.running.store(false, Ordering::SeqCst);
                self.set_status(EngineStatus::Error, Some(e.to_string()));
                if e.is_acquisition_failure() {
                    warn!(error = %e, "audio source acquisition failed");
                } else {
                    warn!(error = %e, "pipeline failed to start");
                }
                Err(e)
            }
            Err(_) => {
                // Channel closed before a message was sent: the pipeline thread panicked.
                let _ = handle.join();
                self.running.store(false, Ordering::SeqCst);
                self.set_status(EngineStatus::Error, Some("pipeline failed to start".into()));
                Err(ClearPathError::Other(anyhow::anyhow!(
                    "pipeline thread died unexpectedly"
                )))
            }
        }
    }

    /// Stop audio capture and the pipeline.
    ///
    /// Returns once the pipeline thread has exited and the device is released.
    ///
    /// # Errors
    /// - `ClearPathError::NotRunning` if not currently running.
    pub fn stop(&self) -> Result<()> {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        let joined = self.join_pipeline();
        if !was_running && !joined {
            return Err(ClearPathError::NotRunning);
        }
        *self.processor_state.lock() = None;
        self.set_status(EngineStatus::Stopped, None);
        info!("engine stopped");
        Ok(())
    }

    /// Start when inactive, stop when active. Returns the new active state.
    pub fn toggle(&self) -> Result<bool> {
        if self.is_active() {
            self.stop()?;
            Ok(false)
        } else {
            self.start()?;
            Ok(true)
        }
    }

    pub fn is_active(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current lifecycle status.
    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    /// Status query for observability.
    pub fn snapshot(&self) -> EngineSnapshot {
        let state = *self.processor_state.lock();
        EngineSnapshot {
            is_active: self.is_active(),
            has_source: self.has_source.load(Ordering::SeqCst),
            current_direction: state.and_then(|s| s.current_direction),
            last_trigger_ms: state.and_then(|s| s.last_trigger_ms),
            history_length: state.map(|s| s.history_length).unwrap_or(0),
        }
    }

    /// Subscribe to directional + environmental events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Subscribe to live status change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Snapshot of pipeline counters for observability.
    pub fn pipeline_diagnostics_snapshot(&self) -> pipeline::DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn join_pipeline(&self) -> bool {
        let Some(handle) = self.pipeline.lock().take() else {
            return false;
        };
        if handle.join().is_err() {
            warn!("pipeline thread panicked");
        }
        true
    }

    fn set_status(&self, new_status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(EngineStatusEvent {
            status: new_status,
            detail,
        });
    }
}

impl Drop for ClearPathEngine {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.join_pipeline();
    }
}
