//! Blocking pipeline loop.
//!
//! ## Pipeline stages (per iteration)
//!
//! ```text
//! 1. Drain ring buffer → interleaved [L, R, ..] samples
//! 2. Deinterleave, resample both channels to the analysis rate
//! 3. Cut transform_size frames, stamped from the sample clock
//! 4. FrameProcessor → environmental / directional events
//! 5. Dispatch to glow + haptic sinks, broadcast to subscribers
//! 6. Publish processor state for snapshots
//! ```
//!
//! The loop runs on the engine's dedicated pipeline thread (the same thread
//! that owns the `!Send` capture stream).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, warn};

use crate::{
    audio::resample::RateConverter,
    buffering::{frame::AudioFrame, AudioConsumer, Consumer},
    dispatch::DispatcherHandle,
    engine::{
        arbiter::Verdict,
        processor::{FrameEvents, FrameProcessor, ProcessorState},
        EngineConfig,
    },
    error::ClearPathError,
    ipc::events::{EngineEvent, EngineStatus, EngineStatusEvent},
};

#[derive(Default)]
pub struct PipelineDiagnostics {
    pub samples_in: AtomicUsize,
    pub frames_analyzed: AtomicUsize,
    pub directional_emitted: AtomicUsize,
    pub environmental_emitted: AtomicUsize,
    pub suppressed_cooldown: AtomicUsize,
    pub low_confidence: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.samples_in.store(0, Ordering::Relaxed);
        self.frames_analyzed.store(0, Ordering::Relaxed);
        self.directional_emitted.store(0, Ordering::Relaxed);
        self.environmental_emitted.store(0, Ordering::Relaxed);
        self.suppressed_cooldown.store(0, Ordering::Relaxed);
        self.low_confidence.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            samples_in: self.samples_in.load(Ordering::Relaxed),
            frames_analyzed: self.frames_analyzed.load(Ordering::Relaxed),
            directional_emitted: self.directional_emitted.load(Ordering::Relaxed),
            environmental_emitted: self.environmental_emitted.load(Ordering::Relaxed),
            suppressed_cooldown: self.suppressed_cooldown.load(Ordering::Relaxed),
            low_confidence: self.low_confidence.load(Ordering::Relaxed),
        }
    }

    /// Count one processed frame and its outcome.
    pub fn record(&self, events: &FrameEvents) {
        self.frames_analyzed.fetch_add(1, Ordering::Relaxed);
        if events.environmental.is_some() {
            self.environmental_emitted.fetch_add(1, Ordering::Relaxed);
        }
        match events.verdict {
            Some(Verdict::Triggered) => {
                self.directional_emitted.fetch_add(1, Ordering::Relaxed);
            }
            Some(Verdict::CoolingDown) => {
                self.suppressed_cooldown.fetch_add(1, Ordering::Relaxed);
            }
            Some(Verdict::LowConfidence) => {
                self.low_confidence.fetch_add(1, Ordering::Relaxed);
            }
            None => {}
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    /// Interleaved samples drained from the ring (two per stereo frame).
    pub samples_in: usize,
    pub frames_analyzed: usize,
    pub directional_emitted: usize,
    pub environmental_emitted: usize,
    pub suppressed_cooldown: usize,
    pub low_confidence: usize,
}

/// All context the pipeline needs, passed as one struct so the closure stays tidy.
pub struct PipelineContext {
    pub config: EngineConfig,
    pub processor: FrameProcessor,
    pub dispatcher: DispatcherHandle,
    pub consumer: AudioConsumer,
    pub running: Arc<AtomicBool>,
    /// Raised by the capture error callback when the device disappears.
    pub interrupted: Arc<AtomicBool>,
    pub event_tx: broadcast::Sender<EngineEvent>,
    pub status_tx: broadcast::Sender<EngineStatusEvent>,
    pub status: Arc<Mutex<EngineStatus>>,
    pub processor_state: Arc<Mutex<Option<ProcessorState>>>,
    pub capture_sample_rate: u32,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Interleaved samples drained per iteration (1 024 stereo frames).
const DRAIN_CHUNK: usize = 2_048;

/// Resampler input block, in frames per channel.
const RESAMPLE_CHUNK: usize = 1_024;

/// Sleep when the ring is empty (avoids busy-wait burning a core).
const DEFAULT_SLEEP_EMPTY_MS: u64 = 5;

/// Run the blocking pipeline until `ctx.running` becomes false or the
/// capture stream is interrupted.
pub fn run(mut ctx: PipelineContext) {
    let span = info_span!(
        "pipeline",
        capture_rate = ctx.capture_sample_rate,
        analysis_rate = ctx.config.sample_rate,
        transform_size = ctx.config.transform_size,
    );
    let _enter = span.enter();
    info!("pipeline started");

    let mut resampler = match RateConverter::new(
        ctx.capture_sample_rate,
        ctx.config.sample_rate,
        RESAMPLE_CHUNK,
    ) {
        Ok(r) => r,
        Err(e) => {
            error!("failed to create resampler: {e}");
            ctx.running.store(false, Ordering::SeqCst);
            set_status(&ctx, EngineStatus::Error, Some(e.to_string()));
            return;
        }
    };

    let transform_size = ctx.config.transform_size;
    let mut raw = vec![0f32; DRAIN_CHUNK];
    // Odd sample left over when a drain splits an [L, R] pair.
    let mut carry: Option<f32> = None;
    let mut left_buf: Vec<f32> = Vec::with_capacity(transform_size * 2);
    let mut right_buf: Vec<f32> = Vec::with_capacity(transform_size * 2);
    let mut frames_emitted: u64 = 0;

    loop {
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }
        if ctx.interrupted.load(Ordering::SeqCst) {
            let reason = ClearPathError::StreamInterrupted("input device disconnected".into());
            warn!(error = %reason, "stopping pipeline");
            ctx.running.store(false, Ordering::SeqCst);
            set_status(&ctx, EngineStatus::Stopped, Some(reason.to_string()));
            break;
        }

        // ── 1. Drain ring buffer ──────────────────────────────────────────
        let n = ctx.consumer.pop_slice(&mut raw);
        if n == 0 {
            std::thread::sleep(std::time::Duration::from_millis(empty_sleep_ms()));
            continue;
        }
        ctx.diagnostics.samples_in.fetch_add(n, Ordering::Relaxed);

        // ── 2. Deinterleave + resample ────────────────────────────────────
        let (left, right) = deinterleave(&mut carry, &raw[..n]);
        let (left, right) = resampler.process(&left, &right);
        left_buf.extend_from_slice(&left);
        right_buf.extend_from_slice(&right);

        // ── 3–6. Frame, analyse, dispatch ─────────────────────────────────
        while left_buf.len() >= transform_size && right_buf.len() >= transform_size {
            let timestamp_ms = stream_time_ms(frames_emitted, transform_size, ctx.config.sample_rate);
            let frame = AudioFrame::new(
                left_buf.drain(..transform_size).collect(),
                right_buf.drain(..transform_size).collect(),
                timestamp_ms,
            );
            frames_emitted += 1;
            handle_frame(&mut ctx, &frame);
        }
    }

    let snap = ctx.diagnostics.snapshot();
    info!(
        samples_in = snap.samples_in,
        frames_analyzed = snap.frames_analyzed,
        directional_emitted = snap.directional_emitted,
        environmental_emitted = snap.environmental_emitted,
        suppressed_cooldown = snap.suppressed_cooldown,
        low_confidence = snap.low_confidence,
        "pipeline stopped"
    );
}

/// Process one frame end-to-end: analysis, dispatch, broadcast, snapshot.
pub fn handle_frame(ctx: &mut PipelineContext, frame: &AudioFrame) {
    let events = ctx.processor.process_frame(frame);
    ctx.diagnostics.record(&events);

    for event in events.into_events() {
        ctx.dispatcher.dispatch(&event);
        // No subscribers is fine.
        let _ = ctx.event_tx.send(event);
    }

    *ctx.processor_state.lock() = Some(ctx.processor.state());
    debug!(timestamp_ms = frame.timestamp_ms, "frame analysed");
}

/// Split interleaved samples into channels, carrying a trailing odd sample
/// over to the next call.
fn deinterleave(carry: &mut Option<f32>, samples: &[f32]) -> (Vec<f32>, Vec<f32>) {
    let mut left = Vec::with_capacity(samples.len() / 2 + 1);
    let mut right = Vec::with_capacity(samples.len() / 2 + 1);
    let mut rest = samples;

    if let Some(l) = carry.take() {
        match rest.split_first() {
            Some((r, tail)) => {
                left.push(l);
                right.push(*r);
                rest = tail;
            }
            None => {
                *carry = Some(l);
                return (left, right);
            }
        }
    }

    let mut pairs = rest.chunks_exact(2);
    for pair in &mut pairs {
        left.push(pair[0]);
        right.push(pair[1]);
    }
    if let [odd] = pairs.remainder() {
        *carry = Some(*odd);
    }
    (left, right)
}

/// Start time of frame `index` on the analysis sample clock.
pub fn stream_time_ms(index: u64, transform_size: usize, sample_rate: u32) -> u64 {
    index.saturating_mul(transform_size as u64).saturating_mul(1_000) / u64::from(sample_rate.max(1))
}

fn set_status(ctx: &PipelineContext, status: EngineStatus, detail: Option<String>) {
    *ctx.status.lock() = status;
    let _ = ctx.status_tx.send(EngineStatusEvent { status, detail });
}

fn empty_sleep_ms() -> u64 {
    static EMPTY_SLEEP_MS: OnceLock<u64> = OnceLock::new();
    *EMPTY_SLEEP_MS.get_or_init(|| {
        std::env::var("CLEARPATH_PIPELINE_EMPTY_SLEEP_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(|v| v.clamp(1, 20))
            .unwrap_or(DEFAULT_SLEEP_EMPTY_MS)
    })
}
