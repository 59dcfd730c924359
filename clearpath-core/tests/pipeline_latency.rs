use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use clearpath_core::buffering::{create_audio_ring, Producer};
use clearpath_core::dispatch::{ChannelRelay, Dispatcher, DispatcherHandle, NullGlowSink};
use clearpath_core::engine::{pipeline, EngineConfig};
use clearpath_core::{EngineEvent, EngineStatus, FrameProcessor};
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

fn recv_event_with_timeout(
    rx: &mut broadcast::Receiver<EngineEvent>,
    timeout: Duration,
) -> EngineEvent {
    let start = Instant::now();
    loop {
        match rx.try_recv() {
            Ok(ev) => return ev,
            Err(TryRecvError::Empty) => {
                if start.elapsed() >= timeout {
                    panic!("timed out waiting for engine event");
                }
                thread::sleep(Duration::from_millis(5));
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => panic!("event channel closed unexpectedly"),
        }
    }
}

#[test]
fn first_directional_event_latency_under_250ms() {
    let (mut producer, consumer) = create_audio_ring();
    let mut rng = StdRng::seed_from_u64(42);
    let noise: Vec<f32> = (0..512)
        .flat_map(|_| [rng.gen_range(-0.5f32..0.5), rng.gen_range(-0.005f32..0.005)])
        .collect();
    producer.push_slice(&noise);

    let config = EngineConfig {
        smoothing_time_constant: 0.0,
        ..EngineConfig::default()
    };
    let running = Arc::new(AtomicBool::new(true));
    let (event_tx, mut event_rx) = broadcast::channel(16);
    let (status_tx, _) = broadcast::channel(8);
    let (relay, relay_rx) = ChannelRelay::bounded(8);

    let ctx = pipeline::PipelineContext {
        processor: FrameProcessor::new(config.clone()).expect("valid config"),
        config,
        dispatcher: DispatcherHandle::new(Dispatcher::new(
            Box::new(NullGlowSink),
            Box::new(relay),
            1_500,
        )),
        consumer,
        running: Arc::clone(&running),
        interrupted: Arc::new(AtomicBool::new(false)),
        event_tx,
        status_tx,
        status: Arc::new(Mutex::new(EngineStatus::Listening)),
        processor_state: Arc::new(Mutex::new(None)),
        capture_sample_rate: 44_100,
        diagnostics: Arc::new(pipeline::PipelineDiagnostics::default()),
    };

    let start = Instant::now();
    let handle = thread::spawn(move || pipeline::run(ctx));

    let first = recv_event_with_timeout(&mut event_rx, Duration::from_secs(2));
    let elapsed = start.elapsed();

    running.store(false, Ordering::SeqCst);
    handle.join().expect("pipeline thread panicked");

    assert!(matches!(first, EngineEvent::Directional(_)));
    assert!(relay_rx.try_recv().is_ok(), "relay should see the same event");
    assert!(
        elapsed < Duration::from_millis(250),
        "event latency too high: {:?} (target < 250ms)",
        elapsed
    );
}
