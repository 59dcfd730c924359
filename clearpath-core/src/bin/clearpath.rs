//! `clearpath` — run the engine against a live input device or a recording.
//!
//! Relay messages are printed to stdout as JSON lines; logs go to stderr.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clearpath_core::{
    audio::{device::list_input_devices, wav::read_stereo_wav},
    dispatch::{BroadcastGlowSink, Dispatcher, HapticRelay, RelayMessage},
    engine::{processor::FrameProcessor, replay::replay_interleaved},
    ClearPathEngine, EngineConfig, EngineStatus,
};
use tracing::{info, warn};

#[derive(Debug, Default)]
struct Args {
    list_devices: bool,
    device: Option<String>,
    config: Option<PathBuf>,
    replay: Option<PathBuf>,
    seconds: Option<u64>,
}

const USAGE: &str = "Usage: clearpath [--list-devices] [--device <name>] [--config <file.json>] \
                     [--replay <file.wav>] [--seconds <n>]";

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--list-devices" => args.list_devices = true,
            "--device" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --device");
                };
                args.device = Some(v);
            }
            "--config" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --config");
                };
                args.config = Some(PathBuf::from(v));
            }
            "--replay" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --replay");
                };
                args.replay = Some(PathBuf::from(v));
            }
            "--seconds" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --seconds");
                };
                args.seconds = Some(v.parse().context("invalid value for --seconds")?);
            }
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}\n{USAGE}"),
        }
    }
    Ok(args)
}

/// Prints each relay message as one JSON line.
struct StdoutRelay;

impl HapticRelay for StdoutRelay {
    fn send(&mut self, message: RelayMessage) -> bool {
        match message.to_json() {
            Ok(line) => {
                println!("{line}");
                true
            }
            Err(e) => {
                warn!("failed to encode relay message: {e}");
                false
            }
        }
    }
}

fn dispatcher(config: &EngineConfig) -> Dispatcher {
    Dispatcher::new(
        Box::new(BroadcastGlowSink::new(16)),
        Box::new(StdoutRelay),
        config.glow_duration_ms,
    )
}

fn run_replay(config: EngineConfig, path: &Path) -> anyhow::Result<()> {
    let recording = read_stereo_wav(path)?;
    if recording.source_channels < 2 {
        warn!("mono recording, direction estimates will be centred");
    }
    info!(
        file = %path.display(),
        sample_rate = recording.sample_rate,
        duration_ms = recording.duration_ms(),
        "replaying recording"
    );

    let mut dispatcher = dispatcher(&config);
    let mut processor = FrameProcessor::new(config)?;
    let report = replay_interleaved(
        &mut processor,
        &mut dispatcher,
        &recording.samples,
        recording.sample_rate,
    )?;
    eprintln!(
        "{} frames, {} directional, {} environmental",
        report.frames_analyzed,
        report.directional_count(),
        report.environmental_count()
    );
    Ok(())
}

async fn run_live(config: EngineConfig, device: Option<String>, seconds: Option<u64>) -> anyhow::Result<()> {
    let engine = ClearPathEngine::new(config.clone(), dispatcher(&config))?;
    let mut status_rx = engine.subscribe_status();
    engine.start_with_device(device)?;

    let deadline = async {
        match seconds {
            Some(s) => tokio::time::sleep(Duration::from_secs(s)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            status = status_rx.recv() => match status {
                Ok(ev) if matches!(ev.status, EngineStatus::Stopped | EngineStatus::Error) => {
                    warn!(status = ?ev.status, detail = ?ev.detail, "engine stopped unexpectedly");
                    break;
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    if engine.is_active() {
        engine.stop()?;
    }
    let diag = engine.pipeline_diagnostics_snapshot();
    eprintln!(
        "{} frames, {} directional, {} environmental",
        diag.frames_analyzed, diag.directional_emitted, diag.environmental_emitted
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = parse_args()?;

    if args.list_devices {
        for d in list_input_devices() {
            println!(
                "{}{} ({} ch){}",
                if d.is_recommended { "* " } else { "  " },
                d.name,
                d.channels,
                if d.is_default { " [default]" } else { "" }
            );
        }
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match &args.replay {
        Some(path) => run_replay(config, path),
        None => run_live(config, args.device, args.seconds).await,
    }
}
