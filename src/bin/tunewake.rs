//! TuneWake appliance front end.
//!
//! Runs the always-on wake-phrase loop: listen for the wake phrase, capture
//! the command that follows, transcribe it, and print the transcript for the
//! intent layer. Also exposes the device listing and ambient calibration
//! passes used when setting an appliance up in a new room.

use anyhow::{anyhow, Context, Result};
use std::time::Duration;
use tunewake::audio::{
    rms, AdaptiveGatedVad, AmbientEstimator, FrameSource, LiveFrameSource, LiveMeter, Recorder,
    SegmentMode, SimpleThresholdVad, SmoothedVad, VadEngine,
};
use tunewake::config::{AppConfig, VadEngineKind};
use tunewake::pipeline::{Coordinator, InteractionOutcome, PlaybackControl};
use tunewake::stt::SttService;
use tunewake::wake::{SuppressionGate, WakeDetector};
use tunewake::wake_rustpotter::RustpotterSpotter;
use tunewake::{init_logging, init_tracing, log_debug};

/// Read timeout for live capture frames; generous enough to ride out
/// scheduler hiccups without stalling the cycle.
const LIVE_READ_TIMEOUT: Duration = Duration::from_millis(500);

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    init_logging(&config);
    init_tracing(&config);

    if config.list_input_devices {
        return list_input_devices();
    }

    let recorder = Recorder::new(config.input_device.as_deref())?;
    log_debug(&format!("input_device|{}", recorder.device_name()));

    if config.calibrate {
        return run_calibration(&recorder, &config);
    }

    run_wake_loop(&recorder, &config)
}

fn list_input_devices() -> Result<()> {
    let devices = Recorder::list_devices()?;
    if devices.is_empty() {
        println!("no audio input devices detected");
        return Ok(());
    }
    for name in devices {
        println!("{name}");
    }
    Ok(())
}

/// Measure the room for a few seconds and suggest thresholds.
fn run_calibration(recorder: &Recorder, config: &AppConfig) -> Result<()> {
    let segmenter = config.segmenter_config();
    let frame_samples = segmenter.frame_samples();
    let stream = recorder.open_frame_stream(config.frame_ms, config.channel_capacity)?;
    let meter = LiveMeter::new();
    let mut source = LiveFrameSource::new(
        stream,
        config.sample_rate,
        frame_samples,
        LIVE_READ_TIMEOUT,
    )
    .with_meter(meter.clone());

    let frames_wanted = (config.calibrate_ms / config.frame_ms.max(1)).max(1);
    let level_every = (500 / config.frame_ms.max(1)).max(1);
    let mut rms_values = Vec::with_capacity(frames_wanted as usize);
    println!(
        "measuring ambient noise on '{}' for {} ms; stay quiet...",
        recorder.device_name(),
        config.calibrate_ms
    );
    while (rms_values.len() as u64) < frames_wanted {
        match source.next_frame()? {
            Some(frame) => {
                rms_values.push((rms(&frame), meter.level_db()));
                if rms_values.len() as u64 % level_every == 0 {
                    println!("  level: {:6.1} dBFS", meter.level_db());
                }
            }
            None => break,
        }
    }
    if rms_values.is_empty() {
        return Err(anyhow!("no audio frames received during calibration"));
    }

    rms_values.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    let (ambient_rms, ambient_db) = rms_values[rms_values.len() / 2];

    let mut estimator = AmbientEstimator::new(config.ambient_config());
    estimator.set_ambient(ambient_rms);

    println!("ambient rms:       {ambient_rms:.1} ({ambient_db:.1} dBFS)");
    println!("silence threshold: {:.1}", estimator.threshold());
    println!(
        "suggested --vad-threshold-db: {:.0}",
        (ambient_db + 10.0).min(0.0)
    );
    Ok(())
}

/// Playback seam for the standalone binary. The real appliance wires its
/// player daemon in here; standalone runs just record the transitions.
struct LoggedPlayback;

impl PlaybackControl for LoggedPlayback {
    fn pause(&mut self) -> Result<()> {
        log_debug("playback|pause");
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        log_debug("playback|resume");
        Ok(())
    }
}

/// Build the capture VAD and the segmentation mode that pairs with it.
///
/// Earshot gives real speech verdicts, so captures run in adaptive-energy
/// mode with the segmenter's own median calibration. The energy-threshold
/// fallback would double-threshold on energy there; it runs binary captures
/// gated through the ambient estimator instead.
fn make_vad(config: &AppConfig) -> (Box<dyn VadEngine>, SegmentMode) {
    let (engine, mode): (Box<dyn VadEngine>, SegmentMode) = match config.vad_engine {
        #[cfg(feature = "vad_earshot")]
        VadEngineKind::Earshot => (
            Box::new(tunewake::vad_earshot::EarshotVad::new(
                config.vad_threshold_db,
                config.sample_rate,
                config.frame_ms,
            )),
            SegmentMode::AdaptiveEnergy,
        ),
        #[cfg(not(feature = "vad_earshot"))]
        VadEngineKind::Earshot => (gated_energy_vad(config), SegmentMode::BinaryThreshold),
        VadEngineKind::Simple => (gated_energy_vad(config), SegmentMode::BinaryThreshold),
    };
    (
        Box::new(SmoothedVad::new(engine, config.vad_smoothing_frames)),
        mode,
    )
}

fn gated_energy_vad(config: &AppConfig) -> Box<dyn VadEngine> {
    Box::new(AdaptiveGatedVad::new(
        SimpleThresholdVad::new(config.vad_threshold_db),
        config.ambient_config(),
    ))
}

fn run_wake_loop(recorder: &Recorder, config: &AppConfig) -> Result<()> {
    let wake_model = config
        .wake_model_path
        .as_deref()
        .ok_or_else(|| anyhow!("--wake-model is required to run the wake loop"))?;
    let mut spotter = RustpotterSpotter::load(
        wake_model,
        &config.wake_keyword,
        config.sample_rate,
        config.wake_confidence,
    )
    .context("failed to initialize the wake-phrase spotter")?;

    log_debug(&format!("pipeline|{:?}", config.pipeline_config()));

    let stt = SttService::global(config.engine_options()?);
    let gate = SuppressionGate::new();
    let (mut vad, segment_mode) = make_vad(config);
    let mut coordinator = Coordinator::new(
        LoggedPlayback,
        gate.clone(),
        stt,
        config.lang.clone(),
        config.segmenter_config(),
        segment_mode,
    );

    let segmenter = config.segmenter_config();
    let frame_samples = segmenter.frame_samples();
    let frame_ms = config.frame_ms;
    let channel_capacity = config.channel_capacity;
    let sample_rate = config.sample_rate;

    let mut detector = WakeDetector::new(config.wake_config(), gate);
    println!(
        "listening for \"{}\" on '{}'",
        config.wake_keyword,
        recorder.device_name()
    );

    let result = detector.run(recorder, &mut spotter, |event| {
        log_debug(&format!(
            "interaction_start|keyword={}|confidence={:.2}",
            event.keyword, event.confidence
        ));
        let stream = match recorder.open_frame_stream(frame_ms, channel_capacity) {
            Ok(stream) => stream,
            Err(err) => {
                log_debug(&format!("capture_stream_failed|{err:#}"));
                return;
            }
        };
        let mut source =
            LiveFrameSource::new(stream, sample_rate, frame_samples, LIVE_READ_TIMEOUT);
        vad.reset();
        match coordinator.run_cycle(&mut source, vad.as_mut()) {
            Ok(InteractionOutcome::Command(text)) => println!("command: {text}"),
            Ok(InteractionOutcome::NoInput) => println!("(no input)"),
            Ok(InteractionOutcome::NotUnderstood) => println!("(not understood)"),
            Err(err) => log_debug(&format!("interaction_failed|{err:#}")),
        }
    });

    stt.release();
    result
}
