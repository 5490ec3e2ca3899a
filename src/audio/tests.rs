use super::dispatch::{append_downmixed_samples, FrameDispatcher};
use super::segmenter::FrameSource;
use super::resample::{adjust_frame_length, MAX_DEVICE_RATE, MIN_DEVICE_RATE};
use super::{
    capture_utterance, convert_frame_to_target, resample_pcm, rms, AdaptiveGatedVad,
    AmbientConfig, AmbientEstimator, BufferSource, SegmentMode, SegmentStopReason,
    SegmenterConfig, SimpleThresholdVad, SmoothedVad, Utterance, VadDecision, VadEngine,
    VadSmoother, TARGET_RATE,
};
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[cfg(feature = "high-quality-audio")]
use super::resample::{
    resample_with_rubato, FORCE_RUBATO_ERROR, RESAMPLER_WARNING_SHOWN, RESAMPLE_FALLBACK_COUNT,
};
#[cfg(feature = "high-quality-audio")]
use std::sync::Mutex;

#[cfg(feature = "high-quality-audio")]
static RESAMPLE_TEST_LOCK: Mutex<()> = Mutex::new(());

// ---- resampler ----

#[test]
fn matching_rates_pass_through_unchanged() {
    for n in [1usize, 160, 1_600, 16_000] {
        let input: Vec<i16> = (0..n).map(|i| (i as i16).wrapping_mul(-37)).collect();
        assert_eq!(resample_pcm(&input, 16_000, 16_000), input);
    }
    let input = vec![3i16, -7, 1200, -32_768, 32_767];
    assert_eq!(resample_pcm(&input, 44_100, 44_100), input);
}

#[test]
fn zero_rates_and_empty_input_are_degenerate_pass_throughs() {
    let input = vec![1i16, 2, 3];
    assert_eq!(resample_pcm(&input, 0, 16_000), input);
    assert_eq!(resample_pcm(&input, 16_000, 0), input);
    assert_eq!(resample_pcm(&[], 8_000, 16_000), Vec::<i16>::new());
}

#[test]
fn output_length_is_rounded_ratio_across_rate_pairs() {
    // Covers one-sample blocks, where heavy downsampling legitimately
    // produces an empty output.
    let rates = [8_000u32, 16_000, 22_050, 44_100, 48_000];
    let lens = [1usize, 160, 1_600, 16_000];
    for &src in &rates {
        for &dst in &rates {
            for &n in &lens {
                let input = vec![100i16; n];
                let expected = ((n as f64) * (dst as f64) / (src as f64)).round() as usize;
                let output = resample_pcm(&input, src, dst);
                assert_eq!(
                    output.len(),
                    expected,
                    "length mismatch for {src} -> {dst} over {n} samples"
                );
            }
        }
    }
}

#[test]
fn constant_signal_survives_resampling() {
    let input = vec![1_000i16; 480];
    let output = resample_pcm(&input, 48_000, 16_000);
    assert!(output.iter().all(|&s| s == 1_000));
}

#[test]
fn interpolated_values_stay_in_i16_range() {
    let input = vec![i16::MAX, i16::MIN, i16::MAX, i16::MIN];
    let output = resample_pcm(&input, 8_000, 44_100);
    assert!(output.iter().all(|&s| (i16::MIN..=i16::MAX).contains(&s)));
}

#[test]
fn upsampling_interpolates_between_neighbors() {
    let input = vec![0i16, 1_000];
    let output = resample_pcm(&input, 8_000, 16_000);
    assert_eq!(output.len(), 4);
    assert_eq!(output[0], 0);
    assert_eq!(output[1], 500);
}

#[test]
fn convert_frame_pads_to_exact_length() {
    let frame = vec![250i16; 160];
    let converted = convert_frame_to_target(frame, 16_000, 16_000, 320);
    assert_eq!(converted.len(), 320);
    assert_eq!(converted[319], 250);

    let frame = vec![250i16; 480];
    let converted = convert_frame_to_target(frame, 48_000, 16_000, 320);
    assert_eq!(converted.len(), 320);
}

#[test]
fn adjust_frame_length_truncates_and_pads_with_last_sample() {
    assert_eq!(adjust_frame_length(vec![1, 2, 3, 4], 2), vec![1, 2]);
    assert_eq!(adjust_frame_length(vec![1, 2], 4), vec![1, 2, 2, 2]);
    assert_eq!(adjust_frame_length(Vec::new(), 2), vec![0, 0]);
}

#[test]
fn device_rate_bounds_are_sane() {
    assert_eq!(MIN_DEVICE_RATE, 2_000);
    assert_eq!(MAX_DEVICE_RATE, 192_000);
    assert!(MIN_DEVICE_RATE < MAX_DEVICE_RATE);
}

#[cfg(feature = "high-quality-audio")]
#[test]
fn rubato_output_length_matches_linear_contract() {
    let _guard = RESAMPLE_TEST_LOCK.lock().unwrap();
    let input: Vec<i16> = (0..441).map(|i| ((i % 100) * 300 - 15_000) as i16).collect();
    let output = resample_with_rubato(&input, 44_100, 16_000).unwrap();
    let expected = ((input.len() as f64) * (16_000.0 / 44_100.0)).round() as usize;
    assert_eq!(output.len(), expected);
}

#[cfg(feature = "high-quality-audio")]
#[test]
fn rubato_failure_falls_back_to_linear_path() {
    let _guard = RESAMPLE_TEST_LOCK.lock().unwrap();
    let before = RESAMPLE_FALLBACK_COUNT.load(Ordering::Relaxed);
    FORCE_RUBATO_ERROR.store(true, Ordering::Relaxed);
    let frame = vec![500i16; 480];
    let converted = convert_frame_to_target(frame, 48_000, 16_000, 160);
    assert_eq!(converted.len(), 160);
    assert_eq!(RESAMPLE_FALLBACK_COUNT.load(Ordering::Relaxed), before + 1);
    assert!(RESAMPLER_WARNING_SHOWN.load(Ordering::Relaxed));
}

// ---- ambient estimator ----

#[test]
fn first_non_speech_sample_seeds_the_estimate() {
    let mut estimator = AmbientEstimator::new(AmbientConfig::default());
    assert_eq!(estimator.ambient_rms(), None);
    estimator.update(200.0, false);
    assert_eq!(estimator.ambient_rms(), Some(200.0));
}

#[test]
fn ema_converges_to_a_constant_ambient_level() {
    let mut estimator = AmbientEstimator::new(AmbientConfig::default());
    estimator.update(500.0, false);
    for _ in 0..200 {
        estimator.update(200.0, false);
    }
    let ambient = estimator.ambient_rms().unwrap();
    assert!((ambient - 200.0).abs() < 1.0, "ambient was {ambient}");
    assert!((estimator.threshold() - 300.0).abs() < 2.0);
}

#[test]
fn speech_frames_do_not_move_the_estimate() {
    let mut estimator = AmbientEstimator::new(AmbientConfig::default());
    estimator.update(100.0, false);
    estimator.update(5_000.0, true);
    assert_eq!(estimator.ambient_rms(), Some(100.0));
}

#[test]
fn override_boundary_is_the_derived_threshold() {
    let mut estimator = AmbientEstimator::new(AmbientConfig::default());
    estimator.set_ambient(100.0);
    // threshold = max(100, 100 * 1.5) = 150
    assert_eq!(estimator.threshold(), 150.0);
    assert!(!estimator.update(149.0, true).is_speech);
    assert!(estimator.update(150.0, true).is_speech);
    assert!(estimator.update(151.0, true).is_speech);
}

#[test]
fn threshold_floor_applies_while_unset() {
    let estimator = AmbientEstimator::new(AmbientConfig::default());
    assert_eq!(estimator.threshold(), 100.0);
}

#[test]
fn set_ambient_ignores_non_positive_values() {
    let mut estimator = AmbientEstimator::new(AmbientConfig::default());
    estimator.set_ambient(0.0);
    assert_eq!(estimator.ambient_rms(), None);
    estimator.set_ambient(-5.0);
    assert_eq!(estimator.ambient_rms(), None);
    estimator.set_ambient(120.0);
    assert_eq!(estimator.ambient_rms(), Some(120.0));
    estimator.reset();
    assert_eq!(estimator.ambient_rms(), None);
}

#[test]
fn gated_vad_overrides_quiet_speech_verdicts() {
    // Inner VAD calls everything above RMS 10 speech; the gate requires the
    // ambient-derived threshold as well.
    let mut vad = AdaptiveGatedVad::new(SimpleThresholdVad::from_rms(10.0), AmbientConfig::default());
    vad.estimator_mut().set_ambient(400.0);
    let quiet = vec![50i16; 320];
    let loud = vec![2_000i16; 320];
    assert_eq!(vad.process_frame(&quiet), VadDecision::Silence);
    assert_eq!(vad.process_frame(&loud), VadDecision::Speech);
}

// ---- smoother ----

#[test]
fn smoother_majority_vote_suppresses_single_spikes() {
    let mut smoother = VadSmoother::new(3);
    assert_eq!(smoother.smooth(VadDecision::Silence), VadDecision::Silence);
    assert_eq!(smoother.smooth(VadDecision::Speech), VadDecision::Speech);
    // Two silences against one speech in the window.
    assert_eq!(smoother.smooth(VadDecision::Silence), VadDecision::Silence);
}

#[test]
fn smoother_window_of_one_passes_through() {
    let mut smoother = VadSmoother::new(1);
    assert_eq!(smoother.smooth(VadDecision::Speech), VadDecision::Speech);
    assert_eq!(smoother.smooth(VadDecision::Silence), VadDecision::Silence);
}

#[test]
fn smoothed_vad_rides_out_a_single_silent_frame() {
    let mut vad = SmoothedVad::new(Box::new(SimpleThresholdVad::from_rms(500.0)), 3);
    let loud = vec![2_000i16; 320];
    let quiet = vec![10i16; 320];
    assert_eq!(vad.process_frame(&loud), VadDecision::Speech);
    assert_eq!(vad.process_frame(&loud), VadDecision::Speech);
    // Two speech frames still outvote one silent frame.
    assert_eq!(vad.process_frame(&quiet), VadDecision::Speech);
    assert_eq!(vad.name(), "simple_threshold_vad");
}

// ---- dispatch ----

#[test]
fn downmixes_multi_channel_audio() {
    let mut buf = Vec::new();
    let samples = [1.0f32, -1.0, 0.5, 0.5];
    append_downmixed_samples(&mut buf, &samples, 2, |sample| sample);
    assert_eq!(buf.len(), 2);
    assert_eq!(buf[0], 0);
    assert!((buf[1] - 16_384).abs() <= 1);
}

#[test]
fn preserves_single_channel_audio() {
    let mut buf = Vec::new();
    append_downmixed_samples(&mut buf, &[0i16, 1_000, -1_000], 1, |s| s as f32 / 32_768.0);
    assert_eq!(buf.len(), 3);
    assert_eq!(buf[0], 0);
    assert!((buf[1] - 1_000).abs() <= 1);
}

#[test]
fn dispatcher_slices_fixed_frames() {
    let (sender, receiver) = bounded(8);
    let dropped = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = FrameDispatcher::new(4, sender, dropped.clone());

    let samples: Vec<i16> = (0..10).collect();
    dispatcher.push(&samples, 1, |s| s as f32 / 32_768.0);

    assert_eq!(receiver.len(), 2);
    let first = receiver.recv().unwrap();
    assert_eq!(first.len(), 4);
    assert_eq!(dropped.load(Ordering::Relaxed), 0);
}

#[test]
fn dispatcher_counts_dropped_frames_on_backpressure() {
    let (sender, receiver) = bounded(1);
    let dropped = Arc::new(AtomicUsize::new(0));
    let mut dispatcher = FrameDispatcher::new(2, sender, dropped.clone());

    dispatcher.push(&[1i16, 2, 3, 4, 5, 6], 1, |s| s as f32 / 32_768.0);
    assert_eq!(receiver.len(), 1);
    assert_eq!(dropped.load(Ordering::Relaxed), 2);
}

// ---- segmenter ----

fn frame_pattern(pattern: &[(i16, usize)], frame_samples: usize) -> Vec<i16> {
    let mut samples = Vec::new();
    for &(amplitude, count) in pattern {
        samples.extend(std::iter::repeat(amplitude).take(count * frame_samples));
    }
    samples
}

fn adaptive_config() -> SegmenterConfig {
    SegmenterConfig {
        sample_rate: TARGET_RATE,
        frame_ms: 20,
        skip_ms: 0,
        calibration_ms: 100,
        speech_multiplier: 2.0,
        silence_frames: 20,
        min_speech_frames: 10,
        max_duration_ms: 10_000,
        pre_padding_frames: 2,
        post_padding_frames: 2,
    }
}

fn run_adaptive(samples: Vec<i16>, cfg: &SegmenterConfig) -> Utterance {
    let mut source = BufferSource::new(samples, cfg.frame_samples());
    let mut vad = SimpleThresholdVad::from_rms(500.0);
    capture_utterance(&mut source, &mut vad, cfg, SegmentMode::AdaptiveEnergy).unwrap()
}

#[test]
fn synthetic_capture_stops_on_sustained_silence() {
    let cfg = adaptive_config();
    let n = cfg.frame_samples();
    // 5 calibration frames of room noise, 30 frames of speech, then silence.
    let samples = frame_pattern(&[(50, 5), (2_000, 30), (40, 40)], n);
    let utterance = run_adaptive(samples, &cfg);

    assert_eq!(utterance.stats.stop_reason, SegmentStopReason::Silence);
    assert_eq!(utterance.stats.speech_frames, 30);
    // 5 calibration + 30 speech + 21 trailing silence frames were read.
    assert_eq!(utterance.stats.frames_processed, 56);
    // Speech frames 5..=34 plus two padding frames on each side.
    assert_eq!(utterance.samples.len(), 34 * n);
    assert!(rms(&utterance.samples) > 500.0);
}

#[test]
fn synthetic_capture_is_deterministic() {
    let cfg = adaptive_config();
    let n = cfg.frame_samples();
    let samples = frame_pattern(&[(50, 5), (2_000, 30), (40, 40)], n);
    let first = run_adaptive(samples.clone(), &cfg);
    let second = run_adaptive(samples, &cfg);
    assert_eq!(first.samples, second.samples);
    assert_eq!(first.stats, second.stats);
}

#[test]
fn min_speech_guard_keeps_listening_through_early_noise() {
    let cfg = adaptive_config();
    let n = cfg.frame_samples();
    // Only 3 speech frames, below min_speech_frames, so sustained silence
    // must not end the capture early.
    let samples = frame_pattern(&[(50, 5), (2_000, 3), (40, 40)], n);
    let utterance = run_adaptive(samples, &cfg);
    assert_eq!(
        utterance.stats.stop_reason,
        SegmentStopReason::SourceExhausted
    );
    assert_eq!(utterance.stats.speech_frames, 3);
}

#[test]
fn binary_mode_stops_without_any_speech() {
    let cfg = SegmenterConfig {
        silence_frames: 5,
        min_speech_frames: 0,
        ..adaptive_config()
    };
    let n = cfg.frame_samples();
    let samples = frame_pattern(&[(40, 30)], n);
    let mut source = BufferSource::new(samples, n);
    let mut vad = SimpleThresholdVad::from_rms(500.0);
    let utterance =
        capture_utterance(&mut source, &mut vad, &cfg, SegmentMode::BinaryThreshold).unwrap();

    assert_eq!(utterance.stats.stop_reason, SegmentStopReason::Silence);
    assert!(utterance.is_empty());
}

#[test]
fn max_duration_caps_an_endless_talker() {
    let cfg = SegmenterConfig {
        max_duration_ms: 400,
        ..adaptive_config()
    };
    let n = cfg.frame_samples();
    let samples = frame_pattern(&[(50, 5), (2_000, 100)], n);
    let utterance = run_adaptive(samples, &cfg);
    assert_eq!(utterance.stats.stop_reason, SegmentStopReason::MaxDuration);
    assert_eq!(utterance.stats.frames_processed, 20);
}

#[test]
fn quiet_vad_positives_are_not_speech_in_adaptive_mode() {
    let cfg = adaptive_config();
    let n = cfg.frame_samples();
    // VAD threshold is 30, so RMS 60 frames count as VAD speech, but they
    // sit below the calibrated energy threshold (50 * 2 = 100).
    let samples = frame_pattern(&[(50, 5), (60, 30), (10, 40)], n);
    let mut source = BufferSource::new(samples, n);
    let mut vad = SimpleThresholdVad::from_rms(30.0);
    let utterance =
        capture_utterance(&mut source, &mut vad, &cfg, SegmentMode::AdaptiveEnergy).unwrap();
    assert_eq!(utterance.stats.speech_frames, 0);
}

#[test]
fn buffer_source_zero_pads_the_final_partial_frame() {
    let mut source = BufferSource::new(vec![5i16; 10], 4);
    assert_eq!(source.next_frame().unwrap().unwrap(), vec![5; 4]);
    assert_eq!(source.next_frame().unwrap().unwrap(), vec![5; 4]);
    assert_eq!(source.next_frame().unwrap().unwrap(), vec![5, 5, 0, 0]);
    assert!(source.next_frame().unwrap().is_none());
}

#[test]
fn gated_vad_ends_a_binary_capture_on_a_quiet_tail() {
    // A bare energy VAD at RMS 10 would call the quiet tail speech forever;
    // the ambient gate reclassifies it as silence so the capture can end.
    let cfg = SegmenterConfig {
        sample_rate: 16_000,
        frame_ms: 20,
        skip_ms: 0,
        calibration_ms: 0,
        speech_multiplier: 2.0,
        silence_frames: 3,
        min_speech_frames: 0,
        max_duration_ms: 10_000,
        pre_padding_frames: 0,
        post_padding_frames: 0,
    };
    let n = cfg.frame_samples();
    let samples = frame_pattern(&[(2_000, 10), (50, 20)], n);
    let mut source = BufferSource::new(samples, n);
    let mut vad = AdaptiveGatedVad::new(SimpleThresholdVad::from_rms(10.0), AmbientConfig::default());
    vad.estimator_mut().set_ambient(400.0);
    let utterance =
        capture_utterance(&mut source, &mut vad, &cfg, SegmentMode::BinaryThreshold).unwrap();
    assert_eq!(utterance.stats.stop_reason, SegmentStopReason::Silence);
    assert_eq!(utterance.stats.speech_frames, 10);
    assert_eq!(utterance.samples.len(), 10 * n);
}
