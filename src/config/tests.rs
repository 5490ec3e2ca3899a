use super::{AppConfig, VadEngineKind};
use clap::Parser;

fn base_config() -> AppConfig {
    AppConfig::parse_from(["test-app"])
}

#[test]
fn defaults_pass_validation() {
    let mut cfg = base_config();
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_sample_rate_out_of_bounds() {
    let mut cfg = AppConfig::parse_from(["test-app", "--sample-rate", "4000"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--sample-rate", "96000"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_frame_ms_out_of_bounds() {
    let mut cfg = AppConfig::parse_from(["test-app", "--frame-ms", "4"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--frame-ms", "121"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_frame_that_does_not_divide_evenly() {
    // 22050 Hz * 7 ms is 154.35 samples, not a whole frame.
    let mut cfg =
        AppConfig::parse_from(["test-app", "--sample-rate", "22050", "--frame-ms", "7"]);
    assert!(cfg.validate().is_err());

    let mut cfg =
        AppConfig::parse_from(["test-app", "--sample-rate", "22050", "--frame-ms", "20"]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_skip_and_calibration_exceeding_capture() {
    let mut cfg = AppConfig::parse_from([
        "test-app",
        "--skip-ms",
        "600",
        "--calibration-ms",
        "500",
        "--max-capture-ms",
        "1000",
    ]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_silence_tail_longer_than_capture() {
    let mut cfg = AppConfig::parse_from([
        "test-app",
        "--silence-frames",
        "100",
        "--frame-ms",
        "20",
        "--max-capture-ms",
        "1000",
    ]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--silence-frames", "0"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_speech_multiplier_out_of_bounds() {
    let mut cfg = AppConfig::parse_from(["test-app", "--speech-multiplier", "0.5"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--speech-multiplier", "11.0"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_wake_confidence_out_of_bounds() {
    let mut cfg = AppConfig::parse_from(["test-app", "--wake-confidence", "1.5"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--wake-confidence", "-0.1"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_empty_wake_keyword() {
    let mut cfg = AppConfig::parse_from(["test-app", "--wake-keyword", "  "]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_retry_max_over_limit() {
    let mut cfg = AppConfig::parse_from(["test-app", "--retry-max", "11"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--retry-max", "10"]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_retry_delay_ceiling_below_initial() {
    let mut cfg = AppConfig::parse_from([
        "test-app",
        "--retry-initial-delay-ms",
        "500",
        "--retry-max-delay-ms",
        "100",
    ]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_ambient_alpha_out_of_range() {
    for alpha in ["0.0", "1.0", "1.5"] {
        let mut cfg = AppConfig::parse_from(["test-app", "--ambient-alpha", alpha]);
        assert!(cfg.validate().is_err(), "alpha {alpha} should be rejected");
    }
    let mut cfg = AppConfig::parse_from(["test-app", "--ambient-alpha", "0.3"]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_vad_threshold_out_of_bounds() {
    let mut cfg = AppConfig::parse_from(["test-app", "--vad-threshold-db", "5.0"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--vad-threshold-db", "-130.0"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_missing_model_paths() {
    let mut cfg = AppConfig::parse_from(["test-app", "--wake-model", "/no/such/model.rpw"]);
    assert!(cfg.validate().is_err());

    let mut cfg =
        AppConfig::parse_from(["test-app", "--whisper-model-path", "/no/such/ggml.bin"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_invalid_language_code() {
    let mut cfg = AppConfig::parse_from(["test-app", "--lang", "en$"]);
    assert!(cfg.validate().is_err());

    let mut cfg = AppConfig::parse_from(["test-app", "--lang", "zz-ZZ"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn accepts_locale_style_and_auto_language() {
    let mut cfg = AppConfig::parse_from(["test-app", "--lang", "en-US"]);
    assert!(cfg.validate().is_ok());

    let mut cfg = AppConfig::parse_from(["test-app", "--lang", "pt_BR"]);
    assert!(cfg.validate().is_ok());

    let mut cfg = AppConfig::parse_from(["test-app", "--lang", "auto"]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn pipeline_snapshot_mirrors_cli_values() {
    let mut cfg = AppConfig::parse_from([
        "test-app",
        "--frame-ms",
        "10",
        "--silence-frames",
        "25",
        "--min-speech-frames",
        "8",
        "--speech-multiplier",
        "3.0",
    ]);
    assert!(cfg.validate().is_ok());
    let pipeline = cfg.pipeline_config();
    assert_eq!(pipeline.frame_ms, 10);
    assert_eq!(pipeline.silence_frames, 25);
    assert_eq!(pipeline.min_speech_frames, 8);
    assert_eq!(pipeline.speech_multiplier, 3.0);
}

#[test]
fn segmenter_config_derives_frame_samples() {
    let cfg = base_config();
    let segmenter = cfg.segmenter_config();
    assert_eq!(segmenter.frame_samples(), 320);
}

#[test]
fn wake_config_converts_durations() {
    let cfg = AppConfig::parse_from(["test-app", "--wake-cooldown-ms", "1500"]);
    let wake = cfg.wake_config();
    assert_eq!(wake.cooldown, std::time::Duration::from_millis(1500));
    assert_eq!(wake.reopen_policy.max_retries, cfg.wake_reopen_retries);
}

#[test]
fn retry_policy_mirrors_cli_values() {
    let cfg = AppConfig::parse_from([
        "test-app",
        "--retry-max",
        "5",
        "--retry-initial-delay-ms",
        "100",
        "--retry-max-delay-ms",
        "800",
    ]);
    let policy = cfg.retry_policy();
    assert_eq!(policy.max_retries, 5);
    assert_eq!(policy.initial_delay, std::time::Duration::from_millis(100));
    assert_eq!(policy.max_delay, std::time::Duration::from_millis(800));
}

#[test]
fn engine_options_require_model_path() {
    let cfg = base_config();
    assert!(cfg.engine_options().is_err());
}

#[test]
fn vad_engine_labels_are_stable() {
    assert_eq!(VadEngineKind::Earshot.label(), "earshot");
    assert_eq!(VadEngineKind::Simple.label(), "simple");
}

#[cfg(feature = "vad_earshot")]
#[test]
fn default_vad_engine_prefers_earshot() {
    assert_eq!(super::default_vad_engine(), VadEngineKind::Earshot);
}
