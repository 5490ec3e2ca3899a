//! Command-line parsing and validation helpers.

mod defaults;
#[cfg(test)]
mod tests;
mod validation;

use clap::{Parser, ValueEnum};

pub use defaults::{
    default_vad_engine, DEFAULT_AMBIENT_ALPHA, DEFAULT_CALIBRATE_MS, DEFAULT_CALIBRATION_MS,
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_FRAME_MS, DEFAULT_MAX_CAPTURE_MS, DEFAULT_MIN_SILENCE_RMS,
    DEFAULT_MIN_SPEECH_FRAMES, DEFAULT_PADDING_FRAMES, DEFAULT_RETRY_INITIAL_DELAY_MS,
    DEFAULT_RETRY_MAX, DEFAULT_RETRY_MAX_DELAY_MS, DEFAULT_SAMPLE_RATE, DEFAULT_SILENCE_FRAMES,
    DEFAULT_SILENCE_RATIO, DEFAULT_SKIP_MS, DEFAULT_SPEECH_MULTIPLIER, DEFAULT_VAD_SMOOTHING_FRAMES,
    DEFAULT_VAD_THRESHOLD_DB, DEFAULT_WAKE_CONFIDENCE, DEFAULT_WAKE_COOLDOWN_MS,
    DEFAULT_WAKE_KEYWORD, DEFAULT_WAKE_MAINTENANCE_MS, DEFAULT_WAKE_MAX_STREAM_ERRORS,
    DEFAULT_WAKE_REOPEN_DELAY_MS, DEFAULT_WAKE_REOPEN_RETRIES,
};

/// CLI options for the TuneWake voice front end. Validated values keep the
/// audio stages and the inference backends within sane operating ranges.
#[derive(Debug, Parser, Clone)]
#[command(about = "TuneWake voice appliance front end", author, version)]
pub struct AppConfig {
    /// Preferred audio input device name
    #[arg(long)]
    pub input_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Measure ambient noise, suggest thresholds, then exit
    #[arg(long = "calibrate", default_value_t = false)]
    pub calibrate: bool,

    /// Ambient sample duration for --calibrate (milliseconds)
    #[arg(long = "calibrate-ms", default_value_t = DEFAULT_CALIBRATE_MS)]
    pub calibrate_ms: u64,

    /// Path to the wake-phrase model file
    #[arg(long = "wake-model", env = "TUNEWAKE_WAKE_MODEL")]
    pub wake_model_path: Option<String>,

    /// Wake phrase registered with the spotter
    #[arg(long = "wake-keyword", default_value = DEFAULT_WAKE_KEYWORD)]
    pub wake_keyword: String,

    /// Minimum spotter confidence for an accepted detection
    #[arg(long = "wake-confidence", default_value_t = DEFAULT_WAKE_CONFIDENCE, allow_negative_numbers = true)]
    pub wake_confidence: f32,

    /// Minimum time between accepted detections (milliseconds)
    #[arg(long = "wake-cooldown-ms", default_value_t = DEFAULT_WAKE_COOLDOWN_MS)]
    pub wake_cooldown_ms: u64,

    /// Spotter state maintenance interval (milliseconds)
    #[arg(long = "wake-maintenance-ms", default_value_t = DEFAULT_WAKE_MAINTENANCE_MS)]
    pub wake_maintenance_ms: u64,

    /// Stream reopen attempts after a detection before giving up
    #[arg(long = "wake-reopen-retries", default_value_t = DEFAULT_WAKE_REOPEN_RETRIES)]
    pub wake_reopen_retries: u32,

    /// Initial stream reopen backoff (milliseconds)
    #[arg(long = "wake-reopen-delay-ms", default_value_t = DEFAULT_WAKE_REOPEN_DELAY_MS)]
    pub wake_reopen_delay_ms: u64,

    /// Consecutive stream errors tolerated before the detector stops
    #[arg(long = "wake-max-stream-errors", default_value_t = DEFAULT_WAKE_MAX_STREAM_ERRORS)]
    pub wake_max_stream_errors: u32,

    /// Path to the whisper GGML model
    #[arg(long = "whisper-model-path", env = "TUNEWAKE_WHISPER_MODEL")]
    pub whisper_model_path: Option<String>,

    /// Whisper beam size (>1 enables beam search)
    #[arg(long = "whisper-beam-size", default_value_t = 0)]
    pub whisper_beam_size: u32,

    /// Whisper temperature
    #[arg(long = "whisper-temperature", default_value_t = 0.0)]
    pub whisper_temperature: f32,

    /// Transcription language (ISO-639-1 code or 'auto')
    #[arg(long, default_value = "en")]
    pub lang: String,

    /// Pipeline sample rate (Hz)
    #[arg(long = "sample-rate", default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    /// Analysis frame size (milliseconds)
    #[arg(long = "frame-ms", default_value_t = DEFAULT_FRAME_MS)]
    pub frame_ms: u64,

    /// Discarded window after the acknowledgement sound (milliseconds)
    #[arg(long = "skip-ms", default_value_t = DEFAULT_SKIP_MS)]
    pub skip_ms: u64,

    /// Noise-floor calibration window per capture (milliseconds)
    #[arg(long = "calibration-ms", default_value_t = DEFAULT_CALIBRATION_MS)]
    pub calibration_ms: u64,

    /// Speech threshold as a multiple of the calibrated noise floor
    #[arg(long = "speech-multiplier", default_value_t = DEFAULT_SPEECH_MULTIPLIER)]
    pub speech_multiplier: f32,

    /// Consecutive silence frames that end a capture
    #[arg(long = "silence-frames", default_value_t = DEFAULT_SILENCE_FRAMES)]
    pub silence_frames: u32,

    /// Speech frames required before silence may end a capture
    #[arg(long = "min-speech-frames", default_value_t = DEFAULT_MIN_SPEECH_FRAMES)]
    pub min_speech_frames: u32,

    /// Hard capture ceiling (milliseconds)
    #[arg(long = "max-capture-ms", default_value_t = DEFAULT_MAX_CAPTURE_MS)]
    pub max_capture_ms: u64,

    /// Frames kept before the first speech frame
    #[arg(long = "pre-padding-frames", default_value_t = DEFAULT_PADDING_FRAMES)]
    pub pre_padding_frames: u32,

    /// Frames kept after the last speech frame
    #[arg(long = "post-padding-frames", default_value_t = DEFAULT_PADDING_FRAMES)]
    pub post_padding_frames: u32,

    /// Voice activity detection threshold (decibels)
    #[arg(long = "vad-threshold-db", default_value_t = DEFAULT_VAD_THRESHOLD_DB, allow_negative_numbers = true)]
    pub vad_threshold_db: f32,

    /// VAD smoothing window (frames)
    #[arg(long = "vad-smoothing-frames", default_value_t = DEFAULT_VAD_SMOOTHING_FRAMES)]
    pub vad_smoothing_frames: usize,

    /// Voice activity detector implementation to use
    #[arg(long = "vad-engine", value_enum, default_value_t = default_vad_engine())]
    pub vad_engine: VadEngineKind,

    /// EMA weight for the ambient noise estimator
    #[arg(long = "ambient-alpha", default_value_t = DEFAULT_AMBIENT_ALPHA)]
    pub ambient_alpha: f32,

    /// Silence threshold as a multiple of the ambient noise floor
    #[arg(long = "silence-ratio", default_value_t = DEFAULT_SILENCE_RATIO)]
    pub silence_ratio: f32,

    /// Lower bound on the ambient silence threshold (raw RMS)
    #[arg(long = "min-silence-rms", default_value_t = DEFAULT_MIN_SILENCE_RMS)]
    pub min_silence_rms: f32,

    /// Frame channel capacity between the audio callback and the pipeline
    #[arg(long = "channel-capacity", default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,

    /// Transcription retry budget (attempts = retries + 1)
    #[arg(long = "retry-max", default_value_t = DEFAULT_RETRY_MAX)]
    pub retry_max: u32,

    /// Initial transcription retry delay (milliseconds)
    #[arg(long = "retry-initial-delay-ms", default_value_t = DEFAULT_RETRY_INITIAL_DELAY_MS)]
    pub retry_initial_delay_ms: u64,

    /// Transcription retry delay ceiling (milliseconds)
    #[arg(long = "retry-max-delay-ms", default_value_t = DEFAULT_RETRY_MAX_DELAY_MS)]
    pub retry_max_delay_ms: u64,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "TUNEWAKE_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "TUNEWAKE_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging transcript snippets (debug log only)
    #[arg(long = "log-content", env = "TUNEWAKE_LOG_CONTENT", default_value_t = false)]
    pub log_content: bool,

    /// Enable verbose timing logs
    #[arg(long)]
    pub log_timings: bool,
}

/// Tunable parameters for the capture + segmentation stages, snapshotted
/// from the CLI for downstream consumers.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub sample_rate: u32,
    pub frame_ms: u64,
    pub skip_ms: u64,
    pub calibration_ms: u64,
    pub speech_multiplier: f32,
    pub silence_frames: u32,
    pub min_speech_frames: u32,
    pub max_capture_ms: u64,
    pub pre_padding_frames: u32,
    pub post_padding_frames: u32,
    pub vad_threshold_db: f32,
    pub vad_smoothing_frames: usize,
    pub vad_engine: VadEngineKind,
    pub channel_capacity: usize,
}

/// Available runtime-selectable VAD implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VadEngineKind {
    Earshot,
    Simple,
}

impl VadEngineKind {
    pub fn label(self) -> &'static str {
        match self {
            VadEngineKind::Earshot => "earshot",
            VadEngineKind::Simple => "simple",
        }
    }
}
