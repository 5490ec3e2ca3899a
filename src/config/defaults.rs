use super::VadEngineKind;

pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;
pub const DEFAULT_FRAME_MS: u64 = 20;
pub const DEFAULT_SKIP_MS: u64 = 300;
pub const DEFAULT_CALIBRATION_MS: u64 = 300;
pub const DEFAULT_SPEECH_MULTIPLIER: f32 = 2.0;
pub const DEFAULT_SILENCE_FRAMES: u32 = 40;
pub const DEFAULT_MIN_SPEECH_FRAMES: u32 = 10;
pub const DEFAULT_MAX_CAPTURE_MS: u64 = 10_000;
pub const DEFAULT_PADDING_FRAMES: u32 = 5;
pub const DEFAULT_VAD_THRESHOLD_DB: f32 = -55.0;
pub const DEFAULT_VAD_SMOOTHING_FRAMES: usize = 3;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

pub const DEFAULT_WAKE_KEYWORD: &str = "hey tune";
pub const DEFAULT_WAKE_CONFIDENCE: f32 = 0.5;
pub const DEFAULT_WAKE_COOLDOWN_MS: u64 = 2_000;
pub const DEFAULT_WAKE_MAINTENANCE_MS: u64 = 60_000;
pub const DEFAULT_WAKE_REOPEN_RETRIES: u32 = 5;
pub const DEFAULT_WAKE_REOPEN_DELAY_MS: u64 = 250;
pub const DEFAULT_WAKE_MAX_STREAM_ERRORS: u32 = 3;

pub const DEFAULT_RETRY_MAX: u32 = 3;
pub const DEFAULT_RETRY_INITIAL_DELAY_MS: u64 = 250;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 2_000;

pub const DEFAULT_AMBIENT_ALPHA: f32 = 0.1;
pub const DEFAULT_SILENCE_RATIO: f32 = 1.5;
pub const DEFAULT_MIN_SILENCE_RMS: f32 = 100.0;

pub const DEFAULT_CALIBRATE_MS: u64 = 3_000;
pub(super) const MIN_CALIBRATE_MS: u64 = 500;
pub(super) const MAX_CALIBRATE_MS: u64 = 30_000;

pub(super) const MAX_CAPTURE_HARD_LIMIT_MS: u64 = 60_000;
pub(super) const ISO_639_1_CODES: &[&str] = &[
    "af", "am", "ar", "az", "be", "bg", "bn", "bs", "ca", "cs", "cy", "da", "de", "el", "en", "es",
    "et", "eu", "fa", "fi", "fil", "fr", "ga", "gl", "gu", "he", "hi", "hr", "hu", "hy", "id",
    "is", "it", "ja", "jv", "ka", "kk", "km", "kn", "ko", "lo", "lt", "lv", "mk", "ml", "mn", "mr",
    "ms", "my", "ne", "nl", "no", "pa", "pl", "pt", "ro", "ru", "si", "sk", "sl", "sq", "sr", "sv",
    "sw", "ta", "te", "th", "tr", "uk", "ur", "vi", "zh",
];

pub const fn default_vad_engine() -> VadEngineKind {
    #[cfg(feature = "vad_earshot")]
    {
        VadEngineKind::Earshot
    }
    #[cfg(not(feature = "vad_earshot"))]
    {
        VadEngineKind::Simple
    }
}
