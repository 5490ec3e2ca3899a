use super::defaults::{
    ISO_639_1_CODES, MAX_CALIBRATE_MS, MAX_CAPTURE_HARD_LIMIT_MS, MIN_CALIBRATE_MS,
};
use super::{AppConfig, PipelineConfig};
use crate::audio::{AmbientConfig, SegmenterConfig};
use crate::retry::RetryPolicy;
use crate::stt::EngineOptions;
use crate::wake::WakeConfig;
use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::time::Duration;

impl AppConfig {
    /// Parse CLI arguments and validate them right away.
    pub fn parse_args() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Check CLI values, enforce mutual consistency, and normalize paths.
    pub fn validate(&mut self) -> Result<()> {
        if !(8_000..=48_000).contains(&self.sample_rate) {
            bail!(
                "--sample-rate must be between 8000 and 48000 Hz, got {}",
                self.sample_rate
            );
        }
        if !(5..=120).contains(&self.frame_ms) {
            bail!("--frame-ms must be between 5 and 120, got {}", self.frame_ms);
        }
        // Frames must hold a whole number of samples.
        if (u64::from(self.sample_rate) * self.frame_ms) % 1000 != 0 {
            bail!(
                "--frame-ms {} does not divide evenly at {} Hz",
                self.frame_ms,
                self.sample_rate
            );
        }
        if self.max_capture_ms == 0 || self.max_capture_ms > MAX_CAPTURE_HARD_LIMIT_MS {
            bail!(
                "--max-capture-ms must be between 1 and {MAX_CAPTURE_HARD_LIMIT_MS} ms, got {}",
                self.max_capture_ms
            );
        }
        if self.skip_ms + self.calibration_ms >= self.max_capture_ms {
            bail!(
                "--skip-ms plus --calibration-ms ({} ms) must leave room under --max-capture-ms ({})",
                self.skip_ms + self.calibration_ms,
                self.max_capture_ms
            );
        }
        let silence_tail_ms = u64::from(self.silence_frames) * self.frame_ms;
        if self.silence_frames == 0 || silence_tail_ms > self.max_capture_ms {
            bail!(
                "--silence-frames must be at least 1 and span no more than --max-capture-ms ({} ms), got {} frames ({silence_tail_ms} ms)",
                self.max_capture_ms,
                self.silence_frames
            );
        }
        if !(1.0..=10.0).contains(&self.speech_multiplier) {
            bail!(
                "--speech-multiplier must be between 1.0 and 10.0, got {}",
                self.speech_multiplier
            );
        }
        if self.min_speech_frames > 500 {
            bail!(
                "--min-speech-frames must be at most 500, got {}",
                self.min_speech_frames
            );
        }
        if self.pre_padding_frames > 100 || self.post_padding_frames > 100 {
            bail!("--pre-padding-frames and --post-padding-frames must be at most 100");
        }
        if !(-120.0..=0.0).contains(&self.vad_threshold_db) {
            bail!(
                "--vad-threshold-db must be between -120.0 and 0.0 dB, got {}",
                self.vad_threshold_db
            );
        }
        if !(1..=10).contains(&self.vad_smoothing_frames) {
            bail!(
                "--vad-smoothing-frames must be between 1 and 10, got {}",
                self.vad_smoothing_frames
            );
        }
        if !(8..=1024).contains(&self.channel_capacity) {
            bail!(
                "--channel-capacity must be between 8 and 1024, got {}",
                self.channel_capacity
            );
        }

        if !(0.0..=1.0).contains(&self.wake_confidence) {
            bail!(
                "--wake-confidence must be between 0.0 and 1.0, got {}",
                self.wake_confidence
            );
        }
        if self.wake_cooldown_ms > 60_000 {
            bail!(
                "--wake-cooldown-ms must be at most 60000, got {}",
                self.wake_cooldown_ms
            );
        }
        if !(1_000..=3_600_000).contains(&self.wake_maintenance_ms) {
            bail!(
                "--wake-maintenance-ms must be between 1000 and 3600000, got {}",
                self.wake_maintenance_ms
            );
        }
        if self.wake_reopen_retries > 20 {
            bail!(
                "--wake-reopen-retries must be at most 20, got {}",
                self.wake_reopen_retries
            );
        }
        if self.wake_max_stream_errors == 0 || self.wake_max_stream_errors > 100 {
            bail!(
                "--wake-max-stream-errors must be between 1 and 100, got {}",
                self.wake_max_stream_errors
            );
        }
        if self.wake_keyword.trim().is_empty() {
            bail!("--wake-keyword must not be empty");
        }

        if self.retry_max > 10 {
            bail!("--retry-max must be at most 10, got {}", self.retry_max);
        }
        if self.retry_max_delay_ms < self.retry_initial_delay_ms {
            bail!(
                "--retry-max-delay-ms ({}) cannot be below --retry-initial-delay-ms ({})",
                self.retry_max_delay_ms,
                self.retry_initial_delay_ms
            );
        }

        if !(0.0..1.0).contains(&self.ambient_alpha) || self.ambient_alpha == 0.0 {
            bail!(
                "--ambient-alpha must be in (0, 1), got {}",
                self.ambient_alpha
            );
        }
        if !(1.0..=10.0).contains(&self.silence_ratio) {
            bail!(
                "--silence-ratio must be between 1.0 and 10.0, got {}",
                self.silence_ratio
            );
        }
        if !(0.0..=32_768.0).contains(&self.min_silence_rms) {
            bail!(
                "--min-silence-rms must be between 0 and 32768, got {}",
                self.min_silence_rms
            );
        }

        if !(MIN_CALIBRATE_MS..=MAX_CALIBRATE_MS).contains(&self.calibrate_ms) {
            bail!(
                "--calibrate-ms must be between {MIN_CALIBRATE_MS} and {MAX_CALIBRATE_MS} ms"
            );
        }

        if self.whisper_beam_size > 10 {
            bail!(
                "--whisper-beam-size must be between 0 and 10, got {}",
                self.whisper_beam_size
            );
        }
        if !(0.0..=5.0).contains(&self.whisper_temperature) {
            bail!(
                "--whisper-temperature must be between 0.0 and 5.0, got {}",
                self.whisper_temperature
            );
        }

        #[cfg(not(feature = "vad_earshot"))]
        if matches!(self.vad_engine, super::VadEngineKind::Earshot) {
            bail!("--vad-engine earshot requires building with the 'vad_earshot' feature");
        }

        if let Some(model) = &mut self.wake_model_path {
            *model = canonical_model_path(model, "--wake-model")?;
        }
        if let Some(model) = &mut self.whisper_model_path {
            *model = canonical_model_path(model, "--whisper-model-path")?;
        }

        if self.lang.trim().is_empty() {
            bail!("--lang must not be empty");
        }
        if !self.lang.eq_ignore_ascii_case("auto") {
            if !self
                .lang
                .chars()
                .all(|ch| ch.is_ascii_alphabetic() || ch == '-' || ch == '_')
            {
                bail!("--lang must contain only alphabetic characters or '-'/'_' separators");
            }
            // Allow locale-style values but only check the leading ISO-639-1 code.
            let lang_primary = self
                .lang
                .split(['-', '_'])
                .next()
                .unwrap_or("")
                .to_ascii_lowercase();
            if !ISO_639_1_CODES.contains(&lang_primary.as_str()) {
                bail!(
                    "--lang must start with a valid ISO-639-1 code or be 'auto', got '{}'",
                    self.lang
                );
            }
        }

        Ok(())
    }

    /// Snapshot the CLI-controlled capture settings for the audio stages.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            sample_rate: self.sample_rate,
            frame_ms: self.frame_ms,
            skip_ms: self.skip_ms,
            calibration_ms: self.calibration_ms,
            speech_multiplier: self.speech_multiplier,
            silence_frames: self.silence_frames,
            min_speech_frames: self.min_speech_frames,
            max_capture_ms: self.max_capture_ms,
            pre_padding_frames: self.pre_padding_frames,
            post_padding_frames: self.post_padding_frames,
            vad_threshold_db: self.vad_threshold_db,
            vad_smoothing_frames: self.vad_smoothing_frames,
            vad_engine: self.vad_engine,
            channel_capacity: self.channel_capacity,
        }
    }

    pub fn segmenter_config(&self) -> SegmenterConfig {
        SegmenterConfig {
            sample_rate: self.sample_rate,
            frame_ms: self.frame_ms,
            skip_ms: self.skip_ms,
            calibration_ms: self.calibration_ms,
            speech_multiplier: self.speech_multiplier,
            silence_frames: self.silence_frames,
            min_speech_frames: self.min_speech_frames,
            max_duration_ms: self.max_capture_ms,
            pre_padding_frames: self.pre_padding_frames,
            post_padding_frames: self.post_padding_frames,
        }
    }

    pub fn wake_config(&self) -> WakeConfig {
        WakeConfig {
            sample_rate: self.sample_rate,
            frame_ms: self.frame_ms,
            confidence_threshold: self.wake_confidence,
            cooldown: Duration::from_millis(self.wake_cooldown_ms),
            maintenance_interval: Duration::from_millis(self.wake_maintenance_ms),
            maintenance_silence_frames: 5,
            reopen_policy: RetryPolicy {
                max_retries: self.wake_reopen_retries,
                initial_delay: Duration::from_millis(self.wake_reopen_delay_ms),
                max_delay: Duration::from_millis(self.wake_reopen_delay_ms.max(1) * 16),
                backoff_factor: 2.0,
            },
            max_consecutive_stream_errors: self.wake_max_stream_errors,
            channel_capacity: self.channel_capacity,
        }
    }

    pub fn ambient_config(&self) -> AmbientConfig {
        AmbientConfig {
            ambient_alpha: self.ambient_alpha,
            silence_ratio: self.silence_ratio,
            min_silence_rms: self.min_silence_rms,
        }
    }

    pub fn engine_options(&self) -> Result<EngineOptions> {
        let model_path = self
            .whisper_model_path
            .clone()
            .ok_or_else(|| anyhow!("--whisper-model-path is required for transcription"))?;
        Ok(EngineOptions {
            model_path,
            beam_size: self.whisper_beam_size,
            temperature: self.whisper_temperature,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry_max,
            initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            backoff_factor: 2.0,
        }
    }
}

/// Make sure a model file exists and store its canonical absolute path.
fn canonical_model_path(value: &str, flag: &str) -> Result<String> {
    let path = Path::new(value);
    if !path.exists() {
        bail!("{flag} '{}' does not exist", path.display());
    }
    let canonical = path
        .canonicalize()
        .with_context(|| format!("failed to canonicalize {flag} '{value}'"))?;
    canonical
        .to_str()
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow!("{flag} must be valid UTF-8"))
}
