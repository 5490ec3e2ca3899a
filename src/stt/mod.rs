//! Speech-to-text service.
//!
//! One heavyweight inference engine is shared process-wide behind a lazy
//! singleton. The engine loads on first use, is reused across requests, and
//! reloads only when the requested language changes or the backend reports
//! its resources gone. Model loading and inference both run under a bounded
//! retry policy. A failed transcription is reported as an empty transcript,
//! not an error; the appliance treats "heard nothing" and "could not decode"
//! the same way.

pub mod whisper;

use crate::audio::{resample_pcm, TARGET_RATE};
use crate::log_debug;
use crate::retry::{with_retry, RetryPolicy};
use regex::Regex;
use std::io::Cursor;
use std::sync::{Mutex, OnceLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SttError {
    /// The backend could not be reached or initialized.
    #[error("engine connection failed: {0}")]
    Connection(String),
    /// The engine's resources were released out from under us; a reload may
    /// recover.
    #[error("engine resources unavailable: {0}")]
    ResourceUnavailable(String),
    #[error("audio io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("inference failed: {0}")]
    Runtime(String),
    /// The engine ran but produced no text.
    #[error("engine produced an empty transcript")]
    EmptyResult,
    /// Malformed audio input. Never retried.
    #[error("invalid audio input: {0}")]
    InvalidInput(String),
}

impl SttError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SttError::InvalidInput(_))
    }
}

/// Audio handed to the service: either a self-describing container or raw
/// PCM with an explicit rate. The shape is decided once at this boundary.
#[derive(Debug, Clone)]
pub enum AudioInput {
    /// WAV container bytes, 16-bit mono.
    Container(Vec<u8>),
    /// Headerless 16-bit mono PCM.
    RawPcm { samples: Vec<i16>, rate: u32 },
}

/// Options a backend needs to load its model.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub model_path: String,
    pub beam_size: u32,
    pub temperature: f32,
}

/// A loaded inference engine. Implementations are created by an
/// `EngineFactory` for one language and fed mono f32 samples at 16 kHz.
pub trait InferenceEngine: Send {
    fn decode(&mut self, samples: &[f32]) -> Result<String, SttError>;
    /// False once the backend's resources are gone; the service reloads.
    fn is_available(&self) -> bool;
    /// Release model resources. Called before a language switch and on
    /// service shutdown.
    fn shutdown(&mut self);
}

/// Engine construction seam, mockable in tests.
pub trait EngineFactory: Send + Sync {
    fn load(
        &self,
        options: &EngineOptions,
        language: &str,
    ) -> Result<Box<dyn InferenceEngine>, SttError>;
}

struct LoadedEngine {
    engine: Box<dyn InferenceEngine>,
    language: String,
}

/// Shared transcription service.
pub struct SttService {
    factory: Box<dyn EngineFactory>,
    options: EngineOptions,
    policy: RetryPolicy,
    state: Mutex<Option<LoadedEngine>>,
}

impl SttService {
    pub fn new(
        factory: Box<dyn EngineFactory>,
        options: EngineOptions,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            factory,
            options,
            policy,
            state: Mutex::new(None),
        }
    }

    /// Process-wide service backed by the whisper engine. The first caller's
    /// options win; later calls return the same instance.
    pub fn global(options: EngineOptions) -> &'static SttService {
        static GLOBAL: OnceLock<SttService> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            SttService::new(
                Box::new(whisper::WhisperFactory),
                options,
                RetryPolicy::default(),
            )
        })
    }

    /// Transcribe one utterance.
    ///
    /// Empty audio short-circuits to an empty transcript without touching
    /// the engine. Exhausted retries, reload failures, and empty decode
    /// results also come back as `""`. Only malformed input is an error.
    pub fn transcribe(&self, input: AudioInput, language: &str) -> Result<String, SttError> {
        let (samples, rate) = decode_input(input)?;
        if samples.is_empty() {
            return Ok(String::new());
        }

        let resampled = resample_pcm(&samples, rate, TARGET_RATE);
        let pcm_f32: Vec<f32> = resampled.iter().map(|&s| s as f32 / 32_768.0).collect();

        let started = std::time::Instant::now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(err) = self.ensure_engine(&mut state, language) {
            log_debug(&format!("stt_load_failed|{err}"));
            return Ok(String::new());
        }

        match self.decode_with_retry(&mut state, language, &pcm_f32) {
            Ok(text) => {
                tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    chars = text.len(),
                    "transcription finished"
                );
                Ok(text)
            }
            Err(SttError::InvalidInput(reason)) => Err(SttError::InvalidInput(reason)),
            Err(SttError::EmptyResult) => Ok(String::new()),
            Err(err) => {
                log_debug(&format!("stt_decode_failed|{err}"));
                Ok(String::new())
            }
        }
    }

    /// Unload the engine if one is loaded. Safe to call repeatedly.
    pub fn release(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        drop_engine(&mut state);
    }

    /// Language of the currently loaded engine, if any.
    pub fn loaded_language(&self) -> Option<String> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.as_ref().map(|loaded| loaded.language.clone())
    }

    fn decode_with_retry(
        &self,
        state: &mut Option<LoadedEngine>,
        language: &str,
        pcm_f32: &[f32],
    ) -> Result<String, SttError> {
        // An engine whose resources vanished mid-session gets exactly one
        // rebuild before the request is given up on.
        for reload in [false, true] {
            if reload {
                drop_engine(state);
                self.ensure_engine(state, language)?;
            }
            let loaded = state
                .as_mut()
                .ok_or_else(|| SttError::Runtime("engine not loaded".to_string()))?;
            if !loaded.engine.is_available() {
                if reload {
                    return Err(SttError::ResourceUnavailable(
                        "engine unavailable after reload".to_string(),
                    ));
                }
                continue;
            }
            let result = with_retry(&self.policy, SttError::is_retryable, || {
                let raw = loaded.engine.decode(pcm_f32)?;
                let cleaned = sanitize_transcript(&raw);
                if cleaned.is_empty() {
                    return Err(SttError::EmptyResult);
                }
                Ok(cleaned)
            });
            match result {
                Err(SttError::ResourceUnavailable(reason)) if !reload => {
                    log_debug(&format!("stt_engine_lost|{reason}"));
                }
                other => return other,
            }
        }
        Err(SttError::ResourceUnavailable(
            "engine unavailable".to_string(),
        ))
    }

    fn ensure_engine(
        &self,
        state: &mut Option<LoadedEngine>,
        language: &str,
    ) -> Result<(), SttError> {
        if let Some(loaded) = state.as_ref() {
            if loaded.language == language {
                return Ok(());
            }
            log_debug(&format!(
                "stt_language_switch|from={}|to={language}",
                loaded.language
            ));
            drop_engine(state);
        }
        let engine = with_retry(&self.policy, SttError::is_retryable, || {
            self.factory.load(&self.options, language)
        })?;
        *state = Some(LoadedEngine {
            engine,
            language: language.to_string(),
        });
        Ok(())
    }
}

fn drop_engine(state: &mut Option<LoadedEngine>) {
    if let Some(mut loaded) = state.take() {
        loaded.engine.shutdown();
    }
}

/// Decode either input shape into mono i16 samples plus their rate. Raw PCM
/// is wrapped into an in-memory WAV first so there is a single decode path.
fn decode_input(input: AudioInput) -> Result<(Vec<i16>, u32), SttError> {
    let bytes = match input {
        AudioInput::Container(bytes) => {
            if bytes.is_empty() {
                return Ok((Vec::new(), TARGET_RATE));
            }
            bytes
        }
        AudioInput::RawPcm { samples, rate } => {
            if samples.is_empty() {
                return Ok((Vec::new(), rate.max(1)));
            }
            wrap_pcm_as_wav(&samples, rate)?
        }
    };
    decode_wav(&bytes)
}

fn wrap_pcm_as_wav(samples: &[i16], rate: u32) -> Result<Vec<u8>, SttError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate.max(1),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| SttError::InvalidInput(format!("wav header: {e}")))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| SttError::InvalidInput(format!("wav body: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| SttError::InvalidInput(format!("wav finalize: {e}")))?;
    }
    Ok(cursor.into_inner())
}

/// The pipeline produces 16-bit mono WAV; anything else is rejected rather
/// than silently converted.
fn decode_wav(bytes: &[u8]) -> Result<(Vec<i16>, u32), SttError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| SttError::InvalidInput(format!("unreadable wav: {e}")))?;
    let spec = reader.spec();
    if spec.channels != 1 {
        return Err(SttError::InvalidInput(format!(
            "expected mono audio, got {} channels",
            spec.channels
        )));
    }
    if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        return Err(SttError::InvalidInput(format!(
            "expected 16-bit integer samples, got {}-bit {:?}",
            spec.bits_per_sample, spec.sample_format
        )));
    }

    let samples: Vec<i16> = reader
        .samples::<i16>()
        .collect::<Result<_, _>>()
        .map_err(|e| SttError::InvalidInput(format!("wav samples: {e}")))?;
    Ok((samples, spec.sample_rate))
}

/// Strip whisper-style non-speech markers and collapse whitespace.
pub fn sanitize_transcript(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    static NON_SPEECH_RE: OnceLock<Regex> = OnceLock::new();
    let re = NON_SPEECH_RE.get_or_init(|| {
        Regex::new(
            r"(?i)\[\s*\]|\(\s*\)|\[(?:\s*(?:silence|noise|inaudible|blank_audio|blank audio|music|laughter|applause|cough|breath(?:ing)?|wind|background)\s*)\]|\((?:\s*(?:silence|noise|inaudible|blank audio|music|laughter|applause|cough|breath(?:ing)?|wind|background|wind blowing)\s*)\)",
        )
        .expect("non-speech regex should compile")
    });
    let without_markers = re.replace_all(trimmed, " ");
    without_markers
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
