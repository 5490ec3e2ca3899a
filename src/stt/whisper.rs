//! Whisper inference backend.
//!
//! Wraps `whisper_rs` behind the `InferenceEngine` seam. The GGML model is
//! held in memory for the engine's lifetime and reused across requests.

#[cfg(unix)]
mod platform {
    use crate::log_debug;
    use crate::stt::{EngineOptions, InferenceEngine, SttError};
    use std::io;
    use std::os::raw::{c_char, c_uint, c_void};
    use std::os::unix::io::AsRawFd;
    use std::sync::Once;
    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    pub struct WhisperEngine {
        ctx: Option<WhisperContext>,
        language: String,
        beam_size: u32,
        temperature: f32,
    }

    impl WhisperEngine {
        /// Loads the model from disk.
        ///
        /// Stderr is temporarily redirected to `/dev/null` during loading
        /// because whisper.cpp emits verbose initialization messages.
        pub fn load(options: &EngineOptions, language: &str) -> Result<Self, SttError> {
            install_whisper_log_silencer();

            let null = std::fs::OpenOptions::new()
                .write(true)
                .open("/dev/null")
                .map_err(SttError::Io)?;
            let null_fd = null.as_raw_fd();

            // SAFETY: dup(2) duplicates the stderr file descriptor. We hold
            // the only reference and restore it before returning.
            let orig_stderr = unsafe { libc::dup(2) };
            if orig_stderr < 0 {
                return Err(SttError::Connection(format!(
                    "failed to dup stderr: {}",
                    io::Error::last_os_error()
                )));
            }

            let dup_result = unsafe { libc::dup2(null_fd, 2) };
            if dup_result < 0 {
                unsafe {
                    libc::close(orig_stderr);
                }
                return Err(SttError::Connection(format!(
                    "failed to redirect stderr: {}",
                    io::Error::last_os_error()
                )));
            }

            let ctx_result = WhisperContext::new_with_params(
                &options.model_path,
                WhisperContextParameters::default(),
            );

            let restore_result = unsafe { libc::dup2(orig_stderr, 2) };
            unsafe {
                libc::close(orig_stderr);
            }
            if restore_result < 0 {
                return Err(SttError::Connection(format!(
                    "failed to restore stderr: {}",
                    io::Error::last_os_error()
                )));
            }

            let ctx = ctx_result
                .map_err(|e| SttError::Connection(format!("failed to load whisper model: {e}")))?;
            Ok(Self {
                ctx: Some(ctx),
                language: language.to_string(),
                beam_size: options.beam_size,
                temperature: options.temperature,
            })
        }
    }

    impl InferenceEngine for WhisperEngine {
        fn decode(&mut self, samples: &[f32]) -> Result<String, SttError> {
            let ctx = self
                .ctx
                .as_ref()
                .ok_or_else(|| SttError::ResourceUnavailable("model released".to_string()))?;
            let mut state = ctx
                .create_state()
                .map_err(|e| SttError::Runtime(format!("failed to create whisper state: {e}")))?;

            let mut params = if self.beam_size > 1 {
                FullParams::new(SamplingStrategy::BeamSearch {
                    beam_size: self.beam_size as i32,
                    patience: -1.0,
                })
            } else {
                FullParams::new(SamplingStrategy::Greedy { best_of: 1 })
            };
            if self.language.eq_ignore_ascii_case("auto") {
                params.set_language(None);
                params.set_detect_language(true);
            } else {
                params.set_language(Some(&self.language));
                params.set_detect_language(false);
            }
            params.set_temperature(self.temperature);
            // Limit CPU usage so the appliance stays responsive.
            params.set_n_threads(num_cpus::get().min(8) as i32);
            params.set_print_progress(false);
            params.set_print_timestamps(false);
            params.set_print_special(false);
            params.set_print_realtime(false);
            params.set_translate(false);
            params.set_token_timestamps(false);

            state
                .full(params, samples)
                .map_err(|e| SttError::Runtime(format!("whisper inference failed: {e}")))?;

            let mut transcript = String::new();
            let num_segments = match state.full_n_segments() {
                Ok(count) => count,
                Err(err) => {
                    log_debug(&format!("whisper failed to read segment count: {err}"));
                    return Ok(transcript);
                }
            };
            if num_segments < 0 {
                log_debug("whisper returned a negative segment count");
                return Ok(transcript);
            }
            // Whisper splits output into small segments; stitch them together.
            for i in 0..num_segments {
                match state.full_get_segment_text_lossy(i) {
                    Ok(text) => transcript.push_str(&text),
                    Err(err) => log_debug(&format!("failed to read whisper segment {i}: {err}")),
                }
            }
            Ok(transcript)
        }

        fn is_available(&self) -> bool {
            self.ctx.is_some()
        }

        fn shutdown(&mut self) {
            self.ctx = None;
        }
    }

    fn install_whisper_log_silencer() {
        static INSTALL_LOG_CALLBACK: Once = Once::new();
        INSTALL_LOG_CALLBACK.call_once(|| unsafe {
            whisper_rs::set_log_callback(Some(whisper_log_callback), std::ptr::null_mut());
        });
    }

    #[allow(unused_variables)]
    unsafe extern "C" fn whisper_log_callback(
        _level: c_uint,
        _text: *const c_char,
        _user_data: *mut c_void,
    ) {
        // Silence the default whisper.cpp logger so it does not pollute the
        // appliance's console output.
    }
}

#[cfg(unix)]
pub use platform::WhisperEngine;

#[cfg(not(unix))]
mod platform {
    use crate::stt::{EngineOptions, InferenceEngine, SttError};

    /// Stub implementation for unsupported targets such as Windows.
    pub struct WhisperEngine;

    impl WhisperEngine {
        pub fn load(_: &EngineOptions, _: &str) -> Result<Self, SttError> {
            Err(SttError::Connection(
                "whisper transcription is currently supported only on Unix-like platforms"
                    .to_string(),
            ))
        }
    }

    impl InferenceEngine for WhisperEngine {
        fn decode(&mut self, _: &[f32]) -> Result<String, SttError> {
            Err(SttError::Connection(
                "whisper transcription is currently supported only on Unix-like platforms"
                    .to_string(),
            ))
        }

        fn is_available(&self) -> bool {
            false
        }

        fn shutdown(&mut self) {}
    }
}

#[cfg(not(unix))]
pub use platform::WhisperEngine;

use crate::stt::{EngineFactory, EngineOptions, InferenceEngine, SttError};

/// `EngineFactory` producing whisper engines.
pub struct WhisperFactory;

impl EngineFactory for WhisperFactory {
    fn load(
        &self,
        options: &EngineOptions,
        language: &str,
    ) -> Result<Box<dyn InferenceEngine>, SttError> {
        Ok(Box::new(WhisperEngine::load(options, language)?))
    }
}
