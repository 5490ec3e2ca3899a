//! Adaptive ambient-noise tracking.
//!
//! Binary keyword-spotting VADs are tuned for generic speech, not a specific
//! room's noise floor. The estimator tracks an exponentially-weighted ambient
//! RMS from frames the VAD already calls non-speech and derives a dynamic
//! silence threshold from it; a VAD "speech" verdict below that threshold is
//! overridden to non-speech.

use super::meter::rms;
use super::vad::{VadDecision, VadEngine};

/// Tuning for the ambient estimator. All values are explicit configuration.
#[derive(Debug, Clone, Copy)]
pub struct AmbientConfig {
    /// EMA weight for new non-speech samples, in (0, 1).
    pub ambient_alpha: f32,
    /// Multiplier applied to the ambient RMS to form the silence threshold.
    pub silence_ratio: f32,
    /// Lower bound on the derived threshold, in raw i16 RMS units.
    pub min_silence_rms: f32,
}

impl Default for AmbientConfig {
    fn default() -> Self {
        Self {
            ambient_alpha: 0.1,
            silence_ratio: 1.5,
            min_silence_rms: 100.0,
        }
    }
}

/// Outcome of one estimator update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SilenceVerdict {
    pub is_speech: bool,
    pub threshold: f32,
}

/// Exponentially-weighted ambient noise floor.
///
/// The estimate is unset until the first non-speech sample (or an explicit
/// `set_ambient` seed) and converges to the ambient RMS as non-speech frames
/// accumulate.
#[derive(Debug, Clone)]
pub struct AmbientEstimator {
    cfg: AmbientConfig,
    ambient_rms: Option<f32>,
}

impl AmbientEstimator {
    pub fn new(cfg: AmbientConfig) -> Self {
        Self {
            cfg,
            ambient_rms: None,
        }
    }

    /// Fold one frame's RMS into the estimate and classify it.
    ///
    /// Non-speech frames (per the external VAD) update the EMA. The verdict
    /// passes the VAD through except when a claimed speech frame falls below
    /// the derived threshold, which is overridden to non-speech.
    pub fn update(&mut self, frame_rms: f32, vad_says_speech: bool) -> SilenceVerdict {
        if !vad_says_speech {
            self.ambient_rms = Some(match self.ambient_rms {
                None => frame_rms,
                Some(current) => {
                    (1.0 - self.cfg.ambient_alpha) * current + self.cfg.ambient_alpha * frame_rms
                }
            });
        }

        let threshold = self.threshold();
        let is_speech = vad_says_speech && frame_rms >= threshold;
        SilenceVerdict {
            is_speech,
            threshold,
        }
    }

    /// Current silence threshold; the ambient estimate counts as zero until set.
    pub fn threshold(&self) -> f32 {
        let ambient = self.ambient_rms.unwrap_or(0.0);
        (ambient * self.cfg.silence_ratio).max(self.cfg.min_silence_rms)
    }

    /// Seed the estimate, e.g. from an explicit calibration pass.
    /// Non-positive values are ignored.
    pub fn set_ambient(&mut self, ambient: f32) {
        if ambient > 0.0 {
            self.ambient_rms = Some(ambient);
        }
    }

    pub fn reset(&mut self) {
        self.ambient_rms = None;
    }

    pub fn ambient_rms(&self) -> Option<f32> {
        self.ambient_rms
    }
}

/// `VadEngine` wrapper that gates an inner VAD's verdicts through the
/// ambient estimator. Used by the binary-threshold segmentation mode.
pub struct AdaptiveGatedVad<V> {
    inner: V,
    estimator: AmbientEstimator,
}

impl<V: VadEngine> AdaptiveGatedVad<V> {
    pub fn new(inner: V, cfg: AmbientConfig) -> Self {
        Self {
            inner,
            estimator: AmbientEstimator::new(cfg),
        }
    }

    pub fn estimator(&self) -> &AmbientEstimator {
        &self.estimator
    }

    pub fn estimator_mut(&mut self) -> &mut AmbientEstimator {
        &mut self.estimator
    }
}

impl<V: VadEngine> VadEngine for AdaptiveGatedVad<V> {
    fn process_frame(&mut self, samples: &[i16]) -> VadDecision {
        let decision = self.inner.process_frame(samples);
        if decision == VadDecision::Uncertain {
            return decision;
        }
        let verdict = self
            .estimator
            .update(rms(samples), decision == VadDecision::Speech);
        if verdict.is_speech {
            VadDecision::Speech
        } else {
            VadDecision::Silence
        }
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.estimator.reset();
    }

    fn name(&self) -> &'static str {
        "adaptive_gated_vad"
    }
}
