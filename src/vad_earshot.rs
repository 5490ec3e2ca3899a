//! Earshot-powered Voice Activity Detector adapter implementing `VadEngine`.

use crate::audio::{VadDecision, VadEngine};
use earshot::{VoiceActivityDetector, VoiceActivityProfile};

/// Thin wrapper that adapts `earshot` to the crate's `VadEngine` trait.
pub struct EarshotVad {
    detector: VoiceActivityDetector,
    frame_samples: usize,
    scratch: Vec<i16>,
}

impl EarshotVad {
    /// Map the configured dB threshold onto earshot's aggressiveness
    /// profiles. Lower thresholds mean the user wants fewer false speech
    /// verdicts, so they get the more aggressive profiles.
    pub fn new(threshold_db: f32, sample_rate: u32, frame_ms: u64) -> Self {
        let profile = match threshold_db {
            t if t <= -50.0 => VoiceActivityProfile::VERY_AGGRESSIVE,
            t if t <= -40.0 => VoiceActivityProfile::AGGRESSIVE,
            t if t <= -30.0 => VoiceActivityProfile::LBR,
            _ => VoiceActivityProfile::QUALITY,
        };
        let frame_ms = frame_ms.clamp(10, 30) as usize;
        let frame_samples = ((sample_rate as usize) * frame_ms) / 1000;
        Self {
            detector: VoiceActivityDetector::new(profile),
            frame_samples: frame_samples.max(160),
            scratch: Vec::new(),
        }
    }
}

impl VadEngine for EarshotVad {
    fn process_frame(&mut self, samples: &[i16]) -> VadDecision {
        if samples.is_empty() {
            return VadDecision::Uncertain;
        }
        self.scratch.clear();
        self.scratch.extend_from_slice(samples);
        if self.scratch.len() < self.frame_samples {
            self.scratch.resize(self.frame_samples, 0);
        } else if self.scratch.len() > self.frame_samples {
            self.scratch.truncate(self.frame_samples);
        }
        match self.detector.predict_16khz(&self.scratch) {
            Ok(true) => VadDecision::Speech,
            Ok(false) => VadDecision::Silence,
            Err(_) => VadDecision::Uncertain,
        }
    }

    fn reset(&mut self) {
        self.detector.reset();
    }

    fn name(&self) -> &'static str {
        "earshot_vad"
    }
}
