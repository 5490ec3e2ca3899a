//! Voice Activity Detection (VAD) for speech/silence classification.
//!
//! Processes fixed-size PCM frames and decides whether the user is speaking.
//! The segmenter combines these verdicts with energy thresholds to find the
//! end of a command utterance.

use super::meter::rms;
use std::cmp::Ordering as CmpOrdering;
use std::collections::VecDeque;

/// Voice Activity Detection engine that processes audio frames.
///
/// # Frame Size Contract
/// Implementations may require specific frame sizes. Earshot, for example,
/// expects 10/20/30 ms frames at 16 kHz.
///
/// Frame size in samples = (sample_rate * frame_duration_ms) / 1000
/// Example: 20ms @ 16kHz = 320 samples
///
/// Callers must ensure frames passed to `process_frame` match the engine's
/// expected frame size, or the VAD may produce incorrect results.
pub trait VadEngine {
    fn process_frame(&mut self, samples: &[i16]) -> VadDecision;
    fn reset(&mut self);
    fn name(&self) -> &'static str {
        "unknown_vad"
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VadDecision {
    Speech,
    Silence,
    Uncertain,
}

/// Smooths VAD decisions using a sliding window majority vote.
///
/// Reduces false positives from brief noise spikes by requiring multiple
/// consecutive frames to agree before changing the speech/silence state.
pub struct VadSmoother {
    window: VecDeque<VadDecision>,
    window_size: usize,
}

impl VadSmoother {
    pub fn new(window_size: usize) -> Self {
        Self {
            window: VecDeque::new(),
            window_size: window_size.max(1),
        }
    }

    /// Returns the majority decision from the last `window_size` frames.
    pub fn smooth(&mut self, decision: VadDecision) -> VadDecision {
        if self.window_size <= 1 {
            return decision;
        }
        self.window.push_back(decision);
        if self.window.len() > self.window_size {
            self.window.pop_front();
        }

        let mut speech = 0usize;
        let mut silence = 0usize;
        for item in &self.window {
            match item {
                VadDecision::Speech => speech += 1,
                VadDecision::Silence => silence += 1,
                VadDecision::Uncertain => {}
            }
        }
        match speech.cmp(&silence) {
            CmpOrdering::Greater => VadDecision::Speech,
            CmpOrdering::Less => VadDecision::Silence,
            CmpOrdering::Equal => decision,
        }
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}

/// VAD engine wrapped with majority-vote smoothing. This is what the live
/// pipeline runs; the bare engines remain available for tests and tooling.
pub struct SmoothedVad {
    inner: Box<dyn VadEngine>,
    smoother: VadSmoother,
}

impl SmoothedVad {
    pub fn new(inner: Box<dyn VadEngine>, window_size: usize) -> Self {
        Self {
            inner,
            smoother: VadSmoother::new(window_size),
        }
    }
}

impl VadEngine for SmoothedVad {
    fn process_frame(&mut self, samples: &[i16]) -> VadDecision {
        let decision = self.inner.process_frame(samples);
        self.smoother.smooth(decision)
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.smoother.reset();
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

/// Energy-threshold VAD. Used when Earshot is disabled or unavailable, and
/// as the binary verdict source in the segmenter's tests.
#[derive(Debug, Clone)]
pub struct SimpleThresholdVad {
    threshold_rms: f32,
}

impl SimpleThresholdVad {
    /// Threshold supplied in dBFS to match the CLI surface.
    pub fn new(threshold_db: f32) -> Self {
        Self {
            threshold_rms: 32_768.0 * 10f32.powf(threshold_db / 20.0),
        }
    }

    /// Threshold supplied directly in raw i16 RMS units.
    pub fn from_rms(threshold_rms: f32) -> Self {
        Self { threshold_rms }
    }
}

impl VadEngine for SimpleThresholdVad {
    fn process_frame(&mut self, samples: &[i16]) -> VadDecision {
        if samples.is_empty() {
            return VadDecision::Uncertain;
        }
        if rms(samples) >= self.threshold_rms {
            VadDecision::Speech
        } else {
            VadDecision::Silence
        }
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "simple_threshold_vad"
    }
}
