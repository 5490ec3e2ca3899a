//! Utterance segmentation: capture the command audio that follows a wake
//! phrase and decide where it ends.
//!
//! Two strategies are supported. Binary-threshold mode trusts the VAD verdict
//! alone and suits short, low-noise captures. Adaptive energy mode (the live
//! default) calibrates the room's noise floor first and then requires both a
//! VAD "speech" verdict and energy above the derived threshold, which keeps a
//! misfiring VAD from stretching the capture in a noisy room.

use super::meter::rms;
use super::vad::{VadDecision, VadEngine};
use crate::log_debug;
use anyhow::Result;

/// Uniform "read next frame" capability over the live stream or a
/// pre-recorded buffer. `Ok(None)` means the source is exhausted.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Vec<i16>>>;
}

/// Frame source backed by an in-memory sample buffer. The final partial
/// frame is zero-padded to keep frame sizes fixed.
pub struct BufferSource {
    samples: Vec<i16>,
    frame_samples: usize,
    pos: usize,
}

impl BufferSource {
    pub fn new(samples: Vec<i16>, frame_samples: usize) -> Self {
        Self {
            samples,
            frame_samples: frame_samples.max(1),
            pos: 0,
        }
    }
}

impl FrameSource for BufferSource {
    fn next_frame(&mut self) -> Result<Option<Vec<i16>>> {
        if self.pos >= self.samples.len() {
            return Ok(None);
        }
        let end = (self.pos + self.frame_samples).min(self.samples.len());
        let mut frame = self.samples[self.pos..end].to_vec();
        frame.resize(self.frame_samples, 0);
        self.pos = end;
        Ok(Some(frame))
    }
}

/// End-of-speech detection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentMode {
    /// VAD verdict only; stop on sustained silence.
    BinaryThreshold,
    /// VAD verdict AND energy above the calibrated noise floor.
    AdaptiveEnergy,
}

/// Segmentation tuning. Every threshold is explicit; nothing is baked into
/// the algorithm. `frame_samples = sample_rate * frame_ms / 1000`.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    pub sample_rate: u32,
    pub frame_ms: u64,
    /// Discarded window at the start, covering the appliance's own
    /// wake-acknowledgement sound.
    pub skip_ms: u64,
    /// Noise-floor calibration window (adaptive mode).
    pub calibration_ms: u64,
    /// Speech threshold = noise floor * this multiplier.
    pub speech_multiplier: f32,
    /// Consecutive non-speech frames required to end the utterance.
    pub silence_frames: u32,
    /// Speech frames required before silence may end the utterance
    /// (adaptive mode).
    pub min_speech_frames: u32,
    /// Hard wall-clock ceiling, applied regardless of VAD state.
    pub max_duration_ms: u64,
    /// Frames retained before the first speech frame.
    pub pre_padding_frames: u32,
    /// Frames retained after the last speech frame.
    pub post_padding_frames: u32,
}

impl SegmenterConfig {
    pub fn frame_samples(&self) -> usize {
        ((self.sample_rate as u64 * self.frame_ms) / 1000).max(1) as usize
    }

    fn frames_for(&self, ms: u64) -> u64 {
        ms / self.frame_ms.max(1)
    }

    fn max_frames(&self) -> u64 {
        self.frames_for(self.max_duration_ms).max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStopReason {
    Silence,
    MaxDuration,
    SourceExhausted,
}

impl SegmentStopReason {
    pub fn label(self) -> &'static str {
        match self {
            SegmentStopReason::Silence => "silence",
            SegmentStopReason::MaxDuration => "max_duration",
            SegmentStopReason::SourceExhausted => "source_exhausted",
        }
    }
}

/// Capture counters for observability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentStats {
    pub frames_processed: u64,
    pub speech_frames: u64,
    pub stop_reason: SegmentStopReason,
}

/// A captured command utterance: 16-bit mono PCM at the pipeline rate.
/// Empty samples mean no speech was detected ("no input").
#[derive(Debug, Clone)]
pub struct Utterance {
    pub samples: Vec<i16>,
    pub stats: SegmentStats,
}

impl Utterance {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Record from `source` until end-of-speech is inferred.
///
/// Returns the speech frames plus the configured pre/post padding. If no
/// speech is detected before the stop condition, the samples are empty,
/// except when the source itself runs dry, in which case everything
/// accumulated is returned and the caller decides what to do with it.
pub fn capture_utterance(
    source: &mut dyn FrameSource,
    vad: &mut dyn VadEngine,
    cfg: &SegmenterConfig,
    mode: SegmentMode,
) -> Result<Utterance> {
    let skip_frames = cfg.frames_for(cfg.skip_ms);
    let max_frames = cfg.max_frames();

    let mut frames: Vec<Vec<i16>> = Vec::new();
    let mut frames_read: u64 = 0;
    let mut exhausted = false;

    // Discard the contaminated window right after the acknowledgement sound.
    while frames_read < skip_frames {
        match source.next_frame()? {
            Some(_) => frames_read += 1,
            None => {
                exhausted = true;
                break;
            }
        }
    }

    // Adaptive mode measures the room before listening for speech.
    let speech_threshold = match mode {
        SegmentMode::BinaryThreshold => 0.0,
        SegmentMode::AdaptiveEnergy => {
            let calib_frames = cfg.frames_for(cfg.calibration_ms).max(1);
            let mut rms_values = Vec::with_capacity(calib_frames as usize);
            while !exhausted && (rms_values.len() as u64) < calib_frames {
                match source.next_frame()? {
                    Some(frame) => {
                        frames_read += 1;
                        rms_values.push(rms(&frame));
                        frames.push(frame);
                    }
                    None => exhausted = true,
                }
            }
            median(&mut rms_values) * cfg.speech_multiplier
        }
    };

    let mut silence_streak: u32 = 0;
    let mut speech_frames: u64 = 0;
    let mut first_speech: Option<usize> = None;
    let mut last_speech: Option<usize> = None;

    let stop_reason = loop {
        if exhausted {
            break SegmentStopReason::SourceExhausted;
        }
        if frames_read >= max_frames {
            break SegmentStopReason::MaxDuration;
        }
        let frame = match source.next_frame()? {
            Some(frame) => frame,
            None => break SegmentStopReason::SourceExhausted,
        };
        frames_read += 1;

        let decision = vad.process_frame(&frame);
        let is_speech = match mode {
            SegmentMode::BinaryThreshold => decision == VadDecision::Speech,
            SegmentMode::AdaptiveEnergy => {
                decision == VadDecision::Speech && rms(&frame) > speech_threshold
            }
        };

        frames.push(frame);
        let idx = frames.len() - 1;

        if is_speech {
            speech_frames += 1;
            silence_streak = 0;
            first_speech.get_or_insert(idx);
            last_speech = Some(idx);
        } else {
            silence_streak = silence_streak.saturating_add(1);
        }

        if silence_streak > cfg.silence_frames {
            let min_speech_met = match mode {
                SegmentMode::BinaryThreshold => true,
                SegmentMode::AdaptiveEnergy => speech_frames >= cfg.min_speech_frames as u64,
            };
            if min_speech_met {
                break SegmentStopReason::Silence;
            }
        }
    };

    let samples = match first_speech {
        Some(first) => {
            let last = last_speech.unwrap_or(first);
            let start = first.saturating_sub(cfg.pre_padding_frames as usize);
            let end = (last + 1 + cfg.post_padding_frames as usize).min(frames.len());
            frames[start..end].concat()
        }
        None if stop_reason == SegmentStopReason::SourceExhausted => frames.concat(),
        None => Vec::new(),
    };

    let stats = SegmentStats {
        frames_processed: frames_read,
        speech_frames,
        stop_reason,
    };
    log_debug(&format!(
        "segment_metrics|frames={}|speech_frames={}|threshold={speech_threshold:.1}|stop={}",
        stats.frames_processed,
        stats.speech_frames,
        stats.stop_reason.label()
    ));
    tracing::debug!(
        frames = stats.frames_processed,
        speech_frames = stats.speech_frames,
        stop = stats.stop_reason.label(),
        "utterance segmented"
    );

    Ok(Utterance { samples, stats })
}

fn median(values: &mut [f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
