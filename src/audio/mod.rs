//! Audio acquisition, resampling, and utterance segmentation.
//!
//! The appliance captures microphone audio via CPAL as 16-bit mono PCM,
//! resamples it to the model rate, and segments command utterances with a
//! combination of binary VAD and adaptive energy thresholds.

/// Sample rate expected by the keyword spotter and the transcription engine.
pub const TARGET_RATE: u32 = 16_000;

mod dispatch;
mod meter;
mod recorder;
mod resample;
mod segmenter;
mod silence;
#[cfg(test)]
mod tests;
mod vad;

pub use meter::{rms, rms_db, LiveMeter};
pub use recorder::{FrameStream, LiveFrameSource, Recorder};
pub use resample::{convert_frame_to_target, resample_pcm};
pub use segmenter::{
    capture_utterance, BufferSource, FrameSource, SegmentMode, SegmentStats, SegmentStopReason,
    SegmenterConfig, Utterance,
};
pub use silence::{AdaptiveGatedVad, AmbientConfig, AmbientEstimator, SilenceVerdict};
pub use vad::{SimpleThresholdVad, SmoothedVad, VadDecision, VadEngine, VadSmoother};
