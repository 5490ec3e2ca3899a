//! Interaction cycle glue.
//!
//! The coordinator owns no audio logic of its own. It sequences one
//! wake-to-response cycle: raise the suppression gate, duck playback,
//! segment the command, transcribe it, restore playback, and report the
//! outcome. Playback control is best-effort; a music daemon that refuses to
//! pause must not cost the user their command.

use crate::audio::{capture_utterance, FrameSource, SegmentMode, SegmenterConfig, VadEngine};
use crate::{log_debug, log_debug_content};
use crate::stt::{AudioInput, SttService};
use crate::wake::SuppressionGate;
use anyhow::Result;
use std::time::Duration;

/// Seam to the appliance's playback side. Implementations talk to whatever
/// daemon plays the music; failures are logged and ignored.
pub trait PlaybackControl {
    fn pause(&mut self) -> Result<()>;
    fn resume(&mut self) -> Result<()>;
}

/// What one interaction cycle produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionOutcome {
    /// A non-empty command transcript, ready for intent handling.
    Command(String),
    /// No speech followed the wake phrase.
    NoInput,
    /// Speech was captured but produced no usable transcript.
    NotUnderstood,
}

/// Runs one interaction cycle per accepted wake detection.
pub struct Coordinator<'a, P: PlaybackControl> {
    playback: P,
    suppression: SuppressionGate,
    stt: &'a SttService,
    language: String,
    segmenter: SegmenterConfig,
    mode: SegmentMode,
    /// Gate window covering the acknowledgement sound the appliance plays
    /// right after a detection.
    suppression_window: Duration,
}

impl<'a, P: PlaybackControl> Coordinator<'a, P> {
    pub fn new(
        playback: P,
        suppression: SuppressionGate,
        stt: &'a SttService,
        language: impl Into<String>,
        segmenter: SegmenterConfig,
        mode: SegmentMode,
    ) -> Self {
        let suppression_window =
            Duration::from_millis(segmenter.skip_ms + segmenter.calibration_ms);
        Self {
            playback,
            suppression,
            stt,
            language: language.into(),
            segmenter,
            mode,
            suppression_window,
        }
    }

    /// Run one cycle against the given audio source.
    ///
    /// The suppression gate is raised before playback is touched so the
    /// appliance's own sounds can never retrigger the detector, and cleared
    /// once capture ends. Returns an error only when the frame source itself
    /// fails.
    pub fn run_cycle(
        &mut self,
        source: &mut dyn FrameSource,
        vad: &mut dyn VadEngine,
    ) -> Result<InteractionOutcome> {
        self.suppression.suppress_for(self.suppression_window);
        if let Err(err) = self.playback.pause() {
            log_debug(&format!("playback_pause_failed|{err:#}"));
        }

        let capture = capture_utterance(source, vad, &self.segmenter, self.mode);
        self.suppression.clear();

        let outcome = match capture {
            Ok(utterance) if utterance.is_empty() => Ok(InteractionOutcome::NoInput),
            Ok(utterance) => {
                let input = AudioInput::RawPcm {
                    samples: utterance.samples,
                    rate: self.segmenter.sample_rate,
                };
                match self.stt.transcribe(input, &self.language) {
                    Ok(text) if text.is_empty() => Ok(InteractionOutcome::NotUnderstood),
                    Ok(text) => {
                        log_debug_content(&format!("transcript|{text}"));
                        Ok(InteractionOutcome::Command(text))
                    }
                    Err(err) => {
                        log_debug(&format!("transcription_failed|{err}"));
                        Ok(InteractionOutcome::NotUnderstood)
                    }
                }
            }
            Err(err) => Err(err),
        };

        if let Err(err) = self.playback.resume() {
            log_debug(&format!("playback_resume_failed|{err:#}"));
        }
        outcome
    }

    pub fn suppression_gate(&self) -> SuppressionGate {
        self.suppression.clone()
    }
}
