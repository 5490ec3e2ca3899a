//! Wake-phrase detection over a live microphone stream.
//!
//! The detector owns the input stream, resamples hardware-rate frames to the
//! spotter's rate, and feeds fixed-size frames through a keyword-spotting
//! model. An accepted detection closes the stream, runs the handler to
//! completion, and reopens the stream with bounded backoff. Command capture
//! therefore can never race with a new detection; the microphone simply is
//! not listening for the wake phrase while the handler runs.

use crate::audio::{resample_pcm, FrameStream, Recorder};
use crate::log_debug;
use crate::retry::{with_retry, RetryPolicy};
use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Keyword-spotting model seam.
///
/// Implementations carry convolutional/recurrent state across frames, so
/// `reset` must restore a neutral state (feeding silence is an acceptable
/// soft reset).
pub trait KeywordSpotter {
    /// Fixed frame size the model expects, in samples at its native rate.
    fn samples_per_frame(&self) -> usize;
    /// Process one frame; `Some` when a keyword scored above the model's own
    /// floor this frame.
    fn process(&mut self, frame: &[i16]) -> Result<Option<Spotted>>;
    fn reset(&mut self);
    fn name(&self) -> &'static str {
        "unknown_spotter"
    }
}

/// A keyword the model matched in the current frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Spotted {
    pub keyword: String,
    pub score: f32,
}

/// One accepted wake-phrase detection, handed to the coordinator.
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    pub keyword: String,
    pub confidence: f32,
    pub timestamp: Instant,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DetectorState {
    Idle,
    Listening,
    Detected,
    Stopped,
}

/// Shared window during which detections are ignored, set by the coordinator
/// around the appliance's own audio output (acknowledgement sounds, TTS).
#[derive(Clone, Default)]
pub struct SuppressionGate {
    until: Arc<Mutex<Option<Instant>>>,
}

impl SuppressionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn suppress_for(&self, window: Duration) {
        let deadline = Instant::now() + window;
        let mut guard = self.until.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(deadline);
    }

    pub fn clear(&self) {
        let mut guard = self.until.lock().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    pub fn is_active(&self) -> bool {
        let guard = self.until.lock().unwrap_or_else(|e| e.into_inner());
        matches!(*guard, Some(deadline) if Instant::now() < deadline)
    }
}

/// Detector tuning. All values come from validated configuration.
#[derive(Debug, Clone)]
pub struct WakeConfig {
    pub sample_rate: u32,
    pub frame_ms: u64,
    pub confidence_threshold: f32,
    /// Minimum time between two accepted detections.
    pub cooldown: Duration,
    /// How often to feed silence frames through the model as a soft reset.
    pub maintenance_interval: Duration,
    pub maintenance_silence_frames: usize,
    /// Backoff schedule for reopening the input stream.
    pub reopen_policy: RetryPolicy,
    /// Consecutive unrecoverable stream errors tolerated before stopping.
    pub max_consecutive_stream_errors: u32,
    pub channel_capacity: usize,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            sample_rate: crate::audio::TARGET_RATE,
            frame_ms: 20,
            confidence_threshold: 0.5,
            cooldown: Duration::from_secs(2),
            maintenance_interval: Duration::from_secs(60),
            maintenance_silence_frames: 5,
            reopen_policy: RetryPolicy {
                max_retries: 5,
                initial_delay: Duration::from_millis(250),
                max_delay: Duration::from_secs(4),
                backoff_factor: 2.0,
            },
            max_consecutive_stream_errors: 3,
            channel_capacity: 64,
        }
    }
}

enum LoopExit {
    Detection(DetectionEvent),
    StreamError(String),
    StopRequested,
}

/// Continuous wake-phrase listener.
pub struct WakeDetector {
    cfg: WakeConfig,
    suppression: SuppressionGate,
    state: DetectorState,
    last_accepted: Option<Instant>,
    stop: Arc<AtomicBool>,
}

impl WakeDetector {
    pub fn new(cfg: WakeConfig, suppression: SuppressionGate) -> Self {
        Self {
            cfg,
            suppression,
            state: DetectorState::Idle,
            last_accepted: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    /// Flag the appliance flips to shut the listening loop down cleanly.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Should a spotted keyword become an accepted detection right now?
    ///
    /// Requires confidence at or above the threshold, an elapsed cooldown
    /// since the last accepted detection, and no active suppression window.
    fn accepts(&self, spotted: &Spotted, now: Instant) -> bool {
        if spotted.score < self.cfg.confidence_threshold {
            return false;
        }
        if let Some(last) = self.last_accepted {
            if now.duration_since(last) < self.cfg.cooldown {
                return false;
            }
        }
        !self.suppression.is_active()
    }

    /// Run the detection loop until stopped or until the stream cannot be
    /// recovered. The handler runs synchronously on this thread with the
    /// stream closed; listening resumes only after it returns.
    pub fn run<F>(
        &mut self,
        recorder: &Recorder,
        spotter: &mut dyn KeywordSpotter,
        mut handler: F,
    ) -> Result<()>
    where
        F: FnMut(DetectionEvent),
    {
        let mut stream = recorder.open_frame_stream(self.cfg.frame_ms, self.cfg.channel_capacity)?;
        let mut consecutive_errors: u32 = 0;

        loop {
            self.state = DetectorState::Listening;
            let exit = self.listen(&stream, spotter);
            drop(stream);

            match exit {
                LoopExit::StopRequested => {
                    self.state = DetectorState::Idle;
                    return Ok(());
                }
                LoopExit::Detection(event) => {
                    self.state = DetectorState::Detected;
                    self.last_accepted = Some(event.timestamp);
                    log_debug(&format!(
                        "wake_detected|keyword={}|confidence={:.2}",
                        event.keyword, event.confidence
                    ));
                    tracing::info!(
                        keyword = %event.keyword,
                        confidence = event.confidence,
                        "wake detection accepted"
                    );
                    handler(event);
                    consecutive_errors = 0;
                }
                LoopExit::StreamError(msg) => {
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    log_debug(&format!(
                        "wake_stream_error|count={consecutive_errors}|{msg}"
                    ));
                    spotter.reset();
                    if consecutive_errors > self.cfg.max_consecutive_stream_errors {
                        self.state = DetectorState::Stopped;
                        return Err(anyhow!(
                            "input stream failed {consecutive_errors} times in a row: {msg}"
                        ));
                    }
                }
            }

            stream = match self.reopen(recorder) {
                Ok(stream) => stream,
                Err(err) => {
                    self.state = DetectorState::Stopped;
                    return Err(err.context("could not reopen input stream; detection cannot continue"));
                }
            };
        }
    }

    fn listen(&mut self, stream: &FrameStream, spotter: &mut dyn KeywordSpotter) -> LoopExit {
        let frame_samples = spotter.samples_per_frame().max(1);
        let wait = Duration::from_millis(self.cfg.frame_ms.max(5) * 4);
        let mut pending: Vec<i16> = Vec::with_capacity(frame_samples * 2);
        let mut last_maintenance = Instant::now();

        loop {
            if self.stop.load(Ordering::Relaxed) {
                return LoopExit::StopRequested;
            }

            if last_maintenance.elapsed() >= self.cfg.maintenance_interval {
                self.feed_maintenance_silence(spotter, frame_samples);
                last_maintenance = Instant::now();
            }

            let frame = match stream.recv_timeout(wait) {
                Ok(frame) => frame,
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    return LoopExit::StreamError("audio stream disconnected".to_string());
                }
            };

            pending.extend(resample_pcm(
                &frame,
                stream.device_rate(),
                self.cfg.sample_rate,
            ));

            while pending.len() >= frame_samples {
                let model_frame: Vec<i16> = pending.drain(..frame_samples).collect();
                match spotter.process(&model_frame) {
                    Ok(Some(spotted)) => {
                        let now = Instant::now();
                        if self.accepts(&spotted, now) {
                            return LoopExit::Detection(DetectionEvent {
                                keyword: spotted.keyword,
                                confidence: spotted.score,
                                timestamp: now,
                            });
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        // Transient inference failures are not fatal; a state
                        // reset keeps the model from drifting on bad frames.
                        log_debug(&format!("spotter_error|{err:#}"));
                        spotter.reset();
                    }
                }
            }
        }
    }

    /// Soft-reset the model's recurrent state by running silence through it.
    fn feed_maintenance_silence(&self, spotter: &mut dyn KeywordSpotter, frame_samples: usize) {
        let silence = vec![0i16; frame_samples];
        for _ in 0..self.cfg.maintenance_silence_frames {
            if let Err(err) = spotter.process(&silence) {
                log_debug(&format!("maintenance_silence_error|{err:#}"));
                spotter.reset();
                return;
            }
        }
    }

    fn reopen(&self, recorder: &Recorder) -> Result<FrameStream> {
        with_retry(&self.cfg.reopen_policy, |_| true, || {
            recorder.open_frame_stream(self.cfg.frame_ms, self.cfg.channel_capacity)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spotted(score: f32) -> Spotted {
        Spotted {
            keyword: "hey tune".to_string(),
            score,
        }
    }

    fn detector_with(cfg: WakeConfig) -> WakeDetector {
        WakeDetector::new(cfg, SuppressionGate::new())
    }

    #[test]
    fn rejects_low_confidence() {
        let detector = detector_with(WakeConfig::default());
        assert!(!detector.accepts(&spotted(0.4), Instant::now()));
        assert!(detector.accepts(&spotted(0.6), Instant::now()));
    }

    #[test]
    fn threshold_is_inclusive() {
        let detector = detector_with(WakeConfig::default());
        assert!(detector.accepts(&spotted(0.5), Instant::now()));
    }

    #[test]
    fn cooldown_blocks_back_to_back_detections() {
        let mut detector = detector_with(WakeConfig::default());
        let now = Instant::now();
        detector.last_accepted = Some(now);
        assert!(!detector.accepts(&spotted(0.9), now + Duration::from_millis(500)));
        assert!(detector.accepts(&spotted(0.9), now + Duration::from_secs(3)));
    }

    #[test]
    fn suppression_window_blocks_detection() {
        let detector = detector_with(WakeConfig::default());
        detector.suppression.suppress_for(Duration::from_secs(5));
        assert!(!detector.accepts(&spotted(0.9), Instant::now()));
        detector.suppression.clear();
        assert!(detector.accepts(&spotted(0.9), Instant::now()));
    }

    #[test]
    fn suppression_gate_expires() {
        let gate = SuppressionGate::new();
        gate.suppress_for(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(!gate.is_active());
    }

    #[test]
    fn stop_handle_is_shared() {
        let detector = detector_with(WakeConfig::default());
        let handle = detector.stop_handle();
        handle.store(true, Ordering::Relaxed);
        assert!(detector.stop.load(Ordering::Relaxed));
    }

    #[test]
    fn detector_starts_idle() {
        let detector = detector_with(WakeConfig::default());
        assert_eq!(detector.state(), DetectorState::Idle);
    }
}
