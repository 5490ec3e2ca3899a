//! Rustpotter-backed keyword spotter implementing `KeywordSpotter`.

use crate::wake::{KeywordSpotter, Spotted};
use anyhow::{Context, Result};
use rustpotter::{Rustpotter, RustpotterConfig, SampleFormat};

/// Thin wrapper adapting `rustpotter` to the crate's `KeywordSpotter` trait.
///
/// The pipeline carries i16 PCM; rustpotter is fed f32 through a reused
/// scratch buffer. Detections below `min_score` are dropped here so the
/// detector's acceptance threshold stays the single tuning knob.
pub struct RustpotterSpotter {
    detector: Rustpotter,
    min_score: f32,
    scratch: Vec<f32>,
}

impl RustpotterSpotter {
    pub fn load(model_path: &str, keyword: &str, sample_rate: u32, min_score: f32) -> Result<Self> {
        let mut config = RustpotterConfig::default();
        config.fmt.sample_rate = sample_rate as usize;
        config.fmt.channels = 1;
        config.fmt.sample_format = SampleFormat::F32;
        config.detector.threshold = min_score;

        let mut detector = Rustpotter::new(&config)
            .map_err(anyhow::Error::msg)
            .context("failed to create rustpotter detector")?;
        detector
            .add_wakeword_from_file(keyword, model_path)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("failed to load wake-phrase model from {model_path}"))?;

        Ok(Self {
            detector,
            min_score,
            scratch: Vec::new(),
        })
    }
}

impl KeywordSpotter for RustpotterSpotter {
    fn samples_per_frame(&self) -> usize {
        self.detector.get_samples_per_frame()
    }

    fn process(&mut self, frame: &[i16]) -> Result<Option<Spotted>> {
        self.scratch.clear();
        self.scratch.reserve(frame.len());
        self.scratch
            .extend(frame.iter().map(|&s| s as f32 / 32_768.0));

        let detection = match self.detector.process_samples(std::mem::take(&mut self.scratch)) {
            Some(detection) => detection,
            None => return Ok(None),
        };
        if detection.score < self.min_score {
            return Ok(None);
        }
        Ok(Some(Spotted {
            keyword: detection.name.clone(),
            score: detection.score,
        }))
    }

    fn reset(&mut self) {
        // Rustpotter exposes no explicit reset; a few frames of silence
        // flush the audio window back to a neutral state.
        let silence = vec![0.0f32; self.detector.get_samples_per_frame()];
        for _ in 0..8 {
            let _ = self.detector.process_samples(silence.clone());
        }
    }

    fn name(&self) -> &'static str {
        "rustpotter"
    }
}
