use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const DEFAULT_METER_DB: f32 = -60.0;

/// Shared live input level, readable from any thread.
#[derive(Clone, Debug)]
pub struct LiveMeter {
    level_bits: Arc<AtomicU32>,
}

impl LiveMeter {
    pub fn new() -> Self {
        Self {
            level_bits: Arc::new(AtomicU32::new(DEFAULT_METER_DB.to_bits())),
        }
    }

    pub fn set_db(&self, db: f32) {
        self.level_bits.store(db.to_bits(), Ordering::Relaxed);
    }

    pub fn level_db(&self) -> f32 {
        f32::from_bits(self.level_bits.load(Ordering::Relaxed))
    }
}

impl Default for LiveMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// Root-mean-square energy of a PCM frame, in raw i16 units.
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let energy: f64 = samples
        .iter()
        .map(|s| {
            let v = *s as f64;
            v * v
        })
        .sum::<f64>()
        / samples.len() as f64;
    energy.sqrt() as f32
}

/// RMS expressed in dBFS, floored at the meter default for silence.
pub fn rms_db(samples: &[i16]) -> f32 {
    let value = rms(samples);
    if value <= 0.0 {
        return DEFAULT_METER_DB;
    }
    20.0 * (value / 32_768.0).max(1e-6).log10()
}
