//! Sample-rate conversion for 16-bit mono PCM.
//!
//! The core path is a linear interpolator: each call is self-contained and
//! produces exactly `round(n * dst/src)` samples. Blocks are ~20 ms, so the
//! discontinuity at block boundaries is accepted rather than smoothed. An
//! optional rubato sinc path handles live capture when the
//! `high-quality-audio` feature is enabled, falling back to the linear path
//! on error.

use crate::log_debug;
#[cfg(feature = "high-quality-audio")]
use anyhow::{anyhow, Result};
#[cfg(feature = "high-quality-audio")]
use rubato::{InterpolationParameters, InterpolationType, Resampler, SincFixedIn, WindowFunction};
use std::cmp::Ordering as CmpOrdering;
#[cfg(any(test, feature = "high-quality-audio"))]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(test)]
use std::sync::atomic::AtomicUsize;

// Practical hardware rate bounds; anything outside is a driver bug.
pub(super) const MIN_DEVICE_RATE: u32 = 2_000;
pub(super) const MAX_DEVICE_RATE: u32 = 192_000;

#[cfg(feature = "high-quality-audio")]
pub(super) static RESAMPLER_WARNING_SHOWN: AtomicBool = AtomicBool::new(false);
#[cfg(test)]
pub(super) static RESAMPLE_FALLBACK_COUNT: AtomicUsize = AtomicUsize::new(0);
#[cfg(test)]
pub(super) static FORCE_RUBATO_ERROR: AtomicBool = AtomicBool::new(false);

/// Linear-interpolation resampler over normalized time coordinates.
///
/// Output length is exactly `round(n * dst_rate / src_rate)`; interpolated
/// values are clamped to the i16 range. Matching rates are a pass-through.
pub fn resample_pcm(input: &[i16], src_rate: u32, dst_rate: u32) -> Vec<i16> {
    if src_rate == 0 || dst_rate == 0 {
        return input.to_vec();
    }
    if input.is_empty() || src_rate == dst_rate {
        return input.to_vec();
    }

    let ratio = dst_rate as f64 / src_rate as f64;
    let output_len = (input.len() as f64 * ratio).round() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_idx = i as f64 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = (src_idx - idx as f64) as f32;

        let sample = if idx + 1 < input.len() {
            input[idx] as f32 * (1.0 - frac) + input[idx + 1] as f32 * frac
        } else {
            input.last().copied().unwrap_or(0) as f32
        };
        output.push(sample.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16);
    }

    output
}

/// Resample a live-capture frame and pad/truncate it to an exact length so
/// the VAD and spotter always see fixed-size frames.
pub fn convert_frame_to_target(
    frame: Vec<i16>,
    device_rate: u32,
    target_rate: u32,
    desired_len: usize,
) -> Vec<i16> {
    if device_rate == target_rate {
        return adjust_frame_length(frame, desired_len);
    }
    let resampled = resample_to_target(&frame, device_rate, target_rate);
    adjust_frame_length(resampled, desired_len)
}

/// Live-capture resampling entry point: rubato when available, linear otherwise.
pub(super) fn resample_to_target(input: &[i16], device_rate: u32, target_rate: u32) -> Vec<i16> {
    if device_rate == 0 || input.is_empty() || device_rate == target_rate {
        return input.to_vec();
    }
    if !(MIN_DEVICE_RATE..=MAX_DEVICE_RATE).contains(&device_rate) {
        return input.to_vec();
    }

    #[cfg(feature = "high-quality-audio")]
    {
        match resample_with_rubato(input, device_rate, target_rate) {
            Ok(output) => output,
            Err(err) => {
                #[cfg(test)]
                RESAMPLE_FALLBACK_COUNT.fetch_add(1, Ordering::Relaxed);
                if !RESAMPLER_WARNING_SHOWN.swap(true, Ordering::AcqRel) {
                    log_debug(&format!(
                        "high-quality resampler failed ({err}); falling back to linear path"
                    ));
                }
                resample_pcm(input, device_rate, target_rate)
            }
        }
    }

    #[cfg(not(feature = "high-quality-audio"))]
    {
        resample_pcm(input, device_rate, target_rate)
    }
}

#[cfg(feature = "high-quality-audio")]
pub(super) fn resample_with_rubato(
    input: &[i16],
    device_rate: u32,
    target_rate: u32,
) -> Result<Vec<i16>> {
    if device_rate == 0 || input.is_empty() || device_rate == target_rate {
        return Ok(input.to_vec());
    }
    if !(MIN_DEVICE_RATE..=MAX_DEVICE_RATE).contains(&device_rate) {
        return Err(anyhow!(
            "unsupported device sample rate {device_rate}Hz for resampling"
        ));
    }

    #[cfg(test)]
    if FORCE_RUBATO_ERROR.swap(false, Ordering::Relaxed) {
        return Err(anyhow!("forced rubato error"));
    }

    let ratio = target_rate as f64 / device_rate as f64;
    let chunk = 256usize;
    let params = InterpolationParameters {
        sinc_len: 64,
        f_cutoff: 0.90,
        interpolation: InterpolationType::Cubic,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut rs = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk, 1)
        .map_err(|e| anyhow!("failed to construct sinc resampler: {e:?}"))?;

    let expect = ((input.len() as f64) * ratio).round().max(1.0) as usize;
    let mut out = Vec::with_capacity(expect + 8);

    let mut idx = 0usize;
    let mut seg = vec![0.0f32; chunk];
    while idx < input.len() {
        let end = (idx + chunk).min(input.len());
        let len = end - idx;
        let pad = input
            .get(end.wrapping_sub(1))
            .map(|s| *s as f32 / 32_768.0)
            .unwrap_or(0.0);
        seg.fill(pad);
        for (dst, src) in seg[..len].iter_mut().zip(&input[idx..end]) {
            *dst = *src as f32 / 32_768.0;
        }
        let produced = rs
            .process(std::slice::from_ref(&seg), None)
            .map_err(|e| anyhow!("resampler process failed: {e:?}"))?;
        out.extend(
            produced[0]
                .iter()
                .map(|s| (s * 32_768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16),
        );
        idx = end;
    }

    match out.len().cmp(&expect) {
        CmpOrdering::Greater => out.truncate(expect),
        CmpOrdering::Less => {
            let pad = out.last().copied().unwrap_or(0);
            out.resize(expect, pad);
        }
        CmpOrdering::Equal => {}
    }
    Ok(out)
}

pub(super) fn adjust_frame_length(mut data: Vec<i16>, desired: usize) -> Vec<i16> {
    match data.len().cmp(&desired) {
        CmpOrdering::Greater => {
            data.truncate(desired);
        }
        CmpOrdering::Less => {
            let pad = data.last().copied().unwrap_or(0);
            data.resize(desired, pad);
        }
        CmpOrdering::Equal => {}
    }
    data
}
