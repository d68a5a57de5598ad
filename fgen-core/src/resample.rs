//! Anti-aliased resampling for arb waveform preparation.
//!
//! Downsampling runs a biquad low-pass (direct form II) at the target
//! Nyquist before linear-interpolation decimation, so naive decimation
//! artifacts never reach the instrument. Upsampling is pure linear
//! interpolation. The result is normalized into `[-1, 1]`.

use std::f64::consts::{PI, SQRT_2};

/// Device hard limits on arb point counts.
pub const MIN_POINTS: usize = 8;
pub const MAX_POINTS: usize = 16000;

/// Resample `input` to exactly `target_points` samples.
///
/// Returns an empty vector for empty input or a target below [`MIN_POINTS`].
/// An equal-size input passes through (modulo the final normalize/clamp), so
/// applying this twice with the same target is idempotent.
pub fn resample_with_anti_aliasing(input: &[f32], target_points: usize) -> Vec<f32> {
    if input.is_empty() || target_points < MIN_POINTS {
        return Vec::new();
    }

    let mut output = if input.len() == target_points {
        input.to_vec()
    } else if input.len() > target_points {
        let mut filtered = input.to_vec();
        let ratio = target_points as f64 / input.len() as f64;
        // Nyquist for the target rate
        apply_low_pass(&mut filtered, 0.5 * ratio);
        linear_resample(&filtered, target_points)
    } else {
        linear_resample(input, target_points)
    };

    normalize(&mut output);
    output
}

/// IIR biquad low-pass, direct form II, cutoff given as a fraction of the
/// input sample rate.
pub fn apply_low_pass(data: &mut [f32], cutoff_ratio: f64) {
    if data.is_empty() {
        return;
    }

    let n = 1.0 / (PI * cutoff_ratio.max(0.001)).tan();
    let n_squared = n * n;
    let c1 = 1.0 / (1.0 + SQRT_2 * n + n_squared);

    let b0 = c1;
    let b1 = c1 * 2.0;
    let b2 = c1;
    let a1 = c1 * 2.0 * (1.0 - n_squared);
    let a2 = c1 * (1.0 - SQRT_2 * n + n_squared);

    let (mut x1, mut x2, mut y1, mut y2) = (0.0f64, 0.0f64, 0.0f64, 0.0f64);
    for sample in data.iter_mut() {
        let input = *sample as f64;
        let mut output = b0 * input + b1 * x1 + b2 * x2 - a1 * y1 - a2 * y2;

        // Denormal protection
        if output.abs() < 1.0e-8 {
            output = 0.0;
        }

        x2 = x1;
        x1 = input;
        y2 = y1;
        y1 = output;
        *sample = output as f32;
    }
}

fn linear_resample(input: &[f32], target_points: usize) -> Vec<f32> {
    if input.len() < 2 {
        return vec![input.first().copied().unwrap_or(0.0); target_points];
    }
    let mut output = Vec::with_capacity(target_points);
    let step = (input.len() - 1) as f64 / (target_points - 1) as f64;
    for i in 0..target_points {
        let src_index = i as f64 * step;
        let idx0 = src_index as usize;
        let idx1 = (idx0 + 1).min(input.len() - 1);
        let frac = src_index - idx0 as f64;
        let value = input[idx0] as f64 * (1.0 - frac) + input[idx1] as f64 * frac;
        output.push(value as f32);
    }
    output
}

/// Scale down if the peak exceeds unit magnitude, else clamp into `[-1, 1]`
/// to absorb floating-point slop.
pub fn normalize(data: &mut [f32]) {
    if data.is_empty() {
        return;
    }
    let peak = data.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
    if peak > 1.0 {
        for value in data.iter_mut() {
            *value /= peak;
        }
    } else {
        for value in data.iter_mut() {
            *value = value.clamp(-1.0, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32 / (len - 1) as f32).collect()
    }

    #[test]
    fn equal_size_passes_through() {
        let input = ramp(64);
        let output = resample_with_anti_aliasing(&input, 64);
        assert_eq!(output, input);
    }

    #[test]
    fn idempotent_at_same_target() {
        let input: Vec<f32> = (0..1000)
            .map(|i| (i as f32 * 0.05).sin() * 0.9)
            .collect();
        let once = resample_with_anti_aliasing(&input, 256);
        let twice = resample_with_anti_aliasing(&once, 256);
        assert_eq!(once, twice);
    }

    #[test]
    fn rejects_tiny_targets_and_empty_input() {
        assert!(resample_with_anti_aliasing(&ramp(100), 7).is_empty());
        assert!(resample_with_anti_aliasing(&[], 100).is_empty());
        assert_eq!(resample_with_anti_aliasing(&ramp(100), 8).len(), 8);
    }

    #[test]
    fn output_length_matches_target() {
        assert_eq!(resample_with_anti_aliasing(&ramp(48000), 1024).len(), 1024);
        assert_eq!(resample_with_anti_aliasing(&ramp(100), 1000).len(), 1000);
    }

    #[test]
    fn output_stays_in_unit_range() {
        let input: Vec<f32> = (0..4800).map(|i| (i as f32 * 0.01).sin() * 3.0).collect();
        let output = resample_with_anti_aliasing(&input, 512);
        assert!(output.iter().all(|v| (-1.0..=1.0).contains(v)));
        // normalization preserves the peak at unit magnitude
        let peak = output.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
        assert!(peak > 0.99);
    }

    #[test]
    fn upsampling_interpolates_endpoints() {
        let input = vec![0.0f32, 1.0];
        let output = resample_with_anti_aliasing(&input, 11);
        assert_eq!(output.len(), 11);
        assert!((output[0] - 0.0).abs() < 1e-6);
        assert!((output[10] - 1.0).abs() < 1e-6);
        assert!((output[5] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn single_sample_replicates() {
        let output = resample_with_anti_aliasing(&[0.25], 8);
        assert_eq!(output, vec![0.25; 8]);
    }

    #[test]
    fn downsampling_attenuates_alias_band() {
        // A tone right under the input Nyquist should mostly vanish after an
        // 8:1 decimation with the anti-aliasing filter in place.
        let input: Vec<f32> = (0..8192)
            .map(|i| (i as f32 * PI as f32 * 0.9).sin())
            .collect();
        let output = resample_with_anti_aliasing(&input, 1024);
        let energy: f32 = output.iter().map(|v| v * v).sum::<f32>() / output.len() as f32;
        assert!(energy < 0.05, "alias energy too high: {}", energy);
    }

    #[test]
    fn clamp_absorbs_float_slop() {
        let mut data = vec![1.0000001f32, -1.0000001];
        normalize(&mut data);
        assert!(data.iter().all(|v| (-1.0..=1.0).contains(v)));
    }
}
