/*---------------------------------------------------------------------------------------------
 *  Copyright (c) the mico project authors. All rights reserved.
 *  Licensed under the Apache License, Version 2.0.
 *--------------------------------------------------------------------------------------------*/

use std::f64::consts::PI;

use ndarray::{ArrayD, ArrayViewD, Axis};

/// Separable orthonormal N-D DCT. The block codecs run it once per tile;
/// blocks are small (tens of samples per axis), so the direct O(n^2) lane
/// transform is not worth replacing with a factored one.

/// Forward orthonormal DCT-II along every axis.
pub fn forward_dct(data: &ArrayD<f64>) -> ArrayD<f64> {
    let mut output = data.clone();
    for axis in 0..output.ndim() {
        transform_axis(&mut output, axis, dct_ii_lane);
    }
    return output;
}

/// Inverse transform, orthonormal DCT-III along every axis.
pub fn inverse_dct(data: &ArrayD<f64>) -> ArrayD<f64> {
    let mut output = data.clone();
    for axis in 0..output.ndim() {
        transform_axis(&mut output, axis, dct_iii_lane);
    }
    return output;
}

fn transform_axis(data: &mut ArrayD<f64>, axis: usize, lane_transform: fn(&[f64], &mut [f64])) {
    let n = data.shape()[axis];
    let mut input = vec![0.0; n];
    let mut output = vec![0.0; n];

    for mut lane in data.lanes_mut(Axis(axis)) {
        for (i, &v) in lane.iter().enumerate() {
            input[i] = v;
        }
        lane_transform(&input, &mut output);
        for (i, v) in lane.iter_mut().enumerate() {
            *v = output[i];
        }
    }
}

fn dct_ii_lane(input: &[f64], output: &mut [f64]) {
    let n = input.len();
    for (k, out) in output.iter_mut().enumerate() {
        let mut sum = 0.0;
        for (i, &v) in input.iter().enumerate() {
            sum += v * (PI * (2 * i + 1) as f64 * k as f64 / (2 * n) as f64).cos();
        }
        let scale = if k == 0 {
            (1.0 / n as f64).sqrt()
        } else {
            (2.0 / n as f64).sqrt()
        };
        *out = sum * scale;
    }
}

fn dct_iii_lane(input: &[f64], output: &mut [f64]) {
    let n = input.len();
    for (i, out) in output.iter_mut().enumerate() {
        let mut sum = input[0] * (1.0 / n as f64).sqrt();
        let scale = (2.0 / n as f64).sqrt();
        for (k, &v) in input.iter().enumerate().skip(1) {
            sum += v * scale * (PI * (2 * i + 1) as f64 * k as f64 / (2 * n) as f64).cos();
        }
        *out = sum;
    }
}

pub fn to_f64(view: ArrayViewD<'_, i32>) -> ArrayD<f64> {
    view.mapv(f64::from)
}

/// Rounds half away from zero, matching the coefficient rounding the codecs
/// expect on both sides of the transform.
pub fn round_to_i32(data: &ArrayD<f64>) -> ArrayD<i32> {
    data.mapv(|v| v.round() as i32)
}

#[cfg(test)]
use ndarray::IxDyn;

#[test]
fn test_forward_inverse_identity() {
    let data: Vec<f64> = (0..24).map(|i| (i as f64 * 13.7) % 29.0 - 14.0).collect();
    let block = ArrayD::from_shape_vec(IxDyn(&[2, 3, 4]), data).unwrap();

    let restored = inverse_dct(&forward_dct(&block));
    for (&a, &b) in block.iter().zip(restored.iter()) {
        assert!((a - b).abs() < 1e-9, "{} vs {}", a, b);
    }
}

#[test]
fn test_dc_of_constant_block() {
    let block = ArrayD::from_elem(IxDyn(&[4, 4]), 10.0);
    let transformed = forward_dct(&block);

    // orthonormal DC gain is sqrt(n) per axis
    assert!((transformed[[0, 0]] - 40.0).abs() < 1e-9);
    let ac_energy: f64 = transformed
        .iter()
        .skip(1)
        .map(|&v| v * v)
        .sum();
    assert!(ac_energy < 1e-12);
}

#[test]
fn test_energy_preserved() {
    let data: Vec<f64> = (0..16).map(|i| ((i * 7) % 11) as f64 - 5.0).collect();
    let block = ArrayD::from_shape_vec(IxDyn(&[4, 4]), data).unwrap();
    let transformed = forward_dct(&block);

    let spatial: f64 = block.iter().map(|&v| v * v).sum();
    let spectral: f64 = transformed.iter().map(|&v| v * v).sum();
    assert!((spatial - spectral).abs() < 1e-9);
}

#[test]
fn test_rounding_is_half_away_from_zero() {
    let block = ArrayD::from_shape_vec(IxDyn(&[4]), vec![0.5, -0.5, 1.49, -2.51]).unwrap();
    let rounded = round_to_i32(&block);
    assert_eq!(rounded.as_slice().unwrap(), &[1, -1, 1, -3]);
}
