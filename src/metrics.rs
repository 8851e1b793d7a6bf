/*---------------------------------------------------------------------------------------------
 *  Copyright (c) the mico project authors. All rights reserved.
 *  Licensed under the Apache License, Version 2.0.
 *--------------------------------------------------------------------------------------------*/

use std::ops::{Add, AddAssign};

use ndarray::{ArrayD, ArrayViewD};

/// Rate (estimated bits) and distortion (squared error) accumulated during
/// the tree search. Rates are fractional since they come from model entropy
/// estimates; distortions are integer energies widened to f64.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RateDistortion {
    pub rate: f64,
    pub distortion: f64,
}

impl RateDistortion {
    pub fn new(rate: f64, distortion: f64) -> Self {
        RateDistortion { rate, distortion }
    }

    /// Lagrangian cost `D + lambda * R` minimized by the optimizers.
    #[inline(always)]
    pub fn cost(&self, lagrangian: f64) -> f64 {
        self.distortion + lagrangian * self.rate
    }
}

impl Add for RateDistortion {
    type Output = RateDistortion;

    fn add(self, other: RateDistortion) -> RateDistortion {
        RateDistortion {
            rate: self.rate + other.rate,
            distortion: self.distortion + other.distortion,
        }
    }
}

impl AddAssign for RateDistortion {
    fn add_assign(&mut self, other: RateDistortion) {
        self.rate += other.rate;
        self.distortion += other.distortion;
    }
}

/// Sum of squared coefficients over a region. A proxy for distortion under
/// an orthonormal transform. 64-bit accumulation so that 32-bit coefficients
/// cannot overflow the sum.
pub fn energy(view: ArrayViewD<'_, i32>) -> u64 {
    let mut sum: u64 = 0;
    for &v in view.iter() {
        let v = i64::from(v);
        sum += (v * v) as u64;
    }
    return sum;
}

/// Energy of a single quantization residue.
#[inline(always)]
pub fn scalar_energy(v: u32) -> u64 {
    let v = u64::from(v);
    v * v
}

pub fn mse(a: &ArrayD<i32>, b: &ArrayD<i32>) -> f64 {
    assert_eq!(a.shape(), b.shape(), "mse requires equal shapes");

    let mut sum: u64 = 0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let d = i64::from(x) - i64::from(y);
        sum += (d * d) as u64;
    }
    return sum as f64 / a.len() as f64;
}

/// Peak signal-to-noise ratio for the given sample bit depth.
pub fn psnr(a: &ArrayD<i32>, b: &ArrayD<i32>, bit_depth: u32) -> f64 {
    let peak = f64::from((1u32 << bit_depth) - 1);
    let error = mse(a, b);
    if error == 0.0 {
        return f64::INFINITY;
    }
    return 10.0 * (peak * peak / error).log10();
}

/// Zeroth-order entropy of a binary sequence in bits per symbol.
pub fn binary_entropy(ones: usize, total: usize) -> f64 {
    if total == 0 || ones == 0 || ones == total {
        return 0.0;
    }
    let p1 = ones as f64 / total as f64;
    let p0 = 1.0 - p1;
    return -p0 * p0.log2() - p1 * p1.log2();
}

#[test]
fn test_energy() {
    use ndarray::ArrayD;

    let block = ArrayD::from_shape_vec(ndarray::IxDyn(&[2, 2]), vec![3, -4, 0, 1]).unwrap();
    assert_eq!(energy(block.view()), 9 + 16 + 1);
}

#[test]
fn test_psnr() {
    use ndarray::ArrayD;

    let a = ArrayD::from_shape_vec(ndarray::IxDyn(&[2, 2]), vec![10, 20, 30, 40]).unwrap();
    let b = a.clone();
    assert!(psnr(&a, &b, 8).is_infinite());

    let c = ArrayD::from_shape_vec(ndarray::IxDyn(&[2, 2]), vec![11, 20, 30, 40]).unwrap();
    assert_eq!(mse(&a, &c), 0.25);
    assert!(psnr(&a, &c, 8) > 50.0);
}

#[test]
fn test_binary_entropy() {
    assert_eq!(binary_entropy(0, 100), 0.0);
    assert_eq!(binary_entropy(100, 100), 0.0);
    assert!((binary_entropy(50, 100) - 1.0).abs() < 1e-12);
}
