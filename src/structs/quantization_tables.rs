/*---------------------------------------------------------------------------------------------
 *  Copyright (c) the mico project authors. All rights reserved.
 *  Licensed under the Apache License, Version 2.0.
 *--------------------------------------------------------------------------------------------*/

use anyhow::Result;
use ndarray::{ArrayD, ArrayViewD, Axis, Dimension, IxDyn, Slice};

use crate::helpers::err_exit_code;
use crate::mico_error::ExitCode;

/// Growth exponent of the quantization step along each axis.
const STEP_EXPONENT: f64 = 0.8;

/// Fixed quantization matrix for the non-RDO MICO variant.
///
/// `Q[k] = (1 + sum_i (k_i + 1)^0.8) / (N + 1) * quality / 10`, so steps grow
/// towards the high-frequency corner and scale linearly with quality.
/// Partial boundary tiles quantize against the matching corner of the table.
#[derive(Debug)]
pub struct QuantizationTables {
    table: ArrayD<f64>,
    quality: u8,
}

impl QuantizationTables {
    pub fn new(block_size: usize, dimensions: usize, quality: u8) -> Result<Self> {
        if quality == 0 || quality > 100 {
            return err_exit_code(ExitCode::BadHeader, "quality must be in [1, 100]");
        }
        if block_size == 0 || dimensions == 0 {
            return err_exit_code(ExitCode::BadHeader, "degenerate quantization table shape");
        }

        let shape: Vec<usize> = vec![block_size; dimensions];
        let mut table = ArrayD::zeros(IxDyn(&shape));
        for (position, step) in table.indexed_iter_mut() {
            let mut sum = 1.0;
            for &k in position.slice().iter() {
                sum += ((k + 1) as f64).powf(STEP_EXPONENT);
            }
            *step = sum / (dimensions + 1) as f64 * f64::from(quality) / 10.0;
        }

        return Ok(QuantizationTables { table, quality });
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn table(&self) -> &ArrayD<f64> {
        &self.table
    }

    fn corner(&self, shape: &[usize]) -> ArrayViewD<'_, f64> {
        let mut view = self.table.view();
        for (axis, &len) in shape.iter().enumerate() {
            view.slice_axis_inplace(Axis(axis), Slice::from(0..len));
        }
        return view;
    }

    /// Divides a transformed block by the step sizes. The caller rounds.
    pub fn quantize(&self, block: &ArrayD<f64>) -> ArrayD<f64> {
        let mut output = block.clone();
        output.zip_mut_with(&self.corner(block.shape()), |v, &q| *v /= q);
        return output;
    }

    /// Scales quantized coefficients back to transform magnitude.
    pub fn dequantize(&self, block: &ArrayD<f64>) -> ArrayD<f64> {
        let mut output = block.clone();
        output.zip_mut_with(&self.corner(block.shape()), |v, &q| *v *= q);
        return output;
    }
}

#[test]
fn test_matrix_values() {
    let tables = QuantizationTables::new(8, 2, 50).unwrap();
    // corner step: (1 + 1^0.8 + 1^0.8) / 3 * 5
    assert!((tables.table()[[0, 0]] - 5.0).abs() < 1e-12);

    // steps grow monotonically along each axis
    for i in 1..8 {
        assert!(tables.table()[[i, 0]] > tables.table()[[i - 1, 0]]);
        assert!(tables.table()[[0, i]] > tables.table()[[0, i - 1]]);
    }
}

#[test]
fn test_quality_scales_linearly() {
    let low = QuantizationTables::new(4, 3, 10).unwrap();
    let high = QuantizationTables::new(4, 3, 100).unwrap();
    for (&a, &b) in low.table().iter().zip(high.table().iter()) {
        assert!((b / a - 10.0).abs() < 1e-9);
    }
}

#[test]
fn test_quantize_dequantize_partial_tile() {
    let tables = QuantizationTables::new(4, 2, 20).unwrap();
    let block =
        ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![8.0, -16.0, 24.0, 0.0, 4.0, -4.0]).unwrap();

    let quantized = tables.quantize(&block);
    let restored = tables.dequantize(&quantized);
    for (&a, &b) in block.iter().zip(restored.iter()) {
        assert!((a - b).abs() < 1e-9);
    }
}

#[test]
fn test_rejects_bad_quality() {
    use crate::mico_error::MicoError;

    for quality in [0u8, 101] {
        let err = QuantizationTables::new(8, 2, quality).unwrap_err();
        let mico_error = err.downcast_ref::<MicoError>().unwrap();
        assert_eq!(mico_error.exit_code(), ExitCode::BadHeader);
    }
}
