/*---------------------------------------------------------------------------------------------
 *  Copyright (c) the mico project authors. All rights reserved.
 *  Licensed under the Apache License, Version 2.0.
 *--------------------------------------------------------------------------------------------*/

use std::collections::VecDeque;

use log::debug;
use ndarray::ArrayD;

use crate::metrics::{energy, scalar_energy, RateDistortion};
use crate::structs::coefficient_block::{find_max_bitplane, is_bitplane_zero};
use crate::structs::mule_probability_handler::MuleProbabilityHandler;
use crate::structs::probability_model::ProbabilityModel;
use crate::structs::region::Region;

/// One token of the MULE tree code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuleFlag {
    /// The region is coded as all zeros.
    Zero,
    /// The current top bitplane carries no set bit; drop it and recurse on
    /// the same region.
    LowerBitplane,
    /// Halve every axis of length > 1 and recurse into the sub-regions.
    Split,
}

/// Searches the space of Z/L/S decisions for the flag sequence minimizing
/// `D + lambda * R`, rating candidate encodings against live probability
/// models and rolling the model updates back through snapshots.
pub struct MuleOptimizer {
    lagrangian: f64,
    handler: MuleProbabilityHandler,
}

impl MuleOptimizer {
    pub fn new(lagrangian: f64) -> Self {
        MuleOptimizer {
            lagrangian,
            handler: MuleProbabilityHandler::new(),
        }
    }

    /// Deepest pending snapshot; zero once a search has returned.
    pub fn snapshot_depth(&self) -> usize {
        self.handler.snapshot_depth()
    }

    /// Sweeps candidate quantization floors from the top bitplane down,
    /// accumulating the coding rate of the magnitude bits above each floor
    /// and one sign bit per surviving coefficient, and keeps the cheapest.
    /// The integer models adapt during the sweep and are reset afterwards.
    pub fn optimize_lower_bitplane(&mut self, block: &ArrayD<i32>, upper_bitplane: u32) -> u32 {
        let magnitudes: Vec<u32> = block.iter().map(|&v| v.unsigned_abs()).collect();

        let mut lower_bitplane = 0;
        let mut accumulated_rate = 0.0;
        let mut best_cost = f64::INFINITY;

        for i in (0..upper_bitplane).rev() {
            let bit_position = 1u32 << i;
            let mask = bit_position - 1;

            let mut sign_rate = 0.0;
            for &magnitude in magnitudes.iter() {
                if magnitude > bit_position {
                    let bit = magnitude & bit_position != 0;
                    accumulated_rate += self.handler.int_model(i).record_and_estimate_bit(bit);
                    sign_rate += 1.0;
                }
            }

            let distortion: u64 = magnitudes.iter().map(|&m| scalar_energy(m & mask)).sum();
            let rd = RateDistortion::new(accumulated_rate + sign_rate, distortion as f64);

            if rd.cost(self.lagrangian) < best_cost {
                best_cost = rd.cost(self.lagrangian);
                lower_bitplane = i;
            }
        }

        self.handler.clear();
        debug!("selected lower bitplane {}", lower_bitplane);
        return lower_bitplane;
    }

    /// Recursive search over one region. Returns the flag sequence of the
    /// chosen encoding and its estimated rate/distortion, leaving the models
    /// in the committed state.
    pub fn optimize_tree(
        &mut self,
        block: &ArrayD<i32>,
        region: &Region,
        lower_bitplane: u32,
        upper_bitplane: u32,
    ) -> (VecDeque<MuleFlag>, RateDistortion) {
        if upper_bitplane < lower_bitplane || upper_bitplane == 0 {
            let distortion = energy(region.view(block)) as f64;
            return (VecDeque::new(), RateDistortion::new(0.0, distortion));
        }

        if region.is_unit() {
            let value = block[&region.origin()[..]];
            let rd = self.estimate_integer(value, lower_bitplane, upper_bitplane);
            return (VecDeque::new(), rd);
        }

        self.handler.push();
        let segmentation = if is_bitplane_zero(region.view(block), upper_bitplane) {
            self.estimate_lower_bitplane_run(block, region, lower_bitplane, upper_bitplane)
        } else {
            self.estimate_split(block, region, lower_bitplane, upper_bitplane)
        };

        let zero = RateDistortion::new(
            self.handler.flag_model(upper_bitplane, 0).estimate_bit(true),
            energy(region.view(block)) as f64,
        );

        if segmentation.1.cost(self.lagrangian) < zero.cost(self.lagrangian) {
            self.handler.discard();
            return segmentation;
        } else {
            self.handler.pop();
            let rate = self
                .handler
                .flag_model(upper_bitplane, 0)
                .record_and_estimate_bit(true);
            return (
                VecDeque::from([MuleFlag::Zero]),
                RateDistortion::new(rate, zero.distortion),
            );
        }
    }

    /// Candidate: drop bitplanes until the region's maximum magnitude fits,
    /// one `L` per dropped plane, then keep optimizing at the new bitplane.
    fn estimate_lower_bitplane_run(
        &mut self,
        block: &ArrayD<i32>,
        region: &Region,
        lower_bitplane: u32,
        upper_bitplane: u32,
    ) -> (VecDeque<MuleFlag>, RateDistortion) {
        let new_bitplane = find_max_bitplane(region.view(block));
        let run_length = upper_bitplane - new_bitplane;

        let mut rd = RateDistortion::default();
        for _ in 0..run_length {
            rd.rate += self
                .handler
                .flag_model(upper_bitplane, 0)
                .record_and_estimate_bit(false);
            rd.rate += self
                .handler
                .flag_model(upper_bitplane, 1)
                .record_and_estimate_bit(false);
        }

        let (tail, tail_rd) = self.optimize_tree(block, region, lower_bitplane, new_bitplane);
        rd += tail_rd;

        let mut flags = VecDeque::with_capacity(run_length as usize + tail.len());
        flags.extend(std::iter::repeat(MuleFlag::LowerBitplane).take(run_length as usize));
        flags.extend(tail);
        return (flags, rd);
    }

    /// Candidate: split in half and keep optimizing each sub-region at the
    /// same bitplane.
    fn estimate_split(
        &mut self,
        block: &ArrayD<i32>,
        region: &Region,
        lower_bitplane: u32,
        upper_bitplane: u32,
    ) -> (VecDeque<MuleFlag>, RateDistortion) {
        let mut rd = RateDistortion::default();
        rd.rate += self
            .handler
            .flag_model(upper_bitplane, 0)
            .record_and_estimate_bit(false);
        rd.rate += self
            .handler
            .flag_model(upper_bitplane, 1)
            .record_and_estimate_bit(true);

        let mut flags = VecDeque::from([MuleFlag::Split]);
        for sub_region in region.split_in_half() {
            let (sub_flags, sub_rd) =
                self.optimize_tree(block, &sub_region, lower_bitplane, upper_bitplane);
            rd += sub_rd;
            flags.extend(sub_flags);
        }
        return (flags, rd);
    }

    /// Rate and distortion of one explicitly coded coefficient: the bits of
    /// the quantized magnitude in `[lower, upper)`, a sign when the quantized
    /// magnitude is non-zero, and the energy of the dropped low bits.
    fn estimate_integer(&mut self, value: i32, lower_bitplane: u32, upper_bitplane: u32) -> RateDistortion {
        let mask = (1u32 << lower_bitplane) - 1;
        let absolute = value.unsigned_abs();
        let quantized = absolute & !mask;

        let mut rd = RateDistortion::new(0.0, scalar_energy(absolute & mask) as f64);
        for i in lower_bitplane..upper_bitplane {
            let bit = quantized & (1u32 << i) != 0;
            rd.rate += self.handler.int_model(i).record_and_estimate_bit(bit);
        }

        if quantized != 0 {
            rd.rate += self
                .handler
                .signal_model()
                .record_and_estimate_bit(value < 0);
        }
        return rd;
    }
}

#[cfg(test)]
fn block_4x4() -> ArrayD<i32> {
    ArrayD::from_shape_vec(
        ndarray::IxDyn(&[4, 4]),
        vec![18, 8, 0, 2, -7, 3, 0, 0, 0, 0, 1, 1, 0, 0, 3, -2],
    )
    .unwrap()
}

#[test]
fn test_canonical_flag_sequence() {
    use MuleFlag::*;

    let block = block_4x4();
    let mut optimizer = MuleOptimizer::new(0.0);
    let lower = optimizer.optimize_lower_bitplane(&block, 5);
    assert_eq!(lower, 0);

    let (flags, rd) = optimizer.optimize_tree(&block, &Region::whole(&[4, 4]), lower, 5);
    let expected = [
        Split, Split, LowerBitplane, LowerBitplane, LowerBitplane, Split, Zero, LowerBitplane,
        LowerBitplane, LowerBitplane, Split,
    ];
    assert_eq!(flags, VecDeque::from(expected));

    // lossless at lambda 0
    assert_eq!(rd.distortion, 0.0);
    assert!(rd.rate > 0.0);
}

#[test]
fn test_snapshots_balanced_after_search() {
    let block = block_4x4();
    for lagrangian in [0.0, 1.0, 100.0, 10_000.0] {
        let mut optimizer = MuleOptimizer::new(lagrangian);
        let lower = optimizer.optimize_lower_bitplane(&block, 5);
        optimizer.optimize_tree(&block, &Region::whole(&[4, 4]), lower, 5);
        assert_eq!(optimizer.snapshot_depth(), 0);
    }
}

#[test]
fn test_all_zero_region_codes_as_zero_flag() {
    let block = ArrayD::zeros(ndarray::IxDyn(&[4, 4]));
    let mut optimizer = MuleOptimizer::new(0.0);
    let (flags, rd) = optimizer.optimize_tree(&block, &Region::whole(&[4, 4]), 0, 3);
    assert_eq!(flags, VecDeque::from([MuleFlag::Zero]));
    assert_eq!(rd.distortion, 0.0);
}

#[test]
fn test_large_lagrangian_prefers_zero() {
    let block = block_4x4();
    let mut optimizer = MuleOptimizer::new(1e9);
    let (flags, _) = optimizer.optimize_tree(&block, &Region::whole(&[4, 4]), 0, 5);
    assert_eq!(flags, VecDeque::from([MuleFlag::Zero]));
}
