/*---------------------------------------------------------------------------------------------
 *  Copyright (c) the mico project authors. All rights reserved.
 *  Licensed under the Apache License, Version 2.0.
 *--------------------------------------------------------------------------------------------*/

use std::collections::VecDeque;

use log::debug;
use ndarray::ArrayD;

use crate::metrics::{energy, scalar_energy, RateDistortion};
use crate::structs::coefficient_block::{position_level, LevelBitplaneTable};
use crate::structs::mico_probability_handler::MicoProbabilityHandler;
use crate::structs::probability_model::ProbabilityModel;
use crate::structs::region::Region;

/// One token of the MICO tree code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicoFlag {
    /// All coefficients of the region are coded as zero.
    Empty,
    /// Every coefficient of the region is coded explicitly.
    Full,
    /// Halve every axis of length > 1 and recurse into the sub-regions.
    Split,
    /// Unit region whose coefficient survives quantization.
    UnitValue,
    /// Unit region whose coefficient rounds to zero under the floor.
    UnitZero,
}

/// Searches the space of Empty/Full/Split decisions over position levels.
///
/// Each interior candidate is costed inside a snapshot and rolled back; the
/// winner is rerun from the restored state, which commits its model updates
/// and reproduces the identical sub-decisions because the search is a pure
/// function of the model state.
pub struct MicoOptimizer {
    lagrangian: f64,
    table: LevelBitplaneTable,
    lower_bitplane: u32,
    handler: MicoProbabilityHandler,
}

impl MicoOptimizer {
    pub fn new(lagrangian: f64, table: LevelBitplaneTable) -> Self {
        MicoOptimizer {
            lagrangian,
            table,
            lower_bitplane: 0,
            handler: MicoProbabilityHandler::new(),
        }
    }

    /// Deepest pending snapshot; zero once a search has returned.
    pub fn snapshot_depth(&self) -> usize {
        self.handler.snapshot_depth()
    }

    /// Same sweep as the MULE optimizer, bounded by the deepest bitplane the
    /// level table can ask for.
    pub fn optimize_lower_bitplane(&mut self, block: &ArrayD<i32>) -> u32 {
        let upper_bitplane = self.table.max_bitplane();
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

    pub fn optimize_tree(
        &mut self,
        block: &ArrayD<i32>,
        region: &Region,
        lower_bitplane: u32,
    ) -> (VecDeque<MicoFlag>, RateDistortion) {
        self.lower_bitplane = lower_bitplane;
        return self.search(block, region);
    }

    fn search(&mut self, block: &ArrayD<i32>, region: &Region) -> (VecDeque<MicoFlag>, RateDistortion) {
        let max_bitplane = self.table.bitplane(region.start_level());

        // everything below the floor is zero by construction, nothing is coded
        if max_bitplane <= self.lower_bitplane || max_bitplane == 0 {
            let distortion = energy(region.view(block)) as f64;
            return (VecDeque::new(), RateDistortion::new(0.0, distortion));
        }

        if region.is_unit() {
            return self.estimate_unit(block, region, max_bitplane);
        }

        let view = region.view(block);
        if view.iter().all(|&v| v == 0) {
            return self.estimate_empty(block, region, max_bitplane);
        }
        if view.iter().all(|&v| v != 0) {
            return self.estimate_full(block, region, max_bitplane);
        }

        self.handler.push();
        let empty = self.estimate_empty(block, region, max_bitplane);
        self.handler.pop();

        self.handler.push();
        let full = self.estimate_full(block, region, max_bitplane);
        self.handler.pop();

        self.handler.push();
        let split = self.estimate_split(block, region, max_bitplane);
        self.handler.pop();

        let empty_cost = empty.1.cost(self.lagrangian);
        let full_cost = full.1.cost(self.lagrangian);
        let split_cost = split.1.cost(self.lagrangian);

        // commit the winner by rerunning it from the restored state
        if empty_cost <= full_cost && empty_cost <= split_cost {
            return self.estimate_empty(block, region, max_bitplane);
        } else if full_cost <= split_cost {
            return self.estimate_full(block, region, max_bitplane);
        } else {
            return self.estimate_split(block, region, max_bitplane);
        }
    }

    /// Unit flags are forced by the value, not searched: `v` iff the
    /// coefficient survives the quantization floor.
    fn estimate_unit(
        &mut self,
        block: &ArrayD<i32>,
        region: &Region,
        max_bitplane: u32,
    ) -> (VecDeque<MicoFlag>, RateDistortion) {
        let value = block[&region.origin()[..]];
        let mask = (1u32 << self.lower_bitplane) - 1;
        let absolute = value.unsigned_abs();

        if absolute & !mask == 0 {
            let rate = self.handler.unit_model().record_and_estimate_bit(false);
            return (
                VecDeque::from([MicoFlag::UnitZero]),
                RateDistortion::new(rate, scalar_energy(absolute) as f64),
            );
        }

        let mut rd = RateDistortion::new(
            self.handler.unit_model().record_and_estimate_bit(true),
            0.0,
        );
        rd += self.estimate_integer(value, self.lower_bitplane, max_bitplane);
        return (VecDeque::from([MicoFlag::UnitValue]), rd);
    }

    fn estimate_empty(
        &mut self,
        block: &ArrayD<i32>,
        region: &Region,
        max_bitplane: u32,
    ) -> (VecDeque<MicoFlag>, RateDistortion) {
        let rate = self
            .handler
            .significant_model(max_bitplane)
            .record_and_estimate_bit(false);
        let distortion = energy(region.view(block)) as f64;
        return (
            VecDeque::from([MicoFlag::Empty]),
            RateDistortion::new(rate, distortion),
        );
    }

    fn estimate_full(
        &mut self,
        block: &ArrayD<i32>,
        region: &Region,
        max_bitplane: u32,
    ) -> (VecDeque<MicoFlag>, RateDistortion) {
        let mut rd = RateDistortion::default();
        rd.rate += self
            .handler
            .significant_model(max_bitplane)
            .record_and_estimate_bit(true);
        rd.rate += self
            .handler
            .split_model(max_bitplane)
            .record_and_estimate_bit(false);

        // every coefficient is coded against its own level's bitplane
        for position in region.positions() {
            let upper = self.table.bitplane(position_level(&position));
            rd += self.estimate_integer(block[&position[..]], self.lower_bitplane, upper);
        }
        return (VecDeque::from([MicoFlag::Full]), rd);
    }

    fn estimate_split(
        &mut self,
        block: &ArrayD<i32>,
        region: &Region,
        max_bitplane: u32,
    ) -> (VecDeque<MicoFlag>, RateDistortion) {
        let mut rd = RateDistortion::default();
        rd.rate += self
            .handler
            .significant_model(max_bitplane)
            .record_and_estimate_bit(true);
        rd.rate += self
            .handler
            .split_model(max_bitplane)
            .record_and_estimate_bit(true);

        let mut flags = VecDeque::from([MicoFlag::Split]);
        for sub_region in region.split_in_half() {
            let (sub_flags, sub_rd) = self.search(block, &sub_region);
            rd += sub_rd;
            flags.extend(sub_flags);
        }
        return (flags, rd);
    }

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
fn easy_block() -> ArrayD<i32> {
    ArrayD::from_shape_vec(
        ndarray::IxDyn(&[4, 4]),
        vec![18, 8, 0, 2, -7, 3, 0, 0, 0, 0, 1, 1, 0, 0, 3, -2],
    )
    .unwrap()
}

#[test]
fn test_canonical_flag_sequence() {
    use MicoFlag::*;

    let block = easy_block();
    let table = LevelBitplaneTable::compute(&block);
    let mut optimizer = MicoOptimizer::new(1e-6, table);
    let lower = optimizer.optimize_lower_bitplane(&block);
    assert_eq!(lower, 0);

    let (flags, rd) = optimizer.optimize_tree(&block, &Region::whole(&[4, 4]), lower);
    let expected = [
        Split, Full, Split, UnitZero, UnitValue, UnitZero, UnitZero, Empty, Full,
    ];
    assert_eq!(flags, VecDeque::from(expected));
    assert_eq!(rd.distortion, 0.0);
    assert_eq!(optimizer.snapshot_depth(), 0);
}

#[test]
fn test_snapshots_balanced_at_any_lagrangian() {
    let block = easy_block();
    for lagrangian in [0.0, 1e-6, 1.0, 100.0, 1e6] {
        let table = LevelBitplaneTable::compute(&block);
        let mut optimizer = MicoOptimizer::new(lagrangian, table);
        let lower = optimizer.optimize_lower_bitplane(&block);
        optimizer.optimize_tree(&block, &Region::whole(&[4, 4]), lower);
        assert_eq!(optimizer.snapshot_depth(), 0);
    }
}

#[test]
fn test_all_zero_region_is_empty_fast_path() {
    let block = ArrayD::zeros(ndarray::IxDyn(&[2, 2]));
    let table = LevelBitplaneTable::from_sizes(vec![3, 3]);
    let mut optimizer = MicoOptimizer::new(0.0, table);
    let (flags, rd) = optimizer.optimize_tree(&block, &Region::whole(&[2, 2]), 0);
    assert_eq!(flags, VecDeque::from([MicoFlag::Empty]));
    assert_eq!(rd.distortion, 0.0);
}

#[test]
fn test_fully_quantized_region_emits_nothing() {
    let block = ArrayD::from_shape_vec(ndarray::IxDyn(&[2, 2]), vec![1, 1, 1, 1]).unwrap();
    let table = LevelBitplaneTable::compute(&block);
    let mut optimizer = MicoOptimizer::new(0.0, table);
    // floor above every coefficient's bitplane: the whole tree is skipped
    let (flags, rd) = optimizer.optimize_tree(&block, &Region::whole(&[2, 2]), 1);
    assert!(flags.is_empty());
    assert_eq!(rd.rate, 0.0);
    assert_eq!(rd.distortion, 4.0);
}
