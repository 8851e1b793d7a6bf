/*---------------------------------------------------------------------------------------------
 *  Copyright (c) the mico project authors. All rights reserved.
 *  Licensed under the Apache License, Version 2.0.
 *--------------------------------------------------------------------------------------------*/

use std::collections::VecDeque;

use anyhow::{Context, Result};
use ndarray::ArrayD;

use crate::consts::LOWER_BITPLANE_BITS;
use crate::helpers::err_exit_code;
use crate::here;
use crate::metrics::RateDistortion;
use crate::mico_error::ExitCode;
use crate::structs::bitstream::Bitstream;
use crate::structs::cabac_encoder::CabacEncoder;
use crate::structs::coefficient_block::{position_level, LevelBitplaneTable};
use crate::structs::mico_optimizer::{MicoFlag, MicoOptimizer};
use crate::structs::mico_probability_handler::MicoProbabilityHandler;
use crate::structs::region::Region;

/// Encodes an integer block as a MICO bitstream.
///
/// Framing: the 5-bit lower bitplane, then the delta-coded per-level
/// bitplane table on the `bitplanes` context (deepest level first, a run of
/// ones per increment closed by a zero), then a full model reset, then the
/// arithmetic-coded flag/value tree.
pub struct MicoEncoder {
    lower_bitplane: u32,
    table: LevelBitplaneTable,
    flags: VecDeque<MicoFlag>,
    estimated_rd: RateDistortion,

    handler: MicoProbabilityHandler,
    cabac: CabacEncoder,
}

impl Default for MicoEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MicoEncoder {
    pub fn new() -> Self {
        MicoEncoder {
            lower_bitplane: 0,
            table: LevelBitplaneTable::from_sizes(Vec::new()),
            flags: VecDeque::new(),
            estimated_rd: RateDistortion::default(),
            handler: MicoProbabilityHandler::new(),
            cabac: CabacEncoder::new(),
        }
    }

    /// Quantization floor chosen by the last encode.
    pub fn lower_bitplane(&self) -> u32 {
        self.lower_bitplane
    }

    /// Per-level bitplane table of the last encoded block.
    pub fn level_bitplanes(&self) -> &LevelBitplaneTable {
        &self.table
    }

    /// Flag sequence committed by the optimizer.
    pub fn flags(&self) -> &VecDeque<MicoFlag> {
        &self.flags
    }

    /// The optimizer's rate/distortion estimate for the committed encoding.
    pub fn estimated_rd(&self) -> RateDistortion {
        self.estimated_rd
    }

    pub fn encode(&mut self, block: &ArrayD<i32>, lagrangian: f64) -> Result<Bitstream> {
        self.table = LevelBitplaneTable::compute(block);
        if self.table.len() > 255 {
            return err_exit_code(ExitCode::Overflow, "level count does not fit in 8 bits");
        }

        let mut optimizer = MicoOptimizer::new(lagrangian, self.table.clone());
        self.lower_bitplane = optimizer.optimize_lower_bitplane(block);

        let root = Region::whole(block.shape());
        let (flags, estimated_rd) = optimizer.optimize_tree(block, &root, self.lower_bitplane);
        debug_assert_eq!(optimizer.snapshot_depth(), 0);
        self.flags = flags;
        self.estimated_rd = estimated_rd;

        self.handler.clear();
        self.cabac.start();

        self.encode_int(self.lower_bitplane as i32, 0, LOWER_BITPLANE_BITS, false);
        self.encode_level_bitplanes();
        self.handler.clear();

        let mut queue = self.flags.clone();
        self.apply_encoding(&mut queue, block, &root).context(here!())?;
        if !queue.is_empty() {
            return err_exit_code(
                ExitCode::InvalidFlag,
                "flag sequence does not match the block tree",
            );
        }

        return Ok(self.cabac.end(true));
    }

    /// Delta-codes the level table from the deepest level down against a
    /// counter starting at the lower bitplane. Levels already below the
    /// floor clamp to a zero delta; they can never be referenced above it.
    fn encode_level_bitplanes(&mut self) {
        let mut counter = self.lower_bitplane;
        for level in (0..self.table.len()).rev() {
            let size = self.table.sizes()[level].max(counter);
            for _ in counter..size {
                self.cabac.encode_bit(true, self.handler.bitplanes_model());
            }
            self.cabac.encode_bit(false, self.handler.bitplanes_model());
            counter = size;
        }
    }

    fn apply_encoding(
        &mut self,
        flags: &mut VecDeque<MicoFlag>,
        block: &ArrayD<i32>,
        region: &Region,
    ) -> Result<()> {
        let max_bitplane = self.table.bitplane(region.start_level());
        if max_bitplane <= self.lower_bitplane || max_bitplane == 0 {
            return Ok(());
        }

        let flag = match flags.pop_front() {
            Some(flag) => flag,
            None => {
                return err_exit_code(
                    ExitCode::InvalidFlag,
                    "flag sequence exhausted before the block tree",
                )
            }
        };

        if region.is_unit() {
            match flag {
                MicoFlag::UnitZero => {
                    self.cabac.encode_bit(false, self.handler.unit_model());
                }
                MicoFlag::UnitValue => {
                    self.cabac.encode_bit(true, self.handler.unit_model());
                    let value = block[&region.origin()[..]];
                    self.encode_int(value, self.lower_bitplane, max_bitplane, true);
                }
                _ => {
                    return err_exit_code(ExitCode::InvalidFlag, "interior flag at a unit region")
                }
            }
            return Ok(());
        }

        match flag {
            MicoFlag::Empty => {
                self.cabac
                    .encode_bit(false, self.handler.significant_model(max_bitplane));
            }
            MicoFlag::Full => {
                self.cabac
                    .encode_bit(true, self.handler.significant_model(max_bitplane));
                self.cabac
                    .encode_bit(false, self.handler.split_model(max_bitplane));
                for position in region.positions() {
                    let upper = self.table.bitplane(position_level(&position));
                    self.encode_int(block[&position[..]], self.lower_bitplane, upper, true);
                }
            }
            MicoFlag::Split => {
                self.cabac
                    .encode_bit(true, self.handler.significant_model(max_bitplane));
                self.cabac
                    .encode_bit(true, self.handler.split_model(max_bitplane));
                for sub_region in region.split_in_half() {
                    self.apply_encoding(flags, block, &sub_region)?;
                }
            }
            _ => return err_exit_code(ExitCode::InvalidFlag, "unit flag at an interior region"),
        }
        return Ok(());
    }

    fn encode_int(&mut self, value: i32, lower_bitplane: u32, upper_bitplane: u32, signed: bool) {
        let absolute = value.unsigned_abs();
        for i in lower_bitplane..upper_bitplane {
            let bit = absolute & (1u32 << i) != 0;
            self.cabac.encode_bit(bit, self.handler.int_model(i));
        }

        let mask = (1u32 << lower_bitplane) - 1;
        if signed && absolute & !mask != 0 {
            self.cabac.encode_bit(value < 0, self.handler.signal_model());
        }
    }
}
