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
use crate::structs::coefficient_block::find_max_bitplane;
use crate::structs::mule_optimizer::{MuleFlag, MuleOptimizer};
use crate::structs::mule_probability_handler::MuleProbabilityHandler;
use crate::structs::region::Region;

/// Encodes an integer block as a MULE bitstream: a 5-bit lower bitplane
/// followed by the arithmetic-coded Z/L/S tree, with unit regions coded
/// through the integer and sign contexts.
///
/// The optimizer runs first on its own models; the emission pass below
/// replays the chosen flags against fresh contexts, which is what the
/// decoder reproduces.
pub struct MuleEncoder {
    lower_bitplane: u32,
    upper_bitplane: u32,
    flags: VecDeque<MuleFlag>,
    estimated_rd: RateDistortion,

    handler: MuleProbabilityHandler,
    cabac: CabacEncoder,
}

impl Default for MuleEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MuleEncoder {
    pub fn new() -> Self {
        MuleEncoder {
            lower_bitplane: 0,
            upper_bitplane: 0,
            flags: VecDeque::new(),
            estimated_rd: RateDistortion::default(),
            handler: MuleProbabilityHandler::new(),
            cabac: CabacEncoder::new(),
        }
    }

    /// Quantization floor chosen by the last encode.
    pub fn lower_bitplane(&self) -> u32 {
        self.lower_bitplane
    }

    /// Top bitplane the last encode started from.
    pub fn upper_bitplane(&self) -> u32 {
        self.upper_bitplane
    }

    /// Flag sequence committed by the optimizer.
    pub fn flags(&self) -> &VecDeque<MuleFlag> {
        &self.flags
    }

    /// The optimizer's rate/distortion estimate for the committed encoding.
    pub fn estimated_rd(&self) -> RateDistortion {
        self.estimated_rd
    }

    /// Encodes `block`, choosing the lower bitplane and the tree by
    /// Lagrangian cost. When `upper_bitplane` is `None` it is derived from
    /// the block's largest magnitude (the framed variants pass a shared
    /// value instead).
    pub fn encode(
        &mut self,
        block: &ArrayD<i32>,
        lagrangian: f64,
        upper_bitplane: Option<u32>,
    ) -> Result<Bitstream> {
        let max_bitplane = find_max_bitplane(block.view());
        let upper_bitplane = upper_bitplane.unwrap_or(max_bitplane);
        if upper_bitplane > 31 {
            return err_exit_code(
                ExitCode::Overflow,
                "upper bitplane does not fit in the 5-bit frame",
            );
        }
        if max_bitplane > upper_bitplane {
            return err_exit_code(
                ExitCode::Overflow,
                "coefficients exceed the declared upper bitplane",
            );
        }
        self.upper_bitplane = upper_bitplane;

        let mut optimizer = MuleOptimizer::new(lagrangian);
        self.lower_bitplane = optimizer.optimize_lower_bitplane(block, upper_bitplane);

        let root = Region::whole(block.shape());
        let (flags, estimated_rd) =
            optimizer.optimize_tree(block, &root, self.lower_bitplane, upper_bitplane);
        debug_assert_eq!(optimizer.snapshot_depth(), 0);
        self.flags = flags;
        self.estimated_rd = estimated_rd;

        self.handler.clear();
        self.cabac.start();

        self.encode_int(self.lower_bitplane as i32, 0, LOWER_BITPLANE_BITS, false);
        let mut queue = self.flags.clone();
        self.apply_encoding(&mut queue, block, &root, upper_bitplane)
            .context(here!())?;
        if !queue.is_empty() {
            return err_exit_code(
                ExitCode::InvalidFlag,
                "flag sequence does not match the block tree",
            );
        }

        return Ok(self.cabac.end(true));
    }

    fn apply_encoding(
        &mut self,
        flags: &mut VecDeque<MuleFlag>,
        block: &ArrayD<i32>,
        region: &Region,
        upper_bitplane: u32,
    ) -> Result<()> {
        if upper_bitplane < self.lower_bitplane || upper_bitplane == 0 {
            return Ok(());
        }

        if region.is_unit() {
            let value = block[&region.origin()[..]];
            self.encode_int(value, self.lower_bitplane, upper_bitplane, true);
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

        match flag {
            MuleFlag::Zero => {
                self.cabac
                    .encode_bit(true, self.handler.flag_model(upper_bitplane, 0));
            }
            MuleFlag::LowerBitplane => {
                self.cabac
                    .encode_bit(false, self.handler.flag_model(upper_bitplane, 0));
                self.cabac
                    .encode_bit(false, self.handler.flag_model(upper_bitplane, 1));
                self.apply_encoding(flags, block, region, upper_bitplane - 1)?;
            }
            MuleFlag::Split => {
                self.cabac
                    .encode_bit(false, self.handler.flag_model(upper_bitplane, 0));
                self.cabac
                    .encode_bit(true, self.handler.flag_model(upper_bitplane, 1));
                for sub_region in region.split_in_half() {
                    self.apply_encoding(flags, block, &sub_region, upper_bitplane)?;
                }
            }
        }
        return Ok(());
    }

    /// Emits the magnitude bits in `[lower, upper)` on the per-bitplane
    /// integer contexts, then the sign when the quantized magnitude is
    /// non-zero.
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
