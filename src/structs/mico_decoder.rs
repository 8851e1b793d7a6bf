/*---------------------------------------------------------------------------------------------
 *  Copyright (c) the mico project authors. All rights reserved.
 *  Licensed under the Apache License, Version 2.0.
 *--------------------------------------------------------------------------------------------*/

use anyhow::{Context, Result};
use ndarray::{ArrayD, IxDyn};

use crate::consts::LOWER_BITPLANE_BITS;
use crate::helpers::err_exit_code;
use crate::here;
use crate::mico_error::ExitCode;
use crate::structs::bitstream::Bitstream;
use crate::structs::cabac_decoder::CabacDecoder;
use crate::structs::coefficient_block::{position_level, LevelBitplaneTable};
use crate::structs::mico_probability_handler::MicoProbabilityHandler;
use crate::structs::region::Region;

/// Reconstructs a block from a MICO bitstream. Only the shape is needed from
/// the outside; the lower bitplane and the level table are part of the
/// stream's preamble.
pub struct MicoDecoder {
    lower_bitplane: u32,
    table: LevelBitplaneTable,

    handler: MicoProbabilityHandler,
    cabac: CabacDecoder,
}

impl Default for MicoDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MicoDecoder {
    pub fn new() -> Self {
        MicoDecoder {
            lower_bitplane: 0,
            table: LevelBitplaneTable::from_sizes(Vec::new()),
            handler: MicoProbabilityHandler::new(),
            cabac: CabacDecoder::new(),
        }
    }

    /// Quantization floor recovered from the last decoded stream.
    pub fn lower_bitplane(&self) -> u32 {
        self.lower_bitplane
    }

    /// Per-level bitplane table recovered from the last decoded stream.
    pub fn level_bitplanes(&self) -> &LevelBitplaneTable {
        &self.table
    }

    pub fn decode(&mut self, bitstream: Bitstream, shape: &[usize]) -> Result<ArrayD<i32>> {
        self.handler.clear();
        self.cabac.start(bitstream);

        let mut block = ArrayD::zeros(IxDyn(shape));
        self.lower_bitplane = self.decode_int(0, LOWER_BITPLANE_BITS, false)? as u32;
        self.decode_level_bitplanes(shape).context(here!())?;
        self.handler.clear();

        self.apply_decoding(&mut block, &Region::whole(shape))
            .context(here!())?;
        return Ok(block);
    }

    /// Mirror of the encoder's preamble: one run of ones per level, deepest
    /// first, accumulating onto a counter seeded with the lower bitplane.
    fn decode_level_bitplanes(&mut self, shape: &[usize]) -> Result<()> {
        let mut counter = self.lower_bitplane;
        let mut sizes = Vec::with_capacity(LevelBitplaneTable::level_count(shape));

        for _ in 0..LevelBitplaneTable::level_count(shape) {
            while self.cabac.decode_bit(self.handler.bitplanes_model())? {
                counter += 1;
                if counter > 32 {
                    return err_exit_code(
                        ExitCode::Overflow,
                        "level bitplane exceeds the 32-bit coefficient width",
                    );
                }
            }
            sizes.push(counter);
        }

        sizes.reverse();
        self.table = LevelBitplaneTable::from_sizes(sizes);
        return Ok(());
    }

    fn apply_decoding(&mut self, block: &mut ArrayD<i32>, region: &Region) -> Result<()> {
        let max_bitplane = self.table.bitplane(region.start_level());
        if max_bitplane <= self.lower_bitplane || max_bitplane == 0 {
            return Ok(());
        }

        if region.is_unit() {
            if self.cabac.decode_bit(self.handler.unit_model())? {
                let value = self.decode_int(self.lower_bitplane, max_bitplane, true)?;
                block[&region.origin()[..]] = value;
            }
            return Ok(());
        }

        let significant = self
            .cabac
            .decode_bit(self.handler.significant_model(max_bitplane))?;
        if !significant {
            // E: the region stays zero
            return Ok(());
        }

        let split = self.cabac.decode_bit(self.handler.split_model(max_bitplane))?;
        if split {
            for sub_region in region.split_in_half() {
                self.apply_decoding(block, &sub_region)?;
            }
        } else {
            // F: every coefficient explicit, each at its level's bitplane
            for position in region.positions() {
                let upper = self.table.bitplane(position_level(&position));
                let value = self.decode_int(self.lower_bitplane, upper, true)?;
                block[&position[..]] = value;
            }
        }
        return Ok(());
    }

    fn decode_int(&mut self, lower_bitplane: u32, upper_bitplane: u32, signed: bool) -> Result<i32> {
        let mut magnitude: u32 = 0;
        for i in lower_bitplane..upper_bitplane {
            if self.cabac.decode_bit(self.handler.int_model(i))? {
                magnitude |= 1u32 << i;
            }
        }

        // negate in i64: a 32-bit magnitude only round-trips as i32::MIN
        let mut value = i64::from(magnitude);
        if signed && value != 0 && self.cabac.decode_bit(self.handler.signal_model())? {
            value = -value;
        }
        return Ok(value as i32);
    }
}

#[test]
fn test_round_trip_easy_block() {
    use crate::structs::mico_encoder::MicoEncoder;

    let data = vec![18, 8, 0, 2, -7, 3, 0, 0, 0, 0, 1, 1, 0, 0, 3, -2];
    let block = ArrayD::from_shape_vec(IxDyn(&[4, 4]), data).unwrap();

    let mut encoder = MicoEncoder::new();
    let stream = encoder.encode(&block, 1e-6).unwrap();

    let mut decoder = MicoDecoder::new();
    let decoded = decoder.decode(stream, &[4, 4]).unwrap();

    assert_eq!(decoded, block);
    assert_eq!(decoder.lower_bitplane(), encoder.lower_bitplane());
    assert_eq!(decoder.level_bitplanes(), encoder.level_bitplanes());
}

#[test]
fn test_round_trip_odd_shapes() {
    use crate::structs::mico_encoder::MicoEncoder;

    for shape in [vec![1], vec![5], vec![3, 7], vec![2, 3, 5], vec![1, 9]] {
        let count: usize = shape.iter().product();
        let data: Vec<i32> = (0..count).map(|i| (i as i32 * 11) % 37 - 18).collect();
        let block = ArrayD::from_shape_vec(IxDyn(&shape), data).unwrap();

        let mut encoder = MicoEncoder::new();
        let stream = encoder.encode(&block, 0.0).unwrap();

        let mut decoder = MicoDecoder::new();
        let decoded = decoder.decode(stream, &shape).unwrap();
        assert_eq!(decoded, block, "shape {:?}", shape);
    }
}

#[test]
fn test_all_zero_block() {
    use crate::structs::mico_encoder::MicoEncoder;

    let block = ArrayD::zeros(IxDyn(&[3, 5]));
    let mut encoder = MicoEncoder::new();
    let stream = encoder.encode(&block, 0.0).unwrap();

    let mut decoder = MicoDecoder::new();
    let decoded = decoder.decode(stream, &[3, 5]).unwrap();
    assert_eq!(decoded, block);
}

#[test]
fn test_level_table_survives_nonzero_floor() {
    use crate::structs::mico_encoder::MicoEncoder;

    // large coefficients at the shallow levels, noise at the deep ones, and
    // enough lagrangian pressure to push the floor above the noise
    let data: Vec<i32> = (0..64)
        .map(|i| if i < 8 { 400 - i as i32 * 31 } else { (i as i32) % 3 - 1 })
        .collect();
    let block = ArrayD::from_shape_vec(IxDyn(&[8, 8]), data).unwrap();

    let mut encoder = MicoEncoder::new();
    let stream = encoder.encode(&block, 200.0).unwrap();

    let mut decoder = MicoDecoder::new();
    let decoded = decoder.decode(stream, &[8, 8]).unwrap();

    assert_eq!(decoder.lower_bitplane(), encoder.lower_bitplane());
    let lower = decoder.lower_bitplane();
    let mask = (1u32 << lower) - 1;
    for &v in decoded.iter() {
        assert_eq!(v.unsigned_abs() & mask, 0);
    }
    // the decoded table equals the encoder's, clamped at the floor
    for (level, &size) in encoder.level_bitplanes().sizes().iter().enumerate() {
        assert_eq!(decoder.level_bitplanes().sizes()[level], size.max(lower));
    }
}
