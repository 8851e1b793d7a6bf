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
use crate::structs::mule_probability_handler::MuleProbabilityHandler;
use crate::structs::region::Region;

/// Reconstructs a block from a MULE bitstream. Must drive exactly the model
/// updates the encoder's emission pass drove, in the same order; the shape
/// and the upper bitplane come from the surrounding frame.
pub struct MuleDecoder {
    lower_bitplane: u32,

    handler: MuleProbabilityHandler,
    cabac: CabacDecoder,
}

impl Default for MuleDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MuleDecoder {
    pub fn new() -> Self {
        MuleDecoder {
            lower_bitplane: 0,
            handler: MuleProbabilityHandler::new(),
            cabac: CabacDecoder::new(),
        }
    }

    /// Quantization floor recovered from the last decoded stream.
    pub fn lower_bitplane(&self) -> u32 {
        self.lower_bitplane
    }

    pub fn decode(
        &mut self,
        bitstream: Bitstream,
        shape: &[usize],
        upper_bitplane: u32,
    ) -> Result<ArrayD<i32>> {
        if upper_bitplane > 31 {
            return err_exit_code(
                ExitCode::Overflow,
                "upper bitplane does not fit in the 5-bit frame",
            );
        }

        self.handler.clear();
        self.cabac.start(bitstream);

        let mut block = ArrayD::zeros(IxDyn(shape));
        self.lower_bitplane = self.decode_int(0, LOWER_BITPLANE_BITS, false)? as u32;
        self.apply_decoding(&mut block, &Region::whole(shape), upper_bitplane)
            .context(here!())?;
        return Ok(block);
    }

    fn apply_decoding(
        &mut self,
        block: &mut ArrayD<i32>,
        region: &Region,
        upper_bitplane: u32,
    ) -> Result<()> {
        if upper_bitplane < self.lower_bitplane || upper_bitplane == 0 {
            return Ok(());
        }

        if region.is_unit() {
            let value = self.decode_int(self.lower_bitplane, upper_bitplane, true)?;
            block[&region.origin()[..]] = value;
            return Ok(());
        }

        let first_bit = self
            .cabac
            .decode_bit(self.handler.flag_model(upper_bitplane, 0))?;
        if first_bit {
            // Z: the region stays zero
            return Ok(());
        }

        let second_bit = self
            .cabac
            .decode_bit(self.handler.flag_model(upper_bitplane, 1))?;
        if second_bit {
            // S
            for sub_region in region.split_in_half() {
                self.apply_decoding(block, &sub_region, upper_bitplane)?;
            }
        } else {
            // L
            self.apply_decoding(block, region, upper_bitplane - 1)?;
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

        let mut value = i64::from(magnitude);
        if signed && value != 0 && self.cabac.decode_bit(self.handler.signal_model())? {
            value = -value;
        }
        return Ok(value as i32);
    }
}

#[test]
fn test_round_trip_easy_block() {
    use crate::structs::mule_encoder::MuleEncoder;

    let data = vec![18, 8, 0, 2, -7, 3, 0, 0, 0, 0, 1, 1, 0, 0, 3, -2];
    let block = ArrayD::from_shape_vec(IxDyn(&[4, 4]), data).unwrap();

    let mut encoder = MuleEncoder::new();
    let stream = encoder.encode(&block, 0.0, None).unwrap();

    let mut decoder = MuleDecoder::new();
    let decoded = decoder
        .decode(stream, &[4, 4], encoder.upper_bitplane())
        .unwrap();

    assert_eq!(decoded, block);
    assert_eq!(decoder.lower_bitplane(), encoder.lower_bitplane());
}

#[test]
fn test_round_trip_odd_shapes() {
    use crate::structs::mule_encoder::MuleEncoder;

    for shape in [vec![1], vec![5], vec![3, 7], vec![2, 3, 5], vec![1, 9]] {
        let count: usize = shape.iter().product();
        let data: Vec<i32> = (0..count).map(|i| (i as i32 * 7) % 23 - 11).collect();
        let block = ArrayD::from_shape_vec(IxDyn(&shape), data).unwrap();

        let mut encoder = MuleEncoder::new();
        let stream = encoder.encode(&block, 0.0, None).unwrap();

        let mut decoder = MuleDecoder::new();
        let decoded = decoder
            .decode(stream, &shape, encoder.upper_bitplane())
            .unwrap();
        assert_eq!(decoded, block, "shape {:?}", shape);
    }
}

#[test]
fn test_all_zero_block() {
    use crate::structs::mule_encoder::MuleEncoder;

    let block = ArrayD::zeros(IxDyn(&[4, 4]));
    let mut encoder = MuleEncoder::new();
    let stream = encoder.encode(&block, 0.0, None).unwrap();

    let mut decoder = MuleDecoder::new();
    let decoded = decoder
        .decode(stream, &[4, 4], encoder.upper_bitplane())
        .unwrap();
    assert_eq!(decoded, block);
}

#[test]
fn test_quantized_decode_drops_low_bits() {
    use crate::structs::mule_encoder::MuleEncoder;

    // strong lagrangian pressure forces a non-zero floor on noisy data
    let data: Vec<i32> = (0..64).map(|i| (i * 37 % 61) - 30).collect();
    let block = ArrayD::from_shape_vec(IxDyn(&[8, 8]), data).unwrap();

    let mut encoder = MuleEncoder::new();
    let stream = encoder.encode(&block, 50.0, None).unwrap();
    let lower = encoder.lower_bitplane();

    let mut decoder = MuleDecoder::new();
    let decoded = decoder
        .decode(stream, &[8, 8], encoder.upper_bitplane())
        .unwrap();

    let mask = (1u32 << lower) - 1;
    for (&original, &reconstructed) in block.iter().zip(decoded.iter()) {
        // reconstruction carries only the bits above the floor; regions the
        // optimizer zeroed out decode as 0
        assert_eq!(reconstructed.unsigned_abs() & mask, 0);
        if reconstructed != 0 {
            assert_eq!(original.signum(), reconstructed.signum());
        }
    }
}
