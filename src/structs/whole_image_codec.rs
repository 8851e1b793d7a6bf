/*---------------------------------------------------------------------------------------------
 *  Copyright (c) the mico project authors. All rights reserved.
 *  Licensed under the Apache License, Version 2.0.
 *--------------------------------------------------------------------------------------------*/

use anyhow::{Context, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use ndarray::ArrayD;

use crate::helpers::err_exit_code;
use crate::here;
use crate::mico_error::ExitCode;
use crate::structs::bitstream::Bitstream;
use crate::structs::coefficient_block::find_max_bitplane;
use crate::structs::mico_decoder::MicoDecoder;
use crate::structs::mico_encoder::MicoEncoder;
use crate::structs::mule_decoder::MuleDecoder;
use crate::structs::mule_encoder::MuleEncoder;
use crate::structs::transform::{forward_dct, inverse_dct, round_to_i32, to_f64};

/// Un-tiled codecs: one DCT over the whole image and a single entropy-coded
/// block behind a minimal header. Useful for small images and for light
/// fields whose dimensions do not tile well.

fn write_shape(output: &mut Vec<u8>, shape: &[usize]) -> Result<()> {
    if shape.is_empty() || shape.iter().any(|&s| s == 0) {
        return err_exit_code(ExitCode::BadHeader, "degenerate image shape");
    }
    if shape.len() > 255 {
        return err_exit_code(ExitCode::Overflow, "dimensionality does not fit in 8 bits");
    }

    output.write_u8(shape.len() as u8)?;
    for &size in shape.iter() {
        let size = match u32::try_from(size) {
            Ok(size) => size,
            Err(_) => {
                return err_exit_code(ExitCode::Overflow, "axis length does not fit in 32 bits")
            }
        };
        output.write_u32::<BigEndian>(size)?;
    }
    return Ok(());
}

fn read_shape(reader: &mut &[u8]) -> Result<Vec<usize>> {
    let ndim = reader.read_u8().context(here!())?;
    if ndim == 0 {
        return err_exit_code(ExitCode::BadHeader, "zero-dimensional image");
    }

    let mut shape = Vec::with_capacity(usize::from(ndim));
    for _ in 0..ndim {
        let size = reader.read_u32::<BigEndian>().context(here!())?;
        if size == 0 {
            return err_exit_code(ExitCode::BadHeader, "zero-length axis");
        }
        shape.push(size as usize);
    }
    return Ok(shape);
}

/// Whole-image MULE codec.
pub struct WholeImageMule {
    lagrangian: f64,
}

impl WholeImageMule {
    pub fn new(lagrangian: f64) -> Self {
        WholeImageMule { lagrangian }
    }

    pub fn encode(&self, image: &ArrayD<i32>) -> Result<Vec<u8>> {
        let transformed = round_to_i32(&forward_dct(&to_f64(image.view())));
        let upper_bitplane = find_max_bitplane(transformed.view());
        if upper_bitplane > 31 {
            return err_exit_code(
                ExitCode::Overflow,
                "transformed coefficients exceed the representable bitplanes",
            );
        }

        let mut output = Vec::new();
        write_shape(&mut output, image.shape())?;
        output.write_u8(upper_bitplane as u8)?;

        let mut encoder = MuleEncoder::new();
        let stream = encoder
            .encode(&transformed, self.lagrangian, Some(upper_bitplane))
            .context(here!())?;
        output.extend_from_slice(&stream.to_bytes());
        return Ok(output);
    }

    pub fn decode(data: &[u8]) -> Result<ArrayD<i32>> {
        let mut reader = data;
        let shape = read_shape(&mut reader)?;
        let upper_bitplane = reader.read_u8().context(here!())?;

        let mut decoder = MuleDecoder::new();
        let coefficients = decoder
            .decode(
                Bitstream::from_bytes(reader),
                &shape,
                u32::from(upper_bitplane),
            )
            .context(here!())?;
        return Ok(round_to_i32(&inverse_dct(&to_f64(coefficients.view()))));
    }
}

/// Whole-image MICO codec. The level table in the stream preamble makes an
/// upper bitplane field unnecessary.
pub struct WholeImageMico {
    lagrangian: f64,
}

impl WholeImageMico {
    pub fn new(lagrangian: f64) -> Self {
        WholeImageMico { lagrangian }
    }

    pub fn encode(&self, image: &ArrayD<i32>) -> Result<Vec<u8>> {
        let transformed = round_to_i32(&forward_dct(&to_f64(image.view())));

        let mut output = Vec::new();
        write_shape(&mut output, image.shape())?;

        let mut encoder = MicoEncoder::new();
        let stream = encoder
            .encode(&transformed, self.lagrangian)
            .context(here!())?;
        output.extend_from_slice(&stream.to_bytes());
        return Ok(output);
    }

    pub fn decode(data: &[u8]) -> Result<ArrayD<i32>> {
        let mut reader = data;
        let shape = read_shape(&mut reader)?;

        let mut decoder = MicoDecoder::new();
        let coefficients = decoder
            .decode(Bitstream::from_bytes(reader), &shape)
            .context(here!())?;
        return Ok(round_to_i32(&inverse_dct(&to_f64(coefficients.view()))));
    }
}
