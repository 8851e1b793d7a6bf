/*---------------------------------------------------------------------------------------------
 *  Copyright (c) the mico project authors. All rights reserved.
 *  Licensed under the Apache License, Version 2.0.
 *--------------------------------------------------------------------------------------------*/

use anyhow::{Context, Result};
use log::{debug, info};
use ndarray::{ArrayD, IxDyn};

use crate::consts::TINY_LAGRANGIAN;
use crate::helpers::err_exit_code;
use crate::here;
use crate::mico_error::ExitCode;
use crate::structs::bitstream::Bitstream;
use crate::structs::codec_header::CodecHeader;
use crate::structs::coefficient_block::find_max_bitplane;
use crate::structs::mico_decoder::MicoDecoder;
use crate::structs::mico_encoder::MicoEncoder;
use crate::structs::mule_decoder::MuleDecoder;
use crate::structs::mule_encoder::MuleEncoder;
use crate::structs::quantization_tables::QuantizationTables;
use crate::structs::region::Region;
use crate::structs::transform::{forward_dct, inverse_dct, round_to_i32, to_f64};

/// Tiles the image, transforms every tile with the orthonormal DCT, rounds
/// to integer coefficients, and hands each tile to its per-block entropy
/// coder. Partial tiles at the boundaries are coded at their true shape.
/// Every per-block stream is byte aligned, so the header's byte lengths are
/// enough to slice the body.
fn transform_tiles(image: &ArrayD<i32>, tiles: &[Region]) -> Vec<ArrayD<i32>> {
    tiles
        .iter()
        .map(|tile| round_to_i32(&forward_dct(&to_f64(tile.view(image)))))
        .collect()
}

fn validate_image(image: &ArrayD<i32>, block_size: usize) -> Result<()> {
    if image.ndim() == 0 || image.shape().iter().any(|&s| s == 0) {
        return err_exit_code(ExitCode::BadHeader, "degenerate image shape");
    }
    if block_size == 0 {
        return err_exit_code(ExitCode::BadHeader, "block size must be positive");
    }
    if block_size > usize::from(u16::MAX) {
        return err_exit_code(ExitCode::Overflow, "block size does not fit in 16 bits");
    }
    return Ok(());
}

/// Splits the payload behind a parsed header into per-block byte slices.
fn split_payload<'a>(header: &CodecHeader, payload: &'a [u8]) -> Result<Vec<&'a [u8]>> {
    let declared: usize = header.block_byte_sizes.iter().sum();
    if declared != payload.len() {
        return err_exit_code(
            ExitCode::BadHeader,
            "declared block byte counts do not match the payload",
        );
    }

    let mut slices = Vec::with_capacity(header.block_byte_sizes.len());
    let mut offset = 0;
    for &size in header.block_byte_sizes.iter() {
        slices.push(&payload[offset..offset + size]);
        offset += size;
    }
    return Ok(slices);
}

fn parse_header(data: &[u8], variant_param_count: usize) -> Result<(CodecHeader, &[u8])> {
    let mut reader = data;
    let header = CodecHeader::read_from(&mut reader, variant_param_count).context(here!())?;
    return Ok((header, reader));
}

/// Blocked MULE image codec.
pub struct BlockedMuleCodec {
    lagrangian: f64,
    block_size: usize,
}

impl BlockedMuleCodec {
    pub fn new(lagrangian: f64, block_size: usize) -> Self {
        BlockedMuleCodec {
            lagrangian,
            block_size,
        }
    }

    pub fn encode(&self, image: &ArrayD<i32>) -> Result<Vec<u8>> {
        validate_image(image, self.block_size)?;

        let tiles = Region::tile(image.shape(), self.block_size);
        let blocks = transform_tiles(image, &tiles);

        // one shared top bitplane, so every block's decoder starts alike
        let upper_bitplane = blocks
            .iter()
            .map(|b| find_max_bitplane(b.view()))
            .max()
            .unwrap_or(0);
        if upper_bitplane > 31 {
            return err_exit_code(
                ExitCode::Overflow,
                "transformed coefficients exceed the representable bitplanes",
            );
        }

        let mut body = Vec::new();
        let mut block_byte_sizes = Vec::with_capacity(blocks.len());
        for block in blocks.iter() {
            let mut encoder = MuleEncoder::new();
            let stream = encoder
                .encode(block, self.lagrangian, Some(upper_bitplane))
                .context(here!())?;
            let bytes = stream.to_bytes();
            debug!(
                "mule block: {} bytes, lower bitplane {}",
                bytes.len(),
                encoder.lower_bitplane()
            );
            block_byte_sizes.push(bytes.len());
            body.extend_from_slice(&bytes);
        }

        let header = CodecHeader {
            shape: image.shape().to_vec(),
            block_size: self.block_size,
            block_byte_sizes,
            upper_bitplane: upper_bitplane as u8,
            variant_params: Vec::new(),
        };

        let mut output = Vec::new();
        header.write_to(&mut output).context(here!())?;
        output.extend_from_slice(&body);
        info!(
            "mule encode: {} blocks, {} bytes total",
            tiles.len(),
            output.len()
        );
        return Ok(output);
    }

    pub fn decode(data: &[u8]) -> Result<ArrayD<i32>> {
        let (header, payload) = parse_header(data, 0)?;
        let tiles = Region::tile(&header.shape, header.block_size);
        if tiles.len() != header.block_byte_sizes.len() {
            return err_exit_code(
                ExitCode::BadHeader,
                "block count does not match the tiling of the declared shape",
            );
        }
        let slices = split_payload(&header, payload)?;

        let mut image = ArrayD::zeros(IxDyn(&header.shape));
        for (tile, bytes) in tiles.iter().zip(slices) {
            let mut decoder = MuleDecoder::new();
            let coefficients = decoder
                .decode(
                    Bitstream::from_bytes(bytes),
                    &tile.shape(),
                    u32::from(header.upper_bitplane),
                )
                .context(here!())?;
            let restored = round_to_i32(&inverse_dct(&to_f64(coefficients.view())));
            tile.view_mut(&mut image).assign(&restored);
        }
        return Ok(image);
    }
}

/// Blocked MICO image codec.
pub struct BlockedMicoCodec {
    lagrangian: f64,
    block_size: usize,
}

impl BlockedMicoCodec {
    pub fn new(lagrangian: f64, block_size: usize) -> Self {
        BlockedMicoCodec {
            lagrangian,
            block_size,
        }
    }

    pub fn encode(&self, image: &ArrayD<i32>) -> Result<Vec<u8>> {
        validate_image(image, self.block_size)?;

        let tiles = Region::tile(image.shape(), self.block_size);
        let blocks = transform_tiles(image, &tiles);
        let upper_bitplane = blocks
            .iter()
            .map(|b| find_max_bitplane(b.view()))
            .max()
            .unwrap_or(0);

        let mut body = Vec::new();
        let mut block_byte_sizes = Vec::with_capacity(blocks.len());
        for block in blocks.iter() {
            let mut encoder = MicoEncoder::new();
            let stream = encoder.encode(block, self.lagrangian).context(here!())?;
            let bytes = stream.to_bytes();
            debug!(
                "mico block: {} bytes, lower bitplane {}",
                bytes.len(),
                encoder.lower_bitplane()
            );
            block_byte_sizes.push(bytes.len());
            body.extend_from_slice(&bytes);
        }

        let header = CodecHeader {
            shape: image.shape().to_vec(),
            block_size: self.block_size,
            block_byte_sizes,
            upper_bitplane: upper_bitplane.min(255) as u8,
            variant_params: Vec::new(),
        };

        let mut output = Vec::new();
        header.write_to(&mut output).context(here!())?;
        output.extend_from_slice(&body);
        info!(
            "mico encode: {} blocks, {} bytes total",
            tiles.len(),
            output.len()
        );
        return Ok(output);
    }

    pub fn decode(data: &[u8]) -> Result<ArrayD<i32>> {
        let (header, payload) = parse_header(data, 0)?;
        let tiles = Region::tile(&header.shape, header.block_size);
        if tiles.len() != header.block_byte_sizes.len() {
            return err_exit_code(
                ExitCode::BadHeader,
                "block count does not match the tiling of the declared shape",
            );
        }
        let slices = split_payload(&header, payload)?;

        let mut image = ArrayD::zeros(IxDyn(&header.shape));
        for (tile, bytes) in tiles.iter().zip(slices) {
            let mut decoder = MicoDecoder::new();
            let coefficients = decoder
                .decode(Bitstream::from_bytes(bytes), &tile.shape())
                .context(here!())?;
            let restored = round_to_i32(&inverse_dct(&to_f64(coefficients.view())));
            tile.view_mut(&mut image).assign(&restored);
        }
        return Ok(image);
    }
}

/// MICO behind a fixed quantization matrix instead of the Lagrangian search.
/// The matrix does the rate control; the tree runs at a tiny lambda.
pub struct QuantizedMicoCodec {
    quality: u8,
    block_size: usize,
}

impl QuantizedMicoCodec {
    pub fn new(quality: u8, block_size: usize) -> Self {
        QuantizedMicoCodec {
            quality,
            block_size,
        }
    }

    pub fn encode(&self, image: &ArrayD<i32>) -> Result<Vec<u8>> {
        validate_image(image, self.block_size)?;
        let tables = QuantizationTables::new(self.block_size, image.ndim(), self.quality)
            .context(here!())?;

        let tiles = Region::tile(image.shape(), self.block_size);

        let mut body = Vec::new();
        let mut block_byte_sizes = Vec::with_capacity(tiles.len());
        let mut upper_bitplane = 0;
        for tile in tiles.iter() {
            let transformed = forward_dct(&to_f64(tile.view(image)));
            let block = round_to_i32(&tables.quantize(&transformed));
            upper_bitplane = upper_bitplane.max(find_max_bitplane(block.view()));

            let mut encoder = MicoEncoder::new();
            let stream = encoder.encode(&block, TINY_LAGRANGIAN).context(here!())?;
            let bytes = stream.to_bytes();
            debug!("quantized mico block: {} bytes", bytes.len());
            block_byte_sizes.push(bytes.len());
            body.extend_from_slice(&bytes);
        }

        let header = CodecHeader {
            shape: image.shape().to_vec(),
            block_size: self.block_size,
            block_byte_sizes,
            upper_bitplane: upper_bitplane.min(255) as u8,
            variant_params: vec![self.quality],
        };

        let mut output = Vec::new();
        header.write_to(&mut output).context(here!())?;
        output.extend_from_slice(&body);
        info!(
            "quantized mico encode: quality {}, {} blocks, {} bytes total",
            self.quality,
            tiles.len(),
            output.len()
        );
        return Ok(output);
    }

    pub fn decode(data: &[u8]) -> Result<ArrayD<i32>> {
        let (header, payload) = parse_header(data, 1)?;
        let quality = header.variant_params[0];
        let tables =
            QuantizationTables::new(header.block_size, header.shape.len(), quality).context(here!())?;

        let tiles = Region::tile(&header.shape, header.block_size);
        if tiles.len() != header.block_byte_sizes.len() {
            return err_exit_code(
                ExitCode::BadHeader,
                "block count does not match the tiling of the declared shape",
            );
        }
        let slices = split_payload(&header, payload)?;

        let mut image = ArrayD::zeros(IxDyn(&header.shape));
        for (tile, bytes) in tiles.iter().zip(slices) {
            let mut decoder = MicoDecoder::new();
            let coefficients = decoder
                .decode(Bitstream::from_bytes(bytes), &tile.shape())
                .context(here!())?;
            let transformed = tables.dequantize(&to_f64(coefficients.view()));
            let restored = round_to_i32(&inverse_dct(&transformed));
            tile.view_mut(&mut image).assign(&restored);
        }
        return Ok(image);
    }
}
