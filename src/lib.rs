/*---------------------------------------------------------------------------------------------
 *  Copyright (c) the mico project authors. All rights reserved.
 *  Licensed under the Apache License, Version 2.0.
 *--------------------------------------------------------------------------------------------*/

//! MICO and MULE: rate-distortion optimizing entropy coders for
//! N-dimensional integer transform blocks.
//!
//! Both codecs recursively partition a block of rounded DCT coefficients,
//! choose between coding, zeroing, and splitting each region by Lagrangian
//! cost `D + lambda * R`, and emit the decisions through a context-adaptive
//! binary arithmetic coder. MULE partitions by magnitude bitplane; MICO
//! partitions by position level against a per-level bitplane table. At
//! `lambda = 0` both are lossless.
//!
//! The blocked codecs tile an image, transform each tile with an orthonormal
//! DCT, and frame the per-tile streams behind a self-describing header.

pub mod metrics;
pub mod mico_error;
pub mod structs;

mod consts;
mod helpers;

use anyhow::Result;
use ndarray::ArrayD;

pub use crate::metrics::RateDistortion;
pub use crate::mico_error::{ExitCode, MicoError};
pub use crate::structs::bitstream::Bitstream;
pub use crate::structs::block_codec::{BlockedMicoCodec, BlockedMuleCodec, QuantizedMicoCodec};
pub use crate::structs::cabac_decoder::CabacDecoder;
pub use crate::structs::cabac_encoder::CabacEncoder;
pub use crate::structs::mico_decoder::MicoDecoder;
pub use crate::structs::mico_encoder::MicoEncoder;
pub use crate::structs::mule_decoder::MuleDecoder;
pub use crate::structs::mule_encoder::MuleEncoder;
pub use crate::structs::probability_model::{
    ExponentialSmoothingModel, FrequentistModel, ProbabilityModel,
};
pub use crate::structs::whole_image_codec::{WholeImageMico, WholeImageMule};

/// Encodes an integer image with the blocked MULE codec.
pub fn encode_mule(image: &ArrayD<i32>, lagrangian: f64, block_size: usize) -> Result<Vec<u8>> {
    BlockedMuleCodec::new(lagrangian, block_size).encode(image)
}

/// Decodes a blocked MULE stream.
pub fn decode_mule(data: &[u8]) -> Result<ArrayD<i32>> {
    BlockedMuleCodec::decode(data)
}

/// Encodes an integer image with the blocked MICO codec.
pub fn encode_mico(image: &ArrayD<i32>, lagrangian: f64, block_size: usize) -> Result<Vec<u8>> {
    BlockedMicoCodec::new(lagrangian, block_size).encode(image)
}

/// Decodes a blocked MICO stream.
pub fn decode_mico(data: &[u8]) -> Result<ArrayD<i32>> {
    BlockedMicoCodec::decode(data)
}

/// Encodes with the quantization-matrix MICO variant, quality in `[1, 100]`.
pub fn encode_mico_quantized(
    image: &ArrayD<i32>,
    quality: u8,
    block_size: usize,
) -> Result<Vec<u8>> {
    QuantizedMicoCodec::new(quality, block_size).encode(image)
}

/// Decodes a quantized MICO stream.
pub fn decode_mico_quantized(data: &[u8]) -> Result<ArrayD<i32>> {
    QuantizedMicoCodec::decode(data)
}
