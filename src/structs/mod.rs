/*---------------------------------------------------------------------------------------------
 *  Copyright (c) the mico project authors. All rights reserved.
 *  Licensed under the Apache License, Version 2.0.
 *--------------------------------------------------------------------------------------------*/

pub mod bitstream;
pub mod block_codec;
pub mod cabac_decoder;
pub mod cabac_encoder;
pub mod codec_header;
pub mod coefficient_block;
pub mod mico_decoder;
pub mod mico_encoder;
pub mod mico_optimizer;
pub mod mico_probability_handler;
pub mod mule_decoder;
pub mod mule_encoder;
pub mod mule_optimizer;
pub mod mule_probability_handler;
pub mod probability_model;
pub mod quantization_tables;
pub mod region;
pub mod transform;
pub mod whole_image_codec;
