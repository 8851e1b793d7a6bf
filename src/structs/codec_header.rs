/*---------------------------------------------------------------------------------------------
 *  Copyright (c) the mico project authors. All rights reserved.
 *  Licensed under the Apache License, Version 2.0.
 *--------------------------------------------------------------------------------------------*/

use std::io::{Read, Write};

use anyhow::{Context, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::helpers::err_exit_code;
use crate::here;
use crate::mico_error::ExitCode;

/// Self-describing header in front of the concatenated per-block streams.
///
/// Field order, all big-endian: dimensionality (8 bits), shape (32 bits per
/// axis), block size (16 bits), block count (32 bits), per-block byte length
/// (32 bits each), upper bitplane (8 bits), then any variant parameters
/// (8 bits each; the quantized codec stores its quality here).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecHeader {
    pub shape: Vec<usize>,
    pub block_size: usize,
    pub block_byte_sizes: Vec<usize>,
    pub upper_bitplane: u8,
    pub variant_params: Vec<u8>,
}

impl CodecHeader {
    pub fn write_to(&self, writer: &mut impl Write) -> Result<()> {
        if self.shape.is_empty() || self.shape.iter().any(|&s| s == 0) {
            return err_exit_code(ExitCode::BadHeader, "degenerate image shape");
        }
        if self.shape.len() > 255 {
            return err_exit_code(ExitCode::Overflow, "dimensionality does not fit in 8 bits");
        }
        if self.block_size == 0 {
            return err_exit_code(ExitCode::BadHeader, "block size must be positive");
        }
        if self.block_size > usize::from(u16::MAX) {
            return err_exit_code(ExitCode::Overflow, "block size does not fit in 16 bits");
        }

        writer.write_u8(self.shape.len() as u8)?;
        for &size in self.shape.iter() {
            let size = match u32::try_from(size) {
                Ok(size) => size,
                Err(_) => {
                    return err_exit_code(ExitCode::Overflow, "axis length does not fit in 32 bits")
                }
            };
            writer.write_u32::<BigEndian>(size)?;
        }

        writer.write_u16::<BigEndian>(self.block_size as u16)?;
        writer.write_u32::<BigEndian>(self.block_byte_sizes.len() as u32)?;
        for &size in self.block_byte_sizes.iter() {
            let size = match u32::try_from(size) {
                Ok(size) => size,
                Err(_) => {
                    return err_exit_code(
                        ExitCode::Overflow,
                        "block byte length does not fit in 32 bits",
                    )
                }
            };
            writer.write_u32::<BigEndian>(size)?;
        }

        writer.write_u8(self.upper_bitplane)?;
        writer.write_all(&self.variant_params)?;
        return Ok(());
    }

    pub fn read_from(reader: &mut impl Read, variant_param_count: usize) -> Result<CodecHeader> {
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

        let block_size = reader.read_u16::<BigEndian>().context(here!())?;
        if block_size == 0 {
            return err_exit_code(ExitCode::BadHeader, "block size must be positive");
        }

        let block_count = reader.read_u32::<BigEndian>().context(here!())?;
        let mut block_byte_sizes = Vec::with_capacity(block_count as usize);
        for _ in 0..block_count {
            block_byte_sizes.push(reader.read_u32::<BigEndian>().context(here!())? as usize);
        }

        let upper_bitplane = reader.read_u8().context(here!())?;

        let mut variant_params = vec![0u8; variant_param_count];
        reader.read_exact(&mut variant_params).context(here!())?;

        return Ok(CodecHeader {
            shape,
            block_size: usize::from(block_size),
            block_byte_sizes,
            upper_bitplane,
            variant_params,
        });
    }
}

#[test]
fn test_header_round_trip() {
    let header = CodecHeader {
        shape: vec![64, 48, 3],
        block_size: 8,
        block_byte_sizes: vec![120, 64, 0, 9001],
        upper_bitplane: 17,
        variant_params: vec![42],
    };

    let mut bytes = Vec::new();
    header.write_to(&mut bytes).unwrap();

    // 1 + 3*4 + 2 + 4 + 4*4 + 1 + 1
    assert_eq!(bytes.len(), 37);

    let parsed = CodecHeader::read_from(&mut bytes.as_slice(), 1).unwrap();
    assert_eq!(parsed, header);
}

#[test]
fn test_rejects_bad_headers() {
    use crate::mico_error::MicoError;

    let good = CodecHeader {
        shape: vec![16, 16],
        block_size: 8,
        block_byte_sizes: vec![10],
        upper_bitplane: 9,
        variant_params: Vec::new(),
    };

    let mut zero_block = good.clone();
    zero_block.block_size = 0;
    let err = zero_block.write_to(&mut Vec::new()).unwrap_err();
    assert_eq!(
        err.downcast_ref::<MicoError>().unwrap().exit_code(),
        ExitCode::BadHeader
    );

    let mut huge_block = good.clone();
    huge_block.block_size = 1 << 16;
    let err = huge_block.write_to(&mut Vec::new()).unwrap_err();
    assert_eq!(
        err.downcast_ref::<MicoError>().unwrap().exit_code(),
        ExitCode::Overflow
    );

    let mut empty_shape = good;
    empty_shape.shape.clear();
    let err = empty_shape.write_to(&mut Vec::new()).unwrap_err();
    assert_eq!(
        err.downcast_ref::<MicoError>().unwrap().exit_code(),
        ExitCode::BadHeader
    );
}

#[test]
fn test_rejects_zero_axis_on_read() {
    use crate::mico_error::MicoError;

    let mut bytes = Vec::new();
    bytes.push(2u8);
    bytes.extend_from_slice(&16u32.to_be_bytes());
    bytes.extend_from_slice(&0u32.to_be_bytes());

    let err = CodecHeader::read_from(&mut bytes.as_slice(), 0).unwrap_err();
    assert_eq!(
        err.downcast_ref::<MicoError>().unwrap().exit_code(),
        ExitCode::BadHeader
    );
}

#[test]
fn test_truncated_header_is_an_error() {
    let header = CodecHeader {
        shape: vec![16, 16],
        block_size: 8,
        block_byte_sizes: vec![10, 20],
        upper_bitplane: 9,
        variant_params: Vec::new(),
    };
    let mut bytes = Vec::new();
    header.write_to(&mut bytes).unwrap();
    bytes.truncate(bytes.len() - 3);

    assert!(CodecHeader::read_from(&mut bytes.as_slice(), 0).is_err());
}
