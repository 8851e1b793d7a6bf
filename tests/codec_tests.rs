/*---------------------------------------------------------------------------------------------
 *  Copyright (c) the mico project authors. All rights reserved.
 *  Licensed under the Apache License, Version 2.0.
 *--------------------------------------------------------------------------------------------*/

use std::hash::Hasher;

use ndarray::{ArrayD, IxDyn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rstest::rstest;
use siphasher::sip::SipHasher13;

use mico::metrics::{mse, psnr};
use mico::structs::coefficient_block::LevelBitplaneTable;
use mico::structs::mico_optimizer::MicoFlag;
use mico::structs::mule_optimizer::MuleFlag;
use mico::{
    Bitstream, CabacDecoder, CabacEncoder, ExitCode, FrequentistModel, MicoDecoder, MicoEncoder,
    MicoError, MuleDecoder, MuleEncoder,
};

fn init_logging() {
    let _ = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init();
}

fn bits(pattern: &str) -> Vec<bool> {
    pattern
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c == '1')
        .collect()
}

fn block_from(shape: &[usize], data: Vec<i32>) -> ArrayD<i32> {
    ArrayD::from_shape_vec(IxDyn(shape), data).unwrap()
}

fn easy_block() -> ArrayD<i32> {
    block_from(
        &[4, 4],
        vec![18, 8, 0, 2, -7, 3, 0, 0, 0, 0, 1, 1, 0, 0, 3, -2],
    )
}

fn random_block(shape: &[usize], range: std::ops::Range<i32>, seed: u64) -> ArrayD<i32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let count: usize = shape.iter().product();
    let data: Vec<i32> = (0..count).map(|_| rng.gen_range(range.clone())).collect();
    block_from(shape, data)
}

// CABAC reference vector

#[test]
fn cabac_reference_vector() {
    let input = bits("1110 1101 1011 0111 1110 1111 1111 0111");

    let mut encoder = CabacEncoder::new();
    let mut model = FrequentistModel::new();
    for &bit in input.iter() {
        encoder.encode_bit(bit, &mut model);
    }
    let stream = encoder.end(false);
    let encoded: Vec<bool> = stream.iter().collect();
    assert_eq!(encoded, bits("1100 0001 0110 1001 0111 1000 11"));

    let mut decoder = CabacDecoder::new();
    decoder.start(stream);
    let mut model = FrequentistModel::new();
    for &bit in input.iter() {
        assert_eq!(decoder.decode_bit(&mut model).unwrap(), bit);
    }
}

#[test]
fn cabac_reference_vector_filled_to_byte() {
    let input = bits("1110 1101 1011 0111 1110 1111 1111 0111");

    let mut encoder = CabacEncoder::new();
    let mut model = FrequentistModel::new();
    for &bit in input.iter() {
        encoder.encode_bit(bit, &mut model);
    }
    let stream = encoder.end(true);
    let encoded: Vec<bool> = stream.iter().collect();
    assert_eq!(encoded, bits("0000 0011 0000 0101 1010 0101 1110 0011"));
    assert_eq!(
        stream.to_bytes(),
        vec![0b0000_0011, 0b0000_0101, 0b1010_0101, 0b1110_0011]
    );

    let mut decoder = CabacDecoder::new();
    decoder.start(stream);
    let mut model = FrequentistModel::new();
    for &bit in input.iter() {
        assert_eq!(decoder.decode_bit(&mut model).unwrap(), bit);
    }
}

// random round trips, and skewed input must compress

#[rstest]
#[case::mostly_zero(0.1)]
#[case::balanced(0.5)]
#[case::mostly_one(0.9)]
fn cabac_random_round_trip(#[case] bias: f64) {
    let mut rng = ChaCha8Rng::seed_from_u64(bias.to_bits());
    let input: Vec<bool> = (0..1000).map(|_| rng.gen_bool(bias)).collect();

    let mut encoder = CabacEncoder::new();
    let mut model = FrequentistModel::new();
    for &bit in input.iter() {
        encoder.encode_bit(bit, &mut model);
    }
    let stream = encoder.end(false);

    if bias != 0.5 {
        // highly skewed input must compress
        assert!(stream.len() < input.len());
    }

    let mut decoder = CabacDecoder::new();
    decoder.start(stream);
    let mut model = FrequentistModel::new();
    for &bit in input.iter() {
        assert_eq!(decoder.decode_bit(&mut model).unwrap(), bit);
    }
}

// mixed contexts on one stream

#[test]
fn cabac_mixed_contexts() {
    let mut rng = ChaCha8Rng::seed_from_u64(6);
    let segments: Vec<Vec<bool>> = [(100, 0.3), (20, 0.6), (80, 0.8)]
        .iter()
        .map(|&(len, bias)| (0..len).map(|_| rng.gen_bool(bias)).collect())
        .collect();

    let mut encoder = CabacEncoder::new();
    let mut encoder_models = [
        FrequentistModel::new(),
        FrequentistModel::new(),
        FrequentistModel::new(),
    ];
    for (segment, model) in segments.iter().zip(encoder_models.iter_mut()) {
        for &bit in segment.iter() {
            encoder.encode_bit(bit, model);
        }
    }
    let stream = encoder.end(false);

    let mut decoder = CabacDecoder::new();
    decoder.start(stream);
    let mut decoder_models = [
        FrequentistModel::new(),
        FrequentistModel::new(),
        FrequentistModel::new(),
    ];
    for (segment, model) in segments.iter().zip(decoder_models.iter_mut()) {
        for &bit in segment.iter() {
            assert_eq!(decoder.decode_bit(model).unwrap(), bit);
        }
    }

    // the decoder's models must have walked the identical trajectory
    for (e, d) in encoder_models.iter().zip(decoder_models.iter()) {
        assert_eq!(e, d);
    }
}

// MULE easy block

#[test]
fn mule_easy_block_canonical_flags() {
    use MuleFlag::*;

    let block = easy_block();
    let mut encoder = MuleEncoder::new();
    let stream = encoder.encode(&block, 0.0, None).unwrap();

    let expected = [
        Split, Split, LowerBitplane, LowerBitplane, LowerBitplane, Split, Zero, LowerBitplane,
        LowerBitplane, LowerBitplane, Split,
    ];
    let flags: Vec<MuleFlag> = encoder.flags().iter().copied().collect();
    assert_eq!(flags, expected);

    // lambda 0 commits a lossless tree; the estimate must agree
    assert_eq!(encoder.estimated_rd().distortion, 0.0);
    assert!(encoder.estimated_rd().rate > 0.0);

    let mut decoder = MuleDecoder::new();
    let decoded = decoder
        .decode(stream, &[4, 4], encoder.upper_bitplane())
        .unwrap();
    assert_eq!(decoded, block);
}

// MICO easy block

#[test]
fn mico_easy_block_canonical_flags() {
    use MicoFlag::*;

    let block = easy_block();
    let mut encoder = MicoEncoder::new();
    let stream = encoder.encode(&block, 1e-6).unwrap();

    let expected = [
        Split, Full, Split, UnitZero, UnitValue, UnitZero, UnitZero, Empty, Full,
    ];
    let flags: Vec<MicoFlag> = encoder.flags().iter().copied().collect();
    assert_eq!(flags, expected);
    assert_eq!(encoder.estimated_rd().distortion, 0.0);

    let mut decoder = MicoDecoder::new();
    let decoded = decoder.decode(stream, &[4, 4]).unwrap();
    assert_eq!(decoded, block);
    assert_eq!(decoder.lower_bitplane(), encoder.lower_bitplane());
}

// level bitplane table

#[test]
fn level_table_monotonicity() {
    let block = block_from(
        &[4, 4],
        vec![18, 8, 0, 2, -7, 3, 0, 0, 0, 0, 1, -2, 0, 0, 3, -1],
    );
    let table = LevelBitplaneTable::compute(&block);
    assert_eq!(table.sizes(), &[5, 4, 2, 2]);
}

// lossless round trips at lambda 0, up to 5-D

#[test]
fn mico_random_5d_round_trip() {
    let block = random_block(&[9, 10, 8, 5, 2], 0..256, 4);

    let mut encoder = MicoEncoder::new();
    let stream = encoder.encode(&block, 0.0).unwrap();

    let mut decoder = MicoDecoder::new();
    let decoded = decoder.decode(stream, &[9, 10, 8, 5, 2]).unwrap();
    assert_eq!(decoded, block);
}

#[test]
fn mule_random_5d_round_trip() {
    let block = random_block(&[9, 10, 8, 5, 2], 0..256, 4);

    let mut encoder = MuleEncoder::new();
    let stream = encoder.encode(&block, 0.0, None).unwrap();

    let mut decoder = MuleDecoder::new();
    let decoded = decoder
        .decode(stream, &[9, 10, 8, 5, 2], encoder.upper_bitplane())
        .unwrap();
    assert_eq!(decoded, block);
}

#[rstest]
#[case::one_d(vec![37])]
#[case::two_d(vec![12, 12])]
#[case::ragged(vec![7, 13])]
#[case::three_d(vec![5, 6, 7])]
#[case::four_d(vec![3, 4, 2, 5])]
fn lossless_round_trip_shapes(#[case] shape: Vec<usize>) {
    let block = random_block(&shape, -100..100, 11);

    let mut encoder = MuleEncoder::new();
    let stream = encoder.encode(&block, 0.0, None).unwrap();
    let mut decoder = MuleDecoder::new();
    let decoded = decoder
        .decode(stream, &shape, encoder.upper_bitplane())
        .unwrap();
    assert_eq!(decoded, block, "mule shape {:?}", shape);

    let mut encoder = MicoEncoder::new();
    let stream = encoder.encode(&block, 0.0).unwrap();
    let mut decoder = MicoDecoder::new();
    let decoded = decoder.decode(stream, &shape).unwrap();
    assert_eq!(decoded, block, "mico shape {:?}", shape);
}

// decoding is deterministic

#[test]
fn decode_is_deterministic() {
    let block = random_block(&[8, 8], -500..500, 21);

    let mut encoder = MuleEncoder::new();
    let stream = encoder.encode(&block, 10.0, None).unwrap();

    let digest = |decoded: &ArrayD<i32>| {
        let mut hasher = SipHasher13::new();
        hasher.write(bytemuck::cast_slice(decoded.as_slice().unwrap()));
        hasher.finish()
    };

    let mut decoder = MuleDecoder::new();
    let first = decoder
        .decode(stream.clone(), &[8, 8], encoder.upper_bitplane())
        .unwrap();
    let mut decoder = MuleDecoder::new();
    let second = decoder
        .decode(stream, &[8, 8], encoder.upper_bitplane())
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(digest(&first), digest(&second));
}

// rate non-increasing in lambda

#[test]
fn rate_non_increasing_in_lambda() {
    let block = random_block(&[16, 16], -300..300, 33);

    let mut previous = usize::MAX;
    for lagrangian in [0.0, 10.0, 1000.0, 100_000.0] {
        let mut encoder = MuleEncoder::new();
        let stream = encoder.encode(&block, lagrangian, None).unwrap();
        // a byte of slack: adaptive models do not guarantee strict ordering
        // between neighboring operating points
        assert!(
            stream.len() <= previous.saturating_add(8),
            "rate grew at lambda {}",
            lagrangian
        );
        previous = previous.min(stream.len());
    }
}

// blocked codec wrappers

#[test]
fn blocked_mule_round_trip_with_partial_tiles() {
    init_logging();

    // 20x13 with block size 8 leaves partial tiles on both axes
    let image = random_block(&[20, 13], 0..256, 7);
    let bytes = mico::encode_mule(&image, 0.0, 8).unwrap();
    let decoded = mico::decode_mule(&bytes).unwrap();

    assert_eq!(decoded.shape(), image.shape());
    // the only loss is the integer rounding of the DCT coefficients
    assert!(mse(&image, &decoded) <= 0.5, "mse {}", mse(&image, &decoded));
}

#[test]
fn blocked_mico_round_trip_with_partial_tiles() {
    let image = random_block(&[17, 9], 0..256, 8);
    let bytes = mico::encode_mico(&image, 0.0, 8).unwrap();
    let decoded = mico::decode_mico(&bytes).unwrap();

    assert_eq!(decoded.shape(), image.shape());
    assert!(mse(&image, &decoded) <= 0.5, "mse {}", mse(&image, &decoded));
}

#[test]
fn blocked_mico_3d_round_trip() {
    let image = random_block(&[8, 9, 5], 0..64, 9);
    let bytes = mico::encode_mico(&image, 0.0, 4).unwrap();
    let decoded = mico::decode_mico(&bytes).unwrap();

    assert_eq!(decoded.shape(), image.shape());
    assert!(mse(&image, &decoded) <= 0.5);
}

#[test]
fn blocked_lagrangian_trades_rate_for_distortion() {
    let image = random_block(&[32, 32], 0..256, 10);

    let lossless = mico::encode_mule(&image, 0.0, 8).unwrap();
    let lossy = mico::encode_mule(&image, 5000.0, 8).unwrap();
    assert!(lossy.len() <= lossless.len());

    let exact = mico::decode_mule(&lossless).unwrap();
    let coarse = mico::decode_mule(&lossy).unwrap();
    assert_eq!(coarse.shape(), image.shape());
    // distortion moves the other way
    assert!(mse(&image, &coarse) >= mse(&image, &exact));
}

#[test]
fn quantized_mico_round_trip() {
    let image = random_block(&[16, 16], 0..256, 12);

    let bytes = mico::encode_mico_quantized(&image, 10, 8).unwrap();
    let decoded = mico::decode_mico_quantized(&bytes).unwrap();
    assert_eq!(decoded.shape(), image.shape());
    assert!(psnr(&image, &decoded, 8) > 30.0);

    // harsher quality quantizes harder and must not beat the mild one
    let harsh = mico::encode_mico_quantized(&image, 90, 8).unwrap();
    assert!(harsh.len() <= bytes.len());
    let harsh_decoded = mico::decode_mico_quantized(&harsh).unwrap();
    assert!(psnr(&image, &harsh_decoded, 8) <= psnr(&image, &decoded, 8));
}

#[test]
fn whole_image_codecs_round_trip() {
    let image = random_block(&[11, 6], 0..128, 13);

    let codec = mico::WholeImageMule::new(0.0);
    let bytes = codec.encode(&image).unwrap();
    let decoded = mico::WholeImageMule::decode(&bytes).unwrap();
    assert!(mse(&image, &decoded) <= 0.5);

    let codec = mico::WholeImageMico::new(0.0);
    let bytes = codec.encode(&image).unwrap();
    let decoded = mico::WholeImageMico::decode(&bytes).unwrap();
    assert!(mse(&image, &decoded) <= 0.5);
}

// header framing and error surfaces

#[test]
fn header_survives_the_framing() {
    use mico::structs::codec_header::CodecHeader;

    let image = random_block(&[20, 13], 0..256, 7);
    let bytes = mico::encode_mule(&image, 0.0, 8).unwrap();

    let mut reader = bytes.as_slice();
    let header = CodecHeader::read_from(&mut reader, 0).unwrap();
    assert_eq!(header.shape, vec![20, 13]);
    assert_eq!(header.block_size, 8);
    // 3x2 tiling
    assert_eq!(header.block_byte_sizes.len(), 6);
    let payload: usize = header.block_byte_sizes.iter().sum();
    assert_eq!(payload, reader.len());
}

#[test]
fn truncated_payload_is_a_bad_header() {
    let image = random_block(&[16, 16], 0..256, 14);
    let mut bytes = mico::encode_mule(&image, 0.0, 8).unwrap();
    bytes.truncate(bytes.len() - 1);

    let err = mico::decode_mule(&bytes).unwrap_err();
    let mico_error = err.downcast_ref::<MicoError>().unwrap();
    assert_eq!(mico_error.exit_code(), ExitCode::BadHeader);
}

#[test]
fn empty_input_is_an_error() {
    assert!(mico::decode_mule(&[]).is_err());
    assert!(mico::decode_mico(&[]).is_err());
}

#[test]
fn zero_block_size_is_rejected() {
    let image = random_block(&[8, 8], 0..16, 15);
    let err = mico::encode_mule(&image, 0.0, 0).unwrap_err();
    let mico_error = err.downcast_ref::<MicoError>().unwrap();
    assert_eq!(mico_error.exit_code(), ExitCode::BadHeader);
}

#[test]
fn oversized_upper_bitplane_is_rejected() {
    // |i32::MIN| needs 32 magnitude bits, one past the framable maximum
    let block = block_from(&[2, 2], vec![i32::MIN, 0, 0, 0]);
    let mut encoder = MuleEncoder::new();
    let err = encoder.encode(&block, 0.0, None).unwrap_err();
    let mico_error = err.downcast_ref::<MicoError>().unwrap();
    assert_eq!(mico_error.exit_code(), ExitCode::Overflow);
}

// encoded streams slice cleanly per block

#[test]
fn per_block_streams_decode_independently() {
    use mico::structs::codec_header::CodecHeader;

    let image = random_block(&[16, 8], 0..256, 16);
    let bytes = mico::encode_mico(&image, 0.0, 8).unwrap();

    let mut reader = bytes.as_slice();
    let header = CodecHeader::read_from(&mut reader, 0).unwrap();

    // decode only the second block's slice
    let offset: usize = header.block_byte_sizes[0];
    let second = &reader[offset..offset + header.block_byte_sizes[1]];
    let mut decoder = MicoDecoder::new();
    let decoded = decoder
        .decode(Bitstream::from_bytes(second), &[8, 8])
        .unwrap();
    assert_eq!(decoded.shape(), &[8, 8]);
}
