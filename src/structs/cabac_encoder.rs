/*---------------------------------------------------------------------------------------------
 *  Copyright (c) the mico project authors. All rights reserved.
 *  Licensed under the Apache License, Version 2.0.
 *--------------------------------------------------------------------------------------------*/

use crate::consts::DEFAULT_PRECISION;
use crate::structs::bitstream::Bitstream;
use crate::structs::probability_model::ProbabilityModel;

/// Context-adaptive binary arithmetic encoder.
///
/// The caller supplies the probability model for every bit, so any number of
/// contexts can be interleaved on one stream; the only contract is that the
/// decoder drives the identical models in the identical order.
///
/// `low` and `high` track the current interval over `[0, 2^P)`. Matching top
/// bits are settled and emitted; the E3 counter tracks straddles of the
/// interval midpoint that can only be resolved by a later settled bit.
pub struct CabacEncoder {
    precision: u32,
    msb_mask: u64,
    full_range: u64,
    half_range: u64,
    quarter_range: u64,
    three_quarter_range: u64,

    low: u64,
    high: u64,
    e3_count: u32,

    result: Bitstream,
}

impl Default for CabacEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl CabacEncoder {
    pub fn new() -> Self {
        Self::with_precision(DEFAULT_PRECISION)
    }

    pub fn with_precision(precision: u32) -> Self {
        assert!(
            precision >= 4 && precision <= 32,
            "unsupported arithmetic precision {}",
            precision
        );

        let full_range = (1u64 << precision) - 1;
        let half_range = full_range >> 1;
        let quarter_range = half_range >> 1;

        let mut encoder = CabacEncoder {
            precision,
            msb_mask: 1u64 << (precision - 1),
            full_range,
            half_range,
            quarter_range,
            three_quarter_range: 3 * quarter_range,
            low: 0,
            high: full_range,
            e3_count: 0,
            result: Bitstream::new(),
        };
        encoder.start();
        return encoder;
    }

    /// Resets the interval and the output buffer for a new stream.
    pub fn start(&mut self) {
        self.low = 0;
        self.high = self.full_range;
        self.e3_count = 0;
        self.result.clear();
    }

    #[inline(always)]
    pub fn encode_bit(&mut self, bit: bool, model: &mut impl ProbabilityModel) {
        let range = self.high - self.low;
        let mid = self.low + (range as f64 * model.probability(false)) as u64;

        if bit {
            self.low = mid + 1;
        } else {
            self.high = mid;
        }
        model.record_bit(bit);

        self.resolve_scaling();
    }

    fn resolve_scaling(&mut self) {
        loop {
            if (self.high & self.msb_mask) == (self.low & self.msb_mask) {
                // the top bit is settled; emit it together with the pending
                // inverse bits accumulated by E3 shifts
                let msb = (self.high & self.msb_mask) >> (self.precision - 1);
                self.low -= self.half_range * msb + msb;
                self.high -= self.half_range * msb + msb;

                self.result.append(msb != 0);
                self.flush_inverse_bits(msb != 0);
            } else if self.high <= self.three_quarter_range && self.low > self.quarter_range {
                // straddling the midpoint; defer the decision
                self.low -= self.quarter_range + 1;
                self.high -= self.quarter_range + 1;
                self.e3_count += 1;
            } else {
                break;
            }

            self.low = (self.low << 1) & self.full_range;
            self.high = ((self.high << 1) & self.full_range) | 1;
        }
    }

    fn flush_inverse_bits(&mut self, bit: bool) {
        for _ in 0..self.e3_count {
            self.result.append(!bit);
        }
        self.e3_count = 0;
    }

    /// Flushes the final interval state, optionally zero-pads to a byte
    /// boundary, and reverses the sequence so the decoder can consume it
    /// from the tail. Returns the finished stream.
    pub fn end(&mut self, fill_to_byte: bool) -> Bitstream {
        self.e3_count += 1;
        if self.low < self.quarter_range {
            self.result.append(false);
            self.flush_inverse_bits(false);
        } else {
            self.result.append(true);
            self.flush_inverse_bits(true);
        }

        if fill_to_byte {
            self.result.fill_to_byte();
        }
        self.result.reverse();

        return std::mem::take(&mut self.result);
    }
}

#[test]
fn test_single_model_round_trip() {
    use crate::structs::cabac_decoder::CabacDecoder;
    use crate::structs::probability_model::FrequentistModel;

    let bits = [true, true, false, true, false, false, false, false, true];

    let mut encoder = CabacEncoder::new();
    let mut model = FrequentistModel::new();
    for &bit in bits.iter() {
        encoder.encode_bit(bit, &mut model);
    }
    let stream = encoder.end(false);

    let mut decoder = CabacDecoder::new();
    decoder.start(stream);
    let mut model = FrequentistModel::new();
    for &bit in bits.iter() {
        assert_eq!(decoder.decode_bit(&mut model).unwrap(), bit);
    }
}

#[test]
fn test_configurable_precision_round_trip() {
    use crate::structs::cabac_decoder::CabacDecoder;
    use crate::structs::probability_model::FrequentistModel;

    for precision in [8, 12, 16, 24, 30] {
        let bits: Vec<bool> = (0..200).map(|i| i % 3 == 0).collect();

        let mut encoder = CabacEncoder::with_precision(precision);
        let mut model = FrequentistModel::new();
        for &bit in bits.iter() {
            encoder.encode_bit(bit, &mut model);
        }
        let stream = encoder.end(true);

        let mut decoder = CabacDecoder::with_precision(precision);
        decoder.start(stream);
        let mut model = FrequentistModel::new();
        for &bit in bits.iter() {
            assert_eq!(decoder.decode_bit(&mut model).unwrap(), bit);
        }
    }
}

#[test]
fn test_skewed_input_compresses() {
    use crate::structs::probability_model::FrequentistModel;

    // 90%+ bias must shrink below the raw bit count
    let bits: Vec<bool> = (0..100).map(|i| i % 10 != 0).collect();

    let mut encoder = CabacEncoder::new();
    let mut model = FrequentistModel::new();
    for &bit in bits.iter() {
        encoder.encode_bit(bit, &mut model);
    }
    let stream = encoder.end(false);
    assert!(stream.len() < bits.len());
}
