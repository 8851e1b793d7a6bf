/*---------------------------------------------------------------------------------------------
 *  Copyright (c) the mico project authors. All rights reserved.
 *  Licensed under the Apache License, Version 2.0.
 *--------------------------------------------------------------------------------------------*/

use anyhow::Result;

use crate::consts::DEFAULT_PRECISION;
use crate::helpers::err_exit_code;
use crate::mico_error::ExitCode;
use crate::structs::bitstream::Bitstream;
use crate::structs::probability_model::ProbabilityModel;

/// Context-adaptive binary arithmetic decoder, the mirror of `CabacEncoder`.
///
/// Consumes the finalized (reversed) stream from its tail. Once the buffer
/// runs dry, zero bits are shifted in, which lets a stream terminate cleanly
/// on its finalize padding.
pub struct CabacDecoder {
    precision: u32,
    full_range: u64,
    half_range: u64,
    quarter_range: u64,
    three_quarter_range: u64,

    low: u64,
    high: u64,
    current: u64,

    buffer: Bitstream,
}

impl Default for CabacDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl CabacDecoder {
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

        CabacDecoder {
            precision,
            full_range,
            half_range,
            quarter_range,
            three_quarter_range: 3 * quarter_range,
            low: 0,
            high: full_range,
            current: 0,
            buffer: Bitstream::new(),
        }
    }

    /// Takes ownership of an encoded stream and loads the first code word.
    pub fn start(&mut self, bits: Bitstream) {
        self.buffer = bits;
        self.low = 0;
        self.high = self.full_range;
        self.current = 0;

        for _ in 0..self.precision {
            let bit = self.buffer.pop().unwrap_or(false);
            self.current = ((self.current << 1) | (bit as u64)) & self.full_range;
        }
    }

    #[inline(always)]
    pub fn decode_bit(&mut self, model: &mut impl ProbabilityModel) -> Result<bool> {
        let range = self.high - self.low;
        let mid = self.low + (range as f64 * model.probability(false)) as u64;

        let bit;
        if self.low <= self.current && self.current <= mid {
            self.high = mid;
            bit = false;
        } else if mid < self.current && self.current <= self.high {
            self.low = mid + 1;
            bit = true;
        } else {
            return err_exit_code(
                ExitCode::Underflow,
                "arithmetic decoder state is inconsistent, input is corrupt",
            );
        }
        model.record_bit(bit);

        self.resolve_scaling();
        return Ok(bit);
    }

    fn resolve_scaling(&mut self) {
        loop {
            if self.high <= self.half_range {
                // settled zero bit, nothing to subtract
            } else if self.low > self.half_range {
                self.high -= self.half_range + 1;
                self.low -= self.half_range + 1;
                self.current -= self.half_range + 1;
            } else if self.low > self.quarter_range && self.high <= self.three_quarter_range {
                self.high -= self.quarter_range + 1;
                self.low -= self.quarter_range + 1;
                self.current -= self.quarter_range + 1;
            } else {
                return;
            }

            let bit = self.buffer.pop().unwrap_or(false);
            self.high = ((self.high << 1) & self.full_range) | 1;
            self.low = (self.low << 1) & self.full_range;
            self.current = ((self.current << 1) & self.full_range) | (bit as u64);
        }
    }
}

#[test]
fn test_mixed_models_round_trip() {
    use crate::structs::cabac_encoder::CabacEncoder;
    use crate::structs::probability_model::FrequentistModel;

    // two interleaved contexts with opposite biases
    let bits: Vec<bool> = (0..300).map(|i| i % 2 == 0).collect();

    let mut encoder = CabacEncoder::new();
    let mut even = FrequentistModel::new();
    let mut odd = FrequentistModel::new();
    for (i, &bit) in bits.iter().enumerate() {
        if i % 2 == 0 {
            encoder.encode_bit(bit, &mut even);
        } else {
            encoder.encode_bit(bit, &mut odd);
        }
    }
    let stream = encoder.end(false);

    let mut decoder = CabacDecoder::new();
    decoder.start(stream);
    let mut even_d = FrequentistModel::new();
    let mut odd_d = FrequentistModel::new();
    for (i, &bit) in bits.iter().enumerate() {
        let decoded = if i % 2 == 0 {
            decoder.decode_bit(&mut even_d).unwrap()
        } else {
            decoder.decode_bit(&mut odd_d).unwrap()
        };
        assert_eq!(decoded, bit);
    }

    assert_eq!(even, even_d);
    assert_eq!(odd, odd_d);
}

#[test]
fn test_exponential_smoothing_round_trip() {
    use crate::structs::cabac_encoder::CabacEncoder;
    use crate::structs::probability_model::ExponentialSmoothingModel;

    // a sudden probability shift, the case the smoothing model is made for
    let bits: Vec<bool> = (0..400).map(|i| i >= 200).collect();

    let mut encoder = CabacEncoder::new();
    let mut model = ExponentialSmoothingModel::new();
    for &bit in bits.iter() {
        encoder.encode_bit(bit, &mut model);
    }
    let stream = encoder.end(true);

    let mut decoder = CabacDecoder::new();
    decoder.start(stream);
    let mut model = ExponentialSmoothingModel::new();
    for &bit in bits.iter() {
        assert_eq!(decoder.decode_bit(&mut model).unwrap(), bit);
    }
}
