/*---------------------------------------------------------------------------------------------
 *  Copyright (c) the mico project authors. All rights reserved.
 *  Licensed under the Apache License, Version 2.0.
 *--------------------------------------------------------------------------------------------*/

/// Coefficients are 32-bit signed, so magnitude bitplanes run over [0, 32).
pub const MAX_BITPLANES: usize = 32;

/// The lower bitplane is framed as a 5-bit unsigned integer, so it must fit in [0, 32).
pub const LOWER_BITPLANE_BITS: u32 = 5;

/// Default arithmetic coding precision in bits.
pub const DEFAULT_PRECISION: u32 = 16;

/// Lagrangian used by the quantized MICO variant. The quantization matrix does
/// the rate control there; the tree search only needs a nudge to prefer the
/// cheaper encoding between equal-distortion candidates.
pub const TINY_LAGRANGIAN: f64 = 1e-6;
