/*---------------------------------------------------------------------------------------------
 *  Copyright (c) the mico project authors. All rights reserved.
 *  Licensed under the Apache License, Version 2.0.
 *--------------------------------------------------------------------------------------------*/

use std::fmt::{Display, Formatter};

/// Classification of everything that can go wrong inside the codec. Encoder
/// failures are programmer errors and abort the call; decoder failures abort
/// the current block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Unsupported dimensionality, zero block size, or a declared per-block
    /// byte count that does not match the payload.
    BadHeader,
    /// The decoder observed a flag state not in the permitted set for the
    /// current region.
    InvalidFlag,
    /// The decoder's arithmetic state became inconsistent
    /// (`current` outside `[low, high]`), which indicates corrupt input.
    Underflow,
    /// A framed quantity does not fit its field: lower bitplane > 31,
    /// more than 255 levels, block size > 65535, dimension > 2^32.
    Overflow,
}

impl Display for ExitCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error type for MICO/MULE coding operations, carrying an `ExitCode` so
/// callers can dispatch on the failure class.
#[derive(Debug, Clone)]
pub struct MicoError {
    exit_code: ExitCode,
    message: String,
}

impl MicoError {
    pub fn new(exit_code: ExitCode, message: &str) -> MicoError {
        MicoError {
            exit_code,
            message: message.to_owned(),
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for MicoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.exit_code, self.message)
    }
}

impl std::error::Error for MicoError {}
