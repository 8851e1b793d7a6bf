/*---------------------------------------------------------------------------------------------
 *  Copyright (c) the mico project authors. All rights reserved.
 *  Licensed under the Apache License, Version 2.0.
 *--------------------------------------------------------------------------------------------*/

use crate::mico_error::{ExitCode, MicoError};

#[macro_export]
macro_rules! here {
    () => {
        concat!("at ", file!(), ":", line!())
    };
}

pub fn err_exit_code<T>(error_code: ExitCode, message: &str) -> anyhow::Result<T> {
    return Err(anyhow::Error::new(MicoError::new(error_code, message)));
}

#[inline(always)]
pub const fn u32_bit_length(v: u32) -> u32 {
    return 32 - v.leading_zeros();
}

/// Number of magnitude bits needed to represent a coefficient.
#[inline(always)]
pub const fn coefficient_bit_length(v: i32) -> u32 {
    return u32_bit_length(v.unsigned_abs());
}

#[test]
fn test_bit_length() {
    assert_eq!(u32_bit_length(0), 0);
    assert_eq!(u32_bit_length(1), 1);
    assert_eq!(u32_bit_length(2), 2);
    assert_eq!(u32_bit_length(3), 2);
    assert_eq!(u32_bit_length(255), 8);
    assert_eq!(u32_bit_length(256), 9);

    assert_eq!(coefficient_bit_length(-18), 5);
    assert_eq!(coefficient_bit_length(i32::MIN), 32);
}
