/*---------------------------------------------------------------------------------------------
 *  Copyright (c) the mico project authors. All rights reserved.
 *  Licensed under the Apache License, Version 2.0.
 *--------------------------------------------------------------------------------------------*/

use ndarray::{ArrayD, ArrayViewD, Dimension};

use crate::helpers::coefficient_bit_length;

/// Smallest number of magnitude bits that fits every coefficient in the view.
pub fn find_max_bitplane(view: ArrayViewD<'_, i32>) -> u32 {
    view.iter()
        .map(|&v| coefficient_bit_length(v))
        .max()
        .unwrap_or(0)
}

/// True when no coefficient in the view has the top bit of `bitplane` set.
/// Bitplane 0 is vacuously empty: there is no bit below it to test.
pub fn is_bitplane_zero(view: ArrayViewD<'_, i32>, bitplane: u32) -> bool {
    if bitplane == 0 {
        return true;
    }
    let mask = 1u32 << (bitplane - 1);
    return !view.iter().any(|&v| v.unsigned_abs() & mask != 0);
}

/// Level of a coefficient position, `max(p_i)`.
#[inline(always)]
pub fn position_level(position: &[usize]) -> usize {
    position.iter().copied().max().unwrap_or(0)
}

/// Per-level magnitude bitplane table used by MICO.
///
/// The level of a position `p` is `max(p_i)`; a `(4, 5)` block's levels are
/// laid out as
///
/// ```text
/// 0, 1, 2, 3, 4
/// 1, 1, 2, 3, 4
/// 2, 2, 2, 3, 4
/// 3, 3, 3, 3, 4
/// ```
///
/// Entry `l` is the smallest bit count that fits every coefficient at level
/// `l` *or deeper*, which makes the table non-increasing by construction.
/// Lookups past the last level clamp to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelBitplaneTable {
    sizes: Vec<u32>,
}

impl LevelBitplaneTable {
    /// Number of levels of a shape, `max(s_i)`.
    pub fn level_count(shape: &[usize]) -> usize {
        shape.iter().copied().max().unwrap_or(0)
    }

    pub fn compute(block: &ArrayD<i32>) -> Self {
        let levels = Self::level_count(block.shape());
        let mut sizes = vec![0u32; levels];

        for (position, &value) in block.indexed_iter() {
            let level = position.slice().iter().copied().max().unwrap_or(0);
            let level = level.min(levels - 1);
            sizes[level] = sizes[level].max(coefficient_bit_length(value));
        }

        // reverse running maximum turns per-level maxima into
        // "this level or deeper", enforcing monotonicity
        for i in (0..levels.saturating_sub(1)).rev() {
            sizes[i] = sizes[i].max(sizes[i + 1]);
        }

        return LevelBitplaneTable { sizes };
    }

    pub fn from_sizes(sizes: Vec<u32>) -> Self {
        LevelBitplaneTable { sizes }
    }

    pub fn sizes(&self) -> &[u32] {
        &self.sizes
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Bitplane for a level, clamping out-of-table levels to the deepest one.
    pub fn bitplane(&self, level: usize) -> u32 {
        if level >= self.sizes.len() {
            return *self.sizes.last().unwrap_or(&0);
        }
        return self.sizes[level];
    }

    pub fn max_bitplane(&self) -> u32 {
        self.sizes.iter().copied().max().unwrap_or(0)
    }
}

#[cfg(test)]
fn block_2d(rows: &[&[i32]]) -> ArrayD<i32> {
    let shape = [rows.len(), rows[0].len()];
    let data: Vec<i32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
    ArrayD::from_shape_vec(ndarray::IxDyn(&shape), data).unwrap()
}

#[test]
fn test_find_max_bitplane() {
    let block = block_2d(&[&[18, 8], &[-7, 3]]);
    assert_eq!(find_max_bitplane(block.view()), 5);

    let zeros = block_2d(&[&[0, 0], &[0, 0]]);
    assert_eq!(find_max_bitplane(zeros.view()), 0);
}

#[test]
fn test_is_bitplane_zero() {
    let block = block_2d(&[&[18, 8], &[-7, 3]]);
    // 18 has bit 4 set
    assert!(!is_bitplane_zero(block.view(), 5));
    assert!(is_bitplane_zero(block.view(), 6));
    assert!(is_bitplane_zero(block.view(), 0));
}

#[test]
fn test_bitplane_per_level() {
    let block = block_2d(&[
        &[18, 8, 0, 2],
        &[-7, 3, 0, 0],
        &[0, 0, 1, -2],
        &[0, 0, 3, -1],
    ]);
    let table = LevelBitplaneTable::compute(&block);
    assert_eq!(table.sizes(), &[5, 4, 2, 2]);
}

#[test]
fn test_table_clamps_deep_levels() {
    let block = block_2d(&[&[4, 1], &[1, 1]]);
    let table = LevelBitplaneTable::compute(&block);
    assert_eq!(table.bitplane(0), 3);
    assert_eq!(table.bitplane(1), 1);
    assert_eq!(table.bitplane(17), 1);
}

#[test]
fn test_table_of_rectangular_block() {
    // level count follows the longest axis
    let block = block_2d(&[&[1, 0, 0, 9, 0]]);
    let table = LevelBitplaneTable::compute(&block);
    assert_eq!(table.len(), 5);
    assert_eq!(table.sizes(), &[4, 4, 4, 4, 0]);
}
