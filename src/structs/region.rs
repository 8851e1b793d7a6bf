/*---------------------------------------------------------------------------------------------
 *  Copyright (c) the mico project authors. All rights reserved.
 *  Licensed under the Apache License, Version 2.0.
 *--------------------------------------------------------------------------------------------*/

use std::ops::Range;

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Axis, Slice};

/// A rectangular sub-block of an N-D array, one half-open index range per
/// axis. Regions address positions in the containing block's absolute
/// coordinates, which is what the level-based MICO addressing requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    ranges: Vec<Range<usize>>,
}

impl Region {
    pub fn new(ranges: Vec<Range<usize>>) -> Self {
        Region { ranges }
    }

    /// The region covering the entire shape.
    pub fn whole(shape: &[usize]) -> Self {
        Region {
            ranges: shape.iter().map(|&s| 0..s).collect(),
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        self.ranges.iter().map(|r| r.end - r.start).collect()
    }

    pub fn size(&self) -> usize {
        self.ranges.iter().map(|r| r.end - r.start).product()
    }

    pub fn is_unit(&self) -> bool {
        self.size() == 1
    }

    /// The corner position with the lowest indices.
    pub fn origin(&self) -> Vec<usize> {
        self.ranges.iter().map(|r| r.start).collect()
    }

    /// Level of the region's first position, `max` of the range starts.
    pub fn start_level(&self) -> usize {
        self.ranges.iter().map(|r| r.start).max().unwrap_or(0)
    }

    /// One past the deepest level touched, `max` of the range ends.
    pub fn stop_level(&self) -> usize {
        self.ranges.iter().map(|r| r.end).max().unwrap_or(0)
    }

    /// Splits into up to `2^n` halves by cutting every axis of length > 1 at
    /// its midpoint. Sub-regions come out in lexicographic order over the
    /// per-axis half indices, the traversal order of the tree coders.
    pub fn split_in_half(&self) -> Vec<Region> {
        let per_axis: Vec<Vec<Range<usize>>> = self
            .ranges
            .iter()
            .map(|r| {
                let half = (r.end - r.start) / 2;
                if half == 0 {
                    vec![r.clone()]
                } else {
                    vec![r.start..r.start + half, r.start + half..r.end]
                }
            })
            .collect();

        return cartesian_regions(&per_axis);
    }

    /// Tiles a shape into regions of at most `tile_size` per axis, keeping
    /// partial tiles at the boundaries, in lexicographic order.
    pub fn tile(shape: &[usize], tile_size: usize) -> Vec<Region> {
        assert!(tile_size > 0, "tile size must be positive");

        let per_axis: Vec<Vec<Range<usize>>> = shape
            .iter()
            .map(|&size| {
                let mut ranges = Vec::new();
                let mut start = 0;
                while start < size {
                    ranges.push(start..(start + tile_size).min(size));
                    start += tile_size;
                }
                ranges
            })
            .collect();

        return cartesian_regions(&per_axis);
    }

    /// Iterates the positions inside the region in lexicographic order.
    pub fn positions(&self) -> RegionPositions {
        RegionPositions {
            ranges: self.ranges.clone(),
            next: if self.size() == 0 {
                None
            } else {
                Some(self.origin())
            },
        }
    }

    pub fn view<'a>(&self, block: &'a ArrayD<i32>) -> ArrayViewD<'a, i32> {
        let mut view = block.view();
        for (axis, range) in self.ranges.iter().enumerate() {
            view.slice_axis_inplace(Axis(axis), Slice::from(range.clone()));
        }
        return view;
    }

    pub fn view_mut<'a>(&self, block: &'a mut ArrayD<i32>) -> ArrayViewMutD<'a, i32> {
        let mut view = block.view_mut();
        for (axis, range) in self.ranges.iter().enumerate() {
            view.slice_axis_inplace(Axis(axis), Slice::from(range.clone()));
        }
        return view;
    }
}

fn cartesian_regions(per_axis: &[Vec<Range<usize>>]) -> Vec<Region> {
    let mut result = vec![Vec::new()];
    for axis_ranges in per_axis {
        let mut next = Vec::with_capacity(result.len() * axis_ranges.len());
        for prefix in &result {
            for r in axis_ranges {
                let mut ranges: Vec<Range<usize>> = prefix.clone();
                ranges.push(r.clone());
                next.push(ranges);
            }
        }
        result = next;
    }
    return result.into_iter().map(Region::new).collect();
}

/// Odometer over the positions of a region.
pub struct RegionPositions {
    ranges: Vec<Range<usize>>,
    next: Option<Vec<usize>>,
}

impl Iterator for RegionPositions {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let current = self.next.clone()?;

        let mut advanced = current.clone();
        let mut axis = self.ranges.len();
        loop {
            if axis == 0 {
                self.next = None;
                break;
            }
            axis -= 1;
            advanced[axis] += 1;
            if advanced[axis] < self.ranges[axis].end {
                self.next = Some(advanced);
                break;
            }
            advanced[axis] = self.ranges[axis].start;
        }

        return Some(current);
    }
}

#[test]
fn test_split_shape_in_half() {
    let region = Region::whole(&[32, 16]);
    let halves = region.split_in_half();
    assert_eq!(
        halves,
        vec![
            Region::new(vec![0..16, 0..8]),
            Region::new(vec![0..16, 8..16]),
            Region::new(vec![16..32, 0..8]),
            Region::new(vec![16..32, 8..16]),
        ]
    );
}

#[test]
fn test_split_nested_slices() {
    let region = Region::new(vec![16..32, 8..16]);
    let halves = region.split_in_half();
    assert_eq!(
        halves,
        vec![
            Region::new(vec![16..24, 8..12]),
            Region::new(vec![16..24, 12..16]),
            Region::new(vec![24..32, 8..12]),
            Region::new(vec![24..32, 12..16]),
        ]
    );
}

#[test]
fn test_split_keeps_unit_axes() {
    let region = Region::whole(&[1, 4]);
    let halves = region.split_in_half();
    assert_eq!(
        halves,
        vec![
            Region::new(vec![0..1, 0..2]),
            Region::new(vec![0..1, 2..4]),
        ]
    );
}

#[test]
fn test_levels() {
    let region = Region::new(vec![2..4, 0..2]);
    assert_eq!(region.start_level(), 2);
    assert_eq!(region.stop_level(), 4);

    assert_eq!(Region::whole(&[4, 5]).start_level(), 0);
    assert_eq!(Region::whole(&[4, 5]).stop_level(), 5);
}

#[test]
fn test_tile_includes_partial_boundary() {
    let tiles = Region::tile(&[10, 4], 4);
    assert_eq!(
        tiles,
        vec![
            Region::new(vec![0..4, 0..4]),
            Region::new(vec![4..8, 0..4]),
            Region::new(vec![8..10, 0..4]),
        ]
    );
}

#[test]
fn test_positions_lexicographic() {
    let region = Region::new(vec![1..3, 0..2]);
    let positions: Vec<Vec<usize>> = region.positions().collect();
    assert_eq!(
        positions,
        vec![vec![1, 0], vec![1, 1], vec![2, 0], vec![2, 1]]
    );
}

#[test]
fn test_view_selects_region() {
    use ndarray::IxDyn;

    let block =
        ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![1, 2, 3, 4, 5, 6]).unwrap();
    let region = Region::new(vec![1..2, 1..3]);
    let view = region.view(&block);
    assert_eq!(view.iter().copied().collect::<Vec<i32>>(), vec![5, 6]);
}
