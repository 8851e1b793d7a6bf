/*---------------------------------------------------------------------------------------------
 *  Copyright (c) the mico project authors. All rights reserved.
 *  Licensed under the Apache License, Version 2.0.
 *--------------------------------------------------------------------------------------------*/

/// A binary probability model drives one context of the arithmetic coder:
/// it estimates P(0)/P(1), adapts on every observed bit, and can snapshot
/// its state so the optimizers may explore candidate encodings and roll
/// them back.
///
/// Snapshots form a LIFO stack. Every `push` must be balanced by exactly one
/// `pop` (restore) or one `discard` (commit) before the optimizer returns.
pub trait ProbabilityModel {
    /// Updates the model with an observed bit and accrues its estimated cost.
    fn record_bit(&mut self, bit: bool);

    /// Probability of observing `bit` in the current state.
    fn probability(&self, bit: bool) -> f64;

    /// Snapshots the full model state.
    fn push(&mut self);

    /// Restores the most recent snapshot.
    fn pop(&mut self);

    /// Drops the most recent snapshot, keeping the current state.
    fn discard(&mut self);

    /// Resets to the priors and empties the snapshot stack.
    fn clear(&mut self);

    /// Total cost of all observed bits, each priced at the state in force
    /// when it was observed. A local proxy for the coded rate.
    fn total_estimated_rate(&self) -> f64;

    /// Code length of `bit` in the current state, in bits.
    #[inline(always)]
    fn estimate_bit(&self, bit: bool) -> f64 {
        -self.probability(bit).log2()
    }

    /// Returns the cost of `bit` at the state just before the update, then
    /// updates. This ordering matches what the arithmetic coder would emit
    /// under the context in force at that moment.
    #[inline(always)]
    fn record_and_estimate_bit(&mut self, bit: bool) -> f64 {
        let rate = self.estimate_bit(bit);
        self.record_bit(bit);
        return rate;
    }
}

/// Adaptive model backed by plain zero/one counts, both starting at 1.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequentistModel {
    frequency_of_zeros: u64,
    frequency_of_ones: u64,
    accumulated_rate: f64,
    snapshots: Vec<(u64, u64, f64)>,
}

impl Default for FrequentistModel {
    fn default() -> Self {
        Self::new()
    }
}

impl FrequentistModel {
    pub fn new() -> Self {
        FrequentistModel {
            frequency_of_zeros: 1,
            frequency_of_ones: 1,
            accumulated_rate: 0.0,
            snapshots: Vec::new(),
        }
    }

    pub fn with_counts(frequency_of_zeros: u64, frequency_of_ones: u64) -> Self {
        FrequentistModel {
            frequency_of_zeros,
            frequency_of_ones,
            accumulated_rate: 0.0,
            snapshots: Vec::new(),
        }
    }

    #[inline(always)]
    pub fn frequency(&self, bit: bool) -> u64 {
        if bit {
            self.frequency_of_ones
        } else {
            self.frequency_of_zeros
        }
    }

    #[inline(always)]
    pub fn total_bits(&self) -> u64 {
        self.frequency_of_zeros + self.frequency_of_ones
    }

    pub fn snapshot_depth(&self) -> usize {
        self.snapshots.len()
    }
}

impl ProbabilityModel for FrequentistModel {
    #[inline(always)]
    fn record_bit(&mut self, bit: bool) {
        self.accumulated_rate += self.estimate_bit(bit);
        if bit {
            self.frequency_of_ones += 1;
        } else {
            self.frequency_of_zeros += 1;
        }
    }

    #[inline(always)]
    fn probability(&self, bit: bool) -> f64 {
        // an uninitialized side makes both outcomes unratable; callers must
        // not ask for the code length of a zero-probability outcome
        if self.frequency_of_zeros == 0 || self.frequency_of_ones == 0 {
            return 0.0;
        }
        return self.frequency(bit) as f64 / self.total_bits() as f64;
    }

    fn push(&mut self) {
        self.snapshots.push((
            self.frequency_of_zeros,
            self.frequency_of_ones,
            self.accumulated_rate,
        ));
    }

    fn pop(&mut self) {
        let (zeros, ones, rate) = self.snapshots.pop().expect("unbalanced pop");
        self.frequency_of_zeros = zeros;
        self.frequency_of_ones = ones;
        self.accumulated_rate = rate;
    }

    fn discard(&mut self) {
        self.snapshots.pop().expect("unbalanced discard");
    }

    fn clear(&mut self) {
        self.frequency_of_zeros = 1;
        self.frequency_of_ones = 1;
        self.accumulated_rate = 0.0;
        self.snapshots.clear();
    }

    fn total_estimated_rate(&self) -> f64 {
        self.accumulated_rate
    }
}

/// Minimum probability kept after clamping, `2^-16`.
const MIN_PROBABILITY: f64 = 1.0 / 65536.0;

const DEFAULT_SMOOTH_FACTOR: f64 = 0.05;

/// Adaptive model tracking P(1) by exponential smoothing. Reacts to sudden
/// probability shifts faster than the frequentist counts; the counts are
/// still kept for bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialSmoothingModel {
    frequency_of_zeros: u64,
    frequency_of_ones: u64,
    probability_of_ones: f64,
    smooth_factor: f64,
    accumulated_rate: f64,
    snapshots: Vec<(u64, u64, f64, f64, f64)>,
}

impl Default for ExponentialSmoothingModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ExponentialSmoothingModel {
    pub fn new() -> Self {
        Self::with_smooth_factor(DEFAULT_SMOOTH_FACTOR)
    }

    pub fn with_smooth_factor(smooth_factor: f64) -> Self {
        ExponentialSmoothingModel {
            frequency_of_zeros: 1,
            frequency_of_ones: 1,
            probability_of_ones: 0.5,
            smooth_factor,
            accumulated_rate: 0.0,
            snapshots: Vec::new(),
        }
    }
}

impl ProbabilityModel for ExponentialSmoothingModel {
    #[inline(always)]
    fn record_bit(&mut self, bit: bool) {
        self.accumulated_rate += self.estimate_bit(bit);
        if bit {
            self.frequency_of_ones += 1;
        } else {
            self.frequency_of_zeros += 1;
        }

        let new_weight = self.smooth_factor * (bit as u8 as f64);
        let old_weight = (1.0 - self.smooth_factor) * self.probability_of_ones;
        self.probability_of_ones =
            (new_weight + old_weight).clamp(MIN_PROBABILITY, 1.0 - MIN_PROBABILITY);
    }

    #[inline(always)]
    fn probability(&self, bit: bool) -> f64 {
        if bit {
            self.probability_of_ones
        } else {
            1.0 - self.probability_of_ones
        }
    }

    fn push(&mut self) {
        self.snapshots.push((
            self.frequency_of_zeros,
            self.frequency_of_ones,
            self.probability_of_ones,
            self.smooth_factor,
            self.accumulated_rate,
        ));
    }

    fn pop(&mut self) {
        let (zeros, ones, p1, alpha, rate) = self.snapshots.pop().expect("unbalanced pop");
        self.frequency_of_zeros = zeros;
        self.frequency_of_ones = ones;
        self.probability_of_ones = p1;
        self.smooth_factor = alpha;
        self.accumulated_rate = rate;
    }

    fn discard(&mut self) {
        self.snapshots.pop().expect("unbalanced discard");
    }

    fn clear(&mut self) {
        self.frequency_of_zeros = 1;
        self.frequency_of_ones = 1;
        self.probability_of_ones = 0.5;
        self.accumulated_rate = 0.0;
        self.snapshots.clear();
    }

    fn total_estimated_rate(&self) -> f64 {
        self.accumulated_rate
    }
}

#[test]
fn test_frequentist_adapts() {
    let mut model = FrequentistModel::new();
    assert_eq!(model.probability(false), 0.5);

    model.record_bit(false);
    model.record_bit(false);
    model.record_bit(false);
    assert_eq!(model.probability(false), 0.8);
    assert_eq!(model.probability(true), 0.2);

    // the first bit cost exactly one bit, later ones less
    assert!(model.total_estimated_rate() < 3.0);
    assert!(model.total_estimated_rate() > 1.0);
}

#[test]
fn test_push_pop_restores_state() {
    let mut model = FrequentistModel::new();
    model.record_bit(true);

    model.push();
    model.record_bit(true);
    model.record_bit(true);
    assert_eq!(model.frequency(true), 4);

    model.pop();
    assert_eq!(model.frequency(true), 2);
    assert_eq!(model.frequency(false), 1);
    assert_eq!(model.snapshot_depth(), 0);
}

#[test]
fn test_discard_keeps_state() {
    let mut model = FrequentistModel::new();
    model.push();
    model.record_bit(false);
    model.discard();
    assert_eq!(model.frequency(false), 2);
    assert_eq!(model.snapshot_depth(), 0);
}

#[test]
fn test_record_and_estimate_prices_before_update() {
    let mut model = FrequentistModel::new();
    let rate = model.record_and_estimate_bit(true);
    // estimated at p=0.5, i.e. one full bit, even though p changed after
    assert!((rate - 1.0).abs() < 1e-12);
}

#[test]
fn test_uninitialized_side_returns_zero_probability() {
    let model = FrequentistModel::with_counts(0, 5);
    assert_eq!(model.probability(false), 0.0);
    assert_eq!(model.probability(true), 0.0);
}

#[test]
fn test_exponential_smoothing_tracks_shift() {
    let mut model = ExponentialSmoothingModel::new();
    for _ in 0..200 {
        model.record_bit(true);
    }
    assert!(model.probability(true) > 0.95);

    for _ in 0..200 {
        model.record_bit(false);
    }
    assert!(model.probability(false) > 0.95);

    // clamped away from the degenerate endpoints
    assert!(model.probability(true) >= MIN_PROBABILITY);
}

#[test]
fn test_exponential_smoothing_push_pop() {
    let mut model = ExponentialSmoothingModel::new();
    model.record_bit(true);
    let before = model.probability(true);

    model.push();
    for _ in 0..50 {
        model.record_bit(false);
    }
    model.pop();
    assert_eq!(model.probability(true), before);
}

#[test]
fn test_clear_resets_priors() {
    let mut model = ExponentialSmoothingModel::new();
    model.record_bit(true);
    model.push();
    model.clear();
    assert_eq!(model.probability(true), 0.5);

    let mut model = FrequentistModel::new();
    model.record_bit(true);
    model.clear();
    assert_eq!(model.total_bits(), 2);
    assert_eq!(model.total_estimated_rate(), 0.0);
}
