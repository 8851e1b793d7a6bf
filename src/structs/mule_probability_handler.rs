/*---------------------------------------------------------------------------------------------
 *  Copyright (c) the mico project authors. All rights reserved.
 *  Licensed under the Apache License, Version 2.0.
 *--------------------------------------------------------------------------------------------*/

use crate::consts::MAX_BITPLANES;
use crate::structs::probability_model::{FrequentistModel, ProbabilityModel};

/// The bag of named contexts the MULE coder draws from: one sign model, one
/// integer model per magnitude bitplane, and a two-slot flag model per
/// bitplane (first slot separates `Z` from the rest, second separates `L`
/// from `S`).
///
/// `push`/`pop`/`discard`/`clear` fan out to every model so the optimizer
/// can treat the whole bag as one snapshot.
pub struct MuleProbabilityHandler {
    signal: FrequentistModel,
    integer: [FrequentistModel; MAX_BITPLANES],
    flags: [[FrequentistModel; 2]; MAX_BITPLANES],
}

impl Default for MuleProbabilityHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl MuleProbabilityHandler {
    pub fn new() -> Self {
        MuleProbabilityHandler {
            signal: FrequentistModel::new(),
            integer: std::array::from_fn(|_| FrequentistModel::new()),
            flags: std::array::from_fn(|_| std::array::from_fn(|_| FrequentistModel::new())),
        }
    }

    #[inline(always)]
    pub fn signal_model(&mut self) -> &mut FrequentistModel {
        &mut self.signal
    }

    #[inline(always)]
    pub fn int_model(&mut self, bitplane: u32) -> &mut FrequentistModel {
        &mut self.integer[bitplane as usize]
    }

    #[inline(always)]
    pub fn flag_model(&mut self, bitplane: u32, position: usize) -> &mut FrequentistModel {
        assert!(position < 2);
        &mut self.flags[bitplane as usize][position]
    }

    fn models_mut(&mut self) -> impl Iterator<Item = &mut FrequentistModel> {
        std::iter::once(&mut self.signal)
            .chain(self.integer.iter_mut())
            .chain(self.flags.iter_mut().flatten())
    }

    fn models(&self) -> impl Iterator<Item = &FrequentistModel> {
        std::iter::once(&self.signal)
            .chain(self.integer.iter())
            .chain(self.flags.iter().flatten())
    }

    pub fn push(&mut self) {
        for model in self.models_mut() {
            model.push();
        }
    }

    pub fn pop(&mut self) {
        for model in self.models_mut() {
            model.pop();
        }
    }

    pub fn discard(&mut self) {
        for model in self.models_mut() {
            model.discard();
        }
    }

    pub fn clear(&mut self) {
        for model in self.models_mut() {
            model.clear();
        }
    }

    /// Deepest snapshot stack across all models; zero when fully balanced.
    pub fn snapshot_depth(&self) -> usize {
        self.models()
            .map(|m| m.snapshot_depth())
            .max()
            .unwrap_or(0)
    }
}

#[test]
fn test_handler_snapshots_fan_out() {
    let mut handler = MuleProbabilityHandler::new();
    handler.int_model(3).record_bit(true);
    handler.push();
    assert_eq!(handler.snapshot_depth(), 1);

    handler.int_model(3).record_bit(true);
    handler.flag_model(5, 1).record_bit(false);
    handler.pop();

    assert_eq!(handler.snapshot_depth(), 0);
    assert_eq!(handler.int_model(3).frequency(true), 2);
    assert_eq!(handler.flag_model(5, 1).frequency(false), 1);
}

#[test]
fn test_handler_discard_commits() {
    let mut handler = MuleProbabilityHandler::new();
    handler.push();
    handler.signal_model().record_bit(true);
    handler.discard();

    assert_eq!(handler.snapshot_depth(), 0);
    assert_eq!(handler.signal_model().frequency(true), 2);
}
