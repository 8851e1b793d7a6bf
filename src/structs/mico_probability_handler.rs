/*---------------------------------------------------------------------------------------------
 *  Copyright (c) the mico project authors. All rights reserved.
 *  Licensed under the Apache License, Version 2.0.
 *--------------------------------------------------------------------------------------------*/

use crate::consts::MAX_BITPLANES;
use crate::structs::probability_model::{FrequentistModel, ProbabilityModel};

/// Context bag for the MICO coder.
///
/// Interior flags draw from two per-bitplane slots: `significant` separates
/// empty regions from coded ones, `split` separates subdivision from full
/// coding. Unit regions use the single `unit` model and the level-bitplane
/// preamble uses `bitplanes`. The per-bitplane arrays are indexed by the
/// region's maximum magnitude bitplane, which can reach 32, hence one slot
/// more than the integer models.
pub struct MicoProbabilityHandler {
    signal: FrequentistModel,
    integer: [FrequentistModel; MAX_BITPLANES],
    unit: FrequentistModel,
    split: [FrequentistModel; MAX_BITPLANES + 1],
    significant: [FrequentistModel; MAX_BITPLANES + 1],
    bitplanes: FrequentistModel,
}

impl Default for MicoProbabilityHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl MicoProbabilityHandler {
    pub fn new() -> Self {
        MicoProbabilityHandler {
            signal: FrequentistModel::new(),
            integer: std::array::from_fn(|_| FrequentistModel::new()),
            unit: FrequentistModel::new(),
            split: std::array::from_fn(|_| FrequentistModel::new()),
            significant: std::array::from_fn(|_| FrequentistModel::new()),
            bitplanes: FrequentistModel::new(),
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
    pub fn unit_model(&mut self) -> &mut FrequentistModel {
        &mut self.unit
    }

    #[inline(always)]
    pub fn split_model(&mut self, bitplane: u32) -> &mut FrequentistModel {
        &mut self.split[bitplane as usize]
    }

    #[inline(always)]
    pub fn significant_model(&mut self, bitplane: u32) -> &mut FrequentistModel {
        &mut self.significant[bitplane as usize]
    }

    #[inline(always)]
    pub fn bitplanes_model(&mut self) -> &mut FrequentistModel {
        &mut self.bitplanes
    }

    fn models_mut(&mut self) -> impl Iterator<Item = &mut FrequentistModel> {
        std::iter::once(&mut self.signal)
            .chain(self.integer.iter_mut())
            .chain(std::iter::once(&mut self.unit))
            .chain(self.split.iter_mut())
            .chain(self.significant.iter_mut())
            .chain(std::iter::once(&mut self.bitplanes))
    }

    fn models(&self) -> impl Iterator<Item = &FrequentistModel> {
        std::iter::once(&self.signal)
            .chain(self.integer.iter())
            .chain(std::iter::once(&self.unit))
            .chain(self.split.iter())
            .chain(self.significant.iter())
            .chain(std::iter::once(&self.bitplanes))
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
fn test_nested_snapshots() {
    let mut handler = MicoProbabilityHandler::new();

    handler.push();
    handler.unit_model().record_bit(true);
    handler.push();
    handler.unit_model().record_bit(true);
    assert_eq!(handler.snapshot_depth(), 2);

    handler.pop();
    assert_eq!(handler.unit_model().frequency(true), 2);
    handler.pop();
    assert_eq!(handler.unit_model().frequency(true), 1);
    assert_eq!(handler.snapshot_depth(), 0);
}

#[test]
fn test_clear_resets_every_model() {
    let mut handler = MicoProbabilityHandler::new();
    handler.bitplanes_model().record_bit(true);
    handler.significant_model(32).record_bit(false);
    handler.push();
    handler.clear();

    assert_eq!(handler.snapshot_depth(), 0);
    assert_eq!(handler.bitplanes_model().total_bits(), 2);
    assert_eq!(handler.significant_model(32).total_bits(), 2);
}
