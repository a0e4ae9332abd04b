//! Behavior slots
//!
//! A model's behavior is split into eight named slots: how it is built
//! (`construct`), invoked (`apply`), how weights move in and out
//! (`weights_to_model`, `model_to_weights`), how versions are diffed and
//! merged (`calc_delta`, `apply_delta`, `weight_copy`), and an optional
//! training hook (`incremental_learn`).
//!
//! A [`Slot`] pairs the callable with optional provenance: the
//! [`CapabilityRef`] naming the registered implementation it came from.
//! Capturing a slot yields a [`CodeUnit`] — a portable capability
//! reference when provenance is known, or the process-local handle
//! itself otherwise. Resolution runs against a
//! [`CapabilityRegistry`](crate::registry::CapabilityRegistry), the
//! locally linked implementation set of the receiving environment; an
//! implementation that is not registered there cannot be reconstructed.

mod set;
mod unit;

pub use set::{SlotSet, SlotSetBuilder};
pub use unit::{CapabilityRef, CodeUnit, Slot};

use crate::envelope::{ModelEnvelope, RuntimeInstance};
use crate::error::Result;
use crate::weights::WeightTensor;
use serde::{Deserialize, Serialize};

/// Builds a fresh runtime instance; no side effects outside the returned value.
pub type ConstructFn = dyn Fn() -> Result<RuntimeInstance>;

/// Runs the model on one input; must not mutate envelope weights.
pub type ApplyFn = dyn Fn(&RuntimeInstance, &WeightTensor) -> Result<WeightTensor>;

/// Loads a weight sequence into the runtime instance in place.
pub type WeightsToModelFn = dyn Fn(&mut RuntimeInstance, &[WeightTensor]) -> Result<()>;

/// Reads the current weight sequence out of the runtime instance; pure.
pub type ModelToWeightsFn = dyn Fn(&RuntimeInstance) -> Result<Vec<WeightTensor>>;

/// Computes a delta envelope `lhs - rhs`, optionally sparsified by a threshold.
pub type CalcDeltaFn =
    dyn Fn(&ModelEnvelope, &ModelEnvelope, Option<f32>) -> Result<ModelEnvelope>;

/// Merges two envelopes positionally: `lhs + rhs`.
pub type ApplyDeltaFn = dyn Fn(&ModelEnvelope, &ModelEnvelope) -> Result<ModelEnvelope>;

/// Duplicates a weight sequence with no storage aliasing.
pub type WeightCopyFn = dyn Fn(&[WeightTensor]) -> Result<Vec<WeightTensor>>;

/// Optional incremental training step over (inputs, outputs, batch_size, min_samples).
pub type IncrementalLearnFn =
    dyn Fn(&mut RuntimeInstance, &[WeightTensor], &[WeightTensor], usize, usize) -> Result<()>;

/// The fixed set of behavior slot names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    Construct,
    Apply,
    WeightsToModel,
    ModelToWeights,
    CalcDelta,
    ApplyDelta,
    WeightCopy,
    IncrementalLearn,
}

impl SlotKind {
    /// Every slot kind, in canonical order.
    pub const ALL: [SlotKind; 8] = [
        SlotKind::Construct,
        SlotKind::Apply,
        SlotKind::WeightsToModel,
        SlotKind::ModelToWeights,
        SlotKind::CalcDelta,
        SlotKind::ApplyDelta,
        SlotKind::WeightCopy,
        SlotKind::IncrementalLearn,
    ];

    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotKind::Construct => "construct",
            SlotKind::Apply => "apply",
            SlotKind::WeightsToModel => "weights_to_model",
            SlotKind::ModelToWeights => "model_to_weights",
            SlotKind::CalcDelta => "calc_delta",
            SlotKind::ApplyDelta => "apply_delta",
            SlotKind::WeightCopy => "weight_copy",
            SlotKind::IncrementalLearn => "incremental_learn",
        }
    }

    /// Parse a canonical wire name.
    pub fn from_name(name: &str) -> Option<SlotKind> {
        Self::ALL.iter().copied().find(|k| k.as_str() == name)
    }

    /// Whether an envelope can exist without this slot.
    pub fn is_optional(&self) -> bool {
        matches!(self, SlotKind::IncrementalLearn)
    }
}

impl std::fmt::Display for SlotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
