//! The full slot family carried by an envelope

use super::unit::Slot;
use super::{
    ApplyDeltaFn, ApplyFn, CalcDeltaFn, ConstructFn, IncrementalLearnFn, ModelToWeightsFn,
    SlotKind, WeightCopyFn, WeightsToModelFn,
};
use crate::envelope::{ModelEnvelope, RuntimeInstance};
use crate::error::{Error, Result};
use crate::weights::WeightTensor;
use std::sync::Arc;

/// The eight behavior slots of one model.
///
/// Cloning a slot set shares the underlying callables; the set itself is
/// immutable once built.
#[derive(Clone, Debug)]
pub struct SlotSet {
    pub(crate) construct: Slot<ConstructFn>,
    pub(crate) apply: Slot<ApplyFn>,
    pub(crate) weights_to_model: Slot<WeightsToModelFn>,
    pub(crate) model_to_weights: Slot<ModelToWeightsFn>,
    pub(crate) calc_delta: Slot<CalcDeltaFn>,
    pub(crate) apply_delta: Slot<ApplyDeltaFn>,
    pub(crate) weight_copy: Slot<WeightCopyFn>,
    pub(crate) incremental_learn: Option<Slot<IncrementalLearnFn>>,
}

impl SlotSet {
    /// Start building a slot set from closures.
    ///
    /// Slots built this way carry no provenance and will not survive a
    /// codec round trip; use
    /// [`CapabilityRegistry::slot_set`](crate::registry::CapabilityRegistry::slot_set)
    /// for portable envelopes.
    pub fn builder() -> SlotSetBuilder {
        SlotSetBuilder::default()
    }

    /// Assemble from already-resolved slots.
    pub(crate) fn assemble(
        construct: Slot<ConstructFn>,
        apply: Slot<ApplyFn>,
        weights_to_model: Slot<WeightsToModelFn>,
        model_to_weights: Slot<ModelToWeightsFn>,
        calc_delta: Slot<CalcDeltaFn>,
        apply_delta: Slot<ApplyDeltaFn>,
        weight_copy: Slot<WeightCopyFn>,
        incremental_learn: Option<Slot<IncrementalLearnFn>>,
    ) -> Self {
        Self {
            construct,
            apply,
            weights_to_model,
            model_to_weights,
            calc_delta,
            apply_delta,
            weight_copy,
            incremental_learn,
        }
    }

    pub fn construct(&self) -> &Slot<ConstructFn> {
        &self.construct
    }

    pub fn apply(&self) -> &Slot<ApplyFn> {
        &self.apply
    }

    pub fn weights_to_model(&self) -> &Slot<WeightsToModelFn> {
        &self.weights_to_model
    }

    pub fn model_to_weights(&self) -> &Slot<ModelToWeightsFn> {
        &self.model_to_weights
    }

    pub fn calc_delta(&self) -> &Slot<CalcDeltaFn> {
        &self.calc_delta
    }

    pub fn apply_delta(&self) -> &Slot<ApplyDeltaFn> {
        &self.apply_delta
    }

    pub fn weight_copy(&self) -> &Slot<WeightCopyFn> {
        &self.weight_copy
    }

    pub fn incremental_learn(&self) -> Option<&Slot<IncrementalLearnFn>> {
        self.incremental_learn.as_ref()
    }

    /// Whether the optional training slot is present.
    pub fn supports_incremental_learn(&self) -> bool {
        self.incremental_learn.is_some()
    }
}

/// Builder for ad-hoc, in-process slot sets.
///
/// `construct`, `apply`, `weights_to_model`, and `model_to_weights` are
/// required; the delta family defaults to the positional implementations
/// in [`delta`](crate::delta); `incremental_learn` is optional.
#[derive(Default)]
pub struct SlotSetBuilder {
    construct: Option<Slot<ConstructFn>>,
    apply: Option<Slot<ApplyFn>>,
    weights_to_model: Option<Slot<WeightsToModelFn>>,
    model_to_weights: Option<Slot<ModelToWeightsFn>>,
    calc_delta: Option<Slot<CalcDeltaFn>>,
    apply_delta: Option<Slot<ApplyDeltaFn>>,
    weight_copy: Option<Slot<WeightCopyFn>>,
    incremental_learn: Option<Slot<IncrementalLearnFn>>,
}

impl SlotSetBuilder {
    pub fn construct(mut self, f: impl Fn() -> Result<RuntimeInstance> + 'static) -> Self {
        self.construct = Some(Slot::anonymous(Arc::new(f)));
        self
    }

    pub fn apply(
        mut self,
        f: impl Fn(&RuntimeInstance, &WeightTensor) -> Result<WeightTensor> + 'static,
    ) -> Self {
        self.apply = Some(Slot::anonymous(Arc::new(f)));
        self
    }

    pub fn weights_to_model(
        mut self,
        f: impl Fn(&mut RuntimeInstance, &[WeightTensor]) -> Result<()> + 'static,
    ) -> Self {
        self.weights_to_model = Some(Slot::anonymous(Arc::new(f)));
        self
    }

    pub fn model_to_weights(
        mut self,
        f: impl Fn(&RuntimeInstance) -> Result<Vec<WeightTensor>> + 'static,
    ) -> Self {
        self.model_to_weights = Some(Slot::anonymous(Arc::new(f)));
        self
    }

    pub fn calc_delta(
        mut self,
        f: impl Fn(&ModelEnvelope, &ModelEnvelope, Option<f32>) -> Result<ModelEnvelope> + 'static,
    ) -> Self {
        self.calc_delta = Some(Slot::anonymous(Arc::new(f)));
        self
    }

    pub fn apply_delta(
        mut self,
        f: impl Fn(&ModelEnvelope, &ModelEnvelope) -> Result<ModelEnvelope> + 'static,
    ) -> Self {
        self.apply_delta = Some(Slot::anonymous(Arc::new(f)));
        self
    }

    pub fn weight_copy(
        mut self,
        f: impl Fn(&[WeightTensor]) -> Result<Vec<WeightTensor>> + 'static,
    ) -> Self {
        self.weight_copy = Some(Slot::anonymous(Arc::new(f)));
        self
    }

    pub fn incremental_learn(
        mut self,
        f: impl Fn(&mut RuntimeInstance, &[WeightTensor], &[WeightTensor], usize, usize) -> Result<()>
            + 'static,
    ) -> Self {
        self.incremental_learn = Some(Slot::anonymous(Arc::new(f)));
        self
    }

    pub fn build(self) -> Result<SlotSet> {
        Ok(SlotSet {
            construct: self
                .construct
                .ok_or(Error::MissingSlot(SlotKind::Construct))?,
            apply: self.apply.ok_or(Error::MissingSlot(SlotKind::Apply))?,
            weights_to_model: self
                .weights_to_model
                .ok_or(Error::MissingSlot(SlotKind::WeightsToModel))?,
            model_to_weights: self
                .model_to_weights
                .ok_or(Error::MissingSlot(SlotKind::ModelToWeights))?,
            calc_delta: self
                .calc_delta
                .unwrap_or_else(crate::delta::default_calc_delta_slot),
            apply_delta: self
                .apply_delta
                .unwrap_or_else(crate::delta::default_apply_delta_slot),
            weight_copy: self
                .weight_copy
                .unwrap_or_else(crate::delta::default_weight_copy_slot),
            incremental_learn: self.incremental_learn,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::DEFAULT_CAPABILITY_ID;

    fn minimal_builder() -> SlotSetBuilder {
        SlotSet::builder()
            .construct(|| Ok(RuntimeInstance::new(Vec::<WeightTensor>::new())))
            .apply(|_, input| Ok(input.deep_copy()))
            .weights_to_model(|runtime, weights| {
                *runtime
                    .downcast_mut::<Vec<WeightTensor>>()
                    .ok_or_else(|| Error::Slot("unexpected runtime type".into()))? =
                    weights.to_vec();
                Ok(())
            })
            .model_to_weights(|runtime| {
                Ok(runtime
                    .downcast_ref::<Vec<WeightTensor>>()
                    .ok_or_else(|| Error::Slot("unexpected runtime type".into()))?
                    .clone())
            })
    }

    #[test]
    fn test_builder_fills_delta_defaults() {
        let slots = minimal_builder().build().unwrap();

        // Defaults come from the crate's built-in capability, so they
        // carry provenance and survive a codec round trip.
        assert_eq!(
            slots.calc_delta().provenance().unwrap().id,
            DEFAULT_CAPABILITY_ID
        );
        assert_eq!(
            slots.apply_delta().provenance().unwrap().id,
            DEFAULT_CAPABILITY_ID
        );
        assert_eq!(
            slots.weight_copy().provenance().unwrap().id,
            DEFAULT_CAPABILITY_ID
        );
        assert!(!slots.supports_incremental_learn());
    }

    #[test]
    fn test_builder_rejects_missing_required_slot() {
        let result = SlotSet::builder()
            .construct(|| Ok(RuntimeInstance::new(())))
            .build();

        assert!(matches!(
            result,
            Err(Error::MissingSlot(SlotKind::Apply))
        ));
    }

    #[test]
    fn test_builder_slots_are_anonymous() {
        let slots = minimal_builder().build().unwrap();
        assert!(slots.construct().provenance().is_none());
        assert!(!slots.construct().capture().is_portable());
    }

    #[test]
    fn test_incremental_learn_is_optional() {
        let with = minimal_builder()
            .incremental_learn(|_, _, _, _, _| Ok(()))
            .build()
            .unwrap();
        assert!(with.supports_incremental_learn());

        let without = minimal_builder().build().unwrap();
        assert!(without.incremental_learn().is_none());
    }
}
