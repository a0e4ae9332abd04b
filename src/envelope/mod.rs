//! Model envelopes
//!
//! A [`ModelEnvelope`] binds a model's identity, its behavior slots, and
//! its exclusively owned runtime instance. Every operation on the model
//! goes through the envelope, which dispatches to the matching slot.
//!
//! Identity (`model_id`) is fixed at creation and propagates unchanged
//! through copies and delta operations; the runtime instance is mutable
//! only through the slots and lives exactly as long as the envelope.

mod runtime;

pub use runtime::RuntimeInstance;

use crate::codec;
use crate::error::{Error, Result};
use crate::registry::CapabilityRegistry;
use crate::slot::SlotSet;
use crate::weights::WeightTensor;
use std::io::{Read, Write};

/// The portable unit binding identity, behavior slots, and weights.
pub struct ModelEnvelope {
    model_id: String,
    timestamp_id: String,
    slots: SlotSet,
    runtime: RuntimeInstance,
}

impl ModelEnvelope {
    /// Create an envelope and build its runtime instance.
    ///
    /// Construction is all-or-nothing: if the construct slot fails, no
    /// envelope exists.
    pub fn new(
        model_id: impl Into<String>,
        timestamp_id: impl Into<String>,
        slots: SlotSet,
    ) -> Result<Self> {
        let runtime = (slots.construct().func())()?;
        Ok(Self {
            model_id: model_id.into(),
            timestamp_id: timestamp_id.into(),
            slots,
            runtime,
        })
    }

    /// Create an envelope and load initial weights into it.
    pub fn with_weights(
        model_id: impl Into<String>,
        timestamp_id: impl Into<String>,
        slots: SlotSet,
        weights: &[WeightTensor],
    ) -> Result<Self> {
        let mut envelope = Self::new(model_id, timestamp_id, slots)?;
        envelope.set_weights(weights)?;
        Ok(envelope)
    }

    /// Opaque identity; equality gates delta operations.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Opaque version tag, passed through unchanged.
    pub fn timestamp_id(&self) -> &str {
        &self.timestamp_id
    }

    /// The behavior slots.
    pub fn slots(&self) -> &SlotSet {
        &self.slots
    }

    /// The runtime instance (read-only; mutation goes through slots).
    pub fn runtime(&self) -> &RuntimeInstance {
        &self.runtime
    }

    /// Rebuild the runtime instance from scratch, dropping the old one.
    pub fn construct(&mut self) -> Result<()> {
        self.runtime = (self.slots.construct().func())()?;
        Ok(())
    }

    /// Load a weight sequence into the runtime instance in place.
    pub fn set_weights(&mut self, weights: &[WeightTensor]) -> Result<()> {
        (self.slots.weights_to_model().func())(&mut self.runtime, weights)
    }

    /// Read the current weight sequence out of the runtime instance.
    pub fn get_weights(&self) -> Result<Vec<WeightTensor>> {
        (self.slots.model_to_weights().func())(&self.runtime)
    }

    /// Run the model on one input.
    pub fn apply(&self, input: &WeightTensor) -> Result<WeightTensor> {
        (self.slots.apply().func())(&self.runtime, input)
    }

    /// Run one incremental training step, if the model supports it.
    pub fn incremental_learn(
        &mut self,
        inputs: &[WeightTensor],
        outputs: &[WeightTensor],
        batch_size: usize,
        min_samples: usize,
    ) -> Result<()> {
        let slot = self
            .slots
            .incremental_learn()
            .ok_or(Error::UnsupportedOperation("incremental_learn"))?;
        (slot.func())(&mut self.runtime, inputs, outputs, batch_size, min_samples)
    }

    /// A new envelope with the same identity and slots but a freshly
    /// constructed runtime instance (default weights).
    pub fn get_empty_copy(&self) -> Result<ModelEnvelope> {
        ModelEnvelope::new(
            self.model_id.clone(),
            self.timestamp_id.clone(),
            self.slots.clone(),
        )
    }

    /// A full copy: empty copy plus a deep copy of the current weights.
    ///
    /// No weight storage is shared with this envelope.
    pub fn copy(&self) -> Result<ModelEnvelope> {
        let weights = self.get_weights()?;
        let copied = (self.slots.weight_copy().func())(&weights)?;
        let mut out = self.get_empty_copy()?;
        out.set_weights(&copied)?;
        Ok(out)
    }

    /// Positional weight difference against another same-identity envelope.
    ///
    /// The result is a diff artifact: its weights are `self - other`, not
    /// a trained state, so it must not be applied as a normal model. With
    /// a threshold, small delta elements are zeroed (lossy).
    pub fn calc_delta(
        &self,
        other: &ModelEnvelope,
        threshold: Option<f32>,
    ) -> Result<ModelEnvelope> {
        (self.slots.calc_delta().func())(self, other, threshold)
    }

    /// Positional weight sum against another same-identity envelope.
    ///
    /// Merges a delta into a base, or rebuilds a peer's state from a
    /// shared baseline plus a received delta.
    pub fn apply_delta(&self, other: &ModelEnvelope) -> Result<ModelEnvelope> {
        (self.slots.apply_delta().func())(self, other)
    }

    /// Encode this envelope into a writer.
    pub fn dump<W: Write>(&self, writer: &mut W) -> Result<()> {
        let bytes = codec::encode(self)?;
        writer.write_all(&bytes)?;
        Ok(())
    }

    /// Encode this envelope into a byte vector.
    pub fn dumps(&self) -> Result<Vec<u8>> {
        codec::encode(self)
    }

    /// Decode an envelope from a reader, resolving slots against `registry`.
    pub fn load<R: Read>(reader: &mut R, registry: &CapabilityRegistry) -> Result<ModelEnvelope> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        codec::decode(&bytes, registry)
    }

    /// Decode an envelope from bytes, resolving slots against `registry`.
    pub fn loads(bytes: &[u8], registry: &CapabilityRegistry) -> Result<ModelEnvelope> {
        codec::decode(bytes, registry)
    }
}

impl std::fmt::Debug for ModelEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelEnvelope")
            .field("model_id", &self.model_id)
            .field("timestamp_id", &self.timestamp_id)
            .field(
                "incremental_learn",
                &self.slots.supports_incremental_learn(),
            )
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::SlotSet;

    /// Toy affine model used across envelope tests: weights are held
    /// directly, apply multiplies the input elementwise by the first
    /// tensor.
    fn affine_slots() -> SlotSet {
        SlotSet::builder()
            .construct(|| Ok(RuntimeInstance::new(Vec::<WeightTensor>::new())))
            .apply(|runtime, input| {
                let weights = runtime
                    .downcast_ref::<Vec<WeightTensor>>()
                    .ok_or_else(|| Error::Slot("unexpected runtime type".into()))?;
                let scale = weights
                    .first()
                    .ok_or_else(|| Error::Slot("model has no weights loaded".into()))?;
                Ok(WeightTensor::from_array(
                    input.shape().to_vec(),
                    input.data() * scale.data(),
                ))
            })
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
            .build()
            .unwrap()
    }

    fn envelope_with(values: Vec<Vec<f32>>) -> ModelEnvelope {
        let weights: Vec<WeightTensor> =
            values.into_iter().map(WeightTensor::from_vec).collect();
        ModelEnvelope::with_weights("clf-v1", "t0", affine_slots(), &weights).unwrap()
    }

    #[test]
    fn test_new_runs_construct() {
        let envelope = ModelEnvelope::new("clf-v1", "t0", affine_slots()).unwrap();
        assert_eq!(envelope.model_id(), "clf-v1");
        assert_eq!(envelope.timestamp_id(), "t0");
        assert!(envelope.get_weights().unwrap().is_empty());
    }

    #[test]
    fn test_construction_failure_yields_no_envelope() {
        let slots = SlotSet::builder()
            .construct(|| Err(Error::Slot("backend unavailable".into())))
            .apply(|_, input| Ok(input.deep_copy()))
            .weights_to_model(|_, _| Ok(()))
            .model_to_weights(|_| Ok(vec![]))
            .build()
            .unwrap();

        assert!(ModelEnvelope::new("clf-v1", "t0", slots).is_err());
    }

    #[test]
    fn test_set_get_weights_round_trip() {
        let envelope = envelope_with(vec![vec![1.0, 2.0], vec![3.0]]);
        let weights = envelope.get_weights().unwrap();
        assert_eq!(weights.len(), 2);
        assert_eq!(weights[0].to_vec(), vec![1.0, 2.0]);
        assert_eq!(weights[1].to_vec(), vec![3.0]);
    }

    #[test]
    fn test_construct_resets_runtime_state() {
        let mut envelope = envelope_with(vec![vec![1.0, 2.0]]);
        envelope.construct().unwrap();
        assert!(envelope.get_weights().unwrap().is_empty());
    }

    #[test]
    fn test_apply() {
        let envelope = envelope_with(vec![vec![2.0, 3.0]]);
        let output = envelope
            .apply(&WeightTensor::from_vec(vec![10.0, 10.0]))
            .unwrap();
        assert_eq!(output.to_vec(), vec![20.0, 30.0]);
    }

    #[test]
    fn test_incremental_learn_absent() {
        let mut envelope = envelope_with(vec![vec![1.0]]);
        let result = envelope.incremental_learn(&[], &[], 8, 1);
        assert!(matches!(
            result,
            Err(Error::UnsupportedOperation("incremental_learn"))
        ));
    }

    #[test]
    fn test_empty_copy_keeps_identity_drops_weights() {
        let envelope = envelope_with(vec![vec![1.0, 2.0]]);
        let empty = envelope.get_empty_copy().unwrap();

        assert_eq!(empty.model_id(), "clf-v1");
        assert_eq!(empty.timestamp_id(), "t0");
        assert!(empty.get_weights().unwrap().is_empty());
        // Source is untouched.
        assert_eq!(envelope.get_weights().unwrap()[0].to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_copy_is_isolated() {
        let envelope = envelope_with(vec![vec![1.0, 2.0]]);
        let mut copied = envelope.copy().unwrap();

        // Mutate the copy's weights through its own slots.
        copied
            .set_weights(&[WeightTensor::from_vec(vec![9.0, 9.0])])
            .unwrap();

        assert_eq!(envelope.get_weights().unwrap()[0].to_vec(), vec![1.0, 2.0]);
        assert_eq!(copied.get_weights().unwrap()[0].to_vec(), vec![9.0, 9.0]);
    }
}
