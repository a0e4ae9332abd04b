//! Weight delta engine
//!
//! Default implementations of the delta-family slots: positional weight
//! difference, positional merge, and deep weight copy. These are the
//! implementations a [`SlotSetBuilder`](crate::slot::SlotSetBuilder)
//! falls back to and that every
//! [`CapabilityRegistry`](crate::registry::CapabilityRegistry) registers
//! under [`DEFAULT_CAPABILITY_ID`].
//!
//! `apply_delta(calc_delta(a, b, None), b)` reproduces `a` exactly; with
//! a sparsification threshold the relation is approximate.

#[cfg(test)]
mod property_tests;

use crate::envelope::ModelEnvelope;
use crate::error::{Error, Result};
use crate::slot::{ApplyDeltaFn, CalcDeltaFn, CapabilityRef, Slot, WeightCopyFn};
use crate::weights::{self, WeightTensor};
use std::sync::Arc;

/// Capability id the built-in delta implementations are registered under.
pub const DEFAULT_CAPABILITY_ID: &str = "envolver.defaults";

fn default_ref() -> CapabilityRef {
    CapabilityRef::new(DEFAULT_CAPABILITY_ID, env!("CARGO_PKG_VERSION"))
}

fn check_identity(lhs: &ModelEnvelope, rhs: &ModelEnvelope) -> Result<()> {
    if lhs.model_id() != rhs.model_id() {
        return Err(Error::IncompatibleModel {
            lhs: lhs.model_id().to_string(),
            rhs: rhs.model_id().to_string(),
        });
    }
    Ok(())
}

/// Compute the weight delta `lhs - rhs` between two same-identity envelopes.
///
/// With a threshold, delta elements whose absolute value falls below it
/// are zeroed before the result is loaded, shrinking the transmitted
/// update at the cost of exact reconstruction.
///
/// The result is a diff artifact carried in an empty copy of `lhs`; it is
/// not a usable standalone model.
pub fn calc_delta(
    lhs: &ModelEnvelope,
    rhs: &ModelEnvelope,
    threshold: Option<f32>,
) -> Result<ModelEnvelope> {
    check_identity(lhs, rhs)?;
    let lhs_weights = lhs.get_weights()?;
    let rhs_weights = rhs.get_weights()?;
    let delta = weights::diff(&lhs_weights, &rhs_weights, threshold)?;

    let mut out = lhs.get_empty_copy()?;
    out.set_weights(&delta)?;
    Ok(out)
}

/// Merge two same-identity envelopes positionally: `lhs + rhs`.
///
/// Used both to fold a peer's delta into a base model and to rebuild a
/// peer's state from a shared baseline plus a received delta.
pub fn apply_delta(lhs: &ModelEnvelope, rhs: &ModelEnvelope) -> Result<ModelEnvelope> {
    check_identity(lhs, rhs)?;
    let lhs_weights = lhs.get_weights()?;
    let rhs_weights = rhs.get_weights()?;
    let merged = weights::sum(&lhs_weights, &rhs_weights)?;

    let mut out = lhs.get_empty_copy()?;
    out.set_weights(&merged)?;
    Ok(out)
}

/// Duplicate a weight sequence; no storage is shared with the input.
pub fn weight_copy(weights: &[WeightTensor]) -> Result<Vec<WeightTensor>> {
    Ok(weights::deep_copy(weights))
}

pub(crate) fn default_calc_delta_slot() -> Slot<CalcDeltaFn> {
    Slot::provenanced(Arc::new(|l, r, t| calc_delta(l, r, t)), default_ref())
}

pub(crate) fn default_apply_delta_slot() -> Slot<ApplyDeltaFn> {
    Slot::provenanced(Arc::new(|l, r| apply_delta(l, r)), default_ref())
}

pub(crate) fn default_weight_copy_slot() -> Slot<WeightCopyFn> {
    Slot::provenanced(Arc::new(|w: &[WeightTensor]| weight_copy(w)), default_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::RuntimeInstance;
    use crate::slot::SlotSet;
    use crate::weights::zeroed_count;

    fn store_slots() -> SlotSet {
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
            .build()
            .unwrap()
    }

    fn envelope(model_id: &str, values: Vec<Vec<f32>>) -> ModelEnvelope {
        let weights: Vec<WeightTensor> =
            values.into_iter().map(WeightTensor::from_vec).collect();
        ModelEnvelope::with_weights(model_id, "t0", store_slots(), &weights).unwrap()
    }

    fn weight_values(envelope: &ModelEnvelope) -> Vec<Vec<f32>> {
        envelope
            .get_weights()
            .unwrap()
            .iter()
            .map(WeightTensor::to_vec)
            .collect()
    }

    #[test]
    fn test_calc_delta_reference_scenario() {
        let a = envelope("clf-v1", vec![vec![1.0, 2.0], vec![3.0]]);
        let b = envelope("clf-v1", vec![vec![0.5, 2.0], vec![3.0]]);

        let delta = calc_delta(&a, &b, None).unwrap();

        assert_eq!(delta.model_id(), "clf-v1");
        assert_eq!(weight_values(&delta), vec![vec![0.5, 0.0], vec![0.0]]);
    }

    #[test]
    fn test_apply_delta_restores_lhs() {
        let a = envelope("clf-v1", vec![vec![1.0, 2.0], vec![3.0]]);
        let b = envelope("clf-v1", vec![vec![0.5, 2.0], vec![3.0]]);

        let delta = calc_delta(&a, &b, None).unwrap();
        let restored = apply_delta(&delta, &b).unwrap();

        assert_eq!(weight_values(&restored), weight_values(&a));
    }

    #[test]
    fn test_threshold_zeroes_small_delta() {
        let a = envelope("clf-v1", vec![vec![1.0, 2.0], vec![3.0]]);
        let b = envelope("clf-v1", vec![vec![0.5, 2.0], vec![3.0]]);

        let delta = calc_delta(&a, &b, Some(0.6)).unwrap();

        assert_eq!(weight_values(&delta), vec![vec![0.0, 0.0], vec![0.0]]);
    }

    #[test]
    fn test_identity_guard() {
        let a = envelope("clf-v1", vec![vec![1.0]]);
        let b = envelope("clf-v2", vec![vec![1.0]]);

        assert!(matches!(
            calc_delta(&a, &b, None),
            Err(Error::IncompatibleModel { .. })
        ));
        assert!(matches!(
            apply_delta(&a, &b),
            Err(Error::IncompatibleModel { .. })
        ));
    }

    #[test]
    fn test_shape_guard() {
        let a = envelope("clf-v1", vec![vec![1.0, 2.0]]);
        let b = envelope("clf-v1", vec![vec![1.0]]);

        assert!(matches!(
            calc_delta(&a, &b, None),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_delta_weights_do_not_alias_inputs() {
        let a = envelope("clf-v1", vec![vec![1.0, 2.0]]);
        let b = envelope("clf-v1", vec![vec![0.5, 0.5]]);

        let delta = calc_delta(&a, &b, None).unwrap();
        let mut delta_weights = delta.get_weights().unwrap();
        delta_weights[0].data_mut()[0] = 100.0;

        assert_eq!(weight_values(&a), vec![vec![1.0, 2.0]]);
    }

    #[test]
    fn test_weight_copy_no_aliasing() {
        let original = vec![WeightTensor::from_vec(vec![1.0, 2.0])];
        let mut copied = weight_copy(&original).unwrap();
        copied[0].data_mut()[0] = -1.0;
        assert_eq!(original[0].to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_sparsification_reports_more_zeroes() {
        let a = envelope("clf-v1", vec![vec![1.0, 0.3, 0.05, -0.4]]);
        let b = envelope("clf-v1", vec![vec![0.0, 0.0, 0.0, 0.0]]);

        let exact = calc_delta(&a, &b, None).unwrap();
        let sparse = calc_delta(&a, &b, Some(0.35)).unwrap();

        let exact_zeroes = zeroed_count(&exact.get_weights().unwrap());
        let sparse_zeroes = zeroed_count(&sparse.get_weights().unwrap());
        assert!(sparse_zeroes > exact_zeroes);
        assert_eq!(
            weight_values(&sparse),
            vec![vec![1.0, 0.0, 0.0, -0.4]]
        );
    }
}
