//! Property tests for the delta algebra

use super::{apply_delta, calc_delta};
use crate::envelope::{ModelEnvelope, RuntimeInstance};
use crate::error::Error;
use crate::slot::SlotSet;
use crate::weights::{zeroed_count, WeightTensor};
use proptest::prelude::*;

fn store_slots() -> SlotSet {
    SlotSet::builder()
        .construct(|| Ok(RuntimeInstance::new(Vec::<WeightTensor>::new())))
        .apply(|_, input| Ok(input.deep_copy()))
        .weights_to_model(|runtime, weights| {
            *runtime
                .downcast_mut::<Vec<WeightTensor>>()
                .ok_or_else(|| Error::Slot("unexpected runtime type".into()))? = weights.to_vec();
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

fn envelope(model_id: &str, values: &[Vec<f32>]) -> ModelEnvelope {
    let weights: Vec<WeightTensor> = values
        .iter()
        .map(|v| WeightTensor::from_vec(v.clone()))
        .collect();
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

/// Two weight sequences with identical per-position tensor lengths.
fn arb_weight_pair() -> impl Strategy<Value = (Vec<Vec<f32>>, Vec<Vec<f32>>)> {
    proptest::collection::vec(
        (1usize..8).prop_flat_map(|n| {
            (
                proptest::collection::vec(-100.0f32..100.0, n),
                proptest::collection::vec(-100.0f32..100.0, n),
            )
        }),
        1..4,
    )
    .prop_map(|pairs| pairs.into_iter().unzip())
}

proptest! {
    #[test]
    fn delta_then_apply_restores_lhs((a_values, b_values) in arb_weight_pair()) {
        let a = envelope("prop-model", &a_values);
        let b = envelope("prop-model", &b_values);

        let delta = calc_delta(&a, &b, None).unwrap();
        let restored = apply_delta(&delta, &b).unwrap();

        let restored_values = weight_values(&restored);
        for (tensor, expected) in restored_values.iter().zip(a_values.iter()) {
            for (&r, &e) in tensor.iter().zip(expected.iter()) {
                prop_assert!((r - e).abs() < 1e-3, "restored {r} != original {e}");
            }
        }
    }

    #[test]
    fn sparsification_is_monotone_in_threshold(
        (a_values, b_values) in arb_weight_pair(),
        t1 in 0.0f32..10.0,
        extra in 0.0f32..10.0,
    ) {
        let t2 = t1 + extra;
        let a = envelope("prop-model", &a_values);
        let b = envelope("prop-model", &b_values);

        let d1 = calc_delta(&a, &b, Some(t1)).unwrap();
        let d2 = calc_delta(&a, &b, Some(t2)).unwrap();

        let z1 = zeroed_count(&d1.get_weights().unwrap());
        let z2 = zeroed_count(&d2.get_weights().unwrap());
        prop_assert!(z1 <= z2, "zeroed count decreased: {z1} at {t1} vs {z2} at {t2}");
    }

    #[test]
    fn identity_guard_ignores_weight_values((a_values, b_values) in arb_weight_pair()) {
        let a = envelope("model-a", &a_values);
        let b = envelope("model-b", &b_values);

        let is_incompatible = matches!(
            calc_delta(&a, &b, None),
            Err(Error::IncompatibleModel { .. })
        );
        prop_assert!(is_incompatible);
    }

    #[test]
    fn delta_preserves_identity_and_shapes((a_values, b_values) in arb_weight_pair()) {
        let a = envelope("prop-model", &a_values);
        let b = envelope("prop-model", &b_values);

        let delta = calc_delta(&a, &b, None).unwrap();
        prop_assert_eq!(delta.model_id(), "prop-model");
        prop_assert_eq!(delta.timestamp_id(), "t0");

        let delta_weights = delta.get_weights().unwrap();
        prop_assert_eq!(delta_weights.len(), a_values.len());
        for (tensor, values) in delta_weights.iter().zip(a_values.iter()) {
            prop_assert_eq!(tensor.len(), values.len());
        }
    }
}
