//! Positional operations over weight sequences

use super::tensor::WeightTensor;
use crate::error::{Error, Result};

/// Check that two weight sequences can be combined positionally.
///
/// Both the sequence lengths and every per-position shape must match.
pub fn validate_pair(lhs: &[WeightTensor], rhs: &[WeightTensor]) -> Result<()> {
    if lhs.len() != rhs.len() {
        return Err(Error::WeightCountMismatch {
            lhs: lhs.len(),
            rhs: rhs.len(),
        });
    }
    for (position, (l, r)) in lhs.iter().zip(rhs.iter()).enumerate() {
        if l.shape() != r.shape() {
            return Err(Error::ShapeMismatch {
                position,
                lhs: l.shape().to_vec(),
                rhs: r.shape().to_vec(),
            });
        }
    }
    Ok(())
}

/// Per-position difference `lhs[i] - rhs[i]`.
///
/// With a threshold, every element whose absolute value is strictly below
/// it is zeroed, shrinking the update at the cost of exactness.
pub fn diff(
    lhs: &[WeightTensor],
    rhs: &[WeightTensor],
    threshold: Option<f32>,
) -> Result<Vec<WeightTensor>> {
    validate_pair(lhs, rhs)?;
    Ok(lhs
        .iter()
        .zip(rhs.iter())
        .map(|(l, r)| {
            let mut data = l.data() - r.data();
            if let Some(t) = threshold {
                data.mapv_inplace(|v| if v.abs() < t { 0.0 } else { v });
            }
            WeightTensor::from_array(l.shape().to_vec(), data)
        })
        .collect())
}

/// Per-position sum `lhs[i] + rhs[i]`.
pub fn sum(lhs: &[WeightTensor], rhs: &[WeightTensor]) -> Result<Vec<WeightTensor>> {
    validate_pair(lhs, rhs)?;
    Ok(lhs
        .iter()
        .zip(rhs.iter())
        .map(|(l, r)| WeightTensor::from_array(l.shape().to_vec(), l.data() + r.data()))
        .collect())
}

/// Duplicate every tensor in the sequence; no storage is shared with the input.
pub fn deep_copy(weights: &[WeightTensor]) -> Vec<WeightTensor> {
    weights.iter().map(WeightTensor::deep_copy).collect()
}

/// Count elements that are exactly zero across the whole sequence.
///
/// Used to report how much a thresholded delta was sparsified.
pub fn zeroed_count(weights: &[WeightTensor]) -> usize {
    weights
        .iter()
        .map(|t| t.data().iter().filter(|&&v| v == 0.0).count())
        .sum()
}
