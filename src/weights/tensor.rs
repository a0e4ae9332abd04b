//! Weight tensor type

use crate::error::{Error, Result};
use ndarray::Array1;

/// A numeric array of arbitrary rank, stored flat with its shape alongside.
///
/// Within an envelope a tensor has no name; it is addressed only by its
/// position in the weight sequence.
#[derive(Clone, PartialEq)]
pub struct WeightTensor {
    shape: Vec<usize>,
    data: Array1<f32>,
}

impl WeightTensor {
    /// Create a tensor from a shape and flat data.
    ///
    /// Fails when the shape does not describe exactly `data.len()` elements.
    pub fn from_parts(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(Error::InvalidShape {
                shape,
                len: data.len(),
            });
        }
        Ok(Self {
            shape,
            data: Array1::from(data),
        })
    }

    /// Create a rank-1 tensor from a vector.
    pub fn from_vec(data: Vec<f32>) -> Self {
        Self {
            shape: vec![data.len()],
            data: Array1::from(data),
        }
    }

    /// Create a tensor of the given shape filled with zeros.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len: usize = shape.iter().product();
        Self {
            shape,
            data: Array1::zeros(len),
        }
    }

    /// Internal constructor for results of shape-validated arithmetic.
    pub(crate) fn from_array(shape: Vec<usize>, data: Array1<f32>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Self { shape, data }
    }

    /// Logical shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the tensor has no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flat view of the element data.
    pub fn data(&self) -> &Array1<f32> {
        &self.data
    }

    /// Mutable flat view of the element data.
    pub fn data_mut(&mut self) -> &mut Array1<f32> {
        &mut self.data
    }

    /// Duplicate this tensor with freshly allocated storage.
    pub fn deep_copy(&self) -> Self {
        Self {
            shape: self.shape.clone(),
            data: self.data.to_owned(),
        }
    }

    /// Copy the elements out into a plain vector.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.to_vec()
    }
}

impl std::fmt::Debug for WeightTensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightTensor")
            .field("shape", &self.shape)
            .field("data", &self.data)
            .finish()
    }
}
