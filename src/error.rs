//! Error types for Envolver

use crate::slot::SlotKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("incompatible models: {lhs} vs {rhs}")]
    IncompatibleModel { lhs: String, rhs: String },

    #[error("weight sequences have different lengths: {lhs} vs {rhs}")]
    WeightCountMismatch { lhs: usize, rhs: usize },

    #[error("weight shape mismatch at position {position}: {lhs:?} vs {rhs:?}")]
    ShapeMismatch {
        position: usize,
        lhs: Vec<usize>,
        rhs: Vec<usize>,
    },

    #[error("shape {shape:?} does not describe {len} elements")]
    InvalidShape { shape: Vec<usize>, len: usize },

    #[error("code resolution failed: {0}")]
    CodeResolutionFailure(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    #[error("corrupt artifact: {0}")]
    CorruptArtifact(String),

    #[error("missing required slot: {0}")]
    MissingSlot(SlotKind),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("slot failed: {0}")]
    Slot(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, Error>;
