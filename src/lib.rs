//! # Envolver: Portable Model Envelopes
//!
//! Envolver packages a trainable model's behavior (how it is built,
//! invoked, and diffed) together with its numeric parameters into one
//! portable artifact that can be serialized, shipped, diffed against
//! another version, merged, and reconstructed on the other side.
//!
//! ## Architecture
//!
//! - **weights**: Weight tensors and positional sequence operations
//! - **slot**: Behavior slots, capture, and code units
//! - **registry**: Versioned capability registry for slot resolution
//! - **envelope**: The envelope binding identity, slots, and runtime state
//! - **delta**: Weight delta calculus (diff, merge, sparsification)
//! - **codec**: Envelope serialization to a single byte stream
//! - **provider**: Artifact stores (publish / fetch-latest)
//!
//! ## Federated exchange in brief
//!
//! Two sites register the same capability, diff their locally trained
//! envelopes against a shared baseline, exchange the encoded deltas, and
//! fold them back in with `apply_delta`. `apply_delta(calc_delta(a, b),
//! b)` reproduces `a` exactly; thresholded deltas trade exactness for
//! smaller artifacts.

pub mod codec;
pub mod delta;
pub mod envelope;
pub mod provider;
pub mod registry;
pub mod slot;
pub mod weights;

pub mod error;

// Re-export commonly used types
pub use envelope::{ModelEnvelope, RuntimeInstance};
pub use error::{Error, Result};
pub use provider::{DirProvider, ModelProvider};
pub use registry::CapabilityRegistry;
pub use slot::{CapabilityRef, CodeUnit, Slot, SlotKind, SlotSet};
pub use weights::{WeightTensor, Weights};
