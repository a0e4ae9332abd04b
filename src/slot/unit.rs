//! Slots, provenance, and transportable code units

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The portable name of a registered slot implementation.
///
/// Resolution requires the exact `(id, version)` pair to be present in the
/// receiving environment's registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CapabilityRef {
    pub id: String,
    pub version: String,
}

impl CapabilityRef {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }
}

impl std::fmt::Display for CapabilityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

/// One behavior slot: a callable paired with its provenance.
///
/// The pair is built once and never mutated; re-resolving a captured slot
/// produces a new `Slot` value with the same provenance attached, so
/// capture and resolution round-trip.
pub struct Slot<F: ?Sized> {
    func: Arc<F>,
    provenance: Option<CapabilityRef>,
}

impl<F: ?Sized> Slot<F> {
    /// A slot with no recorded origin. Usable in-process, not transportable.
    pub fn anonymous(func: Arc<F>) -> Self {
        Self {
            func,
            provenance: None,
        }
    }

    /// A slot that remembers the registered implementation it came from.
    pub fn provenanced(func: Arc<F>, origin: CapabilityRef) -> Self {
        Self {
            func,
            provenance: Some(origin),
        }
    }

    /// The callable.
    pub fn func(&self) -> &F {
        &self.func
    }

    /// The capability this slot resolves back to, if known.
    pub fn provenance(&self) -> Option<&CapabilityRef> {
        self.provenance.as_ref()
    }

    /// Turn this slot into its transportable representation.
    ///
    /// With provenance the result is a portable capability reference;
    /// without it the callable itself is returned as an opaque,
    /// process-local unit.
    pub fn capture(&self) -> CodeUnit<F> {
        match &self.provenance {
            Some(origin) => CodeUnit::Capability(origin.clone()),
            None => CodeUnit::Opaque(Arc::clone(&self.func)),
        }
    }
}

impl<F: ?Sized> Clone for Slot<F> {
    fn clone(&self) -> Self {
        Self {
            func: Arc::clone(&self.func),
            provenance: self.provenance.clone(),
        }
    }
}

impl<F: ?Sized> std::fmt::Debug for Slot<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("provenance", &self.provenance)
            .finish_non_exhaustive()
    }
}

/// The captured representation of a slot's logic.
///
/// `Capability` travels across environments; `Opaque` is valid only inside
/// the process that produced it and encodes as a non-resolvable marker.
pub enum CodeUnit<F: ?Sized> {
    Capability(CapabilityRef),
    Opaque(Arc<F>),
}

impl<F: ?Sized> CodeUnit<F> {
    /// Whether this unit can be reconstructed in another environment.
    pub fn is_portable(&self) -> bool {
        matches!(self, CodeUnit::Capability(_))
    }

    /// The capability reference, when portable.
    pub fn capability(&self) -> Option<&CapabilityRef> {
        match self {
            CodeUnit::Capability(origin) => Some(origin),
            CodeUnit::Opaque(_) => None,
        }
    }
}

impl<F: ?Sized> Clone for CodeUnit<F> {
    fn clone(&self) -> Self {
        match self {
            CodeUnit::Capability(origin) => CodeUnit::Capability(origin.clone()),
            CodeUnit::Opaque(func) => CodeUnit::Opaque(Arc::clone(func)),
        }
    }
}

impl<F: ?Sized> std::fmt::Debug for CodeUnit<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeUnit::Capability(origin) => f.debug_tuple("Capability").field(origin).finish(),
            CodeUnit::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}
