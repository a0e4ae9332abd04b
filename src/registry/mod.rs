//! Capability registry
//!
//! The locally linked implementation set that code units resolve
//! against. Implementations are registered under a capability id and
//! version, one entry per slot kind; resolution requires the exact
//! `(id, version)` pair, so mismatched environments fail loudly instead
//! of running the wrong code.
//!
//! There is no process-global registry: a registry value is passed
//! explicitly to every load, keeping resolution isolated per operation.
//! Every registry starts with the built-in delta implementations
//! registered under [`delta::DEFAULT_CAPABILITY_ID`](crate::delta::DEFAULT_CAPABILITY_ID).

use crate::delta;
use crate::envelope::{ModelEnvelope, RuntimeInstance};
use crate::error::{Error, Result};
use crate::slot::{
    ApplyDeltaFn, ApplyFn, CalcDeltaFn, CapabilityRef, CodeUnit, ConstructFn, IncrementalLearnFn,
    ModelToWeightsFn, Slot, SlotKind, SlotSet, WeightCopyFn, WeightsToModelFn,
};
use crate::weights::WeightTensor;
use std::collections::HashMap;
use std::sync::Arc;

/// One registered slot implementation.
enum SlotImpl {
    Construct(Arc<ConstructFn>),
    Apply(Arc<ApplyFn>),
    WeightsToModel(Arc<WeightsToModelFn>),
    ModelToWeights(Arc<ModelToWeightsFn>),
    CalcDelta(Arc<CalcDeltaFn>),
    ApplyDelta(Arc<ApplyDeltaFn>),
    WeightCopy(Arc<WeightCopyFn>),
    IncrementalLearn(Arc<IncrementalLearnFn>),
}

struct Registered {
    version: String,
    imp: SlotImpl,
}

/// Versioned registry of slot implementations, keyed by capability id and
/// slot kind.
pub struct CapabilityRegistry {
    entries: HashMap<(String, SlotKind), Registered>,
}

impl CapabilityRegistry {
    /// A registry holding only the built-in delta defaults.
    pub fn new() -> Self {
        let mut registry = Self {
            entries: HashMap::new(),
        };
        registry
            .capability(delta::DEFAULT_CAPABILITY_ID, env!("CARGO_PKG_VERSION"))
            .calc_delta(delta::calc_delta)
            .apply_delta(delta::apply_delta)
            .weight_copy(delta::weight_copy);
        registry
    }

    /// Start registering implementations under a capability id and version.
    pub fn capability(
        &mut self,
        id: impl Into<String>,
        version: impl Into<String>,
    ) -> Capability<'_> {
        Capability {
            registry: self,
            id: id.into(),
            version: version.into(),
        }
    }

    /// Whether an implementation is registered for `(id, kind)`.
    pub fn contains(&self, id: &str, kind: SlotKind) -> bool {
        self.entries.contains_key(&(id.to_string(), kind))
    }

    fn insert(&mut self, id: &str, version: &str, kind: SlotKind, imp: SlotImpl) {
        self.entries.insert(
            (id.to_string(), kind),
            Registered {
                version: version.to_string(),
                imp,
            },
        );
    }

    fn lookup(&self, origin: &CapabilityRef, kind: SlotKind) -> Result<&Registered> {
        let entry = self
            .entries
            .get(&(origin.id.clone(), kind))
            .ok_or_else(|| {
                Error::CodeResolutionFailure(format!(
                    "no implementation registered for capability '{}' slot '{kind}'",
                    origin.id
                ))
            })?;
        if entry.version != origin.version {
            return Err(Error::CodeResolutionFailure(format!(
                "capability '{}' slot '{kind}' is registered at version {} but {} was requested",
                origin.id, entry.version, origin.version
            )));
        }
        Ok(entry)
    }

    fn kind_mismatch(origin: &CapabilityRef, kind: SlotKind) -> Error {
        Error::CodeResolutionFailure(format!(
            "capability '{origin}' does not implement slot '{kind}'"
        ))
    }

    /// Resolve a captured construct unit back into a callable slot.
    ///
    /// Opaque units are returned unchanged; capability units are looked
    /// up and come back with their provenance re-attached, so capturing
    /// the result yields the same unit again.
    pub fn resolve_construct(&self, unit: CodeUnit<ConstructFn>) -> Result<Slot<ConstructFn>> {
        match unit {
            CodeUnit::Opaque(f) => Ok(Slot::anonymous(f)),
            CodeUnit::Capability(origin) => {
                match &self.lookup(&origin, SlotKind::Construct)?.imp {
                    SlotImpl::Construct(f) => Ok(Slot::provenanced(Arc::clone(f), origin)),
                    _ => Err(Self::kind_mismatch(&origin, SlotKind::Construct)),
                }
            }
        }
    }

    pub fn resolve_apply(&self, unit: CodeUnit<ApplyFn>) -> Result<Slot<ApplyFn>> {
        match unit {
            CodeUnit::Opaque(f) => Ok(Slot::anonymous(f)),
            CodeUnit::Capability(origin) => match &self.lookup(&origin, SlotKind::Apply)?.imp {
                SlotImpl::Apply(f) => Ok(Slot::provenanced(Arc::clone(f), origin)),
                _ => Err(Self::kind_mismatch(&origin, SlotKind::Apply)),
            },
        }
    }

    pub fn resolve_weights_to_model(
        &self,
        unit: CodeUnit<WeightsToModelFn>,
    ) -> Result<Slot<WeightsToModelFn>> {
        match unit {
            CodeUnit::Opaque(f) => Ok(Slot::anonymous(f)),
            CodeUnit::Capability(origin) => {
                match &self.lookup(&origin, SlotKind::WeightsToModel)?.imp {
                    SlotImpl::WeightsToModel(f) => Ok(Slot::provenanced(Arc::clone(f), origin)),
                    _ => Err(Self::kind_mismatch(&origin, SlotKind::WeightsToModel)),
                }
            }
        }
    }

    pub fn resolve_model_to_weights(
        &self,
        unit: CodeUnit<ModelToWeightsFn>,
    ) -> Result<Slot<ModelToWeightsFn>> {
        match unit {
            CodeUnit::Opaque(f) => Ok(Slot::anonymous(f)),
            CodeUnit::Capability(origin) => {
                match &self.lookup(&origin, SlotKind::ModelToWeights)?.imp {
                    SlotImpl::ModelToWeights(f) => Ok(Slot::provenanced(Arc::clone(f), origin)),
                    _ => Err(Self::kind_mismatch(&origin, SlotKind::ModelToWeights)),
                }
            }
        }
    }

    pub fn resolve_calc_delta(&self, unit: CodeUnit<CalcDeltaFn>) -> Result<Slot<CalcDeltaFn>> {
        match unit {
            CodeUnit::Opaque(f) => Ok(Slot::anonymous(f)),
            CodeUnit::Capability(origin) => {
                match &self.lookup(&origin, SlotKind::CalcDelta)?.imp {
                    SlotImpl::CalcDelta(f) => Ok(Slot::provenanced(Arc::clone(f), origin)),
                    _ => Err(Self::kind_mismatch(&origin, SlotKind::CalcDelta)),
                }
            }
        }
    }

    pub fn resolve_apply_delta(&self, unit: CodeUnit<ApplyDeltaFn>) -> Result<Slot<ApplyDeltaFn>> {
        match unit {
            CodeUnit::Opaque(f) => Ok(Slot::anonymous(f)),
            CodeUnit::Capability(origin) => {
                match &self.lookup(&origin, SlotKind::ApplyDelta)?.imp {
                    SlotImpl::ApplyDelta(f) => Ok(Slot::provenanced(Arc::clone(f), origin)),
                    _ => Err(Self::kind_mismatch(&origin, SlotKind::ApplyDelta)),
                }
            }
        }
    }

    pub fn resolve_weight_copy(&self, unit: CodeUnit<WeightCopyFn>) -> Result<Slot<WeightCopyFn>> {
        match unit {
            CodeUnit::Opaque(f) => Ok(Slot::anonymous(f)),
            CodeUnit::Capability(origin) => {
                match &self.lookup(&origin, SlotKind::WeightCopy)?.imp {
                    SlotImpl::WeightCopy(f) => Ok(Slot::provenanced(Arc::clone(f), origin)),
                    _ => Err(Self::kind_mismatch(&origin, SlotKind::WeightCopy)),
                }
            }
        }
    }

    pub fn resolve_incremental_learn(
        &self,
        unit: CodeUnit<IncrementalLearnFn>,
    ) -> Result<Slot<IncrementalLearnFn>> {
        match unit {
            CodeUnit::Opaque(f) => Ok(Slot::anonymous(f)),
            CodeUnit::Capability(origin) => {
                match &self.lookup(&origin, SlotKind::IncrementalLearn)?.imp {
                    SlotImpl::IncrementalLearn(f) => Ok(Slot::provenanced(Arc::clone(f), origin)),
                    _ => Err(Self::kind_mismatch(&origin, SlotKind::IncrementalLearn)),
                }
            }
        }
    }

    /// Build a fully provenanced slot set for a registered capability.
    ///
    /// The four runtime-facing slots must be registered under `id`; the
    /// delta family falls back to the built-in defaults when the
    /// capability does not override them; `incremental_learn` is picked
    /// up when present.
    pub fn slot_set(&self, id: &str) -> Result<SlotSet> {
        let construct = match self.entry(id, SlotKind::Construct)? {
            (version, SlotImpl::Construct(f)) => {
                Slot::provenanced(Arc::clone(f), CapabilityRef::new(id, version))
            }
            _ => return Err(Error::MissingSlot(SlotKind::Construct)),
        };
        let apply = match self.entry(id, SlotKind::Apply)? {
            (version, SlotImpl::Apply(f)) => {
                Slot::provenanced(Arc::clone(f), CapabilityRef::new(id, version))
            }
            _ => return Err(Error::MissingSlot(SlotKind::Apply)),
        };
        let weights_to_model = match self.entry(id, SlotKind::WeightsToModel)? {
            (version, SlotImpl::WeightsToModel(f)) => {
                Slot::provenanced(Arc::clone(f), CapabilityRef::new(id, version))
            }
            _ => return Err(Error::MissingSlot(SlotKind::WeightsToModel)),
        };
        let model_to_weights = match self.entry(id, SlotKind::ModelToWeights)? {
            (version, SlotImpl::ModelToWeights(f)) => {
                Slot::provenanced(Arc::clone(f), CapabilityRef::new(id, version))
            }
            _ => return Err(Error::MissingSlot(SlotKind::ModelToWeights)),
        };

        let calc_delta = match self.entries.get(&(id.to_string(), SlotKind::CalcDelta)) {
            Some(Registered {
                version,
                imp: SlotImpl::CalcDelta(f),
            }) => Slot::provenanced(Arc::clone(f), CapabilityRef::new(id, version.clone())),
            _ => delta::default_calc_delta_slot(),
        };
        let apply_delta = match self.entries.get(&(id.to_string(), SlotKind::ApplyDelta)) {
            Some(Registered {
                version,
                imp: SlotImpl::ApplyDelta(f),
            }) => Slot::provenanced(Arc::clone(f), CapabilityRef::new(id, version.clone())),
            _ => delta::default_apply_delta_slot(),
        };
        let weight_copy = match self.entries.get(&(id.to_string(), SlotKind::WeightCopy)) {
            Some(Registered {
                version,
                imp: SlotImpl::WeightCopy(f),
            }) => Slot::provenanced(Arc::clone(f), CapabilityRef::new(id, version.clone())),
            _ => delta::default_weight_copy_slot(),
        };
        let incremental_learn = match self
            .entries
            .get(&(id.to_string(), SlotKind::IncrementalLearn))
        {
            Some(Registered {
                version,
                imp: SlotImpl::IncrementalLearn(f),
            }) => Some(Slot::provenanced(
                Arc::clone(f),
                CapabilityRef::new(id, version.clone()),
            )),
            _ => None,
        };

        Ok(SlotSet::assemble(
            construct,
            apply,
            weights_to_model,
            model_to_weights,
            calc_delta,
            apply_delta,
            weight_copy,
            incremental_learn,
        ))
    }

    fn entry(&self, id: &str, kind: SlotKind) -> Result<(&str, &SlotImpl)> {
        self.entries
            .get(&(id.to_string(), kind))
            .map(|r| (r.version.as_str(), &r.imp))
            .ok_or(Error::MissingSlot(kind))
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Fluent registration of a capability's slot implementations.
pub struct Capability<'a> {
    registry: &'a mut CapabilityRegistry,
    id: String,
    version: String,
}

impl Capability<'_> {
    fn insert(self, kind: SlotKind, imp: SlotImpl) -> Self {
        self.registry.insert(&self.id, &self.version, kind, imp);
        self
    }

    pub fn construct(self, f: impl Fn() -> Result<RuntimeInstance> + 'static) -> Self {
        self.insert(SlotKind::Construct, SlotImpl::Construct(Arc::new(f)))
    }

    pub fn apply(
        self,
        f: impl Fn(&RuntimeInstance, &WeightTensor) -> Result<WeightTensor> + 'static,
    ) -> Self {
        self.insert(SlotKind::Apply, SlotImpl::Apply(Arc::new(f)))
    }

    pub fn weights_to_model(
        self,
        f: impl Fn(&mut RuntimeInstance, &[WeightTensor]) -> Result<()> + 'static,
    ) -> Self {
        self.insert(
            SlotKind::WeightsToModel,
            SlotImpl::WeightsToModel(Arc::new(f)),
        )
    }

    pub fn model_to_weights(
        self,
        f: impl Fn(&RuntimeInstance) -> Result<Vec<WeightTensor>> + 'static,
    ) -> Self {
        self.insert(
            SlotKind::ModelToWeights,
            SlotImpl::ModelToWeights(Arc::new(f)),
        )
    }

    pub fn calc_delta(
        self,
        f: impl Fn(&ModelEnvelope, &ModelEnvelope, Option<f32>) -> Result<ModelEnvelope> + 'static,
    ) -> Self {
        self.insert(SlotKind::CalcDelta, SlotImpl::CalcDelta(Arc::new(f)))
    }

    pub fn apply_delta(
        self,
        f: impl Fn(&ModelEnvelope, &ModelEnvelope) -> Result<ModelEnvelope> + 'static,
    ) -> Self {
        self.insert(SlotKind::ApplyDelta, SlotImpl::ApplyDelta(Arc::new(f)))
    }

    pub fn weight_copy(
        self,
        f: impl Fn(&[WeightTensor]) -> Result<Vec<WeightTensor>> + 'static,
    ) -> Self {
        self.insert(SlotKind::WeightCopy, SlotImpl::WeightCopy(Arc::new(f)))
    }

    pub fn incremental_learn(
        self,
        f: impl Fn(&mut RuntimeInstance, &[WeightTensor], &[WeightTensor], usize, usize) -> Result<()>
            + 'static,
    ) -> Self {
        self.insert(
            SlotKind::IncrementalLearn,
            SlotImpl::IncrementalLearn(Arc::new(f)),
        )
    }
}
