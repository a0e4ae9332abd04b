//! Envelope serialization codec
//!
//! Encodes a [`ModelEnvelope`] as a single self-describing byte stream:
//! a safetensors container whose metadata map carries the envelope
//! header (`model_id`, `timestamp_id`, one `slot.<name>` entry per
//! behavior slot) and whose tensors carry the weight sequence as F32
//! arrays named `w0..wN` in positional order.
//!
//! Decoding resolves every slot entry against the caller's
//! [`CapabilityRegistry`] and rebuilds the envelope through normal
//! construction, then loads the decoded weights. A slot that was
//! captured as an opaque in-process handle cannot cross the byte
//! boundary and fails resolution on the way back in.

use crate::envelope::ModelEnvelope;
use crate::error::{Error, Result};
use crate::registry::CapabilityRegistry;
use crate::slot::{CapabilityRef, CodeUnit, SlotKind, SlotSet};
use crate::weights::WeightTensor;
use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const MODEL_ID_KEY: &str = "model_id";
const TIMESTAMP_ID_KEY: &str = "timestamp_id";
const SLOT_KEY_PREFIX: &str = "slot.";
const WEIGHT_NAME_PREFIX: &str = "w";

/// Wire form of one captured slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SlotEntry {
    /// Portable reference into the receiving environment's registry.
    Capability { id: String, version: String },
    /// The slot existed but was a process-local handle; recorded so the
    /// artifact stays self-describing, never resolvable on load.
    Opaque,
    /// Optional slot not present.
    Absent,
}

impl SlotEntry {
    fn from_unit<F: ?Sized>(unit: &CodeUnit<F>) -> Self {
        match unit {
            CodeUnit::Capability(origin) => SlotEntry::Capability {
                id: origin.id.clone(),
                version: origin.version.clone(),
            },
            CodeUnit::Opaque(_) => SlotEntry::Opaque,
        }
    }
}

fn slot_key(kind: SlotKind) -> String {
    format!("{SLOT_KEY_PREFIX}{kind}")
}

/// Encode an envelope into a single byte stream.
///
/// Captures every behavior slot and fetches the current weights; the
/// envelope itself is left untouched.
pub fn encode(envelope: &ModelEnvelope) -> Result<Vec<u8>> {
    let slots = envelope.slots();
    let mut metadata = HashMap::new();
    metadata.insert(MODEL_ID_KEY.to_string(), envelope.model_id().to_string());
    metadata.insert(
        TIMESTAMP_ID_KEY.to_string(),
        envelope.timestamp_id().to_string(),
    );

    let entries = [
        (SlotKind::Construct, SlotEntry::from_unit(&slots.construct().capture())),
        (SlotKind::Apply, SlotEntry::from_unit(&slots.apply().capture())),
        (
            SlotKind::WeightsToModel,
            SlotEntry::from_unit(&slots.weights_to_model().capture()),
        ),
        (
            SlotKind::ModelToWeights,
            SlotEntry::from_unit(&slots.model_to_weights().capture()),
        ),
        (SlotKind::CalcDelta, SlotEntry::from_unit(&slots.calc_delta().capture())),
        (SlotKind::ApplyDelta, SlotEntry::from_unit(&slots.apply_delta().capture())),
        (SlotKind::WeightCopy, SlotEntry::from_unit(&slots.weight_copy().capture())),
        (
            SlotKind::IncrementalLearn,
            match slots.incremental_learn() {
                Some(slot) => SlotEntry::from_unit(&slot.capture()),
                None => SlotEntry::Absent,
            },
        ),
    ];
    for (kind, entry) in entries {
        let encoded = serde_json::to_string(&entry)
            .map_err(|e| Error::Serialization(format!("slot entry encoding failed: {e}")))?;
        metadata.insert(slot_key(kind), encoded);
    }

    let weights = envelope.get_weights()?;
    let buffers: Vec<(String, Vec<usize>, Vec<u8>)> = weights
        .iter()
        .enumerate()
        .map(|(i, tensor)| {
            let floats = tensor.to_vec();
            let bytes: Vec<u8> = bytemuck::cast_slice(&floats).to_vec();
            (
                format!("{WEIGHT_NAME_PREFIX}{i}"),
                tensor.shape().to_vec(),
                bytes,
            )
        })
        .collect();

    let views: Vec<(&str, TensorView<'_>)> = buffers
        .iter()
        .map(|(name, shape, bytes)| {
            let view = TensorView::new(Dtype::F32, shape.clone(), bytes)
                .map_err(|e| Error::Serialization(format!("tensor view failed: {e}")))?;
            Ok((name.as_str(), view))
        })
        .collect::<Result<_>>()?;

    safetensors::serialize(views, &Some(metadata))
        .map_err(|e| Error::Serialization(format!("artifact encoding failed: {e}")))
}

/// Decode an envelope from bytes produced by [`encode`].
///
/// Slot entries are resolved against `registry`; the envelope is rebuilt
/// through normal construction, then the decoded weights are loaded.
pub fn decode(bytes: &[u8], registry: &CapabilityRegistry) -> Result<ModelEnvelope> {
    let (_, header) = SafeTensors::read_metadata(bytes)
        .map_err(|e| Error::CorruptArtifact(format!("unreadable container: {e}")))?;
    let metadata = header
        .metadata()
        .as_ref()
        .ok_or_else(|| Error::CorruptArtifact("missing envelope metadata".to_string()))?;

    let model_id = required_key(metadata, MODEL_ID_KEY)?;
    let timestamp_id = required_key(metadata, TIMESTAMP_ID_KEY)?;

    let construct = registry.resolve_construct(required_unit(metadata, SlotKind::Construct)?)?;
    let apply = registry.resolve_apply(required_unit(metadata, SlotKind::Apply)?)?;
    let weights_to_model =
        registry.resolve_weights_to_model(required_unit(metadata, SlotKind::WeightsToModel)?)?;
    let model_to_weights =
        registry.resolve_model_to_weights(required_unit(metadata, SlotKind::ModelToWeights)?)?;
    let calc_delta = registry.resolve_calc_delta(required_unit(metadata, SlotKind::CalcDelta)?)?;
    let apply_delta =
        registry.resolve_apply_delta(required_unit(metadata, SlotKind::ApplyDelta)?)?;
    let weight_copy =
        registry.resolve_weight_copy(required_unit(metadata, SlotKind::WeightCopy)?)?;
    let incremental_learn = match optional_unit(metadata, SlotKind::IncrementalLearn)? {
        Some(unit) => Some(registry.resolve_incremental_learn(unit)?),
        None => None,
    };

    let slots = SlotSet::assemble(
        construct,
        apply,
        weights_to_model,
        model_to_weights,
        calc_delta,
        apply_delta,
        weight_copy,
        incremental_learn,
    );

    let weights = decode_weights(bytes)?;

    let mut envelope = ModelEnvelope::new(model_id, timestamp_id, slots)?;
    if !weights.is_empty() {
        envelope.set_weights(&weights)?;
    }
    Ok(envelope)
}

fn required_key(metadata: &HashMap<String, String>, key: &str) -> Result<String> {
    metadata
        .get(key)
        .cloned()
        .ok_or_else(|| Error::CorruptArtifact(format!("missing required key '{key}'")))
}

fn parse_entry(metadata: &HashMap<String, String>, kind: SlotKind) -> Result<Option<SlotEntry>> {
    let key = slot_key(kind);
    match metadata.get(&key) {
        None => Ok(None),
        Some(raw) => {
            let entry = serde_json::from_str(raw).map_err(|e| {
                Error::CorruptArtifact(format!("malformed slot entry '{key}': {e}"))
            })?;
            Ok(Some(entry))
        }
    }
}

fn capability_unit<F: ?Sized>(entry: SlotEntry, kind: SlotKind) -> Result<CodeUnit<F>> {
    match entry {
        SlotEntry::Capability { id, version } => {
            Ok(CodeUnit::Capability(CapabilityRef::new(id, version)))
        }
        SlotEntry::Opaque => Err(Error::CodeResolutionFailure(format!(
            "slot '{kind}' was captured as an opaque in-process handle and cannot be reconstructed"
        ))),
        SlotEntry::Absent => Err(Error::CorruptArtifact(format!(
            "required slot '{kind}' is marked absent"
        ))),
    }
}

fn required_unit<F: ?Sized>(
    metadata: &HashMap<String, String>,
    kind: SlotKind,
) -> Result<CodeUnit<F>> {
    let entry = parse_entry(metadata, kind)?.ok_or_else(|| {
        Error::CorruptArtifact(format!("missing required key '{}'", slot_key(kind)))
    })?;
    capability_unit(entry, kind)
}

fn optional_unit<F: ?Sized>(
    metadata: &HashMap<String, String>,
    kind: SlotKind,
) -> Result<Option<CodeUnit<F>>> {
    match parse_entry(metadata, kind)? {
        None | Some(SlotEntry::Absent) => Ok(None),
        Some(entry) => capability_unit(entry, kind).map(Some),
    }
}

fn decode_weights(bytes: &[u8]) -> Result<Vec<WeightTensor>> {
    let tensors = SafeTensors::deserialize(bytes)
        .map_err(|e| Error::CorruptArtifact(format!("unreadable tensor data: {e}")))?;

    let mut indexed: Vec<(usize, String)> = Vec::new();
    for name in tensors.names() {
        let index = name
            .strip_prefix(WEIGHT_NAME_PREFIX)
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or_else(|| {
                Error::CorruptArtifact(format!("unexpected tensor name '{name}'"))
            })?;
        indexed.push((index, name.to_string()));
    }
    indexed.sort_by_key(|(index, _)| *index);

    for (expected, (index, _)) in indexed.iter().enumerate() {
        if *index != expected {
            return Err(Error::CorruptArtifact(format!(
                "weight sequence is not contiguous: expected w{expected}, found w{index}"
            )));
        }
    }

    indexed
        .into_iter()
        .map(|(_, name)| {
            let view = tensors
                .tensor(&name)
                .map_err(|e| Error::CorruptArtifact(format!("tensor '{name}': {e}")))?;
            if view.dtype() != Dtype::F32 {
                return Err(Error::CorruptArtifact(format!(
                    "tensor '{name}' has dtype {:?}, expected F32",
                    view.dtype()
                )));
            }
            let shape = view.shape().to_vec();
            let expected: usize = shape.iter().product();
            let raw = view.data();
            if raw.len() != expected * std::mem::size_of::<f32>() {
                return Err(Error::CorruptArtifact(format!(
                    "tensor '{name}': {} bytes do not match shape {shape:?}",
                    raw.len()
                )));
            }
            let floats: Vec<f32> = bytemuck::pod_collect_to_vec(raw);
            WeightTensor::from_parts(shape, floats)
                .map_err(|e| Error::CorruptArtifact(format!("tensor '{name}': {e}")))
        })
        .collect()
}
