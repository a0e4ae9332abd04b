//! Artifact providers
//!
//! The distribution boundary around the codec: a provider moves opaque
//! artifact bytes between a model name and some store. The core never
//! performs network I/O; a real remote transport implements
//! [`ModelProvider`] out of tree, with retry and auth policy of its own.
//! [`DirProvider`] is the in-tree filesystem implementation used by
//! tests and air-gapped deployments.

use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Moves serialized envelopes in and out of a store, newest version wins.
pub trait ModelProvider {
    /// Fetch the latest published artifact for a model name.
    fn fetch_latest(&self, model_name: &str) -> Result<Vec<u8>>;

    /// Publish artifact bytes under a model name; returns the recorded
    /// entry as acknowledgement.
    fn publish(&mut self, model_name: &str, bytes: &[u8]) -> Result<ArtifactEntry>;

    /// Model names with at least one published version.
    fn available_models(&self) -> Vec<String>;
}

/// One published artifact version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    /// Model name the artifact was published under.
    pub model_name: String,
    /// Version tag; lexicographic order is publication order.
    pub timestamp_id: String,
    /// SHA-256 of the artifact bytes.
    pub sha256: String,
    /// Artifact size in bytes.
    pub size_bytes: u64,
    /// File name inside the provider root.
    pub file_name: String,
}

/// Manifest listing every published artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderManifest {
    pub artifacts: Vec<ArtifactEntry>,
    pub version: String,
}

impl ProviderManifest {
    pub fn new() -> Self {
        Self {
            artifacts: Vec::new(),
            version: "1.0".to_string(),
        }
    }

    /// Latest entry for a model name, by timestamp order.
    pub fn latest(&self, model_name: &str) -> Option<&ArtifactEntry> {
        self.artifacts
            .iter()
            .filter(|a| a.model_name == model_name)
            .max_by(|a, b| a.timestamp_id.cmp(&b.timestamp_id))
    }
}

/// Filesystem-backed artifact store with a JSON manifest.
#[derive(Debug)]
pub struct DirProvider {
    root: PathBuf,
    manifest: ProviderManifest,
    manifest_path: PathBuf,
}

impl DirProvider {
    /// Open (or initialize) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let manifest_path = root.join("manifest.json");
        let manifest = if manifest_path.exists() {
            Self::load_manifest(&manifest_path).unwrap_or_default()
        } else {
            ProviderManifest::new()
        };
        Self {
            root,
            manifest,
            manifest_path,
        }
    }

    /// Store at the default location under the user's home directory.
    pub fn default_location() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(home.join(".envolver").join("models"))
    }

    /// Store root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The current manifest.
    pub fn manifest(&self) -> &ProviderManifest {
        &self.manifest
    }

    /// Every published version of a model, oldest first.
    pub fn entries(&self, model_name: &str) -> Vec<&ArtifactEntry> {
        let mut entries: Vec<&ArtifactEntry> = self
            .manifest
            .artifacts
            .iter()
            .filter(|a| a.model_name == model_name)
            .collect();
        entries.sort_by(|a, b| a.timestamp_id.cmp(&b.timestamp_id));
        entries
    }

    /// Publish under an explicit version tag instead of a generated one.
    ///
    /// Useful when the artifact already carries a timestamp id that the
    /// store should agree with.
    pub fn publish_with_timestamp(
        &mut self,
        model_name: &str,
        bytes: &[u8],
        timestamp_id: impl Into<String>,
    ) -> Result<ArtifactEntry> {
        let timestamp_id = timestamp_id.into();
        let file_name = format!("{model_name}-{timestamp_id}.envelope");

        fs::create_dir_all(&self.root)?;
        fs::write(self.root.join(&file_name), bytes)?;

        let entry = ArtifactEntry {
            model_name: model_name.to_string(),
            timestamp_id,
            sha256: sha256_hex(bytes),
            size_bytes: bytes.len() as u64,
            file_name,
        };
        self.manifest.artifacts.push(entry.clone());
        self.save_manifest()?;
        Ok(entry)
    }

    fn load_manifest(path: &Path) -> Result<ProviderManifest> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Serialization(format!("invalid manifest data: {e}")))
    }

    fn save_manifest(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.manifest)
            .map_err(|e| Error::Serialization(format!("manifest encoding failed: {e}")))?;
        fs::write(&self.manifest_path, content)?;
        Ok(())
    }
}

impl ModelProvider for DirProvider {
    fn fetch_latest(&self, model_name: &str) -> Result<Vec<u8>> {
        let entry = self
            .manifest
            .latest(model_name)
            .ok_or_else(|| Error::ModelNotFound(model_name.to_string()))?;

        let bytes = fs::read(self.root.join(&entry.file_name))?;
        let computed = sha256_hex(&bytes);
        if computed != entry.sha256 {
            return Err(Error::CorruptArtifact(format!(
                "checksum mismatch for '{}': manifest {} vs stored {computed}",
                entry.file_name, entry.sha256
            )));
        }
        Ok(bytes)
    }

    fn publish(&mut self, model_name: &str, bytes: &[u8]) -> Result<ArtifactEntry> {
        // Millisecond UTC timestamps; the fixed-width format makes
        // lexicographic order chronological.
        let timestamp_id = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
        self.publish_with_timestamp(model_name, bytes, timestamp_id)
    }

    fn available_models(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .manifest
            .artifacts
            .iter()
            .map(|a| a.model_name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
