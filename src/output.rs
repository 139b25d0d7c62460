//! Output writer
//!
//! Lays synthesized partitions and reconciliation plans out on disk:
//!
//! ```text
//! <output>/
//!   partitions.json
//!   skipped.json
//!   <hub>/            versions.tf main.tf ... manifest.json import.sh
//!   <hub>_rt_<name>/  versions.tf remote.tf main.tf ... manifest.json import.sh
//! ```
//!
//! Each partition's `manifest.json` records the SHA-256 of every file it
//! wrote, and the root `partitions.json` records the partitions and plan file
//! name of the last run. Files, partition directories and plan files listed
//! by a previous run but no longer produced are removed, so a re-run against a
//! changed topology or plan format leaves no stale blocks.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::PlanFormat;
use crate::error::Result;
use crate::keys::sanitize;
use crate::reconcile::{ReconciliationPlan, SKIPPED_FILE};
use crate::synth::{SynthesisOutput, SynthesizedConfig};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const INDEX_FILE: &str = "partitions.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub partition: String,
    pub fingerprint: String,
    /// File name to SHA-256 hex digest.
    pub files: BTreeMap<String, String>,
    #[serde(default)]
    pub remote_refs: Vec<String>,
}

impl Manifest {
    pub fn for_config(config: &SynthesizedConfig) -> Self {
        Self {
            partition: config.partition.clone(),
            fingerprint: config.fingerprint(),
            files: config
                .files
                .iter()
                .map(|(name, content)| (name.clone(), sha256_hex(content)))
                .collect(),
            remote_refs: config.remote_refs.iter().map(|r| r.expr()).collect(),
        }
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        Self::read_json(path)
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

/// What the last run left under the output root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputIndex {
    pub partitions: BTreeSet<String>,
    #[serde(default)]
    pub plan_file: Option<String>,
}

impl OutputIndex {
    pub fn load(root: &Path) -> Result<Option<Self>> {
        Manifest::read_json(&root.join(INDEX_FILE))
    }

    fn save(&self, root: &Path) -> Result<()> {
        std::fs::create_dir_all(root)?;
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        std::fs::write(root.join(INDEX_FILE), json)?;
        Ok(())
    }
}

pub fn sha256_hex(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Writes into one output root.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    root: PathBuf,
}

impl OutputWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn partition_dir(&self, partition: &str) -> PathBuf {
        self.root.join(partition)
    }

    /// Write every partition's files and manifest. Returns the partition
    /// directories in write order.
    pub fn write_configs(&self, synthesis: &SynthesisOutput) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::with_capacity(synthesis.configs.len());
        for config in &synthesis.configs {
            dirs.push(self.write_config(config)?);
        }
        let partitions = synthesis
            .configs
            .iter()
            .map(|c| c.partition.clone())
            .collect();
        self.update_index(partitions, None)?;
        info!(
            root = %self.root.display(),
            partitions = dirs.len(),
            "Wrote configuration"
        );
        Ok(dirs)
    }

    fn write_config(&self, config: &SynthesizedConfig) -> Result<PathBuf> {
        let dir = self.partition_dir(&config.partition);
        std::fs::create_dir_all(&dir)?;

        let manifest_path = dir.join(MANIFEST_FILE);
        if let Some(previous) = Manifest::load(&manifest_path)? {
            for stale in previous.files.keys() {
                if !config.files.contains_key(stale) {
                    let path = dir.join(stale);
                    if path.exists() {
                        debug!(path = %path.display(), "Removing stale file");
                        std::fs::remove_file(&path)?;
                    }
                }
            }
        }

        for (name, content) in &config.files {
            std::fs::write(dir.join(name), content)?;
        }

        let manifest = Manifest::for_config(config);
        let mut json = serde_json::to_string_pretty(&manifest)?;
        json.push('\n');
        std::fs::write(&manifest_path, json)?;

        debug!(
            partition = %config.partition,
            files = config.files.len(),
            fingerprint = %manifest.fingerprint,
            "Wrote partition"
        );
        Ok(dir)
    }

    /// Write each partition's plan file and the run-wide `skipped.json`.
    pub fn write_plan(&self, plan: &ReconciliationPlan) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(plan.partitions.len() + 1);
        for partition in &plan.partitions {
            let dir = self.partition_dir(&partition.partition);
            std::fs::create_dir_all(&dir)?;
            let path = dir.join(plan.file_name());
            std::fs::write(&path, plan.render(partition))?;
            if plan.file_name().ends_with(".sh") {
                make_executable(&path)?;
            }
            written.push(path);
        }

        let partitions = plan
            .partitions
            .iter()
            .map(|p| p.partition.clone())
            .collect();
        self.update_index(partitions, Some(plan.file_name()))?;

        let skipped = self.root.join(SKIPPED_FILE);
        std::fs::write(&skipped, plan.skipped_json()?)?;
        written.push(skipped);

        info!(
            root = %self.root.display(),
            directives = plan.directives().count(),
            skipped = plan.skipped().count(),
            "Wrote reconciliation plan"
        );
        Ok(written)
    }

    /// Remove what the previous run produced and this one did not, then
    /// record the current partitions and plan file.
    fn update_index(&self, partitions: BTreeSet<String>, plan_file: Option<&str>) -> Result<()> {
        let previous = OutputIndex::load(&self.root)?.unwrap_or_default();

        for stale in previous.partitions.difference(&partitions) {
            // Only ever delete directories named like a partition key.
            if sanitize(stale) != *stale {
                continue;
            }
            let dir = self.partition_dir(stale);
            if dir.is_dir() {
                debug!(path = %dir.display(), "Removing stale partition");
                std::fs::remove_dir_all(&dir)?;
            }
        }

        let plan_file = match plan_file {
            Some(current) => {
                let old = previous
                    .plan_file
                    .as_deref()
                    .filter(|old| *old != current && is_plan_file(old));
                if let Some(old) = old {
                    for partition in &partitions {
                        let path = self.partition_dir(partition).join(old);
                        if path.is_file() {
                            debug!(path = %path.display(), "Removing stale plan file");
                            std::fs::remove_file(&path)?;
                        }
                    }
                }
                Some(current.to_string())
            }
            None => previous.plan_file,
        };

        OutputIndex {
            partitions,
            plan_file,
        }
        .save(&self.root)
    }
}

fn is_plan_file(name: &str) -> bool {
    [PlanFormat::Script, PlanFormat::Blocks]
        .iter()
        .any(|format| format.file_name() == name)
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
