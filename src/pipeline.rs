//! Stage orchestration
//!
//! ```text
//! discover ──> snapshot.json ──> keys ──> partitions ─┬─> synthesize ──┐
//!                                                      └─> plan ───────┴─> write
//! ```
//!
//! Keying and partitioning run once; synthesis and plan generation then run
//! side by side on the blocking pool over a shared topology. Nothing is written
//! until both have finished, so a structural error never leaves a half-written
//! output tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::collector::{Collector, DescribeApi, DescribeRequest, DirectoryApi};
use crate::config::ImporterConfig;
use crate::error::{ImportError, Result};
use crate::model::{ResourceSnapshot, Scope, SNAPSHOT_FILE};
use crate::output::OutputWriter;
use crate::partition::{partition, HubSelector, PartitionedTopology};
use crate::reconcile::{plan, PlanOptions, ReconciliationPlan};
use crate::synth::{synthesize, SynthOptions, SynthesisOutput};

// =============================================================================
// DISCOVERY AND INPUT
// =============================================================================

/// `<root>/<account>/<region>`
pub fn scope_dir(root: &Path, scope: &Scope) -> PathBuf {
    root.join(scope.account_label()).join(&scope.region)
}

/// Discover the configured scope through `api`.
pub async fn discover(
    api: Arc<dyn DescribeApi>,
    config: &ImporterConfig,
) -> Result<ResourceSnapshot> {
    Collector::new(api, config.collector_config())
        .collect(config.scope())
        .await
}

/// Discover and save `snapshot.json` under `<root>/<account>/<region>`.
pub async fn discover_to(
    api: Arc<dyn DescribeApi>,
    config: &ImporterConfig,
    root: &Path,
) -> Result<(ResourceSnapshot, PathBuf)> {
    let snapshot = discover(api, config).await?;
    let path = scope_dir(root, &snapshot.scope).join(SNAPSHOT_FILE);
    snapshot.save(&path)?;
    Ok((snapshot, path))
}

fn has_input(dir: &Path) -> bool {
    dir.join(SNAPSHOT_FILE).is_file()
        || dir
            .join(DescribeRequest::TransitGateways.file_name())
            .is_file()
}

fn looks_like_account(name: &str) -> bool {
    name.len() == 12 && name.chars().all(|c| c.is_ascii_digit())
}

fn looks_like_region(name: &str) -> bool {
    name.contains('-') && name.ends_with(|c: char| c.is_ascii_digit())
}

/// Scope for a raw-output directory laid out as `<account>/<region>`, falling
/// back to the configured values.
fn infer_scope(dir: &Path, config: &ImporterConfig) -> Scope {
    let name = |path: Option<&Path>| {
        path.and_then(Path::file_name)
            .and_then(|n| n.to_str())
            .map(str::to_string)
    };
    let region = name(Some(dir))
        .filter(|n| looks_like_region(n))
        .unwrap_or_else(|| config.region.clone());
    let account_id = name(dir.parent())
        .filter(|n| looks_like_account(n))
        .or_else(|| config.account_id.clone());
    Scope::new(account_id, region)
}

fn locate_scope_dir(input: &Path, config: &ImporterConfig) -> Result<PathBuf> {
    let mut candidates = vec![input.to_path_buf()];
    if let Some(account) = &config.account_id {
        candidates.push(input.join(account).join(&config.region));
    }
    candidates.push(input.join(&config.region));
    if let Some(found) = candidates.into_iter().find(|dir| has_input(dir)) {
        return Ok(found);
    }

    let mut matches = Vec::new();
    if let Ok(entries) = std::fs::read_dir(input) {
        for entry in entries.flatten() {
            let dir = entry.path().join(&config.region);
            if has_input(&dir) {
                matches.push(dir);
            }
        }
    }
    matches.sort();
    match matches.as_slice() {
        [only] => Ok(only.clone()),
        [] => Err(ImportError::Config(format!(
            "no discovery output for region {} under {}",
            config.region,
            input.display()
        ))),
        several => Err(ImportError::Config(format!(
            "discovery output for several accounts under {} ({}); set account_id",
            input.display(),
            several
                .iter()
                .map(|d| d.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

/// Load a snapshot from `input`: a `snapshot.json` file, a directory holding
/// one, or a directory of raw describe output (decoded as if freshly
/// discovered).
pub async fn load_input(input: &Path, config: &ImporterConfig) -> Result<ResourceSnapshot> {
    if input.is_file() {
        info!(path = %input.display(), "Loading snapshot");
        return ResourceSnapshot::load(input);
    }

    let dir = locate_scope_dir(input, config)?;
    let snapshot_path = dir.join(SNAPSHOT_FILE);
    if snapshot_path.is_file() {
        info!(path = %snapshot_path.display(), "Loading snapshot");
        return ResourceSnapshot::load(&snapshot_path);
    }

    info!(dir = %dir.display(), "Decoding saved describe output");
    let api: Arc<dyn DescribeApi> = Arc::new(DirectoryApi::new(&dir));
    Collector::new(api, config.collector_config())
        .collect(infer_scope(&dir, config))
        .await
}

// =============================================================================
// TRANSFORMATION
// =============================================================================

/// Select the hub, key it, and split it into partitions.
pub fn prepare(
    snapshot: &ResourceSnapshot,
    selector: &HubSelector,
) -> Result<PartitionedTopology> {
    partition(snapshot, selector)
}

/// In-memory result of synthesis and planning.
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub topology: Arc<PartitionedTopology>,
    pub synthesis: Option<SynthesisOutput>,
    pub plan: Option<ReconciliationPlan>,
}

fn join_error(stage: &str, error: tokio::task::JoinError) -> ImportError {
    ImportError::Task(format!("{stage}: {error}"))
}

/// Run the requested generators concurrently over one shared topology.
pub async fn generate(
    topology: PartitionedTopology,
    synth_options: Option<SynthOptions>,
    plan_options: Option<PlanOptions>,
) -> Result<Artifacts> {
    let topology = Arc::new(topology);

    let synth_task = synth_options.map(|options| {
        let topology = Arc::clone(&topology);
        tokio::task::spawn_blocking(move || synthesize(&topology, &options))
    });
    let plan_task = plan_options.map(|options| {
        let topology = Arc::clone(&topology);
        tokio::task::spawn_blocking(move || plan(&topology, &options))
    });

    let synthesis = match synth_task {
        Some(task) => Some(task.await.map_err(|e| join_error("synthesis", e))?),
        None => None,
    };
    let plan = match plan_task {
        Some(task) => Some(task.await.map_err(|e| join_error("planning", e))?),
        None => None,
    };

    Ok(Artifacts {
        topology,
        synthesis,
        plan,
    })
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub partitions: usize,
    pub files: usize,
    pub directives: usize,
    pub skipped: usize,
    pub excluded: usize,
}

/// Write whatever `artifacts` holds under `output`.
pub fn write(artifacts: &Artifacts, output: &Path) -> Result<RunSummary> {
    let writer = OutputWriter::new(output);
    let mut summary = RunSummary {
        partitions: artifacts.topology.route_tables.len() + 1,
        excluded: artifacts.topology.excluded.len(),
        ..RunSummary::default()
    };

    if let Some(synthesis) = &artifacts.synthesis {
        writer.write_configs(synthesis)?;
        summary.files = synthesis.configs.iter().map(|c| c.files.len()).sum();
    }
    if let Some(plan) = &artifacts.plan {
        writer.write_plan(plan)?;
        summary.directives = plan.directives().count();
        summary.skipped = plan.skipped().count();
    }
    debug!(?summary, "Run summary");
    Ok(summary)
}

/// Load, transform, and write in one go.
pub async fn process(
    snapshot: &ResourceSnapshot,
    config: &ImporterConfig,
    emit_config: bool,
    emit_plan: bool,
) -> Result<RunSummary> {
    let topology = prepare(snapshot, &config.hub_selector())?;
    let artifacts = generate(
        topology,
        emit_config.then(|| config.synth_options()),
        emit_plan.then(|| config.plan_options()),
    )
    .await?;
    write(&artifacts, &config.output_dir)
}

/// Discovery through synthesis and planning, optionally skipping the plan.
pub async fn run_all(
    api: Arc<dyn DescribeApi>,
    config: &ImporterConfig,
    skip_reconcile: bool,
) -> Result<RunSummary> {
    let (snapshot, path) = discover_to(api, config, &config.input_dir).await?;
    info!(snapshot = %path.display(), "Discovery saved");
    process(&snapshot, config, true, !skip_reconcile).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_scope_from_layout() {
        let config = ImporterConfig::default();
        let scope = infer_scope(Path::new("/data/123456789012/us-west-2"), &config);
        assert_eq!(scope.account_id.as_deref(), Some("123456789012"));
        assert_eq!(scope.region, "us-west-2");

        let scope = infer_scope(Path::new("/data/raw"), &config);
        assert_eq!(scope.account_id, None);
        assert_eq!(scope.region, "ap-northeast-1");
    }

    #[test]
    fn test_scope_dir() {
        let scope = Scope::new(Some("123456789012".into()), "ap-northeast-1");
        assert_eq!(
            scope_dir(Path::new("out"), &scope),
            PathBuf::from("out/123456789012/ap-northeast-1")
        );
    }

    #[test]
    fn test_missing_input_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = locate_scope_dir(dir.path(), &ImporterConfig::default()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
