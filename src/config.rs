//! Importer configuration
//!
//! Resolution order, later wins:
//!
//! 1. built-in defaults
//! 2. YAML file (`--config` or `TGW_IMPORTER_CONFIG`)
//! 3. environment (`.env` is loaded first when present)
//! 4. command-line flags (applied by the binary)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::collector::retry::RetryConfig;
use crate::collector::CollectorConfig;
use crate::error::{ImportError, Result};
use crate::model::Scope;
use crate::partition::HubSelector;
use crate::reconcile::PlanOptions;
use crate::synth::SynthOptions;

pub const DEFAULT_REGION: &str = "ap-northeast-1";
pub const DEFAULT_INPUT_DIR: &str = "./output";
pub const DEFAULT_OUTPUT_DIR: &str = "./terraform";
pub const DEFAULT_TERRAFORM_VERSION: &str = ">= 1.5";
pub const DEFAULT_AWS_PROVIDER_VERSION: &str = "~> 5.0";

/// Where each partition keeps its state, and how route-table partitions read
/// the hub's outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateBackend {
    /// `terraform.tfstate` inside each partition directory.
    #[default]
    Local,
    S3 {
        bucket: String,
        #[serde(default)]
        key_prefix: String,
        /// Defaults to the discovery region.
        #[serde(default)]
        region: Option<String>,
    },
}

/// How reconciliation directives are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum PlanFormat {
    /// `import.sh` with one `terraform import` per resource.
    #[default]
    Script,
    /// `imports.tf` with `import {}` blocks.
    Blocks,
}

impl PlanFormat {
    pub fn file_name(&self) -> &'static str {
        match self {
            PlanFormat::Script => "import.sh",
            PlanFormat::Blocks => "imports.tf",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImporterConfig {
    pub region: String,
    /// Resolved from caller identity when not set.
    pub account_id: Option<String>,
    pub profile: Option<String>,
    /// Root of raw describe output, laid out as `<account>/<region>/`.
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Explicit hub (gateway id, key, or name).
    pub hub: Option<String>,
    pub concurrency: usize,
    pub retry: RetryConfig,
    pub terraform_version: String,
    pub aws_provider_version: String,
    pub backend: StateBackend,
    pub plan_format: PlanFormat,
    /// Import spoke-side VPC routes as `{route-table-id}_{destination}`.
    pub reconcile_spoke_routes: bool,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            account_id: None,
            profile: None,
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            hub: None,
            concurrency: 8,
            retry: RetryConfig::default(),
            terraform_version: DEFAULT_TERRAFORM_VERSION.to_string(),
            aws_provider_version: DEFAULT_AWS_PROVIDER_VERSION.to_string(),
            backend: StateBackend::Local,
            plan_format: PlanFormat::Script,
            reconcile_spoke_routes: false,
        }
    }
}

impl ImporterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            return Err(ImportError::Config("region must not be empty".into()));
        }
        if self.concurrency == 0 {
            return Err(ImportError::Config("concurrency must be at least 1".into()));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(ImportError::Config(
                "retry.backoff_multiplier must be at least 1.0".into(),
            ));
        }
        if let Some(account) = &self.account_id {
            if account.len() != 12 || !account.chars().all(|c| c.is_ascii_digit()) {
                return Err(ImportError::Config(format!(
                    "account_id '{account}' is not a 12-digit AWS account id"
                )));
            }
        }
        if let StateBackend::S3 { bucket, .. } = &self.backend {
            if bucket.trim().is_empty() {
                return Err(ImportError::Config("s3 backend requires a bucket".into()));
            }
        }
        Ok(())
    }

    pub fn scope(&self) -> Scope {
        Scope::new(self.account_id.clone(), self.region.clone())
    }

    pub fn hub_selector(&self) -> HubSelector {
        HubSelector::from_option(self.hub.clone())
    }

    pub fn collector_config(&self) -> CollectorConfig {
        CollectorConfig {
            concurrency: self.concurrency,
            retry: self.retry.clone(),
        }
    }

    pub fn synth_options(&self) -> SynthOptions {
        SynthOptions {
            terraform_version: self.terraform_version.clone(),
            aws_provider_version: self.aws_provider_version.clone(),
            backend: self.backend.clone(),
        }
    }

    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            format: self.plan_format,
            reconcile_spoke_routes: self.reconcile_spoke_routes,
        }
    }
}

pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// Loader for the file named by `TGW_IMPORTER_CONFIG`, after loading `.env`.
    pub fn from_env() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env");
        }
        Self::new(std::env::var_os("TGW_IMPORTER_CONFIG").map(PathBuf::from))
    }

    /// Explicit path wins over the environment.
    pub fn with_path(mut self, path: Option<PathBuf>) -> Self {
        if path.is_some() {
            self.path = path;
        }
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Defaults, then the YAML file, then process environment.
    pub fn load(&self) -> Result<ImporterConfig> {
        self.load_with(|name| std::env::var(name).ok())
    }

    /// Same as [`load`](Self::load) with an injectable environment.
    pub fn load_with(&self, env: impl Fn(&str) -> Option<String>) -> Result<ImporterConfig> {
        let mut config = match &self.path {
            Some(path) => Self::load_file(path)?,
            None => ImporterConfig::default(),
        };
        apply_env(&mut config, env)?;
        config.validate()?;
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<ImporterConfig> {
        info!(path = %path.display(), "Loading configuration");
        let content = std::fs::read_to_string(path).map_err(|e| {
            ImportError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        if content.trim().is_empty() {
            return Ok(ImporterConfig::default());
        }
        serde_yaml::from_str(&content)
            .map_err(|e| ImportError::Config(format!("failed to parse {}: {e}", path.display())))
    }
}

fn apply_env(config: &mut ImporterConfig, env: impl Fn(&str) -> Option<String>) -> Result<()> {
    let get = |name: &str| env(name).filter(|v| !v.trim().is_empty());

    if let Some(region) = get("TGW_IMPORTER_REGION").or_else(|| get("AWS_REGION")) {
        config.region = region;
    }
    if let Some(account) = get("TGW_IMPORTER_ACCOUNT_ID") {
        config.account_id = Some(account);
    }
    if let Some(profile) = get("AWS_PROFILE") {
        config.profile = Some(profile);
    }
    if let Some(dir) = get("TGW_IMPORTER_INPUT_DIR") {
        config.input_dir = PathBuf::from(dir);
    }
    if let Some(dir) = get("TGW_IMPORTER_OUTPUT_DIR") {
        config.output_dir = PathBuf::from(dir);
    }
    if let Some(hub) = get("TGW_IMPORTER_HUB") {
        config.hub = Some(hub);
    }
    if let Some(concurrency) = get("TGW_IMPORTER_CONCURRENCY") {
        config.concurrency = concurrency.parse().map_err(|_| {
            ImportError::Config(format!(
                "TGW_IMPORTER_CONCURRENCY must be a positive integer, got '{concurrency}'"
            ))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ConfigLoader::new(None).load_with(env(&[])).unwrap();
        assert_eq!(config.region, "ap-northeast-1");
        assert_eq!(config.input_dir, PathBuf::from("./output"));
        assert_eq!(config.output_dir, PathBuf::from("./terraform"));
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.retry.max_retries, 4);
        assert_eq!(config.plan_format, PlanFormat::Script);
        assert_eq!(config.backend, StateBackend::Local);
        assert!(!config.reconcile_spoke_routes);
    }

    #[test]
    fn test_file_then_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("importer.yaml");
        std::fs::write(
            &path,
            r#"
region: us-east-1
hub: legacy-tgw
plan_format: blocks
backend:
  type: s3
  bucket: tf-state
  key_prefix: network/tgw
retry:
  max_retries: 1
"#,
        )
        .unwrap();

        let config = ConfigLoader::new(Some(path))
            .load_with(env(&[
                ("AWS_REGION", "eu-west-1"),
                ("TGW_IMPORTER_HUB", "tgw-0aaa1111"),
            ]))
            .unwrap();

        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.hub.as_deref(), Some("tgw-0aaa1111"));
        assert_eq!(config.plan_format, PlanFormat::Blocks);
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.initial_delay_ms, 200);
        assert_eq!(
            config.backend,
            StateBackend::S3 {
                bucket: "tf-state".into(),
                key_prefix: "network/tgw".into(),
                region: None,
            }
        );
    }

    #[test]
    fn test_tool_region_wins_over_aws_region() {
        let config = ConfigLoader::new(None)
            .load_with(env(&[
                ("AWS_REGION", "eu-west-1"),
                ("TGW_IMPORTER_REGION", "us-west-2"),
            ]))
            .unwrap();
        assert_eq!(config.region, "us-west-2");
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let err = ConfigLoader::new(None)
            .load_with(env(&[("TGW_IMPORTER_ACCOUNT_ID", "12345")]))
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let err = ConfigLoader::new(None)
            .load_with(env(&[("TGW_IMPORTER_CONCURRENCY", "many")]))
            .unwrap_err();
        assert!(matches!(err, ImportError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = ConfigLoader::new(Some(PathBuf::from("/nonexistent/importer.yaml")))
            .load_with(env(&[]))
            .unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }
}
