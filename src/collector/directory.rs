//! `DescribeApi` backed by a directory of saved describe output.
//!
//! Reads the layout written by earlier collection runs
//! (`transit-gateways.json`, `tgw-rt-routes-<rt>.json`, ...). A missing file is
//! an empty result, so partially collected directories still load.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{ApiError, DescribeApi, DescribeRequest};

#[derive(Debug, Clone)]
pub struct DirectoryApi {
    root: PathBuf,
}

impl DirectoryApi {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, request: &DescribeRequest) -> PathBuf {
        self.root.join(request.file_name())
    }
}

#[async_trait]
impl DescribeApi for DirectoryApi {
    async fn describe(&self, request: &DescribeRequest) -> Result<Value, ApiError> {
        let path = self.path_for(request);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No saved output, treating as empty");
                return Ok(Value::Null);
            }
            Err(e) => {
                return Err(ApiError::Failed(format!(
                    "failed to read {}: {e}",
                    path.display()
                )))
            }
        };

        if content.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&content)
            .map_err(|e| ApiError::Failed(format!("invalid JSON in {}: {e}", path.display())))
    }

    fn name(&self) -> &'static str {
        "directory"
    }
}
