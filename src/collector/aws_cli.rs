//! `DescribeApi` backed by the AWS CLI.
//!
//! Each request runs `aws <service> <operation> --region R [--profile P]
//! --output json`. The CLI aggregates paginated results itself. Failures are
//! classified from stderr.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{ApiError, DescribeApi, DescribeRequest};

const TRANSIENT_MARKERS: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
    "ServiceUnavailable",
    "InternalError",
    "RequestTimeout",
    "Could not connect to the endpoint URL",
    "Connection was closed",
    "Read timeout",
];

const AUTH_MARKERS: &[&str] = &[
    "AuthFailure",
    "UnauthorizedOperation",
    "ExpiredToken",
    "InvalidClientTokenId",
    "AccessDenied",
    "Unable to locate credentials",
    "The config profile",
];

/// Classify a failed CLI invocation by its stderr.
pub fn classify(stderr: &str) -> ApiError {
    let message = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("unknown error")
        .trim()
        .to_string();

    if AUTH_MARKERS.iter().any(|m| stderr.contains(m)) {
        ApiError::Auth(message)
    } else if TRANSIENT_MARKERS.iter().any(|m| stderr.contains(m)) {
        ApiError::Transient(message)
    } else {
        ApiError::Failed(message)
    }
}

#[derive(Debug, Clone)]
pub struct AwsCliApi {
    region: String,
    profile: Option<String>,
    program: String,
}

impl AwsCliApi {
    pub fn new(region: impl Into<String>, profile: Option<String>) -> Self {
        Self {
            region: region.into(),
            profile,
            program: "aws".into(),
        }
    }

    /// Override the executable (e.g. a wrapper script or absolute path).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Full argument vector for one request.
    pub fn command_args(&self, request: &DescribeRequest) -> Vec<String> {
        let mut args = vec![
            request.service().to_string(),
            request.operation().to_string(),
        ];
        args.extend(request.arguments());
        args.push("--region".into());
        args.push(self.region.clone());
        if let Some(profile) = &self.profile {
            args.push("--profile".into());
            args.push(profile.clone());
        }
        args.push("--output".into());
        args.push("json".into());
        args
    }
}

#[async_trait]
impl DescribeApi for AwsCliApi {
    async fn describe(&self, request: &DescribeRequest) -> Result<Value, ApiError> {
        let args = self.command_args(request);
        debug!(program = %self.program, args = ?args, "Running AWS CLI");

        let output = tokio::process::Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|e| ApiError::Failed(format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify(&stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&stdout)
            .map_err(|e| ApiError::Failed(format!("unparseable CLI output for {request}: {e}")))
    }

    fn name(&self) -> &'static str {
        "aws-cli"
    }
}
