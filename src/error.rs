//! Error taxonomy for the import pipeline
//!
//! Every fatal failure maps to exactly one `ImportError` variant. The only
//! recoverable condition, a resource that cannot be bound to its live object,
//! is modelled separately as `UnsupportedReconciliation` and collected into the
//! reconciliation plan instead of aborting the run.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::ResourceKind;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ImportError>;

/// Main error type for discovery, keying, partitioning, and synthesis.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Transient API failure in {operation} after {attempts} attempt(s): {message}")]
    TransientApi {
        operation: String,
        attempts: u32,
        message: String,
    },

    #[error("Authorization failure in {operation}: {message}")]
    Auth { operation: String, message: String },

    #[error("API call {operation} failed: {message}")]
    Api { operation: String, message: String },

    #[error("Ambiguous topology: {reason} (candidates: {})", candidates.join(", "))]
    AmbiguousTopology {
        reason: String,
        candidates: Vec<String>,
    },

    #[error("Key collision in {scope}: {kind} key '{key}' derived from both {first} and {second}")]
    KeyCollision {
        scope: String,
        kind: KeyKind,
        key: String,
        first: String,
        second: String,
    },

    #[error("Missing reference in {scope}: {kind} '{reference}' is not part of the snapshot")]
    MissingReference {
        scope: String,
        kind: KeyKind,
        reference: String,
    },

    #[error("Invalid {kind} record '{id}': {reason}")]
    InvalidRecord {
        kind: &'static str,
        id: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ImportError {
    /// Process exit status for this failure.
    ///
    /// `2` configuration and model errors, `3` transient API failures,
    /// `4` authorization failures, `1` everything else.
    pub fn exit_code(&self) -> u8 {
        match self {
            ImportError::AmbiguousTopology { .. }
            | ImportError::KeyCollision { .. }
            | ImportError::MissingReference { .. }
            | ImportError::InvalidRecord { .. }
            | ImportError::Config(_)
            | ImportError::Yaml(_) => 2,
            ImportError::TransientApi { .. } => 3,
            ImportError::Auth { .. } => 4,
            ImportError::Api { .. }
            | ImportError::Task(_)
            | ImportError::Io(_)
            | ImportError::Json(_) => 1,
        }
    }

    /// Whether the failure came from the model rather than the environment.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ImportError::AmbiguousTopology { .. }
                | ImportError::KeyCollision { .. }
                | ImportError::MissingReference { .. }
                | ImportError::InvalidRecord { .. }
        )
    }

    /// What the operator can do about a structural failure.
    pub fn hint(&self) -> Option<&'static str> {
        if !self.is_structural() {
            return None;
        }
        Some(match self {
            ImportError::AmbiguousTopology { .. } => "select the hub explicitly with --hub <id|name>",
            ImportError::KeyCollision { .. } => "give the colliding resources distinct Name tags",
            _ => "re-run discovery to refresh the snapshot",
        })
    }
}

/// The resource kind a derived key belongs to.
///
/// Keys only need to be unique per (scope, kind). All attachment variants share
/// one kind because route tables reference them by key alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    Gateway,
    RouteTable,
    Attachment,
    Association,
    Propagation,
    Route,
    SpokeRoute,
    Partition,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyKind::Gateway => "gateway",
            KeyKind::RouteTable => "route table",
            KeyKind::Attachment => "attachment",
            KeyKind::Association => "association",
            KeyKind::Propagation => "propagation",
            KeyKind::Route => "route",
            KeyKind::SpokeRoute => "spoke route",
            KeyKind::Partition => "partition",
        };
        f.write_str(name)
    }
}

/// A declared resource that is left out of the reconciliation plan.
///
/// Recoverable: the pipeline keeps going and the operator gets a summary of
/// what must be imported by hand or accepted as unmanaged.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{address} ({external_id}) in {partition} cannot be reconciled: {reason}")]
pub struct UnsupportedReconciliation {
    pub partition: String,
    pub kind: ResourceKind,
    pub address: String,
    pub external_id: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_distinguish_failure_classes() {
        let transient = ImportError::TransientApi {
            operation: "describe-transit-gateways".into(),
            attempts: 5,
            message: "Throttling".into(),
        };
        let auth = ImportError::Auth {
            operation: "describe-transit-gateways".into(),
            message: "UnauthorizedOperation".into(),
        };
        let ambiguous = ImportError::AmbiguousTopology {
            reason: "no gateway has default association and propagation disabled".into(),
            candidates: vec!["tgw-1".into(), "tgw-2".into()],
        };

        assert_eq!(transient.exit_code(), 3);
        assert_eq!(auth.exit_code(), 4);
        assert_eq!(ambiguous.exit_code(), 2);
        assert_ne!(transient.exit_code(), auth.exit_code());
    }

    #[test]
    fn test_ambiguous_topology_lists_candidates() {
        let err = ImportError::AmbiguousTopology {
            reason: "two gateways qualify".into(),
            candidates: vec!["tgw-a (a)".into(), "tgw-b (b)".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("tgw-a (a), tgw-b (b)"));
        assert!(err.is_structural());
        assert_eq!(err.hint(), Some("select the hub explicitly with --hub <id|name>"));
    }

    #[test]
    fn test_hint_only_for_structural_errors() {
        let missing = ImportError::MissingReference {
            scope: "tgw-rtb-1".into(),
            kind: KeyKind::Attachment,
            reference: "tgw-attach-ghost".into(),
        };
        assert_eq!(missing.hint(), Some("re-run discovery to refresh the snapshot"));

        let throttled = ImportError::TransientApi {
            operation: "describe-transit-gateways".into(),
            attempts: 5,
            message: "Throttling".into(),
        };
        assert!(!throttled.is_structural());
        assert_eq!(throttled.hint(), None);
        assert_eq!(ImportError::Config("bad".into()).hint(), None);
    }

    #[test]
    fn test_key_collision_display() {
        let err = ImportError::KeyCollision {
            scope: "tgw-0abc".into(),
            kind: KeyKind::Attachment,
            key: "vpc_a".into(),
            first: "tgw-attach-1".into(),
            second: "tgw-attach-2".into(),
        };
        assert_eq!(
            err.to_string(),
            "Key collision in tgw-0abc: attachment key 'vpc_a' derived from both tgw-attach-1 and tgw-attach-2"
        );
    }
}
