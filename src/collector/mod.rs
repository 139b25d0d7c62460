//! Resource Collector
//!
//! Issues read-only describe requests for one account/region through a
//! [`DescribeApi`] and decodes the responses into a [`ResourceSnapshot`].
//!
//! Discovery runs in two stages through a bounded worker pool:
//!
//! 1. top-level listings (gateways, route tables, attachments, VPC route tables)
//! 2. per-parent details (associations, propagations and static routes per
//!    route table; VPC and peering details per attachment)
//!
//! Responses are keyed by their request and merged in request order, so the
//! snapshot never depends on completion order. Any failure aborts the run.

pub mod aws_cli;
mod decode;
pub mod directory;
pub mod retry;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use self::decode::Decoded;
use self::retry::{with_retry, RetryConfig};
use crate::error::{ImportError, Result};
use crate::model::{AttachmentKind, ResourceSnapshot, Scope};

pub use self::aws_cli::AwsCliApi;
pub use self::decode::DEFAULT_AMAZON_SIDE_ASN;
pub use self::directory::DirectoryApi;

// =============================================================================
// DESCRIBE CAPABILITY
// =============================================================================

/// One read-only call against the cloud API.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DescribeRequest {
    CallerIdentity,
    TransitGateways,
    RouteTables,
    Attachments,
    VpcRouteTables,
    VpcAttachment { attachment_id: String },
    PeeringAttachment { attachment_id: String },
    Associations { route_table_id: String },
    Propagations { route_table_id: String },
    StaticRoutes { route_table_id: String },
}

impl DescribeRequest {
    /// CLI service namespace.
    pub fn service(&self) -> &'static str {
        match self {
            DescribeRequest::CallerIdentity => "sts",
            _ => "ec2",
        }
    }

    /// CLI operation name.
    pub fn operation(&self) -> &'static str {
        match self {
            DescribeRequest::CallerIdentity => "get-caller-identity",
            DescribeRequest::TransitGateways => "describe-transit-gateways",
            DescribeRequest::RouteTables => "describe-transit-gateway-route-tables",
            DescribeRequest::Attachments => "describe-transit-gateway-attachments",
            DescribeRequest::VpcRouteTables => "describe-route-tables",
            DescribeRequest::VpcAttachment { .. } => "describe-transit-gateway-vpc-attachments",
            DescribeRequest::PeeringAttachment { .. } => {
                "describe-transit-gateway-peering-attachments"
            }
            DescribeRequest::Associations { .. } => "get-transit-gateway-route-table-associations",
            DescribeRequest::Propagations { .. } => "get-transit-gateway-route-table-propagations",
            DescribeRequest::StaticRoutes { .. } => "search-transit-gateway-routes",
        }
    }

    /// The parent resource a per-parent request is scoped to.
    pub fn parent_id(&self) -> Option<&str> {
        match self {
            DescribeRequest::VpcAttachment { attachment_id }
            | DescribeRequest::PeeringAttachment { attachment_id } => Some(attachment_id),
            DescribeRequest::Associations { route_table_id }
            | DescribeRequest::Propagations { route_table_id }
            | DescribeRequest::StaticRoutes { route_table_id } => Some(route_table_id),
            _ => None,
        }
    }

    /// Operation-specific CLI arguments.
    pub fn arguments(&self) -> Vec<String> {
        match self {
            DescribeRequest::VpcAttachment { attachment_id }
            | DescribeRequest::PeeringAttachment { attachment_id } => vec![
                "--transit-gateway-attachment-ids".into(),
                attachment_id.clone(),
            ],
            DescribeRequest::Associations { route_table_id }
            | DescribeRequest::Propagations { route_table_id } => vec![
                "--transit-gateway-route-table-id".into(),
                route_table_id.clone(),
            ],
            DescribeRequest::StaticRoutes { route_table_id } => vec![
                "--transit-gateway-route-table-id".into(),
                route_table_id.clone(),
                "--filters".into(),
                "Name=type,Values=static".into(),
            ],
            _ => Vec::new(),
        }
    }

    /// File name used by the directory layout of raw describe output.
    pub fn file_name(&self) -> String {
        match self {
            DescribeRequest::CallerIdentity => "caller-identity.json".into(),
            DescribeRequest::TransitGateways => "transit-gateways.json".into(),
            DescribeRequest::RouteTables => "tgw-route-tables.json".into(),
            DescribeRequest::Attachments => "tgw-attachments.json".into(),
            DescribeRequest::VpcRouteTables => "route-tables.json".into(),
            DescribeRequest::VpcAttachment { attachment_id } => {
                format!("tgw-vpc-attachment-{attachment_id}.json")
            }
            DescribeRequest::PeeringAttachment { attachment_id } => {
                format!("tgw-peering-attachment-{attachment_id}.json")
            }
            DescribeRequest::Associations { route_table_id } => {
                format!("tgw-rt-associations-{route_table_id}.json")
            }
            DescribeRequest::Propagations { route_table_id } => {
                format!("tgw-rt-propagations-{route_table_id}.json")
            }
            DescribeRequest::StaticRoutes { route_table_id } => {
                format!("tgw-rt-routes-{route_table_id}.json")
            }
        }
    }
}

impl fmt::Display for DescribeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parent_id() {
            Some(parent) => write!(f, "{}({})", self.operation(), parent),
            None => f.write_str(self.operation()),
        }
    }
}

/// Failure of a single describe call, classified for the retry policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("transient: {0}")]
    Transient(String),

    #[error("not authorized: {0}")]
    Auth(String),

    #[error("{0}")]
    Failed(String),
}

impl ApiError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transient(_))
    }
}

/// Opaque read-only access to the cloud API.
///
/// Implementations return the raw JSON document the API would return. A
/// resource kind with no instances is an empty list (or `Value::Null`), never
/// an error.
#[async_trait]
pub trait DescribeApi: Send + Sync {
    async fn describe(&self, request: &DescribeRequest) -> std::result::Result<Value, ApiError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

// =============================================================================
// COLLECTOR
// =============================================================================

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Maximum describe calls in flight.
    pub concurrency: usize,
    pub retry: RetryConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            retry: RetryConfig::default(),
        }
    }
}

pub struct Collector {
    api: Arc<dyn DescribeApi>,
    config: CollectorConfig,
}

type Responses = BTreeMap<DescribeRequest, Value>;

fn take(responses: &mut Responses, request: &DescribeRequest) -> Value {
    responses.remove(request).unwrap_or(Value::Null)
}

impl Collector {
    pub fn new(api: Arc<dyn DescribeApi>, config: CollectorConfig) -> Self {
        Self { api, config }
    }

    /// Discover everything in scope and seal it into a snapshot.
    pub async fn collect(&self, scope: Scope) -> Result<ResourceSnapshot> {
        let scope = self.resolve_account(scope).await?;
        info!(
            backend = self.api.name(),
            account = %scope.account_label(),
            region = %scope.region,
            concurrency = self.config.concurrency,
            "Starting discovery"
        );

        // Stage 1: listings
        let mut listings = self
            .fetch_all(vec![
                DescribeRequest::TransitGateways,
                DescribeRequest::RouteTables,
                DescribeRequest::Attachments,
                DescribeRequest::VpcRouteTables,
            ])
            .await?;

        let gateways = decode::gateways(take(&mut listings, &DescribeRequest::TransitGateways))?;
        let route_tables = decode::route_tables(take(&mut listings, &DescribeRequest::RouteTables))?;
        let summaries =
            decode::attachment_summaries(take(&mut listings, &DescribeRequest::Attachments))?;
        let vpc_routes = decode::vpc_routes(take(&mut listings, &DescribeRequest::VpcRouteTables))?;

        // Stage 2: per-parent details
        let mut requests = Vec::new();
        for rt in &route_tables {
            requests.push(DescribeRequest::Associations {
                route_table_id: rt.id.clone(),
            });
            requests.push(DescribeRequest::Propagations {
                route_table_id: rt.id.clone(),
            });
            requests.push(DescribeRequest::StaticRoutes {
                route_table_id: rt.id.clone(),
            });
        }
        for summary in &summaries {
            match summary.needs_detail() {
                Some(AttachmentKind::Vpc) => requests.push(DescribeRequest::VpcAttachment {
                    attachment_id: summary.id.clone(),
                }),
                Some(AttachmentKind::Peering) => {
                    requests.push(DescribeRequest::PeeringAttachment {
                        attachment_id: summary.id.clone(),
                    })
                }
                _ => {}
            }
        }
        let mut details = self.fetch_all(requests).await?;

        let mut builder = ResourceSnapshot::builder(scope);
        for gateway in gateways {
            builder.gateway(gateway);
        }

        for rt in &route_tables {
            let rt_id = rt.id.clone();
            let associations = take(
                &mut details,
                &DescribeRequest::Associations {
                    route_table_id: rt_id.clone(),
                },
            );
            for link in decode::associations(associations, &rt_id)? {
                builder.association(link);
            }

            let propagations = take(
                &mut details,
                &DescribeRequest::Propagations {
                    route_table_id: rt_id.clone(),
                },
            );
            for link in decode::propagations(propagations, &rt_id)? {
                builder.propagation(link);
            }

            let routes = take(
                &mut details,
                &DescribeRequest::StaticRoutes {
                    route_table_id: rt_id.clone(),
                },
            );
            for route in decode::static_routes(routes, &rt_id)? {
                match route {
                    Decoded::Record(route) => {
                        builder.route(route);
                    }
                    Decoded::Excluded(excluded) => {
                        warn!(kind = %excluded.kind, id = %excluded.id, reason = %excluded.reason, "Excluding resource");
                        builder.exclude(excluded);
                    }
                }
            }
        }
        for rt in route_tables {
            builder.route_table(rt);
        }

        for summary in &summaries {
            let decoded = match summary.needs_detail() {
                Some(AttachmentKind::Vpc) => {
                    let request = DescribeRequest::VpcAttachment {
                        attachment_id: summary.id.clone(),
                    };
                    decode::vpc_attachment(summary, take(&mut details, &request))?
                }
                Some(AttachmentKind::Peering) => {
                    let request = DescribeRequest::PeeringAttachment {
                        attachment_id: summary.id.clone(),
                    };
                    decode::peering_attachment(summary, take(&mut details, &request))?
                }
                _ => summary.decode_without_detail(),
            };
            match decoded {
                Decoded::Record(attachment) => {
                    builder.attachment(attachment);
                }
                Decoded::Excluded(excluded) => {
                    warn!(kind = %excluded.kind, id = %excluded.id, reason = %excluded.reason, "Excluding resource");
                    builder.exclude(excluded);
                }
            }
        }

        for decoded in vpc_routes {
            match decoded {
                Decoded::Record(route) => {
                    builder.vpc_route(route);
                }
                Decoded::Excluded(excluded) => {
                    warn!(kind = %excluded.kind, id = %excluded.id, reason = %excluded.reason, "Excluding resource");
                    builder.exclude(excluded);
                }
            }
        }

        let snapshot = builder.build();
        info!(
            gateways = snapshot.gateways.len(),
            route_tables = snapshot.route_tables.len(),
            attachments = snapshot.attachments.len(),
            associations = snapshot.associations.len(),
            propagations = snapshot.propagations.len(),
            routes = snapshot.routes.len(),
            vpc_routes = snapshot.vpc_routes.len(),
            excluded = snapshot.excluded.len(),
            "Discovery complete"
        );
        Ok(snapshot)
    }

    async fn resolve_account(&self, scope: Scope) -> Result<Scope> {
        if scope.account_id.is_some() {
            return Ok(scope);
        }

        let identity = self.fetch(&DescribeRequest::CallerIdentity).await?;
        let account_id = identity
            .get("Account")
            .and_then(Value::as_str)
            .map(str::to_string);
        if account_id.is_none() {
            warn!("Caller identity did not report an account id");
        }
        Ok(Scope {
            account_id,
            region: scope.region,
        })
    }

    /// Run requests through the worker pool. The first failure cancels the rest.
    async fn fetch_all(&self, requests: Vec<DescribeRequest>) -> Result<Responses> {
        let results: Vec<(DescribeRequest, Value)> = stream::iter(requests)
            .map(|request| async move {
                let value = self.fetch(&request).await?;
                Ok::<_, ImportError>((request, value))
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .try_collect()
            .await?;

        Ok(results.into_iter().collect())
    }

    async fn fetch(&self, request: &DescribeRequest) -> Result<Value> {
        debug!(request = %request, "Describing");
        with_retry(&self.config.retry, request, || self.api.describe(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_display_includes_parent() {
        let request = DescribeRequest::StaticRoutes {
            route_table_id: "tgw-rtb-1".into(),
        };
        assert_eq!(request.to_string(), "search-transit-gateway-routes(tgw-rtb-1)");
        assert_eq!(
            DescribeRequest::TransitGateways.to_string(),
            "describe-transit-gateways"
        );
    }

    #[test]
    fn test_file_names_follow_directory_layout() {
        let request = DescribeRequest::Associations {
            route_table_id: "tgw-rtb-1".into(),
        };
        assert_eq!(request.file_name(), "tgw-rt-associations-tgw-rtb-1.json");
        assert_eq!(
            DescribeRequest::VpcAttachment {
                attachment_id: "tgw-attach-1".into()
            }
            .file_name(),
            "tgw-vpc-attachment-tgw-attach-1.json"
        );
    }

    #[test]
    fn test_static_route_request_filters_type() {
        let args = DescribeRequest::StaticRoutes {
            route_table_id: "tgw-rtb-1".into(),
        }
        .arguments();
        assert!(args.contains(&"Name=type,Values=static".to_string()));
    }
}
