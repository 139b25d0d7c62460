//! Collector tests against a scripted in-memory `DescribeApi`
//!
//! Covers the retry policy as seen through a full discovery run, fail-fast
//! authorization errors, empty regions, and independence from response order.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use tgw_importer::collector::retry::RetryConfig;
use tgw_importer::collector::{ApiError, Collector, CollectorConfig, DescribeApi, DescribeRequest};
use tgw_importer::{ImportError, Scope};

// =========================================================================
// TEST INFRASTRUCTURE
// =========================================================================

/// Responses keyed by the request's saved-output file name, with optional
/// failures served before the response.
#[derive(Default)]
struct ScriptedApi {
    responses: HashMap<String, Value>,
    failures: Mutex<HashMap<String, VecDeque<ApiError>>>,
    calls: Mutex<Vec<String>>,
    /// Stagger completion so responses arrive out of request order.
    stagger: bool,
}

impl ScriptedApi {
    fn with_topology() -> Self {
        let mut responses = HashMap::new();
        responses.insert(
            DescribeRequest::TransitGateways.file_name(),
            json!({"TransitGateways": [{
                "TransitGatewayId": "tgw-1",
                "State": "available",
                "Options": {
                    "DefaultRouteTableAssociation": "disable",
                    "DefaultRouteTablePropagation": "disable"
                },
                "Tags": [{"Key": "Name", "Value": "core"}]
            }]}),
        );
        responses.insert(
            DescribeRequest::RouteTables.file_name(),
            json!({"TransitGatewayRouteTables": [
                {"TransitGatewayRouteTableId": "tgw-rtb-a", "TransitGatewayId": "tgw-1", "State": "available"},
                {"TransitGatewayRouteTableId": "tgw-rtb-b", "TransitGatewayId": "tgw-1", "State": "available"}
            ]}),
        );
        responses.insert(
            DescribeRequest::Attachments.file_name(),
            json!({"TransitGatewayAttachments": [{
                "TransitGatewayAttachmentId": "tgw-attach-1",
                "TransitGatewayId": "tgw-1",
                "ResourceType": "vpc",
                "ResourceId": "vpc-1",
                "State": "available"
            }]}),
        );
        responses.insert(
            DescribeRequest::VpcAttachment {
                attachment_id: "tgw-attach-1".into(),
            }
            .file_name(),
            json!({"TransitGatewayVpcAttachments": [{
                "TransitGatewayAttachmentId": "tgw-attach-1",
                "VpcId": "vpc-1",
                "SubnetIds": ["subnet-1"]
            }]}),
        );
        for rt in ["tgw-rtb-a", "tgw-rtb-b"] {
            responses.insert(
                DescribeRequest::Associations {
                    route_table_id: rt.into(),
                }
                .file_name(),
                json!({"Associations": [
                    {"TransitGatewayAttachmentId": "tgw-attach-1", "State": "associated"}
                ]}),
            );
            responses.insert(
                DescribeRequest::StaticRoutes {
                    route_table_id: rt.into(),
                }
                .file_name(),
                json!({"Routes": [
                    {"DestinationCidrBlock": "10.0.0.0/8", "Type": "static", "State": "active",
                     "TransitGatewayAttachments": [{"TransitGatewayAttachmentId": "tgw-attach-1"}]}
                ]}),
            );
        }
        Self {
            responses,
            ..Self::default()
        }
    }

    fn fail(self, request: DescribeRequest, errors: Vec<ApiError>) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(request.file_name(), errors.into());
        self
    }

    fn calls_to(&self, request: &DescribeRequest) -> usize {
        let name = request.file_name();
        self.calls.lock().unwrap().iter().filter(|c| **c == name).count()
    }
}

#[async_trait]
impl DescribeApi for ScriptedApi {
    async fn describe(&self, request: &DescribeRequest) -> Result<Value, ApiError> {
        let name = request.file_name();
        self.calls.lock().unwrap().push(name.clone());

        if self.stagger {
            let delay = name.bytes().map(u64::from).sum::<u64>() % 7;
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let failure = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&name)
            .and_then(VecDeque::pop_front);
        if let Some(error) = failure {
            return Err(error);
        }
        Ok(self.responses.get(&name).cloned().unwrap_or(Value::Null))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

fn quick_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_delay_ms: 1,
        max_delay_ms: 5,
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

fn collector(api: &Arc<ScriptedApi>, concurrency: usize, retry: RetryConfig) -> Collector {
    let api: Arc<dyn DescribeApi> = api.clone();
    Collector::new(api, CollectorConfig { concurrency, retry })
}

fn scope() -> Scope {
    Scope::new(Some("123456789012".into()), "ap-northeast-1")
}

// =========================================================================
// TESTS
// =========================================================================

#[tokio::test]
async fn test_collects_every_parent_detail() {
    let api = Arc::new(ScriptedApi::with_topology());
    let snapshot = collector(&api, 4, quick_retry(0))
        .collect(scope())
        .await
        .unwrap();

    assert_eq!(snapshot.gateways.len(), 1);
    assert_eq!(snapshot.route_tables.len(), 2);
    assert_eq!(snapshot.attachments.len(), 1);
    assert_eq!(snapshot.associations.len(), 2);
    assert_eq!(snapshot.routes.len(), 2);

    for rt in ["tgw-rtb-a", "tgw-rtb-b"] {
        let route_table_id = rt.to_string();
        assert_eq!(
            api.calls_to(&DescribeRequest::Propagations {
                route_table_id: route_table_id.clone()
            }),
            1
        );
        assert_eq!(
            api.calls_to(&DescribeRequest::StaticRoutes { route_table_id }),
            1
        );
    }
    // Account id was configured, so no identity call.
    assert_eq!(api.calls_to(&DescribeRequest::CallerIdentity), 0);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let request = DescribeRequest::TransitGateways;
    let api = Arc::new(ScriptedApi::with_topology().fail(
        request.clone(),
        vec![
            ApiError::Transient("RequestLimitExceeded".into()),
            ApiError::Transient("Throttling".into()),
        ],
    ));

    let snapshot = collector(&api, 4, quick_retry(3))
        .collect(scope())
        .await
        .unwrap();

    assert_eq!(snapshot.gateways.len(), 1);
    assert_eq!(api.calls_to(&request), 3);
}

#[tokio::test]
async fn test_exhausted_retries_abort_discovery() {
    let request = DescribeRequest::StaticRoutes {
        route_table_id: "tgw-rtb-b".into(),
    };
    let api = Arc::new(ScriptedApi::with_topology().fail(
        request.clone(),
        vec![ApiError::Transient("Throttling".into()); 5],
    ));

    let err = collector(&api, 4, quick_retry(2))
        .collect(scope())
        .await
        .unwrap_err();

    match &err {
        ImportError::TransientApi { attempts, .. } => assert_eq!(*attempts, 3),
        other => panic!("expected TransientApi, got {other:?}"),
    }
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn test_authorization_failure_is_not_retried() {
    let request = DescribeRequest::Attachments;
    let api = Arc::new(ScriptedApi::with_topology().fail(
        request.clone(),
        vec![ApiError::Auth("UnauthorizedOperation".into())],
    ));

    let err = collector(&api, 4, quick_retry(3))
        .collect(scope())
        .await
        .unwrap_err();

    assert!(matches!(err, ImportError::Auth { .. }));
    assert_eq!(err.exit_code(), 4);
    assert_eq!(api.calls_to(&request), 1);
}

#[tokio::test]
async fn test_empty_region_is_an_empty_snapshot() {
    let api = Arc::new(ScriptedApi::default());
    let snapshot = collector(&api, 2, quick_retry(0))
        .collect(scope())
        .await
        .unwrap();

    assert!(snapshot.gateways.is_empty());
    assert!(snapshot.route_tables.is_empty());
    assert!(snapshot.attachments.is_empty());
    assert!(snapshot.excluded.is_empty());
}

#[tokio::test]
async fn test_prefix_list_spoke_route_is_excluded() {
    let mut api = ScriptedApi::with_topology();
    api.responses.insert(
        DescribeRequest::VpcRouteTables.file_name(),
        json!({"RouteTables": [{
            "RouteTableId": "rtb-0app",
            "VpcId": "vpc-1",
            "Routes": [
                {"DestinationCidrBlock": "10.0.0.0/8", "TransitGatewayId": "tgw-1"},
                {"DestinationPrefixListId": "pl-0corp", "TransitGatewayId": "tgw-1"}
            ]
        }]}),
    );
    let api = Arc::new(api);

    let snapshot = collector(&api, 4, quick_retry(0))
        .collect(scope())
        .await
        .unwrap();

    assert_eq!(snapshot.vpc_routes.len(), 1);
    assert_eq!(snapshot.vpc_routes[0].destination, "10.0.0.0/8");
    assert!(snapshot
        .excluded
        .iter()
        .any(|e| e.kind == "vpc-prefix-list-route" && e.id == "rtb-0app_pl-0corp"));
}

#[tokio::test]
async fn test_account_resolved_from_caller_identity() {
    let mut api = ScriptedApi::default();
    api.responses.insert(
        DescribeRequest::CallerIdentity.file_name(),
        json!({"Account": "210987654321", "Arn": "arn:aws:iam::210987654321:user/ops"}),
    );
    let api = Arc::new(api);

    let snapshot = collector(&api, 2, quick_retry(0))
        .collect(Scope::new(None, "us-east-1"))
        .await
        .unwrap();

    assert_eq!(snapshot.scope.account_id.as_deref(), Some("210987654321"));
    assert_eq!(snapshot.scope.region, "us-east-1");
}

#[tokio::test]
async fn test_snapshot_independent_of_completion_order() {
    let serial = Arc::new(ScriptedApi::with_topology());
    let staggered = Arc::new(ScriptedApi {
        stagger: true,
        ..ScriptedApi::with_topology()
    });

    let a = collector(&serial, 1, quick_retry(0))
        .collect(scope())
        .await
        .unwrap();
    let b = collector(&staggered, 16, quick_retry(0))
        .collect(scope())
        .await
        .unwrap();

    assert_eq!(a, b);
    assert_eq!(a.to_json_pretty().unwrap(), b.to_json_pretty().unwrap());
}
