//! Topology Partitioner
//!
//! Selects the managed hub and splits it into independent state boundaries:
//! one hub partition (gateway, every attachment, spoke VPC routes) and one
//! partition per route table (the table, its associations, propagations and
//! routes). Route-table partitions may reference hub attachments; nothing else
//! crosses a boundary.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ImportError, KeyKind, Result};
use crate::keys::{
    assign_keys, key_gateways, route_table_partition_key, sanitize, AttachmentRef, Keyed,
    KeyRegistry, KeyedLink, KeyedRoute, KeyedSnapshot,
};
use crate::model::{
    AttachmentKind, AttachmentRecord, ExcludedResource, GatewayRecord, ResourceSnapshot,
    RouteTableRecord, Scope, VpcRouteRecord,
};

// =============================================================================
// HUB SELECTION
// =============================================================================

/// How the managed hub is chosen when the scope holds several gateways.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HubSelector {
    /// Single gateway, else the unique one with default association and
    /// propagation both disabled.
    #[default]
    Auto,
    /// Gateway id, key, or display name.
    Explicit(String),
}

impl HubSelector {
    pub fn from_option(selection: Option<String>) -> Self {
        match selection {
            Some(s) if !s.trim().is_empty() => HubSelector::Explicit(s.trim().to_string()),
            _ => HubSelector::Auto,
        }
    }

    /// Pick the hub among the keyed gateways of `scope`.
    pub fn select<'a>(
        &self,
        scope: &Scope,
        gateways: &'a [Keyed<GatewayRecord>],
    ) -> Result<&'a Keyed<GatewayRecord>> {
        let labels = |gateways: &[&Keyed<GatewayRecord>]| -> Vec<String> {
            gateways.iter().map(|g| g.record.label()).collect()
        };
        let all: Vec<&Keyed<GatewayRecord>> = gateways.iter().collect();

        match self {
            HubSelector::Explicit(wanted) => {
                let wanted_key = sanitize(wanted);
                gateways
                    .iter()
                    .find(|g| g.record.id == *wanted || g.key == wanted_key)
                    .ok_or_else(|| {
                        ImportError::Config(format!(
                            "selected hub '{wanted}' is not in scope (available: {})",
                            labels(&all).join(", ")
                        ))
                    })
            }
            HubSelector::Auto => match all.as_slice() {
                [] => Err(ImportError::AmbiguousTopology {
                    reason: format!(
                        "no transit gateway found in {}/{}",
                        scope.account_label(),
                        scope.region
                    ),
                    candidates: Vec::new(),
                }),
                [only] => Ok(*only),
                several => {
                    let qualifying: Vec<&Keyed<GatewayRecord>> = several
                        .iter()
                        .copied()
                        .filter(|g| g.record.uses_custom_route_tables())
                        .collect();
                    match qualifying.as_slice() {
                        [hub] => Ok(*hub),
                        [] => Err(ImportError::AmbiguousTopology {
                            reason: "no gateway has default association and propagation disabled; select a hub explicitly".into(),
                            candidates: labels(several),
                        }),
                        _ => Err(ImportError::AmbiguousTopology {
                            reason: "several gateways have default association and propagation disabled; select a hub explicitly".into(),
                            candidates: labels(&qualifying),
                        }),
                    }
                }
            },
        }
    }
}

// =============================================================================
// PARTITIONS
// =============================================================================

/// The hub partition: gateway plus everything attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubPartition {
    pub name: String,
    pub gateway: GatewayRecord,
    pub attachments: Vec<Keyed<AttachmentRecord>>,
    pub spoke_routes: Vec<Keyed<VpcRouteRecord>>,
}

impl HubPartition {
    pub fn attachments_of(
        &self,
        kind: AttachmentKind,
    ) -> impl Iterator<Item = &Keyed<AttachmentRecord>> {
        self.attachments.iter().filter(move |a| a.record.kind() == kind)
    }

    fn resolves(&self, attachment: &AttachmentRef) -> bool {
        self.attachments
            .iter()
            .any(|a| a.key == attachment.key && a.record.id == attachment.id)
    }
}

/// One route table and the links and routes it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTablePartition {
    pub name: String,
    /// Name of the hub partition this table belongs to.
    pub hub: String,
    pub route_table: Keyed<RouteTableRecord>,
    pub associations: Vec<KeyedLink>,
    pub propagations: Vec<KeyedLink>,
    pub routes: Vec<KeyedRoute>,
}

impl RouteTablePartition {
    /// Every hub attachment this partition references, deduplicated.
    pub fn referenced_attachments(&self) -> Vec<&AttachmentRef> {
        let mut refs: Vec<&AttachmentRef> = self
            .associations
            .iter()
            .chain(&self.propagations)
            .map(|l| &l.attachment)
            .chain(self.routes.iter().filter_map(KeyedRoute::attachment))
            .collect();
        refs.sort();
        refs.dedup();
        refs
    }
}

/// Borrowed view over either partition shape.
#[derive(Debug, Clone, Copy)]
pub enum ManagementPartition<'a> {
    Hub(&'a HubPartition),
    RouteTable(&'a RouteTablePartition),
}

impl ManagementPartition<'_> {
    pub fn name(&self) -> &str {
        match self {
            ManagementPartition::Hub(hub) => &hub.name,
            ManagementPartition::RouteTable(rt) => &rt.name,
        }
    }

    pub fn is_hub(&self) -> bool {
        matches!(self, ManagementPartition::Hub(_))
    }
}

impl fmt::Display for ManagementPartition<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The selected hub split into partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionedTopology {
    pub scope: Scope,
    pub hub: HubPartition,
    pub route_tables: Vec<RouteTablePartition>,
    pub excluded: Vec<ExcludedResource>,
}

impl PartitionedTopology {
    /// Hub first, then route tables by name.
    pub fn partitions(&self) -> Vec<ManagementPartition<'_>> {
        std::iter::once(ManagementPartition::Hub(&self.hub))
            .chain(self.route_tables.iter().map(ManagementPartition::RouteTable))
            .collect()
    }

    /// Every link and route resolves to an attachment of the hub partition.
    pub fn verify_closure(&self) -> Result<()> {
        for rt in &self.route_tables {
            for attachment in rt.referenced_attachments() {
                if !self.hub.resolves(attachment) {
                    return Err(ImportError::MissingReference {
                        scope: rt.name.clone(),
                        kind: KeyKind::Attachment,
                        reference: attachment.key.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Select the hub, key its resources, and assign every keyed record to
/// exactly one partition.
pub fn partition(snapshot: &ResourceSnapshot, selector: &HubSelector) -> Result<PartitionedTopology> {
    let gateways = key_gateways(snapshot)?;
    let hub_id = selector.select(&snapshot.scope, &gateways)?.record.id.clone();
    let KeyedSnapshot {
        scope,
        hub: gateway,
        excluded,
    } = assign_keys(snapshot, &hub_id)?;

    let hub_name = gateway.key.clone();
    let mut partition_keys = KeyRegistry::new(
        format!("{}/{}", scope.account_label(), scope.region),
        KeyKind::Partition,
    );
    partition_keys.claim(&hub_name, &gateway.record.id)?;

    let mut route_tables = Vec::with_capacity(gateway.route_tables.len());
    for rt in gateway.route_tables {
        let name = route_table_partition_key(&hub_name, &rt.key);
        partition_keys.claim(&name, &rt.record.id)?;
        route_tables.push(RouteTablePartition {
            name,
            hub: hub_name.clone(),
            route_table: Keyed {
                key: rt.key,
                record: rt.record,
            },
            associations: rt.associations,
            propagations: rt.propagations,
            routes: rt.routes,
        });
    }
    route_tables.sort_by(|a, b| a.name.cmp(&b.name));

    let topology = PartitionedTopology {
        scope,
        hub: HubPartition {
            name: hub_name,
            gateway: gateway.record,
            attachments: gateway.attachments,
            spoke_routes: gateway.spoke_routes,
        },
        route_tables,
        excluded,
    };
    topology.verify_closure()?;

    info!(
        hub = %topology.hub.gateway.label(),
        partitions = topology.route_tables.len() + 1,
        attachments = topology.hub.attachments.len(),
        spoke_routes = topology.hub.spoke_routes.len(),
        "Partitioned topology"
    );
    Ok(topology)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyedRouteTarget;
    use crate::model::{
        AttachmentLink, AttachmentVariant, ResourceSnapshot, TagSet, Toggle, VpcAttachment,
    };

    fn gateway(id: &str, name: &str, custom: bool) -> GatewayRecord {
        let toggle = if custom { Toggle::Disable } else { Toggle::Enable };
        GatewayRecord {
            id: id.into(),
            name: Some(name.into()),
            arn: None,
            owner_id: None,
            description: String::new(),
            amazon_side_asn: 64512,
            auto_accept_shared_attachments: Toggle::Disable,
            default_route_table_association: toggle,
            default_route_table_propagation: toggle,
            dns_support: Toggle::Enable,
            vpn_ecmp_support: Toggle::Enable,
            multicast_support: Toggle::Disable,
            tags: TagSet::new(),
        }
    }

    fn route_table(id: &str, name: &str) -> RouteTableRecord {
        RouteTableRecord {
            id: id.into(),
            name: Some(name.into()),
            gateway_id: "tgw-hub".into(),
            default_association_route_table: false,
            default_propagation_route_table: false,
            tags: TagSet::new(),
        }
    }

    fn snapshot() -> ResourceSnapshot {
        let scope = Scope::new(Some("123456789012".into()), "ap-northeast-1");
        let mut builder = ResourceSnapshot::builder(scope);
        builder
            .gateway(gateway("tgw-hub", "multi-vpc-tgw", true))
            .gateway(gateway("tgw-legacy", "legacy-tgw", false))
            .route_table(route_table("tgw-rtb-prod", "tgw-rt-production"))
            .route_table(route_table("tgw-rtb-dev", "tgw-rt-development"))
            .attachment(AttachmentRecord {
                id: "tgw-attach-vpc1".into(),
                name: Some("tgw-attachment-vpc1".into()),
                gateway_id: "tgw-hub".into(),
                tags: TagSet::new(),
                variant: AttachmentVariant::Vpc(VpcAttachment {
                    vpc_id: "vpc-1".into(),
                    subnet_ids: vec!["subnet-1".into()],
                    appliance_mode_support: Toggle::Disable,
                    dns_support: Toggle::Enable,
                    ipv6_support: Toggle::Disable,
                    options_reported: true,
                }),
            })
            .association(AttachmentLink {
                route_table_id: "tgw-rtb-prod".into(),
                attachment_id: "tgw-attach-vpc1".into(),
            })
            .association(AttachmentLink {
                route_table_id: "tgw-rtb-dev".into(),
                attachment_id: "tgw-attach-vpc1".into(),
            });
        builder.build()
    }

    fn select(snapshot: &ResourceSnapshot, selector: &HubSelector) -> Result<String> {
        let gateways = key_gateways(snapshot)?;
        selector
            .select(&snapshot.scope, &gateways)
            .map(|g| g.record.id.clone())
    }

    fn candidates(err: ImportError) -> Vec<String> {
        match err {
            ImportError::AmbiguousTopology { candidates, .. } => candidates,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_auto_selects_custom_route_table_hub() {
        assert_eq!(select(&snapshot(), &HubSelector::Auto).unwrap(), "tgw-hub");
    }

    #[test]
    fn test_auto_without_qualifying_hub_is_ambiguous() {
        let mut builder = ResourceSnapshot::builder(Scope::new(None, "r"));
        builder
            .gateway(gateway("tgw-a", "a", false))
            .gateway(gateway("tgw-b", "b", false));
        let err = select(&builder.build(), &HubSelector::Auto).unwrap_err();
        assert_eq!(candidates(err), vec!["tgw-a (a)", "tgw-b (b)"]);
    }

    #[test]
    fn test_auto_with_several_qualifying_hubs_is_ambiguous() {
        let mut builder = ResourceSnapshot::builder(Scope::new(None, "r"));
        builder
            .gateway(gateway("tgw-a", "a", true))
            .gateway(gateway("tgw-b", "b", false))
            .gateway(gateway("tgw-c", "c", true));
        let err = select(&builder.build(), &HubSelector::Auto).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert_eq!(candidates(err), vec!["tgw-a (a)", "tgw-c (c)"]);
    }

    #[test]
    fn test_auto_in_empty_scope_is_ambiguous() {
        let snapshot = ResourceSnapshot::builder(Scope::new(Some("123456789012".into()), "r")).build();
        let err = select(&snapshot, &HubSelector::Auto).unwrap_err();
        assert!(err.to_string().contains("123456789012/r"));
        assert!(candidates(err).is_empty());
    }

    #[test]
    fn test_single_gateway_selected_without_custom_tables() {
        let mut builder = ResourceSnapshot::builder(Scope::new(None, "r"));
        builder.gateway(gateway("tgw-only", "only", false));
        assert_eq!(select(&builder.build(), &HubSelector::Auto).unwrap(), "tgw-only");
    }

    #[test]
    fn test_explicit_selection_by_id_key_or_name() {
        let snapshot = snapshot();
        for wanted in ["tgw-legacy", "legacy_tgw", "legacy-tgw"] {
            let hub = select(&snapshot, &HubSelector::from_option(Some(wanted.into()))).unwrap();
            assert_eq!(hub, "tgw-legacy");
        }
        let err = select(&snapshot, &HubSelector::Explicit("tgw-nope".into())).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_colliding_keys_on_other_gateway_do_not_block_hub() {
        let vpn = |id: &str, name: &str| AttachmentRecord {
            id: id.into(),
            name: Some(name.into()),
            gateway_id: "tgw-legacy".into(),
            tags: TagSet::new(),
            variant: AttachmentVariant::Vpn {
                vpn_connection_id: format!("vpn-{id}"),
            },
        };
        let mut snapshot = snapshot();
        snapshot.attachments.push(vpn("tgw-attach-1", "dup"));
        snapshot.attachments.push(vpn("tgw-attach-2", "DUP"));

        let topology = partition(&snapshot, &HubSelector::Auto).unwrap();
        assert_eq!(topology.hub.name, "multi_vpc_tgw");
        assert_eq!(topology.hub.attachments.len(), 1);

        let err = partition(&snapshot, &HubSelector::Explicit("legacy-tgw".into())).unwrap_err();
        assert!(matches!(
            err,
            ImportError::KeyCollision {
                kind: KeyKind::Attachment,
                ..
            }
        ));
    }

    #[test]
    fn test_shared_attachment_declared_once() {
        let topology = partition(&snapshot(), &HubSelector::Auto).unwrap();

        assert_eq!(topology.hub.name, "multi_vpc_tgw");
        assert_eq!(topology.hub.attachments.len(), 1);
        let partitions = topology.partitions();
        let names: Vec<&str> = partitions.iter().map(|p| p.name()).collect();
        assert_eq!(
            names,
            vec![
                "multi_vpc_tgw",
                "multi_vpc_tgw_rt_development",
                "multi_vpc_tgw_rt_production"
            ]
        );
        for rt in &topology.route_tables {
            assert_eq!(rt.associations.len(), 1);
            assert_eq!(rt.associations[0].key(), "tgw_attachment_vpc1");
        }
        assert_eq!(topology.hub.attachments_of(AttachmentKind::Vpc).count(), 1);
    }

    #[test]
    fn test_closure_violation_detected() {
        let mut topology = partition(&snapshot(), &HubSelector::Auto).unwrap();
        topology.route_tables[0].routes.push(KeyedRoute {
            key: "route_10_0_0_0_8".into(),
            route_table_id: "tgw-rtb-dev".into(),
            destination_cidr_block: "10.0.0.0/8".into(),
            target: KeyedRouteTarget::Attachment(AttachmentRef {
                key: "elsewhere".into(),
                kind: AttachmentKind::Vpc,
                id: "tgw-attach-other".into(),
                managed: true,
            }),
        });
        let err = topology.verify_closure().unwrap_err();
        assert!(matches!(err, ImportError::MissingReference { .. }));
    }

    #[test]
    fn test_partition_key_collision() {
        let mut builder = ResourceSnapshot::builder(Scope::new(None, "r"));
        builder
            .gateway(gateway("tgw-hub", "hub", true))
            .route_table(route_table("tgw-rtb-1", "tgw-rt-prod"))
            .route_table(route_table("tgw-rtb-2", "rt-prod"));
        let err = partition(&builder.build(), &HubSelector::Auto).unwrap_err();
        assert!(matches!(
            err,
            ImportError::KeyCollision {
                kind: KeyKind::Partition,
                ..
            }
        ));
    }
}
