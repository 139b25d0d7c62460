//! Raw EC2 describe output → typed records.
//!
//! The raw structs mirror the JSON returned by the EC2 API (and the AWS CLI).
//! Every default is resolved here; records leave this module fully populated.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{ImportError, Result};
use crate::model::{
    AttachmentKind, AttachmentLink, AttachmentRecord, AttachmentVariant, ExcludedResource,
    GatewayRecord, PeeringAttachment, PeeringRole, RouteRecord, RouteTableRecord, RouteTarget,
    TagSet, Toggle, VpcAttachment, VpcRouteRecord,
};

/// Defaults the EC2 API applies when an option is not reported.
pub const DEFAULT_AMAZON_SIDE_ASN: u64 = 64512;

const GONE_STATES: &[&str] = &[
    "deleted", "deleting", "failed", "failing", "rejected", "rejecting",
];

fn is_gone(state: Option<&str>) -> bool {
    state.is_some_and(|s| GONE_STATES.contains(&s))
}

fn parse<T: DeserializeOwned + Default>(value: Value) -> Result<T> {
    if value.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(value)?)
}

// =============================================================================
// RAW SHAPES
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawTag {
    key: String,
    #[serde(default)]
    value: String,
}

fn tag_set(tags: Option<Vec<RawTag>>) -> TagSet {
    tags.unwrap_or_default()
        .into_iter()
        .map(|t| (t.key, t.value))
        .collect()
}

fn name_of(tags: &TagSet) -> Option<String> {
    tags.get("Name")
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawTransitGateways {
    #[serde(default)]
    transit_gateways: Vec<RawTransitGateway>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawTransitGateway {
    transit_gateway_id: String,
    transit_gateway_arn: Option<String>,
    owner_id: Option<String>,
    state: Option<String>,
    description: Option<String>,
    #[serde(default)]
    options: RawGatewayOptions,
    tags: Option<Vec<RawTag>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawGatewayOptions {
    amazon_side_asn: Option<u64>,
    auto_accept_shared_attachments: Option<String>,
    default_route_table_association: Option<String>,
    default_route_table_propagation: Option<String>,
    dns_support: Option<String>,
    vpn_ecmp_support: Option<String>,
    multicast_support: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawRouteTables {
    #[serde(default)]
    transit_gateway_route_tables: Vec<RawRouteTable>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawRouteTable {
    transit_gateway_route_table_id: String,
    transit_gateway_id: String,
    state: Option<String>,
    #[serde(default)]
    default_association_route_table: bool,
    #[serde(default)]
    default_propagation_route_table: bool,
    tags: Option<Vec<RawTag>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawAttachments {
    #[serde(default)]
    transit_gateway_attachments: Vec<RawAttachment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawAttachment {
    transit_gateway_attachment_id: String,
    transit_gateway_id: String,
    resource_type: Option<String>,
    resource_id: Option<String>,
    state: Option<String>,
    tags: Option<Vec<RawTag>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawVpcAttachments {
    #[serde(default)]
    transit_gateway_vpc_attachments: Vec<RawVpcAttachment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawVpcAttachment {
    transit_gateway_attachment_id: String,
    vpc_id: Option<String>,
    #[serde(default)]
    subnet_ids: Vec<String>,
    options: Option<RawVpcOptions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawVpcOptions {
    appliance_mode_support: Option<String>,
    dns_support: Option<String>,
    ipv6_support: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawPeeringAttachments {
    #[serde(default)]
    transit_gateway_peering_attachments: Vec<RawPeeringAttachment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawPeeringAttachment {
    transit_gateway_attachment_id: String,
    requester_tgw_info: Option<RawPeeringInfo>,
    accepter_tgw_info: Option<RawPeeringInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawPeeringInfo {
    transit_gateway_id: Option<String>,
    owner_id: Option<String>,
    region: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawAssociations {
    #[serde(default)]
    associations: Vec<RawLink>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawPropagations {
    #[serde(default)]
    transit_gateway_route_table_propagations: Vec<RawLink>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawLink {
    transit_gateway_attachment_id: Option<String>,
    state: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawRoutes {
    #[serde(default)]
    routes: Vec<RawRoute>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawRoute {
    destination_cidr_block: Option<String>,
    prefix_list_id: Option<String>,
    #[serde(default)]
    transit_gateway_attachments: Vec<RawRouteAttachment>,
    #[serde(rename = "Type")]
    route_type: Option<String>,
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawRouteAttachment {
    transit_gateway_attachment_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawVpcRouteTables {
    #[serde(default)]
    route_tables: Vec<RawVpcRouteTable>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawVpcRouteTable {
    route_table_id: String,
    vpc_id: Option<String>,
    #[serde(default)]
    routes: Vec<RawVpcRoute>,
    tags: Option<Vec<RawTag>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawVpcRoute {
    destination_cidr_block: Option<String>,
    destination_ipv6_cidr_block: Option<String>,
    destination_prefix_list_id: Option<String>,
    transit_gateway_id: Option<String>,
}

// =============================================================================
// DECODERS
// =============================================================================

/// A decoded record, or the reason it cannot be represented.
#[derive(Debug)]
pub(crate) enum Decoded<T> {
    Record(T),
    Excluded(ExcludedResource),
}

/// What the attachment list tells us before any detail call.
#[derive(Debug, Clone)]
pub(crate) struct AttachmentSummary {
    pub id: String,
    pub gateway_id: String,
    pub resource_type: String,
    pub resource_id: String,
    pub tags: TagSet,
}

impl AttachmentSummary {
    /// Attachments whose variant needs a detail call to be declared.
    pub fn needs_detail(&self) -> Option<AttachmentKind> {
        match self.kind() {
            Some(AttachmentKind::Vpc) => Some(AttachmentKind::Vpc),
            Some(AttachmentKind::Peering) => Some(AttachmentKind::Peering),
            _ => None,
        }
    }

    fn kind(&self) -> Option<AttachmentKind> {
        match self.resource_type.as_str() {
            // Older API responses report TGW peering as `tgw-peering`.
            "tgw-peering" => Some(AttachmentKind::Peering),
            other => AttachmentKind::from_api_name(other),
        }
    }

    fn record(&self, variant: AttachmentVariant) -> AttachmentRecord {
        AttachmentRecord {
            id: self.id.clone(),
            name: name_of(&self.tags),
            gateway_id: self.gateway_id.clone(),
            tags: self.tags.clone(),
            variant,
        }
    }

    fn excluded(&self, reason: impl Into<String>) -> ExcludedResource {
        ExcludedResource {
            kind: format!("{}-attachment", self.resource_type),
            id: self.id.clone(),
            reason: reason.into(),
        }
    }

    /// Decode variants that are fully described by the list call.
    pub fn decode_without_detail(&self) -> Decoded<AttachmentRecord> {
        let resource_id = self.resource_id.clone();
        match self.kind() {
            Some(AttachmentKind::Vpn) => Decoded::Record(self.record(AttachmentVariant::Vpn {
                vpn_connection_id: resource_id,
            })),
            Some(AttachmentKind::DirectConnect) => {
                Decoded::Record(self.record(AttachmentVariant::DirectConnect {
                    dx_gateway_id: resource_id,
                }))
            }
            Some(AttachmentKind::NetworkFunction) => {
                Decoded::Record(self.record(AttachmentVariant::NetworkFunction { resource_id }))
            }
            Some(AttachmentKind::Vpc) | Some(AttachmentKind::Peering) => {
                Decoded::Excluded(self.excluded("attachment details were not reported"))
            }
            None => Decoded::Excluded(self.excluded(format!(
                "attachment type '{}' cannot be reconstructed from describe output",
                self.resource_type
            ))),
        }
    }
}

pub(crate) fn gateways(value: Value) -> Result<Vec<GatewayRecord>> {
    let raw: RawTransitGateways = parse(value)?;
    Ok(raw
        .transit_gateways
        .into_iter()
        .filter(|g| !is_gone(g.state.as_deref()))
        .map(|g| {
            let tags = tag_set(g.tags);
            let o = g.options;
            GatewayRecord {
                id: g.transit_gateway_id,
                name: name_of(&tags),
                arn: g.transit_gateway_arn,
                owner_id: g.owner_id,
                description: g.description.unwrap_or_default(),
                amazon_side_asn: o.amazon_side_asn.unwrap_or(DEFAULT_AMAZON_SIDE_ASN),
                auto_accept_shared_attachments: Toggle::parse_or(
                    o.auto_accept_shared_attachments.as_deref(),
                    Toggle::Disable,
                ),
                default_route_table_association: Toggle::parse_or(
                    o.default_route_table_association.as_deref(),
                    Toggle::Enable,
                ),
                default_route_table_propagation: Toggle::parse_or(
                    o.default_route_table_propagation.as_deref(),
                    Toggle::Enable,
                ),
                dns_support: Toggle::parse_or(o.dns_support.as_deref(), Toggle::Enable),
                vpn_ecmp_support: Toggle::parse_or(o.vpn_ecmp_support.as_deref(), Toggle::Enable),
                multicast_support: Toggle::parse_or(
                    o.multicast_support.as_deref(),
                    Toggle::Disable,
                ),
                tags,
            }
        })
        .collect())
}

pub(crate) fn route_tables(value: Value) -> Result<Vec<RouteTableRecord>> {
    let raw: RawRouteTables = parse(value)?;
    Ok(raw
        .transit_gateway_route_tables
        .into_iter()
        .filter(|rt| !is_gone(rt.state.as_deref()))
        .map(|rt| {
            let tags = tag_set(rt.tags);
            RouteTableRecord {
                id: rt.transit_gateway_route_table_id,
                name: name_of(&tags),
                gateway_id: rt.transit_gateway_id,
                default_association_route_table: rt.default_association_route_table,
                default_propagation_route_table: rt.default_propagation_route_table,
                tags,
            }
        })
        .collect())
}

pub(crate) fn attachment_summaries(value: Value) -> Result<Vec<AttachmentSummary>> {
    let raw: RawAttachments = parse(value)?;
    Ok(raw
        .transit_gateway_attachments
        .into_iter()
        .filter(|a| !is_gone(a.state.as_deref()))
        .map(|a| AttachmentSummary {
            id: a.transit_gateway_attachment_id,
            gateway_id: a.transit_gateway_id,
            resource_type: a.resource_type.unwrap_or_default(),
            resource_id: a.resource_id.unwrap_or_default(),
            tags: tag_set(a.tags),
        })
        .collect())
}

pub(crate) fn vpc_attachment(
    summary: &AttachmentSummary,
    detail: Value,
) -> Result<Decoded<AttachmentRecord>> {
    let raw: RawVpcAttachments = parse(detail)?;
    let Some(detail) = raw
        .transit_gateway_vpc_attachments
        .into_iter()
        .find(|d| d.transit_gateway_attachment_id == summary.id)
    else {
        return Ok(Decoded::Excluded(
            summary.excluded("VPC attachment details were not reported"),
        ));
    };

    if detail.subnet_ids.is_empty() {
        return Ok(Decoded::Excluded(
            summary.excluded("VPC attachment reports no subnet ids"),
        ));
    }

    let mut subnet_ids = detail.subnet_ids;
    subnet_ids.sort();
    subnet_ids.dedup();

    let options_reported = detail.options.is_some();
    let options = detail.options;
    let toggle = |pick: fn(&RawVpcOptions) -> Option<&String>, default| {
        Toggle::parse_or(options.as_ref().and_then(pick).map(String::as_str), default)
    };

    let vpc = VpcAttachment {
        vpc_id: detail
            .vpc_id
            .unwrap_or_else(|| summary.resource_id.clone()),
        subnet_ids,
        appliance_mode_support: toggle(|o| o.appliance_mode_support.as_ref(), Toggle::Disable),
        dns_support: toggle(|o| o.dns_support.as_ref(), Toggle::Enable),
        ipv6_support: toggle(|o| o.ipv6_support.as_ref(), Toggle::Disable),
        options_reported,
    };
    Ok(Decoded::Record(summary.record(AttachmentVariant::Vpc(vpc))))
}

pub(crate) fn peering_attachment(
    summary: &AttachmentSummary,
    detail: Value,
) -> Result<Decoded<AttachmentRecord>> {
    let raw: RawPeeringAttachments = parse(detail)?;
    let Some(detail) = raw
        .transit_gateway_peering_attachments
        .into_iter()
        .find(|d| d.transit_gateway_attachment_id == summary.id)
    else {
        return Ok(Decoded::Excluded(
            summary.excluded("peering attachment details were not reported"),
        ));
    };

    let requester_gateway = detail
        .requester_tgw_info
        .as_ref()
        .and_then(|i| i.transit_gateway_id.as_deref());
    let (role, peer) = if requester_gateway == Some(summary.gateway_id.as_str()) {
        (PeeringRole::Requester, detail.accepter_tgw_info)
    } else {
        (PeeringRole::Accepter, detail.requester_tgw_info)
    };

    let Some(RawPeeringInfo {
        transit_gateway_id: Some(peer_gateway_id),
        owner_id,
        region: Some(peer_region),
    }) = peer
    else {
        return Ok(Decoded::Excluded(
            summary.excluded("peer gateway or region was not reported"),
        ));
    };

    Ok(Decoded::Record(summary.record(AttachmentVariant::Peering(
        PeeringAttachment {
            role,
            peer_gateway_id,
            peer_region,
            peer_account_id: owner_id,
        },
    ))))
}

fn links(raw: Vec<RawLink>, route_table_id: &str, active_state: &str) -> Vec<AttachmentLink> {
    raw.into_iter()
        .filter(|l| l.state.as_deref() == Some(active_state))
        .filter_map(|l| l.transit_gateway_attachment_id)
        .map(|attachment_id| AttachmentLink {
            route_table_id: route_table_id.to_string(),
            attachment_id,
        })
        .collect()
}

pub(crate) fn associations(value: Value, route_table_id: &str) -> Result<Vec<AttachmentLink>> {
    let raw: RawAssociations = parse(value)?;
    Ok(links(raw.associations, route_table_id, "associated"))
}

pub(crate) fn propagations(value: Value, route_table_id: &str) -> Result<Vec<AttachmentLink>> {
    let raw: RawPropagations = parse(value)?;
    Ok(links(
        raw.transit_gateway_route_table_propagations,
        route_table_id,
        "enabled",
    ))
}

pub(crate) fn static_routes(
    value: Value,
    route_table_id: &str,
) -> Result<Vec<Decoded<RouteRecord>>> {
    let raw: RawRoutes = parse(value)?;
    let mut decoded = Vec::new();

    for route in raw.routes {
        // Propagated routes are derived from propagations, not declared.
        if route.route_type.as_deref() == Some("propagated") {
            continue;
        }

        let Some(cidr) = route.destination_cidr_block else {
            if let Some(prefix_list) = route.prefix_list_id {
                decoded.push(Decoded::Excluded(ExcludedResource {
                    kind: "tgw-prefix-list-route".into(),
                    id: format!("{route_table_id}_{prefix_list}"),
                    reason: "prefix list references are not declared".into(),
                }));
            }
            continue;
        };

        let target = match route.state.as_deref() {
            Some("blackhole") => RouteTarget::Blackhole,
            Some("active") | None => {
                let mut ids: Vec<String> = route
                    .transit_gateway_attachments
                    .into_iter()
                    .filter_map(|a| a.transit_gateway_attachment_id)
                    .collect();
                ids.sort();
                if ids.len() > 1 {
                    warn!(
                        route_table = %route_table_id,
                        destination = %cidr,
                        attachments = ids.len(),
                        "Static route reports several attachments, using the first"
                    );
                }
                match ids.into_iter().next() {
                    Some(attachment_id) => RouteTarget::Attachment { attachment_id },
                    None => {
                        return Err(ImportError::InvalidRecord {
                            kind: "route",
                            id: format!("{route_table_id}_{cidr}"),
                            reason: "active static route has neither attachment nor blackhole"
                                .into(),
                        })
                    }
                }
            }
            // pending / deleting / deleted
            Some(_) => continue,
        };

        decoded.push(Decoded::Record(RouteRecord {
            route_table_id: route_table_id.to_string(),
            destination_cidr_block: cidr,
            target,
        }));
    }

    Ok(decoded)
}

pub(crate) fn vpc_routes(value: Value) -> Result<Vec<Decoded<VpcRouteRecord>>> {
    let raw: RawVpcRouteTables = parse(value)?;
    let mut decoded = Vec::new();

    for table in raw.route_tables {
        let tags = tag_set(table.tags);
        for route in table.routes {
            let Some(gateway_id) = route.transit_gateway_id else {
                continue;
            };
            let Some(destination) = route
                .destination_cidr_block
                .or(route.destination_ipv6_cidr_block)
            else {
                if let Some(prefix_list) = route.destination_prefix_list_id {
                    decoded.push(Decoded::Excluded(ExcludedResource {
                        kind: "vpc-prefix-list-route".into(),
                        id: format!("{}_{prefix_list}", table.route_table_id),
                        reason: "prefix list references are not declared".into(),
                    }));
                }
                continue;
            };
            decoded.push(Decoded::Record(VpcRouteRecord {
                route_table_id: table.route_table_id.clone(),
                route_table_name: name_of(&tags),
                vpc_id: table.vpc_id.clone().unwrap_or_default(),
                destination,
                gateway_id,
            }));
        }
    }

    Ok(decoded)
}
