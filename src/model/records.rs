//! Typed resource records
//!
//! Records are fully populated when they are decoded: every optional API
//! attribute already carries its resolved default, so nothing downstream has
//! to guess.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Resource tags, ordered by key.
pub type TagSet = BTreeMap<String, String>;

/// The `enable` / `disable` switches used throughout the EC2 API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Toggle {
    Enable,
    Disable,
}

impl Toggle {
    /// Parse an API value, falling back to `default` when absent or unknown.
    pub fn parse_or(value: Option<&str>, default: Toggle) -> Toggle {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("enable") | Some("enabled") => Toggle::Enable,
            Some("disable") | Some("disabled") => Toggle::Disable,
            _ => default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Toggle::Enable => "enable",
            Toggle::Disable => "disable",
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Toggle::Enable)
    }
}

impl fmt::Display for Toggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// HUB AND ROUTE TABLES
// =============================================================================

/// A transit gateway (the hub resource).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRecord {
    pub id: String,
    pub name: Option<String>,
    pub arn: Option<String>,
    pub owner_id: Option<String>,
    pub description: String,
    pub amazon_side_asn: u64,
    pub auto_accept_shared_attachments: Toggle,
    pub default_route_table_association: Toggle,
    pub default_route_table_propagation: Toggle,
    pub dns_support: Toggle,
    pub vpn_ecmp_support: Toggle,
    pub multicast_support: Toggle,
    pub tags: TagSet,
}

impl GatewayRecord {
    /// Default association and propagation both disabled: route tables are
    /// managed explicitly rather than through the default table.
    pub fn uses_custom_route_tables(&self) -> bool {
        !self.default_route_table_association.is_enabled()
            && !self.default_route_table_propagation.is_enabled()
    }

    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("{} ({})", self.id, name),
            None => self.id.clone(),
        }
    }
}

/// A route table inside the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTableRecord {
    pub id: String,
    pub name: Option<String>,
    pub gateway_id: String,
    pub default_association_route_table: bool,
    pub default_propagation_route_table: bool,
    pub tags: TagSet,
}

// =============================================================================
// ATTACHMENTS
// =============================================================================

/// A connection between the hub and a spoke or external network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    pub id: String,
    pub name: Option<String>,
    pub gateway_id: String,
    pub tags: TagSet,
    pub variant: AttachmentVariant,
}

impl AttachmentRecord {
    pub fn kind(&self) -> AttachmentKind {
        self.variant.kind()
    }

    /// Whether the attachment is declared as a managed resource, as opposed to
    /// a read-only lookup of an object owned by some other service or account.
    pub fn is_managed(&self) -> bool {
        match &self.variant {
            AttachmentVariant::Vpc(_) => true,
            AttachmentVariant::Peering(peering) => peering.role == PeeringRole::Requester,
            AttachmentVariant::Vpn { .. }
            | AttachmentVariant::DirectConnect { .. }
            | AttachmentVariant::NetworkFunction { .. } => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttachmentVariant {
    Vpc(VpcAttachment),
    Peering(PeeringAttachment),
    Vpn { vpn_connection_id: String },
    DirectConnect { dx_gateway_id: String },
    NetworkFunction { resource_id: String },
}

impl AttachmentVariant {
    pub fn kind(&self) -> AttachmentKind {
        match self {
            AttachmentVariant::Vpc(_) => AttachmentKind::Vpc,
            AttachmentVariant::Peering(_) => AttachmentKind::Peering,
            AttachmentVariant::Vpn { .. } => AttachmentKind::Vpn,
            AttachmentVariant::DirectConnect { .. } => AttachmentKind::DirectConnect,
            AttachmentVariant::NetworkFunction { .. } => AttachmentKind::NetworkFunction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcAttachment {
    pub vpc_id: String,
    pub subnet_ids: Vec<String>,
    pub appliance_mode_support: Toggle,
    pub dns_support: Toggle,
    pub ipv6_support: Toggle,
    /// False when the API returned no option block; the option values are then
    /// defaults and must not be enforced.
    pub options_reported: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeeringAttachment {
    pub role: PeeringRole,
    pub peer_gateway_id: String,
    pub peer_region: String,
    pub peer_account_id: Option<String>,
}

/// Which side of a peering the hub is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeeringRole {
    Requester,
    Accepter,
}

/// Attachment variant without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Vpc,
    Peering,
    Vpn,
    DirectConnect,
    NetworkFunction,
}

impl AttachmentKind {
    pub const ALL: [AttachmentKind; 5] = [
        AttachmentKind::Vpc,
        AttachmentKind::Peering,
        AttachmentKind::Vpn,
        AttachmentKind::DirectConnect,
        AttachmentKind::NetworkFunction,
    ];

    /// The `ResourceType` value reported by the EC2 API.
    pub fn api_name(&self) -> &'static str {
        match self {
            AttachmentKind::Vpc => "vpc",
            AttachmentKind::Peering => "peering",
            AttachmentKind::Vpn => "vpn",
            AttachmentKind::DirectConnect => "direct-connect-gateway",
            AttachmentKind::NetworkFunction => "network-function",
        }
    }

    pub fn from_api_name(value: &str) -> Option<AttachmentKind> {
        AttachmentKind::ALL
            .into_iter()
            .find(|kind| kind.api_name() == value)
    }

    /// Name of the hub output that maps attachment keys to ids.
    pub fn output_name(&self) -> &'static str {
        match self {
            AttachmentKind::Vpc => "vpc_attachment_ids",
            AttachmentKind::Peering => "peering_attachment_ids",
            AttachmentKind::Vpn => "vpn_attachment_ids",
            AttachmentKind::DirectConnect => "dx_attachment_ids",
            AttachmentKind::NetworkFunction => "network_function_attachment_ids",
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_name())
    }
}

// =============================================================================
// ROUTING
// =============================================================================

/// Binds an attachment to a route table. Used for both associations and
/// propagations; they differ only in what the engine does with them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttachmentLink {
    pub route_table_id: String,
    pub attachment_id: String,
}

pub type AssociationRecord = AttachmentLink;
pub type PropagationRecord = AttachmentLink;

/// A static route in a hub route table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRecord {
    pub route_table_id: String,
    pub destination_cidr_block: String,
    pub target: RouteTarget,
}

impl RouteRecord {
    pub fn is_blackhole(&self) -> bool {
        matches!(self.target, RouteTarget::Blackhole)
    }

    pub fn attachment_id(&self) -> Option<&str> {
        match &self.target {
            RouteTarget::Attachment { attachment_id } => Some(attachment_id),
            RouteTarget::Blackhole => None,
        }
    }
}

/// Exactly one of: forward to an attachment, or drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum RouteTarget {
    Attachment { attachment_id: String },
    Blackhole,
}

/// A route in a spoke VPC route table that sends traffic to a hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcRouteRecord {
    pub route_table_id: String,
    pub route_table_name: Option<String>,
    pub vpc_id: String,
    pub destination: String,
    pub gateway_id: String,
}

impl VpcRouteRecord {
    pub fn is_ipv6(&self) -> bool {
        self.destination.contains(':')
    }
}

/// A resource that was seen during discovery but cannot be declared faithfully.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExcludedResource {
    pub kind: String,
    pub id: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_parse_defaults() {
        assert_eq!(Toggle::parse_or(Some("enable"), Toggle::Disable), Toggle::Enable);
        assert_eq!(Toggle::parse_or(Some("Disable"), Toggle::Enable), Toggle::Disable);
        assert_eq!(Toggle::parse_or(None, Toggle::Enable), Toggle::Enable);
        assert_eq!(Toggle::parse_or(Some("maybe"), Toggle::Disable), Toggle::Disable);
    }

    #[test]
    fn test_attachment_kind_api_names_round_trip() {
        for kind in AttachmentKind::ALL {
            assert_eq!(AttachmentKind::from_api_name(kind.api_name()), Some(kind));
        }
        assert_eq!(AttachmentKind::from_api_name("connect"), None);
    }

    #[test]
    fn test_route_target_exclusive() {
        let blackhole = RouteRecord {
            route_table_id: "tgw-rtb-1".into(),
            destination_cidr_block: "192.168.0.0/16".into(),
            target: RouteTarget::Blackhole,
        };
        assert!(blackhole.is_blackhole());
        assert_eq!(blackhole.attachment_id(), None);

        let forward = RouteRecord {
            target: RouteTarget::Attachment {
                attachment_id: "tgw-attach-1".into(),
            },
            ..blackhole
        };
        assert!(!forward.is_blackhole());
        assert_eq!(forward.attachment_id(), Some("tgw-attach-1"));
    }

    #[test]
    fn test_accepter_peering_is_not_managed() {
        let attachment = AttachmentRecord {
            id: "tgw-attach-peer".into(),
            name: None,
            gateway_id: "tgw-1".into(),
            tags: TagSet::new(),
            variant: AttachmentVariant::Peering(PeeringAttachment {
                role: PeeringRole::Accepter,
                peer_gateway_id: "tgw-2".into(),
                peer_region: "us-east-1".into(),
                peer_account_id: None,
            }),
        };
        assert!(!attachment.is_managed());
        assert_eq!(attachment.kind(), AttachmentKind::Peering);
    }
}
