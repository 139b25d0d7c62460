//! Declared resource addresses.
//!
//! The synthesizer and the reconciliation-plan generator both derive addresses
//! from here, so a directive always names exactly the block that was emitted.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::AttachmentRecord;

/// Name used for the single gateway / route table declared in a partition.
pub const SINGLETON_NAME: &str = "this";

/// Every kind of block the synthesizer declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Gateway,
    RouteTable,
    VpcAttachment,
    PeeringAttachment,
    /// Read-only lookup of an attachment owned elsewhere.
    AttachmentLookup,
    Association,
    Propagation,
    Route,
    /// Route in a spoke VPC route table pointing at the hub.
    SpokeRoute,
}

impl ResourceKind {
    pub fn terraform_type(&self) -> &'static str {
        match self {
            ResourceKind::Gateway => "aws_ec2_transit_gateway",
            ResourceKind::RouteTable => "aws_ec2_transit_gateway_route_table",
            ResourceKind::VpcAttachment => "aws_ec2_transit_gateway_vpc_attachment",
            ResourceKind::PeeringAttachment => "aws_ec2_transit_gateway_peering_attachment",
            ResourceKind::AttachmentLookup => "aws_ec2_transit_gateway_attachment",
            ResourceKind::Association => "aws_ec2_transit_gateway_route_table_association",
            ResourceKind::Propagation => "aws_ec2_transit_gateway_route_table_propagation",
            ResourceKind::Route => "aws_ec2_transit_gateway_route",
            ResourceKind::SpokeRoute => "aws_route",
        }
    }

    pub fn is_data_source(&self) -> bool {
        matches!(self, ResourceKind::AttachmentLookup)
    }

    /// Dependency rank: containers bind before what they contain.
    pub fn rank(&self) -> u8 {
        match self {
            ResourceKind::Gateway => 0,
            ResourceKind::RouteTable => 1,
            ResourceKind::VpcAttachment
            | ResourceKind::PeeringAttachment
            | ResourceKind::AttachmentLookup => 2,
            ResourceKind::Association | ResourceKind::Propagation | ResourceKind::Route => 3,
            ResourceKind::SpokeRoute => 4,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResourceKind::Gateway => "Transit Gateway",
            ResourceKind::RouteTable => "Route Table",
            ResourceKind::VpcAttachment => "VPC Attachments",
            ResourceKind::PeeringAttachment => "Peering Attachments",
            ResourceKind::AttachmentLookup => "Attachment Lookups",
            ResourceKind::Association => "Route Table Associations",
            ResourceKind::Propagation => "Route Table Propagations",
            ResourceKind::Route => "Transit Gateway Routes",
            ResourceKind::SpokeRoute => "VPC Routes to Transit Gateway",
        }
    }

    pub fn for_attachment(attachment: &AttachmentRecord) -> ResourceKind {
        use crate::model::AttachmentVariant;

        if !attachment.is_managed() {
            return ResourceKind::AttachmentLookup;
        }
        match attachment.variant {
            AttachmentVariant::Peering(_) => ResourceKind::PeeringAttachment,
            _ => ResourceKind::VpcAttachment,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.terraform_type())
    }
}

/// `<type>.<name>` or `data.<type>.<name>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    pub kind: ResourceKind,
    pub name: String,
}

impl Address {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn singleton(kind: ResourceKind) -> Self {
        Self::new(kind, SINGLETON_NAME)
    }

    /// Expression for the object's id attribute.
    pub fn id_expr(&self) -> String {
        format!("{}.id", self)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.is_data_source() {
            write!(f, "data.{}.{}", self.kind.terraform_type(), self.name)
        } else {
            write!(f, "{}.{}", self.kind.terraform_type(), self.name)
        }
    }
}
