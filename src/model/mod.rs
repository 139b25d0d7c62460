//! Snapshot data model
//!
//! `records` holds the typed resource records, `snapshot` the immutable
//! collection produced by one discovery run.

pub mod records;
pub mod snapshot;

pub use records::{
    AssociationRecord, AttachmentKind, AttachmentLink, AttachmentRecord, AttachmentVariant,
    ExcludedResource, GatewayRecord, PeeringAttachment, PeeringRole, PropagationRecord,
    RouteRecord, RouteTableRecord, RouteTarget, TagSet, Toggle, VpcAttachment, VpcRouteRecord,
};
pub use snapshot::{ResourceSnapshot, Scope, SnapshotBuilder, SNAPSHOT_FILE};
