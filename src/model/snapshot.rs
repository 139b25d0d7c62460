//! The immutable result of one discovery run.
//!
//! Records are appended through `SnapshotBuilder` and sorted by their
//! identifying attributes when the snapshot is sealed, so two runs against the
//! same live topology produce equal snapshots regardless of the order in which
//! the API (or the worker pool) returned results.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::records::{
    AssociationRecord, AttachmentRecord, ExcludedResource, GatewayRecord, PropagationRecord,
    RouteRecord, RouteTableRecord, VpcRouteRecord,
};
use crate::error::Result;

/// File name used when a snapshot is passed between separately-run stages.
pub const SNAPSHOT_FILE: &str = "snapshot.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub account_id: Option<String>,
    pub region: String,
}

impl Scope {
    pub fn new(account_id: Option<String>, region: impl Into<String>) -> Self {
        Self {
            account_id,
            region: region.into(),
        }
    }

    pub fn account_label(&self) -> &str {
        self.account_id.as_deref().unwrap_or("unknown-account")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub scope: Scope,
    pub gateways: Vec<GatewayRecord>,
    pub route_tables: Vec<RouteTableRecord>,
    pub attachments: Vec<AttachmentRecord>,
    pub associations: Vec<AssociationRecord>,
    pub propagations: Vec<PropagationRecord>,
    pub routes: Vec<RouteRecord>,
    pub vpc_routes: Vec<VpcRouteRecord>,
    #[serde(default)]
    pub excluded: Vec<ExcludedResource>,
}

impl ResourceSnapshot {
    pub fn builder(scope: Scope) -> SnapshotBuilder {
        SnapshotBuilder {
            snapshot: ResourceSnapshot {
                scope,
                gateways: Vec::new(),
                route_tables: Vec::new(),
                attachments: Vec::new(),
                associations: Vec::new(),
                propagations: Vec::new(),
                routes: Vec::new(),
                vpc_routes: Vec::new(),
                excluded: Vec::new(),
            },
        }
    }

    pub fn gateway(&self, id: &str) -> Option<&GatewayRecord> {
        self.gateways.iter().find(|g| g.id == id)
    }

    pub fn is_excluded(&self, id: &str) -> bool {
        self.excluded.iter().any(|e| e.id == id)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json_pretty()?)?;
        info!(path = %path.display(), "Wrote resource snapshot");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut snapshot: ResourceSnapshot = serde_json::from_str(&content)?;
        // Hand-edited snapshots get the same ordering guarantee.
        snapshot.sort();
        Ok(snapshot)
    }

    fn sort(&mut self) {
        self.gateways.sort_by(|a, b| a.id.cmp(&b.id));
        self.route_tables.sort_by(|a, b| a.id.cmp(&b.id));
        self.attachments.sort_by(|a, b| a.id.cmp(&b.id));
        self.associations.sort();
        self.associations.dedup();
        self.propagations.sort();
        self.propagations.dedup();
        self.routes.sort_by(|a, b| {
            (&a.route_table_id, &a.destination_cidr_block)
                .cmp(&(&b.route_table_id, &b.destination_cidr_block))
        });
        self.vpc_routes.sort_by(|a, b| {
            (&a.route_table_id, &a.destination).cmp(&(&b.route_table_id, &b.destination))
        });
        self.excluded.sort();
        self.excluded.dedup();
    }
}

/// Append-only accumulator; `build` seals it into a sorted snapshot.
#[derive(Debug)]
pub struct SnapshotBuilder {
    snapshot: ResourceSnapshot,
}

impl SnapshotBuilder {
    pub fn gateway(&mut self, record: GatewayRecord) -> &mut Self {
        self.snapshot.gateways.push(record);
        self
    }

    pub fn route_table(&mut self, record: RouteTableRecord) -> &mut Self {
        self.snapshot.route_tables.push(record);
        self
    }

    pub fn attachment(&mut self, record: AttachmentRecord) -> &mut Self {
        self.snapshot.attachments.push(record);
        self
    }

    pub fn association(&mut self, record: AssociationRecord) -> &mut Self {
        self.snapshot.associations.push(record);
        self
    }

    pub fn propagation(&mut self, record: PropagationRecord) -> &mut Self {
        self.snapshot.propagations.push(record);
        self
    }

    pub fn route(&mut self, record: RouteRecord) -> &mut Self {
        self.snapshot.routes.push(record);
        self
    }

    pub fn vpc_route(&mut self, record: VpcRouteRecord) -> &mut Self {
        self.snapshot.vpc_routes.push(record);
        self
    }

    pub fn exclude(&mut self, record: ExcludedResource) -> &mut Self {
        self.snapshot.excluded.push(record);
        self
    }

    pub fn build(mut self) -> ResourceSnapshot {
        self.snapshot.sort();
        self.snapshot
    }
}
