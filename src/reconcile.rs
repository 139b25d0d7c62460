//! Reconciliation-Plan Generator
//!
//! Binds every declared resource to its live object. Each partition gets an
//! ordered list of directives (declared address + external id in the
//! provider's import id encoding); resources that cannot be bound are
//! collected as [`UnsupportedReconciliation`] entries instead of failing the
//! run.
//!
//! | Resource                 | Import id                        |
//! |--------------------------|----------------------------------|
//! | gateway, route table     | its id                           |
//! | VPC / peering attachment | its id                           |
//! | association, propagation | `{route-table-id}_{attachment-id}` |
//! | TGW route                | `{route-table-id}_{cidr}`        |
//! | spoke VPC route (opt-in) | `{vpc-route-table-id}_{destination}` |

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::address::{Address, ResourceKind};
use crate::config::PlanFormat;
use crate::error::{Result, UnsupportedReconciliation};
use crate::hcl::{Block, Document, Value};
use crate::model::{ExcludedResource, Scope};
use crate::partition::{
    HubPartition, ManagementPartition, PartitionedTopology, RouteTablePartition,
};

pub const SKIPPED_FILE: &str = "skipped.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanOptions {
    pub format: PlanFormat,
    /// Import spoke-side VPC routes instead of listing them as skipped.
    pub reconcile_spoke_routes: bool,
}

/// Binds one declared address to one live object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationDirective {
    pub partition: String,
    pub kind: ResourceKind,
    pub address: String,
    pub external_id: String,
}

impl ReconciliationDirective {
    fn new(partition: &str, address: Address, external_id: impl Into<String>) -> Self {
        Self {
            partition: partition.to_string(),
            kind: address.kind,
            address: address.to_string(),
            external_id: external_id.into(),
        }
    }

    /// `terraform import '<address>' <id>`
    pub fn to_command(&self) -> String {
        format!("terraform import '{}' {}", self.address, self.external_id)
    }

    /// `import { to = <address> id = "<id>" }`
    pub fn to_import_block(&self) -> Block {
        Block::new("import").with_body(|b| {
            b.attr("to", Value::expr(&self.address))
                .attr("id", Value::str(&self.external_id));
        })
    }
}

/// Directives and skipped resources of one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    pub partition: String,
    /// Ordered by dependency rank, then address.
    pub directives: Vec<ReconciliationDirective>,
    pub skipped: Vec<UnsupportedReconciliation>,
}

impl PartitionPlan {
    fn new(partition: &str) -> Self {
        Self {
            partition: partition.to_string(),
            directives: Vec::new(),
            skipped: Vec::new(),
        }
    }

    fn import(&mut self, address: Address, external_id: impl Into<String>) {
        self.directives.push(ReconciliationDirective::new(
            &self.partition,
            address,
            external_id,
        ));
    }

    fn skip(&mut self, address: Address, external_id: &str, reason: impl Into<String>) {
        let skipped = UnsupportedReconciliation {
            partition: self.partition.clone(),
            kind: address.kind,
            address: address.to_string(),
            external_id: external_id.to_string(),
            reason: reason.into(),
        };
        warn!(
            partition = %skipped.partition,
            address = %skipped.address,
            external_id = %skipped.external_id,
            reason = %skipped.reason,
            "Resource left out of reconciliation plan"
        );
        self.skipped.push(skipped);
    }

    fn seal(mut self) -> Self {
        self.directives
            .sort_by(|a, b| (a.kind.rank(), &a.address).cmp(&(b.kind.rank(), &b.address)));
        self.skipped
            .sort_by(|a, b| (a.kind.rank(), &a.address).cmp(&(b.kind.rank(), &b.address)));
        self
    }

    /// Directives grouped by kind, in directive order.
    fn groups(&self) -> Vec<(ResourceKind, Vec<&ReconciliationDirective>)> {
        let mut groups: Vec<(ResourceKind, Vec<&ReconciliationDirective>)> = Vec::new();
        for directive in &self.directives {
            match groups.last_mut() {
                Some((kind, members)) if *kind == directive.kind => members.push(directive),
                _ => groups.push((directive.kind, vec![directive])),
            }
        }
        groups
    }

    pub fn render(&self, scope: &Scope, format: PlanFormat) -> String {
        match format {
            PlanFormat::Script => self.to_script(scope),
            PlanFormat::Blocks => self.to_import_blocks(scope),
        }
    }

    fn to_script(&self, scope: &Scope) -> String {
        let mut out = String::from("#!/bin/bash\n");
        out.push_str(&format!(
            "# Generated by tgw-importer from {}/{}\n# Partition: {}\n",
            scope.account_label(),
            scope.region,
            self.partition
        ));
        out.push_str("set -euo pipefail\n");

        for (kind, directives) in self.groups() {
            out.push_str(&format!("\n# {}\n", kind.label()));
            for directive in directives {
                out.push_str(&directive.to_command());
                out.push('\n');
            }
        }

        if !self.skipped.is_empty() {
            out.push_str("\n# Not imported\n");
            for skipped in &self.skipped {
                out.push_str(&format!(
                    "#   {} ({}): {}\n",
                    skipped.address, skipped.external_id, skipped.reason
                ));
            }
        }
        out
    }

    fn to_import_blocks(&self, scope: &Scope) -> String {
        let mut doc = Document::new();
        doc.header(format!(
            "Generated by tgw-importer from {}/{}",
            scope.account_label(),
            scope.region
        ))
        .header(format!("Partition: {}", self.partition));
        for skipped in &self.skipped {
            doc.header(format!(
                "Not imported: {} ({}): {}",
                skipped.address, skipped.external_id, skipped.reason
            ));
        }

        for (kind, directives) in self.groups() {
            doc.section(kind.label());
            for directive in directives {
                doc.block(directive.to_import_block());
            }
        }
        doc.to_hcl_string()
    }
}

/// Machine-readable summary of everything the run did not bind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedReport {
    pub account_id: Option<String>,
    pub region: String,
    /// Declared resources without a reconciliation directive.
    pub unsupported: Vec<UnsupportedReconciliation>,
    /// Resources seen during discovery but never declared.
    pub excluded: Vec<ExcludedResource>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationPlan {
    pub scope: Scope,
    pub format: PlanFormat,
    /// Hub first, then route tables by partition name.
    pub partitions: Vec<PartitionPlan>,
    pub excluded: Vec<ExcludedResource>,
}

impl ReconciliationPlan {
    pub fn partition(&self, name: &str) -> Option<&PartitionPlan> {
        self.partitions.iter().find(|p| p.partition == name)
    }

    pub fn directives(&self) -> impl Iterator<Item = &ReconciliationDirective> {
        self.partitions.iter().flat_map(|p| &p.directives)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &UnsupportedReconciliation> {
        self.partitions.iter().flat_map(|p| &p.skipped)
    }

    /// Plan file name inside each partition directory.
    pub fn file_name(&self) -> &'static str {
        self.format.file_name()
    }

    pub fn render(&self, partition: &PartitionPlan) -> String {
        partition.render(&self.scope, self.format)
    }

    pub fn skipped_report(&self) -> SkippedReport {
        SkippedReport {
            account_id: self.scope.account_id.clone(),
            region: self.scope.region.clone(),
            unsupported: self.skipped().cloned().collect(),
            excluded: self.excluded.clone(),
        }
    }

    pub fn skipped_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(&self.skipped_report())?;
        json.push('\n');
        Ok(json)
    }
}

// =============================================================================
// PLANNING
// =============================================================================

/// Build the plan for every partition. Never fails: unbindable resources are
/// recorded, not raised.
pub fn plan(topology: &PartitionedTopology, options: &PlanOptions) -> ReconciliationPlan {
    let partitions: Vec<PartitionPlan> = topology
        .partitions()
        .into_iter()
        .map(|partition| match partition {
            ManagementPartition::Hub(hub) => plan_hub(hub, options),
            ManagementPartition::RouteTable(rt) => plan_route_table(rt),
        })
        .collect();

    let plan = ReconciliationPlan {
        scope: topology.scope.clone(),
        format: options.format,
        partitions,
        excluded: topology.excluded.clone(),
    };
    info!(
        partitions = plan.partitions.len(),
        directives = plan.directives().count(),
        skipped = plan.skipped().count(),
        excluded = plan.excluded.len(),
        "Built reconciliation plan"
    );
    plan
}

fn plan_hub(hub: &HubPartition, options: &PlanOptions) -> PartitionPlan {
    let mut plan = PartitionPlan::new(&hub.name);
    plan.import(Address::singleton(ResourceKind::Gateway), &hub.gateway.id);

    for attachment in &hub.attachments {
        let kind = ResourceKind::for_attachment(&attachment.record);
        let address = Address::new(kind, &attachment.key);
        if attachment.record.is_managed() {
            plan.import(address, &attachment.record.id);
        } else {
            plan.skip(
                address,
                &attachment.record.id,
                format!(
                    "{} attachment is owned outside this configuration and is only looked up",
                    attachment.record.kind()
                ),
            );
        }
    }

    for route in &hub.spoke_routes {
        let address = Address::new(ResourceKind::SpokeRoute, &route.key);
        let import_id = format!("{}_{}", route.record.route_table_id, route.record.destination);
        if options.reconcile_spoke_routes {
            plan.import(address, import_id);
        } else {
            plan.skip(
                address,
                &import_id,
                "spoke-side VPC route; enable reconcile_spoke_routes to import it",
            );
        }
    }

    plan.seal()
}

fn plan_route_table(rt: &RouteTablePartition) -> PartitionPlan {
    let mut plan = PartitionPlan::new(&rt.name);
    plan.import(
        Address::singleton(ResourceKind::RouteTable),
        &rt.route_table.record.id,
    );
    for link in &rt.associations {
        plan.import(
            Address::new(ResourceKind::Association, link.key()),
            link.import_id(),
        );
    }
    for link in &rt.propagations {
        plan.import(
            Address::new(ResourceKind::Propagation, link.key()),
            link.import_id(),
        );
    }
    for route in &rt.routes {
        plan.import(Address::new(ResourceKind::Route, &route.key), route.import_id());
    }
    plan.seal()
}
