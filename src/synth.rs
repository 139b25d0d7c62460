//! Config Synthesizer
//!
//! Renders each partition of the topology into a directory of `.tf` files.
//! Every optional attribute is written out explicitly, blocks are ordered by
//! key, and nothing time-dependent goes into the output, so synthesizing the
//! same topology twice yields byte-identical files.
//!
//! ## Hub partition
//!
//! - `versions.tf`: Terraform and provider constraints, provider region
//! - `backend.tf`: only for the `s3` backend
//! - `main.tf`: gateway, managed attachments, attachment lookups
//! - `vpc_routes.tf`: spoke routes, only when there are any
//! - `outputs.tf`: gateway id/arn, region, shared tags, attachment id maps
//!
//! ## Route table partition
//!
//! - `versions.tf`, `backend.tf` as above
//! - `remote.tf`: `terraform_remote_state "hub"`
//! - `main.tf`: route table, associations, propagations, routes
//! - `outputs.tf`: `route_table_id`

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::address::{Address, ResourceKind};
use crate::config::{StateBackend, DEFAULT_AWS_PROVIDER_VERSION, DEFAULT_TERRAFORM_VERSION};
use crate::hcl::{quote, Block, Body, Document, Value};
use crate::keys::{AttachmentRef, Keyed, KeyedLink};
use crate::model::{
    AttachmentKind, AttachmentRecord, AttachmentVariant, PeeringAttachment, Scope, TagSet,
    VpcAttachment, VpcRouteRecord,
};
use crate::partition::{
    HubPartition, ManagementPartition, PartitionedTopology, RouteTablePartition,
};

pub const VERSIONS_FILE: &str = "versions.tf";
pub const BACKEND_FILE: &str = "backend.tf";
pub const MAIN_FILE: &str = "main.tf";
pub const VPC_ROUTES_FILE: &str = "vpc_routes.tf";
pub const OUTPUTS_FILE: &str = "outputs.tf";
pub const REMOTE_FILE: &str = "remote.tf";

/// Name of the remote-state data source route-table partitions read.
const REMOTE_STATE_NAME: &str = "hub";
const STATE_FILE: &str = "terraform.tfstate";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthOptions {
    pub terraform_version: String,
    pub aws_provider_version: String,
    pub backend: StateBackend,
}

impl Default for SynthOptions {
    fn default() -> Self {
        Self {
            terraform_version: DEFAULT_TERRAFORM_VERSION.to_string(),
            aws_provider_version: DEFAULT_AWS_PROVIDER_VERSION.to_string(),
            backend: StateBackend::Local,
        }
    }
}

// =============================================================================
// OUTPUT TYPES
// =============================================================================

/// A reference from a route-table partition into an output of the hub.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CrossPartitionRef {
    /// Partition that owns the output.
    pub partition: String,
    pub output: String,
    pub key: String,
}

impl CrossPartitionRef {
    fn for_attachment(hub: &str, attachment: &AttachmentRef) -> Self {
        Self {
            partition: hub.to_string(),
            output: attachment.kind.output_name().to_string(),
            key: attachment.key.clone(),
        }
    }

    /// `data.terraform_remote_state.hub.outputs.<output>["<key>"]`
    pub fn expr(&self) -> String {
        format!(
            "data.terraform_remote_state.{REMOTE_STATE_NAME}.outputs.{}[{}]",
            self.output,
            quote(&self.key)
        )
    }
}

/// Rendered files of one partition, by file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedConfig {
    pub partition: String,
    pub files: BTreeMap<String, String>,
    pub remote_refs: Vec<CrossPartitionRef>,
}

impl SynthesizedConfig {
    pub fn file(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(String::as_str)
    }

    /// SHA-256 over every file name and content, hex encoded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (name, content) in &self.files {
            hasher.update(name.as_bytes());
            hasher.update([0]);
            hasher.update(content.as_bytes());
            hasher.update([0]);
        }
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisOutput {
    /// Hub first, then route tables by partition name.
    pub configs: Vec<SynthesizedConfig>,
}

impl SynthesisOutput {
    pub fn config(&self, partition: &str) -> Option<&SynthesizedConfig> {
        self.configs.iter().find(|c| c.partition == partition)
    }
}

/// Render every partition. Pure and infallible: all structural checks have
/// already passed during keying and partitioning.
pub fn synthesize(topology: &PartitionedTopology, options: &SynthOptions) -> SynthesisOutput {
    let partitions = topology.partitions();
    let mut configs = Vec::with_capacity(partitions.len());
    for partition in partitions {
        let config = match partition {
            ManagementPartition::Hub(_) => synthesize_hub(topology, options),
            ManagementPartition::RouteTable(rt) => synthesize_route_table(topology, rt, options),
        };
        debug!(
            partition = %partition,
            hub = partition.is_hub(),
            files = config.files.len(),
            remote_refs = config.remote_refs.len(),
            fingerprint = %config.fingerprint(),
            "Synthesized partition"
        );
        configs.push(config);
    }
    info!(partitions = configs.len(), "Synthesized configuration");
    SynthesisOutput { configs }
}

// =============================================================================
// SHARED FILES
// =============================================================================

fn document(scope: &Scope, partition: &str) -> Document {
    let mut doc = Document::new();
    doc.header(format!(
        "Generated by tgw-importer from {}/{}",
        scope.account_label(),
        scope.region
    ))
    .header(format!("Partition: {partition}"));
    doc
}

fn versions_file(scope: &Scope, partition: &str, options: &SynthOptions) -> String {
    let mut aws = BTreeMap::new();
    aws.insert("source".to_string(), Value::str("hashicorp/aws"));
    aws.insert(
        "version".to_string(),
        Value::str(&options.aws_provider_version),
    );

    let mut doc = document(scope, partition);
    doc.block(Block::new("terraform").with_body(|b| {
        b.attr("required_version", Value::str(&options.terraform_version))
            .blank()
            .block(Block::new("required_providers").with_body(|p| {
                p.attr("aws", Value::Map(aws));
            }));
    }))
    .block(Block::new("provider").label("aws").with_body(|b| {
        b.attr("region", Value::str(&scope.region));
    }));
    doc.to_hcl_string()
}

fn state_key(key_prefix: &str, partition: &str) -> String {
    let prefix = key_prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{partition}/{STATE_FILE}")
    } else {
        format!("{prefix}/{partition}/{STATE_FILE}")
    }
}

fn backend_file(scope: &Scope, partition: &str, options: &SynthOptions) -> Option<String> {
    let StateBackend::S3 {
        bucket,
        key_prefix,
        region,
    } = &options.backend
    else {
        return None;
    };

    let mut doc = document(scope, partition);
    doc.block(Block::new("terraform").with_body(|b| {
        b.block(Block::new("backend").label("s3").with_body(|s| {
            s.attr("bucket", Value::str(bucket))
                .attr("key", Value::str(state_key(key_prefix, partition)))
                .attr(
                    "region",
                    Value::str(region.as_deref().unwrap_or(&scope.region)),
                );
        }));
    }));
    Some(doc.to_hcl_string())
}

fn tags_value(tags: &TagSet) -> Value {
    Value::string_map(tags)
}

fn output(name: &str, description: &str, value: Value) -> Block {
    Block::new("output").label(name).with_body(|b| {
        b.attr("description", Value::str(description))
            .attr("value", value);
    })
}

// =============================================================================
// HUB PARTITION
// =============================================================================

fn synthesize_hub(topology: &PartitionedTopology, options: &SynthOptions) -> SynthesizedConfig {
    let scope = &topology.scope;
    let hub = &topology.hub;
    let mut files = BTreeMap::new();

    files.insert(
        VERSIONS_FILE.to_string(),
        versions_file(scope, &hub.name, options),
    );
    if let Some(backend) = backend_file(scope, &hub.name, options) {
        files.insert(BACKEND_FILE.to_string(), backend);
    }
    files.insert(MAIN_FILE.to_string(), hub_main(topology));
    if !hub.spoke_routes.is_empty() {
        files.insert(VPC_ROUTES_FILE.to_string(), hub_vpc_routes(scope, hub));
    }
    files.insert(OUTPUTS_FILE.to_string(), hub_outputs(scope, hub));

    SynthesizedConfig {
        partition: hub.name.clone(),
        files,
        remote_refs: Vec::new(),
    }
}

fn hub_main(topology: &PartitionedTopology) -> String {
    let hub = &topology.hub;
    let gateway = &hub.gateway;
    let mut doc = document(&topology.scope, &hub.name);

    doc.section(ResourceKind::Gateway.label()).block(
        Block::resource(ResourceKind::Gateway.terraform_type(), crate::address::SINGLETON_NAME)
            .with_body(|b| {
                b.attr("description", Value::str(&gateway.description))
                    .attr("amazon_side_asn", Value::Number(gateway.amazon_side_asn))
                    .attr(
                        "auto_accept_shared_attachments",
                        Value::str(gateway.auto_accept_shared_attachments.as_str()),
                    )
                    .attr(
                        "default_route_table_association",
                        Value::str(gateway.default_route_table_association.as_str()),
                    )
                    .attr(
                        "default_route_table_propagation",
                        Value::str(gateway.default_route_table_propagation.as_str()),
                    )
                    .attr("dns_support", Value::str(gateway.dns_support.as_str()))
                    .attr(
                        "vpn_ecmp_support",
                        Value::str(gateway.vpn_ecmp_support.as_str()),
                    )
                    .attr(
                        "multicast_support",
                        Value::str(gateway.multicast_support.as_str()),
                    )
                    .attr("tags", tags_value(&gateway.tags));
            }),
    );

    let mut vpc = hub.attachments_of(AttachmentKind::Vpc).peekable();
    if vpc.peek().is_some() {
        doc.section(ResourceKind::VpcAttachment.label());
        for attachment in vpc {
            if let AttachmentVariant::Vpc(detail) = &attachment.record.variant {
                doc.block(vpc_attachment_block(topology, attachment, detail));
            }
        }
    }

    let peering: Vec<(&Keyed<AttachmentRecord>, &PeeringAttachment)> = hub
        .attachments
        .iter()
        .filter(|a| a.record.is_managed())
        .filter_map(|a| match &a.record.variant {
            AttachmentVariant::Peering(detail) => Some((a, detail)),
            _ => None,
        })
        .collect();
    if !peering.is_empty() {
        doc.section(ResourceKind::PeeringAttachment.label());
        for (attachment, detail) in peering {
            doc.block(peering_attachment_block(attachment, detail));
        }
    }

    let lookups: Vec<&Keyed<AttachmentRecord>> = hub
        .attachments
        .iter()
        .filter(|a| !a.record.is_managed())
        .collect();
    if !lookups.is_empty() {
        doc.section(ResourceKind::AttachmentLookup.label());
        for attachment in lookups {
            doc.block(
                Block::data(ResourceKind::AttachmentLookup.terraform_type(), &attachment.key)
                    .with_body(|b| {
                        b.attr(
                            "transit_gateway_attachment_id",
                            Value::str(&attachment.record.id),
                        );
                    }),
            );
        }
    }

    doc.to_hcl_string()
}

/// Whether the attachment is associated with (propagated to) a route table
/// that the gateway uses as its default association (propagation) table.
fn default_table_flags(topology: &PartitionedTopology, attachment_id: &str) -> (bool, bool) {
    let linked = |links: &[KeyedLink]| links.iter().any(|l| l.attachment.id == attachment_id);
    let association = topology.route_tables.iter().any(|rt| {
        rt.route_table.record.default_association_route_table && linked(&rt.associations)
    });
    let propagation = topology.route_tables.iter().any(|rt| {
        rt.route_table.record.default_propagation_route_table && linked(&rt.propagations)
    });
    (association, propagation)
}

fn vpc_attachment_block(
    topology: &PartitionedTopology,
    attachment: &Keyed<AttachmentRecord>,
    detail: &VpcAttachment,
) -> Block {
    let (default_association, default_propagation) =
        default_table_flags(topology, &attachment.record.id);

    let mut ignored = vec![
        Value::expr("transit_gateway_default_route_table_association"),
        Value::expr("transit_gateway_default_route_table_propagation"),
    ];
    if !detail.options_reported {
        ignored.extend([
            Value::expr("appliance_mode_support"),
            Value::expr("dns_support"),
            Value::expr("ipv6_support"),
        ]);
    }

    Block::resource(ResourceKind::VpcAttachment.terraform_type(), &attachment.key).with_body(
        |b| {
            b.attr(
                "transit_gateway_id",
                Value::expr(Address::singleton(ResourceKind::Gateway).id_expr()),
            )
            .attr("vpc_id", Value::str(&detail.vpc_id))
            .attr("subnet_ids", Value::strings(detail.subnet_ids.iter().cloned()))
            .attr(
                "appliance_mode_support",
                Value::str(detail.appliance_mode_support.as_str()),
            )
            .attr("dns_support", Value::str(detail.dns_support.as_str()))
            .attr("ipv6_support", Value::str(detail.ipv6_support.as_str()))
            .attr(
                "transit_gateway_default_route_table_association",
                Value::Bool(default_association),
            )
            .attr(
                "transit_gateway_default_route_table_propagation",
                Value::Bool(default_propagation),
            )
            .attr("tags", tags_value(&attachment.record.tags))
            .blank()
            .block(Block::new("lifecycle").with_body(|l| {
                l.attr("ignore_changes", Value::List(ignored));
            }));
        },
    )
}

fn peering_attachment_block(
    attachment: &Keyed<AttachmentRecord>,
    detail: &PeeringAttachment,
) -> Block {
    Block::resource(
        ResourceKind::PeeringAttachment.terraform_type(),
        &attachment.key,
    )
    .with_body(|b| {
        b.attr(
            "transit_gateway_id",
            Value::expr(Address::singleton(ResourceKind::Gateway).id_expr()),
        )
        .attr("peer_transit_gateway_id", Value::str(&detail.peer_gateway_id))
        .attr("peer_region", Value::str(&detail.peer_region))
        .attr_opt(
            "peer_account_id",
            detail.peer_account_id.as_deref().map(Value::str),
        )
        .attr("tags", tags_value(&attachment.record.tags));
    })
}

/// The managed VPC attachment a spoke route depends on, if the hub declares one
/// for the route's VPC.
fn spoke_dependency(hub: &HubPartition, route: &VpcRouteRecord) -> Option<Address> {
    hub.attachments_of(AttachmentKind::Vpc)
        .find(|a| matches!(&a.record.variant, AttachmentVariant::Vpc(vpc) if vpc.vpc_id == route.vpc_id))
        .map(|a| Address::new(ResourceKind::VpcAttachment, &a.key))
}

fn hub_vpc_routes(scope: &Scope, hub: &HubPartition) -> String {
    let mut doc = document(scope, &hub.name);
    doc.section(ResourceKind::SpokeRoute.label());

    for route in &hub.spoke_routes {
        let record = &route.record;
        let destination_attr = if record.is_ipv6() {
            "destination_ipv6_cidr_block"
        } else {
            "destination_cidr_block"
        };
        let dependency = spoke_dependency(hub, record);

        doc.block(
            Block::resource(ResourceKind::SpokeRoute.terraform_type(), &route.key).with_body(
                |b| {
                    b.attr("route_table_id", Value::str(&record.route_table_id))
                        .attr(destination_attr, Value::str(&record.destination))
                        .attr(
                            "transit_gateway_id",
                            Value::expr(Address::singleton(ResourceKind::Gateway).id_expr()),
                        );
                    if let Some(dependency) = dependency {
                        b.blank().attr(
                            "depends_on",
                            Value::List(vec![Value::expr(dependency.to_string())]),
                        );
                    }
                },
            ),
        );
    }

    doc.to_hcl_string()
}

/// Tags carried with the same value by the gateway and every attachment,
/// without `Name`.
pub fn shared_tags(hub: &HubPartition) -> TagSet {
    let mut shared: TagSet = hub
        .gateway
        .tags
        .iter()
        .filter(|(key, _)| key.as_str() != "Name")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for attachment in &hub.attachments {
        shared.retain(|key, value| attachment.record.tags.get(key) == Some(value));
    }
    shared
}

fn hub_outputs(scope: &Scope, hub: &HubPartition) -> String {
    let gateway = Address::singleton(ResourceKind::Gateway);
    let mut doc = document(scope, &hub.name);

    doc.block(output(
        "gateway_id",
        "Transit gateway id",
        Value::expr(gateway.id_expr()),
    ))
    .block(output(
        "gateway_arn",
        "Transit gateway ARN",
        Value::expr(format!("{gateway}.arn")),
    ))
    .block(output(
        "region",
        "Region the hub is deployed in",
        Value::str(&scope.region),
    ))
    .block(output(
        "tags",
        "Tags shared by the gateway and all of its attachments",
        tags_value(&shared_tags(hub)),
    ));

    for kind in AttachmentKind::ALL {
        let ids: BTreeMap<String, Value> = hub
            .attachments_of(kind)
            .map(|a| {
                let address = Address::new(ResourceKind::for_attachment(&a.record), &a.key);
                (a.key.clone(), Value::expr(address.id_expr()))
            })
            .collect();
        doc.block(output(
            kind.output_name(),
            &format!("{} attachment ids by key", kind.api_name()),
            Value::Map(ids),
        ));
    }

    doc.to_hcl_string()
}

// =============================================================================
// ROUTE TABLE PARTITIONS
// =============================================================================

fn synthesize_route_table(
    topology: &PartitionedTopology,
    rt: &RouteTablePartition,
    options: &SynthOptions,
) -> SynthesizedConfig {
    let scope = &topology.scope;
    let mut files = BTreeMap::new();

    files.insert(
        VERSIONS_FILE.to_string(),
        versions_file(scope, &rt.name, options),
    );
    if let Some(backend) = backend_file(scope, &rt.name, options) {
        files.insert(BACKEND_FILE.to_string(), backend);
    }
    files.insert(REMOTE_FILE.to_string(), remote_file(scope, rt, options));
    files.insert(MAIN_FILE.to_string(), route_table_main(scope, rt));
    files.insert(OUTPUTS_FILE.to_string(), route_table_outputs(scope, rt));

    let remote_refs = rt
        .referenced_attachments()
        .into_iter()
        .map(|attachment| CrossPartitionRef::for_attachment(&rt.hub, attachment))
        .collect();

    SynthesizedConfig {
        partition: rt.name.clone(),
        files,
        remote_refs,
    }
}

fn remote_file(scope: &Scope, rt: &RouteTablePartition, options: &SynthOptions) -> String {
    let mut config = BTreeMap::new();
    let backend = match &options.backend {
        StateBackend::Local => {
            config.insert(
                "path".to_string(),
                Value::str(format!("../{}/{STATE_FILE}", rt.hub)),
            );
            "local"
        }
        StateBackend::S3 {
            bucket,
            key_prefix,
            region,
        } => {
            config.insert("bucket".to_string(), Value::str(bucket));
            config.insert(
                "key".to_string(),
                Value::str(state_key(key_prefix, &rt.hub)),
            );
            config.insert(
                "region".to_string(),
                Value::str(region.as_deref().unwrap_or(&scope.region)),
            );
            "s3"
        }
    };

    let mut doc = document(scope, &rt.name);
    doc.block(
        Block::data("terraform_remote_state", REMOTE_STATE_NAME).with_body(|b| {
            b.attr("backend", Value::str(backend))
                .attr("config", Value::Map(config));
        }),
    );
    doc.to_hcl_string()
}

fn route_table_main(scope: &Scope, rt: &RouteTablePartition) -> String {
    let table = Address::singleton(ResourceKind::RouteTable);
    let attachment_expr =
        |attachment: &AttachmentRef| CrossPartitionRef::for_attachment(&rt.hub, attachment).expr();
    let mut doc = document(scope, &rt.name);

    doc.section(ResourceKind::RouteTable.label()).block(
        Block::resource(ResourceKind::RouteTable.terraform_type(), &table.name).with_body(|b| {
            b.attr(
                "transit_gateway_id",
                Value::expr(format!(
                    "data.terraform_remote_state.{REMOTE_STATE_NAME}.outputs.gateway_id"
                )),
            )
            .attr("tags", tags_value(&rt.route_table.record.tags));
        }),
    );

    if !rt.associations.is_empty() {
        doc.section(ResourceKind::Association.label());
        for link in &rt.associations {
            doc.block(
                Block::resource(ResourceKind::Association.terraform_type(), link.key()).with_body(
                    |b| {
                        b.attr(
                            "transit_gateway_attachment_id",
                            Value::expr(attachment_expr(&link.attachment)),
                        )
                        .attr(
                            "transit_gateway_route_table_id",
                            Value::expr(table.id_expr()),
                        )
                        .attr("replace_existing_association", Value::Bool(false));
                    },
                ),
            );
        }
    }

    if !rt.propagations.is_empty() {
        doc.section(ResourceKind::Propagation.label());
        for link in &rt.propagations {
            doc.block(
                Block::resource(ResourceKind::Propagation.terraform_type(), link.key()).with_body(
                    |b| {
                        b.attr(
                            "transit_gateway_attachment_id",
                            Value::expr(attachment_expr(&link.attachment)),
                        )
                        .attr(
                            "transit_gateway_route_table_id",
                            Value::expr(table.id_expr()),
                        );
                    },
                ),
            );
        }
    }

    if !rt.routes.is_empty() {
        doc.section(ResourceKind::Route.label());
        for route in &rt.routes {
            doc.block(
                Block::resource(ResourceKind::Route.terraform_type(), &route.key).with_body(|b| {
                    b.attr(
                        "destination_cidr_block",
                        Value::str(&route.destination_cidr_block),
                    )
                    .attr_opt(
                        "transit_gateway_attachment_id",
                        route.attachment().map(|a| Value::expr(attachment_expr(a))),
                    )
                    .attr(
                        "transit_gateway_route_table_id",
                        Value::expr(table.id_expr()),
                    )
                    .attr("blackhole", Value::Bool(route.is_blackhole()));
                }),
            );
        }
    }

    doc.to_hcl_string()
}

fn route_table_outputs(scope: &Scope, rt: &RouteTablePartition) -> String {
    let mut doc = document(scope, &rt.name);
    doc.block(output(
        "route_table_id",
        "Transit gateway route table id",
        Value::expr(Address::singleton(ResourceKind::RouteTable).id_expr()),
    ));
    doc.to_hcl_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AttachmentLink, GatewayRecord, PeeringRole, ResourceSnapshot, RouteRecord,
        RouteTableRecord, RouteTarget, Toggle,
    };
    use crate::partition::{partition, HubSelector};
    use pretty_assertions::assert_eq;

    fn tags(pairs: &[(&str, &str)]) -> TagSet {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn topology() -> PartitionedTopology {
        let scope = Scope::new(Some("123456789012".into()), "ap-northeast-1");
        let mut builder = ResourceSnapshot::builder(scope);
        builder
            .gateway(GatewayRecord {
                id: "tgw-0aaa1111".into(),
                name: Some("multi-vpc-tgw".into()),
                arn: None,
                owner_id: None,
                description: "Hub for ${env}".into(),
                amazon_side_asn: 64512,
                auto_accept_shared_attachments: Toggle::Disable,
                default_route_table_association: Toggle::Disable,
                default_route_table_propagation: Toggle::Disable,
                dns_support: Toggle::Enable,
                vpn_ecmp_support: Toggle::Enable,
                multicast_support: Toggle::Disable,
                tags: tags(&[("Name", "multi-vpc-tgw"), ("Env", "prod"), ("Team", "net")]),
            })
            .route_table(RouteTableRecord {
                id: "tgw-rtb-prod".into(),
                name: Some("tgw-rt-production".into()),
                gateway_id: "tgw-0aaa1111".into(),
                default_association_route_table: false,
                default_propagation_route_table: false,
                tags: tags(&[("Name", "tgw-rt-production")]),
            })
            .attachment(AttachmentRecord {
                id: "tgw-attach-vpc1".into(),
                name: Some("tgw-attachment-vpc1".into()),
                gateway_id: "tgw-0aaa1111".into(),
                tags: tags(&[("Name", "tgw-attachment-vpc1"), ("Env", "prod")]),
                variant: AttachmentVariant::Vpc(VpcAttachment {
                    vpc_id: "vpc-1".into(),
                    subnet_ids: vec!["subnet-a".into(), "subnet-b".into()],
                    appliance_mode_support: Toggle::Disable,
                    dns_support: Toggle::Enable,
                    ipv6_support: Toggle::Disable,
                    options_reported: false,
                }),
            })
            .attachment(AttachmentRecord {
                id: "tgw-attach-peer".into(),
                name: Some("tgw-peering-osaka".into()),
                gateway_id: "tgw-0aaa1111".into(),
                tags: tags(&[("Env", "prod")]),
                variant: AttachmentVariant::Peering(PeeringAttachment {
                    role: PeeringRole::Accepter,
                    peer_gateway_id: "tgw-0ccc3333".into(),
                    peer_region: "ap-northeast-3".into(),
                    peer_account_id: None,
                }),
            })
            .association(AttachmentLink {
                route_table_id: "tgw-rtb-prod".into(),
                attachment_id: "tgw-attach-vpc1".into(),
            })
            .route(RouteRecord {
                route_table_id: "tgw-rtb-prod".into(),
                destination_cidr_block: "0.0.0.0/0".into(),
                target: RouteTarget::Attachment {
                    attachment_id: "tgw-attach-peer".into(),
                },
            })
            .route(RouteRecord {
                route_table_id: "tgw-rtb-prod".into(),
                destination_cidr_block: "192.168.0.0/16".into(),
                target: RouteTarget::Blackhole,
            })
            .vpc_route(VpcRouteRecord {
                route_table_id: "rtb-0app".into(),
                route_table_name: Some("app-private-rt".into()),
                vpc_id: "vpc-1".into(),
                destination: "10.0.0.0/8".into(),
                gateway_id: "tgw-0aaa1111".into(),
            });
        partition(&builder.build(), &HubSelector::Auto).unwrap()
    }

    #[test]
    fn test_synthesis_is_byte_identical_on_rerun() {
        let topology = topology();
        let first = synthesize(&topology, &SynthOptions::default());
        let second = synthesize(&topology, &SynthOptions::default());
        assert_eq!(first, second);
        assert_eq!(first.configs[0].fingerprint(), second.configs[0].fingerprint());
    }

    #[test]
    fn test_one_config_per_partition_hub_first() {
        let topology = topology();
        let output = synthesize(&topology, &SynthOptions::default());
        let synthesized: Vec<&str> = output.configs.iter().map(|c| c.partition.as_str()).collect();
        let partitions = topology.partitions();
        let expected: Vec<&str> = partitions.iter().map(|p| p.name()).collect();
        assert_eq!(synthesized, expected);
        assert!(topology.partitions()[0].is_hub());
    }

    #[test]
    fn test_hub_file_set() {
        let output = synthesize(&topology(), &SynthOptions::default());
        let hub = output.config("multi_vpc_tgw").unwrap();
        let names: Vec<&str> = hub.files.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["main.tf", "outputs.tf", "versions.tf", "vpc_routes.tf"]);
        assert!(hub.remote_refs.is_empty());
    }

    #[test]
    fn test_gateway_block_escapes_template_sequences() {
        let output = synthesize(&topology(), &SynthOptions::default());
        let main = output.configs[0].file(MAIN_FILE).unwrap();
        assert!(main.contains(r#"description                     = "Hub for $${env}""#));
        assert!(main.contains("amazon_side_asn                 = 64512"));
    }

    #[test]
    fn test_vpc_attachment_ignores_unreported_options() {
        let output = synthesize(&topology(), &SynthOptions::default());
        let main = output.configs[0].file(MAIN_FILE).unwrap();
        assert!(main.contains(
            "ignore_changes = [transit_gateway_default_route_table_association, transit_gateway_default_route_table_propagation, appliance_mode_support, dns_support, ipv6_support]"
        ));
        assert!(main.contains("transit_gateway_default_route_table_association = false"));
        assert!(main.contains(r#"subnet_ids                                      = ["subnet-a", "subnet-b"]"#));
    }

    #[test]
    fn test_accepter_peering_is_a_lookup() {
        let output = synthesize(&topology(), &SynthOptions::default());
        let hub = &output.configs[0];
        let main = hub.file(MAIN_FILE).unwrap();
        assert!(main.contains(
            r#"data "aws_ec2_transit_gateway_attachment" "tgw_peering_osaka" {
  transit_gateway_attachment_id = "tgw-attach-peer"
}"#
        ));
        assert!(!main.contains("aws_ec2_transit_gateway_peering_attachment"));

        let outputs = hub.file(OUTPUTS_FILE).unwrap();
        assert!(outputs.contains(
            "tgw_peering_osaka = data.aws_ec2_transit_gateway_attachment.tgw_peering_osaka.id"
        ));
    }

    #[test]
    fn test_hub_outputs_shared_tags_and_empty_maps() {
        let output = synthesize(&topology(), &SynthOptions::default());
        let outputs = output.configs[0].file(OUTPUTS_FILE).unwrap();
        assert!(outputs.contains("    Env = \"prod\"\n"));
        assert!(!outputs.contains("Team"));
        assert!(outputs.contains(
            "output \"vpn_attachment_ids\" {\n  description = \"vpn attachment ids by key\"\n  value       = {}\n}"
        ));
    }

    #[test]
    fn test_spoke_route_depends_on_vpc_attachment() {
        let output = synthesize(&topology(), &SynthOptions::default());
        let routes = output.configs[0].file(VPC_ROUTES_FILE).unwrap();
        assert!(routes.contains(r#"resource "aws_route" "app_private_rt_to_10_0_0_0_8" {"#));
        assert!(routes.contains("depends_on = [aws_ec2_transit_gateway_vpc_attachment.tgw_attachment_vpc1]"));
    }

    #[test]
    fn test_route_table_references_hub_outputs() {
        let output = synthesize(&topology(), &SynthOptions::default());
        let rt = output.config("multi_vpc_tgw_rt_production").unwrap();
        let main = rt.file(MAIN_FILE).unwrap();

        assert!(main.contains(
            r#"transit_gateway_attachment_id  = data.terraform_remote_state.hub.outputs.vpc_attachment_ids["tgw_attachment_vpc1"]"#
        ));
        assert!(main.contains("replace_existing_association   = false"));
        assert_eq!(
            rt.remote_refs
                .iter()
                .map(|r| r.output.as_str())
                .collect::<Vec<_>>(),
            vec!["vpc_attachment_ids", "peering_attachment_ids"]
        );
        assert!(rt.file(REMOTE_FILE).unwrap().contains(r#"path = "../multi_vpc_tgw/terraform.tfstate""#));
    }

    #[test]
    fn test_blackhole_route_has_no_attachment_reference() {
        let output = synthesize(&topology(), &SynthOptions::default());
        let main = output.configs[1].file(MAIN_FILE).unwrap();
        assert!(main.contains(
            r#"resource "aws_ec2_transit_gateway_route" "route_192_168_0_0_16_blackhole" {
  destination_cidr_block         = "192.168.0.0/16"
  transit_gateway_route_table_id = aws_ec2_transit_gateway_route_table.this.id
  blackhole                      = true
}"#
        ));
    }

    #[test]
    fn test_s3_backend_writes_backend_files() {
        let options = SynthOptions {
            backend: StateBackend::S3 {
                bucket: "tf-state".into(),
                key_prefix: "network/".into(),
                region: None,
            },
            ..SynthOptions::default()
        };
        let output = synthesize(&topology(), &options);
        for config in &output.configs {
            let backend = config.file(BACKEND_FILE).unwrap();
            assert!(backend.contains(&format!(
                r#"key    = "network/{}/terraform.tfstate""#,
                config.partition
            )));
        }
        let remote = output.configs[1].file(REMOTE_FILE).unwrap();
        assert!(remote.contains(r#"backend = "s3""#));
        assert!(remote.contains(r#"key    = "network/multi_vpc_tgw/terraform.tfstate""#));
    }
}
