//! Key Deriver
//!
//! Maps identifying attributes to stable, HCL-safe keys and builds the keyed,
//! keyed view of the selected hub.
//!
//! ## Rules
//!
//! - prefer the `Name` tag; otherwise a fallback built from the external id or
//!   from semantic attributes (CIDR, blackhole flag)
//! - lowercase, collapse every run of non-alphanumerics into one `_`, trim `_`
//! - prefix `_` when the result starts with a digit
//!
//! Keys double as durable resource addresses, so two resources of the same kind
//! in the same scope deriving the same key is an error. Keys are never suffixed
//! to make them unique.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{ImportError, KeyKind, Result};
use crate::model::{
    AttachmentKind, AttachmentLink, AttachmentRecord, ExcludedResource, GatewayRecord,
    ResourceSnapshot, RouteRecord, RouteTableRecord, RouteTarget, Scope, VpcRouteRecord,
};

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("separator pattern is valid"));

/// Route table key prefixes dropped when building a partition key.
const ROUTE_TABLE_PREFIXES: &[&str] = &["tgw_rt_", "rt_"];

// =============================================================================
// DERIVATION
// =============================================================================

/// Normalize free text into a key fragment.
pub fn sanitize(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let collapsed = SEPARATORS.replace_all(&lowered, "_");
    let trimmed = collapsed.trim_matches('_');
    if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// The attributes a key is derived from.
#[derive(Debug, Clone, Copy)]
pub enum KeySource<'a> {
    /// Gateways, route tables, attachments, VPC route tables.
    Named {
        name: Option<&'a str>,
        external_id: &'a str,
    },
    /// Static route in a hub route table.
    Route { cidr: &'a str, blackhole: bool },
    /// Spoke VPC route pointing at the hub.
    SpokeRoute {
        route_table: KeySourceName<'a>,
        destination: &'a str,
    },
}

/// Name-or-id pair for resources that carry an optional display name.
#[derive(Debug, Clone, Copy)]
pub struct KeySourceName<'a> {
    pub name: Option<&'a str>,
    pub external_id: &'a str,
}

fn named(name: Option<&str>, external_id: &str) -> String {
    name.map(sanitize)
        .filter(|k| !k.is_empty())
        .unwrap_or_else(|| sanitize(external_id))
}

/// Derive a key. Pure: identical attributes always give an identical key.
pub fn derive_key(source: &KeySource<'_>) -> String {
    match source {
        KeySource::Named { name, external_id } => named(*name, external_id),
        KeySource::Route { cidr, blackhole } => {
            let mut key = format!("route_{}", sanitize(cidr).trim_start_matches('_'));
            if *blackhole {
                key.push_str("_blackhole");
            }
            key
        }
        KeySource::SpokeRoute {
            route_table,
            destination,
        } => format!(
            "{}_to_{}",
            named(route_table.name, route_table.external_id),
            sanitize(destination).trim_start_matches('_')
        ),
    }
}

/// `<hub>_rt_<route table key without tgw_rt_ / rt_ prefix>`.
pub fn route_table_partition_key(hub_key: &str, route_table_key: &str) -> String {
    let stem = ROUTE_TABLE_PREFIXES
        .iter()
        .find_map(|prefix| route_table_key.strip_prefix(prefix))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(route_table_key);
    format!("{hub_key}_rt_{stem}")
}

// =============================================================================
// KEYED VIEW
// =============================================================================

/// A record together with its derived key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyed<T> {
    pub key: String,
    pub record: T,
}

/// A resolved reference to an attachment owned by the hub.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AttachmentRef {
    pub key: String,
    pub kind: AttachmentKind,
    pub id: String,
    /// Declared as a managed resource rather than a lookup.
    pub managed: bool,
}

/// Association or propagation after keying: (route table, attachment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedLink {
    pub route_table_id: String,
    pub attachment: AttachmentRef,
}

impl KeyedLink {
    /// Associations and propagations are keyed by their attachment.
    pub fn key(&self) -> &str {
        &self.attachment.key
    }

    /// `{route-table-id}_{attachment-id}`
    pub fn import_id(&self) -> String {
        format!("{}_{}", self.route_table_id, self.attachment.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyedRouteTarget {
    Attachment(AttachmentRef),
    Blackhole,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedRoute {
    pub key: String,
    pub route_table_id: String,
    pub destination_cidr_block: String,
    pub target: KeyedRouteTarget,
}

impl KeyedRoute {
    pub fn is_blackhole(&self) -> bool {
        matches!(self.target, KeyedRouteTarget::Blackhole)
    }

    pub fn attachment(&self) -> Option<&AttachmentRef> {
        match &self.target {
            KeyedRouteTarget::Attachment(attachment) => Some(attachment),
            KeyedRouteTarget::Blackhole => None,
        }
    }

    /// `{route-table-id}_{cidr}`
    pub fn import_id(&self) -> String {
        format!("{}_{}", self.route_table_id, self.destination_cidr_block)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedRouteTable {
    pub key: String,
    pub record: RouteTableRecord,
    pub associations: Vec<KeyedLink>,
    pub propagations: Vec<KeyedLink>,
    pub routes: Vec<KeyedRoute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedGateway {
    pub key: String,
    pub record: GatewayRecord,
    pub route_tables: Vec<KeyedRouteTable>,
    pub attachments: Vec<Keyed<AttachmentRecord>>,
    pub spoke_routes: Vec<Keyed<VpcRouteRecord>>,
}

impl KeyedGateway {
    pub fn attachment(&self, key: &str) -> Option<&Keyed<AttachmentRecord>> {
        self.attachments.iter().find(|a| a.key == key)
    }
}

/// The selected hub with every key derived and checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedSnapshot {
    pub scope: Scope,
    pub hub: KeyedGateway,
    pub excluded: Vec<ExcludedResource>,
}

// =============================================================================
// ASSIGNMENT
// =============================================================================

/// Tracks keys claimed within one (scope, kind).
pub(crate) struct KeyRegistry {
    scope: String,
    kind: KeyKind,
    claimed: BTreeMap<String, String>,
}

impl KeyRegistry {
    pub(crate) fn new(scope: impl Into<String>, kind: KeyKind) -> Self {
        Self {
            scope: scope.into(),
            kind,
            claimed: BTreeMap::new(),
        }
    }

    /// Claim `key` for `owner`; fails if a different owner already holds it.
    pub(crate) fn claim(&mut self, key: &str, owner: &str) -> Result<()> {
        match self.claimed.get(key) {
            Some(existing) if existing != owner => Err(ImportError::KeyCollision {
                scope: self.scope.clone(),
                kind: self.kind,
                key: key.to_string(),
                first: existing.clone(),
                second: owner.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                self.claimed.insert(key.to_string(), owner.to_string());
                Ok(())
            }
        }
    }
}

fn missing(scope: &str, kind: KeyKind, reference: &str) -> ImportError {
    ImportError::MissingReference {
        scope: scope.to_string(),
        kind,
        reference: reference.to_string(),
    }
}

/// Outcome of resolving an attachment id from a route table.
enum Resolved {
    Found(AttachmentRef),
    Excluded,
}

struct AttachmentIndex<'a> {
    snapshot: &'a ResourceSnapshot,
    by_id: BTreeMap<&'a str, AttachmentRef>,
}

impl AttachmentIndex<'_> {
    fn resolve(&self, route_table: &RouteTableRecord, attachment_id: &str) -> Result<Resolved> {
        match self.by_id.get(attachment_id) {
            Some(found) => Ok(Resolved::Found(found.clone())),
            None if self.snapshot.is_excluded(attachment_id) => Ok(Resolved::Excluded),
            None => Err(missing(&route_table.id, KeyKind::Attachment, attachment_id)),
        }
    }
}

/// Derive the scope-unique key of every gateway, sorted by key.
pub fn key_gateways(snapshot: &ResourceSnapshot) -> Result<Vec<Keyed<GatewayRecord>>> {
    let gateway_scope = format!("{}/{}", snapshot.scope.account_label(), snapshot.scope.region);
    let mut registry = KeyRegistry::new(&gateway_scope, KeyKind::Gateway);
    let mut gateways = Vec::with_capacity(snapshot.gateways.len());
    for gateway in &snapshot.gateways {
        let key = derive_key(&KeySource::Named {
            name: gateway.name.as_deref(),
            external_id: &gateway.id,
        });
        registry.claim(&key, &gateway.id)?;
        gateways.push(Keyed {
            key,
            record: gateway.clone(),
        });
    }
    gateways.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(gateways)
}

/// Derive and check every key under the selected hub.
///
/// Resources of other gateways are dropped unkeyed, so nothing they hold can
/// fail the run.
pub fn assign_keys(snapshot: &ResourceSnapshot, hub_id: &str) -> Result<KeyedSnapshot> {
    let gateway_scope = format!("{}/{}", snapshot.scope.account_label(), snapshot.scope.region);
    let hub = snapshot.gateway(hub_id).ok_or_else(|| {
        ImportError::Config(format!("selected hub '{hub_id}' is not in {gateway_scope}"))
    })?;

    for rt in &snapshot.route_tables {
        if snapshot.gateway(&rt.gateway_id).is_none() {
            return Err(missing(&rt.id, KeyKind::Gateway, &rt.gateway_id));
        }
    }
    for attachment in &snapshot.attachments {
        if snapshot.gateway(&attachment.gateway_id).is_none() {
            return Err(missing(&attachment.id, KeyKind::Gateway, &attachment.gateway_id));
        }
    }

    let route_table_ids = snapshot
        .associations
        .iter()
        .chain(&snapshot.propagations)
        .map(|link| link.route_table_id.as_str())
        .chain(snapshot.routes.iter().map(|r| r.route_table_id.as_str()));
    for route_table_id in route_table_ids {
        if !snapshot.route_tables.iter().any(|rt| rt.id == route_table_id) {
            return Err(missing(&gateway_scope, KeyKind::RouteTable, route_table_id));
        }
    }

    for other in snapshot.gateways.iter().filter(|g| g.id != hub.id) {
        warn!(
            gateway = %other.label(),
            route_tables = snapshot.route_tables.iter().filter(|rt| rt.gateway_id == other.id).count(),
            attachments = snapshot.attachments.iter().filter(|a| a.gateway_id == other.id).count(),
            "Dropping resources of non-selected gateway"
        );
    }

    let mut excluded = snapshot.excluded.clone();
    let keyed = key_gateway(snapshot, hub, &mut excluded)?;

    for vpc_route in &snapshot.vpc_routes {
        if snapshot.gateway(&vpc_route.gateway_id).is_none() {
            debug!(
                route_table = %vpc_route.route_table_id,
                gateway = %vpc_route.gateway_id,
                "VPC route targets a gateway outside the snapshot"
            );
        }
    }

    excluded.sort();
    excluded.dedup();

    Ok(KeyedSnapshot {
        scope: snapshot.scope.clone(),
        hub: keyed,
        excluded,
    })
}

fn key_gateway(
    snapshot: &ResourceSnapshot,
    gateway: &GatewayRecord,
    excluded: &mut Vec<ExcludedResource>,
) -> Result<KeyedGateway> {
    let key = derive_key(&KeySource::Named {
        name: gateway.name.as_deref(),
        external_id: &gateway.id,
    });

    // Attachments: one key scope for every variant.
    let mut attachment_keys = KeyRegistry::new(&gateway.id, KeyKind::Attachment);
    let mut attachments = Vec::new();
    let mut by_id = BTreeMap::new();
    for attachment in snapshot
        .attachments
        .iter()
        .filter(|a| a.gateway_id == gateway.id)
    {
        let attachment_key = derive_key(&KeySource::Named {
            name: attachment.name.as_deref(),
            external_id: &attachment.id,
        });
        attachment_keys.claim(&attachment_key, &attachment.id)?;
        by_id.insert(
            attachment.id.as_str(),
            AttachmentRef {
                key: attachment_key.clone(),
                kind: attachment.kind(),
                id: attachment.id.clone(),
                managed: attachment.is_managed(),
            },
        );
        attachments.push(Keyed {
            key: attachment_key,
            record: attachment.clone(),
        });
    }
    attachments.sort_by(|a, b| a.key.cmp(&b.key));

    let index = AttachmentIndex { snapshot, by_id };

    let mut route_table_keys = KeyRegistry::new(&gateway.id, KeyKind::RouteTable);
    let mut route_tables = Vec::new();
    for rt in snapshot
        .route_tables
        .iter()
        .filter(|rt| rt.gateway_id == gateway.id)
    {
        let rt_key = derive_key(&KeySource::Named {
            name: rt.name.as_deref(),
            external_id: &rt.id,
        });
        route_table_keys.claim(&rt_key, &rt.id)?;
        route_tables.push(key_route_table(snapshot, rt, rt_key, &index, excluded)?);
    }
    route_tables.sort_by(|a, b| a.key.cmp(&b.key));

    let mut spoke_keys = KeyRegistry::new(&gateway.id, KeyKind::SpokeRoute);
    let mut spoke_routes = Vec::new();
    for route in snapshot
        .vpc_routes
        .iter()
        .filter(|r| r.gateway_id == gateway.id)
    {
        let spoke_key = derive_key(&KeySource::SpokeRoute {
            route_table: KeySourceName {
                name: route.route_table_name.as_deref(),
                external_id: &route.route_table_id,
            },
            destination: &route.destination,
        });
        spoke_keys.claim(
            &spoke_key,
            &format!("{}_{}", route.route_table_id, route.destination),
        )?;
        spoke_routes.push(Keyed {
            key: spoke_key,
            record: route.clone(),
        });
    }
    spoke_routes.sort_by(|a, b| a.key.cmp(&b.key));

    Ok(KeyedGateway {
        key,
        record: gateway.clone(),
        route_tables,
        attachments,
        spoke_routes,
    })
}

fn key_links(
    links: &[AttachmentLink],
    rt: &RouteTableRecord,
    kind: KeyKind,
    index: &AttachmentIndex<'_>,
    excluded: &mut Vec<ExcludedResource>,
) -> Result<Vec<KeyedLink>> {
    let mut registry = KeyRegistry::new(&rt.id, kind);
    let mut keyed = Vec::new();

    for link in links.iter().filter(|l| l.route_table_id == rt.id) {
        match index.resolve(rt, &link.attachment_id)? {
            Resolved::Found(attachment) => {
                registry.claim(&attachment.key, &attachment.id)?;
                keyed.push(KeyedLink {
                    route_table_id: rt.id.clone(),
                    attachment,
                });
            }
            Resolved::Excluded => {
                warn!(
                    route_table = %rt.id,
                    attachment = %link.attachment_id,
                    kind = %kind,
                    "Dropping link to an excluded attachment"
                );
                excluded.push(ExcludedResource {
                    kind: format!("tgw-{}", kind.to_string().replace(' ', "-")),
                    id: format!("{}_{}", rt.id, link.attachment_id),
                    reason: "references an excluded attachment".into(),
                });
            }
        }
    }

    keyed.sort_by(|a, b| a.attachment.key.cmp(&b.attachment.key));
    Ok(keyed)
}

fn key_routes(
    routes: &[RouteRecord],
    rt: &RouteTableRecord,
    index: &AttachmentIndex<'_>,
    excluded: &mut Vec<ExcludedResource>,
) -> Result<Vec<KeyedRoute>> {
    let mut registry = KeyRegistry::new(&rt.id, KeyKind::Route);
    let mut keyed = Vec::new();

    for route in routes.iter().filter(|r| r.route_table_id == rt.id) {
        let target = match &route.target {
            RouteTarget::Blackhole => KeyedRouteTarget::Blackhole,
            RouteTarget::Attachment { attachment_id } => match index.resolve(rt, attachment_id)? {
                Resolved::Found(attachment) => KeyedRouteTarget::Attachment(attachment),
                Resolved::Excluded => {
                    warn!(
                        route_table = %rt.id,
                        destination = %route.destination_cidr_block,
                        attachment = %attachment_id,
                        "Dropping route to an excluded attachment"
                    );
                    excluded.push(ExcludedResource {
                        kind: "tgw-route".into(),
                        id: format!("{}_{}", rt.id, route.destination_cidr_block),
                        reason: "targets an excluded attachment".into(),
                    });
                    continue;
                }
            },
        };

        let key = derive_key(&KeySource::Route {
            cidr: &route.destination_cidr_block,
            blackhole: route.is_blackhole(),
        });
        registry.claim(&key, &route.destination_cidr_block)?;
        keyed.push(KeyedRoute {
            key,
            route_table_id: rt.id.clone(),
            destination_cidr_block: route.destination_cidr_block.clone(),
            target,
        });
    }

    keyed.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(keyed)
}

fn key_route_table(
    snapshot: &ResourceSnapshot,
    rt: &RouteTableRecord,
    key: String,
    index: &AttachmentIndex<'_>,
    excluded: &mut Vec<ExcludedResource>,
) -> Result<KeyedRouteTable> {
    let associations = key_links(
        &snapshot.associations,
        rt,
        KeyKind::Association,
        index,
        excluded,
    )?;
    let propagations = key_links(
        &snapshot.propagations,
        rt,
        KeyKind::Propagation,
        index,
        excluded,
    )?;
    let routes = key_routes(&snapshot.routes, rt, index, excluded)?;

    Ok(KeyedRouteTable {
        key,
        record: rt.clone(),
        associations,
        propagations,
        routes,
    })
}
