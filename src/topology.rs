//! Topology builder: raw link-state snapshot to weighted directed multigraph.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::warn;

use crate::error::{Error, Result};
use crate::source::{LinkDb, LinkEntry, LinkKind, LinkMap};
use crate::RouterId;

/// One directed link. Parallel links between the same ordered pair are
/// distinct entries in the edge arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: RouterId,
    pub to: RouterId,
    pub cost: u32,
}

/// Per-router metadata carried alongside the graph. `links` holds every
/// advertised category except `network`: shared segments are expanded into
/// synthesized `router` entries during build, so the public view is
/// link-type-agnostic.
#[derive(Debug, Clone)]
pub struct RouterNode {
    pub links: LinkMap,
    /// Direct default-route cost, when the router advertises one with a
    /// usable metric.
    pub exit_cost: Option<u32>,
    /// Whether any external advertisement names the default route.
    pub is_egress: bool,
}

/// The directed weighted multigraph plus per-router metadata, reduced to the
/// single largest connected component of its undirected projection.
#[derive(Debug, Clone)]
pub struct Topology {
    nodes: BTreeMap<RouterId, RouterNode>,
    edges: Vec<Edge>,
    out_by_node: HashMap<RouterId, Vec<usize>>,
    in_by_node: HashMap<RouterId, Vec<usize>>,
}

impl Topology {
    pub fn from_snapshot(db: &LinkDb) -> Result<Self> {
        let area = db.backbone()?;

        let mut nodes: BTreeMap<RouterId, RouterNode> = BTreeMap::new();
        let mut edges: Vec<Edge> = Vec::new();

        for (router_id, lsa) in &area.routers {
            let mut links = lsa.links.clone();
            let network_links = links.remove(&LinkKind::Network).unwrap_or_default();

            for entry in links.get(&LinkKind::Router).into_iter().flatten() {
                match entry.cost() {
                    Some(cost) => edges.push(Edge {
                        from: router_id.clone(),
                        to: entry.id.clone(),
                        cost,
                    }),
                    None => warn!(router = %router_id, link = %entry.id, "router link without metric, skipping"),
                }
            }

            // Expand each shared segment into direct links to every other
            // member, and record them as synthesized router entries.
            let mut synthesized = Vec::new();
            for entry in &network_links {
                let Some(cost) = entry.cost() else {
                    warn!(router = %router_id, network = %entry.id, "network link without metric, skipping");
                    continue;
                };
                let Some(segment) = area.networks.get(&entry.id) else {
                    warn!(router = %router_id, network = %entry.id, "advertised network has no segment record");
                    continue;
                };
                for member in &segment.routers {
                    if member != router_id {
                        synthesized.push(LinkEntry {
                            id: member.clone(),
                            metric: Some(cost),
                            metric2: None,
                            via: None,
                        });
                        edges.push(Edge {
                            from: router_id.clone(),
                            to: member.clone(),
                            cost,
                        });
                    }
                }
            }
            if !synthesized.is_empty() {
                links.entry(LinkKind::Router).or_default().extend(synthesized);
            }

            let externals = links.get(&LinkKind::External);
            let is_egress = externals
                .into_iter()
                .flatten()
                .any(LinkEntry::is_default_route);
            let exit_cost = externals
                .into_iter()
                .flatten()
                .filter(|e| e.is_default_route())
                .last()
                .and_then(LinkEntry::cost);

            nodes.insert(
                router_id.clone(),
                RouterNode {
                    links,
                    exit_cost,
                    is_egress,
                },
            );
        }

        // Endpoints without a link-state record of their own were only ever
        // referenced by other advertisers. Drop them and their edges.
        let orphans: BTreeSet<&RouterId> = edges
            .iter()
            .flat_map(|e| [&e.from, &e.to])
            .filter(|id| !nodes.contains_key(*id))
            .collect();
        if !orphans.is_empty() {
            warn!(
                ?orphans,
                "dropping nodes that appear as links but have no router entries; check OSPF DB consistency"
            );
            edges.retain(|e| nodes.contains_key(&e.from) && nodes.contains_key(&e.to));
        }

        let keep = largest_component(&nodes, &edges);
        nodes.retain(|id, _| keep.contains(id));
        edges.retain(|e| keep.contains(&e.from) && keep.contains(&e.to));

        Ok(Self::assemble(nodes, edges))
    }

    fn assemble(nodes: BTreeMap<RouterId, RouterNode>, edges: Vec<Edge>) -> Self {
        let mut out_by_node: HashMap<RouterId, Vec<usize>> = HashMap::new();
        let mut in_by_node: HashMap<RouterId, Vec<usize>> = HashMap::new();
        for (idx, edge) in edges.iter().enumerate() {
            out_by_node.entry(edge.from.clone()).or_default().push(idx);
            in_by_node.entry(edge.to.clone()).or_default().push(idx);
        }
        Self {
            nodes,
            edges,
            out_by_node,
            in_by_node,
        }
    }

    /// Reduced copy for outage scenarios: drops every parallel link between
    /// each pair in both directions, then the named routers with all their
    /// incident edges. The result is deliberately not re-reduced to a single
    /// component; the egress forest decides who is still reachable.
    pub fn without(&self, routers: &[RouterId], pairs: &[(RouterId, RouterId)]) -> Self {
        let removed: HashSet<&RouterId> = routers.iter().collect();
        let mut nodes = self.nodes.clone();
        for router in routers {
            nodes.remove(router);
        }

        let edges = self
            .edges
            .iter()
            .filter(|e| {
                !pairs.iter().any(|(a, b)| {
                    (e.from == *a && e.to == *b) || (e.from == *b && e.to == *a)
                })
            })
            .filter(|e| !removed.contains(&e.from) && !removed.contains(&e.to))
            .cloned()
            .collect();

        Self::assemble(nodes, edges)
    }

    pub fn contains(&self, router: &str) -> bool {
        self.nodes.contains_key(router)
    }

    pub fn node(&self, router: &str) -> Option<&RouterNode> {
        self.nodes.get(router)
    }

    pub fn router_ids(&self) -> impl Iterator<Item = &RouterId> {
        self.nodes.keys()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&RouterId, &RouterNode)> {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn out<'a>(&'a self, router: &str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.out_by_node
            .get(router)
            .into_iter()
            .flatten()
            .map(|&idx| &self.edges[idx])
    }

    pub fn incoming<'a>(&'a self, router: &str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.in_by_node
            .get(router)
            .into_iter()
            .flatten()
            .map(|&idx| &self.edges[idx])
    }

    /// Distinct adjacent routers over the undirected projection.
    pub fn undirected_neighbors(&self, router: &str) -> BTreeSet<&RouterId> {
        self.out(router)
            .map(|e| &e.to)
            .chain(self.incoming(router).map(|e| &e.from))
            .collect()
    }

    /// Minimum cost among the parallel links `from -> to`.
    pub fn min_cost(&self, from: &str, to: &str) -> Option<u32> {
        self.out(from).filter(|e| e.to == to).map(|e| e.cost).min()
    }

    /// Every parallel link `from -> to`, in arena order.
    pub fn edges_between(&self, from: &str, to: &str) -> Vec<&Edge> {
        self.out(from).filter(|e| e.to == to).collect()
    }
}

/// Largest connected component of the undirected projection. Deterministic:
/// nodes are scanned in ascending ID order, so among equally sized
/// components the one containing the smallest ID wins.
fn largest_component(nodes: &BTreeMap<RouterId, RouterNode>, edges: &[Edge]) -> BTreeSet<RouterId> {
    let mut adjacency: HashMap<&RouterId, Vec<&RouterId>> = HashMap::new();
    for edge in edges {
        adjacency.entry(&edge.from).or_default().push(&edge.to);
        adjacency.entry(&edge.to).or_default().push(&edge.from);
    }

    let mut best: BTreeSet<RouterId> = BTreeSet::new();
    let mut visited: HashSet<&RouterId> = HashSet::new();
    for start in nodes.keys() {
        if visited.contains(start) {
            continue;
        }
        let mut component: BTreeSet<RouterId> = BTreeSet::new();
        let mut stack = vec![start];
        visited.insert(start);
        while let Some(current) = stack.pop() {
            component.insert(current.clone());
            for next in adjacency.get(current).into_iter().flatten() {
                if visited.insert(next) {
                    stack.push(next);
                }
            }
        }
        if component.len() > best.len() {
            best = component;
        }
    }
    best
}
