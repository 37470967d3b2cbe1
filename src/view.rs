//! View projector: bounded neighborhoods and the node/edge JSON shape the
//! frontend renders.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::egress::{EgressForest, PathStep, ReturnPaths};
use crate::error::Result;
use crate::nn;
use crate::source::LinkMap;
use crate::topology::{Edge, Topology};
use crate::RouterId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitPaths {
    pub outbound: Option<Vec<PathStep>>,
    #[serde(rename = "return")]
    pub ret: Option<Vec<PathStep>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeView {
    pub id: RouterId,
    pub nn: Option<String>,
    pub nn_int: Option<u32>,
    pub exit_network_cost: Option<u32>,
    pub exit_paths: ExitPaths,
    /// Outbound edges of the whole graph absent from this projection; a
    /// non-zero count signals a visually truncated neighborhood.
    pub missing_edges: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_neighbor_set: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub networks: Option<LinkMap>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeView {
    pub from: RouterId,
    pub to: RouterId,
    /// `None` marks a ghost edge in outage views (the link being removed).
    pub weight: Option<u32>,
}

impl From<&Edge> for EdgeView {
    fn from(edge: &Edge) -> Self {
        Self {
            from: edge.from.clone(),
            to: edge.to.clone(),
            weight: Some(edge.cost),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphView {
    pub nodes: Vec<NodeView>,
    pub edges: Vec<EdgeView>,
}

/// Projection knobs: outage views drop per-router link metadata, neighbor
/// views flag which members came from the search itself.
#[derive(Debug, Default)]
pub struct Projection<'a> {
    pub neighbor_set: Option<&'a BTreeSet<RouterId>>,
    pub include_networks: bool,
}

/// Routers reachable within `depth` hops of `router` over the undirected
/// adjacency, origin included at depth 0.
pub fn neighbor_set(topo: &Topology, router: &str, depth: usize) -> BTreeSet<RouterId> {
    let mut members = BTreeSet::from([router.to_string()]);
    for _ in 0..depth {
        let mut grown = members.clone();
        for id in &members {
            grown.extend(topo.undirected_neighbors(id).into_iter().cloned());
        }
        members = grown;
    }
    members
}

/// Projects the subgraph induced by `members` against `topo`. Members absent
/// from the graph are skipped silently (outage scenarios pass removed
/// routers through here). Nodes are emitted in ascending ID order, edges in
/// arena order; parallel edges are emitted individually.
pub fn project(
    topo: &Topology,
    members: &BTreeSet<RouterId>,
    forest: &EgressForest,
    return_paths: &ReturnPaths,
    options: &Projection,
) -> Result<GraphView> {
    let mut nodes = Vec::new();
    for id in members {
        let Some(meta) = topo.node(id) else {
            continue;
        };

        let outbound = forest.outbound_path(id)?;
        let ret = return_paths.get(id).cloned().flatten();

        nodes.push(NodeView {
            id: id.clone(),
            nn: nn::nn_string_from_ip(id).ok(),
            nn_int: nn::nn_from_ip(id).ok(),
            exit_network_cost: outbound.as_ref().map(|path| path.exit_cost),
            exit_paths: ExitPaths {
                outbound: outbound.map(|path| path.steps),
                ret,
            },
            missing_edges: topo.out(id).filter(|e| !members.contains(&e.to)).count(),
            in_neighbor_set: options.neighbor_set.map(|set| set.contains(id)),
            networks: options.include_networks.then(|| meta.links.clone()),
        });
    }

    let edges = topo
        .edges()
        .iter()
        .filter(|e| members.contains(&e.from) && members.contains(&e.to))
        .map(EdgeView::from)
        .collect();

    Ok(GraphView { nodes, edges })
}
