//! Outage simulator: removes candidate routers/links, recomputes the egress
//! forest on the reduced graph, and classifies the fallout.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::egress::{compute_egress_forest, compute_return_paths, EgressForest, ForestNode, ReturnPaths};
use crate::error::{Error, Result};
use crate::nn;
use crate::topology::Topology;
use crate::view::{self, EdgeView, ExitPaths, NodeView, Projection};
use crate::RouterId;

/// A candidate removal: router IDs and unordered router pairs. A pair names
/// every parallel link between the two routers, in both directions.
#[derive(Debug, Clone, Default)]
pub struct OutageScenario {
    pub routers: Vec<RouterId>,
    pub links: Vec<(RouterId, RouterId)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutageLists {
    /// The scenario's routers, sorted.
    pub removed: Vec<RouterId>,
    /// Fully dependent: no path to any egress after the removal.
    pub offline: Vec<RouterId>,
    /// Partially dependent: still reach an egress, via a different path.
    pub rerouted: Vec<RouterId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutageReport {
    pub nodes: Vec<NodeView>,
    pub edges: Vec<EdgeView>,
    pub outage_lists: OutageLists,
}

fn validate(topo: &Topology, scenario: &OutageScenario) -> Result<()> {
    if scenario.routers.is_empty() && scenario.links.is_empty() {
        return Err(Error::InvalidScenario(
            "must name at least one router or link".into(),
        ));
    }

    for router in &scenario.routers {
        if !topo.contains(router) {
            return Err(Error::UnknownRouter(router.clone()));
        }
    }

    for (a, b) in &scenario.links {
        for endpoint in [a, b] {
            if !topo.contains(endpoint) {
                return Err(Error::UnknownRouter(endpoint.clone()));
            }
        }
        if a == b {
            return Err(Error::InvalidScenario(format!(
                "self loop on {a}: self loops don't exist"
            )));
        }
        if topo.edges_between(a, b).is_empty() && topo.edges_between(b, a).is_empty() {
            return Err(Error::InvalidScenario(format!(
                "no link connecting routers {a} and {b}"
            )));
        }
    }

    Ok(())
}

/// Routers whose current egress routing depends on the scenario's removals:
/// forest-upstream sets of removed routers and of removed forest edges, plus
/// any router whose return path crosses a removed router or pair.
fn dependent_routers(
    forest: &EgressForest,
    return_paths: &ReturnPaths,
    scenario: &OutageScenario,
) -> BTreeSet<RouterId> {
    let mut dependents = BTreeSet::new();

    for router in &scenario.routers {
        dependents.extend(forest.upstream_of(&ForestNode::Router(router.clone())));
    }

    for (a, b) in &scenario.links {
        if forest.has_edge(a, b) {
            dependents.extend(forest.upstream_of(&ForestNode::Router(a.clone())));
        }
        if forest.has_edge(b, a) {
            dependents.extend(forest.upstream_of(&ForestNode::Router(b.clone())));
        }
    }

    for (candidate, path) in return_paths {
        let Some(steps) = path else { continue };
        let hops: Vec<&RouterId> = steps.iter().map(|step| &step.0).collect();

        for removed in &scenario.routers {
            if candidate != removed && hops.iter().any(|hop| *hop == removed) {
                dependents.insert(candidate.clone());
            }
        }

        for pair in hops.windows(2) {
            for (a, b) in &scenario.links {
                if (pair[0] == a && pair[1] == b) || (pair[0] == b && pair[1] == a) {
                    dependents.insert(candidate.clone());
                }
            }
        }
    }

    dependents
}

/// Simulates the scenario against one consistent snapshot. Pure with respect
/// to the inputs: repeated calls with the same graph and scenario produce
/// identical output.
pub fn simulate(
    topo: &Topology,
    forest: &EgressForest,
    return_paths: &ReturnPaths,
    scenario: &OutageScenario,
) -> Result<OutageReport> {
    validate(topo, scenario)?;

    let dependents = dependent_routers(forest, return_paths, scenario);

    let reduced = topo.without(&scenario.routers, &scenario.links);
    let reduced_forest = compute_egress_forest(&reduced);
    let reduced_return_paths = compute_return_paths(&reduced, &reduced_forest)?;

    let partially: BTreeSet<RouterId> = dependents
        .iter()
        .filter(|router| reduced_forest.contains(router))
        .cloned()
        .collect();
    let fully: BTreeSet<RouterId> = dependents.difference(&partially).cloned().collect();

    let mut affected: BTreeSet<RouterId> = partially.union(&fully).cloned().collect();
    for (a, b) in &scenario.links {
        affected.insert(a.clone());
        affected.insert(b.clone());
    }

    // Pull in everything on the affected routers' new egress paths so the
    // rendered subgraph shows where traffic goes now.
    let mut display = affected.clone();
    for router in &affected {
        if let Some(outbound) = reduced_forest.outbound_path(router)? {
            display.extend(outbound.steps.into_iter().map(|step| step.0));
        }
        if let Some(Some(steps)) = reduced_return_paths.get(router) {
            display.extend(steps.iter().map(|step| step.0.clone()));
        }
    }

    let projected = view::project(
        &reduced,
        &display,
        &reduced_forest,
        &reduced_return_paths,
        &Projection {
            neighbor_set: None,
            include_networks: false,
        },
    )?;
    let mut nodes = projected.nodes;
    let mut edges = projected.edges;

    // Ghost edges for everything that was removed, so the client can render
    // what is gone: the scenario's pairs plus each removed router's links to
    // displayed neighbors.
    let mut ghost_pairs = scenario.links.clone();
    for router in &scenario.routers {
        let successors: BTreeSet<&RouterId> = topo.out(router).map(|e| &e.to).collect();
        for successor in successors {
            if display.contains(successor) {
                ghost_pairs.push((router.clone(), successor.clone()));
            }
        }
    }
    ghost_pairs.sort();
    for (a, b) in ghost_pairs {
        edges.push(EdgeView {
            from: a.clone(),
            to: b.clone(),
            weight: None,
        });
        edges.push(EdgeView {
            from: b,
            to: a,
            weight: None,
        });
    }

    // Removed routers appear as nodes with null exit data.
    for router in &scenario.routers {
        nodes.push(NodeView {
            id: router.clone(),
            nn: nn::nn_string_from_ip(router).ok(),
            nn_int: nn::nn_from_ip(router).ok(),
            exit_network_cost: None,
            exit_paths: ExitPaths {
                outbound: None,
                ret: None,
            },
            missing_edges: 0,
            in_neighbor_set: None,
            networks: None,
        });
    }

    let removed: BTreeSet<RouterId> = scenario.routers.iter().cloned().collect();
    Ok(OutageReport {
        nodes,
        edges,
        outage_lists: OutageLists {
            removed: removed.iter().cloned().collect(),
            offline: fully.difference(&removed).cloned().collect(),
            rerouted: partially.into_iter().collect(),
        },
    })
}
