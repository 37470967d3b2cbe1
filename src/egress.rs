//! Egress routing engine.
//!
//! The egress forest assigns every router its single cheapest next hop
//! toward an internet exit. It is computed by adding one virtual exit
//! placeholder per egress router, reversing every edge, and running a
//! multi-source shortest-path search seeded from the full placeholder set at
//! once. Return paths are computed independently over the true (unreversed)
//! graph, so they can diverge from the outbound path under asymmetric costs.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, HashSet};

use serde::Serialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::topology::Topology;
use crate::RouterId;

/// A node in forest computation: either a real router or the virtual exit
/// placeholder owned by one egress router. Placeholders exist only inside
/// the engine's working copies and the forest itself, never in the topology.
///
/// Derived `Ord` (`Router < Exit`, lexicographic inside a variant) doubles as
/// the deterministic tie-break for equidistant egress candidates.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ForestNode {
    Router(RouterId),
    Exit(RouterId),
}

/// One hop of an outbound or return path: the router reached and the cost of
/// the hop that reached it (`None` for the path origin). Serializes as a
/// two-element array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathStep(pub RouterId, pub Option<u32>);

/// An outbound exit path with the trailing placeholder stripped: the ordered
/// router sequence and the final hop's cost out of the mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPath {
    pub steps: Vec<PathStep>,
    pub exit_cost: u32,
}

impl OutboundPath {
    /// The egress router this path leaves the mesh through.
    pub fn exit_router(&self) -> &RouterId {
        // steps is never empty: the origin router is always present.
        &self.steps[self.steps.len() - 1].0
    }
}

/// Return paths keyed by destination router; `None` when the router has no
/// path from any egress.
pub type ReturnPaths = BTreeMap<RouterId, Option<Vec<PathStep>>>;

struct HeapEntry<N> {
    cost: u64,
    node: N,
}

impl<N: Ord> PartialEq for HeapEntry<N> {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost && self.node == other.node
    }
}

impl<N: Ord> Eq for HeapEntry<N> {}

impl<N: Ord> Ord for HeapEntry<N> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for a min-heap; ties settle by node identity so
        // equal-cost candidates pop in a repeatable order.
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl<N: Ord> PartialOrd for HeapEntry<N> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The tree-per-exit next-hop structure: `child -> (parent, hop cost)` where
/// the hop cost is the minimum among parallel links. Egress routers parent to
/// their own exit placeholder at the direct exit cost; placeholders are
/// roots and have no parent.
#[derive(Debug, Clone)]
pub struct EgressForest {
    parent: BTreeMap<ForestNode, (ForestNode, u32)>,
    children: BTreeMap<ForestNode, Vec<RouterId>>,
}

impl EgressForest {
    fn new(parent: BTreeMap<ForestNode, (ForestNode, u32)>) -> Self {
        let mut children: BTreeMap<ForestNode, Vec<RouterId>> = BTreeMap::new();
        for (child, (up, _)) in &parent {
            if let ForestNode::Router(id) = child {
                children.entry(up.clone()).or_default().push(id.clone());
            }
        }
        Self { parent, children }
    }

    /// Whether the router has a path to some egress.
    pub fn contains(&self, router: &str) -> bool {
        self.parent
            .contains_key(&ForestNode::Router(router.to_string()))
    }

    /// Whether `from -> to` is a forest edge.
    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.parent
            .get(&ForestNode::Router(from.to_string()))
            .is_some_and(|(up, _)| matches!(up, ForestNode::Router(id) if id == to))
    }

    /// Every router whose forest path toward its exit passes through `node`.
    pub fn upstream_of(&self, node: &ForestNode) -> BTreeSet<RouterId> {
        let mut upstream = BTreeSet::new();
        let mut stack = vec![node.clone()];
        while let Some(current) = stack.pop() {
            for child in self.children.get(&current).into_iter().flatten() {
                if upstream.insert(child.clone()) {
                    stack.push(ForestNode::Router(child.clone()));
                }
            }
        }
        upstream
    }

    /// Walks the forest from `router` to its root placeholder. `Ok(None)`
    /// when the router has no forest membership. The walk is iterative with
    /// a visited guard: a revisit means the forest invariant broke, which is
    /// a bug signal, not user input.
    pub fn exit_path(&self, router: &str) -> Result<Option<Vec<(ForestNode, Option<u32>)>>> {
        let start = ForestNode::Router(router.to_string());
        if !self.parent.contains_key(&start) {
            return Ok(None);
        }

        let mut path = vec![(start.clone(), None)];
        let mut seen = HashSet::from([start.clone()]);
        let mut current = start;
        while let Some((up, cost)) = self.parent.get(&current) {
            if !seen.insert(up.clone()) {
                return Err(Error::ForestInconsistency(format!(
                    "cycle through {up:?} while walking the exit path of {router}"
                )));
            }
            path.push((up.clone(), Some(*cost)));
            current = up.clone();
        }
        Ok(Some(path))
    }

    /// The externally visible outbound path: router steps only, with the
    /// placeholder hop folded into `exit_cost`.
    pub fn outbound_path(&self, router: &str) -> Result<Option<OutboundPath>> {
        let Some(path) = self.exit_path(router)? else {
            return Ok(None);
        };

        let Some((ForestNode::Exit(_), Some(exit_cost))) = path.last().cloned() else {
            return Err(Error::ForestInconsistency(format!(
                "exit path of {router} does not terminate at an exit placeholder"
            )));
        };

        let steps = path
            .into_iter()
            .filter_map(|(node, cost)| match node {
                ForestNode::Router(id) => Some(PathStep(id, cost)),
                ForestNode::Exit(_) => None,
            })
            .collect();

        Ok(Some(OutboundPath { steps, exit_cost }))
    }
}

/// Reversed-graph adjacency of the working copy: the true edges flipped,
/// plus the bidirectional placeholder link of every egress router.
fn reversed_neighbors(topo: &Topology, node: &ForestNode) -> Vec<(ForestNode, u32)> {
    match node {
        ForestNode::Router(id) => {
            let mut neighbors: Vec<(ForestNode, u32)> = topo
                .incoming(id)
                .map(|e| (ForestNode::Router(e.from.clone()), e.cost))
                .collect();
            if let Some(meta) = topo.node(id) {
                if let Some(cost) = meta.exit_cost {
                    neighbors.push((ForestNode::Exit(id.clone()), cost));
                }
            }
            neighbors
        }
        ForestNode::Exit(owner) => {
            let cost = topo
                .node(owner)
                .and_then(|meta| meta.exit_cost)
                .unwrap_or_default();
            vec![(ForestNode::Router(owner.clone()), cost)]
        }
    }
}

/// Multi-source shortest paths seeded from every exit placeholder at once,
/// over the reversed working copy. Un-reversed, each router's predecessor is
/// its first hop toward its nearest egress.
pub fn compute_egress_forest(topo: &Topology) -> EgressForest {
    let mut dist: HashMap<ForestNode, u64> = HashMap::new();
    let mut pred: HashMap<ForestNode, ForestNode> = HashMap::new();
    let mut heap: BinaryHeap<HeapEntry<ForestNode>> = BinaryHeap::new();

    for (id, meta) in topo.nodes() {
        if meta.exit_cost.is_some() {
            let placeholder = ForestNode::Exit(id.clone());
            dist.insert(placeholder.clone(), 0);
            heap.push(HeapEntry {
                cost: 0,
                node: placeholder,
            });
        }
    }

    while let Some(HeapEntry { cost, node }) = heap.pop() {
        if cost > *dist.get(&node).unwrap_or(&u64::MAX) {
            continue;
        }
        for (neighbor, hop) in reversed_neighbors(topo, &node) {
            let candidate = cost + u64::from(hop);
            if candidate < *dist.get(&neighbor).unwrap_or(&u64::MAX) {
                dist.insert(neighbor.clone(), candidate);
                pred.insert(neighbor.clone(), node.clone());
                heap.push(HeapEntry {
                    cost: candidate,
                    node: neighbor,
                });
            }
        }
    }

    let mut parent = BTreeMap::new();
    for (node, up) in &pred {
        let hop_cost = match (node, up) {
            // Min over parallel links of the original (un-reversed) edge.
            (ForestNode::Router(from), ForestNode::Router(to)) => topo.min_cost(from, to),
            (ForestNode::Router(owner), ForestNode::Exit(_)) => {
                topo.node(owner).and_then(|meta| meta.exit_cost)
            }
            // Placeholders are seeds; they never gain a predecessor.
            (ForestNode::Exit(_), _) => None,
        };
        if let Some(hop_cost) = hop_cost {
            parent.insert(node.clone(), (up.clone(), hop_cost));
        }
    }

    EgressForest::new(parent)
}

/// Single-source shortest paths over the true graph; returns the
/// predecessor map for path reconstruction.
fn shortest_path_preds(topo: &Topology, source: &RouterId) -> HashMap<RouterId, RouterId> {
    let mut dist: HashMap<RouterId, u64> = HashMap::from([(source.clone(), 0)]);
    let mut pred: HashMap<RouterId, RouterId> = HashMap::new();
    let mut heap: BinaryHeap<HeapEntry<RouterId>> = BinaryHeap::new();
    heap.push(HeapEntry {
        cost: 0,
        node: source.clone(),
    });

    while let Some(HeapEntry { cost, node }) = heap.pop() {
        if cost > *dist.get(&node).unwrap_or(&u64::MAX) {
            continue;
        }
        for edge in topo.out(&node) {
            let candidate = cost + u64::from(edge.cost);
            if candidate < *dist.get(&edge.to).unwrap_or(&u64::MAX) {
                dist.insert(edge.to.clone(), candidate);
                pred.insert(edge.to.clone(), node.clone());
                heap.push(HeapEntry {
                    cost: candidate,
                    node: edge.to.clone(),
                });
            }
        }
    }

    pred
}

fn reconstruct(
    preds: &HashMap<RouterId, RouterId>,
    source: &RouterId,
    target: &RouterId,
) -> Option<Vec<RouterId>> {
    let mut sequence = vec![target.clone()];
    let mut seen: HashSet<&RouterId> = HashSet::from([target]);
    let mut current = target;
    while current != source {
        let up = preds.get(current)?;
        if !seen.insert(up) {
            return None;
        }
        sequence.push(up.clone());
        current = up;
    }
    sequence.reverse();
    Some(sequence)
}

/// For every router, the path traffic takes back from its assigned egress,
/// annotated with the minimum parallel-link cost per hop (origin hop `None`).
pub fn compute_return_paths(topo: &Topology, forest: &EgressForest) -> Result<ReturnPaths> {
    let preds_by_exit: HashMap<&RouterId, HashMap<RouterId, RouterId>> = topo
        .nodes()
        .filter(|(_, meta)| meta.is_egress)
        .map(|(id, _)| (id, shortest_path_preds(topo, id)))
        .collect();

    let mut return_paths = ReturnPaths::new();
    for id in topo.router_ids() {
        let Some(outbound) = forest.outbound_path(id)? else {
            return_paths.insert(id.clone(), None);
            continue;
        };
        let exit_router = outbound.exit_router().clone();

        let sequence = preds_by_exit
            .get(&exit_router)
            .and_then(|preds| reconstruct(preds, &exit_router, id));
        let Some(sequence) = sequence else {
            // Possible in a strongly asymmetric graph: the router reaches
            // its egress but the egress cannot reach it back.
            warn!(router = %id, exit = %exit_router, "no return path from assigned egress");
            return_paths.insert(id.clone(), None);
            continue;
        };

        let mut steps = vec![PathStep(sequence[0].clone(), None)];
        for pair in sequence.windows(2) {
            steps.push(PathStep(pair[1].clone(), topo.min_cost(&pair[0], &pair[1])));
        }
        return_paths.insert(id.clone(), Some(steps));
    }

    Ok(return_paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::LinkDb;
    use serde_json::json;

    fn topo(value: serde_json::Value) -> Topology {
        let db: LinkDb = serde_json::from_value(value).unwrap();
        Topology::from_snapshot(&db).unwrap()
    }

    /// A - B - C - D in a line; only A advertises a default route (cost 10).
    fn linear_topo() -> Topology {
        topo(json!({
            "updated": 0,
            "areas": {"0.0.0.0": {
                "routers": {
                    "10.69.0.1": {"links": {
                        "router": [{"id": "10.69.0.2", "metric": 10}],
                        "external": [{"id": "0.0.0.0/0", "metric": 10}]
                    }},
                    "10.69.0.2": {"links": {"router": [
                        {"id": "10.69.0.1", "metric": 10},
                        {"id": "10.69.0.3", "metric": 10}
                    ]}},
                    "10.69.0.3": {"links": {"router": [
                        {"id": "10.69.0.2", "metric": 10},
                        {"id": "10.69.0.4", "metric": 10}
                    ]}},
                    "10.69.0.4": {"links": {"router": [{"id": "10.69.0.3", "metric": 10}]}}
                },
                "networks": {}
            }}
        }))
    }

    #[test]
    fn linear_topology_routes_through_single_exit() {
        let topo = linear_topo();
        let forest = compute_egress_forest(&topo);

        for (router, expected_len) in [
            ("10.69.0.1", 1),
            ("10.69.0.2", 2),
            ("10.69.0.3", 3),
            ("10.69.0.4", 4),
        ] {
            let outbound = forest.outbound_path(router).unwrap().unwrap();
            assert_eq!(outbound.steps.len(), expected_len);
            assert_eq!(outbound.exit_router(), "10.69.0.1");
            assert_eq!(outbound.exit_cost, 10);
        }

        let own = forest.outbound_path("10.69.0.1").unwrap().unwrap();
        assert_eq!(own.steps, vec![PathStep("10.69.0.1".into(), None)]);
    }

    #[test]
    fn forest_has_out_degree_at_most_one_and_terminates() {
        let topo = linear_topo();
        let forest = compute_egress_forest(&topo);

        for id in topo.router_ids() {
            // Walk terminates (no ForestInconsistency) and ends at the
            // egress router, which advertises a direct default route.
            let outbound = forest.outbound_path(id).unwrap().unwrap();
            let exit = outbound.exit_router();
            assert!(topo.node(exit).unwrap().is_egress);
            // The exit's own forest hop is straight to its placeholder.
            assert!(!forest.has_edge(exit, id));
        }
    }

    #[test]
    fn parallel_links_use_minimum_cost_hop() {
        let topo = topo(json!({
            "updated": 0,
            "areas": {"0.0.0.0": {
                "routers": {
                    "10.69.0.1": {"links": {
                        "router": [
                            {"id": "10.69.0.2", "metric": 40},
                            {"id": "10.69.0.2", "metric": 15}
                        ]
                    }},
                    "10.69.0.2": {"links": {
                        "router": [
                            {"id": "10.69.0.1", "metric": 40},
                            {"id": "10.69.0.1", "metric": 15}
                        ],
                        "external": [{"id": "0.0.0.0/0", "metric": 1}]
                    }}
                },
                "networks": {}
            }}
        }));
        let forest = compute_egress_forest(&topo);

        let outbound = forest.outbound_path("10.69.0.1").unwrap().unwrap();
        assert_eq!(
            outbound.steps,
            vec![
                PathStep("10.69.0.1".into(), None),
                PathStep("10.69.0.2".into(), Some(15)),
            ]
        );
    }

    #[test]
    fn two_exits_split_the_forest() {
        // R1 (exit, cost 1) - R2 - R3 -[50]- R4 - R5, R4 - R6 (exit, cost 1).
        let topo = topo(json!({
            "updated": 0,
            "areas": {"0.0.0.0": {
                "routers": {
                    "10.69.0.1": {"links": {
                        "router": [{"id": "10.69.0.2", "metric": 5}],
                        "external": [{"id": "0.0.0.0/0", "metric": 1}]
                    }},
                    "10.69.0.2": {"links": {"router": [
                        {"id": "10.69.0.1", "metric": 5},
                        {"id": "10.69.0.3", "metric": 5}
                    ]}},
                    "10.69.0.3": {"links": {"router": [
                        {"id": "10.69.0.2", "metric": 5},
                        {"id": "10.69.0.4", "metric": 50}
                    ]}},
                    "10.69.0.4": {"links": {"router": [
                        {"id": "10.69.0.3", "metric": 50},
                        {"id": "10.69.0.5", "metric": 5},
                        {"id": "10.69.0.6", "metric": 5}
                    ]}},
                    "10.69.0.5": {"links": {"router": [{"id": "10.69.0.4", "metric": 5}]}},
                    "10.69.0.6": {"links": {
                        "router": [{"id": "10.69.0.4", "metric": 5}],
                        "external": [{"id": "0.0.0.0/0", "metric": 1}]
                    }}
                },
                "networks": {}
            }}
        }));
        let forest = compute_egress_forest(&topo);

        let exit_of = |router: &str| {
            forest
                .outbound_path(router)
                .unwrap()
                .unwrap()
                .exit_router()
                .clone()
        };
        assert_eq!(exit_of("10.69.0.2"), "10.69.0.1");
        assert_eq!(exit_of("10.69.0.3"), "10.69.0.1");
        assert_eq!(exit_of("10.69.0.4"), "10.69.0.6");
        assert_eq!(exit_of("10.69.0.5"), "10.69.0.6");

        assert_eq!(
            forest.upstream_of(&ForestNode::Router("10.69.0.2".into())),
            BTreeSet::from(["10.69.0.3".to_string()])
        );
        assert_eq!(
            forest.upstream_of(&ForestNode::Router("10.69.0.4".into())),
            BTreeSet::from(["10.69.0.5".to_string()])
        );
        assert!(forest
            .upstream_of(&ForestNode::Router("10.69.0.5".into()))
            .is_empty());
    }

    #[test]
    fn return_paths_are_computed_independently_of_outbound() {
        // Asymmetric triangle: C reaches the exit E through A, but E returns
        // to C over the direct link.
        //   C->A 10, A->C 100, A->E 10, E->A 10, C->E 100, E->C 10.
        let topo = topo(json!({
            "updated": 0,
            "areas": {"0.0.0.0": {
                "routers": {
                    "10.69.0.12": {"links": {"router": [
                        {"id": "10.69.0.10", "metric": 100},
                        {"id": "10.69.0.11", "metric": 10}
                    ]}},
                    "10.69.0.10": {"links": {"router": [
                        {"id": "10.69.0.12", "metric": 10},
                        {"id": "10.69.0.11", "metric": 100}
                    ]}},
                    "10.69.0.11": {"links": {
                        "router": [
                            {"id": "10.69.0.10", "metric": 10},
                            {"id": "10.69.0.12", "metric": 10}
                        ],
                        "external": [{"id": "0.0.0.0/0", "metric": 1}]
                    }}
                },
                "networks": {}
            }}
        }));
        // C = .10, A = .12, E = .11
        let forest = compute_egress_forest(&topo);
        let return_paths = compute_return_paths(&topo, &forest).unwrap();

        let outbound = forest.outbound_path("10.69.0.10").unwrap().unwrap();
        assert_eq!(
            outbound.steps,
            vec![
                PathStep("10.69.0.10".into(), None),
                PathStep("10.69.0.12".into(), Some(10)),
                PathStep("10.69.0.11".into(), Some(10)),
            ]
        );

        let back = return_paths["10.69.0.10"].clone().unwrap();
        assert_eq!(
            back,
            vec![
                PathStep("10.69.0.11".into(), None),
                PathStep("10.69.0.10".into(), Some(10)),
            ]
        );
    }

    #[test]
    fn routers_without_reachable_exit_are_outside_the_forest() {
        let topo = topo(json!({
            "updated": 0,
            "areas": {"0.0.0.0": {
                "routers": {
                    "10.69.0.1": {"links": {"router": [{"id": "10.69.0.2", "metric": 10}]}},
                    "10.69.0.2": {"links": {"router": [{"id": "10.69.0.1", "metric": 10}]}}
                },
                "networks": {}
            }}
        }));
        let forest = compute_egress_forest(&topo);
        assert!(!forest.contains("10.69.0.1"));
        assert!(forest.outbound_path("10.69.0.1").unwrap().is_none());

        let return_paths = compute_return_paths(&topo, &forest).unwrap();
        assert_eq!(return_paths["10.69.0.1"], None);
    }
}
