//! Process-wide snapshot handle and the typed query surface.
//!
//! One consistent `GraphSnapshot` is visible to all concurrent readers.
//! Refreshes are triggered by incoming queries past a staleness threshold,
//! build a brand-new snapshot off to the side, and publish it in a single
//! swap; a published snapshot is never mutated in place.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::egress::{compute_egress_forest, compute_return_paths, EgressForest, ReturnPaths};
use crate::error::{Error, Result};
use crate::outage::{self, OutageLists, OutageScenario};
use crate::source::{LinkDb, SnapshotSource};
use crate::topology::Topology;
use crate::view::{self, EdgeView, GraphView, NodeView, Projection};

/// One immutable, fully built snapshot: graph, egress forest, return paths
/// and the upstream update stamp. Queries are pure functions of this.
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    pub topology: Topology,
    pub forest: EgressForest,
    pub return_paths: ReturnPaths,
    pub updated: DateTime<Utc>,
}

impl GraphSnapshot {
    pub fn build(db: &LinkDb) -> Result<Self> {
        let updated = DateTime::from_timestamp(db.updated, 0).ok_or_else(|| {
            Error::SourceUnavailable(format!("bad update timestamp: {}", db.updated))
        })?;

        let topology = Topology::from_snapshot(db)?;
        let forest = compute_egress_forest(&topology);
        let return_paths = compute_return_paths(&topology, &forest)?;

        Ok(Self {
            topology,
            forest,
            return_paths,
            updated,
        })
    }

    pub fn contains_router(&self, router: &str) -> bool {
        self.topology.contains(router)
    }

    /// Neighborhood view around `router`: everything within `depth` hops,
    /// optionally widened with the router's outbound and return path nodes.
    pub fn neighbors(&self, router: &str, depth: usize, include_egress: bool) -> Result<GraphView> {
        if !self.topology.contains(router) {
            return Err(Error::UnknownRouter(router.to_string()));
        }

        let neighbor_set = view::neighbor_set(&self.topology, router, depth);
        let mut members = neighbor_set.clone();
        if include_egress {
            if let Some(outbound) = self.forest.outbound_path(router)? {
                members.extend(outbound.steps.into_iter().map(|step| step.0));
            }
            if let Some(Some(steps)) = self.return_paths.get(router) {
                members.extend(steps.iter().map(|step| step.0.clone()));
            }
        }

        view::project(
            &self.topology,
            &members,
            &self.forest,
            &self.return_paths,
            &Projection {
                neighbor_set: Some(&neighbor_set),
                include_networks: true,
            },
        )
    }

    pub fn simulate_outage(&self, scenario: &OutageScenario) -> Result<outage::OutageReport> {
        outage::simulate(&self.topology, &self.forest, &self.return_paths, scenario)
    }

    /// Every parallel link `from -> to`. Distinct failures: unknown router,
    /// self loop, and no connecting link.
    pub fn edges_between(&self, from: &str, to: &str) -> Result<Vec<EdgeView>> {
        for router in [from, to] {
            if !self.topology.contains(router) {
                return Err(Error::UnknownRouter(router.to_string()));
            }
        }
        if from == to {
            return Err(Error::InvalidScenario(
                "self loops don't exist".into(),
            ));
        }

        let edges: Vec<EdgeView> = self
            .topology
            .edges_between(from, to)
            .into_iter()
            .map(EdgeView::from)
            .collect();
        if edges.is_empty() {
            return Err(Error::InvalidScenario(format!(
                "no link connecting routers {from} and {to}"
            )));
        }
        Ok(edges)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NeighborsResponse {
    pub nodes: Vec<NodeView>,
    pub edges: Vec<EdgeView>,
    pub updated: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutageResponse {
    pub nodes: Vec<NodeView>,
    pub edges: Vec<EdgeView>,
    pub outage_lists: OutageLists,
    pub updated: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgesResponse {
    pub edges: Vec<EdgeView>,
    pub updated: i64,
}

/// Owns the live snapshot and its refresh policy. Queries run against the
/// published snapshot; a failed refresh logs and keeps serving the stale but
/// consistent snapshot, which is declared behavior rather than an error.
pub struct Explorer<S> {
    source: S,
    max_age: Duration,
    current: RwLock<Arc<GraphSnapshot>>,
    refresh_gate: Mutex<()>,
}

impl<S: SnapshotSource> Explorer<S> {
    /// Fetches and builds the initial snapshot. Unlike later refreshes,
    /// there is nothing stale to fall back to, so failure is fatal here.
    pub async fn load(source: S, max_age: Duration) -> Result<Self> {
        let db = source.fetch().await?;
        let snapshot = GraphSnapshot::build(&db)?;
        Ok(Self::with_snapshot(source, max_age, snapshot))
    }

    pub fn with_snapshot(source: S, max_age: Duration, snapshot: GraphSnapshot) -> Self {
        Self {
            source,
            max_age,
            current: RwLock::new(Arc::new(snapshot)),
            refresh_gate: Mutex::new(()),
        }
    }

    /// The currently published snapshot.
    pub async fn snapshot(&self) -> Arc<GraphSnapshot> {
        self.current.read().await.clone()
    }

    /// Rebuilds the snapshot when it is older than `max_age`. Concurrent
    /// triggers coalesce on the gate: whoever holds it re-checks staleness
    /// first, so followers of an in-flight rebuild observe the fresh
    /// snapshot instead of fetching again. Returns whether a rebuild ran.
    pub async fn refresh_if_stale(&self) -> Result<bool> {
        if Utc::now() - self.snapshot().await.updated < self.max_age {
            return Ok(false);
        }

        let _gate = self.refresh_gate.lock().await;
        if Utc::now() - self.snapshot().await.updated < self.max_age {
            return Ok(false);
        }

        let db = self.source.fetch().await?;
        let fresh = Arc::new(GraphSnapshot::build(&db)?);
        let node_count = fresh.topology.node_count();
        *self.current.write().await = fresh;
        info!(nodes = node_count, "published refreshed topology snapshot");
        Ok(true)
    }

    /// Refresh if due, then serve whichever snapshot is published. A failed
    /// refresh is logged once and the stale snapshot serves the query.
    async fn query_snapshot(&self) -> Arc<GraphSnapshot> {
        if let Err(e) = self.refresh_if_stale().await {
            warn!("refresh failed, serving stale snapshot: {e}");
        }
        self.snapshot().await
    }

    pub async fn neighbors(
        &self,
        router: &str,
        depth: usize,
        include_egress: bool,
    ) -> Result<NeighborsResponse> {
        let snapshot = self.query_snapshot().await;
        let view = snapshot.neighbors(router, depth, include_egress)?;
        Ok(NeighborsResponse {
            nodes: view.nodes,
            edges: view.edges,
            updated: snapshot.updated.timestamp(),
        })
    }

    pub async fn simulate_outage(&self, scenario: &OutageScenario) -> Result<OutageResponse> {
        let snapshot = self.query_snapshot().await;
        let report = snapshot.simulate_outage(scenario)?;
        Ok(OutageResponse {
            nodes: report.nodes,
            edges: report.edges,
            outage_lists: report.outage_lists,
            updated: snapshot.updated.timestamp(),
        })
    }

    pub async fn edges_between(&self, from: &str, to: &str) -> Result<EdgesResponse> {
        let snapshot = self.query_snapshot().await;
        Ok(EdgesResponse {
            edges: snapshot.edges_between(from, to)?,
            updated: snapshot.updated.timestamp(),
        })
    }
}
