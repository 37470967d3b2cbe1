//! Snapshot wire model and the pull-based source seam.
//!
//! The upstream OSPF daemon exports its link database as JSON: a top-level
//! `updated` epoch stamp and per-area maps of router link advertisements and
//! shared-network membership. The explorer consumes area `0.0.0.0` only.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::RouterId;

/// The backbone area; everything the explorer serves lives here.
pub const BACKBONE_AREA: &str = "0.0.0.0";

/// Link advertisement categories, closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Router,
    Network,
    External,
    Stubnet,
}

/// One advertised link. Schema-loose on purpose: type-2 externals carry
/// `metric2` instead of `metric`, and some externals name a `via` gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEntry {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric2: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<String>,
}

impl LinkEntry {
    /// Effective cost: `metric`, falling back to `metric2`.
    pub fn cost(&self) -> Option<u32> {
        self.metric.or(self.metric2)
    }

    /// Whether this entry advertises the default (catch-all) route.
    pub fn is_default_route(&self) -> bool {
        self.id
            .parse::<Ipv4Net>()
            .map(|net| net.addr().is_unspecified() && net.prefix_len() == 0)
            .unwrap_or(false)
    }
}

/// Per-router metadata: category to ordered advertisement list.
pub type LinkMap = BTreeMap<LinkKind, Vec<LinkEntry>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterLsa {
    #[serde(default)]
    pub links: LinkMap,
}

/// A broadcast transit segment: its designated router and member list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkLsa {
    #[serde(default)]
    pub dr: Option<RouterId>,
    #[serde(default)]
    pub routers: Vec<RouterId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Area {
    #[serde(default)]
    pub routers: BTreeMap<RouterId, RouterLsa>,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkLsa>,
}

/// A full link-database snapshot as fetched from the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkDb {
    pub updated: i64,
    #[serde(default)]
    pub areas: BTreeMap<String, Area>,
}

impl LinkDb {
    pub fn backbone(&self) -> Result<&Area> {
        self.areas.get(BACKBONE_AREA).ok_or_else(|| {
            Error::SourceUnavailable(format!("snapshot has no area {BACKBONE_AREA}"))
        })
    }
}

/// Pull-based snapshot source. Fetch failures surface once per call; the
/// caller decides whether to keep serving a prior snapshot.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<LinkDb>;
}

#[async_trait]
impl SnapshotSource for Box<dyn SnapshotSource> {
    async fn fetch(&self) -> Result<LinkDb> {
        (**self).fetch().await
    }
}

/// Fetches the link database over HTTP.
pub struct HttpSource {
    url: String,
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SnapshotSource for HttpSource {
    async fn fetch(&self) -> Result<LinkDb> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::SourceUnavailable(format!("GET {}: {e}", self.url)))?;

        response
            .json::<LinkDb>()
            .await
            .map_err(|e| Error::SourceUnavailable(format!("parsing {}: {e}", self.url)))
    }
}

/// Reads the link database from a JSON file on disk.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SnapshotSource for FileSource {
    async fn fetch(&self) -> Result<LinkDb> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::SourceUnavailable(format!("{}: {e}", self.path.display())))?;

        serde_json::from_str(&raw)
            .map_err(|e| Error::SourceUnavailable(format!("{}: {e}", self.path.display())))
    }
}

/// Serves a fixed, pre-parsed snapshot. Used by tests and offline tooling.
#[derive(Debug, Clone)]
pub struct FixedSource(pub LinkDb);

#[async_trait]
impl SnapshotSource for FixedSource {
    async fn fetch(&self) -> Result<LinkDb> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_categorized_links() {
        let db: LinkDb = serde_json::from_value(json!({
            "updated": 1_700_000_000,
            "areas": {
                "0.0.0.0": {
                    "routers": {
                        "10.69.0.1": {
                            "links": {
                                "router": [{"id": "10.69.0.2", "metric": 10}],
                                "external": [
                                    {"id": "0.0.0.0/0", "metric": 1},
                                    {"id": "10.70.251.60/30", "metric2": 10},
                                    {"id": "199.170.132.64/26", "metric": 20, "via": "10.70.89.131"}
                                ],
                                "stubnet": [{"id": "10.69.4.98/32", "metric": 0}]
                            }
                        }
                    },
                    "networks": {
                        "10.69.8.0/24": {"dr": "10.69.0.1", "routers": ["10.69.0.1", "10.69.0.2"]}
                    }
                }
            }
        }))
        .unwrap();

        let area = db.backbone().unwrap();
        let lsa = &area.routers["10.69.0.1"];
        assert_eq!(lsa.links[&LinkKind::Router].len(), 1);
        assert_eq!(lsa.links[&LinkKind::External].len(), 3);

        let externals = &lsa.links[&LinkKind::External];
        assert!(externals[0].is_default_route());
        assert!(!externals[1].is_default_route());
        assert_eq!(externals[1].cost(), Some(10)); // metric2 fallback
        assert_eq!(externals[2].via.as_deref(), Some("10.70.89.131"));

        assert_eq!(area.networks["10.69.8.0/24"].routers.len(), 2);
    }

    #[test]
    fn missing_backbone_is_source_error() {
        let db: LinkDb =
            serde_json::from_value(json!({"updated": 0, "areas": {}})).unwrap();
        assert!(matches!(db.backbone(), Err(Error::SourceUnavailable(_))));
    }

    #[test]
    fn entry_serialization_omits_absent_fields() {
        let entry = LinkEntry {
            id: "10.69.0.2".into(),
            metric: Some(10),
            metric2: None,
            via: None,
        };
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({"id": "10.69.0.2", "metric": 10})
        );
    }
}
