#![allow(dead_code)]

use mesh_explorer::{GraphSnapshot, LinkDb};
use serde_json::json;

pub fn snapshot(db: &LinkDb) -> GraphSnapshot {
    GraphSnapshot::build(db).unwrap()
}

/// .1 - .2 - .3 = .4 (parallel 10/100 links); exits at .2 (cost 1) and
/// .4 (cost 10000). Mirrors the daemon's sample four-node database.
pub fn four_node_db() -> LinkDb {
    serde_json::from_value(json!({
        "updated": 1_700_000_000,
        "areas": {"0.0.0.0": {
            "routers": {
                "10.69.0.1": {"links": {
                    "router": [{"id": "10.69.0.2", "metric": 10}]
                }},
                "10.69.0.2": {"links": {
                    "router": [
                        {"id": "10.69.0.1", "metric": 10},
                        {"id": "10.69.0.3", "metric": 100}
                    ],
                    "external": [{"id": "0.0.0.0/0", "metric": 1}]
                }},
                "10.69.0.3": {"links": {
                    "router": [
                        {"id": "10.69.0.2", "metric": 100},
                        {"id": "10.70.0.4", "metric": 10},
                        {"id": "10.70.0.4", "metric": 100}
                    ]
                }},
                "10.70.0.4": {"links": {
                    "router": [
                        {"id": "10.69.0.3", "metric": 10},
                        {"id": "10.69.0.3", "metric": 100}
                    ],
                    "external": [{"id": "0.0.0.0/0", "metric": 10000}]
                }}
            },
            "networks": {}
        }}
    }))
    .unwrap()
}

/// Two egress routers anchoring separate halves of the forest:
///
///   .1* - .2 - .3 -[50]- .4 - .5
///                         |
///                        .6*
///
/// Exits at .1 and .6, both cost 1; every other link costs 5.
pub fn two_exit_db() -> LinkDb {
    serde_json::from_value(json!({
        "updated": 1_700_000_000,
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
    }))
    .unwrap()
}
