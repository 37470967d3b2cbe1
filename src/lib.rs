pub mod egress;
pub mod error;
pub mod nn;
pub mod outage;
pub mod source;
pub mod state;
pub mod topology;
pub mod view;

/// OSPF router identifier: the router's address in dotted-quad form.
pub type RouterId = String;

pub use error::{Error, Result};
pub use source::{FileSource, FixedSource, HttpSource, LinkDb, SnapshotSource};
pub use state::{Explorer, GraphSnapshot};
