use thiserror::Error;

use crate::RouterId;

/// Failure taxonomy for the explorer core.
///
/// `SourceUnavailable` is recoverable: the previously published snapshot
/// stays authoritative and the fetch is retried on the next query-triggered
/// refresh. `ForestInconsistency` is an internal invariant violation and
/// aborts the offending request only.
#[derive(Debug, Error)]
pub enum Error {
    #[error("link-state source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("couldn't find router with ID: {0}")]
    UnknownRouter(RouterId),

    #[error("invalid outage scenario: {0}")]
    InvalidScenario(String),

    #[error("invalid address for network number conversion: {0}")]
    InvalidAddress(String),

    #[error("egress forest inconsistency: {0}")]
    ForestInconsistency(String),
}

pub type Result<T> = std::result::Result<T, Error>;
