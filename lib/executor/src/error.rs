/// Failure of a single subgraph fetch, classified for retry handling.
/// GraphQL errors carried inside a well-formed response are not fetch
/// errors; they flow through [`crate::response::ExecutionResult::errors`].
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Network-level failures and 5xx responses. Worth one retry.
    #[error("transient failure from subgraph \"{subgraph}\": {message}")]
    Transient { subgraph: String, message: String },
    /// The subgraph answered decisively with something unusable, such as a
    /// 4xx status or a malformed body. Never retried.
    #[error("subgraph \"{subgraph}\" returned an unusable response: {message}")]
    Application { subgraph: String, message: String },
}

impl FetchError {
    pub fn subgraph(&self) -> &str {
        match self {
            FetchError::Transient { subgraph, .. } => subgraph,
            FetchError::Application { subgraph, .. } => subgraph,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }
}

/// Anomaly observed while stitching subgraph results into one response tree.
/// A conflict never fails the request: the first-resolved value is kept and
/// the anomaly is logged.
#[derive(Debug, thiserror::Error)]
pub enum StitchError {
    #[error("conflicting values for one field: kept {kept}, discarded {discarded}")]
    Conflict {
        kept: serde_json::Value,
        discarded: serde_json::Value,
    },
}
