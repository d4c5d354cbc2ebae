use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TrafficShapingConfig {
    /// Timeout for a single sub-query dispatch to a subgraph. A timed-out
    /// fetch counts as a transient failure and is retried at most once.
    #[serde(default = "subgraph_timeout_default", with = "humantime_serde")]
    pub subgraph_timeout: Duration,

    /// Overall deadline for an inbound request. When it elapses, all in-flight
    /// sub-queries of that request are cancelled and no partial response is sent.
    #[serde(default = "request_timeout_default", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Enables/disables the single retry on transient transport failures
    /// (connection reset, timeout, non-2xx). Application-level errors are
    /// never retried.
    #[serde(default = "retry_enabled_default")]
    pub retry_on_transient_errors: bool,
}

impl Default for TrafficShapingConfig {
    fn default() -> Self {
        Self {
            subgraph_timeout: subgraph_timeout_default(),
            request_timeout: request_timeout_default(),
            retry_on_transient_errors: retry_enabled_default(),
        }
    }
}

fn subgraph_timeout_default() -> Duration {
    Duration::from_secs(10)
}

fn request_timeout_default() -> Duration {
    Duration::from_secs(30)
}

fn retry_enabled_default() -> bool {
    true
}
