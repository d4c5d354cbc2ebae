use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SubgraphsConfig {
    /// The list of subgraph services composing the federated graph.
    #[serde(default)]
    pub services: Vec<SubgraphServiceConfig>,

    /// How often each subgraph's schema endpoint is polled for changes.
    /// A changed schema triggers an atomic re-composition; an unchanged
    /// schema is a no-op.
    #[serde(default = "poll_interval_default", with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for SubgraphsConfig {
    fn default() -> Self {
        Self {
            services: Vec::new(),
            poll_interval: poll_interval_default(),
        }
    }
}

fn poll_interval_default() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SubgraphServiceConfig {
    /// Unique name of the subgraph. Used in query plans and error paths.
    pub name: String,

    /// GraphQL-over-HTTP endpoint of the subgraph. The same endpoint is used
    /// for schema ingestion (`{ _service { sdl } }`) and for sub-query execution.
    pub url: Url,
}
