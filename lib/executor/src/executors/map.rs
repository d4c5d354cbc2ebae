use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;
use url::Url;

use crate::executors::common::SubgraphExecutor;
use crate::executors::http::HttpSubgraphExecutor;

/// The executors for every subgraph in the active schema, keyed by subgraph
/// name. Rebuilt whenever the composed schema changes.
#[derive(Default, Clone)]
pub struct SubgraphExecutorMap {
    inner: FxHashMap<String, Arc<dyn SubgraphExecutor>>,
}

impl SubgraphExecutorMap {
    /// Builds HTTP executors from a subgraph name to endpoint mapping.
    pub fn from_http_endpoints<'a>(
        endpoints: impl IntoIterator<Item = (&'a String, &'a String)>,
        client: reqwest::Client,
        timeout: Duration,
    ) -> Result<Self, url::ParseError> {
        let mut inner: FxHashMap<String, Arc<dyn SubgraphExecutor>> = FxHashMap::default();
        for (name, endpoint) in endpoints {
            let endpoint = endpoint.parse::<Url>()?;
            inner.insert(
                name.clone(),
                Arc::new(HttpSubgraphExecutor::new(
                    name.clone(),
                    endpoint,
                    client.clone(),
                    timeout,
                )),
            );
        }
        Ok(SubgraphExecutorMap { inner })
    }

    pub fn insert_arc(&mut self, name: impl Into<String>, executor: Arc<dyn SubgraphExecutor>) {
        self.inner.insert(name.into(), executor);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SubgraphExecutor>> {
        self.inner.get(name).cloned()
    }

    pub fn subgraph_names(&self) -> impl Iterator<Item = &str> {
        self.inner.keys().map(String::as_str)
    }
}
