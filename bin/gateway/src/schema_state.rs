use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::{ArcSwap, Guard};
use lattice_composer::{compose, ComposedSchema, SubgraphSchema};
use lattice_executor::SubgraphExecutorMap;
use lattice_gateway_config::query_planner::OwnershipPolicy as ConfiguredOwnershipPolicy;
use lattice_gateway_config::subgraphs::SubgraphServiceConfig;
use lattice_gateway_config::GatewayConfig;
use lattice_query_planner::{OwnershipPolicy, Planner, QueryPlan};
use moka::future::Cache;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_64;

/// Everything derived from one successful composition. Swapped atomically as
/// a unit so a request never sees a planner and executor map from different
/// schema versions.
pub struct GatewayRuntime {
    pub schema: Arc<ComposedSchema>,
    pub planner: Planner,
    pub executors: SubgraphExecutorMap,
}

pub struct SchemaState {
    current: ArcSwap<Option<GatewayRuntime>>,
    pub plan_cache: Cache<u64, Arc<QueryPlan>>,
    services: Vec<SubgraphServiceConfig>,
    policy: OwnershipPolicy,
    client: reqwest::Client,
    subgraph_timeout: Duration,
    last_schema_hash: AtomicU64,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to fetch schema of subgraph \"{subgraph}\": {message}")]
    FetchFailed { subgraph: String, message: String },
    #[error("subgraph \"{subgraph}\" did not return a federation SDL")]
    MissingSdl { subgraph: String },
}

#[derive(Deserialize)]
struct SdlResponse {
    data: Option<SdlResponseData>,
}

#[derive(Deserialize)]
struct SdlResponseData {
    #[serde(rename = "_service")]
    service: Option<SdlService>,
}

#[derive(Deserialize)]
struct SdlService {
    sdl: Option<String>,
}

impl SchemaState {
    pub fn new(config: &GatewayConfig, client: reqwest::Client) -> SchemaState {
        SchemaState {
            current: ArcSwap::from_pointee(None),
            plan_cache: Cache::new(config.query_planner.plan_cache_size),
            services: config.subgraphs.services.clone(),
            policy: match config.query_planner.ownership_policy {
                ConfiguredOwnershipPolicy::KeyLocality => OwnershipPolicy::KeyLocality,
                ConfiguredOwnershipPolicy::DeclarationOrder => OwnershipPolicy::DeclarationOrder,
            },
            client,
            subgraph_timeout: config.traffic_shaping.subgraph_timeout,
            last_schema_hash: AtomicU64::new(0),
        }
    }

    pub fn current(&self) -> Guard<Arc<Option<GatewayRuntime>>> {
        self.current.load()
    }

    pub fn is_ready(&self) -> bool {
        self.current().is_some()
    }

    /// Polls every subgraph for its SDL and swaps in a freshly composed
    /// runtime when anything changed. A failed fetch or a composition error
    /// leaves the current runtime serving; the gateway never downgrades to a
    /// broken schema.
    pub async fn refresh(&self) {
        let fetches = self.services.iter().map(|service| async {
            let sdl = fetch_subgraph_sdl(&self.client, service, self.subgraph_timeout).await?;
            Ok::<(String, String, String), IngestError>((
                service.name.clone(),
                service.url.to_string(),
                sdl,
            ))
        });

        let fetched = match futures::future::try_join_all(fetches).await {
            Ok(fetched) => fetched,
            Err(err) => {
                warn!(error = %err, "schema poll failed, keeping the current supergraph");
                return;
            }
        };

        self.apply_subgraph_sdls(fetched);
    }

    /// Composes the fetched SDLs and swaps the runtime in. Any parse or
    /// composition failure is logged and the previous runtime stays active.
    fn apply_subgraph_sdls(&self, fetched: Vec<(String, String, String)>) {
        let schema_hash = hash_subgraph_sdls(&fetched);
        if self.is_ready() && self.last_schema_hash.load(Ordering::Acquire) == schema_hash {
            debug!("subgraph schemas unchanged");
            return;
        }

        let mut subgraph_schemas = Vec::with_capacity(fetched.len());
        for (name, url, sdl) in &fetched {
            match SubgraphSchema::parse(name.as_str(), url.as_str(), sdl) {
                Ok(subgraph_schema) => subgraph_schemas.push(subgraph_schema),
                Err(err) => {
                    warn!(error = %err, "rejecting schema update, keeping the current supergraph");
                    return;
                }
            }
        }

        let schema = match compose(&subgraph_schemas) {
            Ok(schema) => Arc::new(schema),
            Err(err) => {
                warn!(error = %err, "composition failed, keeping the current supergraph");
                return;
            }
        };

        let executors = match SubgraphExecutorMap::from_http_endpoints(
            schema.subgraph_endpoint_map.iter(),
            self.client.clone(),
            self.subgraph_timeout,
        ) {
            Ok(executors) => executors,
            Err(err) => {
                warn!(error = %err, "invalid subgraph endpoint, keeping the current supergraph");
                return;
            }
        };

        let planner = Planner::new(schema.clone(), self.policy);
        self.current.store(Arc::new(Some(GatewayRuntime {
            schema,
            planner,
            executors,
        })));
        self.last_schema_hash.store(schema_hash, Ordering::Release);
        self.plan_cache.invalidate_all();
        info!(
            subgraphs = self.services.len(),
            "composed supergraph updated, plan cache cleared"
        );
    }

    pub fn spawn_poller(
        self: &Arc<Self>,
        poll_interval: Duration,
        shutdown: CancellationToken,
    ) {
        let state = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = shutdown.cancelled() => break,
                }
                state.refresh().await;
            }
        });
    }
}

async fn fetch_subgraph_sdl(
    client: &reqwest::Client,
    service: &SubgraphServiceConfig,
    timeout: Duration,
) -> Result<String, IngestError> {
    let response = client
        .post(service.url.clone())
        .timeout(timeout)
        .json(&json!({"query": "{ _service { sdl } }"}))
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|err| IngestError::FetchFailed {
            subgraph: service.name.clone(),
            message: err.to_string(),
        })?;

    let body: SdlResponse = response.json().await.map_err(|err| IngestError::FetchFailed {
        subgraph: service.name.clone(),
        message: err.to_string(),
    })?;

    body.data
        .and_then(|data| data.service)
        .and_then(|service| service.sdl)
        .ok_or_else(|| IngestError::MissingSdl {
            subgraph: service.name.clone(),
        })
}

fn hash_subgraph_sdls(fetched: &[(String, String, String)]) -> u64 {
    let mut buffer = String::new();
    for (name, url, sdl) in fetched {
        buffer.push_str(name);
        buffer.push('\0');
        buffer.push_str(url);
        buffer.push('\0');
        buffer.push_str(sdl);
        buffer.push('\0');
    }
    xxh3_64(buffer.as_bytes())
}
