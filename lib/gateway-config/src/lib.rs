pub mod http_server;
pub mod log;
pub mod query_planner;
pub mod subgraphs;
pub mod traffic_shaping;

use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::{
    http_server::HttpServerConfig, log::LoggingConfig, query_planner::QueryPlannerConfig,
    subgraphs::SubgraphsConfig, traffic_shaping::TrafficShapingConfig,
};

const DEFAULT_FILE_NAMES: [&str; 2] = ["gateway.config.yaml", "gateway.config.json"];

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// The gateway logger configuration.
    ///
    /// The gateway is configured to be mostly silent (`info`) level, and will print
    /// only important messages, warnings, and errors.
    #[serde(default)]
    pub log: LoggingConfig,

    /// Configuration for the HTTP server/listener.
    #[serde(default)]
    pub http: HttpServerConfig,

    /// The set of federated subgraphs this gateway composes, and how often their
    /// schemas are polled for changes.
    #[serde(default)]
    pub subgraphs: SubgraphsConfig,

    /// Query planning configuration.
    #[serde(default)]
    pub query_planner: QueryPlannerConfig,

    /// Controls how sub-queries are executed against subgraphs (timeouts, retries).
    #[serde(default)]
    pub traffic_shaping: TrafficShapingConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayConfigError {
    #[error("failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),
    #[error("failed to resolve configuration file path: {0}")]
    ConfigPathParseError(std::convert::Infallible),
    #[error("no subgraphs configured")]
    NoSubgraphs,
}

pub fn load_config(
    override_config_path: Option<String>,
) -> Result<GatewayConfig, GatewayConfigError> {
    let mut config = Config::builder();

    if let Some(path_str) = override_config_path {
        config = config.add_source(File::with_name(&path_str).required(true));
    } else {
        for name in DEFAULT_FILE_NAMES {
            config = config.add_source(File::with_name(name).required(false));
        }
    }

    let cfg = config.build()?.try_deserialize::<GatewayConfig>()?;

    Ok(cfg)
}

/// Parses a configuration directly from a YAML string. Used by tests and by
/// embedders that manage their own files.
pub fn parse_yaml_config(raw: &str) -> Result<GatewayConfig, GatewayConfigError> {
    let cfg = Config::builder()
        .add_source(File::from_str(raw, FileFormat::Yaml))
        .build()?
        .try_deserialize::<GatewayConfig>()?;

    Ok(cfg)
}
