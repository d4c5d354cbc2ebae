use std::sync::Arc;

use lattice_gateway_config::GatewayConfig;

use crate::schema_state::SchemaState;

pub struct GatewaySharedState {
    pub config: Arc<GatewayConfig>,
    pub schema_state: Arc<SchemaState>,
}

#[derive(Debug, thiserror::Error)]
pub enum SharedStateError {
    #[error("failed to build the subgraph HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl GatewaySharedState {
    pub fn new(config: GatewayConfig) -> Result<Arc<GatewaySharedState>, SharedStateError> {
        let client = reqwest::Client::builder().build()?;
        let config = Arc::new(config);
        let schema_state = Arc::new(SchemaState::new(&config, client));

        Ok(Arc::new(GatewaySharedState {
            config,
            schema_state,
        }))
    }
}
