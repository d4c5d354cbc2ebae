mod logger;
mod pipeline;
mod probes;
mod schema_state;
mod shared_state;

use std::sync::Arc;

use lattice_gateway_config::{load_config, GatewayConfigError};
use ntex::util::Bytes;
use ntex::web::{self, HttpRequest};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::logger::configure_logging;
use crate::pipeline::graphql_request_handler;
use crate::probes::{health_check_handler, readiness_check_handler};
use crate::shared_state::GatewaySharedState;

async fn graphql_endpoint_handler(
    request: HttpRequest,
    body_bytes: Bytes,
    app_state: web::types::State<Arc<GatewaySharedState>>,
) -> impl web::Responder {
    match graphql_request_handler(&request, body_bytes, app_state.get_ref()).await {
        Ok(response) => response,
        Err(err) => err.into(),
    }
}

#[ntex::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::var("LATTICE_CONFIG_FILE_PATH").ok();
    let gateway_config = load_config(config_path)?;
    configure_logging(&gateway_config.log);

    if gateway_config.subgraphs.services.is_empty() {
        return Err(GatewayConfigError::NoSubgraphs.into());
    }

    let addr = gateway_config.http.address();
    let graphql_endpoint = gateway_config.http.graphql_endpoint.clone();
    let poll_interval = gateway_config.subgraphs.poll_interval;
    let shared_state = GatewaySharedState::new(gateway_config)?;

    // Serve right away; requests are answered with 503 and Retry-After until
    // the first composition lands.
    shared_state.schema_state.refresh().await;
    if !shared_state.schema_state.is_ready() {
        warn!("initial composition failed, serving 503 until subgraphs become reachable");
    }

    let shutdown = CancellationToken::new();
    shared_state
        .schema_state
        .spawn_poller(poll_interval, shutdown.clone());

    info!("starting server on {}", addr);
    web::HttpServer::new(async move || {
        web::App::new()
            .state(shared_state.clone())
            .route(&graphql_endpoint, web::to(graphql_endpoint_handler))
            .route("/health", web::to(health_check_handler))
            .route("/readiness", web::to(readiness_check_handler))
    })
    .bind(addr)?
    .run()
    .await?;

    shutdown.cancel();

    Ok(())
}
