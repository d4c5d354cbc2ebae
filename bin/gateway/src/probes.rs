use std::sync::Arc;

use ntex::web::{self, Responder};

use crate::shared_state::GatewaySharedState;

pub async fn health_check_handler() -> impl Responder {
    web::HttpResponse::Ok()
}

/// Ready once the first composition has landed. Before that the gateway
/// cannot plan anything, so load balancers should hold traffic back.
pub async fn readiness_check_handler(
    state: web::types::State<Arc<GatewaySharedState>>,
) -> impl Responder {
    if state.schema_state.is_ready() {
        web::HttpResponse::Ok()
    } else {
        web::HttpResponse::ServiceUnavailable()
    }
}
