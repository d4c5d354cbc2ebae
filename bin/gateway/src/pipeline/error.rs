use std::sync::Arc;

use http::StatusCode;
use lattice_executor::GraphQLError;
use lattice_query_planner::PlanError;
use ntex::http::ResponseBuilder;
use ntex::web::HttpResponse;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedHttpMethod(http::Method),
    #[error("Failed to parse GraphQL request payload")]
    FailedToParseBody(serde_json::Error),
    #[error("Missing query parameter: query")]
    MissingQueryParam,
    #[error("Failed to parse GraphQL variables JSON")]
    FailedToParseVariables(serde_json::Error),
    #[error("Failed to parse GraphQL operation: {0}")]
    FailedToParseOperation(graphql_parser::query::ParseError),
    #[error("Cannot perform mutations over GET")]
    MutationNotAllowedOverHttpGet,
    #[error("Failed to resolve GraphQL operation: {0}")]
    InvalidOperation(PlanError),
    #[error("Failed to produce a query plan: {0}")]
    PlanFailed(Arc<PlanError>),
    #[error("No composed supergraph is available yet")]
    SchemaNotReady,
    #[error("Request deadline exceeded")]
    RequestTimeout,
}

impl PipelineError {
    pub fn graphql_error_code(&self) -> &'static str {
        match self {
            Self::UnsupportedHttpMethod(_) => "METHOD_NOT_ALLOWED",
            Self::MutationNotAllowedOverHttpGet => "METHOD_NOT_ALLOWED",
            Self::FailedToParseOperation(_) => "GRAPHQL_PARSE_FAILED",
            Self::InvalidOperation(err) => plan_error_code(err),
            Self::PlanFailed(err) => plan_error_code(err),
            Self::SchemaNotReady => "SCHEMA_NOT_READY",
            Self::RequestTimeout => "REQUEST_TIMEOUT",
            _ => "BAD_REQUEST",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnsupportedHttpMethod(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::MutationNotAllowedOverHttpGet => StatusCode::METHOD_NOT_ALLOWED,
            Self::SchemaNotReady => StatusCode::SERVICE_UNAVAILABLE,
            Self::RequestTimeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

fn plan_error_code(err: &PlanError) -> &'static str {
    match err {
        PlanError::OperationNotFound(_)
        | PlanError::AmbiguousOperation
        | PlanError::EmptyDocument => "OPERATION_RESOLUTION_FAILURE",
        PlanError::SubscriptionsNotSupported => "SUBSCRIPTIONS_NOT_SUPPORTED",
        _ => "GRAPHQL_VALIDATION_FAILED",
    }
}

#[derive(Serialize, Debug, Default)]
pub struct FailedExecutionResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphQLError>>,
}

impl From<PipelineError> for HttpResponse {
    fn from(val: PipelineError) -> HttpResponse {
        let status = val.status_code();
        let retry_after = matches!(val, PipelineError::SchemaNotReady);

        let graphql_error = GraphQLError::new(val.to_string())
            .with_extension("code", json!(val.graphql_error_code()));
        let result = FailedExecutionResult {
            errors: Some(vec![graphql_error]),
        };

        let mut builder = ResponseBuilder::new(status);
        if retry_after {
            builder.header(http::header::RETRY_AFTER, "5");
        }
        builder.json(&result)
    }
}
