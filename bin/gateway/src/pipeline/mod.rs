pub mod error;

use std::sync::Arc;

use graphql_parser::parse_query;
use http::Method;
use lattice_executor::{execute_query_plan, ExecutionOptions};
use lattice_query_planner::{
    normalize_operation, shape_hash, OperationDefinition, OperationKind, QueryPlan,
};
use moka::future::Cache;
use ntex::util::Bytes;
use ntex::web::{self, HttpRequest};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::pipeline::error::PipelineError;
use crate::schema_state::GatewayRuntime;
use crate::shared_state::GatewaySharedState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphQLRequestBody {
    query: String,
    #[serde(default)]
    operation_name: Option<String>,
    #[serde(default)]
    variables: Option<Map<String, Value>>,
}

pub async fn graphql_request_handler(
    req: &HttpRequest,
    body_bytes: Bytes,
    state: &Arc<GatewaySharedState>,
) -> Result<web::HttpResponse, PipelineError> {
    let current = state.schema_state.current();
    let Some(runtime) = current.as_ref() else {
        return Err(PipelineError::SchemaNotReady);
    };

    let request = if req.method() == Method::POST {
        serde_json::from_slice::<GraphQLRequestBody>(&body_bytes)
            .map_err(PipelineError::FailedToParseBody)?
    } else if req.method() == Method::GET {
        request_from_query_string(req.query_string())?
    } else {
        return Err(PipelineError::UnsupportedHttpMethod(req.method().clone()));
    };

    let document =
        parse_query::<String>(&request.query).map_err(PipelineError::FailedToParseOperation)?;
    let operation = normalize_operation(&document, request.operation_name.as_deref())
        .map_err(PipelineError::InvalidOperation)?;

    if req.method() == Method::GET && matches!(operation.kind, OperationKind::Mutation) {
        return Err(PipelineError::MutationNotAllowedOverHttpGet);
    }

    let plan = plan_with_cache(runtime, &state.schema_state.plan_cache, &operation).await?;

    let cancellation = CancellationToken::new();
    let options = ExecutionOptions {
        retry_on_transient_errors: state.config.traffic_shaping.retry_on_transient_errors,
    };
    let execution = execute_query_plan(
        &plan,
        &runtime.executors,
        &operation,
        &runtime.schema,
        request.variables.as_ref(),
        &options,
        &cancellation,
    );

    // The request deadline covers planning leftovers and all sub-queries.
    // When it fires, in-flight fetches are torn down and no partial
    // response leaves the gateway.
    let result =
        match tokio::time::timeout(state.config.traffic_shaping.request_timeout, execution).await {
            Ok(result) => result,
            Err(_) => {
                cancellation.cancel();
                return Err(PipelineError::RequestTimeout);
            }
        };

    Ok(web::HttpResponse::Ok().json(&result))
}

/// Plans are cached per operation shape, so reformatted or fragment-factored
/// variants of the same query hit the same entry. Concurrent misses on one
/// key coalesce into a single planning run.
async fn plan_with_cache(
    runtime: &GatewayRuntime,
    plan_cache: &Cache<u64, Arc<QueryPlan>>,
    operation: &OperationDefinition,
) -> Result<Arc<QueryPlan>, PipelineError> {
    let cache_key = shape_hash(operation);

    plan_cache
        .try_get_with(cache_key, async {
            runtime.planner.plan(operation).map(Arc::new)
        })
        .await
        .map_err(PipelineError::PlanFailed)
}

fn request_from_query_string(query_string: &str) -> Result<GraphQLRequestBody, PipelineError> {
    let mut query = None;
    let mut operation_name = None;
    let mut variables = None;

    for (key, value) in url::form_urlencoded::parse(query_string.as_bytes()) {
        match key.as_ref() {
            "query" => query = Some(value.into_owned()),
            "operationName" => operation_name = Some(value.into_owned()),
            "variables" => {
                variables = Some(
                    serde_json::from_str(&value).map_err(PipelineError::FailedToParseVariables)?,
                )
            }
            _ => {}
        }
    }

    Ok(GraphQLRequestBody {
        query: query.ok_or(PipelineError::MissingQueryParam)?,
        operation_name,
        variables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_get_request_parameters() {
        let request = request_from_query_string(
            "query=%7B%20me%20%7B%20name%20%7D%20%7D&operationName=Me&variables=%7B%22id%22%3A%221%22%7D",
        )
        .expect("query string should parse");

        assert_eq!(request.query, "{ me { name } }");
        assert_eq!(request.operation_name.as_deref(), Some("Me"));
        assert_eq!(
            request.variables.unwrap().get("id"),
            Some(&serde_json::json!("1"))
        );
    }

    #[test]
    fn rejects_get_request_without_query() {
        let result = request_from_query_string("operationName=Me");
        assert!(matches!(result, Err(PipelineError::MissingQueryParam)));
    }
}
