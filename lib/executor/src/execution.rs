use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use futures::Future;
use lattice_composer::ComposedSchema;
use lattice_query_planner::{FetchNode, NodeId, OperationDefinition, QueryPlan};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::deep_merge::deep_merge;
use crate::error::FetchError;
use crate::executors::common::SubgraphExecutor;
use crate::executors::map::SubgraphExecutorMap;
use crate::projection::project_by_operation;
use crate::representations::{entity_matches_representation, project_representation};
use crate::response::{ExecutionResult, GraphQLError, SubgraphRequest};
use crate::traverse::{path_to_error_path, traverse_and_collect};
use crate::variables::{collect_variables, variables_for_node};

#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    pub retry_on_transient_errors: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        ExecutionOptions {
            retry_on_transient_errors: true,
        }
    }
}

type FetchFuture =
    Pin<Box<dyn Future<Output = (NodeId, Result<ExecutionResult, FetchError>)> + Send>>;

/// Executes a query plan against the subgraphs and stitches the responses
/// into one GraphQL result.
///
/// Scheduling is a dependency-count gate: every node carries the number of
/// unfinished predecessors, a node enters the fetch pool when its count hits
/// zero, and all in-flight fetches run concurrently. Only this loop touches
/// the response document, so no locks guard it. A failed fetch poisons its
/// dependents; everything else proceeds and the response stays partial
/// rather than failing whole.
#[instrument(skip_all, fields(nodes = plan.nodes.len()))]
pub async fn execute_query_plan(
    plan: &QueryPlan,
    executors: &SubgraphExecutorMap,
    operation: &OperationDefinition,
    schema: &ComposedSchema,
    request_variables: Option<&Map<String, Value>>,
    options: &ExecutionOptions,
    cancellation: &CancellationToken,
) -> ExecutionResult {
    let variables = match collect_variables(operation, request_variables, &schema.metadata) {
        Ok(variables) => variables,
        Err(err) => return ExecutionResult::from_error_message(err.message),
    };

    let total = plan.nodes.len();
    // A plan with no fetches still answers meta selections like __typename
    // during response shaping.
    let mut data = if total == 0 {
        Value::Object(Map::new())
    } else {
        Value::Null
    };
    let mut errors: Vec<GraphQLError> = Vec::new();
    let mut pending_deps: Vec<usize> = plan.nodes.iter().map(|n| n.depends_on.len()).collect();
    let mut skipped = vec![false; total];
    let mut reps_by_node: Vec<Vec<Value>> = vec![Vec::new(); total];
    let mut indexes_by_node: Vec<Vec<usize>> = vec![Vec::new(); total];
    let mut ready: Vec<NodeId> = plan.root_ids.clone();
    let mut in_flight: FuturesUnordered<FetchFuture> = FuturesUnordered::new();
    let mut completed = 0usize;
    let mut cancelled = false;

    while completed < total && !cancelled {
        while let Some(id) = ready.pop() {
            let node = &plan.nodes[id];
            if skipped[id] {
                poison_dependents(plan, id, &mut skipped);
                finish_node(plan, id, &mut pending_deps, &mut ready, &mut completed);
                continue;
            }

            let mut node_variables =
                variables_for_node(&node.variable_usages, variables.as_ref()).unwrap_or_default();

            if node.is_entity_fetch() {
                let requires = node.requires.as_deref().unwrap_or(&[]);
                let parent_type = node.parent_type.as_deref().unwrap_or_default();
                let mut representations = Vec::new();
                let mut indexes = Vec::new();
                for (index, target) in traverse_and_collect(&mut data, &node.response_path)
                    .into_iter()
                    .enumerate()
                {
                    if let Some(projected) =
                        project_representation(target, parent_type, requires, &schema.metadata)
                    {
                        representations.push(projected);
                        indexes.push(index);
                    }
                }
                // Nothing to resolve, the fetch completes as a no-op.
                if representations.is_empty() {
                    finish_node(plan, id, &mut pending_deps, &mut ready, &mut completed);
                    continue;
                }
                node_variables.insert(
                    "representations".to_string(),
                    Value::Array(representations.clone()),
                );
                reps_by_node[id] = representations;
                indexes_by_node[id] = indexes;
            }

            let request = SubgraphRequest {
                query: node.operation.clone(),
                operation_name: None,
                variables: if node_variables.is_empty() {
                    None
                } else {
                    Some(node_variables)
                },
            };

            match executors.get(&node.subgraph_name) {
                Some(executor) => {
                    let retry = options.retry_on_transient_errors;
                    debug!(subgraph = %node.subgraph_name, node = id, "scheduling fetch");
                    in_flight.push(Box::pin(async move {
                        (id, fetch_with_retry(executor, request, retry).await)
                    }));
                }
                None => {
                    errors.push(
                        GraphQLError::new(format!(
                            "no executor configured for subgraph \"{}\"",
                            node.subgraph_name
                        ))
                        .with_extension("code", json!("SUBGRAPH_UNKNOWN")),
                    );
                    poison_dependents(plan, id, &mut skipped);
                    finish_node(plan, id, &mut pending_deps, &mut ready, &mut completed);
                }
            }
        }

        if completed >= total {
            break;
        }

        tokio::select! {
            _ = cancellation.cancelled() => {
                errors.push(
                    GraphQLError::new("request cancelled")
                        .with_extension("code", json!("REQUEST_CANCELLED")),
                );
                cancelled = true;
            }
            Some((id, result)) = in_flight.next() => {
                let node = &plan.nodes[id];
                match result {
                    Ok(result) => merge_fetch_result(
                        node,
                        result,
                        &mut data,
                        &mut errors,
                        &reps_by_node[id],
                        &indexes_by_node[id],
                    ),
                    Err(err) => {
                        warn!(subgraph = %err.subgraph(), error = %err, "subgraph fetch failed");
                        errors.extend(fetch_errors_to_graphql(node, &err));
                        poison_dependents(plan, id, &mut skipped);
                    }
                }
                finish_node(plan, id, &mut pending_deps, &mut ready, &mut completed);
            }
            else => break,
        }
    }

    if cancelled {
        // A cancelled request gets errors only, never a partial document.
        data = Value::Null;
    }
    if !data.is_null() {
        project_by_operation(&mut data, &mut errors, operation, schema);
    }

    ExecutionResult {
        data: if data.is_null() { None } else { Some(data) },
        errors: if errors.is_empty() { None } else { Some(errors) },
        extensions: None,
    }
}

async fn fetch_with_retry(
    executor: Arc<dyn SubgraphExecutor>,
    request: SubgraphRequest,
    retry: bool,
) -> Result<ExecutionResult, FetchError> {
    match executor.execute(request.clone()).await {
        Err(err) if err.is_transient() && retry => {
            warn!(subgraph = %err.subgraph(), error = %err, "transient subgraph failure, retrying once");
            executor.execute(request).await
        }
        other => other,
    }
}

fn finish_node(
    plan: &QueryPlan,
    id: NodeId,
    pending_deps: &mut [usize],
    ready: &mut Vec<NodeId>,
    completed: &mut usize,
) {
    *completed += 1;
    for &dependent in &plan.nodes[id].dependents {
        pending_deps[dependent] -= 1;
        if pending_deps[dependent] == 0 {
            ready.push(dependent);
        }
    }
}

fn poison_dependents(plan: &QueryPlan, id: NodeId, skipped: &mut [bool]) {
    for &dependent in &plan.nodes[id].dependents {
        skipped[dependent] = true;
    }
}

fn merge_fetch_result(
    node: &FetchNode,
    result: ExecutionResult,
    data: &mut Value,
    errors: &mut Vec<GraphQLError>,
    representations: &[Value],
    indexes: &[usize],
) {
    if let Some(fetch_errors) = result.errors {
        let prefix = path_to_error_path(&node.response_path);
        for mut err in fetch_errors {
            err.path = remap_subgraph_error_path(node, &prefix, err.path.take());
            errors.push(err.with_extension("serviceName", json!(node.subgraph_name)));
        }
    }

    let Some(result_data) = result.data else {
        return;
    };

    if !node.is_entity_fetch() {
        deep_merge(data, result_data);
        return;
    }

    let entities = match result_data {
        Value::Object(mut obj) => match obj.remove("_entities") {
            Some(Value::Array(entities)) => entities,
            _ => {
                warn!(subgraph = %node.subgraph_name, "entity fetch response missing _entities");
                return;
            }
        },
        _ => return,
    };

    let mut targets = traverse_and_collect(data, &node.response_path);
    for (i, entity) in entities.into_iter().enumerate() {
        let Some(&target_index) = indexes.get(i) else {
            break;
        };
        let Some(target) = targets.get_mut(target_index) else {
            continue;
        };
        let matches = representations
            .get(i)
            .is_none_or(|representation| entity_matches_representation(&entity, representation));
        if matches {
            deep_merge(target, entity);
        }
    }
}

/// Subgraph errors from entity fetches point into `_entities`; rebase them
/// onto the position the fetch merges into.
fn remap_subgraph_error_path(
    node: &FetchNode,
    prefix: &[Value],
    path: Option<Vec<Value>>,
) -> Option<Vec<Value>> {
    if !node.is_entity_fetch() {
        return path;
    }
    match path {
        Some(path) => {
            let rest = if path.first().and_then(Value::as_str) == Some("_entities") {
                path.get(2..).unwrap_or(&[])
            } else {
                &path[..]
            };
            Some(prefix.iter().cloned().chain(rest.iter().cloned()).collect())
        }
        None if !prefix.is_empty() => Some(prefix.to_vec()),
        None => None,
    }
}

/// A failed fetch is reported once per response key the node would have
/// filled in, so the error paths line up with the fields that end up null.
fn fetch_errors_to_graphql(node: &FetchNode, err: &FetchError) -> Vec<GraphQLError> {
    let prefix = path_to_error_path(&node.response_path);
    let code = if err.is_transient() {
        "SUBGRAPH_UNAVAILABLE"
    } else {
        "SUBGRAPH_REQUEST_FAILED"
    };

    let paths: Vec<Vec<Value>> = if node.output_keys.is_empty() {
        vec![prefix]
    } else {
        node.output_keys
            .iter()
            .map(|key| {
                let mut path = prefix.clone();
                path.push(json!(key));
                path
            })
            .collect()
    };

    paths
        .into_iter()
        .map(|path| {
            let error = if path.is_empty() {
                GraphQLError::new(err.to_string())
            } else {
                GraphQLError::at_path(err.to_string(), path)
            };
            error
                .with_extension("code", json!(code))
                .with_extension("serviceName", json!(node.subgraph_name))
        })
        .collect()
}
