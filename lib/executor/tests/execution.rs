use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use graphql_parser::parse_query;
use lattice_composer::{compose, ComposedSchema, SubgraphSchema};
use lattice_executor::{
    execute_query_plan, ExecutionOptions, ExecutionResult, FetchError, GraphQLError,
    SubgraphExecutor, SubgraphExecutorMap, SubgraphRequest,
};
use lattice_query_planner::{
    normalize_operation, OperationDefinition, OwnershipPolicy, Planner, QueryPlan,
};
use serde_json::{json, Map, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Shared across mocks so tests can assert cross-subgraph call ordering.
type CallLog = Arc<Mutex<Vec<(String, Instant)>>>;

struct ScriptedSubgraph {
    name: String,
    delay: Duration,
    responses: Mutex<VecDeque<Result<ExecutionResult, FetchError>>>,
    log: CallLog,
    requests: Arc<Mutex<Vec<SubgraphRequest>>>,
}

impl ScriptedSubgraph {
    fn new(
        name: &str,
        delay: Duration,
        log: &CallLog,
        responses: Vec<Result<ExecutionResult, FetchError>>,
    ) -> Arc<ScriptedSubgraph> {
        Arc::new(ScriptedSubgraph {
            name: name.to_string(),
            delay,
            responses: Mutex::new(responses.into()),
            log: log.clone(),
            requests: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

#[async_trait]
impl SubgraphExecutor for ScriptedSubgraph {
    async fn execute(&self, request: SubgraphRequest) -> Result<ExecutionResult, FetchError> {
        self.log
            .lock()
            .unwrap()
            .push((self.name.clone(), Instant::now()));
        self.requests.lock().unwrap().push(request);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected extra call to subgraph {}", self.name))
    }
}

fn ok(data: Value) -> Result<ExecutionResult, FetchError> {
    Ok(ExecutionResult {
        data: Some(data),
        errors: None,
        extensions: None,
    })
}

fn transient(subgraph: &str) -> Result<ExecutionResult, FetchError> {
    Err(FetchError::Transient {
        subgraph: subgraph.to_string(),
        message: "connection reset by peer".to_string(),
    })
}

fn application(subgraph: &str) -> Result<ExecutionResult, FetchError> {
    Err(FetchError::Application {
        subgraph: subgraph.to_string(),
        message: "400 Bad Request".to_string(),
    })
}

fn schema(subgraphs: &[(&str, &str)]) -> Arc<ComposedSchema> {
    let parsed: Vec<SubgraphSchema> = subgraphs
        .iter()
        .map(|(name, sdl)| {
            SubgraphSchema::parse(*name, format!("http://{}.local/graphql", name), sdl)
                .expect("test SDL should parse")
        })
        .collect();
    Arc::new(compose(&parsed).expect("test subgraphs should compose"))
}

fn plan_and_operation(
    schema: &Arc<ComposedSchema>,
    query: &str,
) -> (QueryPlan, OperationDefinition) {
    let document = parse_query(query).expect("test query should parse");
    let operation = normalize_operation(&document, None).expect("test query should normalize");
    let plan = Planner::new(schema.clone(), OwnershipPolicy::default())
        .plan(&operation)
        .expect("test query should plan");
    (plan, operation)
}

async fn run(
    plan: &QueryPlan,
    executors: &SubgraphExecutorMap,
    operation: &OperationDefinition,
    schema: &ComposedSchema,
    variables: Option<&Map<String, Value>>,
    options: &ExecutionOptions,
) -> ExecutionResult {
    execute_query_plan(
        plan,
        executors,
        operation,
        schema,
        variables,
        options,
        &CancellationToken::new(),
    )
    .await
}

const PRODUCTS_SDL: &str = r#"
    type Query {
      product(id: ID!): Product
      topProducts: [Product]
    }

    type Product @key(fields: "id") {
      id: ID!
      name: String!
      price: Int
    }
"#;

const REVIEWS_SDL: &str = r#"
    type Product @key(fields: "id") {
      id: ID! @external
      reviews: [Review]
    }

    type Review {
      id: ID!
      body: String!
    }
"#;

const USERS_SDL: &str = r#"
    type Query {
      me: User
    }

    type User @key(fields: "id") {
      id: ID!
      username: String!
    }
"#;

#[tokio::test]
async fn stitches_entity_fields_across_subgraphs() {
    let schema = schema(&[("products", PRODUCTS_SDL), ("reviews", REVIEWS_SDL)]);
    let (plan, operation) =
        plan_and_operation(&schema, "{ product(id: 1) { name reviews { body } } }");

    let log = CallLog::default();
    let mut executors = SubgraphExecutorMap::default();
    executors.insert_arc(
        "products",
        ScriptedSubgraph::new(
            "products",
            Duration::ZERO,
            &log,
            vec![ok(
                json!({"product": {"name": "Table", "__typename": "Product", "id": "1"}}),
            )],
        ),
    );
    let reviews = ScriptedSubgraph::new(
        "reviews",
        Duration::ZERO,
        &log,
        vec![ok(json!({"_entities": [{
            "__typename": "Product",
            "id": "1",
            "reviews": [{"body": "sturdy"}, {"body": "wobbly"}]
        }]}))],
    );
    let reviews_requests = reviews.requests.clone();
    executors.insert_arc("reviews", reviews);

    let result = run(
        &plan,
        &executors,
        &operation,
        &schema,
        None,
        &ExecutionOptions::default(),
    )
    .await;

    assert!(result.errors.is_none(), "errors: {:?}", result.errors);
    assert_eq!(
        result.data,
        Some(json!({"product": {
            "name": "Table",
            "reviews": [{"body": "sturdy"}, {"body": "wobbly"}]
        }}))
    );

    // The entity fetch carried the projected representation.
    let requests = reviews_requests.lock().unwrap();
    assert_eq!(
        requests[0].variables.as_ref().unwrap().get("representations"),
        Some(&json!([{"__typename": "Product", "id": "1"}]))
    );
}

#[tokio::test(start_paused = true)]
async fn runs_independent_root_fetches_in_parallel() {
    let schema = schema(&[("products", PRODUCTS_SDL), ("users", USERS_SDL)]);
    let (plan, operation) =
        plan_and_operation(&schema, "{ topProducts { name } me { username } }");

    let log = CallLog::default();
    let mut executors = SubgraphExecutorMap::default();
    executors.insert_arc(
        "products",
        ScriptedSubgraph::new(
            "products",
            Duration::from_millis(100),
            &log,
            vec![ok(json!({"topProducts": [{"name": "Table"}]}))],
        ),
    );
    executors.insert_arc(
        "users",
        ScriptedSubgraph::new(
            "users",
            Duration::from_millis(100),
            &log,
            vec![ok(json!({"me": {"username": "ada"}}))],
        ),
    );

    let started = Instant::now();
    let result = run(
        &plan,
        &executors,
        &operation,
        &schema,
        None,
        &ExecutionOptions::default(),
    )
    .await;

    // Two 100ms fetches overlap instead of running back to back.
    assert!(started.elapsed() < Duration::from_millis(150));
    assert!(result.errors.is_none());
    assert_eq!(
        result.data,
        Some(json!({"topProducts": [{"name": "Table"}], "me": {"username": "ada"}}))
    );

    let entries = log.lock().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].1, entries[1].1);
}

#[tokio::test(start_paused = true)]
async fn entity_fetch_waits_for_its_parent() {
    let schema = schema(&[("products", PRODUCTS_SDL), ("reviews", REVIEWS_SDL)]);
    let (plan, operation) =
        plan_and_operation(&schema, "{ product(id: 1) { name reviews { body } } }");

    let log = CallLog::default();
    let mut executors = SubgraphExecutorMap::default();
    executors.insert_arc(
        "products",
        ScriptedSubgraph::new(
            "products",
            Duration::from_millis(50),
            &log,
            vec![ok(
                json!({"product": {"name": "Table", "__typename": "Product", "id": "1"}}),
            )],
        ),
    );
    executors.insert_arc(
        "reviews",
        ScriptedSubgraph::new(
            "reviews",
            Duration::ZERO,
            &log,
            vec![ok(
                json!({"_entities": [{"__typename": "Product", "id": "1", "reviews": []}]}),
            )],
        ),
    );

    run(
        &plan,
        &executors,
        &operation,
        &schema,
        None,
        &ExecutionOptions::default(),
    )
    .await;

    let entries = log.lock().unwrap();
    assert_eq!(entries[0].0, "products");
    assert_eq!(entries[1].0, "reviews");
    assert_eq!(entries[1].1 - entries[0].1, Duration::from_millis(50));
}

#[tokio::test]
async fn answers_typename_only_queries_without_fetching() {
    let schema = schema(&[("products", PRODUCTS_SDL)]);
    let (plan, operation) = plan_and_operation(&schema, "{ __typename }");
    let executors = SubgraphExecutorMap::default();

    let result = run(
        &plan,
        &executors,
        &operation,
        &schema,
        None,
        &ExecutionOptions::default(),
    )
    .await;

    assert_eq!(result.data, Some(json!({"__typename": "Query"})));
    assert!(result.errors.is_none());
}

#[tokio::test]
async fn partial_failure_preserves_sibling_data() {
    let schema = schema(&[("products", PRODUCTS_SDL), ("users", USERS_SDL)]);
    let (plan, operation) =
        plan_and_operation(&schema, "{ topProducts { name } me { username } }");

    let log = CallLog::default();
    let mut executors = SubgraphExecutorMap::default();
    executors.insert_arc(
        "products",
        ScriptedSubgraph::new(
            "products",
            Duration::ZERO,
            &log,
            vec![ok(json!({"topProducts": [{"name": "Table"}]}))],
        ),
    );
    executors.insert_arc(
        "users",
        ScriptedSubgraph::new("users", Duration::ZERO, &log, vec![application("users")]),
    );

    let result = run(
        &plan,
        &executors,
        &operation,
        &schema,
        None,
        &ExecutionOptions::default(),
    )
    .await;

    assert_eq!(
        result.data,
        Some(json!({"topProducts": [{"name": "Table"}], "me": null}))
    );
    let errors = result.errors.expect("the failed fetch should be reported");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, Some(vec![json!("me")]));
    let extensions = errors[0].extensions.as_ref().unwrap();
    assert_eq!(extensions.get("serviceName"), Some(&json!("users")));
    assert_eq!(extensions.get("code"), Some(&json!("SUBGRAPH_REQUEST_FAILED")));
}

#[tokio::test]
async fn failed_parent_skips_dependent_fetches() {
    let schema = schema(&[("products", PRODUCTS_SDL), ("reviews", REVIEWS_SDL)]);
    let (plan, operation) =
        plan_and_operation(&schema, "{ product(id: 1) { name reviews { body } } }");

    let log = CallLog::default();
    let mut executors = SubgraphExecutorMap::default();
    executors.insert_arc(
        "products",
        ScriptedSubgraph::new("products", Duration::ZERO, &log, vec![transient("products")]),
    );
    executors.insert_arc(
        "reviews",
        ScriptedSubgraph::new("reviews", Duration::ZERO, &log, vec![]),
    );

    let result = run(
        &plan,
        &executors,
        &operation,
        &schema,
        None,
        &ExecutionOptions {
            retry_on_transient_errors: false,
        },
    )
    .await;

    assert!(result.data.is_none());
    let errors = result.errors.expect("the failed fetch should be reported");
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].extensions.as_ref().unwrap().get("code"),
        Some(&json!("SUBGRAPH_UNAVAILABLE"))
    );

    let entries = log.lock().unwrap();
    assert_eq!(entries.len(), 1, "the reviews fetch should never start");
}

#[tokio::test]
async fn failed_entity_fetch_nulls_only_its_branch() {
    let schema = schema(&[("products", PRODUCTS_SDL), ("reviews", REVIEWS_SDL)]);
    let (plan, operation) =
        plan_and_operation(&schema, "{ product(id: 1) { name reviews { body } } }");

    let log = CallLog::default();
    let mut executors = SubgraphExecutorMap::default();
    executors.insert_arc(
        "products",
        ScriptedSubgraph::new(
            "products",
            Duration::ZERO,
            &log,
            vec![ok(
                json!({"product": {"name": "Table", "__typename": "Product", "id": "1"}}),
            )],
        ),
    );
    executors.insert_arc(
        "reviews",
        ScriptedSubgraph::new("reviews", Duration::ZERO, &log, vec![application("reviews")]),
    );

    let result = run(
        &plan,
        &executors,
        &operation,
        &schema,
        None,
        &ExecutionOptions::default(),
    )
    .await;

    assert_eq!(
        result.data,
        Some(json!({"product": {"name": "Table", "reviews": null}}))
    );
    let errors = result.errors.expect("the failed fetch should be reported");
    assert_eq!(errors[0].path, Some(vec![json!("product"), json!("reviews")]));
}

#[tokio::test]
async fn retries_transient_failures_once() {
    let schema = schema(&[("products", PRODUCTS_SDL)]);
    let (plan, operation) = plan_and_operation(&schema, "{ topProducts { name } }");

    let log = CallLog::default();
    let mut executors = SubgraphExecutorMap::default();
    executors.insert_arc(
        "products",
        ScriptedSubgraph::new(
            "products",
            Duration::ZERO,
            &log,
            vec![
                transient("products"),
                ok(json!({"topProducts": [{"name": "Table"}]})),
            ],
        ),
    );

    let result = run(
        &plan,
        &executors,
        &operation,
        &schema,
        None,
        &ExecutionOptions::default(),
    )
    .await;

    assert!(result.errors.is_none(), "errors: {:?}", result.errors);
    assert_eq!(result.data, Some(json!({"topProducts": [{"name": "Table"}]})));
    assert_eq!(log.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn does_not_retry_application_failures() {
    let schema = schema(&[("products", PRODUCTS_SDL)]);
    let (plan, operation) = plan_and_operation(&schema, "{ topProducts { name } }");

    let log = CallLog::default();
    let mut executors = SubgraphExecutorMap::default();
    executors.insert_arc(
        "products",
        ScriptedSubgraph::new("products", Duration::ZERO, &log, vec![application("products")]),
    );

    let result = run(
        &plan,
        &executors,
        &operation,
        &schema,
        None,
        &ExecutionOptions::default(),
    )
    .await;

    assert!(result.errors.is_some());
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_in_flight_fetches() {
    let schema = schema(&[("products", PRODUCTS_SDL)]);
    let (plan, operation) = plan_and_operation(&schema, "{ topProducts { name } }");

    let log = CallLog::default();
    let mut executors = SubgraphExecutorMap::default();
    executors.insert_arc(
        "products",
        ScriptedSubgraph::new(
            "products",
            Duration::from_secs(3600),
            &log,
            vec![ok(json!({"topProducts": []}))],
        ),
    );

    let cancellation = CancellationToken::new();
    let trigger = cancellation.clone();
    let options = ExecutionOptions::default();
    let started = Instant::now();
    let (result, ()) = tokio::join!(
        execute_query_plan(
            &plan,
            &executors,
            &operation,
            &schema,
            None,
            &options,
            &cancellation,
        ),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        }
    );

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(result.data.is_none());
    let errors = result.errors.expect("cancellation should be reported");
    assert_eq!(errors[0].message, "request cancelled");
    assert_eq!(
        errors[0].extensions.as_ref().unwrap().get("code"),
        Some(&json!("REQUEST_CANCELLED"))
    );
}

#[tokio::test]
async fn keeps_the_first_value_on_conflicting_entity_fields() {
    let schema = schema(&[("products", PRODUCTS_SDL), ("reviews", REVIEWS_SDL)]);
    let (plan, operation) =
        plan_and_operation(&schema, "{ product(id: 1) { name reviews { body } } }");

    let log = CallLog::default();
    let mut executors = SubgraphExecutorMap::default();
    executors.insert_arc(
        "products",
        ScriptedSubgraph::new(
            "products",
            Duration::ZERO,
            &log,
            vec![ok(
                json!({"product": {"name": "Table", "__typename": "Product", "id": "1"}}),
            )],
        ),
    );
    executors.insert_arc(
        "reviews",
        ScriptedSubgraph::new(
            "reviews",
            Duration::ZERO,
            &log,
            vec![ok(json!({"_entities": [{
                "__typename": "Product",
                "id": "1",
                "name": "Renamed",
                "reviews": [{"body": "ok"}]
            }]}))],
        ),
    );

    let result = run(
        &plan,
        &executors,
        &operation,
        &schema,
        None,
        &ExecutionOptions::default(),
    )
    .await;

    assert_eq!(
        result.data,
        Some(json!({"product": {"name": "Table", "reviews": [{"body": "ok"}]}}))
    );
}

#[tokio::test]
async fn rebases_subgraph_errors_onto_the_response_path() {
    let schema = schema(&[("products", PRODUCTS_SDL), ("reviews", REVIEWS_SDL)]);
    let (plan, operation) =
        plan_and_operation(&schema, "{ product(id: 1) { name reviews { body } } }");

    let log = CallLog::default();
    let mut executors = SubgraphExecutorMap::default();
    executors.insert_arc(
        "products",
        ScriptedSubgraph::new(
            "products",
            Duration::ZERO,
            &log,
            vec![ok(
                json!({"product": {"name": "Table", "__typename": "Product", "id": "1"}}),
            )],
        ),
    );
    executors.insert_arc(
        "reviews",
        ScriptedSubgraph::new(
            "reviews",
            Duration::ZERO,
            &log,
            vec![Ok(ExecutionResult {
                data: Some(json!({"_entities": [{
                    "__typename": "Product",
                    "id": "1",
                    "reviews": null
                }]})),
                errors: Some(vec![GraphQLError::at_path(
                    "review store is unavailable",
                    vec![json!("_entities"), json!(0), json!("reviews")],
                )]),
                extensions: None,
            })],
        ),
    );

    let result = run(
        &plan,
        &executors,
        &operation,
        &schema,
        None,
        &ExecutionOptions::default(),
    )
    .await;

    assert_eq!(
        result.data,
        Some(json!({"product": {"name": "Table", "reviews": null}}))
    );
    let errors = result.errors.expect("the subgraph error should flow through");
    assert_eq!(errors[0].message, "review store is unavailable");
    assert_eq!(errors[0].path, Some(vec![json!("product"), json!("reviews")]));
    assert_eq!(
        errors[0].extensions.as_ref().unwrap().get("serviceName"),
        Some(&json!("reviews"))
    );
}

#[tokio::test]
async fn forwards_request_variables_to_the_subgraph() {
    let schema = schema(&[("products", PRODUCTS_SDL)]);
    let (plan, operation) =
        plan_and_operation(&schema, "query($id: ID!) { product(id: $id) { name } }");

    let log = CallLog::default();
    let mut executors = SubgraphExecutorMap::default();
    let products = ScriptedSubgraph::new(
        "products",
        Duration::ZERO,
        &log,
        vec![ok(json!({"product": {"name": "Table"}}))],
    );
    let seen = products.requests.clone();
    executors.insert_arc("products", products);

    let mut variables = Map::new();
    variables.insert("id".to_string(), json!("7"));

    let result = run(
        &plan,
        &executors,
        &operation,
        &schema,
        Some(&variables),
        &ExecutionOptions::default(),
    )
    .await;

    assert!(result.errors.is_none(), "errors: {:?}", result.errors);
    assert_eq!(result.data, Some(json!({"product": {"name": "Table"}})));

    let requests = seen.lock().unwrap();
    assert_eq!(
        requests[0].variables.as_ref().unwrap().get("id"),
        Some(&json!("7"))
    );
}
