#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("operation \"{0}\" was not found in the document")]
    OperationNotFound(String),
    #[error("the document defines multiple operations, so an operation name must be provided")]
    AmbiguousOperation,
    #[error("the document does not define an executable operation")]
    EmptyDocument,
    #[error("subscriptions are not supported")]
    SubscriptionsNotSupported,
    #[error("field \"{type_name}.{field_name}\" cannot be resolved by any subgraph")]
    Unresolvable {
        type_name: String,
        field_name: String,
    },
}
